use crate::callsite::CallSiteId;
use crate::class::ClassId;
use crate::entity::EntityId;
use crate::types::Type;
use crate::values::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Add {
        result: Value,
        left: Value,
        right: Value,
        ty: Type,
    },
    Sub {
        result: Value,
        left: Value,
        right: Value,
        ty: Type,
    },
    Mul {
        result: Value,
        left: Value,
        right: Value,
        ty: Type,
    },
    Eq {
        result: Value,
        left: Value,
        right: Value,
    },
    Copy {
        result: Value,
        value: Value,
    },

    Load {
        result: Value,
        address: Value,
        ty: Type,
    },
    Store {
        address: Value,
        value: Value,
        ty: Type,
    },
    /// Address of a function or static data entity.
    AddressOf {
        result: Value,
        entity: EntityId,
    },
    /// Address of a field inside an object.
    Member {
        result: Value,
        object: Value,
        field: EntityId,
    },
    /// Pointer plus a constant byte offset.
    Offset {
        result: Value,
        base: Value,
        offset: i64,
    },
    SizeOf {
        result: Value,
        class: ClassId,
    },

    Call {
        result: Option<Value>,
        callee: Callee,
        args: Vec<Value>,
        site: CallSiteId,
    },
    CallRuntime {
        result: Option<Value>,
        helper: RuntimeHelper,
        args: Vec<Value>,
    },

    Alloc {
        result: Value,
        class: ClassId,
    },
    AllocArray {
        result: Value,
        element: Type,
        count: Value,
    },
    ArrayLength {
        result: Value,
        array: Value,
    },
    InstanceOf {
        result: Value,
        object: Value,
        class: ClassId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Callee {
    /// Direct call to a known entity.
    Static(EntityId),
    /// Method call dispatched on the receiver in `args[0]`.
    Dynamic(EntityId),
    /// Call through a function pointer.
    Indirect(Value),
}

impl Callee {
    pub fn method(&self) -> Option<EntityId> {
        match self {
            Callee::Static(entity) | Callee::Dynamic(entity) => Some(*entity),
            Callee::Indirect(_) => None,
        }
    }
}

/// Runtime support routines referenced by lowered code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeHelper {
    Calloc,
    LookupInterfaceMethod,
    SearchItable,
    InstanceOf,
}

impl RuntimeHelper {
    pub const ALL: [RuntimeHelper; 4] = [
        RuntimeHelper::Calloc,
        RuntimeHelper::LookupInterfaceMethod,
        RuntimeHelper::SearchItable,
        RuntimeHelper::InstanceOf,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            RuntimeHelper::Calloc => "calloc",
            RuntimeHelper::LookupInterfaceMethod => "oo_rt_lookup_interface_method",
            RuntimeHelper::SearchItable => "oo_rt_search_itable",
            RuntimeHelper::InstanceOf => "oo_rt_instanceof",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|helper| helper.symbol() == symbol)
    }
}

impl fmt::Display for RuntimeHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Instruction {
    pub fn result(&self) -> Option<&Value> {
        match self {
            Instruction::Add { result, .. }
            | Instruction::Sub { result, .. }
            | Instruction::Mul { result, .. }
            | Instruction::Eq { result, .. }
            | Instruction::Copy { result, .. }
            | Instruction::Load { result, .. }
            | Instruction::AddressOf { result, .. }
            | Instruction::Member { result, .. }
            | Instruction::Offset { result, .. }
            | Instruction::SizeOf { result, .. }
            | Instruction::Alloc { result, .. }
            | Instruction::AllocArray { result, .. }
            | Instruction::ArrayLength { result, .. }
            | Instruction::InstanceOf { result, .. } => Some(result),
            Instruction::Call { result, .. } | Instruction::CallRuntime { result, .. } => {
                result.as_ref()
            }
            Instruction::Store { .. } => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(
            self,
            Instruction::Call { .. } | Instruction::CallRuntime { .. }
        )
    }

    pub fn is_dynamic_call(&self) -> bool {
        matches!(
            self,
            Instruction::Call {
                callee: Callee::Dynamic(_),
                ..
            }
        )
    }

    /// True for instructions that only exist before OO lowering.
    pub fn is_object_operation(&self) -> bool {
        matches!(
            self,
            Instruction::Alloc { .. }
                | Instruction::AllocArray { .. }
                | Instruction::ArrayLength { .. }
                | Instruction::InstanceOf { .. }
                | Instruction::SizeOf { .. }
                | Instruction::Member { .. }
                | Instruction::Call {
                    callee: Callee::Dynamic(_),
                    ..
                }
        )
    }

    pub fn call_site(&self) -> Option<CallSiteId> {
        match self {
            Instruction::Call { site, .. } => Some(*site),
            _ => None,
        }
    }
}
