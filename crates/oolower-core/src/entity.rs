use crate::class::ClassId;
use crate::data::DataId;
use crate::types::{MethodType, Type};
use cranelift_entity::entity_impl;
use serde::{Deserialize, Serialize};

/// Arena index of a method, field or data declaration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u32);
entity_impl!(EntityId, "ent");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    Global,
    Class(ClassId),
}

impl Owner {
    pub fn class(&self) -> Option<ClassId> {
        match self {
            Owner::Class(id) => Some(*id),
            Owner::Global => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Method(MethodType),
    Field(Type),
    /// Static data such as generated vtables and RTTI records.
    Data,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub ld_name: String,
    pub owner: Owner,
    pub kind: EntityKind,
    /// Methods this entity overrides, nearest first.
    pub overrides: Vec<EntityId>,
    pub initializer: Option<DataId>,
}

impl Entity {
    pub fn new(name: impl Into<String>, ld_name: impl Into<String>, owner: Owner, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            ld_name: ld_name.into(),
            owner,
            kind,
            overrides: Vec::new(),
            initializer: None,
        }
    }

    pub fn is_method(&self) -> bool {
        matches!(self.kind, EntityKind::Method(_))
    }

    pub fn is_field(&self) -> bool {
        matches!(self.kind, EntityKind::Field(_))
    }

    pub fn signature(&self) -> Option<&MethodType> {
        match &self.kind {
            EntityKind::Method(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn field_type(&self) -> Option<&Type> {
        match &self.kind {
            EntityKind::Field(ty) => Some(ty),
            _ => None,
        }
    }
}
