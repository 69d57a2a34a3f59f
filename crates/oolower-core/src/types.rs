use crate::class::ClassId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Bool,
    Int(u16),
    Uint(u16),
    Pointer,
    /// Reference to an instance of a class. Always pointer sized.
    Class(ClassId),
    /// Reference to a heap array. Always pointer sized.
    Array(Box<Type>),
    Method(Box<MethodType>),
}

impl Type {
    /// Size in bytes on a target with the given pointer width.
    pub fn size_bytes(&self, pointer_size: u32) -> u32 {
        match self {
            Type::Bool => 1,
            Type::Int(bits) | Type::Uint(bits) => (u32::from(*bits) + 7) / 8,
            Type::Pointer | Type::Class(_) | Type::Array(_) | Type::Method(_) => pointer_size,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::Pointer | Type::Class(_) | Type::Array(_) | Type::Method(_)
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int(_) | Type::Uint(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int(bits) => write!(f, "i{}", bits),
            Type::Uint(bits) => write!(f, "u{}", bits),
            Type::Pointer => write!(f, "ptr"),
            Type::Class(id) => write!(f, "{}", id),
            Type::Array(elem) => write!(f, "[{}]", elem),
            Type::Method(sig) => write!(f, "fn{}", sig),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodType {
    pub params: Vec<Type>,
    pub returns: Vec<Type>,
}

impl MethodType {
    pub fn new(params: Vec<Type>, returns: Vec<Type>) -> Self {
        Self { params, returns }
    }

    pub fn has_result(&self) -> bool {
        !self.returns.is_empty()
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")?;
        if !self.returns.is_empty() {
            write!(f, " -> ")?;
            for (i, ret) in self.returns.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", ret)?;
            }
        }
        Ok(())
    }
}
