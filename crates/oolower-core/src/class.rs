use crate::entity::EntityId;
use cranelift_entity::entity_impl;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(u32);
entity_impl!(ClassId, "class");

/// A nominal class or interface type.
///
/// Supertypes keep declaration order. The first supertype that is not an interface is the
/// primary superclass whose vtable prefix the class shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassType {
    pub name: String,
    pub supertypes: Vec<ClassId>,
    pub subtypes: Vec<ClassId>,
    pub members: Vec<EntityId>,
}

impl ClassType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supertypes: Vec::new(),
            subtypes: Vec::new(),
            members: Vec::new(),
        }
    }
}
