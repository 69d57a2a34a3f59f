use crate::entity::EntityId;
use cranelift_entity::entity_impl;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataId(u32);
entity_impl!(DataId, "data");

/// One pointer-sized word of a static data blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataItem {
    Null,
    Int(i64),
    Str(String),
    /// Address of a function or data entity.
    Address(EntityId),
    /// Address of another anonymous blob.
    DataRef(DataId),
    /// Address of the abstract-method trap handler.
    Trap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticData {
    pub name: String,
    pub items: Vec<DataItem>,
}

impl StaticData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn with_items(name: impl Into<String>, items: Vec<DataItem>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }

    pub fn push(&mut self, item: DataItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
