use crate::block::{BasicBlock, BlockId};
use crate::entity::EntityId;
use crate::types::MethodType;
use crate::values::{TempId, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Graph of a method or free function, keyed in the program by its entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub entity: EntityId,
    pub signature: MethodType,
    pub body: FunctionBody,
}

impl Function {
    pub fn new(entity: EntityId, signature: MethodType) -> Self {
        Self {
            entity,
            signature,
            body: FunctionBody::new(),
        }
    }

    pub fn entry_block(&self) -> BlockId {
        self.body.entry_block
    }

    pub fn instruction_count(&self) -> usize {
        self.body
            .blocks
            .values()
            .map(|block| block.instructions.len())
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionBody {
    pub entry_block: BlockId,
    pub blocks: IndexMap<BlockId, BasicBlock>,
    next_block_id: u32,
    next_temp_id: u32,
}

impl FunctionBody {
    pub fn new() -> Self {
        let entry = BlockId(0);
        let mut blocks = IndexMap::new();
        blocks.insert(entry, BasicBlock::new(entry));

        Self {
            entry_block: entry,
            blocks,
            next_block_id: 1,
            next_temp_id: 0,
        }
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.insert(id, BasicBlock::new(id));
        id
    }

    /// Returns the block with the given id, creating it when missing.
    pub fn ensure_block(&mut self, id: BlockId) -> &mut BasicBlock {
        if id.0 >= self.next_block_id {
            self.next_block_id = id.0 + 1;
        }
        self.blocks.entry(id).or_insert_with(|| BasicBlock::new(id))
    }

    pub fn get_block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    pub fn get_block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(&id)
    }

    pub fn new_temp(&mut self) -> Value {
        let id = TempId(self.next_temp_id);
        self.next_temp_id += 1;
        Value::Temp(id)
    }

    /// Makes sure temps created later do not collide with `temp`.
    pub fn reserve_temp(&mut self, temp: TempId) {
        if temp.0 >= self.next_temp_id {
            self.next_temp_id = temp.0 + 1;
        }
    }

    pub fn temp_count(&self) -> u32 {
        self.next_temp_id
    }
}

impl Default for FunctionBody {
    fn default() -> Self {
        Self::new()
    }
}
