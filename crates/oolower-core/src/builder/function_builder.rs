use super::BlockBuilder;
use crate::{
    block::BlockId,
    entity::EntityId,
    function::Function,
    program::Program,
    types::MethodType,
    values::{ParamId, Value},
    OoError, Result,
};

pub struct FunctionBuilder<'a> {
    function: Function,
    program: &'a mut Program,
}

impl<'a> FunctionBuilder<'a> {
    pub fn new(entity: EntityId, signature: MethodType, program: &'a mut Program) -> Self {
        Self {
            function: Function::new(entity, signature),
            program,
        }
    }

    pub fn entry_block(&mut self) -> BlockBuilder<'_> {
        let block_id = self.function.body.entry_block;
        BlockBuilder::new(block_id, &mut self.function.body, self.program)
    }

    pub fn create_block(&mut self) -> BlockId {
        self.function.body.create_block()
    }

    pub fn block(&mut self, block_id: BlockId) -> Result<BlockBuilder<'_>> {
        if self.function.body.get_block(block_id).is_none() {
            return Err(OoError::BuilderError(format!(
                "Block {} does not exist in function",
                block_id
            )));
        }
        Ok(BlockBuilder::new(block_id, &mut self.function.body, self.program))
    }

    pub fn param(&self, index: usize) -> Value {
        Value::Param(ParamId(index as u32))
    }

    pub fn current_function(&self) -> &Function {
        &self.function
    }

    /// Installs the graph in the program.
    pub fn build(self) -> Result<EntityId> {
        if let Some((id, _)) = self
            .function
            .body
            .blocks
            .iter()
            .find(|(_, block)| !block.is_terminated())
        {
            return Err(OoError::BuilderError(format!(
                "Block {} of {} has no terminator",
                id,
                self.program.entity(self.function.entity).ld_name
            )));
        }
        let entity = self.function.entity;
        self.program.add_function(self.function);
        Ok(entity)
    }
}
