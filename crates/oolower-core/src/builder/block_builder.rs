use crate::{
    block::{BlockId, Terminator},
    callsite::CallSiteId,
    class::ClassId,
    entity::EntityId,
    function::FunctionBody,
    instructions::{Callee, Instruction, RuntimeHelper},
    program::Program,
    types::Type,
    values::Value,
    OoError, Result,
};

/// Result of emitting a call: the value it produces and the site it was registered under.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub result: Option<Value>,
    pub site: CallSiteId,
}

pub struct BlockBuilder<'a> {
    pub block_id: BlockId,
    body: &'a mut FunctionBody,
    program: &'a mut Program,
}

impl<'a> BlockBuilder<'a> {
    pub fn new(block_id: BlockId, body: &'a mut FunctionBody, program: &'a mut Program) -> Self {
        body.ensure_block(block_id);
        Self {
            block_id,
            body,
            program,
        }
    }

    fn push_instruction(&mut self, inst: Instruction) {
        self.body.ensure_block(self.block_id).add_instruction(inst);
    }

    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    pub fn new_temp(&mut self) -> Value {
        self.body.new_temp()
    }

    pub fn add(&mut self, left: Value, right: Value, ty: Type) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::Add {
            result: result.clone(),
            left,
            right,
            ty,
        });
        result
    }

    pub fn sub(&mut self, left: Value, right: Value, ty: Type) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::Sub {
            result: result.clone(),
            left,
            right,
            ty,
        });
        result
    }

    pub fn mul(&mut self, left: Value, right: Value, ty: Type) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::Mul {
            result: result.clone(),
            left,
            right,
            ty,
        });
        result
    }

    pub fn eq(&mut self, left: Value, right: Value) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::Eq {
            result: result.clone(),
            left,
            right,
        });
        result
    }

    pub fn copy(&mut self, value: Value) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::Copy {
            result: result.clone(),
            value,
        });
        result
    }

    pub fn load(&mut self, address: Value, ty: Type) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::Load {
            result: result.clone(),
            address,
            ty,
        });
        result
    }

    pub fn store(&mut self, address: Value, value: Value, ty: Type) {
        self.push_instruction(Instruction::Store { address, value, ty });
    }

    pub fn address_of(&mut self, entity: EntityId) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::AddressOf {
            result: result.clone(),
            entity,
        });
        result
    }

    pub fn member(&mut self, object: Value, field: EntityId) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::Member {
            result: result.clone(),
            object,
            field,
        });
        result
    }

    pub fn offset(&mut self, base: Value, offset: i64) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::Offset {
            result: result.clone(),
            base,
            offset,
        });
        result
    }

    pub fn size_of(&mut self, class: ClassId) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::SizeOf {
            result: result.clone(),
            class,
        });
        result
    }

    pub fn alloc(&mut self, class: ClassId) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::Alloc {
            result: result.clone(),
            class,
        });
        result
    }

    pub fn alloc_array(&mut self, element: Type, count: Value) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::AllocArray {
            result: result.clone(),
            element,
            count,
        });
        result
    }

    pub fn array_length(&mut self, array: Value) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::ArrayLength {
            result: result.clone(),
            array,
        });
        result
    }

    pub fn instance_of(&mut self, object: Value, class: ClassId) -> Value {
        let result = self.new_temp();
        self.push_instruction(Instruction::InstanceOf {
            result: result.clone(),
            object,
            class,
        });
        result
    }

    fn call(&mut self, callee: Callee, args: Vec<Value>, has_result: bool) -> CallSite {
        let result = has_result.then(|| self.new_temp());
        let site = self.program.new_call_site();
        self.push_instruction(Instruction::Call {
            result: result.clone(),
            callee,
            args,
            site,
        });
        CallSite { result, site }
    }

    fn returns_value(&self, entity: EntityId) -> bool {
        self.program
            .entity(entity)
            .signature()
            .map(|sig| sig.has_result())
            .unwrap_or(false)
    }

    /// Direct call to `entity`.
    pub fn call_static(&mut self, entity: EntityId, args: Vec<Value>) -> CallSite {
        let has_result = self.returns_value(entity);
        self.call(Callee::Static(entity), args, has_result)
    }

    /// Method call dispatched on the receiver in `args[0]`.
    pub fn call_method(&mut self, method: EntityId, args: Vec<Value>) -> CallSite {
        let has_result = self.returns_value(method);
        self.call(Callee::Dynamic(method), args, has_result)
    }

    pub fn call_indirect(&mut self, target: Value, args: Vec<Value>, has_result: bool) -> CallSite {
        self.call(Callee::Indirect(target), args, has_result)
    }

    pub fn call_runtime(&mut self, helper: RuntimeHelper, args: Vec<Value>, has_result: bool) -> Option<Value> {
        let result = has_result.then(|| self.new_temp());
        self.push_instruction(Instruction::CallRuntime {
            result: result.clone(),
            helper,
            args,
        });
        result
    }

    pub fn jump(&mut self, target: BlockId) -> Result<()> {
        self.seal_with_terminator(Terminator::Jump(target))
    }

    pub fn branch(&mut self, condition: Value, then_block: BlockId, else_block: BlockId) -> Result<()> {
        self.seal_with_terminator(Terminator::Branch {
            condition,
            then_block,
            else_block,
        })
    }

    pub fn return_value(&mut self, value: Value) -> Result<()> {
        self.seal_with_terminator(Terminator::Return(Some(value)))
    }

    pub fn return_void(&mut self) -> Result<()> {
        self.seal_with_terminator(Terminator::Return(None))
    }

    pub fn unreachable(&mut self) -> Result<()> {
        self.seal_with_terminator(Terminator::Unreachable)
    }

    pub fn is_sealed(&mut self) -> bool {
        self.body.ensure_block(self.block_id).is_terminated()
    }

    pub fn seal_with_terminator(&mut self, terminator: Terminator) -> Result<()> {
        let block = self.body.ensure_block(self.block_id);
        if block.is_terminated() {
            return Err(OoError::BuilderError(format!(
                "Block {} is already terminated",
                self.block_id
            )));
        }
        block.set_terminator(terminator);
        Ok(())
    }
}
