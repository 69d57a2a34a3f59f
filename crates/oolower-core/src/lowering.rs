/*! Rewrites OO operations into loads, stores and plain calls.
 *
 * The pass runs once per program. It first makes sure every concrete class has a vtable
 * entity, computes the layout, and emits vtables, itables and RTTI records as static data.
 * Then every graph is rewritten: method calls become direct calls or loads through the
 * vtable or itable, allocations become `calloc` calls that install the vptr, and array and
 * type-test operations become runtime-helper calls or pointer arithmetic.
 */

use crate::callsite::{CallBindingOverrides, CallSiteId};
use crate::class::ClassId;
use crate::config::LoweringConfig;
use crate::data::{DataId, DataItem, StaticData};
use crate::dispatch::{InterfaceCallType, ItableIndirection};
use crate::entity::{EntityId, Owner};
use crate::function::FunctionBody;
use crate::instructions::{Callee, Instruction, RuntimeHelper};
use crate::layout::{ClassLayout, LayoutBuilder, ProgramLayout, SlotTarget, VTABLE_ITABLE_INDEX};
use crate::program::Program;
use crate::registry::{Binding, OoRegistry};
use crate::types::Type;
use crate::values::Value;
use crate::{OoError, Result};
use serde::Serialize;

/// Counters describing what a lowering run rewrote and emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoweringReport {
    pub static_calls: usize,
    pub dynamic_calls: usize,
    pub interface_calls: usize,
    /// Calls made static by a call-site override.
    pub overridden_calls: usize,
    pub allocations: usize,
    pub array_allocations: usize,
    pub array_lengths: usize,
    pub field_accesses: usize,
    pub instance_checks: usize,
    pub vtables: usize,
    pub itables: usize,
    pub rtti_records: usize,
}

/// Binding of `method` once `Unknown` has been resolved from the owner and the final flags.
pub fn effective_binding(program: &Program, registry: &OoRegistry, method: EntityId) -> Binding {
    let declared = registry.entity_binding(method);
    if declared != Binding::Unknown {
        return declared;
    }
    match program.entity(method).owner {
        Owner::Global => Binding::Static,
        Owner::Class(class) => {
            if registry.class_is_interface(class) {
                Binding::Interface
            } else if (registry.method_is_final(method) || registry.class_is_final(class))
                && !registry.method_is_abstract(method)
            {
                Binding::Static
            } else {
                Binding::Dynamic
            }
        }
    }
}

fn item_for(target: SlotTarget) -> DataItem {
    match target {
        SlotTarget::Method(method) => DataItem::Address(method),
        SlotTarget::Trap => DataItem::Trap,
        SlotTarget::Empty => DataItem::Null,
    }
}

pub struct OoLowering<'a> {
    registry: &'a mut OoRegistry,
    overrides: &'a CallBindingOverrides,
    config: LoweringConfig,
}

impl<'a> OoLowering<'a> {
    pub fn new(
        registry: &'a mut OoRegistry,
        overrides: &'a CallBindingOverrides,
        config: &LoweringConfig,
        interface_call_type: InterfaceCallType,
    ) -> Self {
        let mut config = config.clone();
        config.interface_call_type = interface_call_type;
        Self {
            registry,
            overrides,
            config,
        }
    }

    /// Lowers `program` in place. A failed run leaves the program and the registry untouched.
    pub fn run(&mut self, program: &mut Program) -> Result<LoweringReport> {
        if program.is_lowered() {
            return Err(OoError::AlreadyLowered(program.name.clone()));
        }

        let mut staged = program.clone();
        let registry = self.registry.clone();
        match self.lower_staged(&mut staged) {
            Ok(report) => {
                *program = staged;
                Ok(report)
            }
            Err(e) => {
                *self.registry = registry;
                tracing::debug!(target: "lowering", program = %program.name, error = %e, "lowering rolled back");
                Err(e)
            }
        }
    }

    fn lower_staged(&mut self, program: &mut Program) -> Result<LoweringReport> {
        self.create_missing_vtables(program);
        let layout = LayoutBuilder::new(program, self.registry, &self.config).build()?;

        let mut report = LoweringReport::default();
        self.emit_class_data(program, &layout, &mut report);

        let mut functions = program.take_functions();
        let rewritten = functions
            .values_mut()
            .try_for_each(|function| self.lower_body(program, &layout, &mut function.body, &mut report));
        program.restore_functions(functions);
        rewritten?;

        program.mark_lowered();

        tracing::info!(
            target: "lowering",
            program = %program.name,
            policy = %self.config.interface_call_type,
            static_calls = report.static_calls,
            dynamic_calls = report.dynamic_calls,
            interface_calls = report.interface_calls,
            vtables = report.vtables,
            "program lowered"
        );

        Ok(report)
    }

    fn create_missing_vtables(&mut self, program: &mut Program) {
        if !self.config.create_missing_vtables {
            return;
        }
        let classes: Vec<ClassId> = program.class_ids().collect();
        for class in classes {
            if self.registry.class_is_interface(class)
                || self.registry.class_is_extern(class)
                || self.registry.class_vtable_entity(class).is_some()
            {
                continue;
            }
            let name = format!("{}$vtable", program.class(class).name);
            let entity = program.add_data_entity(Owner::Global, &name);
            self.registry.set_class_vtable_entity(class, Some(entity));
            tracing::trace!(target: "lowering", entity = %name, "created vtable entity");
        }
    }

    fn emit_class_data(&self, program: &mut Program, layout: &ProgramLayout, report: &mut LoweringReport) {
        let class_ids: Vec<ClassId> = program.class_ids().collect();

        if self.config.emit_rtti {
            for &class in &class_ids {
                if let Some(rtti) = self.registry.class_rtti_entity(class) {
                    let data = self.rtti_record(program, class);
                    let id = program.add_data(data);
                    program.set_initializer(rtti, id);
                    report.rtti_records += 1;
                }
            }
        }

        for class_layout in layout.classes() {
            let class = class_layout.class;
            let Some(vtable) = self.registry.class_vtable_entity(class) else {
                continue;
            };
            if class_layout.is_interface {
                tracing::warn!(
                    target: "lowering",
                    class = %program.class(class).name,
                    "interface has a vtable entity, ignoring it"
                );
                continue;
            }
            if self.registry.class_is_extern(class) {
                continue;
            }

            let rtti_item = match self.registry.class_rtti_entity(class) {
                Some(rtti) if self.config.emit_rtti => DataItem::Address(rtti),
                _ => DataItem::Null,
            };
            let itable_item = match self.emit_itable(program, class_layout) {
                Some(itable) => {
                    report.itables += 1;
                    DataItem::DataRef(itable)
                }
                None => DataItem::Null,
            };

            let mut items = vec![rtti_item, itable_item];
            items.extend(class_layout.vtable.iter().map(|slot| item_for(slot.target)));

            let name = program.entity(vtable).ld_name.clone();
            let id = program.add_data(StaticData::with_items(name, items));
            program.set_initializer(vtable, id);
            report.vtables += 1;
        }
    }

    fn rtti_record(&self, program: &Program, class: ClassId) -> StaticData {
        let class_type = program.class(class);
        let mut items = vec![
            DataItem::Int(i64::from(self.registry.class_uid(class))),
            DataItem::Str(class_type.name.clone()),
            DataItem::Int(class_type.supertypes.len() as i64),
        ];
        items.extend(class_type.supertypes.iter().map(|&sup| {
            match self.registry.class_rtti_entity(sup) {
                Some(rtti) => DataItem::Address(rtti),
                None => DataItem::Int(i64::from(self.registry.class_uid(sup))),
            }
        }));
        StaticData::with_items(format!("{}$rtti", class_type.name), items)
    }

    fn emit_itable(&self, program: &mut Program, class_layout: &ClassLayout) -> Option<DataId> {
        let class_name = program.class(class_layout.class).name.clone();
        match self.config.interface_call_type {
            InterfaceCallType::RuntimeLookup => None,
            InterfaceCallType::SearchedItable { indirection } => {
                let mut items = Vec::new();
                for entry in &class_layout.itable {
                    let interface_name = program.class(entry.interface).name.clone();
                    let methods = StaticData::with_items(
                        format!("{}$itable${}", class_name, interface_name),
                        entry.methods.iter().map(|&(_, target)| item_for(target)).collect(),
                    );
                    let methods = program.add_data(methods);
                    let pointer = match indirection {
                        ItableIndirection::Direct => methods,
                        ItableIndirection::MethodToFunction => program.add_data(StaticData::with_items(
                            format!("{}$m2f${}", class_name, interface_name),
                            vec![DataItem::DataRef(methods)],
                        )),
                    };
                    items.push(DataItem::Int(i64::from(self.registry.class_uid(entry.interface))));
                    items.push(DataItem::DataRef(pointer));
                }
                items.push(DataItem::Int(0));
                items.push(DataItem::Null);
                Some(program.add_data(StaticData::with_items(format!("{}$itable", class_name), items)))
            }
            InterfaceCallType::IndexedItable => {
                let items = class_layout.indexed_itable.iter().map(|&t| item_for(t)).collect();
                Some(program.add_data(StaticData::with_items(format!("{}$itable", class_name), items)))
            }
        }
    }

    fn lower_body(
        &self,
        program: &Program,
        layout: &ProgramLayout,
        body: &mut FunctionBody,
        report: &mut LoweringReport,
    ) -> Result<()> {
        let block_ids: Vec<_> = body.blocks.keys().copied().collect();
        for block_id in block_ids {
            let original = match body.get_block_mut(block_id) {
                Some(block) => std::mem::take(&mut block.instructions),
                None => continue,
            };
            let mut lowered = Vec::with_capacity(original.len());
            for inst in original {
                let mut emitter = Emitter {
                    body: &mut *body,
                    out: &mut lowered,
                };
                self.lower_instruction(program, layout, inst, &mut emitter, report)?;
            }
            if let Some(block) = body.get_block_mut(block_id) {
                block.instructions = lowered;
            }
        }
        Ok(())
    }

    fn lower_instruction(
        &self,
        program: &Program,
        layout: &ProgramLayout,
        inst: Instruction,
        emitter: &mut Emitter<'_>,
        report: &mut LoweringReport,
    ) -> Result<()> {
        match inst {
            Instruction::Call {
                result,
                callee: Callee::Dynamic(method),
                args,
                site,
            } => self.lower_method_call(program, layout, result, method, args, site, emitter, report),
            Instruction::Call {
                callee: Callee::Static(_),
                ..
            } => {
                report.static_calls += 1;
                emitter.push(inst);
                Ok(())
            }
            Instruction::Alloc { result, class } => {
                self.lower_alloc(program, layout, result, class, emitter)?;
                report.allocations += 1;
                Ok(())
            }
            Instruction::AllocArray {
                result,
                element,
                count,
            } => {
                self.lower_alloc_array(result, &element, count, emitter);
                report.array_allocations += 1;
                Ok(())
            }
            Instruction::ArrayLength { result, array } => {
                let length_size = self.config.array_length_size;
                let address = emitter.offset(array, -i64::from(length_size));
                emitter.push(Instruction::Load {
                    result,
                    address,
                    ty: Type::Int((length_size * 8) as u16),
                });
                report.array_lengths += 1;
                Ok(())
            }
            Instruction::InstanceOf {
                result,
                object,
                class,
            } => {
                let uid = i64::from(self.registry.class_uid(class));
                emitter.push(Instruction::CallRuntime {
                    result: Some(result),
                    helper: RuntimeHelper::InstanceOf,
                    args: vec![object, Value::int(uid)],
                });
                report.instance_checks += 1;
                Ok(())
            }
            Instruction::Member { result, object, field } => {
                let entity = program.entity(field);
                let offset = entity
                    .owner
                    .class()
                    .and_then(|owner| layout.class(owner))
                    .and_then(|class_layout| class_layout.field_offset(field))
                    .ok_or_else(|| OoError::UnknownEntity(entity.ld_name.clone()))?;
                emitter.push(Instruction::Offset {
                    result,
                    base: object,
                    offset: i64::from(offset),
                });
                report.field_accesses += 1;
                Ok(())
            }
            Instruction::SizeOf { result, class } => {
                let size = self.class_layout(program, layout, class)?.instance_size;
                emitter.push(Instruction::Copy {
                    result,
                    value: Value::int(i64::from(size)),
                });
                Ok(())
            }
            other => {
                emitter.push(other);
                Ok(())
            }
        }
    }

    fn class_layout<'l>(
        &self,
        program: &Program,
        layout: &'l ProgramLayout,
        class: ClassId,
    ) -> Result<&'l ClassLayout> {
        layout
            .class(class)
            .ok_or_else(|| OoError::UnknownClass(program.class(class).name.clone()))
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_method_call(
        &self,
        program: &Program,
        layout: &ProgramLayout,
        result: Option<Value>,
        method: EntityId,
        args: Vec<Value>,
        site: CallSiteId,
        emitter: &mut Emitter<'_>,
        report: &mut LoweringReport,
    ) -> Result<()> {
        let entity = program.entity(method);
        let owner_is_interface = entity
            .owner
            .class()
            .map(|class| self.registry.class_is_interface(class))
            .unwrap_or(false);
        let is_abstract = self.registry.method_is_abstract(method);

        let binding = effective_binding(program, self.registry, method);
        let mut resolved = self.overrides.resolve(site, binding);
        if resolved == Binding::Static && is_abstract {
            tracing::warn!(
                target: "lowering",
                method = %entity.ld_name,
                site = %site,
                "static binding requested for abstract method, dispatching dynamically"
            );
            resolved = if owner_is_interface {
                Binding::Interface
            } else {
                Binding::Dynamic
            };
        }
        if resolved == Binding::Interface && !owner_is_interface {
            resolved = Binding::Dynamic;
        }

        let direct = |emitter: &mut Emitter<'_>, result: Option<Value>, args: Vec<Value>| {
            emitter.push(Instruction::Call {
                result,
                callee: Callee::Static(method),
                args,
                site,
            });
        };

        match resolved {
            Binding::Static | Binding::Unknown => {
                if binding != Binding::Static {
                    report.overridden_calls += 1;
                }
                report.static_calls += 1;
                direct(emitter, result, args);
                Ok(())
            }
            Binding::Dynamic => {
                let Some(slot) = layout.slot_of(method) else {
                    if is_abstract {
                        return Err(OoError::MissingVtableSlot(entity.ld_name.clone()));
                    }
                    // Excluded or omitted from the vtable: nothing to dispatch on.
                    report.static_calls += 1;
                    direct(emitter, result, args);
                    return Ok(());
                };
                let receiver = Self::receiver(&args, &entity.ld_name)?;
                let owner = entity
                    .owner
                    .class()
                    .ok_or_else(|| OoError::InvalidCall(format!("{} has no owner class", entity.ld_name)))?;
                let class_layout = self.class_layout(program, layout, owner)?;

                let vptr = self.load_vptr(Some(class_layout), receiver, emitter);
                let slot_address = emitter.offset(vptr, layout.vtable_offset(slot));
                let function = emitter.load(slot_address, Type::Pointer);
                emitter.push(Instruction::Call {
                    result,
                    callee: Callee::Indirect(function),
                    args,
                    site,
                });
                report.dynamic_calls += 1;
                Ok(())
            }
            Binding::Interface => {
                let function = self.interface_function(program, layout, method, &args, emitter)?;
                emitter.push(Instruction::Call {
                    result,
                    callee: Callee::Indirect(function),
                    args,
                    site,
                });
                report.interface_calls += 1;
                Ok(())
            }
        }
    }

    fn receiver(args: &[Value], method_name: &str) -> Result<Value> {
        args.first()
            .cloned()
            .ok_or_else(|| OoError::InvalidCall(format!("call to {} without a receiver", method_name)))
    }

    /// Address of the function an interface call should jump to.
    fn interface_function(
        &self,
        program: &Program,
        layout: &ProgramLayout,
        method: EntityId,
        args: &[Value],
        emitter: &mut Emitter<'_>,
    ) -> Result<Value> {
        let entity = program.entity(method);
        let receiver = Self::receiver(args, &entity.ld_name)?;
        let interface = entity
            .owner
            .class()
            .ok_or_else(|| OoError::NotAnInterfaceMethod(entity.ld_name.clone()))?;
        let index = layout
            .interface_method_index(method)
            .ok_or_else(|| OoError::NotAnInterfaceMethod(entity.ld_name.clone()))?;
        let uid = i64::from(self.registry.class_uid(interface));
        let pointer_size = i64::from(self.config.pointer_size);

        let function = match self.config.interface_call_type {
            InterfaceCallType::RuntimeLookup => {
                let function = emitter.temp();
                emitter.push(Instruction::CallRuntime {
                    result: Some(function.clone()),
                    helper: RuntimeHelper::LookupInterfaceMethod,
                    args: vec![receiver, Value::int(uid), Value::int(index as i64)],
                });
                function
            }
            InterfaceCallType::SearchedItable { indirection } => {
                let vptr = self.load_vptr(None, receiver, emitter);
                let itable = self.load_itable(vptr, emitter);
                let entry = emitter.temp();
                emitter.push(Instruction::CallRuntime {
                    result: Some(entry.clone()),
                    helper: RuntimeHelper::SearchItable,
                    args: vec![itable, Value::int(uid)],
                });
                let methods = match indirection {
                    ItableIndirection::Direct => entry,
                    ItableIndirection::MethodToFunction => emitter.load(entry, Type::Pointer),
                };
                let slot_address = emitter.offset(methods, index as i64 * pointer_size);
                emitter.load(slot_address, Type::Pointer)
            }
            InterfaceCallType::IndexedItable => {
                let slot = layout
                    .interface_slot(method)
                    .ok_or_else(|| OoError::NotAnInterfaceMethod(entity.ld_name.clone()))?;
                let vptr = self.load_vptr(None, receiver, emitter);
                let itable = self.load_itable(vptr, emitter);
                let slot_address = emitter.offset(itable, slot as i64 * pointer_size);
                emitter.load(slot_address, Type::Pointer)
            }
        };
        Ok(function)
    }

    fn load_itable(&self, vptr: Value, emitter: &mut Emitter<'_>) -> Value {
        let offset = (VTABLE_ITABLE_INDEX as i64) * i64::from(self.config.pointer_size);
        let address = emitter.offset(vptr, offset);
        emitter.load(address, Type::Pointer)
    }

    /// Address of the vptr inside `object`. Without a class layout the vptr is assumed at offset 0.
    fn vptr_address(&self, class_layout: Option<&ClassLayout>, object: Value, emitter: &mut Emitter<'_>) -> Value {
        match class_layout.and_then(|layout| layout.vptr_offset) {
            Some(offset) if offset != 0 => emitter.offset(object, i64::from(offset)),
            _ => object,
        }
    }

    fn load_vptr(&self, class_layout: Option<&ClassLayout>, object: Value, emitter: &mut Emitter<'_>) -> Value {
        let address = self.vptr_address(class_layout, object, emitter);
        emitter.load(address, Type::Pointer)
    }

    fn lower_alloc(
        &self,
        program: &Program,
        layout: &ProgramLayout,
        result: Value,
        class: ClassId,
        emitter: &mut Emitter<'_>,
    ) -> Result<()> {
        let class_layout = self.class_layout(program, layout, class)?;
        if self.registry.class_is_abstract(class) || class_layout.is_interface {
            tracing::warn!(
                target: "lowering",
                class = %program.class(class).name,
                "allocating an abstract class"
            );
        }

        emitter.push(Instruction::CallRuntime {
            result: Some(result.clone()),
            helper: RuntimeHelper::Calloc,
            args: vec![Value::int(1), Value::int(i64::from(class_layout.instance_size))],
        });

        if let Some(vtable) = self.registry.class_vtable_entity(class) {
            let vtable_address = emitter.temp();
            emitter.push(Instruction::AddressOf {
                result: vtable_address.clone(),
                entity: vtable,
            });
            let vptr_address = self.vptr_address(Some(class_layout), result, emitter);
            emitter.push(Instruction::Store {
                address: vptr_address,
                value: vtable_address,
                ty: Type::Pointer,
            });
        }
        Ok(())
    }

    /// Arrays carry their length in the word right before the first element. Padding is a
    /// whole number of elements so the data stays aligned.
    fn lower_alloc_array(&self, result: Value, element: &Type, count: Value, emitter: &mut Emitter<'_>) {
        let length_size = self.config.array_length_size;
        let element_size = element.size_bytes(self.config.pointer_size).max(1);
        let padding_elements = (length_size + element_size - 1) / element_size;
        let data_offset = i64::from(padding_elements * element_size);
        let size_type = Type::Uint((self.config.pointer_size * 8) as u16);

        let total = emitter.temp();
        emitter.push(Instruction::Add {
            result: total.clone(),
            left: count.clone(),
            right: Value::int(i64::from(padding_elements)),
            ty: size_type.clone(),
        });
        let bytes = emitter.temp();
        emitter.push(Instruction::Mul {
            result: bytes.clone(),
            left: total,
            right: Value::int(i64::from(element_size)),
            ty: size_type,
        });
        let raw = emitter.temp();
        emitter.push(Instruction::CallRuntime {
            result: Some(raw.clone()),
            helper: RuntimeHelper::Calloc,
            args: vec![Value::int(1), bytes],
        });
        let length_address = emitter.offset(raw.clone(), data_offset - i64::from(length_size));
        emitter.push(Instruction::Store {
            address: length_address,
            value: count,
            ty: Type::Int((length_size * 8) as u16),
        });
        emitter.push(Instruction::Offset {
            result,
            base: raw,
            offset: data_offset,
        });
    }
}

/// Appends rewritten instructions and hands out fresh temps.
struct Emitter<'b> {
    body: &'b mut FunctionBody,
    out: &'b mut Vec<Instruction>,
}

impl Emitter<'_> {
    fn push(&mut self, inst: Instruction) {
        self.out.push(inst);
    }

    fn temp(&mut self) -> Value {
        self.body.new_temp()
    }

    fn offset(&mut self, base: Value, offset: i64) -> Value {
        let result = self.temp();
        self.push(Instruction::Offset {
            result: result.clone(),
            base,
            offset,
        });
        result
    }

    fn load(&mut self, address: Value, ty: Type) -> Value {
        let result = self.temp();
        self.push(Instruction::Load {
            result: result.clone(),
            address,
            ty,
        });
        result
    }
}
