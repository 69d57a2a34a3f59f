use crate::block::BlockId;
use crate::builder::ProgramBuilder;
use crate::class::ClassId;
use crate::data::DataItem;
use crate::dispatch::InterfaceCallType;
use crate::entity::EntityId;
use crate::instructions::{Callee, Instruction, RuntimeHelper};
use crate::layout::SlotTarget;
use crate::program::Program;
use crate::session::OoSession;
use crate::types::{MethodType, Type};
use crate::values::{ParamId, TempId, Value};
use pretty_assertions::assert_eq;

fn sig() -> MethodType {
    MethodType::new(vec![Type::Pointer], vec![Type::Int(32)])
}

struct Fixture {
    program: Program,
    session: OoSession,
    class: ClassId,
    interface_method: EntityId,
    implementation: EntityId,
    main: EntityId,
}

/// `A implements I`; `main(p0: A)` makes a virtual call to `A.f` and then an interface call to `I.m`.
fn fixture(policy: InterfaceCallType) -> Fixture {
    let mut builder = ProgramBuilder::new("interfaces");
    let mut iface = builder.interface("I");
    iface.uid(7);
    let i = iface.id();
    let interface_method = iface.abstract_method("m", sig());

    let mut class_a = builder.class("A");
    class_a.implements(i).uid(1);
    let class = class_a.id();
    let implementation = class_a.override_method(interface_method);
    let virtual_method = class_a.method("f", sig());

    let main = builder.global_function("main", MethodType::new(vec![Type::Class(class)], vec![]));
    let mut func = builder.function(main).unwrap();
    let receiver = func.param(0);
    let mut entry = func.entry_block();
    entry.call_method(virtual_method, vec![receiver.clone()]);
    entry.call_method(interface_method, vec![receiver]);
    entry.return_void().unwrap();
    func.build().unwrap();

    builder.session_mut().set_interface_call_type(policy);
    let (program, session) = builder.finish();
    Fixture {
        program,
        session,
        class,
        interface_method,
        implementation,
        main,
    }
}

fn lowered(policy: InterfaceCallType) -> (Fixture, Vec<Instruction>) {
    let mut fixture = fixture(policy);
    fixture.session.lower_program(&mut fixture.program).unwrap();
    let instructions = fixture
        .program
        .function(fixture.main)
        .unwrap()
        .body
        .get_block(BlockId(0))
        .unwrap()
        .instructions
        .clone();
    (fixture, instructions)
}

fn count_loads(instructions: &[Instruction]) -> usize {
    instructions
        .iter()
        .filter(|inst| matches!(inst, Instruction::Load { .. }))
        .count()
}

fn temp(n: u32) -> Value {
    Value::Temp(TempId(n))
}

#[test]
fn test_runtime_lookup_calls_helper() {
    let (_, instructions) = lowered(InterfaceCallType::RuntimeLookup);

    // The virtual call takes the first four instructions.
    assert_eq!(
        instructions[4],
        Instruction::CallRuntime {
            result: Some(temp(5)),
            helper: RuntimeHelper::LookupInterfaceMethod,
            args: vec![Value::Param(ParamId(0)), Value::int(7), Value::int(0)],
        }
    );
    assert!(matches!(
        &instructions[5],
        Instruction::Call { callee: Callee::Indirect(target), .. } if *target == temp(5)
    ));
    assert_eq!(instructions.len(), 6);
}

#[test]
fn test_policy_only_changes_interface_calls() {
    let (_, searched) = lowered(InterfaceCallType::SEARCHED_ITABLE);
    let (_, indexed) = lowered(InterfaceCallType::IndexedItable);
    let (_, lookup) = lowered(InterfaceCallType::RuntimeLookup);

    assert_eq!(searched[..4].to_vec(), indexed[..4].to_vec());
    assert_eq!(searched[..4].to_vec(), lookup[..4].to_vec());
    assert_ne!(searched[4..].to_vec(), indexed[4..].to_vec());
}

#[test]
fn test_searched_itable_uses_search_helper() {
    let (_, instructions) = lowered(InterfaceCallType::SEARCHED_ITABLE);
    let interface_part = &instructions[4..];

    assert!(interface_part.iter().any(|inst| matches!(
        inst,
        Instruction::CallRuntime {
            helper: RuntimeHelper::SearchItable,
            args,
            ..
        } if args[1] == Value::int(7)
    )));
    // vptr, itable pointer, method pointer
    assert_eq!(count_loads(interface_part), 3);
}

#[test]
fn test_m2f_adds_exactly_one_load() {
    let (_, direct) = lowered(InterfaceCallType::SEARCHED_ITABLE);
    let (_, m2f) = lowered(InterfaceCallType::SEARCHED_ITABLE_M2F);

    assert_eq!(count_loads(&m2f), count_loads(&direct) + 1);
    assert_eq!(m2f.len(), direct.len() + 1);
}

#[test]
fn test_indexed_itable_loads_program_wide_slot() {
    let (fixture, instructions) = lowered(InterfaceCallType::IndexedItable);
    let interface_part = &instructions[4..];

    assert_eq!(count_loads(interface_part), 3);
    assert!(interface_part.iter().all(|inst| !matches!(inst, Instruction::CallRuntime { .. })));
    assert!(interface_part.contains(&Instruction::Offset {
        result: temp(6),
        base: temp(5),
        offset: 8,
    }));
}

#[test]
fn test_interface_call_reads_vptr_where_alloc_stores_it() {
    let mut builder = ProgramBuilder::new("late_vptr");
    let mut iface = builder.interface("I");
    iface.uid(7);
    let i = iface.id();
    let interface_method = iface.abstract_method("m", sig());

    let mut class_a = builder.class("A");
    class_a.implements(i).uid(1);
    let class = class_a.id();
    class_a.field("x", Type::Int(64));
    class_a.vptr_field("$vptr");
    class_a.override_method(interface_method);

    let main = builder.global_function("main", MethodType::default());
    let mut func = builder.function(main).unwrap();
    let mut entry = func.entry_block();
    let object = entry.alloc(class);
    entry.call_method(interface_method, vec![object.clone()]);
    entry.return_void().unwrap();
    func.build().unwrap();

    for policy in [
        InterfaceCallType::SEARCHED_ITABLE,
        InterfaceCallType::SEARCHED_ITABLE_M2F,
        InterfaceCallType::IndexedItable,
    ] {
        let mut program = builder.program().clone();
        let mut session = builder.session().clone();
        session.set_interface_call_type(policy);
        session.lower_program(&mut program).unwrap();

        let instructions = &program.function(main).unwrap().body.get_block(BlockId(0)).unwrap().instructions;
        let store = instructions
            .iter()
            .position(|inst| matches!(inst, Instruction::Store { ty: Type::Pointer, .. }))
            .unwrap();
        let Instruction::Store { address: vptr_slot, .. } = &instructions[store] else {
            unreachable!();
        };
        let Some(Instruction::Load { address: vptr_read, .. }) = instructions[store + 1..]
            .iter()
            .find(|inst| matches!(inst, Instruction::Load { .. }))
        else {
            panic!("interface call under {} loads nothing", policy);
        };
        assert_eq!(vptr_slot, &object, "{}", policy);
        assert_eq!(vptr_read, &object, "{}", policy);
    }
}

fn class_itable(program: &Program, class_name: &str) -> Vec<DataItem> {
    let id = program
        .data_by_name(&format!("{}$itable", class_name))
        .unwrap();
    program.data(id).items.clone()
}

#[test]
fn test_searched_itable_data_is_zero_terminated() {
    let (fixture, _) = lowered(InterfaceCallType::SEARCHED_ITABLE);
    let program = &fixture.program;

    let items = class_itable(program, "A");
    assert_eq!(items.len(), 4);
    assert_eq!(items[0], DataItem::Int(7));
    assert_eq!(items[2..].to_vec(), vec![DataItem::Int(0), DataItem::Null]);

    let DataItem::DataRef(methods) = items[1] else {
        panic!("expected a reference to the method block, got {:?}", items[1]);
    };
    assert_eq!(program.data(methods).items, vec![DataItem::Address(fixture.implementation)]);
}

#[test]
fn test_m2f_entries_point_at_patchable_cell() {
    let (fixture, _) = lowered(InterfaceCallType::SEARCHED_ITABLE_M2F);
    let program = &fixture.program;

    let items = class_itable(program, "A");
    let DataItem::DataRef(cell) = items[1] else {
        panic!("expected a reference to the m2f cell");
    };
    assert_eq!(program.data(cell).name, "A$m2f$I");
    let DataItem::DataRef(methods) = program.data(cell).items[0] else {
        panic!("m2f cell must hold the method block");
    };
    assert_eq!(program.data(methods).items, vec![DataItem::Address(fixture.implementation)]);
}

#[test]
fn test_vtable_header_points_at_itable() {
    let (fixture, _) = lowered(InterfaceCallType::IndexedItable);
    let program = &fixture.program;

    let vtable = program.data(program.data_by_name("A$vtable").unwrap());
    let itable = program.data_by_name("A$itable").unwrap();
    assert_eq!(vtable.items[0], DataItem::Null);
    assert_eq!(vtable.items[1], DataItem::DataRef(itable));
    assert_eq!(program.data(itable).items, vec![DataItem::Address(fixture.implementation)]);
}

#[test]
fn test_runtime_lookup_emits_no_itable() {
    let (fixture, _) = lowered(InterfaceCallType::RuntimeLookup);
    assert_eq!(fixture.program.data_by_name("A$itable"), None);
}

#[test]
fn test_indexed_numbering_per_method_entity() {
    let mut builder = ProgramBuilder::new("numbering");
    let mut iface_i = builder.interface("I");
    let i = iface_i.id();
    let i_m = iface_i.abstract_method("m", sig());

    let mut iface_j = builder.interface("J");
    let j = iface_j.id();
    let j_m = iface_j.abstract_method("m", sig());

    let mut iface_k = builder.interface("K");
    iface_k.extends(i);
    let k_m = iface_k.override_method(i_m);
    builder.session_mut().registry_mut().set_method_abstract(k_m, true);

    let mut class_c = builder.class("C");
    class_c.implements(j);
    let c = class_c.id();
    let c_m = class_c.override_method(j_m);

    builder
        .session_mut()
        .set_interface_call_type(InterfaceCallType::IndexedItable);
    let (program, session) = builder.finish();
    let layout = session.compute_layout(&program).unwrap();

    assert_eq!(layout.interface_slot(i_m), Some(0));
    assert_eq!(layout.interface_slot(j_m), Some(1));
    assert_eq!(layout.interface_slot(k_m), Some(0));
    assert_eq!(layout.interface_slot_count(), 2);
    assert_eq!(
        layout.class(c).unwrap().indexed_itable,
        vec![SlotTarget::Empty, SlotTarget::Method(c_m)]
    );
}

#[test]
fn test_default_methods_and_traps() {
    let mut builder = ProgramBuilder::new("defaults");
    let mut iface_i = builder.interface("I");
    let i = iface_i.id();
    let with_default = iface_i.method("hello", sig());
    let without = iface_i.abstract_method("size", sig());

    let mut iface_k = builder.interface("K");
    iface_k.extends(i);
    let k = iface_k.id();
    let refined = iface_k.override_method(with_default);

    let mut class_a = builder.class("A");
    class_a.implements(i);
    let a = class_a.id();

    let mut class_b = builder.class("B");
    class_b.implements(k);
    let b = class_b.id();

    let (program, session) = builder.finish();
    let layout = session.compute_layout(&program).unwrap();

    let a_entry = layout.class(a).unwrap().itable_entry(i).unwrap().clone();
    assert_eq!(
        a_entry.methods,
        vec![
            (with_default, SlotTarget::Method(with_default)),
            (without, SlotTarget::Trap),
        ]
    );

    let b_entry = layout.class(b).unwrap().itable_entry(i).unwrap().clone();
    assert_eq!(b_entry.methods[0], (with_default, SlotTarget::Method(refined)));
}

#[test]
fn test_implementation_inherited_from_superclass() {
    let mut builder = ProgramBuilder::new("inherit-impl");
    let mut iface = builder.interface("I");
    let i = iface.id();
    let i_m = iface.abstract_method("m", sig());

    let mut base = builder.class("Base");
    let base_id = base.id();
    let base_m = base.method("m", sig());

    let mut derived = builder.class("Derived");
    derived.extends(base_id).implements(i);
    let derived_id = derived.id();
    let derived_m = derived.inherit_method(base_m);
    builder.program_mut().add_override(derived_m, i_m);

    let (program, session) = builder.finish();
    let layout = session.compute_layout(&program).unwrap();

    let entry = layout.class(derived_id).unwrap().itable_entry(i).unwrap().clone();
    assert_eq!(entry.methods, vec![(i_m, SlotTarget::Method(base_m))]);
}

#[test]
fn test_rtti_records_link_superclasses() {
    let mut builder = ProgramBuilder::new("rtti");
    let mut class_a = builder.class("A");
    class_a.uid(3);
    let a = class_a.id();
    let a_rtti = class_a.rtti();

    let mut class_b = builder.class("B");
    class_b.extends(a).uid(4);
    let b_rtti = class_b.rtti();

    let (mut program, mut session) = builder.finish();
    let report = session.lower_program(&mut program).unwrap();
    assert_eq!(report.rtti_records, 2);
    assert_eq!(report.vtables, 2);

    let record = program.data(program.entity(b_rtti).initializer.unwrap());
    assert_eq!(
        record.items,
        vec![
            DataItem::Int(4),
            DataItem::Str("B".to_string()),
            DataItem::Int(1),
            DataItem::Address(a_rtti),
        ]
    );

    let vtable = program.data(program.data_by_name("B$vtable").unwrap());
    assert_eq!(vtable.items[0], DataItem::Address(b_rtti));
}
