#![allow(unused_imports)]
#![allow(unused_variables)]

use oolower_core::{
    pass::{DevirtualizationPass, LoweringPass, VerifyLoweredPass},
    persist::{load_program, save_program},
    Callee, DataItem, InterfaceCallType, Instruction, LoweringConfig, MethodType, OoContext, PassManager,
    ProgramBuilder, RtaOptions, Type, Value,
};
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

/// Shapes: `Circle` and `Square` implement `Shape.area`; `main` allocates both and sums areas.
fn shapes(policy: InterfaceCallType) -> (oolower_core::Program, oolower_core::OoSession, oolower_core::EntityId) {
    let mut builder = ProgramBuilder::new("shapes");
    let mut shape = builder.interface("Shape");
    shape.uid(100);
    let shape_id = shape.id();
    let area = shape.abstract_method("area", MethodType::new(vec![Type::Pointer], vec![Type::Int(64)]));

    let mut circle = builder.class("Circle");
    circle.implements(shape_id).uid(101);
    let circle_id = circle.id();
    circle.field("radius", Type::Int(64));
    let circle_area = circle.override_method(area);

    let mut square = builder.class("Square");
    square.implements(shape_id).uid(102).final_class();
    let square_id = square.id();
    square.field("side", Type::Int(64));
    let square_area = square.override_method(area);

    for method in [circle_area, square_area] {
        let mut func = builder.function(method).unwrap();
        func.entry_block().return_value(Value::int(1)).unwrap();
        func.build().unwrap();
    }

    let main = builder.global_function("main", MethodType::new(vec![], vec![Type::Int(64)]));
    let mut func = builder.function(main).unwrap();
    let mut entry = func.entry_block();
    let c = entry.alloc(circle_id);
    let s = entry.alloc(square_id);
    let first = entry.call_method(area, vec![c]).result.unwrap();
    let second = entry.call_method(square_area, vec![s]).result.unwrap();
    let sum = entry.add(first, second, Type::Int(64));
    entry.return_value(sum).unwrap();
    func.build().unwrap();

    builder.session_mut().set_interface_call_type(policy);
    let (program, session) = builder.finish();
    (program, session, main)
}

#[test]
fn test_full_pipeline_lowers_every_object_operation() {
    let (mut program, mut session, main) = shapes(InterfaceCallType::SEARCHED_ITABLE);

    let mut manager = PassManager::new();
    manager.register_pass(DevirtualizationPass::new(RtaOptions::new(vec![main])));
    manager.register_pass(LoweringPass::new());
    manager.register_pass(VerifyLoweredPass);
    manager.run_all(&mut program, &mut session).unwrap();

    let rta = manager.get_pass::<DevirtualizationPass>().unwrap().report().unwrap();
    // Two implementations are live, so the interface call stays an interface call.
    assert_eq!(rta.interface_calls, 1);
    assert_eq!(rta.devirtualized_interface, 0);

    let report = manager.get_pass::<LoweringPass>().unwrap().report().unwrap();
    assert_eq!(report.interface_calls, 1);
    // Square is final, so its method is bound statically.
    assert_eq!(report.static_calls, 1);
    assert_eq!(report.allocations, 2);
    assert_eq!(report.vtables, 2);
    assert_eq!(report.itables, 2);
}

#[test]
fn test_context_lifecycle_drives_lowering() {
    let (mut program, session, _) = shapes(InterfaceCallType::IndexedItable);
    let mut context = OoContext::new();

    let config = LoweringConfig {
        interface_call_type: InterfaceCallType::IndexedItable,
        ..LoweringConfig::default()
    };
    context.init_with_config(config).unwrap();
    *context.session_mut().unwrap().registry_mut() = session.registry().clone();
    assert!(context.init().is_err());

    let report = context.lower_program(&mut program).unwrap();
    assert_eq!(report.interface_calls, 1);

    let itable = program.data(program.data_by_name("Circle$itable").unwrap());
    assert_eq!(itable.items.len(), 1);
    assert!(matches!(itable.items[0], DataItem::Address(_)));

    context.deinit().unwrap();
    context.init().unwrap();
    assert_eq!(
        context.session().unwrap().interface_call_type(),
        InterfaceCallType::RuntimeLookup
    );
}

#[test]
fn test_lowered_program_persists() {
    let (mut program, mut session, main) = shapes(InterfaceCallType::RuntimeLookup);
    session.lower_program(&mut program).unwrap();

    let file = NamedTempFile::new().unwrap();
    save_program(&program, file.path()).unwrap();
    let loaded = load_program(file.path()).unwrap();

    assert!(loaded.is_lowered());
    assert_eq!(
        loaded.function(main).unwrap().instruction_count(),
        program.function(main).unwrap().instruction_count()
    );
    assert_eq!(loaded.data_blobs().count(), program.data_blobs().count());
}
