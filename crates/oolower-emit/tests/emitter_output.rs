use oolower_core::{InterfaceCallType, MethodType, ProgramBuilder, Type, Value};
use oolower_emit::{Emitter, EmitterConfig, LayoutEmitter, ProgramEmitter, VerbosityLevel};
use pretty_assertions::assert_eq;

fn counter_program() -> ProgramBuilder {
    let mut builder = ProgramBuilder::new("counter");
    let counter = builder.class("Counter").uid(3).id();
    let count = builder.class_builder(counter).field("count", Type::Int(32));
    let next = builder
        .class_builder(counter)
        .method("next", MethodType::new(vec![Type::Class(counter)], vec![Type::Int(32)]));

    let main = builder.global_function("main", MethodType::new(vec![], vec![Type::Int(32)]));
    let mut func = builder.function(main).unwrap();
    let mut entry = func.entry_block();
    let object = entry.alloc(counter);
    let field = entry.member(object.clone(), count);
    entry.store(field, Value::int(0), Type::Int(32));
    let call = entry.call_method(next, vec![object]);
    entry.return_value(call.result.unwrap()).unwrap();
    func.build().unwrap();
    builder
}

#[test]
fn test_program_text() {
    let (program, session) = counter_program().finish();
    let text = ProgramEmitter::new(&session, EmitterConfig::plain())
        .emit_to_string(&program)
        .unwrap();

    let expected = "\
program counter

class Counter uid 3 {
    field count: i32
    method next(Counter) -> i32
}

function main() -> i32 {
    block0:
        v0 = new Counter
        v1 = member v0, Counter.count
        store.i32 v1, 0
        v2 = call.dynamic Counter.next(v0)
        return v2
}

";
    assert_eq!(text, expected);
}

#[test]
fn test_lowered_program_text() {
    let (mut program, mut session) = counter_program().finish();
    session.lower_program(&mut program).unwrap();

    let text = ProgramEmitter::new(&session, EmitterConfig::plain())
        .emit_to_string(&program)
        .unwrap();

    assert!(text.starts_with("program counter lowered\n"));
    assert!(text.contains("data Counter$vtable = [null, null, &Counter.next]"));
    assert!(text.contains("global Counter$vtable = @Counter$vtable\n"));
    assert!(text.contains("    vtable Counter$vtable\n}"));
    assert!(text.contains("call.runtime calloc(1, 16)"));
    assert!(text.contains("call.indirect"));
    assert!(!text.contains("call.dynamic"));
}

#[test]
fn test_site_override_and_policy_are_printed() {
    let mut builder = counter_program();
    builder
        .session_mut()
        .set_interface_call_type(InterfaceCallType::IndexedItable);
    let (program, mut session) = builder.finish();
    let main = program.entity_by_ld_name("main").unwrap();
    let site = program
        .function(main)
        .unwrap()
        .body
        .blocks
        .values()
        .flat_map(|block| block.instructions.iter())
        .find_map(|inst| inst.call_site())
        .unwrap();
    session.set_call_is_statically_bound(site, true);

    let text = ProgramEmitter::new(&session, EmitterConfig::plain())
        .emit_to_string(&program)
        .unwrap();

    assert!(text.contains("policy indexed-itable\n"));
    assert!(text.contains("v2 = call.dynamic Counter.next(v0) !static"));
}

#[test]
fn test_quiet_skips_data() {
    let (mut program, mut session) = counter_program().finish();
    session.lower_program(&mut program).unwrap();

    let config = EmitterConfig::plain().with_verbosity(VerbosityLevel::Quiet);
    let text = ProgramEmitter::new(&session, config).emit_to_string(&program).unwrap();
    assert!(!text.contains("data Counter$vtable"));
}

#[test]
fn test_layout_text() {
    let (program, session) = counter_program().finish();
    let layout = session.compute_layout(&program).unwrap();

    let text = LayoutEmitter::new(&program, EmitterConfig::plain())
        .emit_to_string(&layout)
        .unwrap();

    let expected = "\
=== Layout of counter (runtime-lookup, pointer size 8) ===
class Counter size 16 vptr +0 {
    vtable:
        [0] rtti
        [1] itable
        [2] Counter.next
    fields:
        +8 Counter.count
}
";
    assert_eq!(text, expected);
}

#[test]
fn test_layout_annotations() {
    let (program, session) = counter_program().finish();
    let layout = session.compute_layout(&program).unwrap();

    let config = EmitterConfig::plain().with_verbosity(VerbosityLevel::Verbose);
    let text = LayoutEmitter::new(&program, config).emit_to_string(&layout).unwrap();
    assert!(text.contains("[2] Counter.next  // slot 0 from Counter.next"));
}
