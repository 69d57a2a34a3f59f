use crate::block::BlockId;
use crate::builder::ProgramBuilder;
use crate::config::LoweringConfig;
use crate::entity::EntityId;
use crate::instructions::{Instruction, RuntimeHelper};
use crate::program::Program;
use crate::session::OoSession;
use crate::types::{MethodType, Type};
use crate::values::{ParamId, TempId, Value};
use pretty_assertions::assert_eq;

fn temp(n: u32) -> Value {
    Value::Temp(TempId(n))
}

fn param(n: u32) -> Value {
    Value::Param(ParamId(n))
}

fn entry_instructions(program: &Program, function: EntityId) -> Vec<Instruction> {
    program
        .function(function)
        .unwrap()
        .body
        .get_block(BlockId(0))
        .unwrap()
        .instructions
        .clone()
}

#[test]
fn test_objects_fields_and_arrays() {
    let mut builder = ProgramBuilder::new("memory");
    let mut point = builder.class("Point");
    let point_id = point.id();
    point.field("x", Type::Int(32));
    let y = point.field("y", Type::Int(32));

    let main = builder.global_function("main", MethodType::new(vec![Type::Int(32)], vec![Type::Int(32)]));
    let mut func = builder.function(main).unwrap();
    let count = func.param(0);
    let mut entry = func.entry_block();
    let object = entry.alloc(point_id);
    let field = entry.member(object, y);
    entry.store(field.clone(), Value::int(5), Type::Int(32));
    entry.size_of(point_id);
    let array = entry.alloc_array(Type::Int(32), count);
    let length = entry.array_length(array);
    entry.return_value(length).unwrap();
    func.build().unwrap();

    let (mut program, mut session) = builder.finish();
    let report = session.lower_program(&mut program).unwrap();
    let vtable = program.entity_by_ld_name("Point$vtable").unwrap();

    let expected = vec![
        Instruction::CallRuntime {
            result: Some(temp(0)),
            helper: RuntimeHelper::Calloc,
            args: vec![Value::int(1), Value::int(16)],
        },
        Instruction::AddressOf {
            result: temp(5),
            entity: vtable,
        },
        Instruction::Store {
            address: temp(0),
            value: temp(5),
            ty: Type::Pointer,
        },
        Instruction::Offset {
            result: temp(1),
            base: temp(0),
            offset: 12,
        },
        Instruction::Store {
            address: temp(1),
            value: Value::int(5),
            ty: Type::Int(32),
        },
        Instruction::Copy {
            result: temp(2),
            value: Value::int(16),
        },
        Instruction::Add {
            result: temp(6),
            left: param(0),
            right: Value::int(1),
            ty: Type::Uint(64),
        },
        Instruction::Mul {
            result: temp(7),
            left: temp(6),
            right: Value::int(4),
            ty: Type::Uint(64),
        },
        Instruction::CallRuntime {
            result: Some(temp(8)),
            helper: RuntimeHelper::Calloc,
            args: vec![Value::int(1), temp(7)],
        },
        Instruction::Offset {
            result: temp(9),
            base: temp(8),
            offset: 0,
        },
        Instruction::Store {
            address: temp(9),
            value: param(0),
            ty: Type::Int(32),
        },
        Instruction::Offset {
            result: temp(3),
            base: temp(8),
            offset: 4,
        },
        Instruction::Offset {
            result: temp(10),
            base: temp(3),
            offset: -4,
        },
        Instruction::Load {
            result: temp(4),
            address: temp(10),
            ty: Type::Int(32),
        },
    ];

    assert_eq!(entry_instructions(&program, main), expected);
    assert_eq!(report.allocations, 1);
    assert_eq!(report.array_allocations, 1);
    assert_eq!(report.array_lengths, 1);
    assert_eq!(report.field_accesses, 1);
}

#[test]
fn test_reference_arrays_keep_pointer_alignment() {
    let mut builder = ProgramBuilder::new("refs");
    let node = builder.class("Node").id();
    let main = builder.global_function("main", MethodType::default());
    let mut func = builder.function(main).unwrap();
    let mut entry = func.entry_block();
    entry.alloc_array(Type::Class(node), Value::int(3));
    entry.return_void().unwrap();
    func.build().unwrap();

    let (mut program, mut session) = builder.finish();
    session.lower_program(&mut program).unwrap();
    let instructions = entry_instructions(&program, main);

    // One pointer-sized element of padding; the length sits in its upper half.
    assert!(instructions.contains(&Instruction::Offset {
        result: temp(4),
        base: temp(3),
        offset: 4,
    }));
    assert_eq!(
        instructions.last(),
        Some(&Instruction::Offset {
            result: temp(0),
            base: temp(3),
            offset: 8,
        })
    );
}

#[test]
fn test_designated_vptr_field_is_placed_first() {
    let mut builder = ProgramBuilder::new("vptr");
    let mut shape = builder.class("Shape");
    let shape_id = shape.id();
    let x = shape.field("x", Type::Int(32));
    let vptr = shape.vptr_field("$vptr");

    let main = builder.global_function("main", MethodType::default());
    let mut func = builder.function(main).unwrap();
    let mut entry = func.entry_block();
    entry.alloc(shape_id);
    entry.return_void().unwrap();
    func.build().unwrap();

    let (mut program, mut session) = builder.finish();
    let layout = session.compute_layout(&program).unwrap();
    let shape_layout = layout.class(shape_id).unwrap();
    assert_eq!(shape_layout.vptr_offset, Some(0));
    assert_eq!(shape_layout.field_offset(vptr), Some(0));
    assert_eq!(shape_layout.field_offset(x), Some(8));
    assert_eq!(shape_layout.instance_size, 16);

    session.lower_program(&mut program).unwrap();
    let instructions = entry_instructions(&program, main);
    assert_eq!(
        instructions[2],
        Instruction::Store {
            address: temp(0),
            value: temp(1),
            ty: Type::Pointer,
        }
    );
}

#[test]
fn test_narrow_targets_use_configured_sizes() {
    let config = LoweringConfig {
        pointer_size: 4,
        array_length_size: 4,
        ..LoweringConfig::default()
    };
    let mut builder = ProgramBuilder::with_session("narrow", OoSession::with_config(config));
    let mut pair = builder.class("Pair");
    let pair_id = pair.id();
    pair.field("left", Type::Class(pair_id));
    let right = pair.field("right", Type::Class(pair_id));

    let (program, session) = builder.finish();
    let layout = session.compute_layout(&program).unwrap();
    let pair_layout = layout.class(pair_id).unwrap();

    assert_eq!(pair_layout.field_offset(right), Some(8));
    assert_eq!(pair_layout.instance_size, 12);
    assert_eq!(layout.vtable_offset(0), 8);
}
