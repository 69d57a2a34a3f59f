/*! Lower object-oriented IR to vtables, itables and plain calls.
 *
 * Single import for the whole toolkit: the object model and lowering engine, the `.ool` text
 * parser, and the emitters for programs and layouts.
 */

pub use oolower_core as core;
pub use oolower_emit as emit;
pub use oolower_parser as parser;

pub use oolower_core::{
    block::{BasicBlock, BlockId, Terminator},
    class::{ClassId, ClassType},
    entity::{EntityId, Owner},
    instructions::Instruction,
    types::{MethodType, Type},
    values::Value,
    InterfaceCallType, LoweringConfig, LoweringReport, OoContext, OoError, OoSession, Program,
    ProgramBuilder,
};

pub use oolower_emit::{LayoutEmitter, ProgramEmitter};

pub use oolower_parser::{parse, parse_program};

/// Reads `.ool` text, lowers it with `session`, and returns the lowered program as text.
pub fn lower_text(input: &str, session: &mut OoSession) -> anyhow::Result<(String, LoweringReport)> {
    use oolower_emit::Emitter;

    let mut program = parse_program(input, session)?;
    let report = session.lower_program(&mut program)?;
    let text = ProgramEmitter::new(session, oolower_emit::EmitterConfig::plain()).emit_to_string(&program)?;
    Ok((text, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_text() {
        let input = r"
program tiny

class Cell uid 1 {
    field value: i32
    method get(Cell) -> i32
}

function main() -> i32 {
    block0:
        v0 = new Cell
        v1 = call.dynamic Cell.get(v0)
        return v1
}
";
        let mut session = OoSession::new();
        let (text, report) = lower_text(input, &mut session).unwrap();

        assert_eq!(report.dynamic_calls, 1);
        assert_eq!(report.vtables, 1);
        assert!(text.starts_with("program tiny lowered"));
        assert!(text.contains("call.indirect"));

        assert!(lower_text(&text, &mut OoSession::new()).is_err());
    }
}
