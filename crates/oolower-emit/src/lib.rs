/*! Text output for programs and layouts.
 *
 * `ProgramEmitter` writes the `.ool` text format that `oolower-parser` reads back, including
 * the OO attributes stored in a session. `LayoutEmitter` prints computed vtables, itables and
 * field offsets for inspection.
 */

pub mod config;
pub mod emitter;
pub mod layout_emitter;
pub mod output;
pub mod program_emitter;

pub use config::{EmitterConfig, IndentStyle, VerbosityLevel};
pub use emitter::{EmitContext, EmitHelper, EmitResult, Emitter, Tint};
pub use layout_emitter::LayoutEmitter;
pub use output::{JsonFormatter, OutputFormat};
pub use program_emitter::{format_type, ProgramEmitter};
