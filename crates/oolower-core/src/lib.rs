/*! Object model and lowering engine for object-oriented IR.
 *
 * Front ends describe classes, interfaces, methods and fields together with the OO attributes
 * that drive dispatch (binding mode, final, abstract, inherited, vtable exclusion). This crate
 * computes vtable and itable layouts from that description and rewrites method calls, allocations
 * and type tests into plain loads, stores and direct or indirect calls.
 */

pub mod block;
pub mod builder;
pub mod callsite;
pub mod class;
pub mod config;
pub mod data;
pub mod dispatch;
pub mod entity;
pub mod function;
pub mod instructions;
pub mod layout;
pub mod lowering;
pub mod pass;
pub mod persist;
pub mod program;
pub mod registry;
pub mod rta;
pub mod session;
pub mod types;
pub mod values;

pub use block::{BasicBlock, BlockId, Terminator};
pub use builder::{BlockBuilder, ClassBuilder, FunctionBuilder, ProgramBuilder};
pub use callsite::{CallBindingOverrides, CallSiteId};
pub use class::{ClassId, ClassType};
pub use config::LoweringConfig;
pub use data::{DataId, DataItem, StaticData};
pub use dispatch::{DispatchPolicy, InterfaceCallType, ItableIndirection};
pub use entity::{Entity, EntityId, EntityKind, Owner};
pub use function::{Function, FunctionBody};
pub use instructions::{Callee, Instruction, RuntimeHelper};
pub use layout::{ClassLayout, LayoutBuilder, ProgramLayout, SlotTarget};
pub use lowering::{LoweringReport, OoLowering};
pub use pass::{Pass, PassManager};
pub use program::Program;
pub use registry::{Binding, MetadataRole, OoRegistry};
pub use rta::{RtaOptions, RtaReport, RtaResult};
pub use session::{OoContext, OoSession};
pub use types::{MethodType, Type};
pub use values::{Constant, ParamId, TempId, Value};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OoError {
    #[error("OO lowering session is not initialized")]
    NotInitialized,
    #[error("OO lowering session is already initialized")]
    AlreadyInitialized,
    #[error("Program '{0}' has already been lowered")]
    AlreadyLowered(String),
    #[error("Unknown class: {0}")]
    UnknownClass(String),
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),
    #[error("Cyclic class hierarchy involving {0}")]
    CyclicHierarchy(String),
    #[error("Class {class} has more than one superclass ({first}, {second})")]
    MultipleInheritance {
        class: String,
        first: String,
        second: String,
    },
    #[error("Method {0} is dynamically bound but has no vtable slot")]
    MissingVtableSlot(String),
    #[error("Invalid call: {0}")]
    InvalidCall(String),
    #[error("Method {0} is not a member of an interface")]
    NotAnInterfaceMethod(String),
    #[error("RTA needs at least one entry point")]
    NoEntryPoints,
    #[error("Entry point {0} has no graph")]
    EntryPointWithoutGraph(String),
    #[error("Builder error: {0}")]
    BuilderError(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persist error: {0}")]
    Persist(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OoError>;

#[cfg(test)]
mod tests;
