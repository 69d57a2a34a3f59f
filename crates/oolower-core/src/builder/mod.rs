/*! Fluent API for constructing programs.
 *
 * Wiring classes, members, override edges and graphs by hand means juggling ids across the
 * program and the registry. `ProgramBuilder` owns both and hands out scoped builders for
 * classes and method bodies.
 */

pub mod block_builder;
pub mod class_builder;
pub mod function_builder;

pub use block_builder::{BlockBuilder, CallSite};
pub use class_builder::ClassBuilder;
pub use function_builder::FunctionBuilder;

use crate::class::ClassId;
use crate::entity::{EntityId, Owner};
use crate::program::Program;
use crate::session::OoSession;
use crate::types::MethodType;
use crate::{OoError, Result};

pub struct ProgramBuilder {
    program: Program,
    session: OoSession,
}

impl ProgramBuilder {
    pub fn new(name: &str) -> Self {
        Self::with_session(name, OoSession::new())
    }

    pub fn with_session(name: &str, session: OoSession) -> Self {
        Self {
            program: Program::new(name),
            session,
        }
    }

    pub fn class(&mut self, name: &str) -> ClassBuilder<'_> {
        let class = self.program.add_class(name);
        ClassBuilder::new(class, &mut self.program, self.session.registry_mut())
    }

    pub fn interface(&mut self, name: &str) -> ClassBuilder<'_> {
        let mut builder = self.class(name);
        builder.interface();
        builder
    }

    /// Reopens a class created earlier.
    pub fn class_builder(&mut self, class: ClassId) -> ClassBuilder<'_> {
        ClassBuilder::new(class, &mut self.program, self.session.registry_mut())
    }

    /// Declares a function in the global scope.
    pub fn global_function(&mut self, name: &str, signature: MethodType) -> EntityId {
        self.program.add_method(Owner::Global, name, signature)
    }

    /// Starts the graph of a method or global function.
    pub fn function(&mut self, entity: EntityId) -> Result<FunctionBuilder<'_>> {
        let signature = self
            .program
            .try_entity(entity)?
            .signature()
            .cloned()
            .ok_or_else(|| {
                OoError::BuilderError(format!(
                    "{} is not a method",
                    self.program.entity(entity).ld_name
                ))
            })?;
        if self.program.has_graph(entity) {
            return Err(OoError::BuilderError(format!(
                "{} already has a graph",
                self.program.entity(entity).ld_name
            )));
        }
        Ok(FunctionBuilder::new(entity, signature, &mut self.program))
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut Program {
        &mut self.program
    }

    pub fn session(&self) -> &OoSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut OoSession {
        &mut self.session
    }

    pub fn finish(self) -> (Program, OoSession) {
        (self.program, self.session)
    }
}
