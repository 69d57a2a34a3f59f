/*! Lowering sessions.
 *
 * All configuration lives in an `OoSession`: the attribute registry, the interface dispatch
 * policy, the call-site overrides and the lowering config. `OoContext` wraps an optional
 * session to give callers an explicit init/deinit lifecycle; a fresh `init` after `deinit`
 * always starts from defaults.
 */

use crate::callsite::{CallBindingOverrides, CallSiteId};
use crate::config::LoweringConfig;
use crate::dispatch::{DispatchPolicy, InterfaceCallType};
use crate::entity::EntityId;
use crate::layout::{LayoutBuilder, ProgramLayout};
use crate::lowering::{effective_binding, LoweringReport, OoLowering};
use crate::program::Program;
use crate::registry::{Binding, OoRegistry};
use crate::rta::{self, RtaOptions, RtaReport};
use crate::{OoError, Result};

#[derive(Debug, Clone, Default)]
pub struct OoSession {
    registry: OoRegistry,
    policy: DispatchPolicy,
    call_overrides: CallBindingOverrides,
    config: LoweringConfig,
}

impl OoSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LoweringConfig) -> Self {
        Self {
            registry: OoRegistry::new(),
            policy: DispatchPolicy::new(config.interface_call_type),
            call_overrides: CallBindingOverrides::new(),
            config,
        }
    }

    pub fn registry(&self) -> &OoRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut OoRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &LoweringConfig {
        &self.config
    }

    /// Replaces the config. The dispatch policy follows the new config.
    pub fn set_config(&mut self, config: LoweringConfig) {
        self.policy.set(config.interface_call_type);
        self.config = config;
    }

    pub fn set_interface_call_type(&mut self, call_type: InterfaceCallType) {
        self.policy.set(call_type);
    }

    pub fn interface_call_type(&self) -> InterfaceCallType {
        self.policy.get()
    }

    pub fn set_call_is_statically_bound(&mut self, site: CallSiteId, statically_bound: bool) {
        self.call_overrides.set_statically_bound(site, statically_bound);
    }

    pub fn call_is_statically_bound(&self, site: CallSiteId) -> Option<bool> {
        self.call_overrides.statically_bound(site)
    }

    pub fn clear_call_binding(&mut self, site: CallSiteId) {
        self.call_overrides.clear_override(site);
    }

    pub fn call_overrides(&self) -> &CallBindingOverrides {
        &self.call_overrides
    }

    pub fn effective_binding(&self, program: &Program, method: EntityId) -> Binding {
        effective_binding(program, &self.registry, method)
    }

    pub fn compute_layout(&self, program: &Program) -> Result<ProgramLayout> {
        LayoutBuilder::new(program, &self.registry, &self.config)
            .with_interface_call_type(self.policy.get())
            .build()
    }

    /// Runs the OO lowering pass. A program can only be lowered once.
    pub fn lower_program(&mut self, program: &mut Program) -> Result<LoweringReport> {
        let call_type = self.policy.get();
        OoLowering::new(&mut self.registry, &self.call_overrides, &self.config, call_type).run(program)
    }

    /// Rapid type analysis followed by devirtualization of single-target calls.
    pub fn devirtualize(&mut self, program: &mut Program, options: &RtaOptions) -> Result<RtaReport> {
        rta::optimize(program, &self.registry, &self.call_overrides, options)
    }

    /// Forgets every attribute, override and policy choice.
    pub fn reset(&mut self) {
        *self = Self::with_config(LoweringConfig::default());
    }
}

/// Explicit init/deinit lifecycle around a single active session.
#[derive(Debug, Default)]
pub struct OoContext {
    session: Option<OoSession>,
}

impl OoContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self) -> Result<&mut OoSession> {
        self.init_with_config(LoweringConfig::default())
    }

    pub fn init_with_config(&mut self, config: LoweringConfig) -> Result<&mut OoSession> {
        if self.session.is_some() {
            return Err(OoError::AlreadyInitialized);
        }
        tracing::debug!(target: "session", "OO lowering session opened");
        Ok(self.session.insert(OoSession::with_config(config)))
    }

    pub fn deinit(&mut self) -> Result<()> {
        match self.session.take() {
            Some(_) => {
                tracing::debug!(target: "session", "OO lowering session closed");
                Ok(())
            }
            None => Err(OoError::NotInitialized),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Result<&OoSession> {
        self.session.as_ref().ok_or(OoError::NotInitialized)
    }

    pub fn session_mut(&mut self) -> Result<&mut OoSession> {
        self.session.as_mut().ok_or(OoError::NotInitialized)
    }

    pub fn lower_program(&mut self, program: &mut Program) -> Result<LoweringReport> {
        self.session_mut()?.lower_program(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Owner;
    use crate::types::MethodType;
    use cranelift_entity::EntityRef;

    #[test]
    fn test_operations_before_init_fail() {
        let mut context = OoContext::new();
        assert!(matches!(context.session(), Err(OoError::NotInitialized)));
        assert!(matches!(context.deinit(), Err(OoError::NotInitialized)));

        let mut program = Program::new("early");
        assert!(matches!(
            context.lower_program(&mut program),
            Err(OoError::NotInitialized)
        ));
    }

    #[test]
    fn test_double_init_fails() {
        let mut context = OoContext::new();
        context.init().unwrap();
        assert!(matches!(context.init(), Err(OoError::AlreadyInitialized)));
        assert!(context.is_initialized());
    }

    #[test]
    fn test_deinit_then_init_restores_defaults() {
        let mut program = Program::new("reset");
        let class = program.add_class("A");
        let method = program.add_method(Owner::Class(class), "run", MethodType::default());
        let site = CallSiteId::new(0);

        let mut context = OoContext::new();
        {
            let session = context.init().unwrap();
            session.registry_mut().set_method_final(method, true);
            session.registry_mut().set_class_uid(class, 12);
            session.set_interface_call_type(InterfaceCallType::IndexedItable);
            session.set_call_is_statically_bound(site, true);
        }
        context.deinit().unwrap();

        let session = context.init().unwrap();
        assert!(!session.registry().method_is_final(method));
        assert_eq!(session.registry().class_uid(class), 0);
        assert_eq!(session.interface_call_type(), InterfaceCallType::RuntimeLookup);
        assert_eq!(session.call_is_statically_bound(site), None);
    }

    #[test]
    fn test_config_sets_initial_policy() {
        let config = LoweringConfig {
            interface_call_type: InterfaceCallType::SEARCHED_ITABLE_M2F,
            ..LoweringConfig::default()
        };
        let session = OoSession::with_config(config);
        assert_eq!(session.interface_call_type(), InterfaceCallType::SEARCHED_ITABLE_M2F);
    }
}
