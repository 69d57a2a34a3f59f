use crate::instructions::Instruction;
use crate::lowering::LoweringReport;
use crate::program::Program;
use crate::rta::{RtaOptions, RtaReport};
use crate::session::OoSession;
use anyhow::{Context, Result};
use std::time::{Duration, Instant};

pub trait Pass: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        "No description provided"
    }

    fn run_on_program(&mut self, program: &mut Program, session: &mut OoSession) -> Result<()>;

    fn modifies_ir(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn std::any::Any;

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

#[derive(Debug, Clone)]
pub struct PassStatistics {
    pub name: String,
    pub duration: Duration,
}

pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    statistics: Vec<PassStatistics>,
    collect_stats: bool,
}

impl PassManager {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            statistics: Vec::new(),
            collect_stats: false,
        }
    }

    pub fn enable_statistics(&mut self) {
        self.collect_stats = true;
    }

    pub fn register_pass<P: Pass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    pub fn run_all(&mut self, program: &mut Program, session: &mut OoSession) -> Result<()> {
        for pass in self.passes.iter_mut() {
            let start = self.collect_stats.then(Instant::now);

            tracing::debug!(target: "passes", pass = pass.name(), "running pass");
            pass.run_on_program(program, session)
                .with_context(|| format!("pass '{}' failed on {}", pass.name(), program.name))?;

            if let Some(start) = start {
                self.statistics.push(PassStatistics {
                    name: pass.name().to_string(),
                    duration: start.elapsed(),
                });
            }
        }

        Ok(())
    }

    pub fn statistics(&self) -> &[PassStatistics] {
        &self.statistics
    }

    pub fn get_pass<P: Pass + 'static>(&self) -> Option<&P> {
        self.passes
            .iter()
            .find_map(|pass| pass.as_any().downcast_ref::<P>())
    }

    pub fn get_pass_mut<P: Pass + 'static>(&mut self) -> Option<&mut P> {
        self.passes
            .iter_mut()
            .find_map(|pass| pass.as_any_mut().downcast_mut::<P>())
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrites OO operations using the session's registry and policy.
#[derive(Debug, Default)]
pub struct LoweringPass {
    report: Option<LoweringReport>,
}

impl LoweringPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) -> Option<&LoweringReport> {
        self.report.as_ref()
    }
}

impl Pass for LoweringPass {
    fn name(&self) -> &'static str {
        "oo-lowering"
    }

    fn description(&self) -> &'static str {
        "Lowers method calls, allocations and type tests to plain memory operations"
    }

    fn run_on_program(&mut self, program: &mut Program, session: &mut OoSession) -> Result<()> {
        self.report = Some(session.lower_program(program)?);
        Ok(())
    }

    fn modifies_ir(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Rapid type analysis followed by devirtualization of single-target calls.
#[derive(Debug)]
pub struct DevirtualizationPass {
    options: RtaOptions,
    report: Option<RtaReport>,
}

impl DevirtualizationPass {
    pub fn new(options: RtaOptions) -> Self {
        Self {
            options,
            report: None,
        }
    }

    pub fn report(&self) -> Option<&RtaReport> {
        self.report.as_ref()
    }
}

impl Pass for DevirtualizationPass {
    fn name(&self) -> &'static str {
        "rta-devirtualize"
    }

    fn description(&self) -> &'static str {
        "Turns dynamically bound calls with a single live target into direct calls"
    }

    fn run_on_program(&mut self, program: &mut Program, session: &mut OoSession) -> Result<()> {
        self.report = Some(session.devirtualize(program, &self.options)?);
        Ok(())
    }

    fn modifies_ir(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Fails when any graph still contains an operation that only exists before lowering.
#[derive(Debug, Default)]
pub struct VerifyLoweredPass;

impl Pass for VerifyLoweredPass {
    fn name(&self) -> &'static str {
        "verify-lowered"
    }

    fn description(&self) -> &'static str {
        "Checks that no method calls, allocations or type tests survived lowering"
    }

    fn run_on_program(&mut self, program: &mut Program, _session: &mut OoSession) -> Result<()> {
        for function in program.functions() {
            for block in function.body.blocks.values() {
                if let Some(inst) = block.instructions.iter().find(|inst| inst.is_object_operation()) {
                    anyhow::bail!(
                        "{} in {} of {} was not lowered",
                        inst_name(inst),
                        block.id,
                        program.entity(function.entity).ld_name
                    );
                }
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

fn inst_name(inst: &Instruction) -> &'static str {
    match inst {
        Instruction::Alloc { .. } => "new",
        Instruction::AllocArray { .. } => "newarray",
        Instruction::ArrayLength { .. } => "arraylength",
        Instruction::InstanceOf { .. } => "instanceof",
        Instruction::SizeOf { .. } => "sizeof",
        Instruction::Member { .. } => "member",
        Instruction::Call { .. } => "call.dynamic",
        _ => "instruction",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::types::{MethodType, Type};
    use crate::values::Value;

    fn sample() -> (Program, OoSession) {
        let mut builder = ProgramBuilder::new("passes");
        let mut class = builder.class("A");
        let a = class.id();
        let get = class.method("get", MethodType::new(vec![Type::Class(a)], vec![Type::Int(32)]));
        let main = builder.global_function("main", MethodType::new(vec![], vec![Type::Int(32)]));

        let mut f = builder.function(get).unwrap();
        f.entry_block().return_value(Value::int(1)).unwrap();
        f.build().unwrap();

        let mut f = builder.function(main).unwrap();
        let mut entry = f.entry_block();
        let obj = entry.alloc(a);
        let call = entry.call_method(get, vec![obj]);
        entry.return_value(call.result.unwrap()).unwrap();
        f.build().unwrap();

        builder.finish()
    }

    #[test]
    fn passes_run_in_registration_order() {
        let (mut program, mut session) = sample();
        let main = program.entity_by_ld_name("main").unwrap();

        let mut manager = PassManager::new();
        manager.enable_statistics();
        manager.register_pass(DevirtualizationPass::new(RtaOptions::new(vec![main])));
        manager.register_pass(LoweringPass::new());
        manager.register_pass(VerifyLoweredPass);
        manager.run_all(&mut program, &mut session).unwrap();

        assert_eq!(
            manager.pass_names(),
            vec!["rta-devirtualize", "oo-lowering", "verify-lowered"]
        );
        assert_eq!(manager.statistics().len(), 3);

        let rta = manager.get_pass::<DevirtualizationPass>().unwrap().report().unwrap();
        assert_eq!(rta.devirtualized, 1);

        let lowering = manager.get_pass::<LoweringPass>().unwrap().report().unwrap();
        assert_eq!(lowering.static_calls, 1);
        assert_eq!(lowering.dynamic_calls, 0);
        assert_eq!(lowering.allocations, 1);
    }

    #[test]
    fn verify_rejects_unlowered_program() {
        let (mut program, mut session) = sample();
        let mut manager = PassManager::new();
        manager.register_pass(VerifyLoweredPass);

        let err = manager.run_all(&mut program, &mut session).unwrap_err();
        assert!(format!("{:#}", err).contains("was not lowered"));
    }

    #[test]
    fn lowering_twice_fails() {
        let (mut program, mut session) = sample();
        let mut manager = PassManager::new();
        manager.register_pass(LoweringPass::new());
        manager.register_pass(LoweringPass::new());

        let err = manager.run_all(&mut program, &mut session).unwrap_err();
        assert!(format!("{:#}", err).contains("already been lowered"));
    }
}
