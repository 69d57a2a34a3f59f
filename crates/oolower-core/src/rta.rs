/*! Rapid type analysis and devirtualization.
 *
 * Starting from the entry points, the analysis walks reachable method graphs. Object creation
 * marks classes live, and every dynamically bound call collects the implementations it could
 * reach in live classes. Implementations found in classes that are not live yet are parked
 * and released once the class becomes live, so the result does not depend on the order in
 * which graphs are visited.
 *
 * Classes marked extern are defined outside the program. They are always treated as live,
 * and methods overriding an extern superclass's methods are kept because external code may
 * call them.
 *
 * Devirtualization then turns every dynamically bound call with exactly one live target into a
 * static call, unless the callee's owner is extern and neither the owner nor the method is final.
 */

use crate::callsite::CallBindingOverrides;
use crate::class::ClassId;
use crate::entity::{EntityId, Owner};
use crate::instructions::{Callee, Instruction};
use crate::lowering::effective_binding;
use crate::program::Program;
use crate::registry::{Binding, OoRegistry};
use crate::{OoError, Result};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct RtaOptions {
    pub entry_points: Vec<EntityId>,
    /// Classes that count as live even if no allocation of them is seen.
    pub initial_live_classes: Vec<ClassId>,
}

impl RtaOptions {
    pub fn new(entry_points: Vec<EntityId>) -> Self {
        Self {
            entry_points,
            initial_live_classes: Vec::new(),
        }
    }

    pub fn with_live_classes(mut self, classes: Vec<ClassId>) -> Self {
        self.initial_live_classes = classes;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RtaResult {
    pub live_classes: IndexSet<ClassId>,
    pub live_methods: IndexSet<EntityId>,
    /// Call entity of each dynamically bound call mapped to its possible targets.
    pub dyncall_targets: IndexMap<EntityId, IndexSet<EntityId>>,
}

impl RtaResult {
    pub fn is_live_class(&self, class: ClassId) -> bool {
        self.live_classes.contains(&class)
    }

    pub fn is_live_method(&self, method: EntityId) -> bool {
        self.live_methods.contains(&method)
    }

    pub fn targets(&self, call_entity: EntityId) -> Option<&IndexSet<EntityId>> {
        self.dyncall_targets.get(&call_entity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RtaReport {
    pub static_calls: usize,
    pub dynamic_calls: usize,
    pub interface_calls: usize,
    pub devirtualized: usize,
    pub devirtualized_interface: usize,
    pub indirect_calls: usize,
    pub live_classes: usize,
    pub live_methods: usize,
}

struct Analyzer<'a> {
    program: &'a Program,
    registry: &'a OoRegistry,
    overrides: &'a CallBindingOverrides,
    result: RtaResult,
    queue: VecDeque<EntityId>,
    done: HashSet<EntityId>,
    /// class -> target -> call entities waiting for the class to become live
    unused_targets: HashMap<ClassId, IndexMap<EntityId, IndexSet<EntityId>>>,
}

impl<'a> Analyzer<'a> {
    fn new(program: &'a Program, registry: &'a OoRegistry, overrides: &'a CallBindingOverrides) -> Self {
        Self {
            program,
            registry,
            overrides,
            result: RtaResult::default(),
            queue: VecDeque::new(),
            done: HashSet::new(),
            unused_targets: HashMap::new(),
        }
    }

    fn class_name(&self, class: ClassId) -> &str {
        &self.program.class(class).name
    }

    fn enqueue(&mut self, method: EntityId) {
        if !self.done.contains(&method) && !self.queue.contains(&method) {
            self.queue.push_back(method);
        }
    }

    fn take_method(&mut self, method: EntityId) {
        self.result.live_methods.insert(method);
        self.enqueue(method);
    }

    fn add_live_class(&mut self, class: ClassId) {
        if self.registry.class_is_extern(class)
            || self.registry.class_is_abstract(class)
            || self.registry.class_is_interface(class)
            || !self.result.live_classes.insert(class)
        {
            return;
        }
        tracing::trace!(target: "rta", class = %self.class_name(class), "class became live");

        if let Some(parked) = self.unused_targets.remove(&class) {
            for (target, call_entities) in parked {
                for call_entity in call_entities {
                    self.result
                        .dyncall_targets
                        .entry(call_entity)
                        .or_default()
                        .insert(target);
                }
                self.take_method(target);
            }
        }

        self.check_extern_superclasses(class);
    }

    /// Methods overriding an extern superclass's methods may be called from outside.
    fn check_extern_superclasses(&mut self, class: ClassId) {
        let mut stack: Vec<ClassId> = self.program.class(class).supertypes.clone();
        let mut seen = HashSet::new();
        while let Some(superclass) = stack.pop() {
            if !seen.insert(superclass) {
                continue;
            }
            if self.registry.class_is_extern(superclass) {
                let inherited: Vec<EntityId> = self
                    .program
                    .methods(superclass)
                    .filter(|&m| !self.registry.method_is_final(m))
                    .collect();
                for member in inherited {
                    if let Some(overriding) = self.matching_member(class, member) {
                        if overriding != member {
                            self.take_method(overriding);
                        }
                    }
                }
            }
            stack.extend(self.program.class(superclass).supertypes.iter().copied());
        }
    }

    /// Member of `class` that implements or redeclares `method`.
    fn matching_member(&self, class: ClassId, method: EntityId) -> Option<EntityId> {
        let mut by_name = None;
        let name = &self.program.entity(method).name;
        for member in self.program.methods(class) {
            if member == method || self.program.overrides_transitively(member, method) {
                return Some(member);
            }
            if by_name.is_none() && &self.program.entity(member).name == name {
                by_name = Some(member);
            }
        }
        by_name
    }

    fn owner_is_interface(&self, method: EntityId) -> bool {
        self.program
            .entity(method)
            .owner
            .class()
            .map(|class| self.registry.class_is_interface(class))
            .unwrap_or(false)
    }

    /// Non-abstract implementation of `call_entity` inherited from the supertypes of `class`.
    /// Class methods win over interface default methods.
    fn inherited_implementation(&self, class: ClassId, call_entity: EntityId) -> Option<EntityId> {
        let mut found: Option<EntityId> = None;
        for &superclass in &self.program.class(class).supertypes {
            let candidate = match self.matching_member(superclass, call_entity) {
                Some(member) if !self.registry.method_is_abstract(member) => Some(member),
                Some(_) => None,
                None => self.inherited_implementation(superclass, call_entity),
            };
            match (found, candidate) {
                (None, candidate) => found = candidate,
                (Some(current), Some(candidate)) => {
                    if self.owner_is_interface(current) && !self.owner_is_interface(candidate) {
                        found = Some(candidate);
                    }
                }
                (Some(_), None) => {}
            }
        }
        found
    }

    fn collect_targets(&mut self, call_entity: EntityId) {
        let Some(owner) = self.program.entity(call_entity).owner.class() else {
            self.take_method(call_entity);
            return;
        };
        let mut targets = IndexSet::new();
        let mut stack = vec![(owner, call_entity)];
        let mut visited = HashSet::new();

        while let Some((class, inherited)) = stack.pop() {
            if !visited.insert(class) {
                continue;
            }
            let mut current = match self.matching_member(class, inherited) {
                Some(member) if !self.registry.method_is_inherited(member) => member,
                _ => inherited,
            };

            let concrete = !self.registry.class_is_abstract(class) && !self.registry.class_is_interface(class);
            if concrete
                && self.registry.method_is_abstract(call_entity)
                && self.registry.method_is_abstract(current)
            {
                if let Some(found) = self.inherited_implementation(class, call_entity) {
                    current = found;
                }
            }

            if !self.registry.method_is_abstract(current) {
                if self.result.live_classes.contains(&class) || self.registry.class_is_extern(class) {
                    targets.insert(current);
                } else {
                    self.unused_targets
                        .entry(class)
                        .or_default()
                        .entry(current)
                        .or_default()
                        .insert(call_entity);
                }
            }

            for &subclass in self.program.class(class).subtypes.iter().rev() {
                stack.push((subclass, current));
            }
        }

        for &target in &targets {
            self.take_method(target);
        }
        self.result.dyncall_targets.insert(call_entity, targets);
    }

    /// Graph-less methods whose linker name belongs to a method with a graph redirect there.
    fn redirect(&self, method: EntityId) -> Option<EntityId> {
        let entity = self.program.entity(method);
        if entity.name == entity.ld_name {
            return None;
        }
        self.program
            .entities()
            .find(|(id, other)| *id != method && other.ld_name == entity.ld_name && self.program.has_graph(*id))
            .map(|(id, _)| id)
    }

    fn analyze_method(&mut self, method: EntityId) {
        let program = self.program;
        let Some(function) = program.function(method) else {
            match self.redirect(method) {
                Some(target) => {
                    tracing::trace!(
                        target: "rta",
                        from = %self.program.entity(method).ld_name,
                        "following linker name redirect"
                    );
                    self.take_method(target);
                }
                None => {
                    tracing::trace!(
                        target: "rta",
                        method = %self.program.entity(method).ld_name,
                        "no graph, assuming external"
                    );
                }
            }
            return;
        };

        for block in function.body.blocks.values() {
            for inst in &block.instructions {
                match inst {
                    Instruction::Call {
                        callee: Callee::Static(target),
                        ..
                    } => self.take_method(*target),
                    Instruction::Call {
                        callee: Callee::Dynamic(call_entity),
                        site,
                        ..
                    } => {
                        let bound = self.overrides.resolve(
                            *site,
                            effective_binding(program, self.registry, *call_entity),
                        );
                        if bound == Binding::Static {
                            self.take_method(*call_entity);
                        } else if !self.result.dyncall_targets.contains_key(call_entity) {
                            self.collect_targets(*call_entity);
                        }
                    }
                    Instruction::AddressOf { entity, .. } if program.entity(*entity).is_method() => {
                        self.take_method(*entity)
                    }
                    Instruction::Alloc { class, .. } => self.add_live_class(*class),
                    _ => {}
                }
            }
        }
    }

    fn run(mut self, options: &RtaOptions) -> Result<RtaResult> {
        if options.entry_points.is_empty() {
            return Err(OoError::NoEntryPoints);
        }
        for &entry in &options.entry_points {
            if !self.program.has_graph(entry) {
                return Err(OoError::EntryPointWithoutGraph(
                    self.program.entity(entry).ld_name.clone(),
                ));
            }
            self.take_method(entry);
        }
        for &class in &options.initial_live_classes {
            self.add_live_class(class);
        }
        while let Some(method) = self.queue.pop_front() {
            if !self.done.insert(method) {
                continue;
            }
            self.analyze_method(method);
        }

        tracing::debug!(
            target: "rta",
            live_classes = self.result.live_classes.len(),
            live_methods = self.result.live_methods.len(),
            dyncalls = self.result.dyncall_targets.len(),
            "rapid type analysis finished"
        );

        Ok(self.result)
    }
}

/// Computes live classes, live methods and the possible targets of dynamically bound calls.
pub fn analyze(
    program: &Program,
    registry: &OoRegistry,
    overrides: &CallBindingOverrides,
    options: &RtaOptions,
) -> Result<RtaResult> {
    Analyzer::new(program, registry, overrides).run(options)
}

/// Rewrites dynamically bound calls with a single possible target into static calls.
pub fn devirtualize(
    program: &mut Program,
    registry: &OoRegistry,
    overrides: &CallBindingOverrides,
    result: &RtaResult,
) -> RtaReport {
    let mut rewrites: HashMap<EntityId, EntityId> = HashMap::new();
    let mut interface_owned: HashSet<EntityId> = HashSet::new();
    for (&call_entity, targets) in &result.dyncall_targets {
        let entity = program.entity(call_entity);
        let Owner::Class(owner) = entity.owner else {
            continue;
        };
        if registry.class_is_interface(owner) {
            interface_owned.insert(call_entity);
        }
        let open_extern = registry.class_is_extern(owner)
            && !registry.class_is_final(owner)
            && !registry.method_is_final(call_entity);
        if targets.len() == 1 && !open_extern {
            if let Some(&target) = targets.first() {
                rewrites.insert(call_entity, target);
            }
        }
    }

    let mut report = RtaReport {
        live_classes: result.live_classes.len(),
        live_methods: result.live_methods.len(),
        ..RtaReport::default()
    };

    for function in program.functions_mut() {
        if !result.is_live_method(function.entity) {
            continue;
        }
        for block in function.body.blocks.values_mut() {
            for inst in &mut block.instructions {
                let Instruction::Call { callee, site, .. } = inst else {
                    continue;
                };
                match callee {
                    Callee::Static(_) => report.static_calls += 1,
                    Callee::Indirect(_) => report.indirect_calls += 1,
                    Callee::Dynamic(call_entity) => {
                        let call_entity = *call_entity;
                        let is_interface = interface_owned.contains(&call_entity);
                        if overrides.statically_bound(*site) == Some(true) {
                            report.static_calls += 1;
                            continue;
                        }
                        if is_interface {
                            report.interface_calls += 1;
                        } else {
                            report.dynamic_calls += 1;
                        }
                        // Sites forced dynamic keep their dispatch.
                        if overrides.statically_bound(*site) == Some(false) {
                            continue;
                        }
                        if let Some(&target) = rewrites.get(&call_entity) {
                            *callee = Callee::Static(target);
                            report.devirtualized += 1;
                            if is_interface {
                                report.devirtualized_interface += 1;
                            }
                        }
                    }
                }
            }
        }
    }

    tracing::info!(
        target: "rta",
        devirtualized = report.devirtualized,
        devirtualized_interface = report.devirtualized_interface,
        dynamic_calls = report.dynamic_calls,
        interface_calls = report.interface_calls,
        "devirtualization finished"
    );

    report
}

/// Analysis followed by devirtualization.
pub fn optimize(
    program: &mut Program,
    registry: &OoRegistry,
    overrides: &CallBindingOverrides,
    options: &RtaOptions,
) -> Result<RtaReport> {
    let result = analyze(program, registry, overrides, options)?;
    Ok(devirtualize(program, registry, overrides, &result))
}
