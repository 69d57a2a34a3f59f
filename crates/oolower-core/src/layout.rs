/*! Vtable, itable and instance layout.
 *
 * Classes are laid out from the roots down. A class starts from a copy of its primary
 * superclass's vtable, so a method keeps the same slot index in every subclass: overriding
 * methods replace the slot target and inherited methods leave it pointing at the ancestor's
 * implementation. Each vtable begins with a fixed header holding the RTTI pointer and the
 * itable pointer; method slots follow the header.
 *
 * Interface methods are numbered once per program. Under the indexed itable policy that number
 * is the index into every implementing class's itable, so two unrelated interfaces that happen
 * to declare the same signature get distinct slots.
 */

use crate::class::ClassId;
use crate::config::LoweringConfig;
use crate::dispatch::InterfaceCallType;
use crate::entity::EntityId;
use crate::program::Program;
use crate::registry::{Binding, OoRegistry};
use crate::{OoError, Result};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::HashMap;

pub const VTABLE_RTTI_INDEX: usize = 0;
pub const VTABLE_ITABLE_INDEX: usize = 1;
pub const VTABLE_HEADER_SLOTS: usize = 2;

/// What a vtable or itable word points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotTarget {
    Method(EntityId),
    /// Abstract method with no implementation.
    Trap,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VtableSlot {
    /// Method that introduced the slot.
    pub declared_by: EntityId,
    pub target: SlotTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItableEntry {
    pub interface: ClassId,
    /// Interface methods in declaration order with their implementation in this class.
    pub methods: Vec<(EntityId, SlotTarget)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassLayout {
    pub class: ClassId,
    pub superclass: Option<ClassId>,
    pub is_interface: bool,
    /// Method slots, header excluded.
    pub vtable: Vec<VtableSlot>,
    pub itable: Vec<ItableEntry>,
    /// Dense itable, only filled under the indexed policy.
    pub indexed_itable: Vec<SlotTarget>,
    pub field_offsets: IndexMap<EntityId, u32>,
    pub vptr_entity: Option<EntityId>,
    pub vptr_offset: Option<u32>,
    pub instance_size: u32,
}

impl ClassLayout {
    fn interface(class: ClassId) -> Self {
        Self {
            class,
            superclass: None,
            is_interface: true,
            vtable: Vec::new(),
            itable: Vec::new(),
            indexed_itable: Vec::new(),
            field_offsets: IndexMap::new(),
            vptr_entity: None,
            vptr_offset: None,
            instance_size: 0,
        }
    }

    pub fn slot_target(&self, slot: usize) -> Option<SlotTarget> {
        self.vtable.get(slot).map(|s| s.target)
    }

    /// Number of words in the emitted vtable, header included.
    pub fn vtable_words(&self) -> usize {
        VTABLE_HEADER_SLOTS + self.vtable.len()
    }

    pub fn field_offset(&self, field: EntityId) -> Option<u32> {
        self.field_offsets.get(&field).copied()
    }

    pub fn itable_entry(&self, interface: ClassId) -> Option<&ItableEntry> {
        self.itable.iter().find(|entry| entry.interface == interface)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramLayout {
    pub interface_call_type: InterfaceCallType,
    pub pointer_size: u32,
    classes: IndexMap<ClassId, ClassLayout>,
    #[serde(skip)]
    method_slots: HashMap<EntityId, usize>,
    #[serde(skip)]
    interface_method_index: HashMap<EntityId, usize>,
    #[serde(skip)]
    interface_slots: HashMap<EntityId, usize>,
    interface_slot_count: usize,
}

impl ProgramLayout {
    fn new(interface_call_type: InterfaceCallType, pointer_size: u32) -> Self {
        Self {
            interface_call_type,
            pointer_size,
            classes: IndexMap::new(),
            method_slots: HashMap::new(),
            interface_method_index: HashMap::new(),
            interface_slots: HashMap::new(),
            interface_slot_count: 0,
        }
    }

    pub fn class(&self, class: ClassId) -> Option<&ClassLayout> {
        self.classes.get(&class)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassLayout> {
        self.classes.values()
    }

    /// Vtable slot of a method, header excluded.
    pub fn slot_of(&self, method: EntityId) -> Option<usize> {
        self.method_slots.get(&method).copied()
    }

    /// Byte offset of a method slot from the start of the vtable.
    pub fn vtable_offset(&self, slot: usize) -> i64 {
        ((VTABLE_HEADER_SLOTS + slot) as i64) * i64::from(self.pointer_size)
    }

    /// Position of an interface method among its interface's methods.
    pub fn interface_method_index(&self, method: EntityId) -> Option<usize> {
        self.interface_method_index.get(&method).copied()
    }

    /// Program-wide interface slot used by indexed itables.
    pub fn interface_slot(&self, method: EntityId) -> Option<usize> {
        self.interface_slots.get(&method).copied()
    }

    pub fn interface_slot_count(&self) -> usize {
        self.interface_slot_count
    }
}

pub struct LayoutBuilder<'a> {
    program: &'a Program,
    registry: &'a OoRegistry,
    config: &'a LoweringConfig,
    interface_call_type: InterfaceCallType,
}

impl<'a> LayoutBuilder<'a> {
    pub fn new(program: &'a Program, registry: &'a OoRegistry, config: &'a LoweringConfig) -> Self {
        Self {
            program,
            registry,
            config,
            interface_call_type: config.interface_call_type,
        }
    }

    pub fn with_interface_call_type(mut self, call_type: InterfaceCallType) -> Self {
        self.interface_call_type = call_type;
        self
    }

    pub fn build(&self) -> Result<ProgramLayout> {
        let order = self.program.topological_order()?;
        let mut layout = ProgramLayout::new(self.interface_call_type, self.config.pointer_size);

        for &class in &order {
            if self.registry.class_is_interface(class) {
                self.number_interface_methods(class, &mut layout);
            }
        }

        for &class in &order {
            let class_layout = if self.registry.class_is_interface(class) {
                ClassLayout::interface(class)
            } else {
                self.layout_class(class, &mut layout)?
            };
            layout.classes.insert(class, class_layout);
        }

        tracing::debug!(
            target: "layout",
            classes = layout.classes.len(),
            interface_slots = layout.interface_slot_count,
            policy = %self.interface_call_type,
            "program layout computed"
        );

        Ok(layout)
    }

    fn number_interface_methods(&self, interface: ClassId, layout: &mut ProgramLayout) {
        for (position, method) in self.program.methods(interface).enumerate() {
            layout.interface_method_index.insert(method, position);

            let inherited = self.nearest_overridden(method, |m| layout.interface_slots.get(&m).copied());
            let slot = match inherited {
                Some(slot) => slot,
                None => {
                    let slot = layout.interface_slot_count;
                    layout.interface_slot_count += 1;
                    slot
                }
            };
            layout.interface_slots.insert(method, slot);
        }
    }

    /// First value found walking the overrides of `method`, nearest first.
    fn nearest_overridden<T>(&self, method: EntityId, lookup: impl Fn(EntityId) -> Option<T>) -> Option<T> {
        let mut queue: std::collections::VecDeque<EntityId> =
            self.program.entity(method).overrides.iter().copied().collect();
        let mut seen = Vec::new();
        while let Some(current) = queue.pop_front() {
            if let Some(found) = lookup(current) {
                return Some(found);
            }
            if !seen.contains(&current) {
                seen.push(current);
                queue.extend(self.program.entity(current).overrides.iter().copied());
            }
        }
        None
    }

    fn primary_superclass(&self, class: ClassId) -> Result<Option<ClassId>> {
        let mut superclasses = self
            .program
            .class(class)
            .supertypes
            .iter()
            .copied()
            .filter(|&sup| !self.registry.class_is_interface(sup));

        let first = superclasses.next();
        if let (Some(first), Some(second)) = (first, superclasses.next()) {
            return Err(OoError::MultipleInheritance {
                class: self.program.class(class).name.clone(),
                first: self.program.class(first).name.clone(),
                second: self.program.class(second).name.clone(),
            });
        }
        Ok(first)
    }

    fn target_of(&self, method: EntityId) -> SlotTarget {
        if self.registry.method_is_abstract(method) {
            SlotTarget::Trap
        } else {
            SlotTarget::Method(method)
        }
    }

    /// Target for a method that may be an inherited copy of an ancestor's method.
    fn concrete_target(&self, mut method: EntityId) -> SlotTarget {
        while self.registry.method_is_inherited(method) {
            match self.program.entity(method).overrides.first() {
                Some(&overridden) => method = overridden,
                None => break,
            }
        }
        self.target_of(method)
    }

    fn layout_class(&self, class: ClassId, layout: &mut ProgramLayout) -> Result<ClassLayout> {
        let superclass = self.primary_superclass(class)?;
        let parent = superclass.and_then(|sup| layout.classes.get(&sup)).cloned();

        let vtable = self.build_vtable(class, parent.as_ref(), layout);
        let itable = self.build_itable(class, superclass, &vtable, layout);

        let indexed_itable = if self.interface_call_type == InterfaceCallType::IndexedItable {
            let mut dense = vec![SlotTarget::Empty; layout.interface_slot_count];
            for entry in &itable {
                for &(method, target) in &entry.methods {
                    if let Some(&slot) = layout.interface_slots.get(&method) {
                        dense[slot] = target;
                    }
                }
            }
            dense
        } else {
            Vec::new()
        };

        let mut class_layout = ClassLayout {
            class,
            superclass,
            is_interface: false,
            vtable,
            itable,
            indexed_itable,
            field_offsets: IndexMap::new(),
            vptr_entity: None,
            vptr_offset: None,
            instance_size: 0,
        };
        self.layout_fields(class, parent.as_ref(), &mut class_layout);

        tracing::trace!(
            target: "layout",
            class = %self.program.class(class).name,
            slots = class_layout.vtable.len(),
            interfaces = class_layout.itable.len(),
            size = class_layout.instance_size,
            "class laid out"
        );

        Ok(class_layout)
    }

    fn build_vtable(
        &self,
        class: ClassId,
        parent: Option<&ClassLayout>,
        layout: &mut ProgramLayout,
    ) -> Vec<VtableSlot> {
        let mut vtable = parent.map(|p| p.vtable.clone()).unwrap_or_default();
        let class_is_final = self.registry.class_is_final(class);

        for method in self.program.methods(class) {
            if self.registry.method_excluded_from_vtable(method)
                || self.registry.entity_binding(method) == Binding::Static
            {
                continue;
            }

            let reused = self
                .nearest_overridden(method, |m| layout.method_slots.get(&m).copied())
                .filter(|&slot| slot < vtable.len());

            match reused {
                Some(slot) => {
                    layout.method_slots.insert(method, slot);
                    if !self.registry.method_is_inherited(method) {
                        vtable[slot].target = self.target_of(method);
                    }
                }
                None if self.registry.method_is_inherited(method) => {}
                None => {
                    let is_final = self.registry.method_is_final(method) || class_is_final;
                    if self.config.omit_final_methods
                        && is_final
                        && !self.registry.method_is_abstract(method)
                    {
                        continue;
                    }
                    let slot = vtable.len();
                    vtable.push(VtableSlot {
                        declared_by: method,
                        target: self.target_of(method),
                    });
                    layout.method_slots.insert(method, slot);
                }
            }
        }

        vtable
    }

    /// Interfaces implemented by `class`, directly or through supertypes, without duplicates.
    pub fn implemented_interfaces(&self, class: ClassId) -> IndexSet<ClassId> {
        let mut found = IndexSet::new();
        let mut stack = vec![class];
        let mut visited = IndexSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            // Reverse so the first declared supertype is visited first.
            for &sup in self.program.class(current).supertypes.iter().rev() {
                stack.push(sup);
            }
            if current != class && self.registry.class_is_interface(current) {
                found.insert(current);
            }
        }
        found
    }

    fn build_itable(
        &self,
        class: ClassId,
        superclass: Option<ClassId>,
        vtable: &[VtableSlot],
        layout: &ProgramLayout,
    ) -> Vec<ItableEntry> {
        let interfaces = self.implemented_interfaces(class);
        interfaces
            .iter()
            .map(|&interface| ItableEntry {
                interface,
                methods: self
                    .program
                    .methods(interface)
                    .map(|method| {
                        let target =
                            self.implementation(class, superclass, method, vtable, &interfaces, layout);
                        (method, target)
                    })
                    .collect(),
            })
            .collect()
    }

    fn implementation(
        &self,
        class: ClassId,
        superclass: Option<ClassId>,
        interface_method: EntityId,
        vtable: &[VtableSlot],
        interfaces: &IndexSet<ClassId>,
        layout: &ProgramLayout,
    ) -> SlotTarget {
        let mut current = Some(class);
        while let Some(klass) = current {
            for method in self.program.methods(klass) {
                if !self.program.overrides_transitively(method, interface_method) {
                    continue;
                }
                if let Some(&slot) = layout.method_slots.get(&method) {
                    if let Some(entry) = vtable.get(slot) {
                        return entry.target;
                    }
                }
                return self.concrete_target(method);
            }
            current = if klass == class {
                superclass
            } else {
                layout.classes.get(&klass).and_then(|l| l.superclass)
            };
        }

        // Default methods: a more specific interface's redeclaration wins.
        for &interface in interfaces {
            for method in self.program.methods(interface) {
                if method != interface_method
                    && self.program.overrides_transitively(method, interface_method)
                    && !self.registry.method_is_abstract(method)
                {
                    return SlotTarget::Method(method);
                }
            }
        }
        if !self.registry.method_is_abstract(interface_method) {
            return SlotTarget::Method(interface_method);
        }

        SlotTarget::Trap
    }

    fn layout_fields(&self, class: ClassId, parent: Option<&ClassLayout>, out: &mut ClassLayout) {
        let pointer_size = self.config.pointer_size;
        let designated = self
            .registry
            .class_vptr_entity(class)
            .or_else(|| parent.and_then(|p| p.vptr_entity));

        let mut offset = parent.map(|p| p.instance_size).unwrap_or(0);
        out.field_offsets = parent.map(|p| p.field_offsets.clone()).unwrap_or_default();
        out.vptr_offset = parent.and_then(|p| p.vptr_offset);
        out.vptr_entity = designated;

        let declares_vptr = designated
            .map(|vptr| self.program.fields(class).any(|field| field == vptr))
            .unwrap_or(false);
        // Interface calls read the vptr at offset 0 whatever the receiver class.
        if parent.is_none() {
            out.vptr_offset = Some(0);
            offset = pointer_size;
            if let Some(vptr) = designated.filter(|_| declares_vptr) {
                out.field_offsets.insert(vptr, 0);
            }
        }

        for field in self.program.fields(class) {
            if out.field_offsets.contains_key(&field) {
                continue;
            }
            let Some(ty) = self.program.entity(field).field_type() else {
                continue;
            };
            let size = ty.size_bytes(pointer_size);
            let align = size.clamp(1, pointer_size);
            offset = align_up(offset, align);
            out.field_offsets.insert(field, offset);
            offset += size;
        }

        out.instance_size = align_up(offset, pointer_size);
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    (value + align - 1) / align * align
}
