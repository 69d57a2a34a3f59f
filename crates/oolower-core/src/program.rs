use crate::callsite::CallSiteId;
use crate::class::{ClassId, ClassType};
use crate::data::{DataId, StaticData};
use crate::entity::{Entity, EntityId, EntityKind, Owner};
use crate::function::Function;
use crate::types::{MethodType, Type};
use crate::{OoError, Result};
use cranelift_entity::{EntityRef, PrimaryMap};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A whole program: class hierarchy, entities, method graphs and static data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    classes: PrimaryMap<ClassId, ClassType>,
    entities: PrimaryMap<EntityId, Entity>,
    data: PrimaryMap<DataId, StaticData>,
    #[serde(with = "indexmap::map::serde_seq")]
    functions: IndexMap<EntityId, Function>,
    next_call_site: u32,
    lowered: bool,
}

impl Program {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: PrimaryMap::new(),
            entities: PrimaryMap::new(),
            data: PrimaryMap::new(),
            functions: IndexMap::new(),
            next_call_site: 0,
            lowered: false,
        }
    }

    pub fn add_class(&mut self, name: impl Into<String>) -> ClassId {
        self.classes.push(ClassType::new(name))
    }

    pub fn add_supertype(&mut self, class: ClassId, supertype: ClassId) {
        if !self.classes[class].supertypes.contains(&supertype) {
            self.classes[class].supertypes.push(supertype);
            self.classes[supertype].subtypes.push(class);
        }
    }

    pub fn add_method(&mut self, owner: Owner, name: &str, signature: MethodType) -> EntityId {
        self.add_entity(owner, name, EntityKind::Method(signature))
    }

    pub fn add_field(&mut self, class: ClassId, name: &str, ty: Type) -> EntityId {
        self.add_entity(Owner::Class(class), name, EntityKind::Field(ty))
    }

    pub fn add_data_entity(&mut self, owner: Owner, name: &str) -> EntityId {
        self.add_entity(owner, name, EntityKind::Data)
    }

    fn add_entity(&mut self, owner: Owner, name: &str, kind: EntityKind) -> EntityId {
        let ld_name = match owner {
            Owner::Class(class) if !matches!(kind, EntityKind::Data) => {
                format!("{}.{}", self.classes[class].name, name)
            }
            _ => name.to_string(),
        };
        let id = self.entities.push(Entity::new(name, ld_name, owner, kind));
        if let Owner::Class(class) = owner {
            self.classes[class].members.push(id);
        }
        id
    }

    /// Records that `method` overrides `overridden`.
    pub fn add_override(&mut self, method: EntityId, overridden: EntityId) {
        let entity = &mut self.entities[method];
        if !entity.overrides.contains(&overridden) {
            entity.overrides.push(overridden);
        }
    }

    pub fn class(&self, id: ClassId) -> &ClassType {
        &self.classes[id]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassType {
        &mut self.classes[id]
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id]
    }

    pub fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id]
    }

    pub fn try_class(&self, id: ClassId) -> Result<&ClassType> {
        self.classes
            .get(id)
            .ok_or_else(|| OoError::UnknownClass(id.to_string()))
    }

    pub fn try_entity(&self, id: EntityId) -> Result<&Entity> {
        self.entities
            .get(id)
            .ok_or_else(|| OoError::UnknownEntity(id.to_string()))
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &ClassType)> {
        self.classes.iter()
    }

    pub fn class_ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.classes.keys()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.classes
            .iter()
            .find(|(_, class)| class.name == name)
            .map(|(id, _)| id)
    }

    pub fn entity_by_ld_name(&self, ld_name: &str) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|(_, entity)| entity.ld_name == ld_name)
            .map(|(id, _)| id)
    }

    pub fn member_by_name(&self, class: ClassId, name: &str) -> Option<EntityId> {
        self.classes[class]
            .members
            .iter()
            .copied()
            .find(|&member| self.entities[member].name == name)
    }

    /// Declared methods of `class`, in declaration order.
    pub fn methods(&self, class: ClassId) -> impl Iterator<Item = EntityId> + '_ {
        self.classes[class]
            .members
            .iter()
            .copied()
            .filter(move |&member| self.entities[member].is_method())
    }

    /// Declared fields of `class`, in declaration order.
    pub fn fields(&self, class: ClassId) -> impl Iterator<Item = EntityId> + '_ {
        self.classes[class]
            .members
            .iter()
            .copied()
            .filter(move |&member| self.entities[member].is_field())
    }

    /// True when `method` overrides `target` directly or through a chain of overrides.
    pub fn overrides_transitively(&self, method: EntityId, target: EntityId) -> bool {
        let mut stack = self.entities[method].overrides.clone();
        let mut seen = Vec::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if seen.contains(&current) {
                continue;
            }
            seen.push(current);
            stack.extend(self.entities[current].overrides.iter().copied());
        }
        false
    }

    /// Classes ordered so that every supertype precedes its subtypes.
    pub fn topological_order(&self) -> Result<Vec<ClassId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        let mut marks = vec![Mark::New; self.classes.len()];
        let mut order = Vec::with_capacity(self.classes.len());

        for root in self.classes.keys() {
            if marks[root.index()] != Mark::New {
                continue;
            }
            // (class, next supertype to visit)
            let mut stack = vec![(root, 0usize)];
            marks[root.index()] = Mark::Active;
            while let Some((class, next)) = stack.last_mut() {
                let class = *class;
                let supertypes = &self.classes[class].supertypes;
                if *next < supertypes.len() {
                    let sup = supertypes[*next];
                    *next += 1;
                    match marks[sup.index()] {
                        Mark::New => {
                            marks[sup.index()] = Mark::Active;
                            stack.push((sup, 0));
                        }
                        Mark::Active => {
                            return Err(OoError::CyclicHierarchy(self.classes[sup].name.clone()))
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[class.index()] = Mark::Done;
                    order.push(class);
                    stack.pop();
                }
            }
        }

        Ok(order)
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.insert(function.entity, function);
    }

    pub fn function(&self, entity: EntityId) -> Option<&Function> {
        self.functions.get(&entity)
    }

    pub fn function_mut(&mut self, entity: EntityId) -> Option<&mut Function> {
        self.functions.get_mut(&entity)
    }

    pub fn has_graph(&self, entity: EntityId) -> bool {
        self.functions.contains_key(&entity)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.functions.values_mut()
    }

    /// Detaches all graphs so they can be rewritten while the rest of the program is read.
    pub(crate) fn take_functions(&mut self) -> IndexMap<EntityId, Function> {
        std::mem::take(&mut self.functions)
    }

    pub(crate) fn restore_functions(&mut self, functions: IndexMap<EntityId, Function>) {
        self.functions = functions;
    }

    pub fn new_call_site(&mut self) -> CallSiteId {
        let site = CallSiteId::new(self.next_call_site as usize);
        self.next_call_site += 1;
        site
    }

    pub fn add_data(&mut self, data: StaticData) -> DataId {
        self.data.push(data)
    }

    pub fn data(&self, id: DataId) -> &StaticData {
        &self.data[id]
    }

    pub fn data_mut(&mut self, id: DataId) -> &mut StaticData {
        &mut self.data[id]
    }

    pub fn data_blobs(&self) -> impl Iterator<Item = (DataId, &StaticData)> {
        self.data.iter()
    }

    pub fn data_by_name(&self, name: &str) -> Option<DataId> {
        self.data
            .iter()
            .find(|(_, data)| data.name == name)
            .map(|(id, _)| id)
    }

    pub fn set_initializer(&mut self, entity: EntityId, data: DataId) {
        self.entities[entity].initializer = Some(data);
    }

    pub fn is_lowered(&self) -> bool {
        self.lowered
    }

    /// Set by the lowering pass, or by readers loading an already lowered program.
    pub fn mark_lowered(&mut self) {
        self.lowered = true;
    }
}
