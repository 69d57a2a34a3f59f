/*! OO attribute side tables for entities and class types.
 *
 * Attributes are stored apart from the structural IR, keyed by arena index. Anything never
 * configured reads as its default: flags are false, binding is `Unknown`, and no metadata
 * entity is designated. Setters do not cross-check attributes; contradictory combinations
 * such as abstract and final are accepted and left to the layout builder.
 */

use crate::class::ClassId;
use crate::entity::EntityId;
use cranelift_entity::SecondaryMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How calls to a method are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Binding {
    /// Decided during lowering from the owner and the final flags.
    #[default]
    Unknown,
    Static,
    Dynamic,
    Interface,
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Binding::Unknown => "unknown",
            Binding::Static => "static",
            Binding::Dynamic => "dynamic",
            Binding::Interface => "interface",
        };
        f.write_str(text)
    }
}

impl FromStr for Binding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Binding::Unknown),
            "static" => Ok(Binding::Static),
            "dynamic" => Ok(Binding::Dynamic),
            "interface" => Ok(Binding::Interface),
            other => Err(format!("unknown binding '{}'", other)),
        }
    }
}

/// Role of an entity that holds generated OO metadata instead of user code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataRole {
    VTable,
    VPtr,
    Rtti,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityAttributes {
    pub binding: Binding,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_inherited: bool,
    pub is_transient: bool,
    pub exclude_from_vtable: bool,
    pub role: Option<MetadataRole>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassAttributes {
    pub is_interface: bool,
    pub is_abstract: bool,
    pub is_final: bool,
    pub is_extern: bool,
    pub uid: u32,
    pub vtable: Option<EntityId>,
    pub vptr: Option<EntityId>,
    pub rtti: Option<EntityId>,
}

#[derive(Debug, Clone, Default)]
pub struct OoRegistry {
    entities: SecondaryMap<EntityId, EntityAttributes>,
    classes: SecondaryMap<ClassId, ClassAttributes>,
}

impl OoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every recorded attribute.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.classes.clear();
    }

    pub fn entity_attributes(&self, entity: EntityId) -> &EntityAttributes {
        &self.entities[entity]
    }

    pub fn class_attributes(&self, class: ClassId) -> &ClassAttributes {
        &self.classes[class]
    }

    pub fn set_entity_binding(&mut self, entity: EntityId, binding: Binding) {
        self.entities[entity].binding = binding;
    }

    pub fn entity_binding(&self, entity: EntityId) -> Binding {
        self.entities[entity].binding
    }

    pub fn set_method_final(&mut self, method: EntityId, is_final: bool) {
        self.entities[method].is_final = is_final;
    }

    pub fn method_is_final(&self, method: EntityId) -> bool {
        self.entities[method].is_final
    }

    pub fn set_method_abstract(&mut self, method: EntityId, is_abstract: bool) {
        self.entities[method].is_abstract = is_abstract;
    }

    pub fn method_is_abstract(&self, method: EntityId) -> bool {
        self.entities[method].is_abstract
    }

    pub fn set_method_inherited(&mut self, method: EntityId, is_inherited: bool) {
        self.entities[method].is_inherited = is_inherited;
    }

    pub fn method_is_inherited(&self, method: EntityId) -> bool {
        self.entities[method].is_inherited
    }

    pub fn set_field_transient(&mut self, field: EntityId, is_transient: bool) {
        self.entities[field].is_transient = is_transient;
    }

    pub fn field_is_transient(&self, field: EntityId) -> bool {
        self.entities[field].is_transient
    }

    pub fn set_method_exclude_from_vtable(&mut self, method: EntityId, exclude: bool) {
        self.entities[method].exclude_from_vtable = exclude;
    }

    pub fn method_excluded_from_vtable(&self, method: EntityId) -> bool {
        self.entities[method].exclude_from_vtable
    }

    pub fn set_entity_role(&mut self, entity: EntityId, role: Option<MetadataRole>) {
        self.entities[entity].role = role;
    }

    pub fn entity_role(&self, entity: EntityId) -> Option<MetadataRole> {
        self.entities[entity].role
    }

    pub fn set_class_interface(&mut self, class: ClassId, is_interface: bool) {
        self.classes[class].is_interface = is_interface;
    }

    pub fn class_is_interface(&self, class: ClassId) -> bool {
        self.classes[class].is_interface
    }

    pub fn set_class_abstract(&mut self, class: ClassId, is_abstract: bool) {
        self.classes[class].is_abstract = is_abstract;
    }

    pub fn class_is_abstract(&self, class: ClassId) -> bool {
        self.classes[class].is_abstract
    }

    pub fn set_class_final(&mut self, class: ClassId, is_final: bool) {
        self.classes[class].is_final = is_final;
    }

    pub fn class_is_final(&self, class: ClassId) -> bool {
        self.classes[class].is_final
    }

    /// Marks a class as defined outside the program being compiled.
    pub fn set_class_extern(&mut self, class: ClassId, is_extern: bool) {
        self.classes[class].is_extern = is_extern;
    }

    pub fn class_is_extern(&self, class: ClassId) -> bool {
        self.classes[class].is_extern
    }

    /// Stores the client-assigned unique id. Uniqueness is not checked.
    pub fn set_class_uid(&mut self, class: ClassId, uid: u32) {
        self.classes[class].uid = uid;
    }

    pub fn class_uid(&self, class: ClassId) -> u32 {
        self.classes[class].uid
    }

    pub fn set_class_vtable_entity(&mut self, class: ClassId, entity: Option<EntityId>) {
        self.classes[class].vtable = entity;
        if let Some(entity) = entity {
            self.entities[entity].role = Some(MetadataRole::VTable);
        }
    }

    pub fn class_vtable_entity(&self, class: ClassId) -> Option<EntityId> {
        self.classes[class].vtable
    }

    pub fn set_class_vptr_entity(&mut self, class: ClassId, entity: Option<EntityId>) {
        self.classes[class].vptr = entity;
        if let Some(entity) = entity {
            self.entities[entity].role = Some(MetadataRole::VPtr);
        }
    }

    pub fn class_vptr_entity(&self, class: ClassId) -> Option<EntityId> {
        self.classes[class].vptr
    }

    pub fn set_class_rtti_entity(&mut self, class: ClassId, entity: Option<EntityId>) {
        self.classes[class].rtti = entity;
        if let Some(entity) = entity {
            self.entities[entity].role = Some(MetadataRole::Rtti);
        }
    }

    pub fn class_rtti_entity(&self, class: ClassId) -> Option<EntityId> {
        self.classes[class].rtti
    }
}
