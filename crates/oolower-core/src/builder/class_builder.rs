use crate::class::ClassId;
use crate::entity::{EntityId, Owner};
use crate::program::Program;
use crate::registry::{Binding, OoRegistry};
use crate::types::{MethodType, Type};

pub struct ClassBuilder<'a> {
    class: ClassId,
    program: &'a mut Program,
    registry: &'a mut OoRegistry,
}

impl<'a> ClassBuilder<'a> {
    pub fn new(class: ClassId, program: &'a mut Program, registry: &'a mut OoRegistry) -> Self {
        Self {
            class,
            program,
            registry,
        }
    }

    pub fn id(&self) -> ClassId {
        self.class
    }

    pub fn extends(&mut self, superclass: ClassId) -> &mut Self {
        self.program.add_supertype(self.class, superclass);
        self
    }

    pub fn implements(&mut self, interface: ClassId) -> &mut Self {
        self.program.add_supertype(self.class, interface);
        self
    }

    pub fn interface(&mut self) -> &mut Self {
        self.registry.set_class_interface(self.class, true);
        self
    }

    pub fn abstract_class(&mut self) -> &mut Self {
        self.registry.set_class_abstract(self.class, true);
        self
    }

    pub fn final_class(&mut self) -> &mut Self {
        self.registry.set_class_final(self.class, true);
        self
    }

    pub fn extern_class(&mut self) -> &mut Self {
        self.registry.set_class_extern(self.class, true);
        self
    }

    pub fn uid(&mut self, uid: u32) -> &mut Self {
        self.registry.set_class_uid(self.class, uid);
        self
    }

    pub fn method(&mut self, name: &str, signature: MethodType) -> EntityId {
        self.program.add_method(Owner::Class(self.class), name, signature)
    }

    pub fn abstract_method(&mut self, name: &str, signature: MethodType) -> EntityId {
        let method = self.method(name, signature);
        self.registry.set_method_abstract(method, true);
        method
    }

    pub fn final_method(&mut self, name: &str, signature: MethodType) -> EntityId {
        let method = self.method(name, signature);
        self.registry.set_method_final(method, true);
        method
    }

    /// Declares a method overriding `overridden`, reusing its signature.
    pub fn override_method(&mut self, overridden: EntityId) -> EntityId {
        let entity = self.program.entity(overridden);
        let name = entity.name.clone();
        let signature = entity.signature().cloned().unwrap_or_default();
        let method = self.method(&name, signature);
        self.program.add_override(method, overridden);
        method
    }

    /// Declares a member that keeps the implementation of `overridden`.
    pub fn inherit_method(&mut self, overridden: EntityId) -> EntityId {
        let method = self.override_method(overridden);
        self.registry.set_method_inherited(method, true);
        method
    }

    pub fn static_method(&mut self, name: &str, signature: MethodType) -> EntityId {
        let method = self.method(name, signature);
        self.registry.set_entity_binding(method, Binding::Static);
        method
    }

    pub fn field(&mut self, name: &str, ty: Type) -> EntityId {
        self.program.add_field(self.class, name, ty)
    }

    /// Declares the field holding the vtable pointer.
    pub fn vptr_field(&mut self, name: &str) -> EntityId {
        let field = self.field(name, Type::Pointer);
        self.registry.set_class_vptr_entity(self.class, Some(field));
        field
    }

    /// Declares a global data entity holding the class's runtime type information.
    pub fn rtti(&mut self) -> EntityId {
        let name = format!("{}$rtti", self.program.class(self.class).name);
        let entity = self.program.add_data_entity(Owner::Global, &name);
        self.registry.set_class_rtti_entity(self.class, Some(entity));
        entity
    }
}
