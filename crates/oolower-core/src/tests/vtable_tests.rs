use crate::builder::ProgramBuilder;
use crate::config::LoweringConfig;
use crate::layout::{SlotTarget, VTABLE_HEADER_SLOTS};
use crate::registry::Binding;
use crate::session::OoSession;
use crate::types::{MethodType, Type};
use pretty_assertions::assert_eq;

fn method_sig() -> MethodType {
    MethodType::new(vec![Type::Pointer], vec![Type::Int(32)])
}

#[test]
fn test_override_chain_shares_slot() {
    let mut builder = ProgramBuilder::new("chain");
    let mut class_a = builder.class("A");
    let a = class_a.id();
    let a_f = class_a.method("f", method_sig());
    let a_g = class_a.method("g", method_sig());

    let mut class_b = builder.class("B");
    class_b.extends(a);
    let b = class_b.id();
    let b_f = class_b.override_method(a_f);

    let mut class_c = builder.class("C");
    class_c.extends(b);
    let c = class_c.id();
    let c_f = class_c.override_method(b_f);

    let (program, session) = builder.finish();
    let layout = session.compute_layout(&program).unwrap();

    assert_eq!(layout.slot_of(a_f), Some(0));
    assert_eq!(layout.slot_of(b_f), Some(0));
    assert_eq!(layout.slot_of(c_f), Some(0));
    assert_eq!(layout.slot_of(a_g), Some(1));

    let c_layout = layout.class(c).unwrap();
    assert_eq!(c_layout.vtable.len(), 2);
    assert_eq!(c_layout.slot_target(0), Some(SlotTarget::Method(c_f)));
    assert_eq!(c_layout.slot_target(1), Some(SlotTarget::Method(a_g)));
    assert_eq!(c_layout.vtable_words(), VTABLE_HEADER_SLOTS + 2);

    let a_layout = layout.class(a).unwrap();
    assert_eq!(a_layout.slot_target(0), Some(SlotTarget::Method(a_f)));
}

#[test]
fn test_slot_offsets_skip_header() {
    let mut builder = ProgramBuilder::new("offsets");
    let mut class_a = builder.class("A");
    class_a.method("f", method_sig());
    let (program, session) = builder.finish();

    let layout = session.compute_layout(&program).unwrap();
    assert_eq!(layout.vtable_offset(0), 16);
    assert_eq!(layout.vtable_offset(3), 40);
}

#[test]
fn test_inherited_method_keeps_ancestor_target() {
    let mut builder = ProgramBuilder::new("inherited");
    let mut class_a = builder.class("A");
    let a = class_a.id();
    let a_f = class_a.method("f", method_sig());

    let mut class_b = builder.class("B");
    class_b.extends(a);
    let b = class_b.id();
    let b_f = class_b.inherit_method(a_f);

    let (program, session) = builder.finish();
    let layout = session.compute_layout(&program).unwrap();

    assert_eq!(layout.slot_of(b_f), layout.slot_of(a_f));
    let b_layout = layout.class(b).unwrap();
    assert_eq!(b_layout.vtable.len(), 1);
    assert_eq!(b_layout.slot_target(0), Some(SlotTarget::Method(a_f)));
}

#[test]
fn test_abstract_slot_traps_until_implemented() {
    let mut builder = ProgramBuilder::new("abstract");
    let mut class_a = builder.class("A");
    class_a.abstract_class();
    let a = class_a.id();
    let a_f = class_a.abstract_method("f", method_sig());

    let mut class_b = builder.class("B");
    class_b.extends(a);
    let b = class_b.id();
    let b_f = class_b.override_method(a_f);

    let (program, session) = builder.finish();
    let layout = session.compute_layout(&program).unwrap();

    assert_eq!(layout.class(a).unwrap().slot_target(0), Some(SlotTarget::Trap));
    assert_eq!(layout.class(b).unwrap().slot_target(0), Some(SlotTarget::Method(b_f)));
}

#[test]
fn test_excluded_and_static_methods_get_no_slot() {
    let mut builder = ProgramBuilder::new("excluded");
    let mut class_a = builder.class("A");
    let a = class_a.id();
    let hidden = class_a.method("hidden", method_sig());
    let helper = class_a.static_method("helper", method_sig());
    let visible = class_a.method("visible", method_sig());
    builder
        .session_mut()
        .registry_mut()
        .set_method_exclude_from_vtable(hidden, true);

    let (program, session) = builder.finish();
    let layout = session.compute_layout(&program).unwrap();

    assert_eq!(layout.slot_of(hidden), None);
    assert_eq!(layout.slot_of(helper), None);
    assert_eq!(layout.slot_of(visible), Some(0));
    assert_eq!(session.registry().entity_binding(helper), Binding::Static);
}

#[test]
fn test_excluded_override_keeps_slot_for_subclasses() {
    let mut builder = ProgramBuilder::new("excluded_chain");
    let mut class_a = builder.class("A");
    let a = class_a.id();
    let a_m = class_a.method("m", method_sig());

    let mut class_b = builder.class("B");
    class_b.extends(a);
    let b = class_b.id();
    let b_m = class_b.override_method(a_m);

    let mut class_c = builder.class("C");
    class_c.extends(b);
    let c = class_c.id();
    let c_m = class_c.override_method(b_m);

    builder
        .session_mut()
        .registry_mut()
        .set_method_exclude_from_vtable(b_m, true);

    let (program, session) = builder.finish();
    let layout = session.compute_layout(&program).unwrap();

    assert_eq!(layout.slot_of(a_m), Some(0));
    assert_eq!(layout.slot_of(b_m), None);
    assert_eq!(layout.slot_of(c_m), layout.slot_of(a_m));

    let b_layout = layout.class(b).unwrap();
    assert_eq!(b_layout.vtable.len(), 1);
    assert_eq!(b_layout.slot_target(0), Some(SlotTarget::Method(a_m)));

    let c_layout = layout.class(c).unwrap();
    assert_eq!(c_layout.vtable.len(), 1);
    assert_eq!(c_layout.slot_target(0), Some(SlotTarget::Method(c_m)));
}

#[test]
fn test_final_methods_omitted_only_when_configured() {
    let build = |omit: bool| {
        let config = LoweringConfig {
            omit_final_methods: omit,
            ..LoweringConfig::default()
        };
        let mut builder = ProgramBuilder::with_session("final", OoSession::with_config(config));
        let mut class_a = builder.class("A");
        let sealed = class_a.final_method("sealed", method_sig());
        let open = class_a.method("open", method_sig());
        let (program, session) = builder.finish();
        let layout = session.compute_layout(&program).unwrap();
        (layout.slot_of(sealed), layout.slot_of(open))
    };

    assert_eq!(build(false), (Some(0), Some(1)));
    assert_eq!(build(true), (None, Some(0)));
}

#[test]
fn test_unknown_binding_resolution() {
    let mut builder = ProgramBuilder::new("bindings");
    let mut iface = builder.interface("I");
    let i_m = iface.abstract_method("m", method_sig());

    let mut class_a = builder.class("A");
    let a = class_a.id();
    let open = class_a.method("open", method_sig());
    let sealed = class_a.final_method("sealed", method_sig());
    let abstract_final = class_a.abstract_method("both", method_sig());

    let mut class_f = builder.class("F");
    class_f.final_class();
    let in_final = class_f.method("in_final", method_sig());

    let global = builder.global_function("main", MethodType::default());
    builder
        .session_mut()
        .registry_mut()
        .set_method_final(abstract_final, true);

    let (program, session) = builder.finish();
    assert_eq!(session.effective_binding(&program, i_m), Binding::Interface);
    assert_eq!(session.effective_binding(&program, open), Binding::Dynamic);
    assert_eq!(session.effective_binding(&program, sealed), Binding::Static);
    assert_eq!(session.effective_binding(&program, abstract_final), Binding::Dynamic);
    assert_eq!(session.effective_binding(&program, in_final), Binding::Static);
    assert_eq!(session.effective_binding(&program, global), Binding::Static);
}
