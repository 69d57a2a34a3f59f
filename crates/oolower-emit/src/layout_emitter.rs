use crate::config::EmitterConfig;
use crate::emitter::{EmitContext, EmitHelper, EmitResult, Emitter, Tint};
use oolower_core::layout::{ClassLayout, VTABLE_ITABLE_INDEX, VTABLE_RTTI_INDEX};
use oolower_core::{InterfaceCallType, Program, ProgramLayout, SlotTarget};
use std::io::Write;

/// Prints vtables, itables and field offsets of a computed layout.
pub struct LayoutEmitter<'p> {
    program: &'p Program,
    config: EmitterConfig,
}

impl<'p> LayoutEmitter<'p> {
    pub fn new(program: &'p Program, config: EmitterConfig) -> Self {
        Self { program, config }
    }

    fn target_name(&self, target: SlotTarget, context: &EmitContext) -> String {
        match target {
            SlotTarget::Method(method) => self.program.entity(method).ld_name.clone(),
            SlotTarget::Trap => EmitHelper::tinted(context, "trap", Tint::Trap),
            SlotTarget::Empty => "-".to_string(),
        }
    }

    fn emit_interface<W: Write>(
        &self,
        layout: &ProgramLayout,
        class: &ClassLayout,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        let name = &self.program.class(class.class).name;
        let header = format!("{} {}", EmitHelper::tinted(context, "interface", Tint::Keyword), name);
        EmitHelper::write_block(writer, context, &header, |w, ctx| {
            for method in self.program.methods(class.class) {
                let mut line = self.program.entity(method).ld_name.clone();
                if let Some(index) = layout.interface_method_index(method) {
                    line.push_str(&format!(" index {}", index));
                }
                if let Some(slot) = layout.interface_slot(method) {
                    line.push_str(&format!(" slot {}", slot));
                }
                EmitHelper::write_line(w, ctx, &line)?;
            }
            Ok(())
        })
    }

    fn emit_class<W: Write>(
        &self,
        layout: &ProgramLayout,
        class: &ClassLayout,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        let name = &self.program.class(class.class).name;
        let mut header = format!(
            "{} {} size {}",
            EmitHelper::tinted(context, "class", Tint::Keyword),
            name,
            class.instance_size
        );
        if let Some(offset) = class.vptr_offset {
            header.push_str(&format!(" vptr +{}", offset));
        }

        EmitHelper::write_block(writer, context, &header, |w, ctx| {
            EmitHelper::write_line(w, ctx, "vtable:")?;
            ctx.indent();
            EmitHelper::write_line(w, ctx, &format!("[{}] rtti", VTABLE_RTTI_INDEX))?;
            EmitHelper::write_line(w, ctx, &format!("[{}] itable", VTABLE_ITABLE_INDEX))?;
            for (slot, entry) in class.vtable.iter().enumerate() {
                let mut line = format!(
                    "[{}] {}",
                    layout.vtable_offset(slot) / i64::from(layout.pointer_size),
                    self.target_name(entry.target, ctx)
                );
                if self.config.verbosity.should_annotate() {
                    line.push_str(&format!(
                        "  // slot {} from {}",
                        slot,
                        self.program.entity(entry.declared_by).ld_name
                    ));
                }
                EmitHelper::write_line(w, ctx, &line)?;
            }
            ctx.dedent();

            match layout.interface_call_type {
                InterfaceCallType::RuntimeLookup => {}
                InterfaceCallType::IndexedItable => {
                    EmitHelper::write_line(w, ctx, "itable:")?;
                    ctx.indent();
                    for (index, target) in class.indexed_itable.iter().enumerate() {
                        EmitHelper::write_line(w, ctx, &format!("[{}] {}", index, self.target_name(*target, ctx)))?;
                    }
                    ctx.dedent();
                }
                InterfaceCallType::SearchedItable { .. } => {
                    EmitHelper::write_line(w, ctx, "itable:")?;
                    ctx.indent();
                    for entry in &class.itable {
                        let targets = entry
                            .methods
                            .iter()
                            .map(|(_, target)| self.target_name(*target, ctx))
                            .collect::<Vec<_>>()
                            .join(", ");
                        EmitHelper::write_line(
                            w,
                            ctx,
                            &format!("{}: [{}]", self.program.class(entry.interface).name, targets),
                        )?;
                    }
                    ctx.dedent();
                }
            }

            if !class.field_offsets.is_empty() {
                EmitHelper::write_line(w, ctx, "fields:")?;
                ctx.indent();
                for (field, offset) in &class.field_offsets {
                    EmitHelper::write_line(w, ctx, &format!("+{} {}", offset, self.program.entity(*field).ld_name))?;
                }
                ctx.dedent();
            }
            Ok(())
        })
    }
}

impl Emitter for LayoutEmitter<'_> {
    type Item = ProgramLayout;

    fn config(&self) -> &EmitterConfig {
        &self.config
    }

    fn emit<W: Write>(&self, layout: &ProgramLayout, writer: &mut W, context: &mut EmitContext) -> EmitResult {
        EmitHelper::write_section(
            writer,
            context,
            &format!(
                "Layout of {} ({}, pointer size {})",
                self.program.name, layout.interface_call_type, layout.pointer_size
            ),
        )?;
        for class in layout.classes() {
            if class.is_interface {
                self.emit_interface(layout, class, writer, context)?;
            } else {
                self.emit_class(layout, class, writer, context)?;
            }
        }
        Ok(())
    }
}
