/*! `.ool` text output.
 *
 * The output is the format read by `oolower-parser`: declarations first, then classes with their
 * members and attributes, then function bodies. Attributes come from the session registry, so a
 * program emitted with one session and parsed into another carries the same OO configuration.
 */

use crate::config::EmitterConfig;
use crate::emitter::{EmitContext, EmitHelper, EmitResult, Emitter, Tint};
use oolower_core::{
    BasicBlock, Binding, Callee, ClassId, DataItem, EntityId, EntityKind, Function, Instruction,
    InterfaceCallType, MethodType, OoSession, Owner, Program, Terminator, Type, Value,
};
use std::io::Write;

/// Renders a type with class ids resolved to class names.
pub fn format_type(program: &Program, ty: &Type) -> String {
    match ty {
        Type::Class(class) => program.class(*class).name.clone(),
        Type::Array(elem) => format!("[{}]", format_type(program, elem)),
        Type::Method(sig) => format!("fn{}", format_signature(program, sig)),
        other => other.to_string(),
    }
}

fn format_signature(program: &Program, sig: &MethodType) -> String {
    let params = sig
        .params
        .iter()
        .map(|ty| format_type(program, ty))
        .collect::<Vec<_>>()
        .join(", ");
    let mut text = format!("({})", params);
    match sig.returns.as_slice() {
        [] => {}
        [single] => text.push_str(&format!(" -> {}", format_type(program, single))),
        many => {
            let returns = many
                .iter()
                .map(|ty| format_type(program, ty))
                .collect::<Vec<_>>()
                .join(", ");
            text.push_str(&format!(" -> ({})", returns));
        }
    }
    text
}

fn format_args(args: &[Value]) -> String {
    args.iter()
        .map(|arg| arg.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct ProgramEmitter<'s> {
    session: &'s OoSession,
    config: EmitterConfig,
}

impl<'s> ProgramEmitter<'s> {
    pub fn new(session: &'s OoSession, config: EmitterConfig) -> Self {
        Self { session, config }
    }

    fn ld_name<'p>(&self, program: &'p Program, entity: EntityId) -> &'p str {
        &program.entity(entity).ld_name
    }

    fn emit_header<W: Write>(&self, program: &Program, writer: &mut W, context: &EmitContext) -> EmitResult {
        let keyword = EmitHelper::tinted(context, "program", Tint::Keyword);
        let lowered = if program.is_lowered() { " lowered" } else { "" };
        EmitHelper::write_line(writer, context, &format!("{} {}{}", keyword, program.name, lowered))?;

        let policy = self.session.interface_call_type();
        if policy != InterfaceCallType::default() {
            EmitHelper::write_line(writer, context, &format!("policy {}", policy))?;
        }
        Ok(())
    }

    fn emit_declarations<W: Write>(&self, program: &Program, writer: &mut W, context: &EmitContext) -> EmitResult {
        let mut wrote_any = false;
        for (id, entity) in program.entities() {
            if entity.owner != Owner::Global {
                continue;
            }
            let line = match &entity.kind {
                EntityKind::Data => {
                    let mut line = format!("global {}", entity.ld_name);
                    if let Some(data) = entity.initializer {
                        line.push_str(&format!(" = @{}", program.data(data).name));
                    }
                    line
                }
                EntityKind::Method(sig) if !program.has_graph(id) => {
                    format!("declare {}{}", entity.ld_name, format_signature(program, sig))
                }
                _ => continue,
            };
            if self.config.verbosity.should_print_ids() {
                EmitHelper::write_comment(writer, context, &id.to_string())?;
            }
            EmitHelper::write_line(writer, context, &line)?;
            wrote_any = true;
        }
        if wrote_any {
            writeln!(writer)?;
        }
        Ok(())
    }

    fn format_data_item(&self, program: &Program, item: &DataItem) -> String {
        match item {
            DataItem::Null => "null".to_string(),
            DataItem::Int(value) => value.to_string(),
            DataItem::Str(text) => format!("{:?}", text),
            DataItem::Address(entity) => format!("&{}", self.ld_name(program, *entity)),
            DataItem::DataRef(data) => format!("@{}", program.data(*data).name),
            DataItem::Trap => "trap".to_string(),
        }
    }

    fn emit_data<W: Write>(&self, program: &Program, writer: &mut W, context: &EmitContext) -> EmitResult {
        if !self.config.verbosity.should_print_data() {
            return Ok(());
        }
        let mut wrote_any = false;
        for (_, blob) in program.data_blobs() {
            let items = blob
                .items
                .iter()
                .map(|item| self.format_data_item(program, item))
                .collect::<Vec<_>>()
                .join(", ");
            let keyword = EmitHelper::tinted(context, "data", Tint::Keyword);
            EmitHelper::write_line(writer, context, &format!("{} {} = [{}]", keyword, blob.name, items))?;
            wrote_any = true;
        }
        if wrote_any {
            writeln!(writer)?;
        }
        Ok(())
    }

    fn class_header(&self, program: &Program, class: ClassId, context: &EmitContext) -> String {
        let registry = self.session.registry();
        let attrs = registry.class_attributes(class);
        let class_type = program.class(class);

        let keyword = if attrs.is_interface { "interface" } else { "class" };
        let mut header = format!(
            "{} {}",
            EmitHelper::tinted(context, keyword, Tint::Keyword),
            EmitHelper::tinted(context, &class_type.name, Tint::Name)
        );
        if !class_type.supertypes.is_empty() {
            let supers = class_type
                .supertypes
                .iter()
                .map(|sup| program.class(*sup).name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            header.push_str(&format!(" extends {}", supers));
        }
        if attrs.uid != 0 {
            header.push_str(&format!(" uid {}", attrs.uid));
        }
        if attrs.is_abstract {
            header.push_str(" abstract");
        }
        if attrs.is_final {
            header.push_str(" final");
        }
        if attrs.is_extern {
            header.push_str(" extern");
        }
        header
    }

    fn member_line(&self, program: &Program, class: ClassId, member: EntityId) -> String {
        let registry = self.session.registry();
        let entity = program.entity(member);
        let attrs = registry.entity_attributes(member);

        match &entity.kind {
            EntityKind::Method(sig) => {
                let mut line = format!("method {}{}", entity.name, format_signature(program, sig));
                if !entity.overrides.is_empty() {
                    let overridden = entity
                        .overrides
                        .iter()
                        .map(|target| self.ld_name(program, *target))
                        .collect::<Vec<_>>()
                        .join(", ");
                    line.push_str(&format!(" overrides {}", overridden));
                }
                if attrs.is_abstract {
                    line.push_str(" abstract");
                }
                if attrs.is_final {
                    line.push_str(" final");
                }
                if attrs.is_inherited {
                    line.push_str(" inherited");
                }
                if attrs.exclude_from_vtable {
                    line.push_str(" exclude_vtable");
                }
                if attrs.binding != Binding::Unknown {
                    line.push_str(&format!(" binding({})", attrs.binding));
                }
                line
            }
            EntityKind::Field(ty) => {
                let mut line = format!("field {}: {}", entity.name, format_type(program, ty));
                if attrs.is_transient {
                    line.push_str(" transient");
                }
                if registry.class_vptr_entity(class) == Some(member) {
                    line.push_str(" vptr");
                }
                line
            }
            EntityKind::Data => {
                let keyword = if registry.class_vtable_entity(class) == Some(member) {
                    "vtable"
                } else if registry.class_rtti_entity(class) == Some(member) {
                    "rtti"
                } else {
                    "object"
                };
                let mut line = format!("{} {}", keyword, entity.ld_name);
                if let Some(data) = entity.initializer {
                    line.push_str(&format!(" = @{}", program.data(data).name));
                }
                line
            }
        }
    }

    /// Metadata entities designated for `class` but declared elsewhere, printed as references.
    fn metadata_references(&self, program: &Program, class: ClassId) -> Vec<String> {
        let registry = self.session.registry();
        let owned_elsewhere = |entity: &EntityId| program.entity(*entity).owner != Owner::Class(class);
        let mut lines = Vec::new();
        if let Some(vtable) = registry.class_vtable_entity(class).filter(owned_elsewhere) {
            lines.push(format!("vtable {}", self.ld_name(program, vtable)));
        }
        if let Some(rtti) = registry.class_rtti_entity(class).filter(owned_elsewhere) {
            lines.push(format!("rtti {}", self.ld_name(program, rtti)));
        }
        lines
    }

    fn emit_classes<W: Write>(&self, program: &Program, writer: &mut W, context: &mut EmitContext) -> EmitResult {
        for (class, class_type) in program.classes() {
            let header = self.class_header(program, class, context);
            let references = self.metadata_references(program, class);
            if class_type.members.is_empty() && references.is_empty() {
                EmitHelper::write_line(writer, context, &format!("{} {{}}", header))?;
            } else {
                EmitHelper::write_block(writer, context, &header, |w, ctx| {
                    for &member in &class_type.members {
                        if self.config.verbosity.should_print_ids() {
                            EmitHelper::write_comment(w, ctx, &member.to_string())?;
                        }
                        EmitHelper::write_line(w, ctx, &self.member_line(program, class, member))?;
                    }
                    for line in &references {
                        EmitHelper::write_line(w, ctx, line)?;
                    }
                    Ok(())
                })?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    fn site_suffix(&self, instruction: &Instruction) -> &'static str {
        match instruction
            .call_site()
            .and_then(|site| self.session.call_is_statically_bound(site))
        {
            Some(true) => " !static",
            Some(false) => " !dynamic",
            None => "",
        }
    }

    pub fn format_instruction(&self, program: &Program, instruction: &Instruction) -> String {
        let ty = |ty: &Type| format_type(program, ty);
        match instruction {
            Instruction::Add { result, left, right, ty: t } => {
                format!("{} = add.{} {}, {}", result, ty(t), left, right)
            }
            Instruction::Sub { result, left, right, ty: t } => {
                format!("{} = sub.{} {}, {}", result, ty(t), left, right)
            }
            Instruction::Mul { result, left, right, ty: t } => {
                format!("{} = mul.{} {}, {}", result, ty(t), left, right)
            }
            Instruction::Eq { result, left, right } => format!("{} = eq {}, {}", result, left, right),
            Instruction::Copy { result, value } => format!("{} = copy {}", result, value),
            Instruction::Load { result, address, ty: t } => {
                format!("{} = load.{} {}", result, ty(t), address)
            }
            Instruction::Store { address, value, ty: t } => {
                format!("store.{} {}, {}", ty(t), address, value)
            }
            Instruction::AddressOf { result, entity } => {
                format!("{} = addressof {}", result, self.ld_name(program, *entity))
            }
            Instruction::Member { result, object, field } => {
                format!("{} = member {}, {}", result, object, self.ld_name(program, *field))
            }
            Instruction::Offset { result, base, offset } => {
                format!("{} = offset {}, {}", result, base, offset)
            }
            Instruction::SizeOf { result, class } => {
                format!("{} = sizeof {}", result, program.class(*class).name)
            }
            Instruction::Call { result, callee, args, .. } => {
                let call = match callee {
                    Callee::Static(entity) => {
                        format!("call.static {}({})", self.ld_name(program, *entity), format_args(args))
                    }
                    Callee::Dynamic(entity) => {
                        format!("call.dynamic {}({})", self.ld_name(program, *entity), format_args(args))
                    }
                    Callee::Indirect(target) => format!("call.indirect {}({})", target, format_args(args)),
                };
                let call = format!("{}{}", call, self.site_suffix(instruction));
                match result {
                    Some(result) => format!("{} = {}", result, call),
                    None => call,
                }
            }
            Instruction::CallRuntime { result, helper, args } => {
                let call = format!("call.runtime {}({})", helper, format_args(args));
                match result {
                    Some(result) => format!("{} = {}", result, call),
                    None => call,
                }
            }
            Instruction::Alloc { result, class } => {
                format!("{} = new {}", result, program.class(*class).name)
            }
            Instruction::AllocArray { result, element, count } => {
                format!("{} = newarray {}, {}", result, ty(element), count)
            }
            Instruction::ArrayLength { result, array } => format!("{} = arraylength {}", result, array),
            Instruction::InstanceOf { result, object, class } => {
                format!("{} = instanceof {}, {}", result, object, program.class(*class).name)
            }
        }
    }

    fn format_terminator(&self, terminator: &Terminator) -> String {
        match terminator {
            Terminator::Jump(target) => format!("jump {}", target),
            Terminator::Branch {
                condition,
                then_block,
                else_block,
            } => format!("branch {}, {}, {}", condition, then_block, else_block),
            Terminator::Return(Some(value)) => format!("return {}", value),
            Terminator::Return(None) => "return".to_string(),
            Terminator::Unreachable | Terminator::Invalid => "unreachable".to_string(),
        }
    }

    fn emit_block<W: Write>(
        &self,
        program: &Program,
        block: &BasicBlock,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        EmitHelper::write_line(writer, context, &format!("{}:", block.id))?;
        context.indent();
        for instruction in &block.instructions {
            if self.config.verbosity.should_print_ids() {
                if let Some(site) = instruction.call_site() {
                    EmitHelper::write_comment(writer, context, &site.to_string())?;
                }
            }
            EmitHelper::write_line(writer, context, &self.format_instruction(program, instruction))?;
        }
        EmitHelper::write_line(writer, context, &self.format_terminator(&block.terminator))?;
        context.dedent();
        Ok(())
    }

    fn emit_function<W: Write>(
        &self,
        program: &Program,
        function: &Function,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        if self.config.verbosity.should_annotate() {
            EmitHelper::write_comment(
                writer,
                context,
                &format!(
                    "{} blocks, {} instructions",
                    function.body.blocks.len(),
                    function.instruction_count()
                ),
            )?;
        }
        let header = format!(
            "{} {}{}",
            EmitHelper::tinted(context, "function", Tint::Keyword),
            self.ld_name(program, function.entity),
            format_signature(program, &function.signature)
        );
        EmitHelper::write_block(writer, context, &header, |w, ctx| {
            for block in function.body.blocks.values() {
                self.emit_block(program, block, w, ctx)?;
            }
            Ok(())
        })?;
        writeln!(writer)?;
        Ok(())
    }
}

impl Emitter for ProgramEmitter<'_> {
    type Item = Program;

    fn config(&self) -> &EmitterConfig {
        &self.config
    }

    fn emit<W: Write>(&self, program: &Program, writer: &mut W, context: &mut EmitContext) -> EmitResult {
        self.emit_header(program, writer, context)?;
        writeln!(writer)?;
        self.emit_declarations(program, writer, context)?;
        self.emit_data(program, writer, context)?;
        self.emit_classes(program, writer, context)?;
        for function in program.functions() {
            self.emit_function(program, function, writer, context)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oolower_core::{ProgramBuilder, RuntimeHelper};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_class_types_print_by_name() {
        let mut program = Program::new("types");
        let shape = program.add_class("Shape");
        let ty = Type::Array(Box::new(Type::Class(shape)));
        assert_eq!(format_type(&program, &ty), "[Shape]");

        let sig = MethodType::new(vec![Type::Class(shape), Type::Int(32)], vec![Type::Bool, Type::Pointer]);
        assert_eq!(format_signature(&program, &sig), "(Shape, i32) -> (bool, ptr)");
    }

    #[test]
    fn test_runtime_call_uses_helper_symbol() {
        let session = OoSession::new();
        let program = Program::new("rt");
        let emitter = ProgramEmitter::new(&session, EmitterConfig::plain());
        let inst = Instruction::CallRuntime {
            result: Some(Value::Temp(oolower_core::TempId(0))),
            helper: RuntimeHelper::Calloc,
            args: vec![Value::int(1), Value::int(16)],
        };
        assert_eq!(
            emitter.format_instruction(&program, &inst),
            "v0 = call.runtime calloc(1, 16)"
        );
    }

    #[test]
    fn test_attributes_are_printed() {
        let mut builder = ProgramBuilder::new("attrs");
        let base = builder.class("Base").abstract_class().uid(7).id();
        let area = builder
            .class_builder(base)
            .abstract_method("area", MethodType::new(vec![Type::Class(base)], vec![Type::Int(32)]));
        let derived = builder.class("Derived").extends(base).final_class().id();
        builder.class_builder(derived).override_method(area);
        let (program, session) = builder.finish();

        let text = ProgramEmitter::new(&session, EmitterConfig::plain())
            .emit_to_string(&program)
            .unwrap();

        assert!(text.contains("class Base uid 7 abstract {"));
        assert!(text.contains("    method area(Base) -> i32 abstract"));
        assert!(text.contains("class Derived extends Base final {"));
        assert!(text.contains("    method area(Base) -> i32 overrides Base.area"));
    }
}
