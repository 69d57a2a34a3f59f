/*! Builds a `Program` from parsed `.ool` text.
 *
 * Names may be used before they are declared, so the reader walks the parse tree in several
 * passes: class names, global declarations, class members, hierarchy and attributes, data blobs,
 * and finally function bodies. OO attributes and call-site overrides are written into the
 * session passed by the caller.
 */

use crate::error::ParseError;
use crate::{parse, Rule};
use oolower_core::{
    BlockId, Binding, Callee, ClassId, Constant, DataId, DataItem, EntityId, Function,
    FunctionBody, Instruction, InterfaceCallType, MethodType, OoSession, Owner, ParamId, Program,
    RuntimeHelper, StaticData, TempId, Terminator, Type, Value,
};
use pest::iterators::{Pair, Pairs};

type Result<T> = std::result::Result<T, ParseError>;

fn next<'i>(pairs: &mut Pairs<'i, Rule>, what: &'static str) -> Result<Pair<'i, Rule>> {
    pairs.next().ok_or(ParseError::Malformed(what))
}

fn first_inner<'i>(pair: Pair<'i, Rule>, what: &'static str) -> Result<Pair<'i, Rule>> {
    next(&mut pair.into_inner(), what)
}

fn parse_number<T: std::str::FromStr>(text: &str, what: &'static str) -> Result<T> {
    text.parse().map_err(|_| ParseError::invalid(what, text))
}

/// Reverses the escapes produced by `{:?}` formatting of a string.
fn unescape(quoted: &str) -> Result<String> {
    let inner = quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| ParseError::invalid("string", quoted))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('u') => {
                let code: String = chars
                    .by_ref()
                    .skip_while(|&c| c == '{')
                    .take_while(|&c| c != '}')
                    .collect();
                let value = u32::from_str_radix(&code, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| ParseError::invalid("unicode escape", code.clone()))?;
                out.push(value);
            }
            other => {
                return Err(ParseError::invalid(
                    "escape",
                    other.map(String::from).unwrap_or_default(),
                ))
            }
        }
    }
    Ok(out)
}

/// Top-level declarations grouped by kind, each group in source order.
#[derive(Default)]
struct Items<'i> {
    declarations: Vec<Pair<'i, Rule>>,
    data: Vec<Pair<'i, Rule>>,
    classes: Vec<Pair<'i, Rule>>,
    functions: Vec<Pair<'i, Rule>>,
}

pub struct ProgramReader<'s> {
    session: &'s mut OoSession,
    pending_initializers: Vec<(EntityId, String)>,
}

impl<'s> ProgramReader<'s> {
    pub fn new(session: &'s mut OoSession) -> Self {
        Self {
            session,
            pending_initializers: Vec::new(),
        }
    }

    pub fn read(mut self, input: &str) -> Result<Program> {
        let root = parse(input)?
            .next()
            .ok_or(ParseError::Malformed("program"))?;

        let mut program = None;
        let mut items = Items::default();
        for pair in root.into_inner() {
            match pair.as_rule() {
                Rule::header => program = Some(self.read_header(pair)?),
                Rule::policy_decl => self.read_policy(pair)?,
                Rule::global_decl | Rule::declare_decl => items.declarations.push(pair),
                Rule::data_decl => items.data.push(pair),
                Rule::class_decl => items.classes.push(pair),
                Rule::function_decl => items.functions.push(pair),
                _ => {}
            }
        }
        let mut program = program.ok_or(ParseError::Malformed("program header"))?;

        let classes = self.declare_classes(&mut program, &items.classes)?;
        self.read_declarations(&mut program, &items.declarations)?;
        let methods = self.read_members(&mut program, &classes)?;
        self.read_hierarchy(&mut program, &classes)?;
        self.read_method_attributes(&mut program, &methods)?;
        self.read_data(&mut program, &items.data)?;
        self.apply_initializers(&mut program)?;
        for function in items.functions {
            self.read_function(&mut program, function)?;
        }

        Ok(program)
    }

    fn read_header(&mut self, pair: Pair<'_, Rule>) -> Result<Program> {
        let mut inner = pair.into_inner();
        let name = next(&mut inner, "program name")?.as_str();
        let mut program = Program::new(name);
        if inner.next().is_some() {
            program.mark_lowered();
        }
        Ok(program)
    }

    fn read_policy(&mut self, pair: Pair<'_, Rule>) -> Result<()> {
        let name = first_inner(pair, "policy")?.as_str();
        let call_type: InterfaceCallType = name
            .parse()
            .map_err(|_| ParseError::invalid("interface call type", name))?;
        self.session.set_interface_call_type(call_type);
        Ok(())
    }

    fn declare_classes<'i>(
        &mut self,
        program: &mut Program,
        decls: &[Pair<'i, Rule>],
    ) -> Result<Vec<(ClassId, Pair<'i, Rule>)>> {
        let mut classes = Vec::with_capacity(decls.len());
        for decl in decls {
            let mut inner = decl.clone().into_inner();
            let kind = next(&mut inner, "class kind")?.as_str();
            let name = next(&mut inner, "class name")?.as_str();
            if program.class_by_name(name).is_some() {
                return Err(ParseError::Duplicate(name.to_string()));
            }
            let class = program.add_class(name);
            if kind == "interface" {
                self.session.registry_mut().set_class_interface(class, true);
            }
            classes.push((class, decl.clone()));
        }
        Ok(classes)
    }

    fn read_declarations(&mut self, program: &mut Program, decls: &[Pair<'_, Rule>]) -> Result<()> {
        for decl in decls {
            let rule = decl.as_rule();
            let mut inner = decl.clone().into_inner();
            let name = next(&mut inner, "declaration name")?.as_str();
            if program.entity_by_ld_name(name).is_some() {
                return Err(ParseError::Duplicate(name.to_string()));
            }
            if rule == Rule::global_decl {
                let entity = program.add_data_entity(Owner::Global, name);
                if let Some(initializer) = inner.next() {
                    self.defer_initializer(entity, initializer)?;
                }
            } else {
                let signature = read_signature(program, next(&mut inner, "signature")?)?;
                program.add_method(Owner::Global, name, signature);
            }
        }
        Ok(())
    }

    fn defer_initializer(&mut self, entity: EntityId, initializer: Pair<'_, Rule>) -> Result<()> {
        let blob = first_inner(first_inner(initializer, "initializer")?, "blob name")?;
        self.pending_initializers.push((entity, blob.as_str().to_string()));
        Ok(())
    }

    fn read_members<'i>(
        &mut self,
        program: &mut Program,
        classes: &[(ClassId, Pair<'i, Rule>)],
    ) -> Result<Vec<(EntityId, Pair<'i, Rule>)>> {
        let mut methods = Vec::new();
        for (class, decl) in classes {
            let class = *class;
            for member in decl.clone().into_inner() {
                match member.as_rule() {
                    Rule::method_member => {
                        let mut inner = member.clone().into_inner();
                        let name = next(&mut inner, "method name")?.as_str();
                        let signature = read_signature(program, next(&mut inner, "signature")?)?;
                        let method = program.add_method(Owner::Class(class), name, signature);
                        methods.push((method, member));
                    }
                    Rule::field_member => self.read_field(program, class, member)?,
                    Rule::metadata_member => self.read_metadata(program, class, member)?,
                    _ => {}
                }
            }
        }
        Ok(methods)
    }

    fn read_field(&mut self, program: &mut Program, class: ClassId, member: Pair<'_, Rule>) -> Result<()> {
        let mut inner = member.into_inner();
        let name = next(&mut inner, "field name")?.as_str();
        let ty = read_type(program, next(&mut inner, "field type")?)?;
        let field = program.add_field(class, name, ty);

        let registry = self.session.registry_mut();
        for word in inner {
            match word.as_str() {
                "transient" => registry.set_field_transient(field, true),
                "vptr" => registry.set_class_vptr_entity(class, Some(field)),
                other => return Err(ParseError::invalid("field attribute", other)),
            }
        }
        Ok(())
    }

    /// `vtable`, `rtti` and `object` lines. A name that matches a global declaration designates
    /// that entity; any other name declares class-owned data.
    fn read_metadata(&mut self, program: &mut Program, class: ClassId, member: Pair<'_, Rule>) -> Result<()> {
        let mut inner = member.into_inner();
        let kind = next(&mut inner, "metadata kind")?.as_str();
        let name = next(&mut inner, "metadata name")?.as_str();

        let existing = program
            .entity_by_ld_name(name)
            .filter(|&entity| program.entity(entity).owner == Owner::Global);
        let entity = match existing {
            Some(entity) if kind != "object" => entity,
            _ => program.add_data_entity(Owner::Class(class), name),
        };

        let registry = self.session.registry_mut();
        match kind {
            "vtable" => registry.set_class_vtable_entity(class, Some(entity)),
            "rtti" => registry.set_class_rtti_entity(class, Some(entity)),
            _ => {}
        }
        if let Some(initializer) = inner.next() {
            self.defer_initializer(entity, initializer)?;
        }
        Ok(())
    }

    fn read_hierarchy(&mut self, program: &mut Program, classes: &[(ClassId, Pair<'_, Rule>)]) -> Result<()> {
        for (class, decl) in classes {
            let class = *class;
            for part in decl.clone().into_inner() {
                match part.as_rule() {
                    Rule::supertypes | Rule::implements => {
                        for sup in part.into_inner() {
                            let supertype = program
                                .class_by_name(sup.as_str())
                                .ok_or_else(|| ParseError::UnknownClass(sup.as_str().to_string()))?;
                            program.add_supertype(class, supertype);
                        }
                    }
                    Rule::class_flag => self.read_class_flag(class, part)?,
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn read_class_flag(&mut self, class: ClassId, flag: Pair<'_, Rule>) -> Result<()> {
        let flag = first_inner(flag, "class flag")?;
        let registry = self.session.registry_mut();
        match flag.as_rule() {
            Rule::uid_flag => {
                let text = first_inner(flag, "uid")?.as_str();
                registry.set_class_uid(class, parse_number(text, "class uid")?);
            }
            _ => match flag.as_str() {
                "abstract" => registry.set_class_abstract(class, true),
                "final" => registry.set_class_final(class, true),
                "extern" => registry.set_class_extern(class, true),
                other => return Err(ParseError::invalid("class attribute", other)),
            },
        }
        Ok(())
    }

    fn read_method_attributes(&mut self, program: &mut Program, methods: &[(EntityId, Pair<'_, Rule>)]) -> Result<()> {
        for (method, member) in methods {
            let method = *method;
            for part in member.clone().into_inner().skip(2) {
                match part.as_rule() {
                    Rule::overrides => {
                        for target in part.into_inner() {
                            let overridden = program
                                .entity_by_ld_name(target.as_str())
                                .ok_or_else(|| ParseError::UnknownEntity(target.as_str().to_string()))?;
                            program.add_override(method, overridden);
                        }
                    }
                    Rule::method_flag => self.read_method_flag(method, part)?,
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn read_method_flag(&mut self, method: EntityId, flag: Pair<'_, Rule>) -> Result<()> {
        let flag = first_inner(flag, "method flag")?;
        let registry = self.session.registry_mut();
        if flag.as_rule() == Rule::binding_flag {
            let name = first_inner(flag, "binding")?.as_str();
            let binding: Binding = name
                .parse()
                .map_err(|_| ParseError::invalid("binding", name))?;
            registry.set_entity_binding(method, binding);
            return Ok(());
        }
        match flag.as_str() {
            "abstract" => registry.set_method_abstract(method, true),
            "final" => registry.set_method_final(method, true),
            "inherited" => registry.set_method_inherited(method, true),
            "exclude_vtable" => registry.set_method_exclude_from_vtable(method, true),
            other => return Err(ParseError::invalid("method attribute", other)),
        }
        Ok(())
    }

    fn read_data(&mut self, program: &mut Program, decls: &[Pair<'_, Rule>]) -> Result<()> {
        let mut blobs = Vec::with_capacity(decls.len());
        for decl in decls {
            let mut inner = decl.clone().into_inner();
            let name = next(&mut inner, "data name")?.as_str();
            if program.data_by_name(name).is_some() {
                return Err(ParseError::Duplicate(name.to_string()));
            }
            blobs.push((program.add_data(StaticData::new(name)), inner));
        }

        for (blob, items) in blobs {
            for item in items {
                let item = read_data_item(program, first_inner(item, "data item")?)?;
                program.data_mut(blob).push(item);
            }
        }
        Ok(())
    }

    fn apply_initializers(&mut self, program: &mut Program) -> Result<()> {
        for (entity, blob) in std::mem::take(&mut self.pending_initializers) {
            let data = lookup_data(program, &blob)?;
            program.set_initializer(entity, data);
        }
        Ok(())
    }

    fn read_function(&mut self, program: &mut Program, decl: Pair<'_, Rule>) -> Result<()> {
        let mut inner = decl.into_inner();
        let name = next(&mut inner, "function name")?.as_str();
        let signature = read_signature(program, next(&mut inner, "signature")?)?;

        let existing = program
            .entity_by_ld_name(name)
            .filter(|&entity| program.entity(entity).is_method());
        let entity = match existing {
            Some(entity) => {
                if program.entity(entity).signature() != Some(&signature) {
                    return Err(ParseError::SignatureMismatch(name.to_string()));
                }
                entity
            }
            None => program.add_method(Owner::Global, name, signature.clone()),
        };
        if program.has_graph(entity) {
            return Err(ParseError::Duplicate(name.to_string()));
        }

        let mut function = Function::new(entity, signature);
        let blocks: Vec<_> = inner.collect();
        for block in &blocks {
            let label = first_inner(block.clone(), "block label")?;
            function.body.ensure_block(read_block_id(label)?);
        }
        for block in blocks {
            self.read_block(program, &mut function.body, block)?;
        }
        for block in function.body.blocks.values() {
            for target in block.successors() {
                if function.body.get_block(target).is_none() {
                    return Err(ParseError::invalid("branch target", target.to_string()));
                }
            }
        }
        program.add_function(function);
        Ok(())
    }

    fn read_block(&mut self, program: &mut Program, body: &mut FunctionBody, pair: Pair<'_, Rule>) -> Result<()> {
        let mut inner = pair.into_inner();
        let id = read_block_id(next(&mut inner, "block label")?)?;
        if body.get_block(id).map(|block| block.is_terminated()).unwrap_or(false) {
            return Err(ParseError::Duplicate(id.to_string()));
        }

        let mut instructions = Vec::new();
        let mut terminator = Terminator::Invalid;
        for part in inner {
            match part.as_rule() {
                Rule::stmt => instructions.push(self.read_stmt(program, body, part)?),
                Rule::terminator => terminator = read_terminator(body, part)?,
                _ => {}
            }
        }

        let block = body.ensure_block(id);
        block.instructions = instructions;
        block.set_terminator(terminator);
        Ok(())
    }

    fn read_stmt(&mut self, program: &mut Program, body: &mut FunctionBody, pair: Pair<'_, Rule>) -> Result<Instruction> {
        let text = pair.as_str().to_string();
        let mut inner = pair.into_inner();
        let first = next(&mut inner, "statement")?;
        let (result, op) = if first.as_rule() == Rule::temp {
            (Some(read_temp(body, first.as_str())?), next(&mut inner, "operation")?)
        } else {
            (None, first)
        };
        let rule = op.as_rule();
        let mut args = op.into_inner();

        let required = |result: Option<Value>| result.ok_or_else(|| ParseError::invalid("statement without result", text.clone()));

        let instruction = match rule {
            Rule::arith_op => {
                let kind = next(&mut args, "arithmetic kind")?.as_str().to_string();
                let ty = read_type(program, next(&mut args, "type")?)?;
                let left = read_value(body, next(&mut args, "operand")?)?;
                let right = read_value(body, next(&mut args, "operand")?)?;
                let result = required(result)?;
                match kind.as_str() {
                    "add" => Instruction::Add { result, left, right, ty },
                    "sub" => Instruction::Sub { result, left, right, ty },
                    _ => Instruction::Mul { result, left, right, ty },
                }
            }
            Rule::eq_op => Instruction::Eq {
                left: read_value(body, next(&mut args, "operand")?)?,
                right: read_value(body, next(&mut args, "operand")?)?,
                result: required(result)?,
            },
            Rule::copy_op => Instruction::Copy {
                value: read_value(body, next(&mut args, "operand")?)?,
                result: required(result)?,
            },
            Rule::load_op => Instruction::Load {
                ty: read_type(program, next(&mut args, "type")?)?,
                address: read_value(body, next(&mut args, "address")?)?,
                result: required(result)?,
            },
            Rule::store_op => {
                if result.is_some() {
                    return Err(ParseError::invalid("store with a result", text.clone()));
                }
                Instruction::Store {
                    ty: read_type(program, next(&mut args, "type")?)?,
                    address: read_value(body, next(&mut args, "address")?)?,
                    value: read_value(body, next(&mut args, "value")?)?,
                }
            }
            Rule::addressof_op => Instruction::AddressOf {
                entity: lookup_entity(program, next(&mut args, "entity")?.as_str())?,
                result: required(result)?,
            },
            Rule::member_op => Instruction::Member {
                object: read_value(body, next(&mut args, "object")?)?,
                field: lookup_entity(program, next(&mut args, "field")?.as_str())?,
                result: required(result)?,
            },
            Rule::offset_op => Instruction::Offset {
                base: read_value(body, next(&mut args, "base")?)?,
                offset: parse_number(next(&mut args, "offset")?.as_str(), "offset")?,
                result: required(result)?,
            },
            Rule::sizeof_op => Instruction::SizeOf {
                class: lookup_class(program, next(&mut args, "class")?.as_str())?,
                result: required(result)?,
            },
            Rule::new_op => Instruction::Alloc {
                class: lookup_class(program, next(&mut args, "class")?.as_str())?,
                result: required(result)?,
            },
            Rule::newarray_op => Instruction::AllocArray {
                element: read_type(program, next(&mut args, "element type")?)?,
                count: read_value(body, next(&mut args, "count")?)?,
                result: required(result)?,
            },
            Rule::arraylength_op => Instruction::ArrayLength {
                array: read_value(body, next(&mut args, "array")?)?,
                result: required(result)?,
            },
            Rule::instanceof_op => Instruction::InstanceOf {
                object: read_value(body, next(&mut args, "object")?)?,
                class: lookup_class(program, next(&mut args, "class")?.as_str())?,
                result: required(result)?,
            },
            Rule::direct_call => {
                let kind = next(&mut args, "call kind")?.as_str();
                let entity = lookup_entity(program, next(&mut args, "callee")?.as_str())?;
                let callee = if kind == "call.static" {
                    Callee::Static(entity)
                } else {
                    Callee::Dynamic(entity)
                };
                self.read_call(program, body, callee, result, args)?
            }
            Rule::indirect_call => {
                let target = read_value(body, next(&mut args, "call target")?)?;
                self.read_call(program, body, Callee::Indirect(target), result, args)?
            }
            Rule::runtime_call => {
                let symbol = next(&mut args, "runtime helper")?.as_str();
                let helper = RuntimeHelper::from_symbol(symbol)
                    .ok_or_else(|| ParseError::invalid("runtime helper", symbol))?;
                let args = match args.next() {
                    Some(list) => read_values(body, list)?,
                    None => Vec::new(),
                };
                Instruction::CallRuntime { result, helper, args }
            }
            _ => return Err(ParseError::invalid("operation", text.clone())),
        };
        Ok(instruction)
    }

    fn read_call(
        &mut self,
        program: &mut Program,
        body: &mut FunctionBody,
        callee: Callee,
        result: Option<Value>,
        rest: Pairs<'_, Rule>,
    ) -> Result<Instruction> {
        let site = program.new_call_site();
        let mut args = Vec::new();
        for part in rest {
            match part.as_rule() {
                Rule::args => args = read_values(body, part)?,
                Rule::site_override => {
                    let statically_bound = part.as_str() == "!static";
                    self.session.set_call_is_statically_bound(site, statically_bound);
                }
                _ => {}
            }
        }
        Ok(Instruction::Call {
            result,
            callee,
            args,
            site,
        })
    }
}

fn lookup_class(program: &Program, name: &str) -> Result<ClassId> {
    program
        .class_by_name(name)
        .ok_or_else(|| ParseError::UnknownClass(name.to_string()))
}

fn lookup_entity(program: &Program, name: &str) -> Result<EntityId> {
    program
        .entity_by_ld_name(name)
        .ok_or_else(|| ParseError::UnknownEntity(name.to_string()))
}

fn lookup_data(program: &Program, name: &str) -> Result<DataId> {
    program
        .data_by_name(name)
        .ok_or_else(|| ParseError::UnknownData(name.to_string()))
}

fn read_type(program: &Program, pair: Pair<'_, Rule>) -> Result<Type> {
    let inner = first_inner(pair, "type")?;
    match inner.as_rule() {
        Rule::prim_ty => {
            let text = inner.as_str();
            match text {
                "bool" => Ok(Type::Bool),
                "ptr" => Ok(Type::Pointer),
                _ if text.starts_with('i') => Ok(Type::Int(parse_number(&text[1..], "integer width")?)),
                _ => Ok(Type::Uint(parse_number(&text[1..], "integer width")?)),
            }
        }
        Rule::class_ty => Ok(Type::Class(lookup_class(program, inner.as_str())?)),
        Rule::array_ty => Ok(Type::Array(Box::new(read_type(program, first_inner(inner, "element type")?)?))),
        Rule::fn_ty => Ok(Type::Method(Box::new(read_signature(program, first_inner(inner, "signature")?)?))),
        _ => Err(ParseError::invalid("type", inner.as_str())),
    }
}

fn read_type_list(program: &Program, pair: Pair<'_, Rule>) -> Result<Vec<Type>> {
    pair.into_inner().map(|ty| read_type(program, ty)).collect()
}

fn read_signature(program: &Program, pair: Pair<'_, Rule>) -> Result<MethodType> {
    let mut signature = MethodType::default();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::type_list => signature.params = read_type_list(program, part)?,
            Rule::returns => {
                let returned = first_inner(part, "return type")?;
                signature.returns = match returned.as_rule() {
                    Rule::type_list => read_type_list(program, returned)?,
                    _ => vec![read_type(program, returned)?],
                };
            }
            _ => {}
        }
    }
    Ok(signature)
}

fn read_data_item(program: &Program, pair: Pair<'_, Rule>) -> Result<DataItem> {
    match pair.as_rule() {
        Rule::null_lit => Ok(DataItem::Null),
        Rule::trap_lit => Ok(DataItem::Trap),
        Rule::integer => Ok(DataItem::Int(parse_number(pair.as_str(), "integer")?)),
        Rule::string => Ok(DataItem::Str(unescape(pair.as_str())?)),
        Rule::address_item => {
            let name = first_inner(pair, "address")?;
            Ok(DataItem::Address(lookup_entity(program, name.as_str())?))
        }
        Rule::blob_ref => {
            let name = first_inner(pair, "blob name")?;
            Ok(DataItem::DataRef(lookup_data(program, name.as_str())?))
        }
        _ => Err(ParseError::invalid("data item", pair.as_str())),
    }
}

fn read_temp(body: &mut FunctionBody, text: &str) -> Result<Value> {
    let id = TempId(parse_number(&text[1..], "temporary")?);
    body.reserve_temp(id);
    Ok(Value::Temp(id))
}

fn read_value(body: &mut FunctionBody, pair: Pair<'_, Rule>) -> Result<Value> {
    let inner = first_inner(pair, "value")?;
    let text = inner.as_str();
    match inner.as_rule() {
        Rule::temp => read_temp(body, text),
        Rule::param => Ok(Value::Param(ParamId(parse_number(&text[1..], "parameter")?))),
        Rule::integer => Ok(Value::int(parse_number(text, "integer")?)),
        Rule::bool_lit => Ok(Value::Constant(Constant::Bool(text == "true"))),
        Rule::null_lit => Ok(Value::null()),
        Rule::undef_lit => Ok(Value::Undefined),
        Rule::string => Ok(Value::Constant(Constant::Str(unescape(text)?))),
        _ => Err(ParseError::invalid("value", text)),
    }
}

fn read_values(body: &mut FunctionBody, pair: Pair<'_, Rule>) -> Result<Vec<Value>> {
    pair.into_inner().map(|value| read_value(body, value)).collect()
}

fn read_block_id(pair: Pair<'_, Rule>) -> Result<BlockId> {
    let text = pair.as_str();
    let number = text
        .strip_prefix("block")
        .ok_or_else(|| ParseError::invalid("block label", text))?;
    Ok(BlockId(parse_number(number, "block label")?))
}

fn read_terminator(body: &mut FunctionBody, pair: Pair<'_, Rule>) -> Result<Terminator> {
    let term = first_inner(pair, "terminator")?;
    let rule = term.as_rule();
    let mut inner = term.into_inner();
    match rule {
        Rule::return_term => match inner.next() {
            Some(value) => Ok(Terminator::Return(Some(read_value(body, value)?))),
            None => Ok(Terminator::Return(None)),
        },
        Rule::jump_term => Ok(Terminator::Jump(read_block_id(next(&mut inner, "jump target")?)?)),
        Rule::branch_term => Ok(Terminator::Branch {
            condition: read_value(body, next(&mut inner, "condition")?)?,
            then_block: read_block_id(next(&mut inner, "then block")?)?,
            else_block: read_block_id(next(&mut inner, "else block")?)?,
        }),
        _ => Ok(Terminator::Unreachable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#""plain""#).unwrap(), "plain");
        assert_eq!(unescape(r#""a\"b\\c\n""#).unwrap(), "a\"b\\c\n");
        assert_eq!(unescape(r#""\u{e9}""#).unwrap(), "\u{e9}");
        assert!(unescape(r#""\q""#).is_err());
    }

    #[test]
    fn test_unescape_inverts_debug() {
        let original = "tab\there \"quoted\" \u{1F600}";
        assert_eq!(unescape(&format!("{:?}", original)).unwrap(), original);
    }
}
