use crate::config::EmitterConfig;
use anyhow::Result;
use std::io::Write;

pub type EmitResult = Result<()>;

#[derive(Debug, Clone)]
pub struct EmitContext {
    pub indent_level: usize,
    pub indent_chars: String,
    pub use_colors: bool,
}

impl EmitContext {
    pub fn new() -> Self {
        Self {
            indent_level: 0,
            indent_chars: "    ".to_string(),
            use_colors: true,
        }
    }

    pub fn from_config(config: &EmitterConfig) -> Self {
        Self {
            indent_level: 0,
            indent_chars: config.indent_style.unit(),
            use_colors: config.use_colors,
        }
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    pub fn get_indent(&self) -> String {
        self.indent_chars.repeat(self.indent_level)
    }
}

impl Default for EmitContext {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Emitter {
    type Item;

    fn config(&self) -> &EmitterConfig;

    fn emit<W: Write>(&self, item: &Self::Item, writer: &mut W, context: &mut EmitContext) -> EmitResult;

    fn emit_to_string(&self, item: &Self::Item) -> Result<String> {
        let mut buffer = Vec::new();
        let mut context = EmitContext::from_config(self.config());
        self.emit(item, &mut buffer, &mut context)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Highlight classes used for keywords, names and annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    Keyword,
    Name,
    Comment,
    Section,
    Trap,
}

impl Tint {
    fn paint(&self, text: &str) -> String {
        use colored::Colorize;
        match self {
            Tint::Keyword => text.blue().bold().to_string(),
            Tint::Name => text.yellow().to_string(),
            Tint::Comment => text.green().to_string(),
            Tint::Section => text.cyan().to_string(),
            Tint::Trap => text.bright_red().to_string(),
        }
    }
}

pub struct EmitHelper;

impl EmitHelper {
    pub fn write_line<W: Write>(writer: &mut W, context: &EmitContext, text: &str) -> EmitResult {
        writeln!(writer, "{}{}", context.get_indent(), text)?;
        Ok(())
    }

    pub fn tinted(context: &EmitContext, text: &str, tint: Tint) -> String {
        if context.use_colors {
            tint.paint(text)
        } else {
            text.to_string()
        }
    }

    pub fn write_tinted_line<W: Write>(
        writer: &mut W,
        context: &EmitContext,
        text: &str,
        tint: Tint,
    ) -> EmitResult {
        Self::write_line(writer, context, &Self::tinted(context, text, tint))
    }

    pub fn write_comment<W: Write>(writer: &mut W, context: &EmitContext, comment: &str) -> EmitResult {
        Self::write_tinted_line(writer, context, &format!("// {}", comment), Tint::Comment)
    }

    pub fn write_section<W: Write>(writer: &mut W, context: &EmitContext, title: &str) -> EmitResult {
        Self::write_tinted_line(writer, context, &format!("=== {} ===", title), Tint::Section)
    }

    pub fn write_block<W: Write, F>(
        writer: &mut W,
        context: &mut EmitContext,
        header: &str,
        body: F,
    ) -> EmitResult
    where
        F: FnOnce(&mut W, &mut EmitContext) -> EmitResult,
    {
        Self::write_line(writer, context, &format!("{} {{", header))?;
        context.indent();
        body(writer, context)?;
        context.dedent();
        Self::write_line(writer, context, "}")?;
        Ok(())
    }
}
