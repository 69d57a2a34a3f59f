use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use oolower_core::pass::{DevirtualizationPass, LoweringPass, VerifyLoweredPass};
use oolower_core::{
    InterfaceCallType, LoweringConfig, LoweringReport, OoSession, PassManager, Program, RtaOptions,
    RtaReport,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

mod logging;

use logging::{init_logging, LogFormat, LogLevel};

#[derive(Parser)]
#[command(name = "oolower")]
#[command(about = "Lower object-oriented IR to vtables, itables and plain calls")]
#[command(version = "0.1.0")]
#[command(author = "Gianluca Brigandi <gbrigand@gmail.com>")]
struct Cli {
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lower a `.ool` program and print the result.
    Lower {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum)]
        policy: Option<Policy>,

        /// JSON file with lowering options.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Devirtualize with rapid type analysis before lowering.
        #[arg(long)]
        rta: bool,

        /// Entry point for RTA, by linker name. Defaults to `main`.
        #[arg(long = "entry", requires = "rta")]
        entries: Vec<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Print vtable, itable and field layout without lowering.
    Layout {
        input: PathBuf,

        #[arg(long, value_enum)]
        policy: Option<Policy>,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Check that a file, or every `.ool` file below a directory, reads cleanly.
    Validate {
        input: PathBuf,

        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    RuntimeLookup,
    SearchedItable,
    SearchedItableM2f,
    IndexedItable,
}

impl From<Policy> for InterfaceCallType {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::RuntimeLookup => InterfaceCallType::RuntimeLookup,
            Policy::SearchedItable => InterfaceCallType::SEARCHED_ITABLE,
            Policy::SearchedItableM2f => InterfaceCallType::SEARCHED_ITABLE_M2F,
            Policy::IndexedItable => InterfaceCallType::IndexedItable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level, cli.log_format);

    match cli.command {
        Commands::Lower {
            input,
            output,
            policy,
            config,
            rta,
            entries,
            format,
            verbose,
        } => cmd_lower(input, output, policy, config, rta, entries, format, verbose),
        Commands::Layout {
            input,
            policy,
            config,
            format,
            verbose,
        } => cmd_layout(input, policy, config, format, verbose),
        Commands::Validate { input, verbose } => cmd_validate(input, verbose),
    }
}

/// Session configured from the optional config file, then the program's own policy line, then
/// the command-line policy.
fn load_program(
    input: &Path,
    policy: Option<Policy>,
    config: Option<&Path>,
) -> Result<(Program, OoSession)> {
    let config = match config {
        Some(path) => LoweringConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LoweringConfig::default(),
    };
    let mut session = OoSession::with_config(config);
    let program = oolower_parser::parse_program_file(input, &mut session)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    if let Some(policy) = policy {
        session.set_interface_call_type(policy.into());
    }
    Ok((program, session))
}

fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            print!("{}", text);
            Ok(())
        }
    }
}

fn emitter_config(to_file: bool) -> oolower_emit::EmitterConfig {
    use std::io::IsTerminal;

    if !to_file && std::io::stdout().is_terminal() {
        oolower_emit::EmitterConfig::default()
    } else {
        oolower_emit::EmitterConfig::plain()
    }
}

#[derive(Serialize)]
struct LoweredOutput<'a> {
    report: &'a LoweringReport,
    devirtualization: Option<&'a RtaReport>,
    program: &'a Program,
}

#[allow(clippy::too_many_arguments)]
fn cmd_lower(
    input: PathBuf,
    output: Option<PathBuf>,
    policy: Option<Policy>,
    config: Option<PathBuf>,
    rta: bool,
    entries: Vec<String>,
    format: Format,
    verbose: bool,
) -> Result<()> {
    use colored::*;
    use oolower_emit::{Emitter, JsonFormatter, ProgramEmitter};

    let (mut program, mut session) = load_program(&input, policy, config.as_deref())?;

    if verbose {
        eprintln!("{}", " oolower".bright_blue().bold());
        eprintln!("{}", "=".repeat(50).bright_blue());
        eprintln!(" Input: {}", input.display());
        eprintln!(" Policy: {}", session.interface_call_type());
        eprintln!(" Classes: {}", program.class_count());
    }

    let mut passes = PassManager::new();
    passes.enable_statistics();
    if rta {
        let names = if entries.is_empty() {
            vec!["main".to_string()]
        } else {
            entries
        };
        let entry_points = names
            .iter()
            .map(|name| {
                program
                    .entity_by_ld_name(name)
                    .with_context(|| format!("Entry point '{}' not found", name))
            })
            .collect::<Result<Vec<_>>>()?;
        passes.register_pass(DevirtualizationPass::new(RtaOptions::new(entry_points)));
    }
    passes.register_pass(LoweringPass::new());
    passes.register_pass(VerifyLoweredPass);
    tracing::info!(passes = ?passes.pass_names(), "running passes on {}", input.display());
    passes.run_all(&mut program, &mut session)?;

    let report = passes
        .get_pass::<LoweringPass>()
        .and_then(|pass| pass.report())
        .cloned()
        .unwrap_or_default();
    let devirtualization = passes
        .get_pass::<DevirtualizationPass>()
        .and_then(|pass| pass.report());

    if verbose {
        for stat in passes.statistics() {
            eprintln!(" {} {:?}", stat.name.bright_cyan(), stat.duration);
        }
        if let Some(rta) = devirtualization {
            eprintln!(
                " Devirtualized: {} of {} dynamic calls",
                rta.devirtualized.to_string().bright_green(),
                rta.dynamic_calls
            );
        }
        eprintln!(
            " Calls: {} static, {} dynamic, {} interface",
            report.static_calls, report.dynamic_calls, report.interface_calls
        );
        eprintln!(" Vtables: {}, itables: {}", report.vtables, report.itables);
    }

    let text = match format {
        Format::Text => {
            ProgramEmitter::new(&session, emitter_config(output.is_some())).emit_to_string(&program)?
        }
        Format::Json => JsonFormatter::to_string(&LoweredOutput {
            report: &report,
            devirtualization,
            program: &program,
        })? + "\n",
    };
    write_output(output.as_deref(), &text)?;

    if verbose {
        if let Some(path) = &output {
            eprintln!("{} {}", " Written to".bright_green(), path.display());
        }
    }
    Ok(())
}

fn cmd_layout(
    input: PathBuf,
    policy: Option<Policy>,
    config: Option<PathBuf>,
    format: Format,
    verbose: bool,
) -> Result<()> {
    use oolower_emit::{Emitter, JsonFormatter, LayoutEmitter, VerbosityLevel};

    let (program, session) = load_program(&input, policy, config.as_deref())?;
    let layout = session.compute_layout(&program)?;

    let text = match format {
        Format::Text => {
            let mut config = emitter_config(false);
            if verbose {
                config = config.with_verbosity(VerbosityLevel::Verbose);
            }
            LayoutEmitter::new(&program, config).emit_to_string(&layout)?
        }
        Format::Json => JsonFormatter::to_string(&layout)? + "\n",
    };
    write_output(None, &text)
}

fn cmd_validate(input: PathBuf, verbose: bool) -> Result<()> {
    use colored::*;

    let sources = if input.is_dir() {
        oolower_parser::find_sources(&input)
    } else {
        vec![input.clone()]
    };
    if sources.is_empty() {
        anyhow::bail!("No .ool files found under {}", input.display());
    }

    let mut failures = 0;
    for source in &sources {
        let mut session = OoSession::new();
        match oolower_parser::parse_program_file(source, &mut session) {
            Ok(program) => {
                println!("{} {}", " VALID".bright_green().bold(), source.display());
                if verbose {
                    println!(
                        "   {} classes, {} functions",
                        program.class_count(),
                        program.functions().count()
                    );
                }
            }
            Err(e) => {
                failures += 1;
                println!("{} {}", " INVALID".bright_red().bold(), source.display());
                println!("{}", e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("Validation failed for {} of {} file(s)", failures, sources.len());
    }
    Ok(())
}
