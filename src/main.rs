//! Ignis - bytecode table inspector
//!
//! Usage: `ignis <COMMAND>`; see `ignis --help`.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use itertools::Itertools;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use ignis::bytecode::{
    debug_break, format_listing, validate_schema, Bytecode, BytecodeGroup, BytecodeWriter,
    OperandScale,
};
use ignis::config::BuildConfig;
use ignis::dispatch::{
    build_handler_table_parallel, BuildStats, DispatchLayout, GenerateError, HandlerArtifact,
    HandlerGenerator, HandlerIndex, HandlerRequest, SlotKind,
};

#[derive(Parser, Debug)]
#[command(name = "ignis")]
#[command(version, about = "Inspect bytecode tables and build handler tables")]
struct Cli {
    /// Build configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every bytecode with its size at each scale
    Bytecodes {
        /// Only list one group, e.g. `jump`
        #[arg(long)]
        group: Option<String>,
    },
    /// Show the descriptor of one bytecode
    Describe { name: String },
    /// Disassemble a hex-encoded bytecode stream
    Disasm { hex: String },
    /// Patch a breakpoint into a hex-encoded stream and show both listings
    Breakpoint { hex: String, offset: usize },
    /// Build the handler table and report its layout
    Handlers {
        /// Generate handlers on a worker pool
        #[arg(long)]
        parallel: bool,
        /// Compile native handlers with Cranelift
        #[arg(long)]
        native: bool,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,ignis=info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    let digits = digits.strip_prefix("0x").unwrap_or(&digits);
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(format!("invalid hex digit '{}' in '{}'", bad, input).into());
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{}'", input).into());
    }
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| -> CliResult<u8> {
            let pair = std::str::from_utf8(pair)?;
            Ok(u8::from_str_radix(pair, 16)?)
        })
        .collect()
}

fn load_config(path: Option<&PathBuf>) -> CliResult<BuildConfig> {
    let config = match path {
        Some(path) => BuildConfig::load(path)?,
        None => BuildConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn list_bytecodes(group: Option<&str>) -> CliResult<()> {
    let groups: Vec<BytecodeGroup> = match group {
        Some(name) => {
            let found = BytecodeGroup::ALL
                .into_iter()
                .find(|g| g.name().eq_ignore_ascii_case(name))
                .ok_or_else(|| format!("unknown bytecode group '{}'", name))?;
            vec![found]
        }
        None => BytecodeGroup::ALL.to_vec(),
    };

    let mut listed = 0;
    for group in groups {
        println!("# {}", group);
        for bc in Bytecode::iter().filter(|bc| group.contains(*bc)) {
            let sizes = OperandScale::ALL
                .iter()
                .map(|&scale| bc.size(scale))
                .join("/");
            println!("  {:#04x}  {:<40} {}", bc.to_byte(), bc.name(), sizes);
            listed += 1;
        }
    }
    info!(listed, "Listed bytecodes");
    Ok(())
}

fn describe(name: &str) -> CliResult<()> {
    let bc = Bytecode::from_name(name).ok_or_else(|| format!("unknown bytecode '{}'", name))?;
    println!("{} ({:#04x})", bc.name(), bc.to_byte());
    println!("  kind:        {:?}", bc.kind());
    println!("  accumulator: {}", bc.accumulator_use());
    println!(
        "  operands:    {}",
        bc.operand_types().iter().map(|op| op.name()).join(", ")
    );
    for scale in OperandScale::ALL {
        let offsets = (0..bc.operand_count())
            .map(|i| bc.operand_offset(i, scale))
            .join(", ");
        println!(
            "  {:<9} size {} offsets [{}]",
            scale.to_string(),
            bc.size(scale),
            offsets
        );
    }
    match debug_break(bc) {
        Ok(brk) => println!("  breakpoint:  {}", brk),
        Err(e) => println!("  breakpoint:  none ({})", e),
    }
    Ok(())
}

fn disasm(hex: &str) -> CliResult<()> {
    let code = parse_hex(hex)?;
    println!("{}", format_listing(&code)?);
    Ok(())
}

fn breakpoint(hex: &str, offset: usize) -> CliResult<()> {
    let mut writer = BytecodeWriter::from_bytes(parse_hex(hex)?);
    println!("{}", format_listing(writer.as_bytes())?);
    let original = writer.set_breakpoint(offset)?;
    info!(offset, %original, "Breakpoint set");
    println!();
    println!("{}", format_listing(writer.as_bytes())?);
    Ok(())
}

/// Generator for dry runs: no code, scaled slots reference their Single peer
struct DryRunGenerator;

#[derive(Debug)]
struct DryRunHandler {
    references: Vec<HandlerIndex>,
}

impl HandlerArtifact for DryRunHandler {
    fn references(&self) -> &[HandlerIndex] {
        &self.references
    }
}

impl HandlerGenerator for DryRunGenerator {
    type Artifact = DryRunHandler;

    fn generate(&self, request: &HandlerRequest<'_>) -> Result<DryRunHandler, GenerateError> {
        let references = match request.kind() {
            SlotKind::Bytecode { bytecode, scale } if scale != OperandScale::Single => request
                .peer(bytecode, OperandScale::Single)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        };
        Ok(DryRunHandler { references })
    }
}

fn print_stats(label: &str, stats: &BuildStats) {
    println!(
        "{:<9} {} handlers, {} references, {} relocations in {:?}",
        label, stats.slots, stats.references, stats.relocations, stats.elapsed
    );
}

fn handlers(config: BuildConfig, parallel: bool, native: bool) -> CliResult<()> {
    let config = if parallel {
        BuildConfig {
            parallel: true,
            ..config
        }
    } else {
        config
    };
    let layout = DispatchLayout::new();
    for scale in OperandScale::ALL {
        println!("{:<9} {} handlers", scale.to_string(), layout.slots_at_scale(scale));
    }
    println!("{:<9} {} slots", "total", layout.len());

    if native {
        #[cfg(feature = "jit")]
        {
            let compiled = ignis::jit::compile_handler_table(&config)?;
            print_stats("native", compiled.table().stats());
            return Ok(());
        }
        #[cfg(not(feature = "jit"))]
        return Err("built without the `jit` feature".into());
    }

    let table = build_handler_table_parallel(&DryRunGenerator, &config)?;
    print_stats("dry-run", table.stats());
    Ok(())
}

fn run(cli: Cli) -> CliResult<()> {
    validate_schema()?;
    match cli.command {
        Command::Bytecodes { group } => list_bytecodes(group.as_deref()),
        Command::Describe { name } => describe(&name),
        Command::Disasm { hex } => disasm(&hex),
        Command::Breakpoint { hex, offset } => breakpoint(&hex, offset),
        Command::Handlers { parallel, native } => {
            handlers(load_config(cli.config.as_ref())?, parallel, native)
        }
    }
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x0b 2a, 00").unwrap(), vec![0x0b, 0x2a, 0x00]);
        assert_eq!(parse_hex("FF01").unwrap(), vec![0xff, 0x01]);
        assert!(parse_hex("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_hex_rejects_bad_digits() {
        assert!(parse_hex("aéa").is_err());
        assert!(parse_hex("éa").is_err());
        assert!(parse_hex("0g").is_err());
        assert!(parse_hex("abc").is_err());
    }
}
