//! `birtool` argument parsing and commands, exported from the library so
//! integration tests can exercise them without spawning a process.

use std::ffi::OsString;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::codec::{decode_with, encode};
use crate::config::BirConfig;
use crate::error::Error;
use crate::ir::package::Package;
use crate::ir::visitor::InstructionStats;
use crate::printer::print_package;

#[derive(Parser, Debug)]
#[command(name = "birtool")]
#[command(about = "Inspect, validate and round-trip BIR files")]
pub struct Cli {
    /// JSON config file with codec and lowering settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Decode a file and pretty-print it
    Dump { file: PathBuf },
    /// Decode a file, validate it and summarize each function
    Check { file: PathBuf },
    /// Decode, re-encode and re-decode a file, comparing the results
    Roundtrip {
        file: PathBuf,
        /// Write the re-encoded bytes here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Output of a command. `success` is false when the command ran but found a
/// problem, such as a round-trip mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub text: String,
    pub success: bool,
}

/// Parses the full argument list, including `argv[0]`.
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Installs the global `fmt` subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    // A subscriber may already be installed (tests); keep it.
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

pub fn run(cli: &Cli) -> Result<Report, Error> {
    let config = match &cli.config {
        Some(path) => BirConfig::load(path)?,
        None => BirConfig::default(),
    };
    match &cli.command {
        Command::Dump { file } => {
            let pkg = read_package(file, &config)?;
            Ok(Report {
                text: print_package(&pkg),
                success: true,
            })
        }
        Command::Check { file } => {
            let pkg = read_package(file, &config)?;
            pkg.validate()?;
            Ok(Report {
                text: summarize(&pkg),
                success: true,
            })
        }
        Command::Roundtrip { file, output } => roundtrip(file, output.as_deref(), &config),
    }
}

fn read_package(path: &Path, config: &BirConfig) -> Result<Package, Error> {
    let bytes = std::fs::read(path)?;
    debug!(file = %path.display(), bytes = bytes.len(), "read input");
    decode_with(&bytes, &config.codec)
}

fn summarize(pkg: &Package) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}: ok", pkg.id);
    for func in pkg.all_functions() {
        let _ = writeln!(
            out,
            "  {}: {} blocks, {} instructions, {} locals",
            func.name,
            func.blocks().len(),
            func.blocks().iter().map(|b| b.len()).sum::<usize>(),
            func.local_vars().len()
        );
    }
    let stats = InstructionStats::collect(pkg);
    let _ = writeln!(
        out,
        "{} functions, {} blocks, {} instructions",
        stats.functions,
        stats.blocks,
        stats.total()
    );
    for (kind, count) in &stats.by_kind {
        let _ = writeln!(out, "  {kind:<16} {count}");
    }
    out
}

fn roundtrip(file: &Path, output: Option<&Path>, config: &BirConfig) -> Result<Report, Error> {
    let original = std::fs::read(file)?;
    let first = decode_with(&original, &config.codec)?;
    let encoded = encode(&first)?;
    let second = decode_with(&encoded, &config.codec)?;

    if let Some(out) = output {
        std::fs::write(out, &encoded)?;
        info!(file = %out.display(), bytes = encoded.len(), "wrote re-encoded package");
    }

    if first == second {
        return Ok(Report {
            text: format!(
                "{}: round-trip ok ({} bytes in, {} bytes out)\n",
                first.id,
                original.len(),
                encoded.len()
            ),
            success: true,
        });
    }

    let mut text = format!("{}: round-trip mismatch\n", first.id);
    let names = first.all_functions().map(|f| f.name.as_str());
    for name in names {
        let a = first.all_functions().find(|f| f.name == name);
        let b = second.all_functions().find(|f| f.name == name);
        if a != b {
            let _ = writeln!(text, "  function '{name}' differs");
        }
    }
    Ok(Report {
        text,
        success: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip_with_output() {
        let cli = parse_args(["birtool", "roundtrip", "in.bir", "-o", "out.bir"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Roundtrip {
                file: PathBuf::from("in.bir"),
                output: Some(PathBuf::from("out.bir")),
            }
        );
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse_args(["birtool", "dump", "a.bir", "-v", "--config", "c.json"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("c.json")));
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(parse_args(["birtool"]).is_err());
    }
}
