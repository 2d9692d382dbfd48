//! `berth` — check compose documents.
//!
//! Reads a compose file (or stdin with `-`), parses it against the process
//! environment plus any `--env` overrides, and prints diagnostics. Exit
//! codes: 0 for a usable document (warnings allowed), 1 for parse errors or
//! malformed YAML, 3 for I/O failures.

use std::io::{self, Read, Write};
use std::process::ExitCode;

use berth_compose::{parse, render, EnvMap, ParseError, ParseResult};
use clap::Parser;
use tracing::debug;

const EXIT_SUCCESS: u8 = 0;
const EXIT_PARSE_ERROR: u8 = 1;
const EXIT_IO_ERROR: u8 = 3;

/// Check a compose document and report diagnostics.
#[derive(Parser, Debug)]
#[command(name = "berth", version, about)]
struct Args {
    /// Compose file to check, or "-" for stdin.
    file: String,

    /// Extra KEY=VALUE pairs for interpolation, overriding the process
    /// environment.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Render diagnostics as source-annotated reports.
    #[arg(long)]
    pretty: bool,

    /// Only report diagnostics; skip the summary line.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    ExitCode::from(run(&args))
}

fn run(args: &Args) -> u8 {
    let (filename, source) = match read_input(&args.file) {
        Ok(input) => input,
        Err(err) => {
            eprintln!("berth: {}: {err}", args.file);
            return EXIT_IO_ERROR;
        }
    };

    let env = build_env(&args.env);
    debug!(file = %filename, env_vars = env.len(), "checking compose document");

    let result = match parse(&source, &env) {
        Ok(result) => result,
        Err(ParseError::Yaml(err)) => {
            eprintln!("{filename}:{}: error: {}", err.pos, err.message);
            return EXIT_PARSE_ERROR;
        }
        Err(err) => {
            eprintln!("{filename}: error: {err}");
            return EXIT_PARSE_ERROR;
        }
    };

    if report(args, &filename, &source, &result).is_err() {
        return EXIT_IO_ERROR;
    }

    match result.file {
        Some(_) => EXIT_SUCCESS,
        None => EXIT_PARSE_ERROR,
    }
}

fn report(
    args: &Args,
    filename: &str,
    source: &str,
    result: &ParseResult,
) -> io::Result<()> {
    let mut stderr = io::stderr().lock();
    if args.pretty {
        render::write_reports(&result.diagnostics, filename, source, &mut stderr)?;
    } else {
        result.diagnostics.write_all(filename, &mut stderr)?;
    }
    if result.diagnostics.dropped() > 0 {
        writeln!(
            stderr,
            "{filename}: note: {} diagnostics dropped",
            result.diagnostics.dropped()
        )?;
    }

    if args.quiet {
        return Ok(());
    }
    let mut stdout = io::stdout().lock();
    match &result.file {
        Some(file) => writeln!(
            stdout,
            "{filename}: ok: {} services, {} volumes, {} networks",
            file.services.len(),
            file.volumes.len(),
            file.networks.len()
        ),
        None => writeln!(stdout, "{filename}: invalid"),
    }
}

fn read_input(path: &str) -> io::Result<(String, String)> {
    if path == "-" {
        let mut source = String::new();
        io::stdin().read_to_string(&mut source)?;
        return Ok(("<stdin>".to_string(), source));
    }
    Ok((path.to_string(), std::fs::read_to_string(path)?))
}

/// Process environment plus `--env` overrides, later entries winning.
fn build_env(overrides: &[String]) -> EnvMap {
    let mut env: EnvMap = std::env::vars().collect();
    for entry in overrides {
        match entry.split_once('=') {
            Some((key, value)) => {
                env.insert(key.to_string(), value.to_string());
            }
            None => eprintln!("berth: ignoring --env without '=': {entry}"),
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides() {
        let env = build_env(&["A=1".to_string(), "A=2".to_string(), "B=x=y".to_string()]);
        assert_eq!(env.get("A").map(String::as_str), Some("2"));
        // Only the first '=' separates key from value.
        assert_eq!(env.get("B").map(String::as_str), Some("x=y"));
    }

    #[test]
    fn test_bad_override_is_ignored() {
        let env = build_env(&["NOEQ".to_string()]);
        assert!(!env.contains_key("NOEQ"));
    }
}
