mod debug_report;

use std::io::{self, IsTerminal};
use std::sync::Arc;

use templar::rules::file_name::{self, FileMask};
use templar::{EngineOptions, EvaluationContext, MemoryKnowledgeBase, RuleEngine, SequencePolicy};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let inputs = match config.input.clone() {
        Some(input) => vec![input],
        None => match read_stdin_lines().await {
            Ok(lines) => lines,
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(2);
            }
        },
    };
    if inputs.is_empty() {
        eprintln!("error: no input provided\n\n{}", help_text());
        std::process::exit(2);
    }

    // One store for the whole run, so later names can replay earlier ones.
    let knowledge = Arc::new(MemoryKnowledgeBase::new());
    let options = EngineOptions { sequence_policy: config.policy, ..EngineOptions::default() };
    let engine = RuleEngine::new(Arc::new(file_name::registry()), file_name::rule_set, knowledge).with_options(options);

    let mut failed = false;
    for input in &inputs {
        if let Err(err) = run_one(&engine, input, &config).await {
            eprintln!("error: {input:?}: {err}");
            failed = true;
        }
    }

    if failed {
        std::process::exit(1);
    }
}

async fn run_one<F>(
    engine: &RuleEngine<FileMask, F, MemoryKnowledgeBase<FileMask>>,
    input: &str,
    config: &CliConfig,
) -> Result<(), String>
where
    F: templar::RuleSetFactory<FileMask>,
{
    let context = if config.paths {
        EvaluationContext::from_path(input)
    } else {
        EvaluationContext::from_name(input)
    }
    .map_err(|err| err.to_string())?;

    let res = engine.resolve_verbose(&context).await.map_err(|err| err.to_string())?;

    if config.json {
        let line = serde_json::to_string(&res.resolution.entity.snapshot()).map_err(|err| err.to_string())?;
        println!("{line}");
    } else {
        debug_report::print_run(input, &res, engine.options().token_delimiter.as_str(), config.color);
    }
    Ok(())
}

struct CliConfig {
    input: Option<String>,
    policy: SequencePolicy,
    paths: bool,
    json: bool,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut input: Option<String> = None;
    let mut policy = SequencePolicy::default();
    let mut paths = false;
    let mut json = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("templar {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--json" => json = true,
            "-p" | "--paths" => paths = true,
            "--policy" => {
                let value = args.next().ok_or_else(|| "error: --policy expects a value".to_string())?;
                policy = parse_policy(&value)?;
            }
            "--input" | "-i" => {
                let value = args.next().ok_or_else(|| "error: --input expects a value".to_string())?;
                set_input(&mut input, value)?;
            }
            "--" => {
                let rest = args.collect::<Vec<_>>().join(" ");
                if !rest.trim().is_empty() {
                    set_input(&mut input, rest)?;
                }
                break;
            }
            _ if arg.starts_with("--policy=") => {
                policy = parse_policy(arg.trim_start_matches("--policy="))?;
            }
            _ if arg.starts_with("--input=") => {
                set_input(&mut input, arg.trim_start_matches("--input=").to_string())?;
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args).collect::<Vec<_>>().join(" ");
                set_input(&mut input, rest)?;
                break;
            }
        }
    }

    if input.as_deref().is_some_and(|i| i.trim().is_empty()) {
        return Err(format!("error: no input provided\n\n{}", help_text()));
    }

    Ok(CliConfig { input, policy, paths, json, color })
}

fn set_input(input: &mut Option<String>, value: String) -> Result<(), String> {
    if input.is_some() {
        return Err("error: input provided multiple times".to_string());
    }
    *input = Some(value);
    Ok(())
}

fn parse_policy(value: &str) -> Result<SequencePolicy, String> {
    match value {
        "full" => Ok(SequencePolicy::FullRun),
        "shrink" => Ok(SequencePolicy::Shrinking),
        _ => Err(format!("error: invalid --policy '{value}' (expected full or shrink)")),
    }
}

/// Non-empty stdin lines, one name each.
async fn read_stdin_lines() -> Result<Vec<String>, String> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut inputs = Vec::new();
    while let Some(line) = lines.next_line().await.map_err(|err| format!("error: failed to read stdin: {err}"))? {
        let line = line.trim();
        if !line.is_empty() {
            inputs.push(line.to_string());
        }
    }
    Ok(inputs)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "templar {version}

Rule-based file name masking CLI.

Usage:
  templar [OPTIONS] [--] <name...>
  templar [OPTIONS] --input <name>
  templar [OPTIONS] < names.txt

Options:
  -i, --input <name>         Name to resolve. If omitted, reads remaining args,
                             or one name per stdin line when no args are given.
  -p, --paths                Treat inputs as file paths: the file stem is
                             resolved and the parent directory feeds the rules.
  --policy <full|shrink>     Sequence sweep policy. Default: full
  --json                     Print one resolved snapshot per line as JSON.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  RUST_LOG                   Log filter for stderr diagnostics. Default: warn

Exit codes:
  0  Success.
  1  Resolution failed for at least one name.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
    )
}
