mod debug_report;

use rulener::{Document, Engine, Options, RuleFile, default_engine};
use std::io::{self, IsTerminal, Read};

fn main() {
    env_logger::init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let loaded;
    let engine = if config.rules.is_empty() {
        default_engine()
    } else {
        loaded = match load_engine(&config) {
            Ok(engine) => engine,
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        };
        &loaded
    };

    for warning in engine.warnings() {
        eprintln!("warning: {warning}");
    }

    let mut doc = Document::from_whitespace(config.input.trim_end());
    let summary = engine.annotate(&mut doc);
    debug_report::print_run(engine, &doc, &summary, config.color);
}

struct CliConfig {
    input: String,
    rules: Vec<String>,
    step_limit: Option<usize>,
    lenient: bool,
    color: bool,
}

fn load_engine(config: &CliConfig) -> Result<Engine, String> {
    let files = config
        .rules
        .iter()
        .map(|path| RuleFile::read(path).map_err(|err| format!("error: cannot read rules file '{path}': {err}")))
        .collect::<Result<Vec<_>, _>>()?;

    let defaults = Options::default();
    let options = Options {
        step_limit: config.step_limit.unwrap_or(defaults.step_limit),
        lenient: config.lenient,
        ..defaults
    };
    Engine::load(&files, &options).map_err(|errors| format!("error: failed to load rules\n{errors}"))
}

fn parse_args() -> Result<CliConfig, String> {
    let mut input: Option<String> = None;
    let mut rules = Vec::new();
    let mut step_limit = None;
    let mut lenient = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1).peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("rulener {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--lenient" => lenient = true,
            "--rules" => {
                let value = args.next().ok_or_else(|| "error: --rules expects a file".to_string())?;
                rules.push(value);
            }
            "--step-limit" => {
                let value = args.next().ok_or_else(|| "error: --step-limit expects a value".to_string())?;
                step_limit = Some(parse_step_limit(&value)?);
            }
            "--input" | "-i" => {
                let value = args.next().ok_or_else(|| "error: --input expects a value".to_string())?;
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(value);
            }
            "--" => {
                let rest = args.collect::<Vec<_>>().join(" ");
                if !rest.trim().is_empty() {
                    if input.is_some() {
                        return Err("error: input provided multiple times".to_string());
                    }
                    input = Some(rest);
                }
                break;
            }
            _ if arg.starts_with("--rules=") => {
                rules.push(arg.trim_start_matches("--rules=").to_string());
            }
            _ if arg.starts_with("--step-limit=") => {
                step_limit = Some(parse_step_limit(arg.trim_start_matches("--step-limit="))?);
            }
            _ if arg.starts_with("--input=") => {
                let value = arg.trim_start_matches("--input=");
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(value.to_string());
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args).collect::<Vec<_>>().join(" ");
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(rest);
                break;
            }
        }
    }

    if rules.is_empty() && (lenient || step_limit.is_some()) {
        return Err("error: --lenient and --step-limit only apply together with --rules".to_string());
    }

    let input = match input {
        Some(value) => value,
        None => read_stdin_input()?,
    };

    if input.trim().is_empty() {
        return Err(format!("error: no input provided\n\n{}", help_text()));
    }

    Ok(CliConfig { input, rules, step_limit, lenient, color })
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn parse_step_limit(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("error: invalid --step-limit '{value}' (expected a positive integer)")),
    }
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "rulener {version}

TokensRegex-style rule engine CLI. Splits the input on whitespace, runs the
rules over it and prints the annotated tokens.

Usage:
  rulener [OPTIONS] [--] <input...>
  rulener [OPTIONS] --input <text>

Options:
  --rules <file>             Rules file to load. Repeat to load several files;
                             they are loaded in the order given.
                             Default: the bundled sample rules.
  -i, --input <text>         Input text to annotate. If omitted, reads remaining
                             args or stdin when no args are provided.
  --step-limit <n>           Backtracking steps allowed per token-pattern attempt.
                             Default: {step_limit}
  --lenient                  Skip rules that fail to compile instead of failing.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  RUST_LOG                   Log filter, e.g. RUST_LOG=rulener=debug.

Exit codes:
  0  Success.
  1  Rules failed to load.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
        step_limit = Options::default().step_limit
    )
}
