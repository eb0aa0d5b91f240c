use std::path::PathBuf;

use clap::Parser;
use jsonnet_bridge::{engine_version, Config, Context, JsonnetError};
use tracing_subscriber::EnvFilter;

/// Evaluate or format a Jsonnet program through the embedded engine.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input file, or `-` for stdin. With --exec, the program text itself.
    input: String,
    /// Treat INPUT as program text rather than a file name.
    #[arg(short, long)]
    exec: bool,
    /// Reformat instead of evaluating.
    #[arg(long)]
    fmt: bool,
    /// External variable as a string: NAME=VALUE
    #[arg(long = "ext-str", value_parser = parse_pair)]
    ext_str: Vec<(String, String)>,
    /// External variable as code: NAME=CODE
    #[arg(long = "ext-code", value_parser = parse_pair)]
    ext_code: Vec<(String, String)>,
    /// Top-level argument as a string: NAME=VALUE
    #[arg(long = "tla-str", value_parser = parse_pair)]
    tla_str: Vec<(String, String)>,
    /// Top-level argument as code: NAME=CODE
    #[arg(long = "tla-code", value_parser = parse_pair)]
    tla_code: Vec<(String, String)>,
    /// Library search directory (repeatable).
    #[arg(short = 'J', long = "jpath")]
    jpath: Vec<PathBuf>,
    /// Print a top-level string's raw content instead of JSON.
    #[arg(short = 'S', long)]
    string: bool,
    #[arg(long)]
    max_stack: Option<u32>,
    #[arg(long)]
    max_trace: Option<u32>,
    /// Formatter indentation.
    #[arg(long)]
    indent: Option<u32>,
    /// JSON file with engine settings; command-line flags win.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got {s:?}"))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!(engine = %engine_version(), "starting");

    match run(&args) {
        Ok(out) => print!("{out}"),
        Err(e) => {
            eprintln!("{}", e.message());
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<String, JsonnetError> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.merge(&Config {
        max_stack: args.max_stack,
        max_trace: args.max_trace,
        string_output: args.string.then_some(true),
        format_indent: args.indent,
        ..Config::default()
    });

    let mut ctx = Context::with_config(&config)?;
    for dir in &args.jpath {
        ctx.add_library_path(dir)?;
    }
    for (k, v) in &args.ext_str {
        ctx.bind_external_var_literal(k, v);
    }
    for (k, v) in &args.ext_code {
        ctx.bind_external_var_code(k, v);
    }
    for (k, v) in &args.tla_str {
        ctx.bind_top_level_arg_literal(k, v);
    }
    for (k, v) in &args.tla_code {
        ctx.bind_top_level_arg_code(k, v);
    }

    let out = if args.exec || args.input == "-" {
        let source = if args.exec {
            args.input.clone()
        } else {
            std::io::read_to_string(std::io::stdin())?
        };
        let name = if args.exec { "<cmdline>" } else { "<stdin>" };
        if args.fmt {
            ctx.format_snippet(name, &source)?
        } else {
            ctx.evaluate_snippet(name, &source)?
        }
    } else if args.fmt {
        ctx.format_file(&args.input)?
    } else {
        ctx.evaluate_file(&args.input)?
    };
    ctx.destroy();
    Ok(out)
}
