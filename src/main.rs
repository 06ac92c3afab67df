//! dyninclude CLI
//!
//! Usage:
//!   dyninclude [OPTIONS] <TEMPLATE>
//!
//! Options:
//!   -d, --dir <DIR>          Template directory (repeatable, searched in order)
//!   -c, --context <FILE>     Context variables (TOML format)
//!       --var <KEY=VALUE>    String variable, overrides the context file (repeatable)
//!       --config <FILE>      Engine configuration (TOML format)
//!       --no-autoescape      Do not HTML-escape variable output
//!   -v, --verbose            Debug logging to stderr
//!   -h, --help               Print help

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dyninclude::{Context, Engine, EngineConfig};

#[derive(Parser)]
#[command(name = "dyninclude")]
#[command(about = "Render Django-style templates with dynamic includes")]
struct Cli {
    /// Name of the template to render, relative to the template directories
    template: String,

    /// Template directory (repeatable, searched in order)
    #[arg(short, long = "dir")]
    dirs: Vec<PathBuf>,

    /// Context variables (TOML format)
    #[arg(short, long)]
    context: Option<PathBuf>,

    /// String variable as key=value, overriding the context file
    #[arg(long = "var", value_parser = parse_key_val)]
    vars: Vec<(String, String)>,

    /// Engine configuration (TOML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not HTML-escape variable output
    #[arg(long)]
    no_autoescape: bool,

    /// Debug logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "dyninclude=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Ignore the error if a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Load engine configuration
    let mut config = match &cli.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };
    // Directories from the command line are searched first
    let mut dirs = cli.dirs.clone();
    dirs.append(&mut config.dirs);
    if dirs.is_empty() {
        dirs.push(PathBuf::from("."));
    }
    config.dirs = dirs;
    if cli.no_autoescape {
        config.autoescape = false;
    }

    // Load context
    let mut ctx = match &cli.context {
        Some(path) => match Context::from_file(path) {
            Ok(ctx) => ctx,
            Err(e) => {
                eprintln!("Error loading context '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => Context::new(),
    };
    for (key, value) in cli.vars {
        ctx.insert(key, value);
    }

    let engine = Engine::from_config(config);
    match engine.render(&cli.template, &mut ctx) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e.report());
            process::exit(1);
        }
    }
}
