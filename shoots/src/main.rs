//! `shoots`: run one command through the build kernel.
//!
//! Prints narrator lines as the run progresses, then a `key=value` summary,
//! and exits with the code mapped from the run state.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use shoots::exit_codes;
use shoots::io::config::{DEFAULT_CONFIG_FILE, load_config};
use shoots::io::loader::{DirectoryModuleLoader, StackedModuleLoader, StaticModuleLoader};
use shoots::io::process_module::ProcessLimits;
use shoots::kernel::{BuildKernel, BuildRunResult};
use shoots::modules::builtin_modules;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(
    name = "shoots",
    version,
    about = "Deterministic command-execution kernel"
)]
struct Cli {
    /// Config file; missing means defaults.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override `modules_dir` from the config.
    #[arg(long)]
    modules_dir: Option<PathBuf>,

    /// Override `artifacts_dir` from the config.
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// Command to run; words are joined with single spaces.
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() {
    shoots::logging::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::SUCCESS
            };
            let _ = err.print();
            process::exit(code);
        }
    };

    match run(cli) {
        Ok(outcome) => {
            for line in summary_lines(&outcome) {
                if let Err(err) = print_line(&line) {
                    warn!(%err, "summary not printed");
                    break;
                }
            }
            process::exit(outcome.exit_code());
        }
        Err(err) => {
            eprintln!("{err:#}");
            process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<BuildRunResult> {
    let base = cli.config.parent().unwrap_or_else(|| Path::new(""));
    let mut config = load_config(&cli.config)?.rooted_at(base);
    if let Some(dir) = cli.modules_dir {
        config.modules_dir = dir;
    }
    if let Some(dir) = cli.artifacts_dir {
        config.artifacts_dir = dir;
    }
    config.validate()?;
    debug!(?config, "effective config");

    let limits = ProcessLimits {
        timeout: config.module_timeout(),
        output_limit_bytes: config.module_output_limit_bytes,
    };
    let loader = StackedModuleLoader::new()
        .with(StaticModuleLoader::new(builtin_modules()))
        .with(DirectoryModuleLoader::new(limits));

    let kernel = BuildKernel::new(
        config,
        Box::new(loader),
        Arc::new(print_line),
    );
    kernel.run(&cli.command.join(" "))
}

/// `println!` without the panic when stdout is closed.
fn print_line(line: &str) -> io::Result<()> {
    writeln!(io::stdout().lock(), "{line}")
}

fn summary_lines(outcome: &BuildRunResult) -> Vec<String> {
    let mut lines = vec![
        format!("state={}", outcome.state),
        format!("hash={}", outcome.hash),
        format!("folder={}", outcome.folder.display()),
    ];
    if let Some(reason) = &outcome.reason {
        lines.push(format!("reason={reason}"));
    }
    lines
}
