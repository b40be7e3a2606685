//! Stepgate - progression gate for guided learning modules
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stepgate::cli::{
    open_engine, CheckpointCommand, OutputOptions, ResetCommand, RevealCommand, RevealKind,
    StatusCommand, SubmitCommand, Submission,
};
use stepgate::config::{stepgate_home, Config};
use stepgate::error::exit_codes;
use stepgate::util::read_to_string_limited;

// =============================================================================
// CLI Definition
// =============================================================================

/// Stepgate - progression gate for guided learning modules
#[derive(Parser)]
#[command(name = "stepgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the user config and progress files (overrides STEPGATE_HOME)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    /// Output as JSON
    #[arg(long, short, global = true)]
    json: bool,
    /// Suppress output
    #[arg(long, short, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show progress and the state of every section
    Status {
        /// Module definition file
        module: PathBuf,
    },

    /// Answer a numeric exercise
    Answer {
        /// Module definition file
        module: PathBuf,
        /// Section index
        index: usize,
        /// The answer, `.` or `,` as decimal separator
        answer: String,
    },

    /// Pick an option of a multiple-choice exercise or quiz
    Choose {
        /// Module definition file
        module: PathBuf,
        /// Section index
        index: usize,
        /// Option index, starting at 0
        option: Option<usize>,
    },

    /// Run code for a code exercise or a sample section
    Run {
        /// Module definition file
        module: PathBuf,
        /// Section index
        index: usize,
        /// File with the source code
        file: PathBuf,
    },

    /// Show the hint of a section
    Hint {
        /// Module definition file
        module: PathBuf,
        /// Section index
        index: usize,
    },

    /// Show the reference solution of a code exercise
    Solution {
        /// Module definition file
        module: PathBuf,
        /// Section index
        index: usize,
    },

    /// Complete the module once every exercise is solved
    Checkpoint {
        /// Module definition file
        module: PathBuf,
    },

    /// Forget all progress for a module
    Reset {
        /// Module definition file
        module: PathBuf,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("stepgate error: {}", e);
            ExitCode::from(exit_codes::ERROR as u8)
        }
    }
}

/// Set up the global panic handler.
///
/// On panic, logs to `<stepgate_home>/crash.log` and exits with the error code.
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("stepgate panic: {}", info);

        if let Some(home) = stepgate_home() {
            let crash_log = home.join("crash.log");
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::ERROR);
    }));
}

/// Log to stderr so `--json` output on stdout stays parseable.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("STEPGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run the CLI and return the exit code.
fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(dir) = &cli.config_dir {
        std::env::set_var("STEPGATE_HOME", dir);
    }
    init_tracing();

    let config = Config::load();
    let options = OutputOptions {
        json: cli.json,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Status { module } => run_status(&module, &config, options),
        Commands::Answer {
            module,
            index,
            answer,
        } => run_submit(&module, index, Submission::Answer(answer), &config, options),
        Commands::Choose {
            module,
            index,
            option,
        } => run_submit(&module, index, Submission::Choose(option), &config, options),
        Commands::Run {
            module,
            index,
            file,
        } => {
            let source = read_to_string_limited(&file)?;
            run_submit(&module, index, Submission::Code(source), &config, options)
        }
        Commands::Hint { module, index } => {
            run_reveal(&module, index, RevealKind::Hint, &config, options)
        }
        Commands::Solution { module, index } => {
            run_reveal(&module, index, RevealKind::Solution, &config, options)
        }
        Commands::Checkpoint { module } => run_checkpoint(&module, &config, options),
        Commands::Reset { module } => run_reset(&module, &config, options),
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

/// Convert a success boolean to an exit code.
fn success_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::SUCCESS as u8)
    } else {
        ExitCode::from(exit_codes::REJECTED as u8)
    }
}

fn print_formatted(formatted: &str) {
    if formatted.is_empty() {
        return;
    }
    if formatted.ends_with('\n') {
        print!("{}", formatted);
    } else {
        println!("{}", formatted);
    }
}

fn run_status(
    module: &Path,
    config: &Config,
    options: OutputOptions,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let engine = open_engine(module, config)?;
    let cmd = StatusCommand::new(&engine);

    let output = cmd.run();
    print_formatted(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

fn run_submit(
    module: &Path,
    index: usize,
    submission: Submission,
    config: &Config,
    options: OutputOptions,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut engine = open_engine(module, config)?;
    let mut cmd = SubmitCommand::new(&mut engine);

    // Code runs are the only suspending operation; one thread is enough.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(cmd.run(index, submission));
    print_formatted(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

fn run_reveal(
    module: &Path,
    index: usize,
    kind: RevealKind,
    config: &Config,
    options: OutputOptions,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let engine = open_engine(module, config)?;
    let cmd = RevealCommand::new(&engine);

    let output = cmd.run(index, kind);
    print_formatted(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

fn run_checkpoint(
    module: &Path,
    config: &Config,
    options: OutputOptions,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut engine = open_engine(module, config)?;
    let mut cmd = CheckpointCommand::new(&mut engine);

    let output = cmd.run();
    print_formatted(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

fn run_reset(
    module: &Path,
    config: &Config,
    options: OutputOptions,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut engine = open_engine(module, config)?;
    let mut cmd = ResetCommand::new(&mut engine);

    let output = cmd.run();
    print_formatted(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}
