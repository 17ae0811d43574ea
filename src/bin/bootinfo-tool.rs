// Driver CLI for the bootinfo store. A thin front end: argument parsing and
// one-shot dispatch only, per spec.md section 6 -- all persistence logic
// lives in the library.

use std::io::Read;
use std::process::ExitCode;

use bootinfo::{BootInfoContext, BootInfoError, Config, OpenFlags};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bootinfo-tool", version, about = "Read and update the boot variable store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a fresh store, discarding all non-underscore-prefixed variables
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Print the current header and every stored variable
    Show,
    /// Clear BOOT_IN_PROGRESS and the failed-boot counter
    MarkSuccessful,
    /// Record a boot attempt; exits non-zero once `--threshold` is reached
    MarkInProgress {
        #[arg(long, default_value_t = 0)]
        threshold: u8,
    },
    /// Print the value of a variable
    Get {
        name: String,
        /// Suppress the "name=" prefix, printing only the value
        #[arg(long)]
        quiet: bool,
    },
    /// Set (or delete, with an empty value) a variable
    Set {
        /// `name=value`; omit to read the value from --file or stdin
        assignment: Option<String>,
        #[arg(long)]
        file: Option<std::path::PathBuf>,
        #[arg(long)]
        stdin: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = Config::default();

    match run(cfg, cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("bootinfo-tool: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: Config, command: Command) -> Result<ExitCode, BootInfoError> {
    match command {
        Command::Init { force } => {
            let flags = if force {
                OpenFlags::FORCE_INIT
            } else {
                OpenFlags::empty()
            };
            let ctx = BootInfoContext::open(cfg, flags)?;
            ctx.close()?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Show => {
            let ctx = BootInfoContext::open(cfg, OpenFlags::READ_ONLY)?;
            println!("version: {}", ctx.devinfo_version());
            println!("ext_sectors: {}", ctx.extension_sectors());
            println!("in_progress: {}", ctx.is_in_progress());
            println!("failed_boots: {}", ctx.failed_boot_count());
            for (name, value) in ctx.variables() {
                println!("{}={}", name, value);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::MarkSuccessful => {
            let mut ctx = BootInfoContext::open(cfg, OpenFlags::empty())?;
            let previous_failed = ctx.mark_successful()?;
            log::info!("cleared failed_boots (was {})", previous_failed);
            ctx.close()?;
            Ok(ExitCode::SUCCESS)
        }

        Command::MarkInProgress { threshold } => {
            let mut ctx = BootInfoContext::open(cfg, OpenFlags::empty())?;
            let failed_boots = ctx.mark_in_progress()?;
            ctx.close()?;
            if threshold > 0 && failed_boots >= threshold {
                Ok(ExitCode::from(failed_boots))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }

        Command::Get { name, quiet } => {
            let ctx = BootInfoContext::open(cfg, OpenFlags::READ_ONLY)?;
            let value = ctx.get(&name)?;
            if quiet {
                println!("{}", value);
            } else {
                println!("{}={}", name, value);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Set { assignment, file, stdin } => {
            let (name, value) = resolve_set_args(assignment, file, stdin)?;
            let mut ctx = BootInfoContext::open(cfg, OpenFlags::empty())?;
            ctx.set(&name, Some(&value))?;
            ctx.update()?;
            ctx.close()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_set_args(
    assignment: Option<String>,
    file: Option<std::path::PathBuf>,
    stdin: bool,
) -> Result<(String, String), BootInfoError> {
    let assignment = assignment.ok_or(BootInfoError::InvalidArgument)?;

    // "name=value" form is self-contained; a bare name reads its value from
    // --file or --stdin instead.
    if let Some((name, value)) = assignment.split_once('=') {
        return Ok((name.to_string(), value.to_string()));
    }

    let name = assignment;
    let mut value = String::new();
    if let Some(path) = file {
        value = std::fs::read_to_string(path)?;
    } else if stdin {
        std::io::stdin().read_to_string(&mut value)?;
    } else {
        return Err(BootInfoError::InvalidArgument);
    }
    Ok((name, value.trim_end_matches('\n').to_string()))
}
