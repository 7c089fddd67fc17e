#![forbid(unsafe_code)]

mod cli;

use anyhow::Result;
use std::io::{IsTerminal, Write};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use azjobs::config::EngineConfiguration;
use azjobs::jobs::JobController;
use azjobs::location::ShellFlavor;
use azjobs::logging::init_logger;
use azjobs::models::{JobKind, PromptMessage};
use azjobs::monitor::{poll_until_complete, PollingConfiguration, PromptHandler};
use azjobs::output::progress::{ConsoleProgress, LogProgress, TransferProgress};
use azjobs::output::{format_human, format_json, JobOutcome};
use cli::{CliCommand, CliConfig};

const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_USAGE: i32 = 2;

#[tokio::main]
async fn main() {
    let code = match cli::parse_args() {
        Ok(args) => match run(args).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                EXIT_FAILURE
            }
        },
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_USAGE
        }
    };
    std::process::exit(code);
}

async fn run(args: CliConfig) -> Result<i32> {
    // Graceful degradation if logging fails
    let _ = init_logger(args.log_level);

    let mut config = match EngineConfiguration::load_or_default(args.config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_USAGE);
        }
    };
    if let Some(path) = &args.azcopy {
        config.executable.path = path.clone();
    }

    let controller = match JobController::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_USAGE);
        }
    };

    if args.print_command {
        let command = match &args.command {
            CliCommand::Copy { source, destination, options } => controller.copy_command(source, destination, options),
            CliCommand::Remove { target, options } => controller.delete_command(target, options),
        };
        println!("{}", command.display(ShellFlavor::native(), false));
        return Ok(EXIT_SUCCESS);
    }

    // Set up interrupt handling: first signal cancels, the grace period escalates to kill
    let interrupted = Arc::new(AtomicBool::new(false));
    let _ = signal_hook::flag::register(signal_hook::consts::SIGINT, interrupted.clone());
    let _ = signal_hook::flag::register(signal_hook::consts::SIGTERM, interrupted.clone());

    let started = match &args.command {
        CliCommand::Copy { source, destination, options } => controller
            .start_copy(source, destination, options)
            .map(|job| (job, JobKind::Copy)),
        CliCommand::Remove { target, options } => {
            controller.start_delete(target, options).map(|job| (job, JobKind::Remove))
        }
    };
    let (job, kind) = match started {
        Ok(started) => started,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_FAILURE);
        }
    };

    let label = match kind {
        JobKind::Copy => "Copying",
        JobKind::Remove => "Removing",
    };
    let mut progress = TransferProgress::new(ConsoleProgress::new(label).with_quiet_mode(args.quiet_mode))
        .with_log_sink(LogProgress::new(job))
        .with_min_interval(controller.config().debounce_duration());

    let interactive = !args.json_output && std::io::stdin().is_terminal();
    let mut handler: Box<dyn PromptHandler> = if interactive {
        Box::new(ask_user)
    } else {
        Box::new(decline)
    };

    let polling = PollingConfiguration::from_config(controller.config());
    poll_until_complete(
        &controller,
        job,
        &polling,
        &mut progress,
        Some(handler.as_mut()),
        Some(interrupted),
    )
    .await?;
    drop(progress);

    // EndOfJob arrives before the process exits; wait for the reconciled record
    let info = match tokio::time::timeout(polling.cancel_grace, controller.wait_for_completion(job)).await {
        Ok(info) => info?,
        Err(_) => {
            controller.kill_job(job)?;
            controller.wait_for_completion(job).await?
        }
    };
    controller.release_job(job)?;

    if args.json_output {
        println!("{}", format_json(&info)?);
    } else {
        println!("{}", format_human(&info));
    }

    Ok(if JobOutcome::from_info(&info).is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

/// Ask on the terminal; answers match response codes case-insensitively
fn ask_user(prompt: &PromptMessage) -> Option<String> {
    tokio::task::block_in_place(|| {
        eprintln!();
        eprintln!("{}", prompt.message);
        for option in &prompt.response_options {
            eprintln!("  [{}] {}", option.response, option.label);
        }
        eprint!("> ");
        std::io::stderr().flush().unwrap_or(());

        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok()?;
        let answer = line.trim();
        let matched = prompt
            .response_options
            .iter()
            .find(|option| option.response.eq_ignore_ascii_case(answer))
            .map(|option| option.response.clone());
        Some(matched.unwrap_or_else(|| answer.to_string()))
    })
}

/// Without a terminal, take the negative answer so the job never blocks
fn decline(prompt: &PromptMessage) -> Option<String> {
    prompt
        .response_options
        .iter()
        .find(|option| option.response_type.starts_with("No") || option.label.to_ascii_lowercase().starts_with("no"))
        .or_else(|| prompt.response_options.last())
        .map(|option| option.response.clone())
}
