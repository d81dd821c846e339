use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use droidpilot::agent::state::AgentStatus;
use droidpilot::config;
use droidpilot::device::channel::detect_device;

/// Vision-Language-Action automation agent for Android devices over ADB.
#[derive(Debug, Parser)]
#[command(name = "droidpilot", version, about)]
struct Cli {
    /// Natural-language task to accomplish on the device
    task: String,

    /// Device serial (auto-detected when omitted)
    #[arg(short, long)]
    device: Option<String>,

    /// Maximum steps before giving up (overrides the config value)
    #[arg(short = 's', long = "steps")]
    max_steps: Option<u32>,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Path to config.toml (default: next to the executable or in the cwd)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// The --steps flag wins only when the user actually passed it.
fn effective_max_steps(config_value: u32, flag: Option<u32>) -> u32 {
    flag.unwrap_or(config_value)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("error")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let _ = dotenvy::dotenv();

    let mut config = match config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    config.agent.max_steps = effective_max_steps(config.agent.max_steps, cli.max_steps);

    let device = match cli.device {
        Some(serial) => serial,
        None => match detect_device().await {
            Ok(serial) => serial,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        },
    };
    tracing::info!(device = %device, "using device");

    let mut agent = droidpilot::build_agent(cli.task.clone(), device, &config);

    // Ctrl-C requests a cooperative stop; the current step finishes first.
    let stop = agent.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after current step");
            stop.stop();
        }
    });

    if !cli.quiet {
        agent.on_step(Box::new(|record| {
            let action = record.action["type"].as_str().unwrap_or("unknown");
            let ok = record.result["success"].as_bool().unwrap_or(false);
            println!(
                "step {}: {} -> {}",
                record.step_number,
                action,
                if ok { "OK" } else { "FAIL" }
            );
        }));
    }

    let outcome = agent.run().await;

    println!("{}", "=".repeat(50));
    println!(
        "RESULT: {}",
        if outcome.success { "SUCCESS" } else { "FAILED" }
    );
    println!("Status: {:?}", outcome.status);
    println!("Steps: {}", outcome.total_steps);
    println!("Duration: {:.1}s", outcome.total_duration_ms as f64 / 1000.0);
    if let Some(error) = &outcome.error {
        println!("Error: {error}");
    }
    println!("{}", "=".repeat(50));

    if outcome.success && outcome.status == AgentStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
