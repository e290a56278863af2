//! Mamut Stack - bring up a local devnet and drive it interactively.
//!
//! # Usage
//!
//! ```bash
//! # Check a stack file without launching anything
//! mamut-stack --config devnet.toml validate
//!
//! # Launch the devnet, print its endpoints and accept control commands
//! mamut-stack --config devnet.toml up
//!
//! # Emit JSON logs at debug level
//! mamut-stack --config devnet.toml --log-level debug --json-logs up
//! ```
//!
//! While `up` runs, each line on stdin is a control command:
//!
//! ```text
//! stop L2CLNode-sequencer-901
//! start L2CLNode-sequencer-901
//! list
//! ```
//!
//! Ctrl+C or end of input tears the devnet down.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::StackFile;
use mamut_core::ComponentId;
use mamut_orchestrator::{
    apply_option_lifecycle, hydrate_system, init_tracing, ControlAction, LocalOrchestrator,
    Orchestrator, System,
};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

/// CLI arguments for mamut-stack.
#[derive(Parser, Debug)]
#[command(
    name = "mamut-stack",
    about = "Bring up a local devnet from a stack file",
    version
)]
pub struct CliArgs {
    /// Path to the stack file.
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides the stack file.
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Enable JSON log output.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Launch the devnet and accept control commands on stdin.
    Up,
    /// Parse and check the stack file, then exit.
    Validate,
}

/// One stdin command.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Control(ControlAction, String),
    List,
    Quit,
}

fn parse_input(line: &str) -> Result<Option<Input>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let input = match (verb, words.next()) {
        ("list", None) => Input::List,
        ("quit" | "exit", None) => Input::Quit,
        (action, Some(target)) => Input::Control(action.parse()?, target.to_string()),
        _ => bail!("expected `start <id>`, `stop <id>`, `list` or `quit`"),
    };
    if words.next().is_some() {
        bail!("trailing input after {verb}");
    }
    Ok(Some(input))
}

fn print_endpoints(system: &System) {
    for frontend in system.all() {
        for (name, endpoint) in frontend.endpoints() {
            let auth = if endpoint.auth { " (jwt)" } else { "" };
            println!("{}\t{}\t{}{}", frontend.id(), name, endpoint.url, auth);
        }
        if frontend.endpoints().is_empty() {
            println!("{}", frontend.id());
        }
    }
}

fn find_component(orch: &LocalOrchestrator, text: &str) -> Option<ComponentId> {
    orch.registries()
        .ids()
        .into_iter()
        .find(|id| id.to_string() == text)
}

async fn control_loop(orch: &LocalOrchestrator) -> Result<()> {
    let control = orch.control_plane();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                return Ok(());
            }
        };
        let Some(line) = line else {
            info!("stdin closed");
            return Ok(());
        };

        match parse_input(&line) {
            Ok(None) => {}
            Ok(Some(Input::Quit)) => return Ok(()),
            Ok(Some(Input::List)) => {
                for id in orch.registries().ids() {
                    println!("{id}");
                }
            }
            Ok(Some(Input::Control(action, target))) => {
                let Some(id) = find_component(orch, &target) else {
                    warn!(target = %target, "unknown component");
                    continue;
                };
                match control.action(&id, action).await {
                    Ok(()) => println!("{action} {id}: ok"),
                    Err(e) => {
                        error!(id = %id, action = %action, error = %e, "control action failed");
                        println!("{action} {id}: {e}");
                    }
                }
            }
            Err(e) => println!("{e}"),
        }
    }
}

async fn up(file: StackFile, base_dir: &Path) -> Result<()> {
    let opts = file.options(base_dir)?;
    let orch = LocalOrchestrator::new(file.stack.clone());

    let deployed = apply_option_lifecycle(&opts, &orch).await;
    if let Err(e) = deployed {
        error!(error = %e, "deployment failed");
        orch.close().await;
        return Err(e.into());
    }

    let system = hydrate_system(&orch, &opts)?;
    info!(
        stack = %file.stack.name,
        components = system.len(),
        "devnet up"
    );
    print_endpoints(&system);

    let result = control_loop(&orch).await;
    info!("Tearing down devnet");
    orch.close().await;
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let mut file = StackFile::from_file(&args.config)
        .with_context(|| format!("Failed to load stack file {:?}", args.config))?;
    if let Some(level) = &args.log_level {
        file.stack.log_level = level.clone();
    }

    init_tracing(&file.stack.log_level, args.json_logs)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    info!(version = env!("CARGO_PKG_VERSION"), "Mamut Stack starting");

    file.validate().context("Invalid stack file")?;
    match args.command {
        Command::Validate => {
            println!(
                "{}: {} components, {} payloads",
                args.config.display(),
                file.component.len(),
                file.payload.len()
            );
            Ok(())
        }
        Command::Up => {
            let base_dir = args
                .config
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            up(file, &base_dir).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_parsing() {
        let args = CliArgs::parse_from(["mamut-stack", "--config", "devnet.toml", "up"]);
        assert_eq!(args.config, PathBuf::from("devnet.toml"));
        assert!(args.log_level.is_none());
        assert!(!args.json_logs);
        assert_eq!(args.command, Command::Up);
    }

    #[test]
    fn test_cli_args_with_options() {
        let args = CliArgs::parse_from([
            "mamut-stack",
            "-c",
            "devnet.toml",
            "--log-level",
            "debug",
            "--json-logs",
            "validate",
        ]);
        assert_eq!(args.log_level, Some("debug".to_string()));
        assert!(args.json_logs);
        assert_eq!(args.command, Command::Validate);
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(CliArgs::try_parse_from(["mamut-stack", "--config", "x.toml"]).is_err());
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("   ").unwrap(), None);
        assert_eq!(parse_input("list").unwrap(), Some(Input::List));
        assert_eq!(parse_input("quit").unwrap(), Some(Input::Quit));
        assert_eq!(
            parse_input("stop L2CLNode-seq-901").unwrap(),
            Some(Input::Control(
                ControlAction::Stop,
                "L2CLNode-seq-901".to_string()
            ))
        );
        assert_eq!(
            parse_input("Start L2CLNode-seq-901").unwrap(),
            Some(Input::Control(
                ControlAction::Start,
                "L2CLNode-seq-901".to_string()
            ))
        );
        assert!(parse_input("restart L2CLNode-seq-901").is_err());
        assert!(parse_input("stop").is_err());
        assert!(parse_input("stop a b").is_err());
    }
}
