use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use control_table::{list_params, param_info, ControlTable, ParamDescriptor};
use safety_guard::SafetyMonitor;
use servo_bus::{
    load_description_file, path, start_actuator, ActuatorHandle, Bridge, Controller,
    ControllerHandle, EventBus, LocalEventBus, Payload, PositionCommand, RobotDescription,
};
use servo_transport::{MockBus, ServoId, Value};

#[derive(Parser, Debug)]
#[command(
    name = "servo",
    version,
    about = "Serial servo bus tool",
    disable_help_subcommand = true
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, action = ArgAction::SetTrue, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the parameter catalog of a control table
    Params {
        /// x_series or xl320
        #[arg(long, default_value = "x_series")]
        table: ControlTable,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Bring the robot up, send position commands and print every event as JSON
    Run {
        /// Robot description YAML
        #[arg(long)]
        config: PathBuf,
        /// How long to keep the bus running after the commands are sent
        #[arg(long, default_value_t = 500)]
        duration_ms: u64,
        /// Position command as joint=radians; repeatable
        #[arg(long = "command", value_parser = parse_joint_command)]
        commands: Vec<(String, f64)>,
        /// Leave the robot disarmed (torque stays off)
        #[arg(long, action = ArgAction::SetTrue)]
        no_arm: bool,
    },
    /// Ping one servo, or every servo on the bus
    Ping {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        id: Option<u8>,
    },
    /// List the remote parameters of every registered servo
    Remote {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Read a parameter, e.g. 1:model_number
    Get {
        #[arg(long)]
        config: PathBuf,
        param_id: String,
    },
    /// Write a parameter, e.g. 1:position_p_gain 640
    Set {
        #[arg(long)]
        config: PathBuf,
        param_id: String,
        value: Value,
    },
    /// Run the bus for a while and print its prometheus metrics
    Metrics {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value_t = 200)]
        duration_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    match cli.command {
        Commands::Params { table, json } => params(table, json),
        Commands::Run {
            config,
            duration_ms,
            commands,
            no_arm,
        } => run(&config, duration_ms, commands, !no_arm).await,
        Commands::Ping { config, id } => ping(&config, id).await,
        Commands::Remote { config, json } => remote(&config, json).await,
        Commands::Get { config, param_id } => get(&config, &param_id).await,
        Commands::Set {
            config,
            param_id,
            value,
        } => set(&config, &param_id, value).await,
        Commands::Metrics {
            config,
            duration_ms,
        } => metrics(&config, duration_ms).await,
    }
}

fn setup_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    // stdout carries command output
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_joint_command(s: &str) -> Result<(String, f64), String> {
    let (joint, angle) = s
        .split_once('=')
        .ok_or_else(|| format!("expected joint=radians, got {s:?}"))?;
    let joint = joint.trim();
    if joint.is_empty() {
        return Err(format!("missing joint name in {s:?}"));
    }
    let angle: f64 = angle
        .trim()
        .parse()
        .map_err(|_| format!("invalid angle in {s:?}"))?;
    Ok((joint.to_string(), angle))
}

/// Controller, actuators and safety monitor for one robot description.
struct Stack {
    desc: RobotDescription,
    safety: Arc<SafetyMonitor>,
    events: Arc<LocalEventBus>,
    controller: ControllerHandle,
    actuators: Vec<ActuatorHandle>,
}

async fn bring_up(config: &Path) -> Result<Stack> {
    let desc = load_description_file(config)?;
    let safety = Arc::new(SafetyMonitor::new());
    let events = Arc::new(LocalEventBus::recording());
    let controller =
        Controller::spawn::<MockBus>(desc.controller.clone(), safety.clone(), events.clone())
            .with_context(|| format!("starting controller on {}", desc.controller.port))?;

    let mut actuators = Vec::with_capacity(desc.servos.len());
    for servo in &desc.servos {
        let handle = start_actuator(
            servo.clone(),
            &desc,
            controller.clone(),
            safety.clone(),
            events.clone(),
        )
        .await
        .with_context(|| format!("starting actuator for joint {}", servo.joint))?;
        actuators.push(handle);
    }
    info!(
        robot = %desc.controller.robot,
        servos = actuators.len(),
        "robot up"
    );
    Ok(Stack {
        desc,
        safety,
        events,
        controller,
        actuators,
    })
}

impl Stack {
    fn bridge(&self) -> Bridge {
        Bridge::new(self.controller.clone(), self.desc.bridge)
    }

    async fn shut_down(self) -> Result<()> {
        let report = self.safety.disarm().await;
        if !report.is_clean() {
            warn!(failures = report.failures.len(), "disarm incomplete");
        }
        for actuator in &self.actuators {
            let _ = actuator.stop().await;
        }
        self.controller.shutdown().await?;
        Ok(())
    }
}

fn params(table: ControlTable, json: bool) -> Result<()> {
    let descs = list_params(table)
        .into_iter()
        .map(|name| param_info(table, name))
        .collect::<Result<Vec<ParamDescriptor>, _>>()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&descs)?);
        return Ok(());
    }
    for d in descs {
        let access = if d.writable { "rw" } else { "ro" };
        let torque = if d.requires_torque_off {
            "torque-off"
        } else {
            "-"
        };
        println!("{}\t{}\t{access}\t{torque}\t{}", d.name, d.category, d.doc);
    }
    Ok(())
}

async fn run(config: &Path, duration_ms: u64, commands: Vec<(String, f64)>, arm: bool) -> Result<()> {
    let stack = bring_up(config).await?;
    if arm {
        stack.safety.arm()?;
    }
    for (joint, angle) in commands {
        if !stack.actuators.iter().any(|a| a.joint() == joint) {
            warn!(joint = %joint, "no actuator for joint; command goes nowhere");
        }
        stack.events.publish(
            path(&["command", &joint]),
            Payload::PositionCommand(PositionCommand::new(angle)),
        );
    }
    tokio::time::sleep(Duration::from_millis(duration_ms)).await;

    let events = stack.events.clone();
    stack.shut_down().await?;
    for envelope in events.history() {
        println!("{}", serde_json::to_string(&envelope)?);
    }
    Ok(())
}

async fn ping(config: &Path, id: Option<u8>) -> Result<()> {
    let stack = bring_up(config).await?;
    let id = id.map(ServoId::try_from).transpose()?;
    let found = stack.controller.ping(id).await;
    stack.shut_down().await?;
    for info in found? {
        println!(
            "{}\tmodel={}\tfirmware={}",
            info.id, info.model_number, info.firmware_version
        );
    }
    Ok(())
}

async fn remote(config: &Path, json: bool) -> Result<()> {
    let stack = bring_up(config).await?;
    let entries = stack.bridge().list_remote().await;
    stack.shut_down().await?;
    let entries = entries?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for e in entries {
        let access = if e.writable { "rw" } else { "ro" };
        println!("{}\t{}\t{access}", e.id, e.category);
    }
    Ok(())
}

async fn get(config: &Path, param_id: &str) -> Result<()> {
    let stack = bring_up(config).await?;
    let value = stack.bridge().get_remote(param_id).await;
    stack.shut_down().await?;
    println!("{param_id} = {}", value?);
    Ok(())
}

async fn set(config: &Path, param_id: &str, value: Value) -> Result<()> {
    let stack = bring_up(config).await?;
    let bridge = stack.bridge();
    let written = bridge.set_remote(param_id, value).await;
    let readback = match &written {
        Ok(()) => Some(bridge.get_remote(param_id).await),
        Err(_) => None,
    };
    stack.shut_down().await?;
    written?;
    match readback {
        Some(Ok(v)) => println!("{param_id} = {v}"),
        _ => println!("{param_id} written"),
    }
    Ok(())
}

async fn metrics(config: &Path, duration_ms: u64) -> Result<()> {
    let stack = bring_up(config).await?;
    stack.safety.arm()?;
    tokio::time::sleep(Duration::from_millis(duration_ms)).await;
    let text = stack.controller.metrics().encode_text();
    stack.shut_down().await?;
    print!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn joint_commands() {
        assert_eq!(
            parse_joint_command("elbow=-0.5"),
            Ok(("elbow".to_string(), -0.5))
        );
        assert_eq!(
            parse_joint_command(" wrist = 1 "),
            Ok(("wrist".to_string(), 1.0))
        );
        assert!(parse_joint_command("elbow").is_err());
        assert!(parse_joint_command("=1.0").is_err());
        assert!(parse_joint_command("elbow=fast").is_err());
    }

    #[test]
    fn parse_run_and_set() {
        let cli = Cli::try_parse_from([
            "servo",
            "run",
            "--config",
            "arm.yaml",
            "--command",
            "shoulder=1.2",
            "--command",
            "elbow=-0.3",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { commands, .. } => assert_eq!(commands.len(), 2),
            other => panic!("unexpected {other:?}"),
        }

        let cli =
            Cli::try_parse_from(["servo", "set", "--config", "a.yaml", "1:led", "true"]).unwrap();
        match cli.command {
            Commands::Set { value, .. } => assert_eq!(value, Value::Bool(true)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn sample_config_comes_up_on_mock_bus() {
        let config = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs/arm.yaml");
        let stack = bring_up(&config).await.unwrap();
        assert_eq!(stack.actuators.len(), 3);
        let ids = stack.controller.list_devices().await.unwrap();
        assert_eq!(ids.len(), 3);
        stack.shut_down().await.unwrap();
    }
}
