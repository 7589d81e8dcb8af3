//! Input Override - virtual controller host
//!
//! Publishes the configured devices, builds the emulated controllers, applies
//! the bindings profile (with hot reload) and runs the simulation loop.

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use input_override::config::{AppConfig, ConfigWatcher};
use input_override::group::GroupType;
use input_override::overrides::tas::AxisMapping;
use input_override::overrides::{PresentationHandle, PresentationQueue, TasInputSession};
use input_override::paths::AppPaths;
use input_override::profile::Profile;
use input_override::simulation::{SharedController, SimulationLoop, TickSnapshot};
use input_override::{DeviceRegistry, EmulatedController};

/// Input Override - emulated controllers with tool-side input overrides
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the detected app directory)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Stop after this many ticks
    #[arg(long)]
    ticks: Option<u64>,

    /// List the configured devices and their controls
    #[arg(long)]
    list_devices: bool,

    /// Attach a TAS input session to the first controller
    #[arg(long)]
    tas: bool,

    /// Print the last tick as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    let paths = AppPaths::detect();
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| paths.config.to_string_lossy().to_string());

    info!("Starting Input Override...");
    info!("Configuration file: {}", config_path);

    let config = AppConfig::load(&config_path).await?;

    let registry = DeviceRegistry::global();
    registry.initialize();
    registry.apply_enumeration(&config.devices);

    if args.list_devices {
        list_devices(&registry);
        registry.shutdown();
        return Ok(());
    }

    let controllers = build_controllers(&config)?;

    let profile_path = config
        .profile
        .as_deref()
        .map(|p| paths.resolve(p))
        .or_else(|| paths.profile.exists().then(|| paths.profile.clone()));
    let watcher = match &profile_path {
        Some(path) => Some(start_profile(path, &controllers, &registry).await?),
        None => {
            debug!("No bindings profile, controllers start unbound");
            None
        },
    };

    run_app(args, config, registry.clone(), controllers, watcher).await?;

    registry.shutdown();
    info!("Input Override shutdown complete");
    Ok(())
}

fn build_controllers(config: &AppConfig) -> Result<Vec<SharedController>> {
    config
        .controllers
        .iter()
        .map(|layout| {
            EmulatedController::from_layout(layout)
                .map(|c| Arc::new(RwLock::new(c)))
                .with_context(|| format!("Failed to build controller '{}'", layout.name))
        })
        .collect()
}

/// Load the profile into the first controller and watch it for changes
async fn start_profile(
    path: &Path,
    controllers: &[SharedController],
    registry: &DeviceRegistry,
) -> Result<ConfigWatcher> {
    let (watcher, profile) = ConfigWatcher::new(path).await?;
    if let Some(controller) = controllers.first() {
        apply_profile(controller, &profile, registry);
    }
    Ok(watcher)
}

/// Swap bindings between ticks
fn apply_profile(controller: &SharedController, profile: &Profile, registry: &DeviceRegistry) {
    let mut controller = controller.write();
    controller.load_profile(profile);
    controller.update_references(registry);
    info!("Profile applied to '{}' ({} keys)", controller.name(), profile.len());
}

/// Build TAS widgets for every button, stick and trigger of a controller
fn build_tas_session(controller: &EmulatedController, handle: &PresentationHandle) -> TasInputSession {
    let mut session = TasInputSession::new(handle.clone());
    for group in controller.groups() {
        let base = group.base();
        for control in base.controls().iter().filter(|c| c.reference.is_input()) {
            match base.group_type() {
                GroupType::Buttons => {
                    session.add_button(base.name(), &control.name);
                },
                GroupType::Stick => {
                    session.add_axis(base.name(), &control.name, AxisMapping::stick());
                },
                GroupType::Triggers => {
                    session.add_axis(base.name(), &control.name, AxisMapping::trigger());
                },
                _ => {},
            }
        }
    }
    session
}

async fn run_app(
    args: Args,
    config: AppConfig,
    registry: Arc<DeviceRegistry>,
    controllers: Vec<SharedController>,
    mut watcher: Option<ConfigWatcher>,
) -> Result<()> {
    let (handle, queue) = PresentationQueue::new();

    let tas = match (args.tas, controllers.first()) {
        (true, Some(first)) => {
            let mut controller = first.write();
            let session = build_tas_session(&controller, &handle);
            session.install(&mut controller);
            Some(Arc::new(session))
        },
        _ => None,
    };
    let presentation = queue.spawn();

    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel::<TickSnapshot>();
    let tick_session = tas.clone();
    let mut simulation = SimulationLoop::spawn(
        registry.clone(),
        controllers.clone(),
        config.simulation.tick_rate_hz,
        move |snapshot| {
            if let Some(session) = &tick_session {
                session.next_frame();
            }
            let _ = tick_tx.send(snapshot.clone());
        },
    )?;

    info!("Ready, ticking at {} Hz", config.simulation.tick_rate_hz);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut last: Option<TickSnapshot> = None;

    loop {
        tokio::select! {
            Some(snapshot) = tick_rx.recv() => {
                debug!("Tick {}: {} controllers", snapshot.tick, snapshot.controllers.len());
                let done = args.ticks.is_some_and(|limit| snapshot.tick + 1 >= limit);
                last = Some(snapshot);
                if done {
                    info!("Tick limit reached");
                    break;
                }
            }

            Some(profile) = next_profile(&mut watcher) => {
                info!("Profile file changed, reloading...");
                if let Some(controller) = controllers.first() {
                    apply_profile(controller, &profile, &registry);
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping simulation");
                break;
            }
        }
    }

    simulation.stop();

    if let (Some(session), Some(first)) = (&tas, controllers.first()) {
        session.uninstall(&mut first.write());
    }
    // Last handle goes with the session, which ends the presentation task
    drop(tas);
    drop(handle);
    if let Err(e) = presentation.await {
        warn!("Presentation task failed: {}", e);
    }

    match &last {
        Some(snapshot) if args.json => {
            let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize tick")?;
            println!("{}", json);
        },
        Some(snapshot) => print_snapshot(snapshot),
        None => {},
    }
    Ok(())
}

async fn next_profile(watcher: &mut Option<ConfigWatcher>) -> Option<Profile> {
    match watcher {
        Some(watcher) => watcher.next_profile().await,
        None => std::future::pending().await,
    }
}

fn list_devices(registry: &DeviceRegistry) {
    use colored::*;

    println!("\n{}", "=== Devices ===".bold().cyan());
    let snapshot = registry.snapshot();
    if snapshot.is_empty() {
        println!("  {}", "No devices configured".yellow());
        return;
    }
    for (qualifier, device) in snapshot.devices() {
        println!("\n  {}", qualifier.to_string().bright_white());
        for input in device.inputs() {
            println!("    {} {}", "in ".green(), input.name());
        }
        for output in device.outputs() {
            println!("    {} {}", "out".yellow(), output.name());
        }
    }
}

fn print_snapshot(snapshot: &TickSnapshot) {
    use colored::*;

    println!("\n{}", format!("=== Tick {} ===", snapshot.tick).bold().cyan());
    for controller in &snapshot.controllers {
        println!("\n  {}", controller.name.bright_white());
        for value in &controller.values {
            let shown = format!("{:.3}", value.value);
            let shown = if value.value != 0.0 { shown.green() } else { shown.normal() };
            println!("    {}/{}: {}", value.group, value.control, shown);
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
