//! Simulation role
//!
//! Fixed-rate loop on a dedicated thread. Each tick:
//! 1. re-resolves references when the device table or a binding changed
//!    since last tick
//! 2. polls every device once
//! 3. reads every control of every controller through its override path
//!
//! Controllers are shared behind a `RwLock`; tool code takes the write lock to
//! install or remove overrides, which serialises that with the tick boundary.

use anyhow::{Context, Result};
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::controller::{ControlValue, EmulatedController};
use crate::device::{ControlState, DeviceRegistry};

/// Controller shared between the simulation loop and tool code
pub type SharedController = Arc<RwLock<EmulatedController>>;

/// Values of one controller for one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    pub name: String,
    pub values: Vec<ControlValue>,
}

/// Everything read during one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickSnapshot {
    pub tick: u64,
    pub controllers: Vec<ControllerSnapshot>,
}

impl TickSnapshot {
    pub fn value(&self, controller: &str, group: &str, control: &str) -> Option<ControlState> {
        self.controllers
            .iter()
            .find(|c| c.name == controller)?
            .values
            .iter()
            .find(|v| v.group == group && v.control == control)
            .map(|v| v.value)
    }
}

/// Per-tick work, usable directly for deterministic stepping
pub struct Simulation {
    registry: Arc<DeviceRegistry>,
    controllers: Vec<SharedController>,
    seen_generation: Option<u64>,
    tick: u64,
}

impl Simulation {
    pub fn new(registry: Arc<DeviceRegistry>, controllers: Vec<SharedController>) -> Self {
        Self {
            registry,
            controllers,
            seen_generation: None,
            tick: 0,
        }
    }

    /// Run one tick and return what was read
    pub fn tick(&mut self) -> TickSnapshot {
        let generation = self.registry.generation();
        let table_changed = self.seen_generation != Some(generation);
        if table_changed {
            debug!(
                "Device table changed (generation {}), re-resolving references",
                generation
            );
            self.seen_generation = Some(generation);
        }
        for controller in &self.controllers {
            if table_changed || controller.read().needs_reference_update() {
                let mut controller = controller.write();
                trace!("Re-resolving references of '{}'", controller.name());
                controller.update_references(&self.registry);
            }
        }

        self.registry.update_input();

        let mut snapshot = TickSnapshot {
            tick: self.tick,
            controllers: Vec::with_capacity(self.controllers.len()),
        };
        for controller in &self.controllers {
            let controller = controller.read();
            let mut values = Vec::new();
            controller.collect_states(&mut values);
            snapshot.controllers.push(ControllerSnapshot {
                name: controller.name().to_string(),
                values,
            });
        }

        trace!("Tick {} complete", self.tick);
        self.tick += 1;
        snapshot
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u64 {
        self.tick
    }
}

/// Simulation role running on its own thread
pub struct SimulationLoop {
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
}

impl SimulationLoop {
    /// Start ticking at `tick_rate_hz`, handing every snapshot to `on_tick`
    pub fn spawn<F>(
        registry: Arc<DeviceRegistry>,
        controllers: Vec<SharedController>,
        tick_rate_hz: u32,
        mut on_tick: F,
    ) -> Result<Self>
    where
        F: FnMut(&TickSnapshot) + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);
        let ticks = Arc::new(AtomicU64::new(0));
        let interval = Duration::from_secs_f64(1.0 / f64::from(tick_rate_hz.max(1)));

        let counter = ticks.clone();
        let handle = std::thread::Builder::new()
            .name("simulation".to_string())
            .spawn(move || {
                let mut simulation = Simulation::new(registry, controllers);
                info!("Simulation loop started at {:?} per tick", interval);

                loop {
                    let started = Instant::now();
                    let snapshot = simulation.tick();
                    on_tick(&snapshot);
                    counter.store(simulation.ticks(), Ordering::Release);

                    let elapsed = started.elapsed();
                    if elapsed > interval {
                        trace!("Tick overran by {:?}", elapsed - interval);
                    }
                    match shutdown_rx.recv_timeout(interval.saturating_sub(elapsed)) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {},
                    }
                }

                info!("Simulation loop stopped after {} ticks", simulation.ticks());
            })
            .context("Failed to spawn simulation thread")?;

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            ticks,
        })
    }

    /// Synchronous variant: run exactly `count` ticks on the calling thread
    pub fn run_ticks<F>(
        registry: Arc<DeviceRegistry>,
        controllers: Vec<SharedController>,
        count: u64,
        mut on_tick: F,
    ) -> u64
    where
        F: FnMut(&TickSnapshot),
    {
        let mut simulation = Simulation::new(registry, controllers);
        for _ in 0..count {
            let snapshot = simulation.tick();
            on_tick(&snapshot);
        }
        simulation.ticks()
    }

    /// Ticks completed so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Stop the loop and wait for the current tick to finish
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            debug!("Simulation loop shutdown requested");
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Simulation thread panicked");
            }
        }
    }
}

impl Drop for SimulationLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
