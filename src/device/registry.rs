//! Process-wide device table
//!
//! Devices are published as an immutable [`RegistrySnapshot`]. Every change
//! builds a new snapshot and swaps it in, so a lookup never observes a
//! half-updated table. Readers only hold the snapshot `Arc` for as long as a
//! single lookup or poll takes.

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::enumeration::DeviceRecord;
use super::qualifier::DeviceQualifier;
use super::Device;

/// Immutable view of the device table
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    devices: Vec<(DeviceQualifier, Arc<Device>)>,
    raw_ids: HashMap<i64, DeviceQualifier>,
}

impl RegistrySnapshot {
    /// Resolve a qualifier; a negative index matches the first candidate
    pub fn find(&self, qualifier: &DeviceQualifier) -> Option<&Arc<Device>> {
        self.devices
            .iter()
            .find(|(q, _)| qualifier.matches(q))
            .map(|(_, device)| device)
    }

    pub fn qualifier_for_raw_id(&self, raw_id: i64) -> Option<&DeviceQualifier> {
        self.raw_ids.get(&raw_id)
    }

    pub fn devices(&self) -> impl Iterator<Item = (&DeviceQualifier, &Arc<Device>)> {
        self.devices.iter().map(|(q, d)| (q, d))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Lowest index not yet used by a device with this source and name
    fn free_index(&self, source: &str, name: &str, preferred: Option<i32>) -> i32 {
        let taken = |idx: i32| {
            self.devices
                .iter()
                .any(|(q, _)| q.source == source && q.name == name && q.index == idx)
        };

        if let Some(id) = preferred.filter(|id| *id >= 0 && !taken(*id)) {
            return id;
        }
        (0..).find(|idx| !taken(*idx)).unwrap_or(0)
    }

    fn insert(&mut self, device: Arc<Device>) -> DeviceQualifier {
        let index = self.free_index(device.source(), device.name(), device.preferred_id());
        let qualifier = DeviceQualifier::new(device.source(), index, device.name());

        // Keep higher priority devices first, insertion order otherwise
        let pos = self
            .devices
            .iter()
            .position(|(_, d)| d.sort_priority() < device.sort_priority())
            .unwrap_or(self.devices.len());
        self.devices.insert(pos, (qualifier.clone(), device));
        qualifier
    }

    fn remove(&mut self, qualifier: &DeviceQualifier) -> Option<Arc<Device>> {
        let pos = self.devices.iter().position(|(q, _)| q == qualifier)?;
        let (_, device) = self.devices.remove(pos);
        self.raw_ids.retain(|_, q| q != qualifier);
        Some(device)
    }
}

/// Result of applying one enumeration refresh
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnumerationDelta {
    pub added: Vec<DeviceQualifier>,
    pub removed: Vec<DeviceQualifier>,
}

/// Device table with snapshot-and-swap updates
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    /// Previous enumeration, paired with the qualifier each record received
    last_enumeration: Mutex<Vec<(DeviceRecord, DeviceQualifier)>>,
    generation: AtomicU64,
    initialized: AtomicBool,
}

static GLOBAL: Lazy<Arc<DeviceRegistry>> = Lazy::new(|| Arc::new(DeviceRegistry::new()));

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> Arc<DeviceRegistry> {
        GLOBAL.clone()
    }

    /// Mark the registry live
    pub fn initialize(&self) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            debug!("Device registry already initialized");
            return;
        }
        info!("Device registry initialized");
    }

    /// Drop every device and forget the last enumeration
    pub fn shutdown(&self) {
        self.last_enumeration.lock().clear();
        self.swap(|_| RegistrySnapshot::default());
        self.initialized.store(false, Ordering::Release);
        info!("Device registry shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Current snapshot; cheap to call, never observes a partial update
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().clone()
    }

    /// Incremented on every change to the device table
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Build a modified copy of the table and publish it atomically
    fn swap<R>(&self, edit: impl FnOnce(&mut RegistrySnapshot) -> R) -> R {
        let mut guard = self.snapshot.write();
        let mut next = RegistrySnapshot {
            devices: guard.devices.clone(),
            raw_ids: guard.raw_ids.clone(),
        };
        let result = edit(&mut next);
        *guard = Arc::new(next);
        self.generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    /// Publish a device and return the qualifier it was assigned
    pub fn add_device(&self, device: Device) -> DeviceQualifier {
        let device = Arc::new(device);
        let qualifier = self.swap(|snap| snap.insert(device));
        info!("Device added: {}", qualifier);
        qualifier
    }

    pub fn remove_device(&self, qualifier: &DeviceQualifier) -> bool {
        let removed = self.swap(|snap| snap.remove(qualifier)).is_some();
        if removed {
            info!("Device removed: {}", qualifier);
        } else {
            debug!("Device {} not present, nothing removed", qualifier);
        }
        removed
    }

    pub fn find_device(&self, qualifier: &DeviceQualifier) -> Option<Arc<Device>> {
        self.snapshot().find(qualifier).cloned()
    }

    /// Associate a host id with a qualifier
    pub fn register_raw_id(&self, raw_id: i64, qualifier: DeviceQualifier) {
        self.swap(|snap| {
            snap.raw_ids.insert(raw_id, qualifier);
        });
    }

    /// Resolve a host id to a live device
    pub fn find_by_raw_id(&self, raw_id: i64) -> Option<Arc<Device>> {
        let snap = self.snapshot();
        let Some(qualifier) = snap.qualifier_for_raw_id(raw_id) else {
            debug!("Could not find device ID {}", raw_id);
            return None;
        };
        let device = snap.find(qualifier).cloned();
        if device.is_none() {
            debug!("Could not find device {}", qualifier);
        }
        device
    }

    /// Apply a fresh enumeration as adds/removes against the previous one
    ///
    /// Records that match a previous record (same source, name, and control
    /// list) keep their device and qualifier even if the raw id changed.
    pub fn apply_enumeration(&self, records: &[DeviceRecord]) -> EnumerationDelta {
        let mut last = self.last_enumeration.lock();
        let mut previous: Vec<Option<(DeviceRecord, DeviceQualifier)>> =
            last.drain(..).map(Some).collect();

        let mut kept = Vec::new();
        let mut fresh = Vec::new();
        for record in records {
            let matched = previous.iter_mut().find(|slot| {
                slot.as_ref().is_some_and(|(prev, _)| {
                    prev.source == record.source
                        && prev.name == record.name
                        && prev.controls == record.controls
                })
            });
            match matched.and_then(|slot| slot.take()) {
                Some((_, qualifier)) => kept.push((record.clone(), qualifier)),
                None => fresh.push(record.clone()),
            }
        }
        let stale: Vec<DeviceQualifier> = previous.into_iter().flatten().map(|(_, q)| q).collect();

        let mut built = Vec::new();
        for record in fresh {
            match record.build() {
                Ok(device) => built.push((record, device)),
                Err(e) => warn!("Skipping device {}/{}: {}", record.source, record.name, e),
            }
        }

        let delta = self.swap(|snap| {
            let mut delta = EnumerationDelta::default();
            for qualifier in &stale {
                if snap.remove(qualifier).is_some() {
                    delta.removed.push(qualifier.clone());
                }
            }
            for (record, qualifier) in &kept {
                snap.raw_ids.retain(|_, q| q != qualifier);
                if let Some(raw) = record.raw_id {
                    snap.raw_ids.insert(raw, qualifier.clone());
                }
            }
            for (record, device) in built {
                let qualifier = snap.insert(Arc::new(device));
                if let Some(raw) = record.raw_id {
                    snap.raw_ids.insert(raw, qualifier.clone());
                }
                delta.added.push(qualifier.clone());
                kept.push((record, qualifier));
            }
            delta
        });

        *last = kept;

        if !delta.added.is_empty() || !delta.removed.is_empty() {
            info!(
                "Enumeration applied: {} added, {} removed",
                delta.added.len(),
                delta.removed.len()
            );
        }
        delta
    }

    /// Poll every device once
    pub fn update_input(&self) {
        let snap = self.snapshot();
        for (_, device) in snap.devices() {
            device.update_input();
        }
    }
}
