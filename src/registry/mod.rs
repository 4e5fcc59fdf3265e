// registry/mod.rs
//! In-memory device directory backed by a rewritable snapshot.
//!
//! Every successful mutation refreshes `last_seen` and then writes the whole
//! device set through the [`SnapshotStore`]. A failed write is logged and the
//! in-memory change stands; durability is best-effort per call. Rewriting the
//! full set on every change is write-amplifying and becomes the bottleneck
//! long before the map does. Swap the store for a transactional one if the
//! device count grows.

mod store;

pub use store::{JsonFileStore, MemoryStore, SnapshotStore};

use crate::{
    error::AppError,
    metrics,
    models::{
        Brand, Device, DeviceFilter, DeviceState, DeviceType, DeviceUpdate, RegistryStats,
        Snapshot,
    },
    utils,
};
use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

pub struct DeviceRegistry {
    devices: DashMap<String, Device>,
    store: Arc<dyn SnapshotStore>,
    notes: String,
    // Snapshot capture and write happen under this lock so a later write never
    // carries an older device set than an earlier one.
    persist_lock: Mutex<()>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            devices: DashMap::new(),
            store,
            notes: String::new(),
            persist_lock: Mutex::new(()),
        }
    }

    /// Seeds the registry from the store. A missing or unreadable snapshot
    /// yields an empty registry.
    pub fn load(store: Arc<dyn SnapshotStore>) -> Self {
        let mut registry = Self::new(store);
        match registry.store.load() {
            Ok(Some(snapshot)) => {
                for device in snapshot.devices {
                    if registry.devices.contains_key(&device.id) {
                        warn!(device_id = %device.id, "Duplicate id in snapshot, keeping first");
                        continue;
                    }
                    registry.devices.insert(device.id.clone(), device);
                }
                registry.notes = snapshot.notes;
                info!(devices = registry.devices.len(), "Registry loaded from snapshot");
            }
            Ok(None) => info!("No snapshot found, starting with an empty registry"),
            Err(e) => warn!(error = %e, "Snapshot unreadable, starting with an empty registry"),
        }
        registry
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// All devices ordered by id.
    pub fn get_all(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.iter().map(|d| d.value().clone()).collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    pub fn get(&self, id: &str) -> Option<Device> {
        self.devices.get(id).map(|d| d.value().clone())
    }

    pub fn get_by_address(&self, address: &str) -> Option<Device> {
        self.get_all().into_iter().find(|d| d.address == address)
    }

    /// Loose name lookup: exact normalized match on name, alias or id first,
    /// then a substring match in either direction.
    pub fn get_by_name(&self, query: &str) -> Option<Device> {
        let needle = utils::normalize_name(query);
        if needle.is_empty() {
            return None;
        }
        let devices = self.get_all();
        let candidates = |d: &Device| {
            [Some(d.name.as_str()), d.alias.as_deref(), Some(d.id.as_str())]
                .into_iter()
                .flatten()
                .map(utils::normalize_name)
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()
        };

        devices
            .iter()
            .find(|d| candidates(d).iter().any(|c| *c == needle))
            .or_else(|| {
                devices.iter().find(|d| {
                    candidates(d)
                        .iter()
                        .any(|c| c.contains(&needle) || needle.contains(c.as_str()))
                })
            })
            .cloned()
    }

    pub fn get_by_room(&self, room: &str) -> Vec<Device> {
        self.filter(&DeviceFilter {
            room: Some(room.to_string()),
            ..Default::default()
        })
    }

    pub fn get_by_type(&self, device_type: DeviceType) -> Vec<Device> {
        self.filter(&DeviceFilter {
            device_type: Some(device_type),
            ..Default::default()
        })
    }

    pub fn get_by_brand(&self, brand: Brand) -> Vec<Device> {
        self.filter(&DeviceFilter {
            brand: Some(brand),
            ..Default::default()
        })
    }

    pub fn get_online(&self) -> Vec<Device> {
        self.filter(&DeviceFilter {
            online: Some(true),
            ..Default::default()
        })
    }

    pub fn filter(&self, filter: &DeviceFilter) -> Vec<Device> {
        self.get_all()
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect()
    }

    /// Case-insensitive substring search over the descriptive fields.
    pub fn search(&self, query: &str) -> Vec<Device> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.get_all()
            .into_iter()
            .filter(|d| {
                let type_name = d.device_type.to_string();
                let brand_name = d.brand.to_string();
                [
                    Some(d.name.as_str()),
                    d.alias.as_deref(),
                    Some(d.id.as_str()),
                    d.room.as_deref(),
                    d.model.as_deref(),
                    Some(type_name.as_str()),
                    Some(brand_name.as_str()),
                ]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for entry in self.devices.iter() {
            let device = entry.value();
            stats.total += 1;
            if device.online {
                stats.online += 1;
            } else {
                stats.offline += 1;
            }
            *stats.by_type.entry(device.device_type.to_string()).or_default() += 1;
            *stats.by_brand.entry(device.brand.to_string()).or_default() += 1;
            if let Some(room) = &device.room {
                *stats.by_room.entry(room.clone()).or_default() += 1;
            }
        }
        stats
    }

    pub fn add(&self, mut device: Device) -> Result<Device, AppError> {
        device.last_seen = Utc::now();
        match self.devices.entry(device.id.clone()) {
            Entry::Occupied(_) => return Err(AppError::DeviceExists(device.id)),
            Entry::Vacant(slot) => {
                slot.insert(device.clone());
            }
        }
        info!(device_id = %device.id, brand = %device.brand, address = %device.address, "Device added");
        self.persist();
        Ok(device)
    }

    pub fn update(&self, id: &str, update: DeviceUpdate) -> Option<Device> {
        self.mutate(id, |device| update.apply(device))
    }

    pub fn remove(&self, id: &str) -> Option<Device> {
        let (_, device) = self.devices.remove(id)?;
        info!(device_id = %id, "Device removed");
        self.persist();
        Some(device)
    }

    pub fn set_online_status(&self, id: &str, online: bool) -> Option<Device> {
        self.mutate(id, |device| device.online = online)
    }

    pub fn update_state(&self, id: &str, state: DeviceState, online: bool) -> Option<Device> {
        self.mutate(id, |device| {
            device.state = state;
            device.online = online;
        })
    }

    fn mutate(&self, id: &str, apply: impl FnOnce(&mut Device)) -> Option<Device> {
        let updated = {
            let mut entry = self.devices.get_mut(id)?;
            apply(entry.value_mut());
            entry.last_seen = Utc::now();
            entry.value().clone()
        };
        self.persist();
        Some(updated)
    }

    fn persist(&self) {
        let _guard = self.persist_lock.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = Snapshot {
            devices: self.get_all(),
            last_updated: Utc::now(),
            notes: self.notes.clone(),
        };
        if let Err(e) = self.store.save(&snapshot) {
            metrics::record_persist_failure();
            error!(error = %e, devices = snapshot.devices.len(), "Failed to persist registry snapshot");
        }
    }
}
