// control/mod.rs
//! Control surface: resolves a device, picks its adapter, runs the command
//! and writes the observed outcome back into the registry.
//!
//! A protocol failure during a command marks the device offline before the
//! error is returned. One failed exchange is not proof the device is gone,
//! but it is the only signal available without a second round-trip.

mod locks;

pub use locks::DeviceLocks;

use crate::{
    devices::{AdapterFactory, DeviceAdapter, check_brightness},
    error::AppError,
    metrics,
    models::{
        Capability, ControlRequest, Device, DeviceFilter, DeviceUpdate, NewDevice, PowerAction,
        PowerState, RegistryStats, Rgb, RgbColorRequest,
    },
    registry::DeviceRegistry,
};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Uniform response wrapper returned by every control-surface call.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
            status: StatusCode::OK,
        }
    }

    pub fn failure(error: &AppError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
            status: error.status_code(),
        }
    }

    pub fn from_result(result: Result<T, AppError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(&e),
        }
    }

    /// HTTP status matching the outcome; not part of the serialized body.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// A single command against one device.
#[derive(Debug, Clone)]
enum Operation {
    Control(ControlRequest),
    Power(bool),
    Brightness(u8),
    Rgb(Rgb, Option<u8>),
    ColorTemp(u16),
}

impl Operation {
    fn validate(&self) -> Result<(), AppError> {
        match self {
            Operation::Control(request) => Ok(request.validate()?),
            Operation::Power(_) => Ok(()),
            Operation::Brightness(level) => check_brightness(*level),
            Operation::Rgb(_, brightness) => brightness.map_or(Ok(()), check_brightness),
            Operation::ColorTemp(kelvin) => Ok(crate::models::ColorTempRequest { kelvin: *kelvin }
                .validate()?),
        }
    }

    fn required_capabilities(&self) -> BTreeSet<Capability> {
        match self {
            Operation::Control(request) => request.required_capabilities(),
            Operation::Power(_) => BTreeSet::from([Capability::Power]),
            Operation::Brightness(_) => BTreeSet::from([Capability::Brightness]),
            Operation::Rgb(_, brightness) => {
                let mut required = BTreeSet::from([Capability::Color]);
                if brightness.is_some() {
                    required.insert(Capability::Brightness);
                }
                required
            }
            Operation::ColorTemp(_) => BTreeSet::from([Capability::ColorTemp]),
        }
    }

    async fn apply(&self, adapter: &dyn DeviceAdapter) -> Result<(), AppError> {
        match self {
            Operation::Control(request) => adapter.control(request).await,
            Operation::Power(true) => adapter.turn_on().await,
            Operation::Power(false) => adapter.turn_off().await,
            Operation::Brightness(level) => adapter.set_brightness(*level).await,
            Operation::Rgb(rgb, brightness) => adapter.set_rgb_color(*rgb, *brightness).await,
            Operation::ColorTemp(kelvin) => adapter.set_color_temperature(*kelvin).await,
        }
    }
}

fn check_capabilities(device: &Device, required: &BTreeSet<Capability>) -> Result<(), AppError> {
    match required.iter().find(|c| !device.supports(**c)) {
        Some(missing) => Err(AppError::Validation(format!(
            "Device {} does not support {}",
            device.id, missing
        ))),
        None => Ok(()),
    }
}

pub struct ControlService {
    registry: Arc<DeviceRegistry>,
    adapters: Arc<dyn AdapterFactory>,
    locks: DeviceLocks,
}

impl ControlService {
    pub fn new(registry: Arc<DeviceRegistry>, adapters: Arc<dyn AdapterFactory>) -> Self {
        Self {
            registry,
            adapters,
            locks: DeviceLocks::new(),
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn list_devices(&self, filter: &DeviceFilter) -> ApiResponse<Vec<Device>> {
        ApiResponse::ok(self.registry.filter(filter))
    }

    pub fn search(&self, query: &str) -> ApiResponse<Vec<Device>> {
        ApiResponse::ok(self.registry.search(query))
    }

    pub fn stats(&self) -> ApiResponse<RegistryStats> {
        ApiResponse::ok(self.registry.stats())
    }

    /// Live read. A failed poll degrades to the last known state with the
    /// device marked offline instead of failing the call.
    pub async fn get_device(&self, id: &str) -> ApiResponse<Device> {
        let span = info_span!("get_device", request_id = %Uuid::new_v4(), device_id = %id);
        ApiResponse::from_result(
            async {
                let device = self.registry.get(id).ok_or(AppError::DeviceNotFound)?;
                Ok::<_, AppError>(self.poll(device).await)
            }
            .instrument(span)
            .await,
        )
    }

    pub async fn register_device(&self, new_device: NewDevice, probe: bool) -> ApiResponse<Device> {
        let span = info_span!("register_device", request_id = %Uuid::new_v4(), device_id = %new_device.id);
        ApiResponse::from_result(self.register(new_device, probe).instrument(span).await)
    }

    pub fn update_device(&self, id: &str, update: DeviceUpdate) -> ApiResponse<Device> {
        ApiResponse::from_result(update.validate().map_err(AppError::from).and_then(|_| {
            self.registry
                .update(id, update)
                .ok_or(AppError::DeviceNotFound)
        }))
    }

    /// The device's lock outlives it, so a command still in flight keeps
    /// excluding any later command on a re-registered id.
    pub fn remove_device(&self, id: &str) -> ApiResponse<Device> {
        ApiResponse::from_result(self.registry.remove(id).ok_or(AppError::DeviceNotFound))
    }

    pub async fn control(&self, id: &str, request: ControlRequest) -> ApiResponse<Device> {
        self.run(id, Operation::Control(request)).await
    }

    pub async fn set_power(&self, id: &str, state: PowerState) -> ApiResponse<Device> {
        self.run(id, Operation::Power(state.is_on())).await
    }

    pub async fn set_brightness(&self, id: &str, level: u8) -> ApiResponse<Device> {
        self.run(id, Operation::Brightness(level)).await
    }

    pub async fn set_rgb_color(&self, id: &str, request: RgbColorRequest) -> ApiResponse<Device> {
        let rgb = Rgb {
            r: request.r,
            g: request.g,
            b: request.b,
        };
        self.run(id, Operation::Rgb(rgb, request.brightness)).await
    }

    pub async fn set_color_temperature(&self, id: &str, kelvin: u16) -> ApiResponse<Device> {
        self.run(id, Operation::ColorTemp(kelvin)).await
    }

    pub async fn toggle(&self, id: &str) -> ApiResponse<Device> {
        self.run(id, Operation::Control(ControlRequest::power(PowerAction::Toggle)))
            .await
    }

    /// Reachability probe; the outcome becomes the device's online flag.
    pub async fn test_connection(&self, id: &str) -> ApiResponse<bool> {
        let span = info_span!("test_connection", request_id = %Uuid::new_v4(), device_id = %id);
        ApiResponse::from_result(
            async {
                self.registry.get(id).ok_or(AppError::DeviceNotFound)?;
                let reachable = {
                    let _guard = self.locks.acquire(id).await;
                    let device = self.registry.get(id).ok_or(AppError::DeviceNotFound)?;
                    self.adapters.create(&device)?.test_connection().await
                };
                self.registry.set_online_status(id, reachable);
                info!(reachable, "Connection test finished");
                Ok::<_, AppError>(reachable)
            }
            .instrument(span)
            .await,
        )
    }

    /// Polls every device, concurrently across devices, and returns fresh stats.
    pub async fn refresh_all(&self) -> ApiResponse<RegistryStats> {
        let devices = self.registry.get_all();
        let count = devices.len();
        join_all(devices.into_iter().map(|device| self.poll(device))).await;
        info!(devices = count, "Refreshed all devices");
        ApiResponse::ok(self.registry.stats())
    }

    async fn run(&self, id: &str, operation: Operation) -> ApiResponse<Device> {
        let span = info_span!("control", request_id = %Uuid::new_v4(), device_id = %id);
        let result = self.execute(id, operation).instrument(span).await;
        if let Err(e) = &result {
            warn!(device_id = %id, error = %e, "Control request failed");
        }
        ApiResponse::from_result(result)
    }

    async fn execute(&self, id: &str, operation: Operation) -> Result<Device, AppError> {
        operation.validate()?;
        let device = self.registry.get(id).ok_or(AppError::DeviceNotFound)?;
        check_capabilities(&device, &operation.required_capabilities())?;
        self.adapters.create(&device)?;

        // Re-read under the lock: the record may have changed while waiting.
        let _guard = self.locks.acquire(id).await;
        let device = self.registry.get(id).ok_or(AppError::DeviceNotFound)?;
        check_capabilities(&device, &operation.required_capabilities())?;
        let adapter = self.adapters.create(&device)?;
        let brand = device.brand.to_string();
        let started = Instant::now();
        let outcome = async {
            operation.apply(adapter.as_ref()).await?;
            adapter.get_state().await
        }
        .await;

        match outcome {
            Ok(state) => {
                metrics::record_command(&brand, "success", started.elapsed());
                debug!(?operation, "Command applied");
                self.registry
                    .update_state(id, state, true)
                    .ok_or(AppError::DeviceNotFound)
            }
            Err(e) => {
                metrics::record_command(&brand, "failure", started.elapsed());
                if matches!(e, AppError::Protocol(_)) {
                    self.registry.set_online_status(id, false);
                }
                Err(e)
            }
        }
    }

    /// Refreshes state through the adapter. Devices without an adapter are
    /// returned unchanged.
    async fn poll(&self, device: Device) -> Device {
        if let Err(e) = self.adapters.create(&device) {
            debug!(device_id = %device.id, error = %e, "Skipping live poll");
            return device;
        }
        let polled = {
            let _guard = self.locks.acquire(&device.id).await;
            let Some(current) = self.registry.get(&device.id) else {
                return device;
            };
            match self.adapters.create(&current) {
                Ok(adapter) => adapter.get_state().await,
                Err(_) => return current,
            }
        };
        let updated = match polled {
            Ok(state) => self.registry.update_state(&device.id, state, true),
            Err(e) => {
                warn!(device_id = %device.id, error = %e, "Poll failed, using last known state");
                self.registry.set_online_status(&device.id, false)
            }
        };
        updated.unwrap_or(device)
    }

    async fn register(&self, new_device: NewDevice, probe: bool) -> Result<Device, AppError> {
        new_device.validate()?;
        if self.registry.get(&new_device.id).is_some() {
            return Err(AppError::DeviceExists(new_device.id));
        }
        let mut device = new_device.into_device(Utc::now());
        if device.capabilities.is_empty() {
            device.capabilities.insert(Capability::Power);
        }

        if probe {
            let adapter = self.adapters.create(&device)?;
            let description = adapter.describe().await?;
            device.device_type = description.device_type;
            device.capabilities = description.capabilities;
            device.state = description.state;
            device.online = true;
            device.alias = device.alias.or(description.alias);
            device.model = device.model.or(description.model);
            device.hardware_id = device.hardware_id.or(description.hardware_id);
            info!(capabilities = ?device.capabilities, "Probe filled device details");
        }

        self.registry.add(device)
    }
}
