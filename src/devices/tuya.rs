// devices/tuya.rs
//! Placeholder for Tuya devices. Registered so the brand resolves to an
//! adapter, but every exchange fails until the local protocol is implemented.

use super::{AdapterBuilder, DeviceAdapter, check_brightness, check_hue_saturation};
use crate::{
    config::AdapterSettings,
    error::{AppError, ProtocolError},
    models::{Brand, Device, DeviceDescription, DeviceState},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub struct TuyaAdapter {
    address: String,
}

impl TuyaAdapter {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    fn unavailable(&self) -> AppError {
        warn!(address = %self.address, "Tuya protocol requested but not implemented");
        ProtocolError::NotImplemented("tuya").into()
    }
}

#[async_trait]
impl DeviceAdapter for TuyaAdapter {
    fn brand(&self) -> Brand {
        Brand::Tuya
    }

    async fn turn_on(&self) -> Result<(), AppError> {
        Err(self.unavailable())
    }

    async fn turn_off(&self) -> Result<(), AppError> {
        Err(self.unavailable())
    }

    async fn set_brightness(&self, level: u8) -> Result<(), AppError> {
        check_brightness(level)?;
        Err(self.unavailable())
    }

    async fn set_color(
        &self,
        hue: u16,
        saturation: u8,
        brightness: Option<u8>,
    ) -> Result<(), AppError> {
        check_hue_saturation(hue, saturation)?;
        if let Some(level) = brightness {
            check_brightness(level)?;
        }
        Err(self.unavailable())
    }

    async fn set_color_temperature(&self, _kelvin: u16) -> Result<(), AppError> {
        Err(self.unavailable())
    }

    async fn get_state(&self) -> Result<DeviceState, AppError> {
        Err(self.unavailable())
    }

    async fn describe(&self) -> Result<DeviceDescription, AppError> {
        Err(self.unavailable())
    }
}

struct TuyaBuilder;

impl AdapterBuilder for TuyaBuilder {
    fn brand(&self) -> Brand {
        Brand::Tuya
    }

    fn build(&self, device: &Device, _settings: &AdapterSettings) -> Arc<dyn DeviceAdapter> {
        Arc::new(TuyaAdapter::new(device.address.clone()))
    }
}

inventory::submit! {
    &TuyaBuilder as &'static dyn AdapterBuilder
}
