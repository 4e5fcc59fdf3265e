// devices/mod.rs
//! Brand adapters behind one control contract.
//!
//! Each brand registers an [`AdapterBuilder`] through `inventory`; the
//! control surface only sees the [`AdapterFactory`] trait, so a brand is
//! added by adding a module, not by touching call sites.

pub mod color;
pub mod kasa;
mod tuya;

pub use kasa::KasaAdapter;
pub use tuya::TuyaAdapter;

use crate::{
    config::AdapterSettings,
    error::AppError,
    models::{Brand, ControlRequest, Device, DeviceDescription, DeviceState, PowerAction, Rgb},
};
use async_trait::async_trait;
use std::ops::RangeInclusive;
use std::sync::Arc;
use validator::Validate;

#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    fn brand(&self) -> Brand;

    async fn turn_on(&self) -> Result<(), AppError>;
    async fn turn_off(&self) -> Result<(), AppError>;
    async fn set_brightness(&self, level: u8) -> Result<(), AppError>;
    async fn set_color(
        &self,
        hue: u16,
        saturation: u8,
        brightness: Option<u8>,
    ) -> Result<(), AppError>;
    async fn set_color_temperature(&self, kelvin: u16) -> Result<(), AppError>;

    async fn set_rgb_color(&self, rgb: Rgb, brightness: Option<u8>) -> Result<(), AppError> {
        if let Some(level) = brightness {
            check_brightness(level)?;
        }
        let hsv = color::rgb_to_hsv(rgb);
        self.set_color(hsv.hue, hsv.saturation, brightness).await
    }

    /// One request, one power decision. Extras are applied only when the
    /// device ends up on.
    async fn control(&self, request: &ControlRequest) -> Result<(), AppError> {
        request.validate()?;
        if !self.resolve_power(request.action).await? {
            return self.turn_off().await;
        }
        self.turn_on().await?;
        if let Some(level) = request.brightness {
            self.set_brightness(level).await?;
        }
        if let Some(rgb) = request.color {
            self.set_rgb_color(rgb, None).await?;
        } else if let (Some(hue), Some(saturation)) = (request.hue, request.saturation) {
            self.set_color(hue, saturation, None).await?;
        }
        if let Some(kelvin) = request.color_temp {
            self.set_color_temperature(kelvin).await?;
        }
        Ok(())
    }

    /// Maps an action to the target power state. Toggle polls first and
    /// fails if the poll does.
    async fn resolve_power(&self, action: PowerAction) -> Result<bool, AppError> {
        Ok(match action {
            PowerAction::On => true,
            PowerAction::Off => false,
            PowerAction::Toggle => !self.get_state().await?.power.is_on(),
        })
    }

    async fn get_state(&self) -> Result<DeviceState, AppError>;

    /// Queries identity and capabilities, used when registering with a probe.
    async fn describe(&self) -> Result<DeviceDescription, AppError>;

    async fn test_connection(&self) -> bool {
        self.get_state().await.is_ok()
    }
}

pub trait AdapterBuilder: Sync {
    fn brand(&self) -> Brand;
    fn build(&self, device: &Device, settings: &AdapterSettings) -> Arc<dyn DeviceAdapter>;
}

inventory::collect!(&'static dyn AdapterBuilder);

pub trait AdapterFactory: Send + Sync {
    fn create(&self, device: &Device) -> Result<Arc<dyn DeviceAdapter>, AppError>;
}

/// Resolves adapters from the builders registered at link time.
pub struct BrandAdapterFactory {
    settings: AdapterSettings,
}

impl BrandAdapterFactory {
    pub fn new(settings: AdapterSettings) -> Self {
        Self { settings }
    }

    pub fn supported_brands() -> Vec<Brand> {
        let mut brands = Vec::new();
        for builder in inventory::iter::<&'static dyn AdapterBuilder> {
            brands.push(builder.brand());
        }
        brands
    }
}

impl AdapterFactory for BrandAdapterFactory {
    fn create(&self, device: &Device) -> Result<Arc<dyn DeviceAdapter>, AppError> {
        for builder in inventory::iter::<&'static dyn AdapterBuilder> {
            if builder.brand() == device.brand {
                return Ok(builder.build(device, &self.settings));
            }
        }
        Err(AppError::UnsupportedBrand(device.brand))
    }
}

pub(crate) fn check_range<T>(name: &str, value: T, range: RangeInclusive<T>) -> Result<(), AppError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{} must be between {} and {}, got {}",
            name,
            range.start(),
            range.end(),
            value
        )))
    }
}

pub(crate) fn check_brightness(level: u8) -> Result<(), AppError> {
    check_range("brightness", level, 0..=100)
}

pub(crate) fn check_hue_saturation(hue: u16, saturation: u8) -> Result<(), AppError> {
    check_range("hue", hue, 0..=360)?;
    check_range("saturation", saturation, 0..=100)
}
