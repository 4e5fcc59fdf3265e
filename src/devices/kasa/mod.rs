// devices/kasa/mod.rs
//! TP-Link Kasa adapter speaking the local TCP protocol.

pub mod cipher;
mod messages;
mod protocol;

pub use messages::{Command, LightUpdate, SysInfo};
pub use protocol::{DEFAULT_PORT, DEFAULT_TIMEOUT, TcpTransport, Transport};

use super::{AdapterBuilder, DeviceAdapter, check_brightness, check_hue_saturation, check_range};
use crate::{
    config::{AdapterSettings, KasaSettings},
    error::AppError,
    models::{
        Brand, ControlRequest, Device, DeviceDescription, DeviceState, DeviceType, PowerAction,
    },
};
use async_trait::async_trait;
use serde_json::Value;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

/// Colour temperature range reported for a model.
pub fn color_temp_range(model: Option<&str>) -> RangeInclusive<u16> {
    let model = model.unwrap_or_default().to_ascii_uppercase();
    if model.starts_with("KL120") || model.starts_with("LB120") {
        2700..=6500
    } else if model.starts_with("KL125") || model.starts_with("KL135") {
        2500..=6500
    } else {
        2500..=9000
    }
}

pub struct KasaAdapter<T = TcpTransport> {
    transport: T,
    device_type: DeviceType,
    color_temp_range: RangeInclusive<u16>,
}

impl KasaAdapter<TcpTransport> {
    pub fn for_device(device: &Device, settings: &KasaSettings) -> Self {
        let transport = TcpTransport::new(&device.address, settings.port, settings.timeout());
        Self::new(transport, device.device_type, device.model.as_deref())
    }
}

impl<T: Transport> KasaAdapter<T> {
    pub fn new(transport: T, device_type: DeviceType, model: Option<&str>) -> Self {
        Self {
            transport,
            device_type,
            color_temp_range: color_temp_range(model),
        }
    }

    fn is_light(&self) -> bool {
        self.device_type == DeviceType::Light
    }

    fn require_light(&self, what: &str) -> Result<(), AppError> {
        if self.is_light() {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "{} is only available on Kasa bulbs",
                what
            )))
        }
    }

    fn check_color_temp(&self, kelvin: u16) -> Result<(), AppError> {
        check_range("color temperature", kelvin, self.color_temp_range.clone())
    }

    fn power_command(&self, on: bool) -> Command {
        if self.is_light() {
            Command::light(LightUpdate {
                on: Some(on),
                ..Default::default()
            })
        } else {
            Command::relay(on)
        }
    }

    /// Builds the single outbound object for a validated control request.
    fn control_command(&self, request: &ControlRequest, on: bool) -> Result<Command, AppError> {
        if !on {
            return Ok(self.power_command(false));
        }
        if !self.is_light() {
            let command = Command::relay(true);
            return Ok(match request.brightness {
                Some(level) => command.merge(Command::dimmer(level)),
                None => command,
            });
        }

        let (hue, saturation) = match request.color {
            Some(rgb) => {
                let hsv = super::color::rgb_to_hsv(rgb);
                (Some(hsv.hue), Some(hsv.saturation))
            }
            None => (request.hue, request.saturation),
        };
        Ok(Command::light(LightUpdate {
            on: Some(true),
            brightness: request.brightness,
            hue,
            saturation,
            color_temp: request.color_temp,
        }))
    }

    async fn send(&self, command: Command) -> Result<Value, AppError> {
        let payload = command.into_value();
        debug!(request = %payload, "Kasa command");
        let response = self.transport.request(&payload).await?;
        messages::check_response(&response)?;
        Ok(response)
    }

    async fn sysinfo(&self) -> Result<SysInfo, AppError> {
        let response = self.send(Command::sysinfo()).await?;
        Ok(SysInfo::from_response(&response)?)
    }
}

#[async_trait]
impl<T: Transport> DeviceAdapter for KasaAdapter<T> {
    fn brand(&self) -> Brand {
        Brand::Kasa
    }

    async fn turn_on(&self) -> Result<(), AppError> {
        self.send(self.power_command(true)).await.map(drop)
    }

    async fn turn_off(&self) -> Result<(), AppError> {
        self.send(self.power_command(false)).await.map(drop)
    }

    async fn set_brightness(&self, level: u8) -> Result<(), AppError> {
        check_brightness(level)?;
        let command = if self.is_light() {
            Command::light(LightUpdate {
                brightness: Some(level),
                ..Default::default()
            })
        } else {
            Command::dimmer(level)
        };
        self.send(command).await.map(drop)
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
        self.require_light("colour control")?;
        self.send(Command::light(LightUpdate {
            brightness,
            hue: Some(hue),
            saturation: Some(saturation),
            ..Default::default()
        }))
        .await
        .map(drop)
    }

    async fn set_color_temperature(&self, kelvin: u16) -> Result<(), AppError> {
        self.check_color_temp(kelvin)?;
        self.require_light("colour temperature")?;
        self.send(Command::light(LightUpdate {
            color_temp: Some(kelvin),
            ..Default::default()
        }))
        .await
        .map(drop)
    }

    async fn control(&self, request: &ControlRequest) -> Result<(), AppError> {
        request.validate()?;
        if let Some(kelvin) = request.color_temp {
            self.check_color_temp(kelvin)?;
        }
        // Rejected before a toggle poll; extras on `off` are ignored anyway.
        if request.action != PowerAction::Off
            && (request.has_color() || request.color_temp.is_some())
        {
            self.require_light("colour control")?;
        }
        let on = self.resolve_power(request.action).await?;
        let command = self.control_command(request, on)?;
        self.send(command).await.map(drop)
    }

    async fn get_state(&self) -> Result<DeviceState, AppError> {
        Ok(self.sysinfo().await?.state()?)
    }

    async fn describe(&self) -> Result<DeviceDescription, AppError> {
        let info = self.sysinfo().await?;
        Ok(DeviceDescription {
            alias: info.alias.clone(),
            model: info.model.clone(),
            hardware_id: info.hardware_id(),
            device_type: info.device_type(),
            capabilities: info.capabilities(),
            state: info.state()?,
        })
    }
}

struct KasaBuilder;

impl AdapterBuilder for KasaBuilder {
    fn brand(&self) -> Brand {
        Brand::Kasa
    }

    fn build(&self, device: &Device, settings: &AdapterSettings) -> Arc<dyn DeviceAdapter> {
        Arc::new(KasaAdapter::for_device(device, &settings.kasa))
    }
}

inventory::submit! {
    &KasaBuilder as &'static dyn AdapterBuilder
}
