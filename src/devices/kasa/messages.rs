// devices/kasa/messages.rs
use crate::error::ProtocolError;
use crate::models::{Capability, Color, DeviceState, DeviceType, PowerState};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;

pub const SYSTEM: &str = "system";
pub const LIGHTING: &str = "smartlife.iot.smartbulb.lightingservice";
pub const DIMMER: &str = "smartlife.iot.dimmer";

/// Outbound request. Calls to the same namespace and method are merged
/// into one object, so several attributes travel in a single exchange.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Command {
    body: Map<String, Value>,
}

impl Command {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sysinfo() -> Self {
        Self::new().with(SYSTEM, "get_sysinfo", json!({}))
    }

    pub fn relay(on: bool) -> Self {
        Self::new().with(SYSTEM, "set_relay_state", json!({ "state": u8::from(on) }))
    }

    pub fn dimmer(brightness: u8) -> Self {
        Self::new().with(DIMMER, "set_brightness", json!({ "brightness": brightness }))
    }

    pub fn light(update: LightUpdate) -> Self {
        Self::new().with(LIGHTING, "transition_light_state", update.into_params())
    }

    pub fn with(mut self, namespace: &str, method: &str, params: Value) -> Self {
        let namespace = self
            .body
            .entry(namespace)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(methods) = namespace {
            let target = methods
                .entry(method)
                .or_insert_with(|| Value::Object(Map::new()));
            match (target, params) {
                (Value::Object(existing), Value::Object(extra)) => existing.extend(extra),
                (target, params) => *target = params,
            }
        }
        self
    }

    pub fn merge(self, other: Command) -> Self {
        other.body.into_iter().fold(self, |command, (namespace, methods)| {
            match methods {
                Value::Object(methods) => methods
                    .into_iter()
                    .fold(command, |command, (method, params)| {
                        command.with(&namespace, &method, params)
                    }),
                _ => command,
            }
        })
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }
}

/// Parameters of `transition_light_state`. Unset fields are not sent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LightUpdate {
    pub on: Option<bool>,
    pub brightness: Option<u8>,
    pub hue: Option<u16>,
    pub saturation: Option<u8>,
    pub color_temp: Option<u16>,
}

impl LightUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn into_params(self) -> Value {
        let mut params = Map::new();
        if let Some(on) = self.on {
            params.insert("on_off".into(), json!(u8::from(on)));
        }
        if let Some(brightness) = self.brightness {
            params.insert("brightness".into(), json!(brightness));
        }
        if let Some(hue) = self.hue {
            params.insert("hue".into(), json!(hue));
        }
        if let Some(saturation) = self.saturation {
            params.insert("saturation".into(), json!(saturation));
        }
        // A colour temperature of 0 switches the bulb into hue/saturation mode.
        let color_temp = match (self.color_temp, self.hue.or(self.saturation.map(u16::from))) {
            (Some(kelvin), _) => Some(kelvin),
            (None, Some(_)) => Some(0),
            (None, None) => None,
        };
        if let Some(kelvin) = color_temp {
            params.insert("color_temp".into(), json!(kelvin));
        }
        params.insert("ignore_default".into(), json!(1));
        Value::Object(params)
    }
}

/// Fails on any non-zero `err_code`, at namespace or method level.
pub fn check_response(response: &Value) -> Result<(), ProtocolError> {
    let namespaces = response
        .as_object()
        .ok_or_else(|| ProtocolError::Parse("response is not a JSON object".into()))?;
    for namespace in namespaces.values() {
        check_err_code(namespace)?;
        if let Some(methods) = namespace.as_object() {
            for method in methods.values() {
                check_err_code(method)?;
            }
        }
    }
    Ok(())
}

fn check_err_code(value: &Value) -> Result<(), ProtocolError> {
    match value.get("err_code").and_then(Value::as_i64) {
        Some(0) | None => Ok(()),
        Some(code) => Err(ProtocolError::Vendor {
            code,
            message: value
                .get("err_msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        }),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LightState {
    #[serde(default)]
    pub on_off: u8,
    pub brightness: Option<u8>,
    pub hue: Option<u16>,
    pub saturation: Option<u8>,
    pub color_temp: Option<u16>,
    pub dft_on_state: Option<Box<LightState>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SysInfo {
    pub alias: Option<String>,
    pub model: Option<String>,
    pub mac: Option<String>,
    pub mic_mac: Option<String>,
    #[serde(rename = "deviceId")]
    pub device_id: Option<String>,
    pub relay_state: Option<u8>,
    pub brightness: Option<u8>,
    pub light_state: Option<LightState>,
    #[serde(default)]
    pub is_dimmable: u8,
    #[serde(default)]
    pub is_color: u8,
    #[serde(default)]
    pub is_variable_color_temp: u8,
}

impl SysInfo {
    pub fn from_response(response: &Value) -> Result<Self, ProtocolError> {
        check_response(response)?;
        let info = response
            .pointer("/system/get_sysinfo")
            .ok_or_else(|| ProtocolError::Parse("missing system.get_sysinfo".into()))?;
        Ok(serde_json::from_value(info.clone())?)
    }

    pub fn is_bulb(&self) -> bool {
        self.light_state.is_some()
    }

    pub fn device_type(&self) -> DeviceType {
        if self.is_bulb() {
            DeviceType::Light
        } else if self.brightness.is_some() {
            DeviceType::Switch
        } else {
            DeviceType::Plug
        }
    }

    pub fn hardware_id(&self) -> Option<String> {
        self.mac
            .clone()
            .or_else(|| self.mic_mac.clone())
            .or_else(|| self.device_id.clone())
    }

    pub fn capabilities(&self) -> BTreeSet<Capability> {
        let mut capabilities = BTreeSet::from([Capability::Power]);
        if self.is_bulb() {
            if self.is_dimmable != 0 {
                capabilities.insert(Capability::Brightness);
            }
            if self.is_color != 0 {
                capabilities.insert(Capability::Color);
            }
            if self.is_variable_color_temp != 0 {
                capabilities.insert(Capability::ColorTemp);
            }
        } else if self.brightness.is_some() {
            capabilities.insert(Capability::Brightness);
        }
        capabilities
    }

    pub fn state(&self) -> Result<DeviceState, ProtocolError> {
        if let Some(light) = &self.light_state {
            let on = light.on_off != 0;
            // While off the bulb reports its last values under dft_on_state.
            let values = match (&light.dft_on_state, on) {
                (Some(defaults), false) => defaults.as_ref(),
                _ => light,
            };
            // A non-zero colour temperature means white mode; hue/saturation are stale then.
            let white = values.color_temp.is_some_and(|k| k > 0);
            let color = match (self.is_color != 0 && !white, values.hue, values.saturation) {
                (true, Some(hue), Some(saturation)) => Some(Color::Hsv { hue, saturation }),
                _ => None,
            };
            return Ok(DeviceState {
                power: PowerState::from(on),
                brightness: values.brightness.filter(|_| self.is_dimmable != 0),
                color,
                color_temp: values
                    .color_temp
                    .filter(|_| white && self.is_variable_color_temp != 0),
            });
        }
        if let Some(relay) = self.relay_state {
            return Ok(DeviceState {
                power: PowerState::from(relay != 0),
                brightness: self.brightness,
                ..Default::default()
            });
        }
        Err(ProtocolError::Parse(
            "sysinfo has neither relay_state nor light_state".into(),
        ))
    }
}
