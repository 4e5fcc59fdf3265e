// models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Light,
    Plug,
    Switch,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceType::Light => "light",
            DeviceType::Plug => "plug",
            DeviceType::Switch => "switch",
        })
    }
}

/// Device vendor. Unknown names read from a snapshot fall back to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    Kasa,
    Tuya,
    Hue,
    #[serde(other)]
    Other,
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Brand::Kasa => "kasa",
            Brand::Tuya => "tuya",
            Brand::Hue => "hue",
            Brand::Other => "other",
        })
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Power,
    Brightness,
    Color,
    ColorTemp,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Power => "power",
            Capability::Brightness => "brightness",
            Capability::Color => "color",
            Capability::ColorTemp => "color_temp",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    #[default]
    Off,
}

impl PowerState {
    pub fn is_on(self) -> bool {
        self == PowerState::On
    }
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on { PowerState::On } else { PowerState::Off }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum Color {
    Rgb { r: u8, g: u8, b: u8 },
    Hsv { hue: u16, saturation: u8 },
}

/// Last observed state. Fields the device cannot report are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeviceState {
    pub power: PowerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_temp: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_id: Option<String>,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub brand: Brand,
    pub address: String,
    #[schema(value_type = Vec<Capability>)]
    pub capabilities: BTreeSet<Capability>,
    #[serde(default)]
    pub state: DeviceState,
    #[serde(default)]
    pub online: bool,
    pub last_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Device {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Registration payload; ids are always chosen by the caller.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct NewDevice {
    #[validate(length(min = 1, max = 128))]
    pub id: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub hardware_id: Option<String>,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub brand: Brand,
    #[validate(length(min = 1))]
    pub address: String,
    #[serde(default)]
    #[schema(value_type = Vec<Capability>)]
    pub capabilities: BTreeSet<Capability>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl NewDevice {
    pub fn into_device(self, now: DateTime<Utc>) -> Device {
        Device {
            id: self.id,
            name: self.name,
            alias: self.alias,
            hardware_id: self.hardware_id,
            device_type: self.device_type,
            brand: self.brand,
            address: self.address,
            capabilities: self.capabilities,
            state: DeviceState::default(),
            online: false,
            last_seen: now,
            room: self.room,
            model: self.model,
        }
    }
}

/// Partial metadata update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct DeviceUpdate {
    #[validate(length(min = 1))]
    pub name: Option<String>,
    pub alias: Option<String>,
    pub hardware_id: Option<String>,
    #[serde(rename = "type")]
    pub device_type: Option<DeviceType>,
    #[validate(length(min = 1))]
    pub address: Option<String>,
    #[schema(value_type = Option<Vec<Capability>>)]
    pub capabilities: Option<BTreeSet<Capability>>,
    pub room: Option<String>,
    pub model: Option<String>,
}

impl DeviceUpdate {
    pub fn apply(self, device: &mut Device) {
        if let Some(name) = self.name {
            device.name = name;
        }
        if let Some(alias) = self.alias {
            device.alias = Some(alias);
        }
        if let Some(hardware_id) = self.hardware_id {
            device.hardware_id = Some(hardware_id);
        }
        if let Some(device_type) = self.device_type {
            device.device_type = device_type;
        }
        if let Some(address) = self.address {
            device.address = address;
        }
        if let Some(capabilities) = self.capabilities {
            device.capabilities = capabilities;
        }
        if let Some(room) = self.room {
            device.room = Some(room);
        }
        if let Some(model) = self.model {
            device.model = Some(model);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    On,
    Off,
    Toggle,
}

/// Unified control request.
///
/// Ranges are checked up front; an `off` action ignores every other field.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate, ToSchema)]
#[validate(schema(function = "validate_color_fields"))]
pub struct ControlRequest {
    pub action: PowerAction,
    #[serde(default)]
    #[validate(range(max = 100))]
    pub brightness: Option<u8>,
    #[serde(default)]
    pub color: Option<Rgb>,
    #[serde(default)]
    #[validate(range(min = 1000, max = 12000))]
    pub color_temp: Option<u16>,
    #[serde(default)]
    #[validate(range(max = 360))]
    pub hue: Option<u16>,
    #[serde(default)]
    #[validate(range(max = 100))]
    pub saturation: Option<u8>,
}

fn validate_color_fields(request: &ControlRequest) -> Result<(), ValidationError> {
    if request.color.is_some() && (request.hue.is_some() || request.saturation.is_some()) {
        return Err(ValidationError::new("color_conflict")
            .with_message("use either color or hue/saturation, not both".into()));
    }
    if request.hue.is_some() != request.saturation.is_some() {
        return Err(ValidationError::new("hue_saturation_pair")
            .with_message("hue and saturation must be given together".into()));
    }
    Ok(())
}

impl ControlRequest {
    pub fn power(action: PowerAction) -> Self {
        Self {
            action,
            brightness: None,
            color: None,
            color_temp: None,
            hue: None,
            saturation: None,
        }
    }

    pub fn has_color(&self) -> bool {
        self.color.is_some() || self.hue.is_some() || self.saturation.is_some()
    }

    /// Capabilities this request would exercise if the device ends up powered on.
    pub fn required_capabilities(&self) -> BTreeSet<Capability> {
        let mut required = BTreeSet::from([Capability::Power]);
        if self.action == PowerAction::Off {
            return required;
        }
        if self.brightness.is_some() {
            required.insert(Capability::Brightness);
        }
        if self.has_color() {
            required.insert(Capability::Color);
        }
        if self.color_temp.is_some() {
            required.insert(Capability::ColorTemp);
        }
        required
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
pub struct PowerRequest {
    pub state: PowerState,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Validate, ToSchema)]
pub struct BrightnessRequest {
    #[validate(range(max = 100))]
    pub level: u8,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Validate, ToSchema)]
pub struct RgbColorRequest {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default)]
    #[validate(range(max = 100))]
    pub brightness: Option<u8>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Validate, ToSchema)]
pub struct ColorTempRequest {
    #[validate(range(min = 1000, max = 12000))]
    pub kelvin: u16,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeviceFilter {
    pub room: Option<String>,
    #[serde(rename = "type")]
    pub device_type: Option<DeviceType>,
    pub brand: Option<Brand>,
    pub online: Option<bool>,
}

impl DeviceFilter {
    pub fn matches(&self, device: &Device) -> bool {
        if let Some(room) = &self.room {
            let same_room = device
                .room
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case(room));
            if !same_room {
                return false;
            }
        }
        if self.device_type.is_some_and(|t| t != device.device_type) {
            return false;
        }
        if self.brand.is_some_and(|b| b != device.brand) {
            return false;
        }
        if self.online.is_some_and(|o| o != device.online) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RegistryStats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_brand: BTreeMap<String, usize>,
    pub by_room: BTreeMap<String, usize>,
}

/// What an adapter learns about a device from a single info query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeviceDescription {
    pub alias: Option<String>,
    pub model: Option<String>,
    pub hardware_id: Option<String>,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    #[schema(value_type = Vec<Capability>)]
    pub capabilities: BTreeSet<Capability>,
    pub state: DeviceState,
}

/// Persisted registry snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub devices: Vec<Device>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}
