// lib.rs
//! Local control of WiFi plugs and bulbs behind one uniform surface.
//!
//! [`registry::DeviceRegistry`] holds what is known about each device,
//! [`devices`] translates uniform commands into vendor protocols and
//! [`control::ControlService`] ties the two together.

pub mod config;
pub mod control;
pub mod devices;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod utils;

pub use control::{ApiResponse, ControlService};
pub use error::AppError;
pub use registry::DeviceRegistry;
