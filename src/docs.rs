use crate::{handlers, models};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(title = "home-control", description = "Local control of WiFi plugs and bulbs"),
    paths(
        handlers::list_devices,
        handlers::register_device,
        handlers::search_devices,
        handlers::device_stats,
        handlers::refresh_devices,
        handlers::get_device,
        handlers::update_device,
        handlers::remove_device,
        handlers::control_device,
        handlers::set_power,
        handlers::toggle_device,
        handlers::set_brightness,
        handlers::set_color,
        handlers::set_color_temperature,
        handlers::test_connection,
    ),
    components(
        schemas(
            models::Device,
            models::DeviceState,
            models::DeviceType,
            models::Brand,
            models::Capability,
            models::PowerState,
            models::PowerAction,
            models::Color,
            models::Rgb,
            models::NewDevice,
            models::DeviceUpdate,
            models::ControlRequest,
            models::PowerRequest,
            models::BrightnessRequest,
            models::RgbColorRequest,
            models::ColorTempRequest,
            models::RegistryStats,
        )
    )
)]
pub struct ApiDoc;
