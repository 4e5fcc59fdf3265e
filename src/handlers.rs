// handlers.rs
use crate::{
    control::{ApiResponse, ControlService},
    error::AppError,
    models::{
        BrightnessRequest, ColorTempRequest, ControlRequest, Device, DeviceFilter, DeviceUpdate,
        NewDevice, PowerRequest, RegistryStats, RgbColorRequest,
    },
};
use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use utoipa::IntoParams;

pub struct AppState {
    pub control: ControlService,
}

impl AppState {
    pub fn new(control: ControlService) -> Self {
        Self { control }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Matched against name, alias, id, room, model, type and brand.
    pub q: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RegisterParams {
    /// Query the device for capabilities before storing it.
    #[serde(default)]
    pub probe: bool,
}

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

fn reply<T: Serialize>(response: ApiResponse<T>) -> Reply<T> {
    (response.status(), Json(response))
}

// Malformed input still gets the envelope, never the framework's plain-text body.
fn rejected<T: Serialize>(reason: impl Display) -> Reply<T> {
    reply(ApiResponse::failure(&AppError::Validation(reason.to_string())))
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/devices", get(list_devices).post(register_device))
        .route("/api/devices/search", get(search_devices))
        .route("/api/devices/stats", get(device_stats))
        .route("/api/devices/refresh", post(refresh_devices))
        .route(
            "/api/devices/{id}",
            get(get_device).patch(update_device).delete(remove_device),
        )
        .route("/api/devices/{id}/control", post(control_device))
        .route("/api/devices/{id}/power", post(set_power))
        .route("/api/devices/{id}/toggle", post(toggle_device))
        .route("/api/devices/{id}/brightness", post(set_brightness))
        .route("/api/devices/{id}/color", post(set_color))
        .route("/api/devices/{id}/color-temp", post(set_color_temperature))
        .route("/api/devices/{id}/test", post(test_connection))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/devices",
    params(DeviceFilter),
    responses((status = 200, description = "Devices matching every given filter", body = ApiResponse<Vec<Device>>))
)]
pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    filter: Result<Query<DeviceFilter>, QueryRejection>,
) -> Reply<Vec<Device>> {
    match filter {
        Ok(Query(filter)) => reply(state.control.list_devices(&filter)),
        Err(e) => rejected(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/devices",
    params(RegisterParams),
    request_body = NewDevice,
    responses(
        (status = 200, description = "Device registered", body = ApiResponse<Device>),
        (status = 409, description = "Id already taken", body = ApiResponse<Device>)
    )
)]
pub async fn register_device(
    State(state): State<Arc<AppState>>,
    params: Result<Query<RegisterParams>, QueryRejection>,
    body: Result<Json<NewDevice>, JsonRejection>,
) -> Reply<Device> {
    let Ok(Query(params)) = params else {
        return rejected("invalid query string");
    };
    match body {
        Ok(Json(device)) => reply(state.control.register_device(device, params.probe).await),
        Err(e) => rejected(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/devices/search",
    params(SearchParams),
    responses((status = 200, body = ApiResponse<Vec<Device>>))
)]
pub async fn search_devices(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Reply<Vec<Device>> {
    match params {
        Ok(Query(params)) => reply(state.control.search(&params.q)),
        Err(e) => rejected(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/devices/stats",
    responses((status = 200, body = ApiResponse<RegistryStats>))
)]
pub async fn device_stats(State(state): State<Arc<AppState>>) -> Reply<RegistryStats> {
    reply(state.control.stats())
}

#[utoipa::path(
    post,
    path = "/api/devices/refresh",
    responses((status = 200, description = "Stats after polling every device", body = ApiResponse<RegistryStats>))
)]
pub async fn refresh_devices(State(state): State<Arc<AppState>>) -> Reply<RegistryStats> {
    reply(state.control.refresh_all().await)
}

#[utoipa::path(
    get,
    path = "/api/devices/{id}",
    params(("id" = String, Path, description = "Device id")),
    responses(
        (status = 200, description = "Live state, or last known state with online=false", body = ApiResponse<Device>),
        (status = 404, body = ApiResponse<Device>)
    )
)]
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Reply<Device> {
    reply(state.control.get_device(&id).await)
}

#[utoipa::path(
    patch,
    path = "/api/devices/{id}",
    params(("id" = String, Path, description = "Device id")),
    request_body = DeviceUpdate,
    responses((status = 200, body = ApiResponse<Device>), (status = 404, body = ApiResponse<Device>))
)]
pub async fn update_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<DeviceUpdate>, JsonRejection>,
) -> Reply<Device> {
    match body {
        Ok(Json(update)) => reply(state.control.update_device(&id, update)),
        Err(e) => rejected(e),
    }
}

#[utoipa::path(
    delete,
    path = "/api/devices/{id}",
    params(("id" = String, Path, description = "Device id")),
    responses((status = 200, body = ApiResponse<Device>), (status = 404, body = ApiResponse<Device>))
)]
pub async fn remove_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Reply<Device> {
    reply(state.control.remove_device(&id))
}

#[utoipa::path(
    post,
    path = "/api/devices/{id}/control",
    params(("id" = String, Path, description = "Device id")),
    request_body = ControlRequest,
    responses(
        (status = 200, description = "Command applied, state re-polled", body = ApiResponse<Device>),
        (status = 400, body = ApiResponse<Device>),
        (status = 404, body = ApiResponse<Device>),
        (status = 502, description = "Device did not answer; marked offline", body = ApiResponse<Device>)
    )
)]
pub async fn control_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<ControlRequest>, JsonRejection>,
) -> Reply<Device> {
    match body {
        Ok(Json(request)) => reply(state.control.control(&id, request).await),
        Err(e) => rejected(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/devices/{id}/power",
    params(("id" = String, Path, description = "Device id")),
    request_body = PowerRequest,
    responses((status = 200, body = ApiResponse<Device>))
)]
pub async fn set_power(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<PowerRequest>, JsonRejection>,
) -> Reply<Device> {
    match body {
        Ok(Json(request)) => reply(state.control.set_power(&id, request.state).await),
        Err(e) => rejected(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/devices/{id}/toggle",
    params(("id" = String, Path, description = "Device id")),
    responses((status = 200, body = ApiResponse<Device>))
)]
pub async fn toggle_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Reply<Device> {
    reply(state.control.toggle(&id).await)
}

#[utoipa::path(
    post,
    path = "/api/devices/{id}/brightness",
    params(("id" = String, Path, description = "Device id")),
    request_body = BrightnessRequest,
    responses((status = 200, body = ApiResponse<Device>), (status = 400, body = ApiResponse<Device>))
)]
pub async fn set_brightness(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<BrightnessRequest>, JsonRejection>,
) -> Reply<Device> {
    match body {
        Ok(Json(request)) => reply(state.control.set_brightness(&id, request.level).await),
        Err(e) => rejected(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/devices/{id}/color",
    params(("id" = String, Path, description = "Device id")),
    request_body = RgbColorRequest,
    responses((status = 200, body = ApiResponse<Device>), (status = 400, body = ApiResponse<Device>))
)]
pub async fn set_color(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<RgbColorRequest>, JsonRejection>,
) -> Reply<Device> {
    match body {
        Ok(Json(request)) => reply(state.control.set_rgb_color(&id, request).await),
        Err(e) => rejected(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/devices/{id}/color-temp",
    params(("id" = String, Path, description = "Device id")),
    request_body = ColorTempRequest,
    responses((status = 200, body = ApiResponse<Device>), (status = 400, body = ApiResponse<Device>))
)]
pub async fn set_color_temperature(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<ColorTempRequest>, JsonRejection>,
) -> Reply<Device> {
    match body {
        Ok(Json(request)) => reply(state.control.set_color_temperature(&id, request.kelvin).await),
        Err(e) => rejected(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/devices/{id}/test",
    params(("id" = String, Path, description = "Device id")),
    responses((status = 200, description = "Whether the device answered", body = ApiResponse<bool>))
)]
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Reply<bool> {
    reply(state.control.test_connection(&id).await)
}
