//! End-to-end behaviour of the control surface with a simulated adapter.

use async_trait::async_trait;
use home_control::{
    AppError, ControlService, DeviceRegistry,
    devices::{AdapterFactory, DeviceAdapter},
    error::ProtocolError,
    models::{
        Brand, Capability, ControlRequest, DeviceDescription, DeviceFilter, DeviceState,
        DeviceType, DeviceUpdate, NewDevice, PowerAction, PowerState, RgbColorRequest,
    },
    registry::MemoryStore,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct SimDevice {
    state: Mutex<DeviceState>,
    calls: Mutex<Vec<String>>,
    unreachable: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SimDevice {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn exchange(&self, call: String, apply: impl FnOnce(&mut DeviceState)) -> Result<(), AppError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.calls.lock().unwrap().push(call);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ProtocolError::Timeout(Duration::from_secs(5)).into());
        }
        apply(&mut self.state.lock().unwrap());
        Ok(())
    }
}

struct SimAdapter(Arc<SimDevice>);

#[async_trait]
impl DeviceAdapter for SimAdapter {
    fn brand(&self) -> Brand {
        Brand::Kasa
    }

    async fn turn_on(&self) -> Result<(), AppError> {
        self.0.exchange("on".into(), |s| s.power = PowerState::On).await
    }

    async fn turn_off(&self) -> Result<(), AppError> {
        self.0.exchange("off".into(), |s| s.power = PowerState::Off).await
    }

    async fn set_brightness(&self, level: u8) -> Result<(), AppError> {
        self.0
            .exchange(format!("brightness {}", level), |s| s.brightness = Some(level))
            .await
    }

    async fn set_color(&self, hue: u16, saturation: u8, _: Option<u8>) -> Result<(), AppError> {
        self.0
            .exchange(format!("color {} {}", hue, saturation), |s| {
                s.color = Some(home_control::models::Color::Hsv { hue, saturation })
            })
            .await
    }

    async fn set_color_temperature(&self, kelvin: u16) -> Result<(), AppError> {
        self.0
            .exchange(format!("ct {}", kelvin), |s| s.color_temp = Some(kelvin))
            .await
    }

    async fn get_state(&self) -> Result<DeviceState, AppError> {
        self.0.exchange("poll".into(), |_| {}).await?;
        Ok(self.0.state.lock().unwrap().clone())
    }

    async fn describe(&self) -> Result<DeviceDescription, AppError> {
        self.0.exchange("describe".into(), |_| {}).await?;
        Ok(DeviceDescription {
            alias: Some("Sim Bulb".into()),
            model: Some("SIM-1".into()),
            hardware_id: Some("00:11:22:33:44:55".into()),
            device_type: DeviceType::Light,
            capabilities: BTreeSet::from([
                Capability::Power,
                Capability::Brightness,
                Capability::ColorTemp,
            ]),
            state: self.0.state.lock().unwrap().clone(),
        })
    }
}

#[derive(Default)]
struct SimFactory {
    devices: Mutex<HashMap<String, Arc<SimDevice>>>,
    created: AtomicUsize,
}

impl SimFactory {
    fn device(&self, id: &str) -> Arc<SimDevice> {
        self.devices
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .clone()
    }
}

impl AdapterFactory for SimFactory {
    fn create(
        &self,
        device: &home_control::models::Device,
    ) -> Result<Arc<dyn DeviceAdapter>, AppError> {
        if device.brand != Brand::Kasa {
            return Err(AppError::UnsupportedBrand(device.brand));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SimAdapter(self.device(&device.id))))
    }
}

struct Harness {
    service: ControlService,
    factory: Arc<SimFactory>,
    store: Arc<MemoryStore>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let factory = Arc::new(SimFactory::default());
    let registry = Arc::new(DeviceRegistry::new(store.clone()));
    Harness {
        service: ControlService::new(registry, factory.clone()),
        factory,
        store,
    }
}

fn new_device(id: &str, capabilities: &[Capability]) -> NewDevice {
    NewDevice {
        id: id.into(),
        name: format!("Device {}", id),
        alias: None,
        hardware_id: None,
        device_type: DeviceType::Light,
        brand: Brand::Kasa,
        address: "192.168.1.50".into(),
        capabilities: capabilities.iter().copied().collect(),
        room: Some("Living Room".into()),
        model: None,
    }
}

async fn register(h: &Harness, id: &str, capabilities: &[Capability]) {
    let response = h
        .service
        .register_device(new_device(id, capabilities), false)
        .await;
    assert!(response.success, "{:?}", response.error);
}

#[tokio::test]
async fn control_on_with_brightness_updates_registry() {
    let h = harness();
    register(
        &h,
        "A",
        &[Capability::Power, Capability::Brightness, Capability::Color],
    )
    .await;

    let request = ControlRequest {
        brightness: Some(50),
        ..ControlRequest::power(PowerAction::On)
    };
    let response = h.service.control("A", request).await;

    assert!(response.success, "{:?}", response.error);
    let device = h.service.registry().get("A").unwrap();
    assert_eq!(
        device.state,
        DeviceState {
            power: PowerState::On,
            brightness: Some(50),
            ..Default::default()
        }
    );
    assert!(device.online);
    assert_eq!(response.data.unwrap(), device);
}

#[tokio::test]
async fn unknown_device_is_not_found_without_mutation() {
    let h = harness();
    register(&h, "A", &[Capability::Power]).await;
    let saves = h.store.save_count();
    let before = h.service.registry().get_all();

    let response = h
        .service
        .control("ghost", ControlRequest::power(PowerAction::On))
        .await;

    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("Device not found"));
    assert_eq!(h.service.registry().get_all(), before);
    assert_eq!(h.store.save_count(), saves);
    assert_eq!(h.factory.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn protocol_timeout_marks_device_offline() {
    let h = harness();
    register(&h, "A", &[Capability::Power, Capability::Brightness]).await;
    h.service
        .control("A", ControlRequest::power(PowerAction::On))
        .await;
    let before = h.service.registry().get("A").unwrap();
    assert!(before.online);

    h.factory.device("A").unreachable.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(5)).await;
    let response = h
        .service
        .control("A", ControlRequest::power(PowerAction::Off))
        .await;

    assert!(!response.success);
    assert!(response.error.unwrap().contains("no response"));
    let after = h.service.registry().get("A").unwrap();
    assert!(!after.online);
    assert!(after.last_seen > before.last_seen);
    assert_eq!(after.state, before.state);
}

#[tokio::test]
async fn brightness_requires_capability() {
    let h = harness();
    register(&h, "dimmable", &[Capability::Power, Capability::Brightness]).await;
    register(&h, "plain", &[Capability::Power]).await;

    for level in [0, 37, 100] {
        assert!(h.service.set_brightness("dimmable", level).await.success);
        let response = h.service.set_brightness("plain", level).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("does not support brightness"));
    }
    assert!(h.factory.device("plain").calls().is_empty());
}

#[tokio::test]
async fn out_of_range_brightness_never_reaches_adapter() {
    let h = harness();
    register(&h, "A", &[Capability::Power, Capability::Brightness]).await;

    let response = h.service.set_brightness("A", 101).await;

    assert!(!response.success);
    assert!(response.error.unwrap().starts_with("Validation error"));
    assert_eq!(h.factory.created.load(Ordering::SeqCst), 0);
    assert!(h.factory.device("A").calls().is_empty());
}

#[tokio::test]
async fn off_request_ignores_extras() {
    let h = harness();
    register(&h, "A", &[Capability::Power, Capability::Brightness]).await;

    let request = ControlRequest {
        brightness: Some(80),
        ..ControlRequest::power(PowerAction::Off)
    };
    assert!(h.service.control("A", request).await.success);

    assert_eq!(h.factory.device("A").calls(), vec!["off", "poll"]);
}

#[tokio::test]
async fn toggle_flips_and_fails_without_poll() {
    let h = harness();
    register(&h, "A", &[Capability::Power]).await;
    let sim = h.factory.device("A");
    sim.state.lock().unwrap().power = PowerState::On;

    let response = h.service.toggle("A").await;
    assert!(response.success);
    assert_eq!(response.data.unwrap().state.power, PowerState::Off);
    assert_eq!(sim.calls(), vec!["poll", "off", "poll"]);

    sim.unreachable.store(true, Ordering::SeqCst);
    let response = h.service.toggle("A").await;
    assert!(!response.success);
    assert_eq!(sim.calls().last().map(String::as_str), Some("poll"));
    assert!(!h.service.registry().get("A").unwrap().online);
}

#[tokio::test]
async fn rgb_color_requires_color_capability() {
    let h = harness();
    register(&h, "A", &[Capability::Power, Capability::Color]).await;
    register(&h, "B", &[Capability::Power]).await;
    let red = RgbColorRequest {
        r: 255,
        g: 0,
        b: 0,
        brightness: None,
    };

    assert!(h.service.set_rgb_color("A", red).await.success);
    assert_eq!(h.factory.device("A").calls(), vec!["color 0 100", "poll"]);
    assert!(!h.service.set_rgb_color("B", red).await.success);
}

#[tokio::test]
async fn get_device_degrades_to_last_known_state() {
    let h = harness();
    register(&h, "A", &[Capability::Power, Capability::Brightness]).await;
    h.service.set_brightness("A", 20).await;

    h.factory.device("A").unreachable.store(true, Ordering::SeqCst);
    let response = h.service.get_device("A").await;

    assert!(response.success);
    let device = response.data.unwrap();
    assert!(!device.online);
    assert_eq!(device.state.brightness, Some(20));
}

#[tokio::test]
async fn unsupported_brand_fails_without_io() {
    let h = harness();
    let mut hue = new_device("hue", &[Capability::Power]);
    hue.brand = Brand::Hue;
    assert!(h.service.register_device(hue, false).await.success);

    let response = h
        .service
        .control("hue", ControlRequest::power(PowerAction::On))
        .await;
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("Unsupported brand: hue"));
    assert!(h.factory.device("hue").calls().is_empty());

    // Reads still succeed with whatever is stored.
    assert!(h.service.get_device("hue").await.success);
}

#[tokio::test]
async fn concurrent_commands_on_one_device_are_serialized() {
    let h = harness();
    register(&h, "A", &[Capability::Power, Capability::Brightness]).await;

    let (first, second) = tokio::join!(
        h.service.set_brightness("A", 10),
        h.service.set_brightness("A", 90)
    );

    assert!(first.success && second.success);
    assert_eq!(h.factory.device("A").max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn probe_registration_records_capabilities() {
    let h = harness();
    let response = h.service.register_device(new_device("bulb", &[]), true).await;

    assert!(response.success, "{:?}", response.error);
    let device = response.data.unwrap();
    assert!(device.online);
    assert!(device.supports(Capability::ColorTemp));
    assert!(!device.supports(Capability::Color));
    assert_eq!(device.model.as_deref(), Some("SIM-1"));
    assert_eq!(device.hardware_id.as_deref(), Some("00:11:22:33:44:55"));
}

#[tokio::test]
async fn failed_probe_registers_nothing() {
    let h = harness();
    h.factory.device("bulb").unreachable.store(true, Ordering::SeqCst);

    let response = h.service.register_device(new_device("bulb", &[]), true).await;

    assert!(!response.success);
    assert!(h.service.registry().get("bulb").is_none());
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let h = harness();
    register(&h, "A", &[Capability::Power]).await;
    let response = h
        .service
        .register_device(new_device("A", &[Capability::Power]), false)
        .await;

    assert!(!response.success);
    assert_eq!(response.status(), axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn refresh_all_reconciles_online_flags() {
    let h = harness();
    register(&h, "up", &[Capability::Power]).await;
    register(&h, "down", &[Capability::Power]).await;
    h.factory.device("down").unreachable.store(true, Ordering::SeqCst);

    let stats = h.service.refresh_all().await.data.unwrap();

    assert_eq!(stats.total, 2);
    assert_eq!(stats.online, 1);
    assert_eq!(stats.offline, 1);
    let online = h.service.list_devices(&DeviceFilter {
        online: Some(true),
        ..Default::default()
    });
    assert_eq!(online.data.unwrap()[0].id, "up");
}

#[tokio::test]
async fn test_connection_sets_online_flag() {
    let h = harness();
    register(&h, "A", &[Capability::Power]).await;

    assert_eq!(h.service.test_connection("A").await.data, Some(true));
    assert!(h.service.registry().get("A").unwrap().online);

    h.factory.device("A").unreachable.store(true, Ordering::SeqCst);
    assert_eq!(h.service.test_connection("A").await.data, Some(false));
    assert!(!h.service.registry().get("A").unwrap().online);
}

#[tokio::test]
async fn search_and_stats_through_the_surface() {
    let h = harness();
    register(&h, "lamp", &[Capability::Power]).await;
    let mut kettle = new_device("kettle", &[Capability::Power]);
    kettle.device_type = DeviceType::Plug;
    kettle.room = Some("Kitchen".into());
    h.service.register_device(kettle, false).await;

    let found = h.service.search("kitchen").data.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "kettle");

    let stats = h.service.stats().data.unwrap();
    assert_eq!(stats.by_type.get("plug"), Some(&1));
    assert_eq!(stats.by_room.get("Living Room"), Some(&1));
}

#[tokio::test]
async fn reregistered_device_keeps_its_lock() {
    let h = harness();
    register(&h, "A", &[Capability::Power]).await;

    let (_, second) = tokio::join!(h.service.set_power("A", PowerState::On), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(h.service.remove_device("A").success);
        register(&h, "A", &[Capability::Power]).await;
        h.service.set_power("A", PowerState::Off).await
    });

    assert!(second.success, "{:?}", second.error);
    assert_eq!(h.factory.device("A").max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn capabilities_are_rechecked_after_waiting_for_the_lock() {
    let h = harness();
    register(&h, "A", &[Capability::Power, Capability::Brightness]).await;

    let (first, second, _) = tokio::join!(
        h.service.set_brightness("A", 10),
        async {
            tokio::time::sleep(Duration::from_millis(2)).await;
            h.service.set_brightness("A", 90).await
        },
        async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let update = DeviceUpdate {
                capabilities: Some(BTreeSet::from([Capability::Power])),
                ..Default::default()
            };
            assert!(h.service.update_device("A", update).success);
        }
    );

    assert!(first.success);
    assert!(!second.success);
    assert!(second.error.unwrap().contains("does not support brightness"));
    assert_eq!(
        h.factory.device("A").calls(),
        vec!["brightness 10", "poll"]
    );
}

#[tokio::test]
async fn update_rejects_empty_name_and_address() {
    let h = harness();
    register(&h, "A", &[Capability::Power]).await;
    let saves = h.store.save_count();

    for update in [
        DeviceUpdate {
            name: Some(String::new()),
            ..Default::default()
        },
        DeviceUpdate {
            address: Some(String::new()),
            ..Default::default()
        },
    ] {
        let response = h.service.update_device("A", update);
        assert!(!response.success);
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    let device = h.service.registry().get("A").unwrap();
    assert_eq!(device.name, "Device A");
    assert_eq!(device.address, "192.168.1.50");
    assert_eq!(h.store.save_count(), saves);

    let renamed = h.service.update_device(
        "A",
        DeviceUpdate {
            name: Some("Desk Lamp".into()),
            ..Default::default()
        },
    );
    assert_eq!(renamed.data.unwrap().name, "Desk Lamp");
}
