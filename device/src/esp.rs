//! ESP32 build. Wires the control loop to the real socket hardware:
//! relay and LED on GPIO, the front button on a GPIO interrupt, the
//! broker session over esp-mqtt, settings in NVS. Wi-Fi credentials
//! and the broker endpoint come from the build environment.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicI32, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use anyhow::anyhow;
use embedded_svc::{
    mqtt::client::{Details, EventPayload, QoS},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::{FreeRtos, BLOCK},
    gpio::{AnyIOPin, AnyOutputPin, InterruptType, Level, Output, PinDriver, Pull},
    i2c::{I2cConfig, I2cDriver, I2C0},
    modem::Modem,
    prelude::*,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    log::EspLogger,
    mqtt::client::{EspMqttClient, EspMqttConnection, MqttClientConfiguration},
    nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault},
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use heater_common::{
    Board, ButtonSignal, ClimateSensor, Clock, ControlLoop, DeviceConfig, InboundMessage,
    NetworkLink, NvBackend, Publication, SensorReading, Settings, Switch, Transport,
};

const NVS_NAMESPACE: &str = "heater";
const NVS_SETTINGS_KEY: &str = "settings";
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u32 = 3_000;
const WIFI_CHECK_INTERVAL_MS: u32 = 2_000;
const SENSOR_SDA_PIN: i32 = 4;
const SENSOR_SCL_PIN: i32 = 5;
const SHT30_ADDR: u8 = 0x44;

// Sensor-equipped boards are a build-time variant.
const HAS_SENSOR: bool = option_env!("HEATER_SENSOR").is_some();

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut config = DeviceConfig::default();
    if let Some(host) = option_env!("MQTT_HOST") {
        config.broker_host = host.to_string();
    }
    if let Some(port) = option_env!("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
        config.broker_port = port;
    }

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let peripherals = Peripherals::take()?;

    let wifi = connect_wifi(peripherals.modem, sys_loop, nvs_partition.clone())?;
    let link = WifiLink::new();
    if let Ok(ip_info) = wifi.wifi().sta_netif().get_ip_info() {
        *link.ip.lock().unwrap() = ip_info.ip.to_string();
    }
    spawn_wifi_supervisor(wifi, link.clone());

    let mut store = NvsStore {
        nvs: EspNvs::new(nvs_partition, NVS_NAMESPACE, true)?,
    };
    let settings = load_settings(&mut store, &config);

    let mut transport = create_transport(&config)?;

    let button = Arc::new(ButtonSignal::new(config.debounce_ms));
    let mut button_pin = attach_button(config.button_pin, button.clone())?;

    let mut relay = OutputSwitch {
        pin: PinDriver::output(unsafe { AnyOutputPin::new(config.relay_pin) })?,
        active_low: false,
    };
    // The S20's green LED sinks current: driving the pin low lights it.
    let mut indicator = OutputSwitch {
        pin: PinDriver::output(unsafe { AnyOutputPin::new(config.led_pin) })?,
        active_low: true,
    };

    let mut sensor = init_sensor(peripherals.i2c0)?;

    let clock = EspClock;
    let tick_ms = config.tick_ms;
    let mut control = ControlLoop::new(config, settings);
    info!("heater firmware up, timer at {} min", control.timer().duration_min());

    loop {
        {
            let mut board = Board {
                clock: &clock,
                button: &button,
                transport: &mut transport,
                link: &link,
                relay: &mut relay,
                indicator: &mut indicator,
                sensor: sensor.as_mut().map(|s| s as &mut dyn ClimateSensor),
                storage: &mut store,
            };
            control.tick(&mut board);
        }

        // The GPIO ISR disarms itself after each delivery.
        let _ = button_pin.enable_interrupt();
        FreeRtos::delay_ms(tick_ms);
    }
}

fn load_settings(store: &mut NvsStore, config: &DeviceConfig) -> Settings {
    let fallback = Settings {
        timer_duration_min: config.default_duration_min,
    };

    match store.load() {
        Some(raw) => match Settings::decode(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                warn!("ignoring persisted settings: {err}");
                fallback
            }
        },
        None => fallback,
    }
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
) -> anyhow::Result<BlockingWifi<EspWifi<'static>>> {
    let ssid = option_env!("WIFI_SSID").unwrap_or("CHANGE_ME");
    let pass = option_env!("WIFI_PASS").unwrap_or("");

    let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs))?;
    let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

    let auth_method = if pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: ssid.try_into().map_err(|_| anyhow!("wifi ssid too long"))?,
        password: pass.try_into().map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{ssid}`");

    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected on attempt {attempt}");
                return Ok(wifi);
            }
            Err(err) => {
                warn!("wifi connect attempt {attempt} failed: {err}");
                let _ = wifi.disconnect();
                FreeRtos::delay_ms(WIFI_RETRY_DELAY_MS);
            }
        }
    }

    // The heater stays usable offline (button and timer keep working);
    // the supervisor thread continues retrying.
    warn!("wifi unavailable, continuing offline");
    Ok(wifi)
}

/// Keeps the station association alive and mirrors link observations
/// into lock-free cells, so the control loop never blocks on Wi-Fi.
fn spawn_wifi_supervisor(mut wifi: BlockingWifi<EspWifi<'static>>, link: WifiLink) {
    thread::Builder::new()
        .name("wifi-sup".into())
        .stack_size(8 * 1024)
        .spawn(move || loop {
            let connected = wifi.is_connected().unwrap_or(false);
            link.up.store(connected, Ordering::Relaxed);

            if connected {
                if let Ok(ip_info) = wifi.wifi().sta_netif().get_ip_info() {
                    *link.ip.lock().unwrap() = ip_info.ip.to_string();
                }
                link.rssi.store(current_rssi(), Ordering::Relaxed);
            } else {
                warn!("wifi down, reconnecting");
                if let Err(err) = wifi.connect().and_then(|()| wifi.wait_netif_up()) {
                    warn!("wifi reconnect failed: {err}");
                }
            }

            thread::sleep(Duration::from_millis(WIFI_CHECK_INTERVAL_MS as u64));
        })
        .expect("failed to spawn wifi supervisor thread");
}

fn current_rssi() -> i32 {
    let mut info = esp_idf_svc::sys::wifi_ap_record_t::default();
    if unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut info) } == esp_idf_svc::sys::ESP_OK
    {
        info.rssi as i32
    } else {
        0
    }
}

#[derive(Clone)]
struct WifiLink {
    up: Arc<AtomicBool>,
    ip: Arc<Mutex<String>>,
    rssi: Arc<AtomicI32>,
}

impl WifiLink {
    fn new() -> Self {
        Self {
            up: Arc::new(AtomicBool::new(true)),
            ip: Arc::new(Mutex::new("0.0.0.0".to_string())),
            rssi: Arc::new(AtomicI32::new(0)),
        }
    }
}

impl NetworkLink for WifiLink {
    fn is_up(&self) -> bool {
        self.up.load(Ordering::Relaxed)
    }

    fn ip(&self) -> String {
        self.ip.lock().unwrap().clone()
    }

    fn rssi_db(&self) -> i32 {
        self.rssi.load(Ordering::Relaxed)
    }
}

fn create_transport(config: &DeviceConfig) -> anyhow::Result<EspTransport> {
    let url = format!("mqtt://{}:{}", config.broker_host, config.broker_port);
    let mqtt_config = MqttClientConfiguration {
        client_id: Some(config.device_id.as_str()),
        username: (!config.broker_user.is_empty()).then_some(config.broker_user.as_str()),
        password: (!config.broker_pass.is_empty()).then_some(config.broker_pass.as_str()),
        ..Default::default()
    };

    let (client, conn) = EspMqttClient::new(&url, &mqtt_config)?;
    let connected = Arc::new(AtomicBool::new(false));
    let inbound = Arc::new(Mutex::new(VecDeque::new()));
    spawn_mqtt_receiver(conn, connected.clone(), inbound.clone());

    Ok(EspTransport {
        client,
        connected,
        inbound,
    })
}

fn spawn_mqtt_receiver(
    mut conn: EspMqttConnection,
    connected: Arc<AtomicBool>,
    inbound: Arc<Mutex<VecDeque<InboundMessage>>>,
) {
    thread::Builder::new()
        .name("mqtt-rx".into())
        .stack_size(8 * 1024)
        .spawn(move || loop {
            match conn.next() {
                Ok(event) => match event.payload() {
                    EventPayload::Connected(_) => {
                        connected.store(true, Ordering::Relaxed);
                        info!("mqtt connected");
                    }
                    EventPayload::Disconnected => {
                        connected.store(false, Ordering::Relaxed);
                        warn!("mqtt disconnected");
                    }
                    EventPayload::Received {
                        topic: Some(topic),
                        data,
                        details,
                        ..
                    } => {
                        if !matches!(details, Details::Complete) {
                            continue;
                        }
                        if let Ok(payload) = core::str::from_utf8(data) {
                            inbound.lock().unwrap().push_back(InboundMessage {
                                topic: topic.to_string(),
                                payload: payload.to_string(),
                            });
                        }
                    }
                    _ => {}
                },
                Err(err) => {
                    connected.store(false, Ordering::Relaxed);
                    warn!("mqtt receive loop error: {err:?}");
                    thread::sleep(Duration::from_secs(2));
                }
            }
        })
        .expect("failed to spawn mqtt receiver thread");
}

struct EspTransport {
    client: EspMqttClient<'static>,
    connected: Arc<AtomicBool>,
    inbound: Arc<Mutex<VecDeque<InboundMessage>>>,
}

impl Transport for EspTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// esp-mqtt reconnects on its own; an attempt here observes
    /// whether the session has come back up.
    fn connect(&mut self) -> bool {
        self.is_connected()
    }

    fn subscribe(&mut self, topic: &str) {
        if let Err(err) = self.client.subscribe(topic, QoS::AtMostOnce) {
            warn!("subscribe to {topic} failed: {err}");
        }
    }

    fn publish(&mut self, publication: &Publication) {
        if let Err(err) = self.client.enqueue(
            &publication.topic,
            QoS::AtMostOnce,
            publication.retained,
            publication.payload.as_bytes(),
        ) {
            warn!("publish to {} failed: {err}", publication.topic);
        }
    }

    fn drain(&mut self) -> Vec<InboundMessage> {
        self.inbound.lock().unwrap().drain(..).collect()
    }
}

fn attach_button(
    pin: i32,
    signal: Arc<ButtonSignal>,
) -> anyhow::Result<PinDriver<'static, AnyIOPin, esp_idf_hal::gpio::Input>> {
    let mut driver = PinDriver::input(unsafe { AnyIOPin::new(pin) })?;
    driver.set_pull(Pull::Up)?;
    driver.set_interrupt_type(InterruptType::NegEdge)?;
    unsafe {
        driver.subscribe(move || {
            let now = (esp_idf_svc::sys::esp_timer_get_time() / 1000) as u32;
            let _ = signal.press_edge(now);
        })?;
    }
    driver.enable_interrupt()?;
    Ok(driver)
}

struct OutputSwitch {
    pin: PinDriver<'static, AnyOutputPin, Output>,
    active_low: bool,
}

impl Switch for OutputSwitch {
    fn set(&mut self, on: bool) {
        let level = if on != self.active_low {
            Level::High
        } else {
            Level::Low
        };
        let _ = self.pin.set_level(level);
    }
}

fn init_sensor(i2c: I2C0) -> anyhow::Result<Option<Sht30>> {
    if !HAS_SENSOR {
        return Ok(None);
    }

    let i2c_config = I2cConfig::new().baudrate(100.kHz().into());
    let sda = unsafe { AnyIOPin::new(SENSOR_SDA_PIN) };
    let scl = unsafe { AnyIOPin::new(SENSOR_SCL_PIN) };
    let driver = I2cDriver::new(i2c, sda, scl, &i2c_config)?;
    info!("sht30 sensor on sda={SENSOR_SDA_PIN} scl={SENSOR_SCL_PIN}");

    Ok(Some(Sht30 { i2c: driver }))
}

/// Single-shot high-repeatability measurement. Any bus error maps to
/// an invalid reading; the climate channel handles reporting.
struct Sht30 {
    i2c: I2cDriver<'static>,
}

impl ClimateSensor for Sht30 {
    fn read(&mut self) -> SensorReading {
        if self.i2c.write(SHT30_ADDR, &[0x2c, 0x06], BLOCK).is_err() {
            return SensorReading::invalid();
        }
        FreeRtos::delay_ms(20);

        let mut buf = [0_u8; 6];
        if self.i2c.read(SHT30_ADDR, &mut buf, BLOCK).is_err() {
            return SensorReading::invalid();
        }

        let raw_temp = u16::from_be_bytes([buf[0], buf[1]]) as f32;
        let raw_hum = u16::from_be_bytes([buf[3], buf[4]]) as f32;
        SensorReading {
            temperature: -45.0 + 175.0 * raw_temp / 65_535.0,
            humidity: 100.0 * raw_hum / 65_535.0,
        }
    }
}

struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvBackend for NvsStore {
    fn load(&mut self) -> Option<Vec<u8>> {
        let mut buf = [0_u8; 16];
        match self.nvs.get_blob(NVS_SETTINGS_KEY, &mut buf) {
            Ok(Some(raw)) => Some(raw.to_vec()),
            Ok(None) => None,
            Err(err) => {
                warn!("nvs read failed: {err}");
                None
            }
        }
    }

    fn store(&mut self, bytes: &[u8]) -> bool {
        match self.nvs.set_blob(NVS_SETTINGS_KEY, bytes) {
            Ok(()) => true,
            Err(err) => {
                warn!("nvs write failed: {err}");
                false
            }
        }
    }
}

struct EspClock;

impl Clock for EspClock {
    fn now_ms(&self) -> u32 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() } / 1000) as u32
    }

    fn sleep_ms(&self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}
