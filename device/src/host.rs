//! Host bench build. The control loop runs against `rumqttc` and
//! simulated GPIO so the whole device can be exercised on a
//! workstation: outputs are log lines, the front button is a newline
//! on stdin, and settings persist to a small file.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use heater_common::{
    Board, ButtonSignal, ClimateSensor, Clock, ControlLoop, DeviceConfig, InboundMessage,
    NetworkLink, NvBackend, Publication, SensorReading, Settings, Switch, Transport,
};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("HEATER_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.heater"));
    let config = load_config(&data_dir)?;

    let mut store = FileStore {
        path: data_dir.join("settings.bin"),
    };
    let settings = load_settings(&mut store, &config);

    let mut mqtt_options = MqttOptions::new(
        config.device_id.clone(),
        config.broker_host.clone(),
        config.broker_port,
    );
    mqtt_options.set_keep_alive(Duration::from_secs(15));
    if !config.broker_user.is_empty() {
        mqtt_options.set_credentials(config.broker_user.clone(), config.broker_pass.clone());
    }

    let (client, eventloop) = AsyncClient::new(mqtt_options, 64);
    let connected = Arc::new(AtomicBool::new(false));
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    spawn_mqtt_loop(connected.clone(), inbound_tx, eventloop);

    let button = Arc::new(ButtonSignal::new(config.debounce_ms));
    spawn_button_feed(button.clone());

    let clock = HostClock;
    let mut transport = MqttTransport {
        client,
        connected,
        inbound: inbound_rx,
    };
    let link = HostLink {
        ip: "127.0.0.1".to_string(),
    };
    let mut relay = SimSwitch::relay();
    let mut indicator = SimSwitch::indicator();
    let mut sensor = std::env::var("HEATER_SENSOR").is_ok().then(|| SimSensor);

    info!(
        "heater bench started: device `{}`, broker {}:{}",
        config.device_id, config.broker_host, config.broker_port
    );
    info!("press Enter to simulate the front button");

    let tick = Duration::from_millis(config.tick_ms as u64);
    let mut control = ControlLoop::new(config, settings);
    let mut interval = tokio::time::interval(tick);

    loop {
        tokio::select! {
            _ = interval.tick() => {
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
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn load_config(data_dir: &Path) -> anyhow::Result<DeviceConfig> {
    let path = data_dir.join("config.json");
    let mut config = match std::fs::read(&path) {
        Ok(raw) => serde_json::from_slice::<DeviceConfig>(&raw)
            .with_context(|| format!("invalid device config at {}", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => DeviceConfig::default(),
        Err(err) => return Err(err.into()),
    };

    if let Ok(host) = std::env::var("MQTT_HOST") {
        config.broker_host = host;
    }
    if let Some(port) = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        config.broker_port = port;
    }

    Ok(config)
}

fn load_settings(store: &mut FileStore, config: &DeviceConfig) -> Settings {
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

fn spawn_mqtt_loop(
    connected: Arc<AtomicBool>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    mut eventloop: rumqttc::EventLoop,
) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    connected.store(true, Ordering::Relaxed);
                    info!("mqtt connected");
                }
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    match String::from_utf8(message.payload.to_vec()) {
                        Ok(payload) => {
                            let _ = inbound.send(InboundMessage {
                                topic: message.topic,
                                payload,
                            });
                        }
                        Err(_) => warn!("dropping non-utf8 payload on {}", message.topic),
                    }
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    connected.store(false, Ordering::Relaxed);
                    warn!("mqtt disconnected by broker");
                }
                Ok(_) => {}
                Err(err) => {
                    connected.store(false, Ordering::Relaxed);
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_button_feed(button: Arc<ButtonSignal>) {
    tokio::spawn(async move {
        use tokio::io::AsyncBufReadExt;

        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            if button.press_edge(monotonic_ms()) {
                info!("button pressed");
            }
        }
    });
}

struct HostClock;

impl Clock for HostClock {
    fn now_ms(&self) -> u32 {
        monotonic_ms()
    }

    fn sleep_ms(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

// Truncation to u32 gives the same wrapping clock the firmware sees.
fn monotonic_ms() -> u32 {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_millis() as u32
}

struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
}

impl Transport for MqttTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// `rumqttc`'s event loop owns the session and reconnects on its
    /// own; an attempt here just observes whether it has come back up.
    fn connect(&mut self) -> bool {
        self.is_connected()
    }

    fn subscribe(&mut self, topic: &str) {
        if let Err(err) = self.client.try_subscribe(topic, QoS::AtMostOnce) {
            warn!("subscribe to {topic} failed: {err}");
        }
    }

    fn publish(&mut self, publication: &Publication) {
        let payload = publication.payload.clone().into_bytes();
        if let Err(err) = self.client.try_publish(
            publication.topic.as_str(),
            QoS::AtMostOnce,
            publication.retained,
            payload,
        ) {
            warn!("publish to {} failed: {err}", publication.topic);
        }
    }

    fn drain(&mut self) -> Vec<InboundMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.inbound.try_recv() {
            out.push(message);
        }
        out
    }
}

struct HostLink {
    ip: String,
}

impl NetworkLink for HostLink {
    fn is_up(&self) -> bool {
        true
    }

    fn ip(&self) -> String {
        self.ip.clone()
    }

    fn rssi_db(&self) -> i32 {
        -50
    }
}

struct SimSwitch {
    name: &'static str,
    chatty: bool,
    on: Option<bool>,
}

impl SimSwitch {
    fn relay() -> Self {
        Self {
            name: "relay",
            chatty: true,
            on: None,
        }
    }

    fn indicator() -> Self {
        // The indicator blinks while disconnected; keep it off the
        // info log.
        Self {
            name: "indicator",
            chatty: false,
            on: None,
        }
    }
}

impl Switch for SimSwitch {
    fn set(&mut self, on: bool) {
        if self.on == Some(on) {
            return;
        }
        self.on = Some(on);

        let state = if on { "on" } else { "off" };
        if self.chatty {
            info!("{} -> {}", self.name, state);
        } else {
            debug!("{} -> {}", self.name, state);
        }
    }
}

/// Slow deterministic drift around room climate, enough to watch the
/// Temperature/Humidity controls move.
struct SimSensor;

impl ClimateSensor for SimSensor {
    fn read(&mut self) -> SensorReading {
        let phase = (monotonic_ms() / 60_000) % 10;
        SensorReading {
            temperature: 21.0 + phase as f32 * 0.1,
            humidity: 40.0 + phase as f32 * 0.5,
        }
    }
}

struct FileStore {
    path: PathBuf,
}

impl NvBackend for FileStore {
    fn load(&mut self) -> Option<Vec<u8>> {
        std::fs::read(&self.path).ok()
    }

    fn store(&mut self, bytes: &[u8]) -> bool {
        if let Some(parent) = self.path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("settings dir create failed: {err}");
                return false;
            }
        }
        match std::fs::write(&self.path, bytes) {
            Ok(()) => true,
            Err(err) => {
                warn!("settings write failed: {err}");
                false
            }
        }
    }
}
