//! The cooperative control loop. One `tick` runs the whole device
//! once: drain inbound messages, consume the button event, reconnect
//! if due, recompute connectivity status, expire-check the timer,
//! drive the relay and indicator, sample the sensor, heartbeat.
//!
//! Everything here is single-writer; the button ISR is the only
//! concurrent producer and is isolated behind [`ButtonSignal`].

use crate::config::DeviceConfig;
use crate::hal::{Board, InboundMessage};
use crate::sensor::ClimateChannel;
use crate::settings::Settings;
use crate::status::{LinkStatus, ReconnectPolicy};
use crate::telemetry::{
    climate_meta_publications, info_publications, meta_publications, state_publications, Cadence,
};
use crate::timer::HeaterTimer;
use crate::topics::{control_setter_topic, CONTROL_DURATION, CONTROL_HEAT};

const ACK_PULSES: u32 = 5;
const ACK_PULSE_HALF_MS: u32 = 50;

pub struct ControlLoop {
    config: DeviceConfig,
    settings: Settings,
    timer: HeaterTimer,
    status: LinkStatus,
    reconnect: ReconnectPolicy,
    was_connected: bool,
    heartbeat: Cadence,
    sampling: Cadence,
    climate: ClimateChannel,
    heat_setter: String,
    duration_setter: String,
}

impl ControlLoop {
    /// The persisted duration is applied when it fits the advertised
    /// range; a blank or corrupt settings blob falls back to the
    /// build-time default.
    pub fn new(config: DeviceConfig, settings: Settings) -> Self {
        let duration_ms = if config.is_valid_duration_min(settings.timer_duration_min) {
            settings.timer_duration_ms()
        } else {
            config.default_duration_ms()
        };

        let heat_setter = control_setter_topic(&config.device_id, CONTROL_HEAT);
        let duration_setter = control_setter_topic(&config.device_id, CONTROL_DURATION);

        Self {
            timer: HeaterTimer::new(duration_ms),
            status: LinkStatus::NoLink,
            reconnect: ReconnectPolicy::new(config.reconnect_min_ms),
            was_connected: false,
            heartbeat: Cadence::new(config.heartbeat_ms),
            sampling: Cadence::new(config.sensor_interval_ms),
            climate: ClimateChannel::new(),
            heat_setter,
            duration_setter,
            config,
            settings,
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    pub fn is_heating(&self) -> bool {
        self.timer.is_running()
    }

    pub fn timer(&self) -> &HeaterTimer {
        &self.timer
    }

    pub fn tick(&mut self, board: &mut Board<'_>) {
        let inbound = board.transport.drain();
        for message in inbound {
            self.handle_message(board, message);
        }

        if board.button.take_press_event() {
            if self.timer.is_running() {
                self.timer.stop();
            } else {
                self.start_heater(board);
            }
            let now = board.clock.now_ms();
            self.publish_state(board, now);
        }

        self.connect_if_needed(board);

        self.status = LinkStatus::derive(board.link.is_up(), board.transport.is_connected());

        // The clock is re-read here: the acknowledgment blink above
        // blocks for ~500 ms, and the expiry comparison must not run
        // against a timestamp older than the run's start.
        let now = board.clock.now_ms();
        self.timer.expire_check(now);

        let relay_on = self.timer.relay_on();
        board.relay.set(relay_on);
        board.indicator.set(self.status.indicator_lit(relay_on, now));

        self.sample_sensor_if_due(board, now);

        if self.heartbeat.due(now) {
            self.publish_state(board, now);
            self.publish_info(board);
            self.heartbeat.mark(now);
        }
    }

    fn handle_message(&mut self, board: &mut Board<'_>, message: InboundMessage) {
        if message.topic == self.heat_setter {
            match message.payload.as_str() {
                "1" => {
                    if !self.timer.is_running() {
                        self.start_heater(board);
                    }
                }
                "0" => {
                    if self.timer.is_running() {
                        self.timer.stop();
                    }
                }
                _ => {}
            }
            let now = board.clock.now_ms();
            self.publish_state(board, now);
        } else if message.topic == self.duration_setter {
            let Ok(minutes) = message.payload.trim().parse::<u32>() else {
                return;
            };
            if !self.config.is_valid_duration_min(minutes) {
                return;
            }

            self.settings.timer_duration_min = minutes;
            self.timer.set_duration_ms(self.settings.timer_duration_ms());
            board.storage.store(&self.settings.encode());
            let now = board.clock.now_ms();
            self.publish_state(board, now);
        }
    }

    /// Five short indicator pulses acknowledge the start, then the run
    /// begins. Blocks the loop for ~500 ms.
    fn start_heater(&mut self, board: &mut Board<'_>) {
        for _ in 0..ACK_PULSES {
            board.indicator.set(true);
            board.clock.sleep_ms(ACK_PULSE_HALF_MS);
            board.indicator.set(false);
            board.clock.sleep_ms(ACK_PULSE_HALF_MS);
        }
        self.timer.start(board.clock.now_ms());
    }

    /// Dials while the session is down (subject to the retry floor)
    /// and runs the on-connect replay on every observed down-to-up
    /// transition. Some transports dial right here; others recover in
    /// a background session loop and only surface as a flipped
    /// `is_connected` observation, so the replay keys off the edge,
    /// not off `connect()`'s return value.
    fn connect_if_needed(&mut self, board: &mut Board<'_>) {
        if !board.transport.is_connected() {
            self.was_connected = false;
            let now = board.clock.now_ms();
            if self.reconnect.should_attempt(now) {
                board.transport.connect();
                self.reconnect.record_attempt(now);
            }
        }

        if board.transport.is_connected() && !self.was_connected {
            self.on_connected(board);
            self.was_connected = true;
        }
    }

    /// A fresh broker session gets the full retained picture:
    /// discovery metadata, state, diagnostics, and the setter
    /// subscriptions.
    fn on_connected(&mut self, board: &mut Board<'_>) {
        let now = board.clock.now_ms();

        for publication in meta_publications(&self.config) {
            board.transport.publish(&publication);
        }
        if board.sensor.is_some() {
            for publication in climate_meta_publications(&self.config.device_id) {
                board.transport.publish(&publication);
            }
        }
        self.publish_state(board, now);
        self.publish_info(board);
        self.heartbeat.mark(now);

        let heat_setter = self.heat_setter.clone();
        let duration_setter = self.duration_setter.clone();
        board.transport.subscribe(&heat_setter);
        board.transport.subscribe(&duration_setter);
    }

    fn sample_sensor_if_due(&mut self, board: &mut Board<'_>, now: u32) {
        if !self.sampling.due(now) {
            return;
        }
        let Some(sensor) = board.sensor.as_deref_mut() else {
            return;
        };

        let reading = sensor.read();
        for publication in self.climate.publications(&self.config.device_id, reading) {
            board.transport.publish(&publication);
        }
        self.sampling.mark(now);
    }

    fn publish_state(&self, board: &mut Board<'_>, now: u32) {
        for publication in state_publications(&self.config.device_id, &self.timer, now) {
            board.transport.publish(&publication);
        }
    }

    fn publish_info(&self, board: &mut Board<'_>) {
        let info = info_publications(&self.config.device_id, &board.link.ip(), board.link.rssi_db());
        for publication in info {
            board.transport.publish(&publication);
        }
    }
}
