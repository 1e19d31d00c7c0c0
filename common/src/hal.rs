//! Narrow capability interfaces for the hardware and transport
//! collaborators. The control loop only ever talks to these traits, so
//! the ESP target, the host bench binary, and the scenario tests all
//! drive the same logic.

use crate::button::ButtonSignal;
use crate::sensor::SensorReading;
use crate::telemetry::Publication;

/// A message delivered on one of the subscribed setter topics.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

/// Monotonic wrapping millisecond clock. `sleep_ms` blocks the loop;
/// the only caller is the start-acknowledgment blink.
pub trait Clock {
    fn now_ms(&self) -> u32;
    fn sleep_ms(&self, ms: u32);
}

/// Message-broker session. Publish and subscribe are fire-and-forget:
/// implementations log failures and the next scheduled republish
/// repairs any loss.
pub trait Transport {
    fn is_connected(&self) -> bool;
    /// One connection attempt; returns whether the session is up.
    fn connect(&mut self) -> bool;
    fn subscribe(&mut self, topic: &str);
    fn publish(&mut self, publication: &Publication);
    /// Messages that arrived since the previous drain, in order.
    fn drain(&mut self) -> Vec<InboundMessage>;
}

/// Link-layer observations (Wi-Fi association state and diagnostics).
pub trait NetworkLink {
    fn is_up(&self) -> bool;
    fn ip(&self) -> String;
    fn rssi_db(&self) -> i32;
}

/// A single binary output (relay or indicator LED). Implementations
/// own the electrical polarity.
pub trait Switch {
    fn set(&mut self, on: bool);
}

/// Blocking environmental sensor read; NaN fields mark a failed read.
pub trait ClimateSensor {
    fn read(&mut self) -> SensorReading;
}

/// Byte-level nonvolatile storage for the settings blob.
pub trait NvBackend {
    fn load(&mut self) -> Option<Vec<u8>>;
    /// Synchronous write-and-commit; returns whether it stuck.
    fn store(&mut self, bytes: &[u8]) -> bool;
}

/// Everything the control loop touches on one tick. A board without a
/// climate sensor is the base (sensor-less) hardware variant.
pub struct Board<'a> {
    pub clock: &'a dyn Clock,
    pub button: &'a ButtonSignal,
    pub transport: &'a mut dyn Transport,
    pub link: &'a dyn NetworkLink,
    pub relay: &'a mut dyn Switch,
    pub indicator: &'a mut dyn Switch,
    pub sensor: Option<&'a mut dyn ClimateSensor>,
    pub storage: &'a mut dyn NvBackend,
}
