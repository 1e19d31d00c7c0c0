pub mod button;
pub mod config;
pub mod control;
pub mod hal;
pub mod sensor;
pub mod settings;
pub mod status;
pub mod telemetry;
pub mod timer;
pub mod topics;

pub use button::ButtonSignal;
pub use config::DeviceConfig;
pub use control::ControlLoop;
pub use hal::{Board, ClimateSensor, Clock, InboundMessage, NetworkLink, NvBackend, Switch, Transport};
pub use sensor::{ClimateChannel, SensorReading};
pub use settings::{Settings, SettingsError};
pub use status::{LinkStatus, ReconnectPolicy};
pub use telemetry::{Cadence, Publication};
pub use timer::HeaterTimer;
