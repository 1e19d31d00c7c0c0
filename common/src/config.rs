use serde::{Deserialize, Serialize};

/// Build-time device configuration. There is no runtime configuration
/// surface; the defaults below are the product. The host binary may
/// override the broker endpoint from the environment for bench runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_id: String,
    pub device_name: String,
    pub broker_host: String,
    pub broker_port: u16,
    pub broker_user: String,
    pub broker_pass: String,

    pub tick_ms: u32,
    pub debounce_ms: u32,
    pub reconnect_min_ms: u32,
    pub heartbeat_ms: u32,
    pub sensor_interval_ms: u32,

    pub default_duration_min: u32,
    pub max_duration_min: u32,

    pub button_pin: i32,
    pub relay_pin: i32,
    pub led_pin: i32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: "towel_heater_fl1".to_string(),
            device_name: "Towel Heater FL1".to_string(),
            broker_host: "10.0.0.3".to_string(),
            broker_port: 1884,
            broker_user: String::new(),
            broker_pass: String::new(),
            tick_ms: 50,
            debounce_ms: 200,
            reconnect_min_ms: 5_000,
            heartbeat_ms: 10_000,
            sensor_interval_ms: 10_000,
            default_duration_min: 120,
            max_duration_min: 300,
            // Sonoff S20: button is active low, relay active high,
            // green LED active low.
            button_pin: 0,
            relay_pin: 12,
            led_pin: 13,
        }
    }
}

impl DeviceConfig {
    pub fn default_duration_ms(&self) -> u32 {
        self.default_duration_min.saturating_mul(60_000)
    }

    /// A persisted duration is applied at boot only when it fits the
    /// advertised control range; anything else falls back to the
    /// build-time default.
    pub fn is_valid_duration_min(&self, minutes: u32) -> bool {
        (1..=self.max_duration_min).contains(&minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_bounds_follow_advertised_max() {
        let config = DeviceConfig::default();

        assert!(!config.is_valid_duration_min(0));
        assert!(config.is_valid_duration_min(1));
        assert!(config.is_valid_duration_min(300));
        assert!(!config.is_valid_duration_min(301));
    }

    #[test]
    fn default_duration_is_two_hours() {
        let config = DeviceConfig::default();
        assert_eq!(config.default_duration_ms(), 2 * 60 * 60 * 1000);
    }
}
