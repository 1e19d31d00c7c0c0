//! Telemetry planning: which topics get published with which payloads.
//! The planners are pure; the control loop decides when to call them
//! (on connect, on state changes, on the heartbeat) and the transport
//! does the actual wire I/O.

use crate::config::DeviceConfig;
use crate::timer::HeaterTimer;
use crate::topics::{
    control_meta_topic, control_topic, device_meta_topic, CONTROL_DURATION, CONTROL_HEAT,
    CONTROL_HUMIDITY, CONTROL_IP, CONTROL_RSSI, CONTROL_TEMPERATURE, CONTROL_TIME,
};

/// One outbound message. Everything the device publishes is retained
/// except live sensor values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: String,
    pub retained: bool,
}

impl Publication {
    pub fn retained(topic: String, payload: String) -> Self {
        Self {
            topic,
            payload,
            retained: true,
        }
    }

    pub fn transient(topic: String, payload: String) -> Self {
        Self {
            topic,
            payload,
            retained: false,
        }
    }
}

/// Fixed-period schedule on the wrapping millisecond clock. Used for
/// the heartbeat and the sensor sampling interval.
#[derive(Debug, Clone)]
pub struct Cadence {
    last_ms: Option<u32>,
    period_ms: u32,
}

impl Cadence {
    pub fn new(period_ms: u32) -> Self {
        Self {
            last_ms: None,
            period_ms,
        }
    }

    pub fn due(&self, now_ms: u32) -> bool {
        match self.last_ms {
            Some(last) => now_ms.wrapping_sub(last) >= self.period_ms,
            None => true,
        }
    }

    pub fn mark(&mut self, now_ms: u32) {
        self.last_ms = Some(now_ms);
    }
}

/// Device discovery metadata: display name plus the static per-control
/// descriptors. Published once per successful broker connection; all
/// retained, so new subscribers see the schema without a republish.
pub fn meta_publications(config: &DeviceConfig) -> Vec<Publication> {
    let device = config.device_id.as_str();
    let mut out = vec![Publication::retained(
        device_meta_topic(device, "name"),
        config.device_name.clone(),
    )];

    out.extend(control_meta(device, CONTROL_HEAT, "switch", false, 1, None));
    out.extend(control_meta(
        device,
        CONTROL_DURATION,
        "range",
        false,
        2,
        Some(config.max_duration_min),
    ));
    out.extend(control_meta(device, CONTROL_TIME, "text", true, 3, None));
    out.extend(control_meta(device, CONTROL_IP, "text", true, 4, None));
    out.extend(control_meta(device, CONTROL_RSSI, "text", true, 5, None));
    out
}

/// Descriptors for the sensor-equipped variant's extra controls.
pub fn climate_meta_publications(device: &str) -> Vec<Publication> {
    let mut out = Vec::new();
    out.extend(control_meta(
        device,
        CONTROL_TEMPERATURE,
        "temperature",
        true,
        6,
        None,
    ));
    out.extend(control_meta(
        device,
        CONTROL_HUMIDITY,
        "rel_humidity",
        true,
        7,
        None,
    ));
    out
}

/// Runtime state: heater on/off, configured duration and remaining
/// time in whole minutes.
pub fn state_publications(device: &str, timer: &HeaterTimer, now_ms: u32) -> Vec<Publication> {
    vec![
        Publication::retained(
            control_topic(device, CONTROL_HEAT),
            if timer.is_running() { "1" } else { "0" }.to_string(),
        ),
        Publication::retained(
            control_topic(device, CONTROL_DURATION),
            timer.duration_min().to_string(),
        ),
        Publication::retained(
            control_topic(device, CONTROL_TIME),
            format!("{} min", timer.remaining_min(now_ms)),
        ),
    ]
}

/// Network diagnostics: current IP address and signal strength.
pub fn info_publications(device: &str, ip: &str, rssi_db: i32) -> Vec<Publication> {
    vec![
        Publication::retained(control_topic(device, CONTROL_IP), ip.to_string()),
        Publication::retained(control_topic(device, CONTROL_RSSI), format!("{rssi_db} dB")),
    ]
}

fn control_meta(
    device: &str,
    control: &str,
    kind: &str,
    readonly: bool,
    order: u32,
    max: Option<u32>,
) -> Vec<Publication> {
    let mut out = vec![Publication::retained(
        control_meta_topic(device, control, "type"),
        kind.to_string(),
    )];
    if readonly {
        out.push(Publication::retained(
            control_meta_topic(device, control, "readonly"),
            "1".to_string(),
        ));
    }
    if let Some(max) = max {
        out.push(Publication::retained(
            control_meta_topic(device, control, "max"),
            max.to_string(),
        ));
    }
    out.push(Publication::retained(
        control_meta_topic(device, control, "order"),
        order.to_string(),
    ));
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const DEVICE: &str = "towel_heater_fl1";

    fn pairs(publications: &[Publication]) -> Vec<(&str, &str)> {
        publications
            .iter()
            .map(|p| (p.topic.as_str(), p.payload.as_str()))
            .collect()
    }

    #[test]
    fn meta_describes_every_control() {
        let config = DeviceConfig::default();
        let out = meta_publications(&config);

        assert!(out.iter().all(|p| p.retained));
        assert_eq!(
            pairs(&out),
            vec![
                ("/devices/towel_heater_fl1/meta/name", "Towel Heater FL1"),
                ("/devices/towel_heater_fl1/controls/Heat/meta/type", "switch"),
                ("/devices/towel_heater_fl1/controls/Heat/meta/order", "1"),
                ("/devices/towel_heater_fl1/controls/Duration/meta/type", "range"),
                ("/devices/towel_heater_fl1/controls/Duration/meta/max", "300"),
                ("/devices/towel_heater_fl1/controls/Duration/meta/order", "2"),
                ("/devices/towel_heater_fl1/controls/Time/meta/type", "text"),
                ("/devices/towel_heater_fl1/controls/Time/meta/readonly", "1"),
                ("/devices/towel_heater_fl1/controls/Time/meta/order", "3"),
                ("/devices/towel_heater_fl1/controls/IP/meta/type", "text"),
                ("/devices/towel_heater_fl1/controls/IP/meta/readonly", "1"),
                ("/devices/towel_heater_fl1/controls/IP/meta/order", "4"),
                ("/devices/towel_heater_fl1/controls/RSSI/meta/type", "text"),
                ("/devices/towel_heater_fl1/controls/RSSI/meta/readonly", "1"),
                ("/devices/towel_heater_fl1/controls/RSSI/meta/order", "5"),
            ]
        );
    }

    #[test]
    fn climate_meta_covers_both_sensor_controls() {
        let out = climate_meta_publications(DEVICE);
        assert_eq!(
            pairs(&out),
            vec![
                ("/devices/towel_heater_fl1/controls/Temperature/meta/type", "temperature"),
                ("/devices/towel_heater_fl1/controls/Temperature/meta/readonly", "1"),
                ("/devices/towel_heater_fl1/controls/Temperature/meta/order", "6"),
                ("/devices/towel_heater_fl1/controls/Humidity/meta/type", "rel_humidity"),
                ("/devices/towel_heater_fl1/controls/Humidity/meta/readonly", "1"),
                ("/devices/towel_heater_fl1/controls/Humidity/meta/order", "7"),
            ]
        );
    }

    #[test]
    fn state_reports_idle_timer() {
        let timer = crate::timer::HeaterTimer::new(120 * 60_000);
        let out = state_publications(DEVICE, &timer, 0);

        assert_eq!(
            pairs(&out),
            vec![
                ("/devices/towel_heater_fl1/controls/Heat", "0"),
                ("/devices/towel_heater_fl1/controls/Duration", "120"),
                ("/devices/towel_heater_fl1/controls/Time", "120 min"),
            ]
        );
    }

    #[test]
    fn state_reports_remaining_time_while_running() {
        let mut timer = crate::timer::HeaterTimer::new(120 * 60_000);
        timer.start(0);
        let out = state_publications(DEVICE, &timer, 30 * 60_000);

        assert_eq!(out[0].payload, "1");
        assert_eq!(out[2].payload, "90 min");
    }

    #[test]
    fn info_formats_rssi_in_db() {
        let out = info_publications(DEVICE, "10.0.0.17", -61);
        assert_eq!(
            pairs(&out),
            vec![
                ("/devices/towel_heater_fl1/controls/IP", "10.0.0.17"),
                ("/devices/towel_heater_fl1/controls/RSSI", "-61 dB"),
            ]
        );
    }

    #[test]
    fn cadence_is_due_immediately_then_gated() {
        let mut cadence = Cadence::new(10_000);

        assert!(cadence.due(0));
        cadence.mark(0);

        assert!(!cadence.due(9_999));
        assert!(cadence.due(10_000));
    }
}
