use crate::telemetry::Publication;
use crate::topics::{control_meta_topic, control_topic, CONTROL_HUMIDITY, CONTROL_TEMPERATURE};

/// One environmental sample. Either value may be NaN when the sensor
/// read failed; a reading is valid only when both are numbers.
#[derive(Debug, Clone, Copy)]
pub struct SensorReading {
    pub temperature: f32,
    pub humidity: f32,
}

impl SensorReading {
    pub fn invalid() -> Self {
        Self {
            temperature: f32::NAN,
            humidity: f32::NAN,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.temperature.is_nan() && !self.humidity.is_nan()
    }
}

/// Publication planner for the Temperature/Humidity controls.
///
/// Error reporting is edge-triggered: `"r"` is published on the
/// `/meta/error` sub-topics once when readings turn invalid, an empty
/// payload once when they recover. The `error_reported` latch tracks
/// the outstanding notification so steady states stay silent on the
/// error topics, and stale values are not republished while invalid.
#[derive(Debug, Default)]
pub struct ClimateChannel {
    error_reported: bool,
}

impl ClimateChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publications(&mut self, device: &str, reading: SensorReading) -> Vec<Publication> {
        let mut out = Vec::new();

        if !reading.is_valid() {
            if !self.error_reported {
                self.error_reported = true;
                out.push(error_publication(device, CONTROL_TEMPERATURE, "r"));
                out.push(error_publication(device, CONTROL_HUMIDITY, "r"));
            }
            return out;
        }

        if self.error_reported {
            self.error_reported = false;
            out.push(error_publication(device, CONTROL_TEMPERATURE, ""));
            out.push(error_publication(device, CONTROL_HUMIDITY, ""));
        }

        out.push(Publication::transient(
            control_topic(device, CONTROL_TEMPERATURE),
            format!("{:.1}", reading.temperature),
        ));
        out.push(Publication::transient(
            control_topic(device, CONTROL_HUMIDITY),
            format!("{:.1}", reading.humidity),
        ));
        out
    }
}

fn error_publication(device: &str, control: &str, payload: &str) -> Publication {
    Publication::retained(control_meta_topic(device, control, "error"), payload.to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const DEVICE: &str = "towel_heater_fl1";

    fn reading(temperature: f32, humidity: f32) -> SensorReading {
        SensorReading {
            temperature,
            humidity,
        }
    }

    #[test]
    fn valid_reading_publishes_both_values_unretained() {
        let mut channel = ClimateChannel::new();
        let out = channel.publications(DEVICE, reading(21.5, 40.0));

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].topic, "/devices/towel_heater_fl1/controls/Temperature");
        assert_eq!(out[0].payload, "21.5");
        assert!(!out[0].retained);
        assert_eq!(out[1].topic, "/devices/towel_heater_fl1/controls/Humidity");
        assert_eq!(out[1].payload, "40.0");
        assert!(!out[1].retained);
    }

    #[test]
    fn error_publications_are_edge_triggered() {
        let mut channel = ClimateChannel::new();

        // valid, invalid, invalid, valid
        let first = channel.publications(DEVICE, reading(21.0, 40.0));
        assert_eq!(first.len(), 2);

        let onset = channel.publications(DEVICE, SensorReading::invalid());
        assert_eq!(
            onset
                .iter()
                .map(|p| (p.topic.as_str(), p.payload.as_str()))
                .collect::<Vec<_>>(),
            vec![
                ("/devices/towel_heater_fl1/controls/Temperature/meta/error", "r"),
                ("/devices/towel_heater_fl1/controls/Humidity/meta/error", "r"),
            ]
        );

        // Steady invalid: nothing, and no stale values either.
        assert!(channel.publications(DEVICE, SensorReading::invalid()).is_empty());

        let recovery = channel.publications(DEVICE, reading(20.0, 38.5));
        assert_eq!(recovery.len(), 4);
        assert_eq!(recovery[0].payload, "");
        assert_eq!(recovery[1].payload, "");
        assert_eq!(recovery[2].payload, "20.0");
        assert_eq!(recovery[3].payload, "38.5");
    }

    #[test]
    fn partially_invalid_reading_counts_as_invalid() {
        let mut channel = ClimateChannel::new();
        let out = channel.publications(DEVICE, reading(21.0, f32::NAN));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].payload, "r");
    }
}
