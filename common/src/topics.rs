//! Topic formatting for the WirenBoard-style device/control
//! convention. Other systems subscribe against these strings, so the
//! mapping is a wire contract and must stay bit-exact.

pub const CONTROL_HEAT: &str = "Heat";
pub const CONTROL_DURATION: &str = "Duration";
pub const CONTROL_TIME: &str = "Time";
pub const CONTROL_IP: &str = "IP";
pub const CONTROL_RSSI: &str = "RSSI";
pub const CONTROL_TEMPERATURE: &str = "Temperature";
pub const CONTROL_HUMIDITY: &str = "Humidity";

/// Resolves `(control, meta, setter)` to one topic under the device
/// namespace:
///
/// * control only, setter       -> `/devices/<dev>/controls/<c>/on`
/// * control only               -> `/devices/<dev>/controls/<c>`
/// * control + meta             -> `/devices/<dev>/controls/<c>/meta/<m>`
/// * neither                    -> `/devices/<dev>`
/// * meta only                  -> `/devices/<dev>/meta/<m>`
///
/// The setter flag only matters for a bare control topic.
pub fn format_topic(device: &str, control: &str, meta: &str, setter: bool) -> String {
    if !control.is_empty() {
        if !meta.is_empty() {
            format!("/devices/{device}/controls/{control}/meta/{meta}")
        } else if setter {
            format!("/devices/{device}/controls/{control}/on")
        } else {
            format!("/devices/{device}/controls/{control}")
        }
    } else if !meta.is_empty() {
        format!("/devices/{device}/meta/{meta}")
    } else {
        format!("/devices/{device}")
    }
}

pub fn control_topic(device: &str, control: &str) -> String {
    format_topic(device, control, "", false)
}

pub fn control_setter_topic(device: &str, control: &str) -> String {
    format_topic(device, control, "", true)
}

pub fn control_meta_topic(device: &str, control: &str, meta: &str) -> String {
    format_topic(device, control, meta, false)
}

pub fn device_meta_topic(device: &str, meta: &str) -> String {
    format_topic(device, "", meta, false)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const DEVICE: &str = "towel_heater_fl1";

    #[test]
    fn control_setter() {
        assert_eq!(
            format_topic(DEVICE, "Heat", "", true),
            "/devices/towel_heater_fl1/controls/Heat/on"
        );
    }

    #[test]
    fn control_value() {
        assert_eq!(
            format_topic(DEVICE, "Heat", "", false),
            "/devices/towel_heater_fl1/controls/Heat"
        );
    }

    #[test]
    fn control_meta_ignores_setter_flag() {
        assert_eq!(
            format_topic(DEVICE, "Duration", "max", false),
            "/devices/towel_heater_fl1/controls/Duration/meta/max"
        );
        assert_eq!(
            format_topic(DEVICE, "Duration", "max", true),
            "/devices/towel_heater_fl1/controls/Duration/meta/max"
        );
    }

    #[test]
    fn device_meta() {
        assert_eq!(
            format_topic(DEVICE, "", "name", false),
            "/devices/towel_heater_fl1/meta/name"
        );
    }

    #[test]
    fn device_root() {
        assert_eq!(format_topic(DEVICE, "", "", false), "/devices/towel_heater_fl1");
        assert_eq!(format_topic(DEVICE, "", "", true), "/devices/towel_heater_fl1");
    }
}
