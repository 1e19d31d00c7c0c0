use thiserror::Error;

/// Nonvolatile layout: one little-endian u32 (timer duration in whole
/// minutes) at offset 0.
pub const SETTINGS_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("settings blob too short: {0} bytes, need {SETTINGS_LEN}")]
    TooShort(usize),
}

/// The persisted settings surface. Loaded verbatim at boot (range
/// checks are the caller's call) and written only when an inbound
/// duration-change message is accepted; storage write endurance is
/// protected by writing nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub timer_duration_min: u32,
}

impl Settings {
    pub fn decode(raw: &[u8]) -> Result<Self, SettingsError> {
        let bytes: [u8; SETTINGS_LEN] = raw
            .get(..SETTINGS_LEN)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(SettingsError::TooShort(raw.len()))?;
        Ok(Self {
            timer_duration_min: u32::from_le_bytes(bytes),
        })
    }

    pub fn encode(&self) -> [u8; SETTINGS_LEN] {
        self.timer_duration_min.to_le_bytes()
    }

    pub fn timer_duration_ms(&self) -> u32 {
        self.timer_duration_min.saturating_mul(60_000)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn encodes_little_endian_at_offset_zero() {
        let settings = Settings {
            timer_duration_min: 300,
        };
        assert_eq!(settings.encode(), [0x2c, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn decodes_what_it_encoded() {
        let settings = Settings {
            timer_duration_min: 90,
        };
        assert_eq!(Settings::decode(&settings.encode()), Ok(settings));
    }

    #[test]
    fn decode_is_verbatim_even_for_out_of_range_values() {
        let raw = u32::MAX.to_le_bytes();
        let settings = Settings::decode(&raw).unwrap();
        assert_eq!(settings.timer_duration_min, u32::MAX);
    }

    #[test]
    fn truncated_blob_is_rejected() {
        assert_eq!(Settings::decode(&[0x01, 0x02]), Err(SettingsError::TooShort(2)));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let raw = [0x3c, 0x00, 0x00, 0x00, 0xff, 0xff];
        let settings = Settings::decode(&raw).unwrap();
        assert_eq!(settings.timer_duration_min, 60);
    }
}
