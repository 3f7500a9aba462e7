use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{CatchupError, Result};

/// When the meteorological day starts and when daily housekeeping runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloverConfig {
    /// Hour the meteorological day rolls over: 0 (midnight) or 9.
    pub rollover_hour: u32,
    /// With a 9 am rollover, roll at 10 am while daylight saving is in effect.
    pub use_10am_in_summer: bool,
    /// Hour of the daily snow observation.
    pub snow_hour: u32,
}

impl Default for RolloverConfig {
    fn default() -> Self {
        Self {
            rollover_hour: 0,
            use_10am_in_summer: false,
            snow_hour: 9,
        }
    }
}

impl RolloverConfig {
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.rollover_hour, 0 | 9) {
            return Err(CatchupError::InvalidConfig(format!(
                "rollover_hour must be 0 or 9, got {}",
                self.rollover_hour
            )));
        }
        if self.snow_hour > 23 {
            return Err(CatchupError::InvalidConfig(format!(
                "snow_hour must be 0-23, got {}",
                self.snow_hour
            )));
        }
        Ok(())
    }
}

/// Bounds outside of which a reading is treated as a sensor fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlausibilityLimits {
    pub temperature_f: RangeInclusive<f64>,
    pub humidity: RangeInclusive<f64>,
    pub wind_mph: RangeInclusive<f64>,
    /// Rain clicks in one archive interval.
    pub rain_clicks: RangeInclusive<f64>,
    pub barometer_inhg: RangeInclusive<f64>,
    pub uv_index: RangeInclusive<f64>,
    pub solar_wm2: RangeInclusive<f64>,
    /// ET in one archive interval, inches.
    pub et_in: RangeInclusive<f64>,
}

impl Default for PlausibilityLimits {
    fn default() -> Self {
        Self {
            temperature_f: -80.0..=150.0,
            humidity: 0.0..=100.0,
            wind_mph: 0.0..=150.0,
            rain_clicks: 0.0..=2000.0,
            barometer_inhg: 25.0..=33.0,
            uv_index: 0.0..=16.0,
            solar_wm2: 0.0..=1800.0,
            et_in: 0.0..=1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_rollover_hour() {
        let config = RolloverConfig {
            rollover_hour: 6,
            ..RolloverConfig::default()
        };
        assert!(matches!(config.validate(), Err(CatchupError::InvalidConfig(_))));
        assert!(RolloverConfig::default().validate().is_ok());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: RolloverConfig = serde_json::from_str(r#"{"rollover_hour": 9}"#).unwrap();
        assert_eq!(config.rollover_hour, 9);
        assert_eq!(config.snow_hour, 9);
        assert!(!config.use_10am_in_summer);
    }
}
