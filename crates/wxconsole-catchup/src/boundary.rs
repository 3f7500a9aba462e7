use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::RolloverConfig;
use crate::daylight::DaylightProbe;

/// Hour of the midnight rain reset.
pub const MIDNIGHT_HOUR: u32 = 0;

/// Hour of the 9 am observation.
pub const NINE_AM_HOUR: u32 = 9;

/// Rollover hour in effect at `at`.
pub fn roll_hour(config: &RolloverConfig, at: NaiveDateTime, daylight: &dyn DaylightProbe) -> u32 {
    if config.rollover_hour == NINE_AM_HOUR && config.use_10am_in_summer && daylight.is_daylight(at) {
        10
    } else {
        config.rollover_hour
    }
}

/// Which boundaries have already fired for the current boundary hour.
///
/// A flag is set when its boundary fires and cleared by the first record
/// whose hour is outside that boundary hour, so each boundary fires once
/// per crossing however many records fall inside the hour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverState {
    pub rollover_done: bool,
    pub midnight_rain_done: bool,
    pub nine_am_done: bool,
    pub snow_hour_done: bool,
}

/// Boundaries that fired for one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundaryEvents {
    pub rollover: bool,
    pub midnight: bool,
    pub nine_am: bool,
    pub snow_hour: bool,
}

impl BoundaryEvents {
    pub fn any(&self) -> bool {
        self.rollover || self.midnight || self.nine_am || self.snow_hour
    }
}

impl RolloverState {
    /// State as if a record at `hour` had just been processed.
    pub fn primed(hour: u32, roll_hour: u32, snow_hour: u32) -> Self {
        Self {
            rollover_done: hour == roll_hour,
            midnight_rain_done: hour == MIDNIGHT_HOUR,
            nine_am_done: hour == NINE_AM_HOUR,
            snow_hour_done: hour == snow_hour,
        }
    }

    /// Advance to a record at `hour` and report what fires.
    pub fn advance(&mut self, hour: u32, roll_hour: u32, snow_hour: u32) -> BoundaryEvents {
        BoundaryEvents {
            rollover: edge(&mut self.rollover_done, hour, roll_hour),
            midnight: edge(&mut self.midnight_rain_done, hour, MIDNIGHT_HOUR),
            nine_am: edge(&mut self.nine_am_done, hour, NINE_AM_HOUR),
            snow_hour: edge(&mut self.snow_hour_done, hour, snow_hour),
        }
    }
}

fn edge(done: &mut bool, hour: u32, boundary: u32) -> bool {
    if hour != boundary {
        *done = false;
        return false;
    }
    !std::mem::replace(done, true)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::daylight::NoDaylight;

    #[test]
    fn boundary_fires_once_per_crossing() {
        let mut state = RolloverState::primed(23, 0, 9);
        let fired: Vec<bool> = [23, 23, 0, 0, 0, 1, 0]
            .iter()
            .map(|&hour| state.advance(hour, 0, 9).rollover)
            .collect();
        assert_eq!(fired, vec![false, false, true, false, false, false, true]);
    }

    #[test]
    fn priming_inside_the_hour_suppresses_the_first_fire() {
        let mut state = RolloverState::primed(0, 0, 9);
        assert!(!state.advance(0, 0, 9).rollover);
        assert!(!state.advance(0, 0, 9).midnight);
    }

    #[test]
    fn boundaries_are_independent() {
        let mut state = RolloverState::primed(8, 9, 9);
        let events = state.advance(9, 9, 9);
        assert!(events.rollover && events.nine_am && events.snow_hour);
        assert!(!events.midnight);
    }

    #[test]
    fn ten_am_rollover_in_summer() {
        let config = RolloverConfig {
            rollover_hour: 9,
            use_10am_in_summer: true,
            snow_hour: 9,
        };
        let at = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(roll_hour(&config, at, &|_: NaiveDateTime| true), 10);
        assert_eq!(roll_hour(&config, at, &NoDaylight), 9);

        let midnight = RolloverConfig {
            use_10am_in_summer: true,
            ..RolloverConfig::default()
        };
        assert_eq!(roll_hour(&midnight, at, &|_: NaiveDateTime| true), 0);
    }
}
