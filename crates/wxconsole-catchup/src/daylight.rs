use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Offset, TimeZone};

/// Answers whether daylight saving time is in effect at a console-local time.
pub trait DaylightProbe: Send {
    fn is_daylight(&self, at: NaiveDateTime) -> bool;
}

impl<F> DaylightProbe for F
where
    F: Fn(NaiveDateTime) -> bool + Send,
{
    fn is_daylight(&self, at: NaiveDateTime) -> bool {
        self(at)
    }
}

/// Daylight saving as observed by the host time zone.
///
/// Standard time is the smaller of the January and July UTC offsets; a
/// moment is in daylight time when its offset is larger than that.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDaylight;

impl LocalDaylight {
    fn offset_secs(at: NaiveDateTime) -> Option<i32> {
        Local
            .from_local_datetime(&at)
            .earliest()
            .map(|dt| dt.offset().fix().local_minus_utc())
    }

    fn offset_on(year: i32, month: u32) -> Option<i32> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .and_then(Self::offset_secs)
    }
}

impl DaylightProbe for LocalDaylight {
    fn is_daylight(&self, at: NaiveDateTime) -> bool {
        let year = at.year();
        let (Some(january), Some(july), Some(now)) = (
            Self::offset_on(year, 1),
            Self::offset_on(year, 7),
            Self::offset_secs(at),
        ) else {
            return false;
        };
        january != july && now > january.min(july)
    }
}

/// Never in daylight time.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDaylight;

impl DaylightProbe for NoDaylight {
    fn is_daylight(&self, _at: NaiveDateTime) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_probes() {
        let summer = |at: NaiveDateTime| (4..=9).contains(&at.month());
        let june = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        assert!(summer.is_daylight(june));
        assert!(!NoDaylight.is_daylight(june));
    }

    #[test]
    fn local_probe_is_consistent_within_a_day() {
        // whatever the host zone, noon on two consecutive winter days agree
        let a = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 1, 11).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(LocalDaylight.is_daylight(a), LocalDaylight.is_daylight(b));
    }
}
