// Recurring snapshot schedule for the systemd timer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How often the timer fires
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimerSchedule {
    Hourly,
    #[default]
    Daily,
    Weekly,
}

impl TimerSchedule {
    pub fn as_str(&self) -> &str {
        match self {
            TimerSchedule::Hourly => "hourly",
            TimerSchedule::Daily => "daily",
            TimerSchedule::Weekly => "weekly",
        }
    }

    /// Value for the `OnCalendar=` key of the timer unit
    ///
    /// All three schedules map onto systemd's built-in calendar shorthands.
    pub fn on_calendar(&self) -> &'static str {
        match self {
            TimerSchedule::Hourly => "hourly",
            TimerSchedule::Daily => "daily",
            TimerSchedule::Weekly => "weekly",
        }
    }
}

impl fmt::Display for TimerSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerSchedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(TimerSchedule::Hourly),
            "daily" => Ok(TimerSchedule::Daily),
            "weekly" => Ok(TimerSchedule::Weekly),
            other => Err(format!(
                "Unknown schedule '{}'. Expected hourly, daily or weekly",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_calendar() {
        assert_eq!(TimerSchedule::Hourly.on_calendar(), "hourly");
        assert_eq!(TimerSchedule::Daily.on_calendar(), "daily");
        assert_eq!(TimerSchedule::Weekly.on_calendar(), "weekly");
        assert_eq!(TimerSchedule::default(), TimerSchedule::Daily);
    }

    #[test]
    fn test_parse_schedule() {
        assert_eq!("Weekly".parse::<TimerSchedule>(), Ok(TimerSchedule::Weekly));
        assert_eq!(" hourly ".parse::<TimerSchedule>(), Ok(TimerSchedule::Hourly));
        assert!("monthly".parse::<TimerSchedule>().is_err());
    }
}
