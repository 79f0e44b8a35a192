use anyhow::{Result, anyhow};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use chrono_tz::Tz;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock zone used to turn a note's modification time into its entry timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteClock {
    Local,
    Zone(Tz),
}

impl NoteClock {
    pub fn from_name(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        trimmed
            .parse::<Tz>()
            .map(Self::Zone)
            .map_err(|err| anyhow!("unknown timezone `{trimmed}`: {err}"))
    }

    pub fn label(&self) -> String {
        match self {
            Self::Local => "local".to_string(),
            Self::Zone(tz) => tz.name().to_string(),
        }
    }

    pub fn wall_time(&self, epoch_secs: i64) -> NaiveDateTime {
        let utc = DateTime::<Utc>::from_timestamp(epoch_secs, 0).unwrap_or_default();
        match self {
            Self::Local => utc.with_timezone(&Local).naive_local(),
            Self::Zone(tz) => utc.with_timezone(tz).naive_local(),
        }
    }

    pub fn wall_time_of(&self, modified: SystemTime) -> NaiveDateTime {
        let secs = modified
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.wall_time(i64::try_from(secs).unwrap_or(i64::MAX))
    }
}
