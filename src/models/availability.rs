use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Daily wall-clock window within which meetings may be booked or suggested.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusinessHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl BusinessHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> anyhow::Result<Self> {
        if start >= end {
            return Err(anyhow::anyhow!(
                "business hours must start before they end ({start} - {end})"
            ));
        }
        Ok(Self { start, end })
    }

    /// Parses a pair of `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> anyhow::Result<Self> {
        Self::new(parse_time(start)?, parse_time(end)?)
    }

    /// Inclusive at both boundary instants.
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }

    pub fn to_human_readable(&self) -> String {
        format!(
            "{} - {}",
            self.start.format("%I:%M %p"),
            self.end.format("%I:%M %p")
        )
    }
}

pub fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("invalid time format: {s}"));
    }
    let hour: u32 = parts[0]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid hour in: {s}"))?;
    let minute: u32 = parts[1]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid minute in: {s}"))?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| anyhow::anyhow!("time out of range: {s}"))
}
