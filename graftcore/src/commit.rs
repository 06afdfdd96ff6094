use chrono::{
    FixedOffset,
    TimeZone as _,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt::{
    Display,
    Formatter,
    Result,
};

/// Seconds since the epoch along with the offset of the timezone the
/// time was recorded in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CommitTime {
    pub seconds: i64,
    pub offset_minutes: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CommitDescriptor {
    pub digest: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: CommitTime,
    pub message: String,
}

impl CommitTime {
    pub fn new(seconds: i64, offset_minutes: i32) -> Self {
        Self { seconds, offset_minutes }
    }

    /// The offset in the `+hhmm` form.
    pub fn offset_string(&self) -> String {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let minutes = self.offset_minutes.unsigned_abs();
        format!("{sign}{:02}{:02}", minutes / 60, minutes % 60)
    }

    pub fn to_rfc2822(&self) -> String {
        self.offset_minutes.checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .and_then(|tz| tz.timestamp_opt(self.seconds, 0).single())
            .map(|dt| dt.to_rfc2822())
            .unwrap_or_else(|| format!("{} {}", self.seconds, self.offset_string()))
    }
}

pub(crate) fn summary_of(message: &str) -> &str {
    message.lines()
        .next()
        .unwrap_or("")
        .trim_end()
}

impl CommitDescriptor {
    pub fn summary(&self) -> &str {
        summary_of(&self.message)
    }
}

impl Display for CommitDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "{} - {} <{}> - {}",
            &self.digest,
            &self.author_name,
            &self.author_email,
            self.summary(),
        )
    }
}
