#![forbid(unsafe_code)]

use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// Marker value used before the first successful synchronization.
pub const EPOCH_MARKER: &str = "2000-01-01T00:00:00";

/// A registry `last_modified` value, normalized to UTC without sub-second precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(PrimitiveDateTime);

impl Timestamp {
    /// Accepts RFC 3339 and the registry's unpadded form (`2011-9-18T18:31:29`).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
            let utc = parsed.to_offset(UtcOffset::UTC);
            return Some(Self(truncate(PrimitiveDateTime::new(utc.date(), utc.time()))));
        }

        let lenient = format_description!(
            "[year]-[month padding:none]-[day padding:none]T[hour padding:none]:[minute padding:none]:[second padding:none]"
        );
        let (local, offset) = split_offset(raw)?;
        let head = local
            .split('.')
            .next()
            .unwrap_or_default()
            .replacen(' ', "T", 1);
        let value = PrimitiveDateTime::parse(&head, lenient).ok()?;
        let utc = value.assume_offset(offset).to_offset(UtcOffset::UTC);
        Some(Self(truncate(PrimitiveDateTime::new(utc.date(), utc.time()))))
    }

    pub fn epoch() -> Self {
        Self::parse(EPOCH_MARKER).unwrap_or(Self(PrimitiveDateTime::new(Date::MIN, Time::MIDNIGHT)))
    }

    /// Zero-padded ISO-8601, the format persisted as the sync marker.
    pub fn to_marker(&self) -> String {
        let marker = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
        self.0
            .format(marker)
            .unwrap_or_else(|_| EPOCH_MARKER.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_marker())
    }
}

/// Splits a trailing `Z` or `±HH:MM` off the time part; no suffix means UTC.
fn split_offset(raw: &str) -> Option<(&str, UtcOffset)> {
    if let Some(local) = raw.strip_suffix(|c: char| c == 'Z' || c == 'z') {
        return Some((local, UtcOffset::UTC));
    }
    let Some(time_start) = raw.find(|c: char| c == 'T' || c == 't' || c == ' ') else {
        return Some((raw, UtcOffset::UTC));
    };
    match raw[time_start..].rfind(|c: char| c == '+' || c == '-') {
        Some(relative) => {
            let at = time_start + relative;
            let offset = UtcOffset::parse(
                &raw[at..],
                format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
            )
            .ok()?;
            Some((&raw[..at], offset))
        }
        None => Some((raw, UtcOffset::UTC)),
    }
}

fn truncate(value: PrimitiveDateTime) -> PrimitiveDateTime {
    value.replace_nanosecond(0).unwrap_or(value)
}
