//! Author and committer lines of a commit.
//!
//! A line such as `author Jane Doe <jane@example.com> 1234567890 +0100` is split on
//! spaces. A token shaped `[+-]dddd` is the zone offset, a run of 9 to 11 digits is
//! the Unix timestamp, and everything else is rejoined as the name (which keeps the
//! `<email>` part). Every piece is optional; a line with none of them still parses.

use std::fmt::Display;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::warn;

use crate::errors::GitError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    /// Name and `<email>`, as written.
    pub name: String,
    /// Seconds since the Unix epoch, zero when absent.
    pub timestamp: i64,
    /// Zone offset in seconds east of UTC, zero when absent.
    pub offset: i32,
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.offset < 0 { '-' } else { '+' };
        let minutes = self.offset.unsigned_abs() / 60;
        write!(
            f,
            "{} {} {sign}{:02}{:02}",
            self.name,
            self.timestamp,
            minutes / 60,
            minutes % 60
        )
    }
}

impl Signature {
    /// Parse the part of an actor line after the `author ` / `committer ` keyword.
    pub fn parse(line: &str) -> Signature {
        let mut signature = Signature::default();
        let mut zone_seen = false;
        let mut timestamp_seen = false;
        let mut name = Vec::new();

        for token in line.split(' ').filter(|t| !t.is_empty()) {
            if !zone_seen && is_zone_token(token) {
                zone_seen = true;
                signature.offset = parse_zone_offset(token).unwrap_or_else(|e| {
                    warn!("{e}, using +0000");
                    0
                });
            } else if !timestamp_seen && is_timestamp_token(token) {
                timestamp_seen = true;
                signature.timestamp = token.parse().unwrap_or_default();
            } else {
                name.push(token);
            }
        }
        signature.name = name.join(" ");
        signature
    }

    /// Point in time with the signer's zone attached.
    pub fn time(&self) -> DateTime<FixedOffset> {
        let utc = DateTime::<Utc>::from_timestamp(self.timestamp, 0).unwrap_or_default();
        match FixedOffset::east_opt(self.offset) {
            Some(zone) => utc.with_timezone(&zone),
            None => utc.fixed_offset(),
        }
    }

    /// Seconds since the epoch as read on the signer's wall clock.
    pub fn local_timestamp(&self) -> i64 {
        self.timestamp + i64::from(self.offset)
    }

    /// Text between `<` and `>`, if present.
    pub fn email(&self) -> Option<&str> {
        let start = self.name.find('<')?;
        let end = self.name[start..].find('>')? + start;
        Some(&self.name[start + 1..end])
    }

    /// Name without the `<email>` part.
    pub fn display_name(&self) -> &str {
        match self.name.find('<') {
            Some(start) => self.name[..start].trim_end(),
            None => &self.name,
        }
    }
}

fn is_zone_token(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == 5
        && matches!(bytes[0], b'+' | b'-')
        && bytes[1..].iter().all(u8::is_ascii_digit)
}

fn is_timestamp_token(token: &str) -> bool {
    (9..=11).contains(&token.len()) && token.bytes().all(|b| b.is_ascii_digit())
}

/// Parse `±HHMM`, `±HH:MM` or `±HH` into seconds east of UTC.
pub fn parse_zone_offset(text: &str) -> Result<i32, GitError> {
    let invalid = || GitError::InvalidZoneOffset(text.to_string());
    let bytes = text.as_bytes();
    let sign = match bytes.first() {
        Some(b'+') => 1,
        Some(b'-') => -1,
        _ => return Err(invalid()),
    };
    let (hours, minutes) = match bytes.len() {
        5 => (&text[1..3], &text[3..5]),
        6 if bytes[3] == b':' => (&text[1..3], &text[4..6]),
        3 => (&text[1..3], "00"),
        _ => return Err(invalid()),
    };
    let digits = |s: &str| -> Result<i32, GitError> {
        if s.bytes().all(|b| b.is_ascii_digit()) {
            s.parse().map_err(|_| invalid())
        } else {
            Err(invalid())
        }
    };
    Ok(sign * (digits(hours)? * 3600 + digits(minutes)? * 60))
}
