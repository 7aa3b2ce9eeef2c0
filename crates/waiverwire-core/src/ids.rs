// Typed identifiers and SQLite conversions shared by the domain types.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map($name)
            }
        }
    };
}

row_id!(
    /// Primary key of a waiver claim.
    ClaimId
);
row_id!(
    /// Fantasy team identifier.
    TeamId
);
row_id!(
    /// Player identifier.
    PlayerId
);

/// Decode a TEXT column into a closed enum, failing loudly on unknown values.
pub(crate) fn text_enum<T>(
    value: ValueRef<'_>,
    what: &str,
    parse: fn(&str) -> Option<T>,
) -> FromSqlResult<T> {
    let s = value.as_str()?;
    parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown {what} `{s}`").into()))
}

/// Canonical timestamp encoding: RFC 3339, UTC, millisecond precision.
///
/// Fixed width, so lexicographic order in SQL equals chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_round_trip_at_millisecond_precision() {
        let ts = Utc.with_ymd_and_hms(2025, 9, 14, 17, 30, 5).unwrap()
            + chrono::Duration::milliseconds(42);
        let text = format_timestamp(&ts);
        assert_eq!(text, "2025-09-14T17:30:05.042Z");
        assert_eq!(parse_timestamp(&text).unwrap(), ts);
    }

    #[test]
    fn ids_display_as_bare_numbers() {
        assert_eq!(ClaimId(17).to_string(), "17");
        assert_eq!(serde_json::to_string(&TeamId(4)).unwrap(), "4");
    }
}
