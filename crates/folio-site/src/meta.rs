//! Front matter interpretation.
//!
//! Records carry raw front matter as JSON values. This module reads the
//! handful of keys the page model itself depends on. Dates are parsed lazily
//! (see the `dates` cell) so that a malformed date fails one item's
//! navigation data instead of the whole build.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use folio_storage::Metadata;
use serde_json::Value;

/// Front matter value that can't be interpreted.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field} {value}: {reason}")]
pub struct MetaError {
    /// Front matter key.
    pub field: String,
    /// Offending value, as JSON.
    pub value: String,
    /// What was expected.
    pub reason: &'static str,
}

impl MetaError {
    fn new(field: &str, value: &Value, reason: &'static str) -> Self {
        Self {
            field: field.to_owned(),
            value: value.to_string(),
            reason,
        }
    }
}

/// Publishing dates of an item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dates {
    /// Content date (`date`).
    pub date: Option<DateTime<Utc>>,
    /// Last modification (`lastmod`, falling back to the git commit date, then `date`).
    pub lastmod: Option<DateTime<Utc>>,
    /// Publication date (`publish_date`, falling back to `date`).
    pub publish_date: Option<DateTime<Utc>>,
    /// Expiry date (`expiry_date`).
    pub expiry_date: Option<DateTime<Utc>>,
}

impl Dates {
    /// Parse the date keys of `metadata`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError`] for dates that are not strings in RFC 3339,
    /// `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD` form.
    pub fn from_metadata(metadata: &Metadata, git_date: Option<&str>) -> Result<Self, MetaError> {
        let date = date_field(metadata, "date")?;
        let publish_date = date_field(metadata, "publish_date")?.or(date);
        let git = git_date
            .map(|d| parse_date("git.date", &Value::String(d.to_owned())))
            .transpose()?;
        let lastmod = date_field(metadata, "lastmod")?.or(git).or(date);
        let expiry_date = date_field(metadata, "expiry_date")?;
        Ok(Self {
            date,
            lastmod,
            publish_date,
            expiry_date,
        })
    }

    /// Whether the item is scheduled after `now`.
    #[must_use]
    pub fn is_future(&self, now: DateTime<Utc>) -> bool {
        self.publish_date.is_some_and(|d| d > now)
    }

    /// Whether the item expired at or before `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.is_some_and(|d| d <= now)
    }
}

fn date_field(metadata: &Metadata, field: &str) -> Result<Option<DateTime<Utc>>, MetaError> {
    match metadata.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_date(field, value).map(Some),
    }
}

fn parse_date(field: &str, value: &Value) -> Result<DateTime<Utc>, MetaError> {
    let Some(text) = value.as_str() else {
        return Err(MetaError::new(field, value, "expected a date string"));
    };
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        && let Some(dt) = d.and_hms_opt(0, 0, 0)
    {
        return Ok(dt.and_utc());
    }
    Err(MetaError::new(field, value, "unrecognized date format"))
}

/// String value of `key`.
pub(crate) fn str_field<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(Value::as_str)
}

/// Integer `weight`, 0 when absent or not an integer.
pub(crate) fn weight(metadata: &Metadata) -> i64 {
    metadata.get("weight").and_then(Value::as_i64).unwrap_or(0)
}

/// `draft: true`.
pub(crate) fn is_draft(metadata: &Metadata) -> bool {
    metadata.get("draft").and_then(Value::as_bool).unwrap_or(false)
}

/// Display title: front matter `title`, else the last path segment.
pub(crate) fn title(metadata: &Metadata, path: &str) -> String {
    str_field(metadata, "title").map_or_else(
        || path.rsplit('/').next().unwrap_or_default().to_owned(),
        str::to_owned,
    )
}
