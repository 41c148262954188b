/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/

//! Conversion from the server's wire representation to `CanonicalMessage`.
//!
//! The backend sends snake_case keys and naive UTC timestamps with microsecond
//! precision. Subscribers get camelCase keys and absolute instants truncated to
//! milliseconds.

use crate::message::model::{CanonicalMessage, FieldValue, MessageKind};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::debug;

/// Date-valued fields converted by default.
pub const DEFAULT_DATE_FIELDS: [&str; 3] = ["created", "started", "finished"];

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Converts a delimited key (`deployment_id`, `in-progress`) to camelCase.
///
/// A key changes only if some run of `_`/`-` is directly followed by an ASCII letter
/// or digit. Such a key is lowercased, and each of those runs is dropped and the
/// following character uppercased. Any other run is kept, so converted keys are
/// returned unchanged when converted again.
pub fn camel_case_key(key: &str) -> Cow<'_, str> {
    if !has_joinable_delimiter(key) {
        return Cow::Borrowed(key);
    }

    let lowered = key.to_lowercase();
    let mut result = String::with_capacity(lowered.len());
    let mut run = String::new();
    for c in lowered.chars() {
        if is_delimiter(c) {
            run.push(c);
            continue;
        }
        if !run.is_empty() && c.is_ascii_alphanumeric() {
            result.push(c.to_ascii_uppercase());
        } else {
            result.push_str(&run);
            result.push(c);
        }
        run.clear();
    }
    result.push_str(&run);
    Cow::Owned(result)
}

fn is_delimiter(c: char) -> bool {
    c == '_' || c == '-'
}

fn has_joinable_delimiter(key: &str) -> bool {
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        if is_delimiter(c) && chars.peek().is_some_and(char::is_ascii_alphanumeric) {
            return true;
        }
    }
    false
}

/// Parses a server timestamp into an absolute instant.
///
/// Strings without a zone designator are taken as UTC. Precision is truncated to
/// milliseconds.
pub fn parse_utc_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc).trunc_subsecs(3));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc().trunc_subsecs(3))
}

/// Normalizes entity payloads. Pure; never mutates its input.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalizer {
    date_fields: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FIELDS)
    }
}

impl Normalizer {
    /// Creates a normalizer for the given date-valued field names.
    ///
    /// Names may be given in either convention; they are matched after key conversion.
    pub fn new<I, S>(date_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            date_fields: date_fields
                .into_iter()
                .map(|field| camel_case_key(field.as_ref()).into_owned())
                .collect(),
        }
    }

    pub fn date_fields(&self) -> &[String] {
        &self.date_fields
    }

    /// Normalizes a wire payload into a canonical message of the given kind.
    pub fn normalize(&self, kind: MessageKind, wire: &Map<String, Value>) -> CanonicalMessage {
        let fields = wire
            .iter()
            .map(|(key, value)| (key.as_str(), FieldValue::Json(value.clone())));
        CanonicalMessage::new(kind, self.normalize_fields(fields))
    }

    /// Applies normalization to an already canonical message.
    ///
    /// Camel keys and converted dates are left as they are, so this returns an equal message.
    pub fn renormalize(&self, message: &CanonicalMessage) -> CanonicalMessage {
        let fields = message
            .fields()
            .iter()
            .map(|(key, value)| (key.as_str(), value.clone()));
        CanonicalMessage::new(message.kind(), self.normalize_fields(fields))
    }

    fn normalize_fields<'a>(
        &self,
        fields: impl Iterator<Item = (&'a str, FieldValue)>,
    ) -> BTreeMap<String, FieldValue> {
        let mut normalized: BTreeMap<String, FieldValue> = fields
            .map(|(key, value)| (camel_case_key(key).into_owned(), value))
            .collect();

        for field in &self.date_fields {
            if let Some(value) = normalized.get_mut(field) {
                let raw = std::mem::replace(value, FieldValue::Json(Value::Null));
                *value = convert_date(field, raw);
            }
        }
        normalized
    }
}

/// Empty strings become `null`, like a missing date.
fn convert_date(field: &str, value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Json(Value::String(raw)) if raw.is_empty() => FieldValue::Json(Value::Null),
        FieldValue::Json(Value::String(raw)) => match parse_utc_timestamp(&raw) {
            Some(instant) => FieldValue::Timestamp(instant),
            None => {
                debug!("Leaving unparseable date in field '{}': {}", field, raw);
                FieldValue::Json(Value::String(raw))
            }
        },
        other => other,
    }
}
