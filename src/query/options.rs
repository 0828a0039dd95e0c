//! Strict decoding of the caller's free-form options bag into `QueryOptions`.

use bson::Bson;
use serde::Deserializer;
use serde::de::{self, Visitor};
use std::fmt;

use super::types::QueryOptions;
use crate::errors::DecodeError;

/// Decodes a dynamically typed options value.
///
/// `Null` decodes to the default options. Unknown keys and type mismatches are errors.
///
/// # Errors
/// Returns a `DecodeError` describing the first field that failed.
pub fn decode_options(raw: &Bson) -> Result<QueryOptions, DecodeError> {
    if matches!(raw, Bson::Null | Bson::Undefined) {
        return Ok(QueryOptions::default());
    }
    let opts: QueryOptions = bson::deserialize_from_bson(raw.clone())
        .map_err(|e| DecodeError::from_message(e.to_string()))?;
    log::debug!("decoded options: limit={} sort_keys={}", opts.limit, opts.sort.len());
    Ok(opts)
}

/// Decodes options from a JSON string. An empty string or `null` yields the defaults.
///
/// # Errors
/// Returns a `DecodeError` if the JSON is malformed or does not match the options schema.
pub fn decode_options_json(json: &str) -> Result<QueryOptions, DecodeError> {
    let trimmed = json.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(QueryOptions::default());
    }
    let opts: QueryOptions =
        serde_json::from_str(trimmed).map_err(|e| DecodeError::from_message(e.to_string()))?;
    log::debug!("decoded options: limit={} sort_keys={}", opts.limit, opts.sort.len());
    Ok(opts)
}

/// Accepts a non-negative integer, or a float with no fractional part (scripting hosts send
/// numbers as doubles).
pub(crate) fn deserialize_limit<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct LimitVisitor;

    impl Visitor<'_> for LimitVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative integer")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
        }

        fn visit_i32<E: de::Error>(self, v: i32) -> Result<u64, E> {
            self.visit_i64(i64::from(v))
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u64, E> {
            if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 {
                Ok(v as u64)
            } else {
                Err(E::invalid_value(de::Unexpected::Float(v), &self))
            }
        }
    }

    deserializer.deserialize_any(LimitVisitor)
}
