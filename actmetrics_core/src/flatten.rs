/**
 * The flattener — pure transformation from a nested `Event` to a flat,
 * string-keyed map of `FlatValue` scalars.
 *
 * Contract (spec §4.1):
 * - numbers and strings pass through unchanged; strings longer than the
 *   configured limit are truncated and suffixed with `"..."`.
 * - booleans become `1` / `0`.
 * - big integers stringify.
 * - `null` is dropped silently.
 * - nested maps recurse with key prefix `"<parent>_"`.
 * - a coerced error becomes `{name, message, code, ...extra}`, recursed
 *   like any other nested map (stack trace deliberately omitted).
 * - an ordered sequence of integers collapses to `{mean: average}`; any
 *   other sequence (or set) collapses to `{item: first}`.
 * - a function/opaque value fails the whole flatten with
 *   `FlattenError::UnsupportedProperty`.
 *
 * Deterministic, idempotent, no I/O. The only observable side effect is
 * the error it can return.
 */
use std::collections::BTreeMap;

use thiserror::Error;

use crate::types::{ErrorValue, EventValue, FlatValue};

#[derive(Debug, Error, PartialEq)]
pub enum FlattenError {
    /// Raised when a value's underlying kind is a function or other
    /// opaque, non-serializable handle. Carries the dotted key path at
    /// which the unsupported value was found.
    #[error("unsupported property at `{key}`: value cannot be flattened")]
    UnsupportedProperty { key: String },
}

/// Truncation limits used while flattening. Built from the environment
/// at `Agent` construction time (`NEW_RELIC_ERROR_METRIC_MAX_STRING_LENGTH`)
/// and threaded through explicitly rather than read from a global, so
/// `flatten_event` stays pure and independently testable.
#[derive(Debug, Clone, Copy)]
pub struct FlattenConfig {
    pub max_string_length: usize,
    pub error_max_string_length: usize,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            max_string_length: crate::constants::DEFAULT_MAX_STRING_LENGTH,
            error_max_string_length: crate::constants::DEFAULT_ERROR_METRIC_MAX_STRING_LENGTH,
        }
    }
}

/// Flattens a whole event (a string-keyed map of `EventValue`) into the
/// wire-ready `{string: FlatValue}` shape.
pub fn flatten_event(
    event: &BTreeMap<String, EventValue>,
    cfg: &FlattenConfig,
) -> Result<BTreeMap<String, FlatValue>, FlattenError> {
    let mut out = BTreeMap::new();
    for (key, value) in event {
        flatten_into(key, value, &mut out, cfg)?;
    }
    Ok(out)
}

fn flatten_into(
    prefix: &str,
    value: &EventValue,
    out: &mut BTreeMap<String, FlatValue>,
    cfg: &FlattenConfig,
) -> Result<(), FlattenError> {
    match value {
        EventValue::Null => {
            // Dropped silently.
        }
        EventValue::Bool(b) => {
            out.insert(prefix.to_string(), FlatValue::Number(if *b { 1.0 } else { 0.0 }));
        }
        EventValue::Int(i) => {
            out.insert(prefix.to_string(), FlatValue::Number(*i as f64));
        }
        EventValue::UInt(u) => {
            out.insert(prefix.to_string(), FlatValue::Number(*u as f64));
        }
        EventValue::Float(f) => {
            // NaN/Infinity cannot round-trip through JSON; drop them
            // rather than emit a value the ingest endpoint would reject.
            if f.is_finite() {
                out.insert(prefix.to_string(), FlatValue::Number(*f));
            }
        }
        EventValue::BigInt(v) => {
            out.insert(prefix.to_string(), FlatValue::Text(v.to_string()));
        }
        EventValue::Str(s) => {
            out.insert(prefix.to_string(), FlatValue::Text(truncate(prefix, s, cfg)));
        }
        EventValue::Map(map) => {
            for (child_key, child_value) in map {
                let child_prefix = format!("{prefix}_{child_key}");
                flatten_into(&child_prefix, child_value, out, cfg)?;
            }
        }
        EventValue::Error(err) => {
            flatten_into(prefix, &error_to_map(err), out, cfg)?;
        }
        EventValue::Seq(items) | EventValue::Set(items) => {
            collapse_sequence(prefix, items, out, cfg)?;
        }
        EventValue::Unsupported => {
            return Err(FlattenError::UnsupportedProperty {
                key: prefix.to_string(),
            });
        }
    }
    Ok(())
}

/// Converts a coerced error into the nested-map shape
/// `{name, message, code, ...extra}` so it flattens via the ordinary
/// map-recursion path.
fn error_to_map(err: &ErrorValue) -> EventValue {
    let mut map = BTreeMap::new();
    map.insert("name".to_string(), EventValue::Str(err.name.clone()));
    map.insert("message".to_string(), EventValue::Str(err.message.clone()));
    if let Some(code) = err.code {
        map.insert("code".to_string(), EventValue::Int(code));
    }
    for (k, v) in &err.extra {
        map.entry(k.clone()).or_insert_with(|| v.clone());
    }
    EventValue::Map(map)
}

/// Sequence/set collapse rule: an ordered sequence of integers becomes
/// `{mean: average}`; anything else becomes `{item: first}`.
fn collapse_sequence(
    prefix: &str,
    items: &[EventValue],
    out: &mut BTreeMap<String, FlatValue>,
    cfg: &FlattenConfig,
) -> Result<(), FlattenError> {
    if !items.is_empty() && items.iter().all(is_integer) {
        let sum: f64 = items.iter().map(integer_as_f64).sum();
        let mean = sum / items.len() as f64;
        out.insert(format!("{prefix}_mean"), FlatValue::Number(mean));
        return Ok(());
    }

    if let Some(first) = items.first() {
        let item_prefix = format!("{prefix}_item");
        flatten_into(&item_prefix, first, out, cfg)?;
    }
    Ok(())
}

fn is_integer(v: &EventValue) -> bool {
    matches!(v, EventValue::Int(_) | EventValue::UInt(_) | EventValue::BigInt(_))
}

fn integer_as_f64(v: &EventValue) -> f64 {
    match v {
        EventValue::Int(i) => *i as f64,
        EventValue::UInt(u) => *u as f64,
        EventValue::BigInt(b) => *b as f64,
        _ => 0.0,
    }
}

/// Truncates a string to the limit appropriate for its key name,
/// appending `"..."` when truncation actually occurred.
fn truncate(key: &str, s: &str, cfg: &FlattenConfig) -> String {
    let limit = if crate::constants::ERROR_TRUNCATION_KEYS.contains(&key) {
        cfg.error_max_string_length
    } else {
        cfg.max_string_length
    };

    if s.chars().count() <= limit {
        return s.to_string();
    }

    let truncated: String = s.chars().take(limit).collect();
    format!("{truncated}{}", crate::constants::TRUNCATION_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> FlattenConfig {
        FlattenConfig::default()
    }

    #[test]
    fn passes_through_numbers_and_short_strings() {
        let mut event = BTreeMap::new();
        event.insert("count".to_string(), EventValue::Int(42));
        event.insert("label".to_string(), EventValue::Str("ok".to_string()));

        let flat = flatten_event(&event, &cfg()).unwrap();
        assert_eq!(flat["count"], FlatValue::Number(42.0));
        assert_eq!(flat["label"], FlatValue::Text("ok".to_string()));
    }

    #[test]
    fn booleans_become_one_or_zero() {
        let mut event = BTreeMap::new();
        event.insert("ok".to_string(), EventValue::Bool(true));
        event.insert("bad".to_string(), EventValue::Bool(false));

        let flat = flatten_event(&event, &cfg()).unwrap();
        assert_eq!(flat["ok"], FlatValue::Number(1.0));
        assert_eq!(flat["bad"], FlatValue::Number(0.0));
    }

    #[test]
    fn big_integers_stringify() {
        let mut event = BTreeMap::new();
        event.insert("huge".to_string(), EventValue::BigInt(170_141_183_460_469_231_731_687_303_715_884_105_727));

        let flat = flatten_event(&event, &cfg()).unwrap();
        assert_eq!(
            flat["huge"],
            FlatValue::Text("170141183460469231731687303715884105727".to_string())
        );
    }

    #[test]
    fn null_is_dropped_silently() {
        let mut event = BTreeMap::new();
        event.insert("present".to_string(), EventValue::Int(1));
        event.insert("absent".to_string(), EventValue::Null);

        let flat = flatten_event(&event, &cfg()).unwrap();
        assert_eq!(flat.len(), 1);
        assert!(!flat.contains_key("absent"));
    }

    #[test]
    fn nested_maps_recurse_with_underscore_prefix() {
        let mut inner = BTreeMap::new();
        inner.insert("id".to_string(), EventValue::Int(7));
        let mut event = BTreeMap::new();
        event.insert("user".to_string(), EventValue::Map(inner));

        let flat = flatten_event(&event, &cfg()).unwrap();
        assert_eq!(flat["user_id"], FlatValue::Number(7.0));
    }

    #[test]
    fn errors_coerce_to_name_message_code() {
        let err = ErrorValue::new("TypeError", "boom").with_code(5);
        let mut event = BTreeMap::new();
        event.insert("error".to_string(), EventValue::Error(err));

        let flat = flatten_event(&event, &cfg()).unwrap();
        assert_eq!(flat["error_name"], FlatValue::Text("TypeError".to_string()));
        assert_eq!(
            flat["error_message"],
            FlatValue::Text("boom".to_string())
        );
        assert_eq!(flat["error_code"], FlatValue::Number(5.0));
    }

    #[test]
    fn ordered_integer_sequence_collapses_to_mean() {
        let mut event = BTreeMap::new();
        event.insert(
            "samples".to_string(),
            EventValue::Seq(vec![EventValue::Int(1), EventValue::Int(2), EventValue::Int(3)]),
        );

        let flat = flatten_event(&event, &cfg()).unwrap();
        assert_eq!(flat["samples_mean"], FlatValue::Number(2.0));
        assert!(!flat.contains_key("samples_item"));
    }

    #[test]
    fn non_integer_sequence_collapses_to_first_item() {
        let mut event = BTreeMap::new();
        event.insert(
            "labels".to_string(),
            EventValue::Seq(vec![EventValue::Str("a".to_string()), EventValue::Str("b".to_string())]),
        );

        let flat = flatten_event(&event, &cfg()).unwrap();
        assert_eq!(flat["labels_item"], FlatValue::Text("a".to_string()));
    }

    #[test]
    fn sets_follow_the_same_collapse_rule_as_sequences() {
        let mut event = BTreeMap::new();
        event.insert(
            "ids".to_string(),
            EventValue::Set(vec![EventValue::Int(10), EventValue::Int(20)]),
        );

        let flat = flatten_event(&event, &cfg()).unwrap();
        assert_eq!(flat["ids_mean"], FlatValue::Number(15.0));
    }

    #[test]
    fn unsupported_values_fail_the_whole_flatten() {
        let mut event = BTreeMap::new();
        event.insert("callback".to_string(), EventValue::Unsupported);

        let err = flatten_event(&event, &cfg()).unwrap_err();
        assert_eq!(
            err,
            FlattenError::UnsupportedProperty {
                key: "callback".to_string()
            }
        );
    }

    #[test]
    fn long_strings_truncate_with_ellipsis() {
        let mut event = BTreeMap::new();
        let long = "x".repeat(150);
        event.insert("blob".to_string(), EventValue::Str(long));

        let flat = flatten_event(&event, &cfg()).unwrap();
        match &flat["blob"] {
            FlatValue::Text(s) => {
                assert_eq!(s.len(), 100 + 3);
                assert!(s.ends_with("..."));
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn error_message_keys_use_the_longer_truncation_limit() {
        let mut event = BTreeMap::new();
        let long = "x".repeat(200);
        event.insert("message".to_string(), EventValue::Str(long.clone()));

        let flat = flatten_event(&event, &cfg()).unwrap();
        assert_eq!(flat["message"], FlatValue::Text(long));
    }
}
