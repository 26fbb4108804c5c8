//! Request handlers and the query-string helpers they share

use std::collections::HashMap;
use std::str::FromStr;

use crate::{error::ApiError, validator::Validator};

pub mod items;
pub mod tokens;
pub mod users;

/// Decoded query string.
pub type QueryString = HashMap<String, String>;

/// Value of `key`, or `default` when absent or empty.
pub fn read_string(qs: &QueryString, key: &str, default: &str) -> String {
    match qs.get(key) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => default.to_string(),
    }
}

/// Comma-separated values of `key`, or `default` when absent or empty.
pub fn read_csv(qs: &QueryString, key: &str, default: Vec<String>) -> Vec<String> {
    match qs.get(key) {
        Some(value) if !value.is_empty() => value.split(',').map(String::from).collect(),
        _ => default,
    }
}

/// Integer value of `key`.
///
/// A value that is not an integer records an error against `key` and yields
/// `default`.
pub fn read_int(qs: &QueryString, key: &str, default: i64, v: &mut Validator) -> i64 {
    match qs.get(key) {
        Some(value) if !value.is_empty() => i64::from_str(value).unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
        _ => default,
    }
}

/// Path id as a positive integer; anything else is a 404.
pub fn read_id_param(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}
