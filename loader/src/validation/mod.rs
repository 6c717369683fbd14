//! JSON Schema validation of outgoing records.
//!
//! Records are checked against the shapes the LCA data library expects before
//! anything is written. Schemas are embedded at compile time from `schemas/`:
//! - `flow-record.json`
//! - `characterization-entry.json`
//!
//! CAS registry numbers additionally get their check digit verified.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use cfload::validation::{is_valid_cas, validate_flow_record};
//!
//! assert!(is_valid_cas("7732-18-5"));
//! assert!(validate_flow_record(&json!({ "name": "Water" })).is_err());
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::models::{CharacterizationEntry, FlowRecord};

static FLOW_SCHEMA: Lazy<Result<Value, String>> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/flow-record.json"))
        .map_err(|e| format!("Invalid embedded flow schema: {e}"))
});

static ENTRY_SCHEMA: Lazy<Result<Value, String>> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/characterization-entry.json"))
        .map_err(|e| format!("Invalid embedded entry schema: {e}"))
});

static CAS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2,7})-(\d{2})-(\d)$").expect("valid CAS pattern"));

/// Validate `data` against a draft 7 JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every violation otherwise
///
/// # Example
/// ```ignore
/// use serde_json::json;
/// use cfload::validation::validate;
///
/// let schema = json!({
///     "type": "object",
///     "required": ["name"],
///     "properties": { "name": { "type": "string" } }
/// });
///
/// assert!(validate(&schema, &json!({ "name": "CO2" })).is_ok());
/// assert!(validate(&schema, &json!({ "unit": "kg" })).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator =
        jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {e}")])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick true/false check.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Whether `cas` is a well-formed CAS registry number with a correct check digit.
///
/// The check digit is the sum of the other digits, weighted 1, 2, 3, ... from
/// the right, modulo 10.
pub fn is_valid_cas(cas: &str) -> bool {
    let Some(caps) = CAS_PATTERN.captures(cas.trim()) else {
        return false;
    };

    let body = format!("{}{}", &caps[1], &caps[2]);
    let sum: u32 = body
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| (i as u32 + 1) * u32::from(b - b'0'))
        .sum();

    caps[3]
        .bytes()
        .next()
        .is_some_and(|check| u32::from(check - b'0') == sum % 10)
}

/// Validate one serialized flow record.
pub fn validate_flow_record(data: &Value) -> Result<(), Vec<String>> {
    let schema = FLOW_SCHEMA.as_ref().map_err(|e| vec![e.clone()])?;
    let mut errors = validate(schema, data).err().unwrap_or_default();

    if let Some(cas) = data.get("CAS number").and_then(Value::as_str) {
        if !cas.is_empty() && CAS_PATTERN.is_match(cas) && !is_valid_cas(cas) {
            errors.push(format!("CAS number '{cas}' has a wrong check digit"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate one serialized characterization entry.
pub fn validate_characterization_entry(data: &Value) -> Result<(), Vec<String>> {
    let schema = ENTRY_SCHEMA.as_ref().map_err(|e| vec![e.clone()])?;
    validate(schema, data)
}

/// Validate flows; returns `(index, errors)` for every invalid record.
pub fn validate_flows(flows: &[FlowRecord]) -> Vec<(usize, Vec<String>)> {
    validate_all(flows, validate_flow_record)
}

/// Validate entries; returns `(index, errors)` for every invalid record.
pub fn validate_factors(entries: &[CharacterizationEntry]) -> Vec<(usize, Vec<String>)> {
    validate_all(entries, validate_characterization_entry)
}

fn validate_all<T, F>(records: &[T], check: F) -> Vec<(usize, Vec<String>)>
where
    T: Serialize,
    F: Fn(&Value) -> Result<(), Vec<String>>,
{
    records
        .iter()
        .enumerate()
        .filter_map(|(i, record)| {
            let result = serde_json::to_value(record)
                .map_err(|e| vec![format!("Cannot serialize record: {e}")])
                .and_then(|value| check(&value));
            result.err().map(|errors| (i, errors))
        })
        .collect()
}
