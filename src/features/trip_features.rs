use super::feature_utils::{feature_kind, FEATURE_COUNT, FEATURE_NAMES};
use ndarray::Array2;
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeatureError {
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("missing field '{0}'")]
    Missing(&'static str),
    #[error("field '{field}': expected {expected}, found {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl FeatureError {
    /// Name of the offending field, if the error is tied to one.
    pub fn field(&self) -> Option<&'static str> {
        match *self {
            FeatureError::NotAnObject(_) => None,
            FeatureError::Missing(field) => Some(field),
            FeatureError::WrongType { field, .. } => Some(field),
            FeatureError::Invalid { field, .. } => Some(field),
        }
    }
}

/// One trip, decoded from a `/predict` body.
#[derive(Clone, Debug, PartialEq)]
pub struct TripFeatures {
    pub passenger_count: i64,
    pub trip_distance: f64,
    pub pickup_hour: i64,
    pub pickup_dow: i64,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
}

impl TripFeatures {
    /// Decodes a raw request body. Bodies that are empty or not JSON at all
    /// decode as an empty object, so they fail on the first missing field.
    pub fn from_body(body: &[u8]) -> Result<Self, FeatureError> {
        let value = serde_json::from_slice::<Value>(body).unwrap_or(Value::Null);
        Self::from_value(&value)
    }

    /// Decodes a JSON value. Empty-ish values (`null`, `false`, `0`, `""`,
    /// `[]`) stand for an empty object.
    pub fn from_value(value: &Value) -> Result<Self, FeatureError> {
        let empty = Map::new();
        let fields = match value {
            Value::Object(map) => map,
            other if is_blank(other) => &empty,
            other => return Err(FeatureError::NotAnObject(json_type(other))),
        };

        // struct literal fields evaluate in source order, so the first
        // failing column is the one reported
        Ok(TripFeatures {
            passenger_count: integer_at(fields, 0)?,
            trip_distance: real_at(fields, 1)?,
            pickup_hour: integer_at(fields, 2)?,
            pickup_dow: integer_at(fields, 3)?,
            pickup_lat: real_at(fields, 4)?,
            pickup_lng: real_at(fields, 5)?,
            dropoff_lat: real_at(fields, 6)?,
            dropoff_lng: real_at(fields, 7)?,
        })
    }

    pub fn to_row(&self) -> [f64; FEATURE_COUNT] {
        [
            self.passenger_count as f64,
            self.trip_distance,
            self.pickup_hour as f64,
            self.pickup_dow as f64,
            self.pickup_lat,
            self.pickup_lng,
            self.dropoff_lat,
            self.dropoff_lng,
        ]
    }

    /// Single-row matrix of shape `[1, FEATURE_COUNT]`.
    pub fn to_array(&self) -> Array2<f64> {
        ndarray::arr2(&[self.to_row()])
    }
}

/// `application/json` or any `application/*+json` media type. Bodies sent
/// with another content type are not decoded at all.
pub fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type.trim().to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn lookup<'a>(fields: &'a Map<String, Value>, position: usize) -> Result<&'a Value, FeatureError> {
    let name = FEATURE_NAMES[position];
    fields.get(name).ok_or(FeatureError::Missing(name))
}

fn wrong_type(position: usize, value: &Value) -> FeatureError {
    FeatureError::WrongType {
        field: FEATURE_NAMES[position],
        expected: feature_kind(position).as_str(),
        found: json_type(value),
    }
}

fn integer_at(fields: &Map<String, Value>, position: usize) -> Result<i64, FeatureError> {
    coerce_integer(position, lookup(fields, position)?)
}

fn real_at(fields: &Map<String, Value>, position: usize) -> Result<f64, FeatureError> {
    coerce_real(position, lookup(fields, position)?)
}

fn coerce_integer(position: usize, value: &Value) -> Result<i64, FeatureError> {
    let field = FEATURE_NAMES[position];
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(i),
            None => truncate(field, number_as_f64(field, n)?),
        },
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| FeatureError::Invalid {
            field,
            reason: format!("invalid literal for integer: '{s}'"),
        }),
        other => Err(wrong_type(position, other)),
    }
}

fn coerce_real(position: usize, value: &Value) -> Result<f64, FeatureError> {
    let field = FEATURE_NAMES[position];
    let real = match value {
        Value::Number(n) => number_as_f64(field, n)?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| FeatureError::Invalid {
                field,
                reason: format!("could not convert string to real: '{s}'"),
            })?,
        other => return Err(wrong_type(position, other)),
    };

    if !real.is_finite() {
        return Err(FeatureError::Invalid {
            field,
            reason: format!("{real} is not a finite number"),
        });
    }
    Ok(real)
}

fn number_as_f64(field: &'static str, n: &Number) -> Result<f64, FeatureError> {
    n.as_f64().ok_or_else(|| FeatureError::Invalid {
        field,
        reason: format!("{n} is not representable as a number"),
    })
}

fn truncate(field: &'static str, real: f64) -> Result<i64, FeatureError> {
    let truncated = real.trunc();
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
    if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
        Ok(truncated as i64)
    } else {
        Err(FeatureError::Invalid {
            field,
            reason: format!("{real} is out of range for an integer"),
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
