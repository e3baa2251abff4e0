use crate::TransportError;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Bus address of a servo. 0 is reserved and 254 is the broadcast address.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ServoId(u8);

impl ServoId {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 253;

    pub fn new(id: u8) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&id) {
            Some(Self(id))
        } else {
            None
        }
    }

    pub fn raw(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for ServoId {
    type Error = TransportError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::new(id).ok_or(TransportError::InvalidId(id))
    }
}

impl From<ServoId> for u8 {
    fn from(id: ServoId) -> Self {
        id.0
    }
}

impl fmt::Display for ServoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A register value in engineering units (degrees, volts, amps, flags).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Int(v) => Some(v as f64),
            Value::Float(v) => Some(v),
            Value::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            Value::Float(v) if v.fract() == 0.0 => Some(v as i64),
            _ => None,
        }
    }

    /// Flags may come back as 0/1 integers depending on the backend.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
        }
    }
}

impl FromStr for Value {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        match t {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            _ => {}
        }
        if let Ok(v) = t.parse::<i64>() {
            return Ok(Value::Int(v));
        }
        t.parse::<f64>()
            .map(Value::Float)
            .map_err(|_| TransportError::InvalidValue {
                param: String::new(),
                value: t.to_string(),
            })
    }
}

/// Identification returned by a ping.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PingInfo {
    pub id: ServoId,
    pub model_number: u16,
    pub firmware_version: u8,
}
