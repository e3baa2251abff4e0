use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A device family's register layout.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlTable {
    /// X-series layout (XM430, XL430, XC330, ...), used unless configured otherwise
    #[default]
    #[serde(alias = "default")]
    XSeries,
    Xl320,
}

impl ControlTable {
    pub const ALL: [ControlTable; 2] = [ControlTable::XSeries, ControlTable::Xl320];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlTable::XSeries => "x_series",
            ControlTable::Xl320 => "xl320",
        }
    }
}

impl fmt::Display for ControlTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlTable {
    type Err = UnknownControlTable;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x_series" | "default" => Ok(ControlTable::XSeries),
            "xl320" => Ok(ControlTable::Xl320),
            other => Err(UnknownControlTable(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown control table: {0}")]
pub struct UnknownControlTable(pub String);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Info,
    Config,
    Control,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Info => "info",
            Category::Config => "config",
            Category::Control => "control",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access rules for one register. Writability and the torque rule follow from
/// the category alone.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub category: Category,
    pub writable: bool,
    pub requires_torque_off: bool,
    pub doc: &'static str,
}

impl ParamDescriptor {
    pub(crate) fn new(name: &'static str, category: Category, doc: &'static str) -> Self {
        Self {
            name,
            category,
            writable: category != Category::Info,
            requires_torque_off: category == Category::Config,
            doc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown parameter {name} for control table {table}")]
pub struct UnknownParam {
    pub table: ControlTable,
    pub name: String,
}

/// Registers polled for health telemetry. `current` is absent on families
/// without a current sensor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusRegisters {
    pub temperature: &'static str,
    pub voltage: &'static str,
    pub current: Option<&'static str>,
    pub hardware_error: &'static str,
}
