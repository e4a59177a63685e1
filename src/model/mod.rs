use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

mod config;
mod tag;

pub use config::{HistorianConfig, PlcConfig};
pub use tag::{DataType, RegisterTable, TagConfig};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Analog(f64),
    Boolean(bool),
}

impl Value {
    /// Storage encoding, booleans become 0/1.
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Analog(analog) => *analog,
            Value::Boolean(boolean) => {
                if *boolean {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn kind(&self) -> TagKind {
        match self {
            Value::Analog(_) => TagKind::Analog,
            Value::Boolean(_) => TagKind::Boolean,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Analog,
    Boolean,
}

impl TagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagKind::Analog => "analog",
            TagKind::Boolean => "boolean",
        }
    }

    pub fn from_db(raw: &str) -> Option<Self> {
        match raw {
            "analog" => Some(TagKind::Analog),
            "boolean" => Some(TagKind::Boolean),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TagReading {
    pub id: i64,
    pub tag_name: String,
    pub value: f64,
    pub timestamp: NaiveDateTime,
    pub kind: TagKind,
}

/// A single row of a range query.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

/// Tag description as it appears in the config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TagInfo {
    pub tag_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TagMetadata {
    #[serde(flatten)]
    pub info: TagInfo,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
