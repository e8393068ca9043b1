//! On-disk encoding of the input log: one JSON object per line.
//!
//! ```text
//! {"kind":"header","schema_version":"1.0.0","run_id":"…","mode":"real"}
//! {"kind":"cycle","cycle":1,"timestamp_us":20000}
//! {"kind":"record","cycle":1,"subsystem":"Arm","fields":{"angle":{"number":0.5}}}
//! ```
//!
//! Finite numbers use shortest round-trip formatting. NaN and infinities are
//! written as the strings "NaN", "inf" and "-inf".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::io::snapshot::{FieldValue, InputSnapshot};
use crate::kernel::mode::OperatingMode;
use crate::kernel::time::CycleNumber;

pub const LOG_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogHeader {
    pub schema_version: String,
    pub run_id: Uuid,
    pub mode: OperatingMode,
}

impl LogHeader {
    pub fn new(mode: OperatingMode) -> Self {
        Self {
            schema_version: LOG_SCHEMA_VERSION.to_string(),
            run_id: Uuid::new_v4(),
            mode,
        }
    }
}

/// Persisted (cycle, subsystem, snapshot) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub cycle: CycleNumber,
    pub subsystem: String,
    pub snapshot: InputSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum LogLine {
    Header(LogHeader),
    Cycle {
        cycle: CycleNumber,
        timestamp_us: u64,
    },
    Record {
        cycle: CycleNumber,
        subsystem: String,
        fields: BTreeMap<String, WireValue>,
    },
}

impl LogLine {
    pub(crate) fn record(record: &LogRecord) -> Self {
        LogLine::Record {
            cycle: record.cycle,
            subsystem: record.subsystem.clone(),
            fields: record
                .snapshot
                .iter()
                .map(|(name, value)| (name.to_string(), WireValue::from(value)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum WireValue {
    Number(WireNumber),
    Numbers(Vec<WireNumber>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireNumber {
    Finite(f64),
    Special(String),
}

impl From<f64> for WireNumber {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            WireNumber::Finite(v)
        } else if v.is_nan() {
            WireNumber::Special("NaN".to_string())
        } else if v > 0.0 {
            WireNumber::Special("inf".to_string())
        } else {
            WireNumber::Special("-inf".to_string())
        }
    }
}

impl TryFrom<&WireNumber> for f64 {
    type Error = String;

    fn try_from(n: &WireNumber) -> Result<Self, Self::Error> {
        match n {
            WireNumber::Finite(v) => Ok(*v),
            WireNumber::Special(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(format!("unrecognized number literal {other:?}")),
            },
        }
    }
}

impl From<&FieldValue> for WireValue {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Number(v) => WireValue::Number(WireNumber::from(*v)),
            FieldValue::Numbers(vs) => {
                WireValue::Numbers(vs.iter().copied().map(WireNumber::from).collect())
            }
        }
    }
}

impl TryFrom<&WireValue> for FieldValue {
    type Error = String;

    fn try_from(value: &WireValue) -> Result<Self, Self::Error> {
        match value {
            WireValue::Number(n) => Ok(FieldValue::Number(f64::try_from(n)?)),
            WireValue::Numbers(ns) => ns
                .iter()
                .map(f64::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::Numbers),
        }
    }
}

pub(crate) fn decode_fields(fields: &BTreeMap<String, WireValue>) -> Result<InputSnapshot, String> {
    fields
        .iter()
        .map(|(name, wire)| FieldValue::try_from(wire).map(|v| (name.clone(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_line_shape() {
        let record = LogRecord {
            cycle: CycleNumber(3),
            subsystem: "Arm".to_string(),
            snapshot: InputSnapshot::new().with("angle", 0.5),
        };
        let line = serde_json::to_string(&LogLine::record(&record)).unwrap();
        assert_eq!(
            line,
            r#"{"kind":"record","cycle":3,"subsystem":"Arm","fields":{"angle":{"number":0.5}}}"#
        );
    }

    #[test]
    fn test_special_values_survive_encoding() {
        let snap = InputSnapshot::new()
            .with("nan", f64::NAN)
            .with("edges", vec![f64::INFINITY, f64::NEG_INFINITY, -0.0]);
        let record = LogRecord {
            cycle: CycleNumber(1),
            subsystem: "S".to_string(),
            snapshot: snap.clone(),
        };
        let text = serde_json::to_string(&LogLine::record(&record)).unwrap();
        let LogLine::Record { fields, .. } = serde_json::from_str::<LogLine>(&text).unwrap() else {
            panic!("expected a record line");
        };
        assert!(decode_fields(&fields).unwrap().bit_eq(&snap));
    }

    #[test]
    fn test_awkward_floats_are_exact() {
        let values = vec![0.1, 1.0 / 3.0, 2.2250738585072014e-308, 1.7976931348623157e308, 5e-324];
        let wire = WireValue::from(&FieldValue::Numbers(values.clone()));
        let text = serde_json::to_string(&wire).unwrap();
        let back: WireValue = serde_json::from_str(&text).unwrap();
        assert!(FieldValue::try_from(&back).unwrap().bit_eq(&FieldValue::Numbers(values)));
    }

    #[test]
    fn test_unknown_literal_is_rejected() {
        let wire: WireValue = serde_json::from_str(r#"{"number":"huge"}"#).unwrap();
        assert!(FieldValue::try_from(&wire).is_err());
    }
}
