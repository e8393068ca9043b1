use std::collections::BTreeMap;

/// A single logged leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Numbers(Vec<f64>),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Numbers(_) => None,
        }
    }

    pub fn as_numbers(&self) -> Option<&[f64]> {
        match self {
            FieldValue::Numbers(v) => Some(v),
            FieldValue::Number(_) => None,
        }
    }

    /// Equality on the raw bit patterns. Unlike `==`, a NaN equals an
    /// identically encoded NaN and `0.0` differs from `-0.0`.
    pub fn bit_eq(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Number(a), FieldValue::Number(b)) => a.to_bits() == b.to_bits(),
            (FieldValue::Numbers(a), FieldValue::Numbers(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            _ => false,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<Vec<f64>> for FieldValue {
    fn from(v: Vec<f64>) -> Self {
        FieldValue::Numbers(v)
    }
}

impl From<&[f64]> for FieldValue {
    fn from(v: &[f64]) -> Self {
        FieldValue::Numbers(v.to_vec())
    }
}

/// One subsystem's inputs for one cycle, keyed by field name.
///
/// Fields iterate in name order so that encoding is stable across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSnapshot {
    fields: BTreeMap<String, FieldValue>,
}

impl InputSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_number)
    }

    pub fn numbers(&self, name: &str) -> Option<&[f64]> {
        self.get(name).and_then(FieldValue::as_numbers)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn bit_eq(&self, other: &InputSnapshot) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|((ka, va), (kb, vb))| ka == kb && va.bit_eq(vb))
    }
}

impl FromIterator<(String, FieldValue)> for InputSnapshot {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Command sent towards a subsystem's actuators. Same shape as a snapshot:
/// named numeric outputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Actuation {
    outputs: BTreeMap<String, FieldValue>,
}

impl Actuation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.outputs.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.outputs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.outputs.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_eq_distinguishes_signed_zero() {
        let a = FieldValue::Number(0.0);
        let b = FieldValue::Number(-0.0);
        assert_eq!(a, b);
        assert!(!a.bit_eq(&b));
    }

    #[test]
    fn test_bit_eq_matches_nan() {
        let a = InputSnapshot::new().with("x", f64::NAN);
        let b = InputSnapshot::new().with("x", f64::NAN);
        assert_ne!(a, b);
        assert!(a.bit_eq(&b));
    }

    #[test]
    fn test_accessors() {
        let snap = InputSnapshot::new()
            .with("angle", 1.25)
            .with("currents", vec![3.0, 4.5]);
        assert_eq!(snap.number("angle"), Some(1.25));
        assert_eq!(snap.numbers("currents"), Some(&[3.0, 4.5][..]));
        assert_eq!(snap.number("currents"), None);
        assert_eq!(snap.len(), 2);
    }
}
