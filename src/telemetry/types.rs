//! Core data types for the telemetry registry
//!
//! This module defines the values that flow from the decode boundary into the
//! registry:
//! - `Value`: a scalar or fixed-length vector reading
//! - `Sample`: one timestamped value on a channel
//! - `Reading` / `ReadingBatch`: a decoded ingestion payload
//! - `Registration`: a decoded bare registration (no channel data)

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::error::{RegistryError, RegistryResult};

/// Device supplied base name, unique per node
pub type NodeId = String;

/// Unix timestamp in milliseconds
pub type Timestamp = i64;

/// Current wall clock time in milliseconds
pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

/// A reading value
///
/// Serialized as a bare number or a bare array so dashboards can render it
/// without unwrapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Value {
    /// Shape of this value, used to pin a channel's layout
    pub fn shape(&self) -> ValueShape {
        match self {
            Value::Scalar(_) => ValueShape::Scalar,
            Value::Vector(v) => ValueShape::Vector(v.len()),
        }
    }

    /// Check that every component is a finite number
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Scalar(v) => v.is_finite(),
            Value::Vector(vs) => vs.iter().all(|v| v.is_finite()),
        }
    }

    /// Get the scalar value, if this is one
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Vector(_) => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{}", v),
            Value::Vector(vs) => {
                write!(f, "[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Layout shared by every sample of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "len", rename_all = "lowercase")]
pub enum ValueShape {
    Scalar,
    Vector(usize),
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueShape::Scalar => write!(f, "scalar"),
            ValueShape::Vector(len) => write!(f, "vector[{}]", len),
        }
    }
}

/// An immutable timestamped value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Arrival time in milliseconds
    pub timestamp: Timestamp,
    pub value: Value,
}

impl Sample {
    pub fn new(timestamp: Timestamp, value: impl Into<Value>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

/// One channel reading inside an ingestion batch
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Channel key, unique within the node (e.g. `s:temp`)
    pub channel: String,
    /// Unit as declared by the device; may be empty
    pub unit: String,
    pub value: Value,
}

impl Reading {
    pub fn new(channel: impl Into<String>, unit: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            channel: channel.into(),
            unit: unit.into(),
            value: value.into(),
        }
    }
}

/// A decoded ingestion payload: one node, one or more ordered readings
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingBatch {
    pub node_id: NodeId,
    pub source_address: String,
    pub readings: Vec<Reading>,
}

impl ReadingBatch {
    pub fn new(node_id: impl Into<NodeId>, source_address: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            source_address: source_address.into(),
            readings: Vec::new(),
        }
    }

    /// Builder method: append a reading
    pub fn reading(
        mut self,
        channel: impl Into<String>,
        unit: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.readings.push(Reading::new(channel, unit, value));
        self
    }

    /// Validate the batch on its own, without looking at any stored state.
    ///
    /// Returns the shape each channel key takes in this batch. A key that
    /// appears more than once must keep the same shape.
    pub fn validate(&self) -> RegistryResult<HashMap<&str, ValueShape>> {
        if self.node_id.trim().is_empty() {
            return Err(RegistryError::MalformedPayload(
                "missing base name".to_string(),
            ));
        }

        if self.readings.is_empty() {
            return Err(RegistryError::MalformedPayload(
                "reading list is empty".to_string(),
            ));
        }

        let mut shapes: HashMap<&str, ValueShape> = HashMap::new();
        for reading in &self.readings {
            if reading.channel.is_empty() {
                return Err(RegistryError::MalformedPayload(
                    "reading without channel name".to_string(),
                ));
            }

            if !reading.value.is_finite() {
                return Err(RegistryError::MalformedPayload(format!(
                    "non-finite value on channel '{}'",
                    reading.channel
                )));
            }

            let shape = reading.value.shape();
            if shape == ValueShape::Vector(0) {
                return Err(RegistryError::MalformedPayload(format!(
                    "empty vector on channel '{}'",
                    reading.channel
                )));
            }

            match shapes.get(reading.channel.as_str()) {
                Some(&expected) if expected != shape => {
                    return Err(RegistryError::ShapeMismatch {
                        channel: reading.channel.clone(),
                        expected,
                        found: shape,
                    });
                }
                Some(_) => {}
                None => {
                    shapes.insert(reading.channel.as_str(), shape);
                }
            }
        }

        Ok(shapes)
    }
}

/// A decoded bare registration: identity and capabilities, no channel data
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub node_id: NodeId,
    pub source_address: String,
    pub capabilities: Vec<String>,
}

impl Registration {
    pub fn new(
        node_id: impl Into<NodeId>,
        source_address: impl Into<String>,
        capabilities: Vec<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            source_address: source_address.into(),
            capabilities,
        }
    }

    pub fn validate(&self) -> RegistryResult<()> {
        if self.node_id.trim().is_empty() {
            return Err(RegistryError::MalformedPayload("missing node id".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_shape() {
        assert_eq!(Value::Scalar(1.0).shape(), ValueShape::Scalar);
        assert_eq!(
            Value::Vector(vec![1.0, 2.0, 3.0]).shape(),
            ValueShape::Vector(3)
        );
    }

    #[test]
    fn test_value_serializes_bare() {
        let json = serde_json::to_string(&Value::Scalar(21.5)).unwrap();
        assert_eq!(json, "21.5");

        let json = serde_json::to_string(&Value::Vector(vec![1.0, 2.5])).unwrap();
        assert_eq!(json, "[1.0,2.5]");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Scalar(3.5).to_string(), "3.5");
        assert_eq!(Value::Vector(vec![1.0, 2.0]).to_string(), "[1, 2]");
    }

    #[test]
    fn test_validate_ok() {
        let batch = ReadingBatch::new("urn:dev:x", "fd00::1")
            .reading("s:temp", "Cel", 21.5)
            .reading("s:acc", "g", vec![0.1, 0.2, 0.3]);
        let shapes = batch.validate().unwrap();
        assert_eq!(shapes["s:temp"], ValueShape::Scalar);
        assert_eq!(shapes["s:acc"], ValueShape::Vector(3));
    }

    #[test]
    fn test_validate_empty_readings() {
        let batch = ReadingBatch::new("urn:dev:x", "fd00::1");
        assert!(matches!(
            batch.validate(),
            Err(RegistryError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_validate_missing_base_name() {
        let batch = ReadingBatch::new("  ", "fd00::1").reading("s:temp", "Cel", 1.0);
        assert!(matches!(
            batch.validate(),
            Err(RegistryError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let batch = ReadingBatch::new("n", "a").reading("s:temp", "Cel", f64::NAN);
        assert!(batch.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_vector() {
        let batch = ReadingBatch::new("n", "a").reading("s:acc", "g", Vec::<f64>::new());
        assert!(batch.validate().is_err());
    }

    #[test]
    fn test_validate_conflicting_shapes_in_batch() {
        let batch = ReadingBatch::new("n", "a")
            .reading("s:acc", "g", vec![1.0, 2.0, 3.0])
            .reading("s:acc", "g", vec![1.0, 2.0]);
        match batch.validate() {
            Err(RegistryError::ShapeMismatch {
                channel,
                expected,
                found,
            }) => {
                assert_eq!(channel, "s:acc");
                assert_eq!(expected, ValueShape::Vector(3));
                assert_eq!(found, ValueShape::Vector(2));
            }
            other => panic!("Expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_registration_validate() {
        assert!(Registration::new("node-1", "fd00::1", vec![]).validate().is_ok());
        assert!(Registration::new("", "fd00::1", vec![]).validate().is_err());
    }
}
