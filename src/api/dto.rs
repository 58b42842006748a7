//! Data Transfer Objects
//!
//! Request and response types for the API endpoints, plus decoding of the
//! device payloads into registry batches.

use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::telemetry::{Reading, ReadingBatch, Registration, Value};

// ============================================
// DEVICE DTOs
// ============================================

/// One element of a SenML pack.
///
/// The first element carries the base name (`bn`) and optionally a reading
/// of its own; the rest carry readings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenmlRecord {
    /// Base name: the node id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bn: Option<String>,
    /// Channel key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// Unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u: Option<String>,
    /// Value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<SenmlValue>,
}

/// A reading value: one number or a list of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SenmlValue {
    One(SenmlScalar),
    Many(Vec<SenmlScalar>),
}

/// A number, possibly sent as text (`"21.50"`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SenmlScalar {
    Number(f64),
    Text(String),
}

impl SenmlScalar {
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            SenmlScalar::Number(n) => *n,
            SenmlScalar::Text(s) => s.trim().parse().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl SenmlValue {
    pub fn to_value(&self) -> Option<Value> {
        match self {
            SenmlValue::One(scalar) => scalar.as_f64().map(Value::Scalar),
            SenmlValue::Many(items) => items
                .iter()
                .map(SenmlScalar::as_f64)
                .collect::<Option<Vec<_>>>()
                .map(Value::Vector),
        }
    }
}

impl From<Value> for SenmlValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Scalar(v) => SenmlValue::One(SenmlScalar::Number(v)),
            Value::Vector(vs) => {
                SenmlValue::Many(vs.into_iter().map(SenmlScalar::Number).collect())
            }
        }
    }
}

/// Decode a SenML pack received from `source_address`
pub fn decode_senml(body: &[u8], source_address: &str) -> Result<ReadingBatch, ApiError> {
    let records: Vec<SenmlRecord> = serde_json::from_slice(body)
        .map_err(|e| ApiError::MalformedPayload(format!("invalid SenML: {}", e)))?;

    let (head, rest) = records
        .split_first()
        .ok_or_else(|| ApiError::MalformedPayload("empty SenML pack".to_string()))?;

    let base_name = head
        .bn
        .as_deref()
        .map(str::trim)
        .filter(|bn| !bn.is_empty())
        .ok_or_else(|| ApiError::MalformedPayload("missing base name".to_string()))?;

    // The base record may carry a reading of its own
    let head_reading = (head.n.is_some() || head.v.is_some()).then_some((0, head));
    let readings = head_reading
        .into_iter()
        .chain(rest.iter().enumerate().map(|(index, record)| (index + 1, record)))
        .map(|(index, record)| decode_reading(index, record))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ReadingBatch {
        node_id: base_name.to_string(),
        source_address: source_address.to_string(),
        readings,
    })
}

fn decode_reading(index: usize, record: &SenmlRecord) -> Result<Reading, ApiError> {
    let channel = record
        .n
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::MalformedPayload(format!("record {} has no name", index)))?;

    let value = record
        .v
        .as_ref()
        .and_then(SenmlValue::to_value)
        .ok_or_else(|| {
            ApiError::MalformedPayload(format!("record {} ('{}') has no numeric value", index, channel))
        })?;

    Ok(Reading::new(channel, record.u.clone().unwrap_or_default(), value))
}

/// Encode a batch as a SenML pack
pub fn encode_senml(batch: &ReadingBatch) -> Vec<SenmlRecord> {
    let mut records = Vec::with_capacity(batch.readings.len() + 1);
    records.push(SenmlRecord {
        bn: Some(batch.node_id.clone()),
        ..Default::default()
    });
    records.extend(batch.readings.iter().map(|reading| SenmlRecord {
        bn: None,
        n: Some(reading.channel.clone()),
        u: (!reading.unit.is_empty()).then(|| reading.unit.clone()),
        v: Some(reading.value.clone().into()),
    }));
    records
}

/// Registration payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub id: Option<String>,
    pub has: Option<Vec<String>>,
}

/// Decode a registration received from `source_address`
pub fn decode_registration(body: &[u8], source_address: &str) -> Result<Registration, ApiError> {
    let request: RegisterRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::MalformedPayload(format!("invalid registration: {}", e)))?;

    let id = request
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::MalformedPayload("missing id".to_string()))?;
    let has = request
        .has
        .ok_or_else(|| ApiError::MalformedPayload("missing capability list".to_string()))?;

    Ok(Registration::new(id, source_address, has))
}

// ============================================
// COMMAND DTOs
// ============================================

/// Command relay request: address a node directly or by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    pub ep: String,
    pub val: serde_json::Value,
}

/// Command relay response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Status: "queued"
    pub status: String,
    pub addr: String,
    pub ep: String,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: "healthy"
    pub status: String,
    pub nodes: usize,
    pub active: usize,
    pub stale: usize,
    pub viewers: usize,
    pub uptime_seconds: u64,
    pub version: String,
}
