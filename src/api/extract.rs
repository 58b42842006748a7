//! Request Extractors

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::net::{IpAddr, SocketAddr};

use crate::api::error::{ApiError, DeviceError};

/// Address a device request came from.
///
/// Taken from `X-Forwarded-For` when a proxy sits in front, otherwise from
/// the peer socket. Requests with neither are rejected as not acceptable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr(pub String);

impl PeerAddr {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }
    // Normalise when it is an IP so v4-mapped v6 and v6 text forms agree
    Some(match first.parse::<IpAddr>() {
        Ok(ip) => ip.to_canonical().to_string(),
        Err(_) => first.to_string(),
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for PeerAddr
where
    S: Send + Sync,
{
    type Rejection = DeviceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(addr) = forwarded_for(&parts.headers) {
            return Ok(PeerAddr(addr));
        }

        if let Ok(ConnectInfo(addr)) =
            ConnectInfo::<SocketAddr>::from_request_parts(parts, state).await
        {
            return Ok(PeerAddr(addr.ip().to_canonical().to_string()));
        }

        Err(DeviceError(ApiError::MalformedPayload(
            "no source address".to_string(),
        )))
    }
}
