//! Discovery Route
//!
//! - GET /.well-known/core - Link-format listing of device endpoints

use axum::http::header;
use axum::response::IntoResponse;

/// A device-facing endpoint as advertised in discovery
pub struct Endpoint {
    pub path: &'static str,
    pub title: &'static str,
    pub rt: Option<&'static str>,
}

/// Advertised endpoints, in listing order
pub const ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        path: "/.well-known/core",
        title: "Discover me",
        rt: None,
    },
    Endpoint {
        path: "/senml",
        title: "Ingest SenML readings",
        rt: None,
    },
    Endpoint {
        path: "/reg",
        title: "Register a node",
        rt: None,
    },
];

/// Render endpoints as `application/link-format`
pub fn link_format(endpoints: &[Endpoint]) -> String {
    endpoints
        .iter()
        .map(|ep| {
            let mut link = format!("<{}>;title=\"{}\"", ep.path, ep.title);
            if let Some(rt) = ep.rt {
                link.push_str(&format!(";rt=\"{}\"", rt));
            }
            link
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// GET /.well-known/core
pub async fn well_known_core() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/link-format")],
        link_format(ENDPOINTS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing() {
        assert_eq!(
            link_format(ENDPOINTS),
            "</.well-known/core>;title=\"Discover me\",\
             </senml>;title=\"Ingest SenML readings\",\
             </reg>;title=\"Register a node\""
        );
    }

    #[test]
    fn test_resource_type_attribute() {
        let endpoints = [Endpoint {
            path: "/test",
            title: "Some test resource",
            rt: Some("Test RT"),
        }];
        assert_eq!(
            link_format(&endpoints),
            "</test>;title=\"Some test resource\";rt=\"Test RT\""
        );
    }
}
