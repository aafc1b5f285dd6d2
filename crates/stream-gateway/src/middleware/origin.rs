//! Origin allow-list for WebSocket upgrades.
//!
//! Browsers send `Origin` on upgrade requests but CORS does not apply to
//! them, so the check happens here. Requests without `Origin` come from
//! non-browser clients and are accepted.

use crate::domain::error::SetupError;
use axum::http::HeaderMap;

#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allow_any: bool,
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn new(allowed_origins: &[String]) -> Self {
        Self {
            allow_any: allowed_origins.iter().any(|o| o == "*"),
            allowed: allowed_origins
                .iter()
                .map(|o| o.trim_end_matches('/').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), SetupError> {
        if self.allow_any {
            return Ok(());
        }
        let Some(origin) = headers.get("origin") else {
            return Ok(());
        };
        let origin = origin
            .to_str()
            .map_err(|_| SetupError::OriginRejected("<non-ascii>".to_string()))?;
        let normalized = origin.trim_end_matches('/').to_ascii_lowercase();

        if self.allowed.iter().any(|o| *o == normalized) {
            Ok(())
        } else {
            Err(SetupError::OriginRejected(origin.to_string()))
        }
    }
}
