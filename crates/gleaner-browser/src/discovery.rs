//! Page target discovery over the remote debugging HTTP endpoint.
//!
//! The debugging endpoint serves `GET /json` with the list of connectable
//! targets. Discovery runs once at connect time: the first target whose
//! title or URL contains a configured keyword (case-insensitive) wins,
//! falling back to the first available target when nothing matches.

use serde::Deserialize;

use crate::error::BrowserError;

/// One connectable target as reported by the discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    /// Absent when another client is already attached to the target.
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

/// Fetch the target list from `http://{host}:{port}/json`.
pub async fn discover_targets(host: &str, port: u16) -> Result<Vec<TargetInfo>, BrowserError> {
    let endpoint = format!("http://{host}:{port}/json");
    tracing::debug!(endpoint = %endpoint, "querying discovery endpoint");

    let response = reqwest::get(&endpoint)
        .await
        .map_err(|e| BrowserError::Discovery {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(BrowserError::Discovery {
            endpoint,
            reason: format!("discovery endpoint returned HTTP {}", response.status()),
        });
    }

    response
        .json::<Vec<TargetInfo>>()
        .await
        .map_err(|e| BrowserError::Discovery {
            endpoint,
            reason: format!("malformed target list: {e}"),
        })
}

/// Pick the target to attach to.
///
/// Preference order: first target whose title or URL contains `keyword`
/// (case-insensitive substring), then the first target in the list. Returns
/// `None` only when the list is empty.
pub fn select_target<'a>(
    targets: &'a [TargetInfo],
    keyword: Option<&str>,
) -> Option<&'a TargetInfo> {
    if let Some(keyword) = keyword {
        let needle = keyword.to_lowercase();
        if !needle.is_empty() {
            if let Some(hit) = targets.iter().find(|t| {
                t.title.to_lowercase().contains(&needle)
                    || t.url.to_lowercase().contains(&needle)
            }) {
                return Some(hit);
            }
            tracing::debug!(
                keyword,
                "no target matched keyword, falling back to first target"
            );
        }
    }
    targets.first()
}
