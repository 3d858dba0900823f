// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gateway directory data types and normalization.
//!
//! The directory document's `gateways` field is an object keyed by gateway
//! address (a list of entries carrying `gatewayAddress` is accepted too):
//!
//! ```json
//! {
//!   "gateways": {
//!     "<address>": {
//!       "operatorStake": 250000,
//!       "status": "joined",
//!       "settings": { "fqdn": "ar.example.com", "port": 443, "protocol": "https", "label": "Example" }
//!     }
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use utoipa::ToSchema;

use super::RefreshError;

/// Gateway status that qualifies for routing.
const JOINED_STATUS: &str = "joined";

/// A normalized directory entry, ready to be probed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GarItem {
    /// Gateway operator address
    pub id: String,
    /// Lowercased host name
    pub fqdn: String,
    pub port: u16,
    /// `http` or `https`
    pub protocol: String,
    pub label: String,
    pub operator_stake: u64,
}

impl GarItem {
    /// `protocol://fqdn:port/`
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}://{}:{}/", self.protocol, self.fqdn, self.port))
    }
}

/// A gateway that passed the health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedGateway {
    #[serde(flatten)]
    pub gateway: GarItem,
    /// Probe round-trip time
    pub latency_ms: u64,
    /// When the probe completed
    pub checked_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarEntry {
    #[serde(default, alias = "id")]
    gateway_address: Option<String>,
    #[serde(default)]
    operator_stake: u64,
    #[serde(default)]
    status: Option<String>,
    settings: GarSettings,
}

#[derive(Deserialize)]
struct GarSettings {
    fqdn: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

/// Extract routable gateways from the directory's `gateways` field.
///
/// Entries that are not `joined`, use an unknown protocol or fail to parse
/// are skipped. The result is ordered by gateway address.
pub fn extract_gar_items(gateways: &serde_json::Value) -> Result<Vec<GarItem>, RefreshError> {
    let entries: Vec<(Option<&str>, &serde_json::Value)> = match gateways {
        serde_json::Value::Object(map) => map.iter().map(|(k, v)| (Some(k.as_str()), v)).collect(),
        serde_json::Value::Array(list) => list.iter().map(|v| (None, v)).collect(),
        _ => {
            return Err(RefreshError::Parse(
                "`gateways` is neither an object nor a list".to_string(),
            ))
        }
    };

    let mut items = Vec::with_capacity(entries.len());
    for (key, raw) in entries {
        let entry: GarEntry = match serde_json::from_value(raw.clone()) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(gateway = ?key, error = %e, "Skipping malformed gateway entry");
                continue;
            }
        };

        let Some(address) = key
            .map(str::to_string)
            .or_else(|| entry.gateway_address.clone())
        else {
            debug!("Skipping gateway entry without an address");
            continue;
        };

        if let Some(item) = normalize(&address, entry) {
            items.push(item);
        }
    }

    items.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(items)
}

fn normalize(address: &str, entry: GarEntry) -> Option<GarItem> {
    if entry
        .status
        .as_deref()
        .is_some_and(|status| status != JOINED_STATUS)
    {
        return None;
    }

    let fqdn = entry.settings.fqdn.trim().trim_end_matches('.').to_lowercase();
    if fqdn.is_empty() {
        return None;
    }

    let protocol = entry
        .settings
        .protocol
        .map(|p| p.trim().to_lowercase())
        .unwrap_or_else(|| "https".to_string());
    let default_port = match protocol.as_str() {
        "https" => 443,
        "http" => 80,
        _ => return None,
    };

    let item = GarItem {
        id: address.to_string(),
        fqdn,
        port: entry.settings.port.unwrap_or(default_port),
        protocol,
        label: entry.settings.label.unwrap_or_default(),
        operator_stake: entry.operator_stake,
    };

    // Reject anything that cannot form a URL (e.g. spaces in fqdn)
    item.base_url().ok().map(|_| item)
}
