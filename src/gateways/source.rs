// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Remote gateway directory fetching.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::RefreshError;

/// Source of the raw directory document.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Fetch the directory; the document must carry a `gateways` field.
    async fn fetch_directory(&self) -> Result<serde_json::Value, RefreshError>;
}

/// Directory fetched over HTTPS.
#[derive(Clone)]
pub struct HttpDirectorySource {
    url: Url,
    client: reqwest::Client,
}

impl HttpDirectorySource {
    /// Create a source for `url`; `timeout` bounds each request at the
    /// transport level.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, RefreshError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RefreshError::Network(e.to_string()))?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl DirectorySource for HttpDirectorySource {
    async fn fetch_directory(&self) -> Result<serde_json::Value, RefreshError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RefreshError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| RefreshError::Parse(e.to_string()))
    }
}
