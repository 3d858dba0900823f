// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, default values and the [`Config`] loaded
//! from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the redb store file | `./data` |
//! | `HOST` | Control API bind address | `127.0.0.1` |
//! | `PORT` | Control API bind port | `8787` |
//! | `GATEWAY_DIRECTORY_URL` | Gateway directory endpoint | ar.io GAR cache |
//! | `HTTP_TIMEOUT_SECS` | Directory fetch timeout | `10` |
//! | `PROBE_TIMEOUT_SECS` | Per-gateway probe timeout | `5` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,session_keeper=debug,tower_http=info` |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;
use url::Url;

/// Environment variable name for the data directory path.
///
/// The redb file `session.redb` is created inside it.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the gateway directory endpoint.
///
/// Must return JSON with a `gateways` object keyed by gateway address.
pub const GATEWAY_DIRECTORY_URL_ENV: &str = "GATEWAY_DIRECTORY_URL";

pub const HTTP_TIMEOUT_SECS_ENV: &str = "HTTP_TIMEOUT_SECS";
pub const PROBE_TIMEOUT_SECS_ENV: &str = "PROBE_TIMEOUT_SECS";

/// Environment variable name for the logging format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "./data";

/// Loopback only: the API is a local control surface for the host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_GATEWAY_DIRECTORY_URL: &str = "https://dev.arweave.net/ar-io/cache/gar";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,session_keeper=debug,tower_http=info";

/// File name of the store inside `DATA_DIR`.
pub const STORE_FILE_NAME: &str = "session.redb";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub gateway_directory_url: Url,
    pub http_timeout: Duration,
    pub probe_timeout: Duration,
    pub log_format: LogFormat,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup. Unparseable values fall
    /// back to their defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let host = lookup(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(&lookup, PORT_ENV, DEFAULT_PORT);

        let gateway_directory_url = lookup(GATEWAY_DIRECTORY_URL_ENV)
            .and_then(|raw| match Url::parse(&raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(var = GATEWAY_DIRECTORY_URL_ENV, error = %e, "Invalid URL, using default");
                    None
                }
            })
            .unwrap_or_else(default_directory_url);

        let http_timeout = Duration::from_secs(parse_or(
            &lookup,
            HTTP_TIMEOUT_SECS_ENV,
            DEFAULT_HTTP_TIMEOUT_SECS,
        ));
        let probe_timeout = Duration::from_secs(parse_or(
            &lookup,
            PROBE_TIMEOUT_SECS_ENV,
            DEFAULT_PROBE_TIMEOUT_SECS,
        ));

        let log_format = match lookup(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            data_dir,
            host,
            port,
            gateway_directory_url,
            http_timeout,
            probe_timeout,
            log_format,
        }
    }

    /// Path of the redb store file.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE_NAME)
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(var = name, value = %raw, "Invalid value, using default");
            default
        }),
        None => default,
    }
}

fn default_directory_url() -> Url {
    Url::parse(DEFAULT_GATEWAY_DIRECTORY_URL).expect("default gateway directory URL is valid")
}
