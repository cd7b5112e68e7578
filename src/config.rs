// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! All configuration is read from the environment once at startup and
//! collected into a single immutable [`AppConfig`] that is passed to each
//! component. Nothing re-reads the environment after boot; rotating the
//! token secret therefore requires a restart and invalidates all
//! outstanding check-in tokens (acceptable, tokens live for minutes).
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `PUBLIC_BASE_URL` | Externally reachable base URL embedded in QR codes | Required |
//! | `TOKEN_SECRET` | HS256 secret for check-in tokens | Required |
//! | `TOKEN_TTL_SECS` | Check-in token lifetime | `600` |
//! | `SESSION_SECRET` | Signing key for the session cookie (min 32 bytes) | Required |
//! | `REFERENCE_LAT` / `REFERENCE_LON` | Check-in reference point | Required |
//! | `PROXIMITY_RADIUS_METERS` | Allowed radius around the reference point | `100` |
//! | `TRUSTED_ORIGIN_PREFIXES` | Comma-separated address prefixes exempt from the proximity gate | empty |
//! | `CRON_SECRET` | Shared secret for `/cron/generate-qr` | Optional |
//! | `UTC_OFFSET_HOURS` | Fixed offset applied to ledger timestamps | `9` |
//! | `OAUTH_CLIENT_ID` / `OAUTH_CLIENT_SECRET` | Identity provider client | Required |
//! | `OAUTH_AUTH_URL` / `OAUTH_TOKEN_URL` / `OAUTH_USERINFO_URL` | Provider endpoints | Google defaults |
//! | `SPREADSHEET_ID` | Target spreadsheet | Required for remote ledger |
//! | `WORKSHEET_NAME` | Active worksheet, selected by name | `Attendance` |
//! | `SHEET_ROW_LIMIT` | Active data rows kept before archival | `1000` |
//! | `SHEETS_SA_EMAIL` / `SHEETS_SA_PRIVATE_KEY_PEM` | Sheets service account | Required for remote ledger |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::env;

use crate::geo::Coordinates;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: &str = "8080";
const DEFAULT_TOKEN_TTL_SECS: &str = "600";
const DEFAULT_PROXIMITY_RADIUS_METERS: &str = "100";
const DEFAULT_UTC_OFFSET_HOURS: &str = "9";
const DEFAULT_WORKSHEET_NAME: &str = "Attendance";
const DEFAULT_SHEET_ROW_LIMIT: &str = "1000";
const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Minimum length of the session cookie signing secret.
const MIN_SESSION_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(String),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Identity provider client settings.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

/// Spreadsheet ledger settings. Absent when the service runs against the
/// in-memory fallback ledger (development only).
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub service_account_email: String,
    pub service_account_key_pem: String,
}

/// Immutable application configuration, built once at process start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub public_base_url: String,

    pub token_secret: String,
    pub token_ttl_secs: i64,
    pub session_secret: String,

    pub reference_point: Coordinates,
    pub proximity_radius_meters: f64,
    pub trusted_origin_prefixes: Vec<String>,

    pub cron_secret: Option<String>,
    pub utc_offset_hours: i32,

    pub worksheet_name: String,
    pub sheet_row_limit: usize,

    pub oauth: OAuthConfig,
    pub sheets: Option<SheetsConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_or_default("HOST", DEFAULT_HOST);
        let port = parse_env("PORT", DEFAULT_PORT)?;
        let public_base_url = env_required("PUBLIC_BASE_URL")?
            .trim_end_matches('/')
            .to_string();

        let token_secret = env_required("TOKEN_SECRET")?;
        let token_ttl_secs: i64 = parse_env("TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;
        if token_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                name: "TOKEN_TTL_SECS".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let session_secret = env_required("SESSION_SECRET")?;
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "SESSION_SECRET".to_string(),
                reason: format!("must be at least {MIN_SESSION_SECRET_LEN} bytes"),
            });
        }

        let reference_point = Coordinates {
            latitude: parse_env_required("REFERENCE_LAT")?,
            longitude: parse_env_required("REFERENCE_LON")?,
        };
        let proximity_radius_meters: f64 =
            parse_env("PROXIMITY_RADIUS_METERS", DEFAULT_PROXIMITY_RADIUS_METERS)?;
        if !proximity_radius_meters.is_finite() || proximity_radius_meters <= 0.0 {
            return Err(ConfigError::Invalid {
                name: "PROXIMITY_RADIUS_METERS".to_string(),
                reason: "must be a positive number".to_string(),
            });
        }

        let trusted_origin_prefixes = env::var("TRUSTED_ORIGIN_PREFIXES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        let cron_secret = env::var("CRON_SECRET").ok().filter(|s| !s.is_empty());

        let utc_offset_hours: i32 = parse_env("UTC_OFFSET_HOURS", DEFAULT_UTC_OFFSET_HOURS)?;
        if !(-23..=23).contains(&utc_offset_hours) {
            return Err(ConfigError::Invalid {
                name: "UTC_OFFSET_HOURS".to_string(),
                reason: "must be between -23 and 23".to_string(),
            });
        }

        let worksheet_name = env_or_default("WORKSHEET_NAME", DEFAULT_WORKSHEET_NAME);
        let sheet_row_limit: usize = parse_env("SHEET_ROW_LIMIT", DEFAULT_SHEET_ROW_LIMIT)?;
        if sheet_row_limit == 0 {
            return Err(ConfigError::Invalid {
                name: "SHEET_ROW_LIMIT".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let oauth = OAuthConfig {
            client_id: env_required("OAUTH_CLIENT_ID")?,
            client_secret: env_required("OAUTH_CLIENT_SECRET")?,
            auth_url: env_or_default("OAUTH_AUTH_URL", DEFAULT_AUTH_URL),
            token_url: env_or_default("OAUTH_TOKEN_URL", DEFAULT_TOKEN_URL),
            userinfo_url: env_or_default("OAUTH_USERINFO_URL", DEFAULT_USERINFO_URL),
        };

        // The remote ledger is optional so the service can be exercised
        // locally without a service account; main logs a warning when the
        // in-memory fallback is active.
        let sheets = match (
            env::var("SPREADSHEET_ID").ok().filter(|s| !s.is_empty()),
            env::var("SHEETS_SA_EMAIL").ok().filter(|s| !s.is_empty()),
            env::var("SHEETS_SA_PRIVATE_KEY_PEM")
                .ok()
                .filter(|s| !s.is_empty()),
        ) {
            (Some(spreadsheet_id), Some(service_account_email), Some(service_account_key_pem)) => {
                Some(SheetsConfig {
                    spreadsheet_id,
                    service_account_email,
                    service_account_key_pem,
                })
            }
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    name: "SPREADSHEET_ID/SHEETS_SA_EMAIL/SHEETS_SA_PRIVATE_KEY_PEM".to_string(),
                    reason: "set all three to enable the remote ledger, or none".to_string(),
                });
            }
        };

        Ok(Self {
            host,
            port,
            public_base_url,
            token_secret,
            token_ttl_secs,
            session_secret,
            reference_point,
            proximity_radius_meters,
            trusted_origin_prefixes,
            cron_secret,
            utc_offset_hours,
            worksheet_name,
            sheet_row_limit,
            oauth,
            sheets,
        })
    }
}

fn env_required(name: &str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing(name.to_string()))
}

fn env_or_default(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_or_default(name, default)
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

fn parse_env_required<T>(name: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_required(name)?
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            name: name.to_string(),
            reason: e.to_string(),
        })
}
