// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Google Sheets backend for the attendance ledger.
//!
//! Authenticates with a service-account JWT bearer grant (RS256 assertion
//! exchanged for a short-lived access token) and drives the spreadsheet
//! through the `values` and `batchUpdate` endpoints. Access tokens are
//! fetched per operation; at check-in rates that is far below any quota
//! worth caching around.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::sheet::{Row, SheetError, SheetStore};
use crate::config::SheetsConfig;

const API_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[derive(Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

pub struct GoogleSheetsStore {
    spreadsheet_id: String,
    worksheet_name: String,
    service_account_email: String,
    signing_key: EncodingKey,
    http: Client,
    /// Numeric sheet id of the active worksheet, resolved once by title.
    sheet_id: RwLock<Option<i64>>,
}

impl GoogleSheetsStore {
    pub fn new(config: &SheetsConfig, worksheet_name: &str) -> Result<Self, SheetError> {
        let signing_key = EncodingKey::from_rsa_pem(config.service_account_key_pem.as_bytes())
            .map_err(|e| SheetError::Auth(format!("invalid service account key: {e}")))?;

        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| SheetError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            spreadsheet_id: config.spreadsheet_id.clone(),
            worksheet_name: worksheet_name.to_string(),
            service_account_email: config.service_account_email.clone(),
            signing_key,
            http,
            sheet_id: RwLock::new(None),
        })
    }

    /// A1 range over the record columns for an inclusive data-row range.
    fn data_range(&self, start: usize, end: usize) -> String {
        data_range(&self.worksheet_name, start, end)
    }

    async fn access_token(&self) -> Result<String, SheetError> {
        let now = chrono::Utc::now().timestamp();
        let claims = GrantClaims {
            iss: &self.service_account_email,
            scope: SHEETS_SCOPE,
            aud: TOKEN_URL,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| SheetError::Auth(format!("assertion signing failed: {e}")))?;

        let form = [
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", assertion.as_str()),
        ];

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&form)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(SheetError::Auth(format!(
                "token request returned {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SheetError::InvalidResponse(format!("invalid token response: {e}")))?;

        body.get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                SheetError::InvalidResponse(
                    "token response did not include access_token".to_string(),
                )
            })
    }

    async fn get_json(&self, path_and_query: &str) -> Result<Value, SheetError> {
        let token = self.access_token().await?;
        let url = format!("{API_BASE_URL}/{}{path_and_query}", self.spreadsheet_id);

        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(SheetError::Request(format!(
                "GET {path_and_query} returned {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SheetError::InvalidResponse(format!("invalid JSON: {e}")))
    }

    async fn post_json(&self, path_and_query: &str, payload: &Value) -> Result<Value, SheetError> {
        let token = self.access_token().await?;
        let url = format!("{API_BASE_URL}/{}{path_and_query}", self.spreadsheet_id);

        let response = self
            .http
            .post(url)
            .header("Authorization", format!("Bearer {token}"))
            .json(payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(SheetError::Request(format!(
                "POST {path_and_query} returned {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SheetError::InvalidResponse(format!("invalid JSON: {e}")))
    }

    async fn put_values(&self, range: &str, rows: &[Row]) -> Result<(), SheetError> {
        let token = self.access_token().await?;
        let url = format!(
            "{API_BASE_URL}/{}/values/{range}?valueInputOption=RAW",
            self.spreadsheet_id
        );

        let response = self
            .http
            .put(url)
            .header("Authorization", format!("Bearer {token}"))
            .json(&json!({ "values": rows }))
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(SheetError::Request(format!(
                "PUT values {range} returned {status}"
            )));
        }
        Ok(())
    }

    async fn batch_update(&self, requests: Value) -> Result<Value, SheetError> {
        self.post_json(":batchUpdate", &json!({ "requests": requests }))
            .await
    }

    /// Resolve (and cache) the numeric id of the active worksheet.
    async fn active_sheet_id(&self) -> Result<i64, SheetError> {
        if let Some(id) = *self.sheet_id.read().await {
            return Ok(id);
        }

        let body = self.get_json("?fields=sheets.properties").await?;
        let id = body
            .get("sheets")
            .and_then(Value::as_array)
            .and_then(|sheets| {
                sheets.iter().find_map(|s| {
                    let props = s.get("properties")?;
                    if props.get("title").and_then(Value::as_str) == Some(&self.worksheet_name) {
                        props.get("sheetId").and_then(Value::as_i64)
                    } else {
                        None
                    }
                })
            })
            .ok_or_else(|| {
                SheetError::InvalidResponse(format!(
                    "worksheet \"{}\" not found in spreadsheet",
                    self.worksheet_name
                ))
            })?;

        *self.sheet_id.write().await = Some(id);
        Ok(id)
    }
}

#[async_trait]
impl SheetStore for GoogleSheetsStore {
    async fn header(&self) -> Result<Row, SheetError> {
        let range = format!("'{}'!A1:C1", self.worksheet_name);
        let body = self.get_json(&format!("/values/{range}")).await?;
        Ok(parse_rows(&body).into_iter().next().unwrap_or_default())
    }

    async fn data_row_count(&self) -> Result<usize, SheetError> {
        let range = format!("'{}'!A:A", self.worksheet_name);
        let body = self
            .get_json(&format!("/values/{range}?majorDimension=COLUMNS"))
            .await?;

        let cells = body
            .get("values")
            .and_then(Value::as_array)
            .and_then(|cols| cols.first())
            .and_then(Value::as_array)
            .map(|col| col.len())
            .unwrap_or(0);

        // Row 1 is the header.
        Ok(cells.saturating_sub(1))
    }

    async fn insert_top(&self, row: Row) -> Result<(), SheetError> {
        let sheet_id = self.active_sheet_id().await?;

        // Open a blank row 2, then fill it.
        self.batch_update(json!([{
            "insertDimension": {
                "range": {
                    "sheetId": sheet_id,
                    "dimension": "ROWS",
                    "startIndex": 1,
                    "endIndex": 2
                },
                "inheritFromBefore": false
            }
        }]))
        .await?;

        self.put_values(&self.data_range(1, 1), &[row]).await
    }

    async fn read_range(&self, start: usize, end: usize) -> Result<Vec<Row>, SheetError> {
        if start == 0 || start > end {
            return Err(SheetError::OutOfRange { start, end });
        }
        let body = self
            .get_json(&format!("/values/{}", self.data_range(start, end)))
            .await?;
        Ok(parse_rows(&body))
    }

    async fn delete_range(&self, start: usize, end: usize) -> Result<(), SheetError> {
        if start == 0 || start > end {
            return Err(SheetError::OutOfRange { start, end });
        }
        let sheet_id = self.active_sheet_id().await?;

        // 0-based grid indices: data row n is grid row n (header is 0).
        self.batch_update(json!([{
            "deleteDimension": {
                "range": {
                    "sheetId": sheet_id,
                    "dimension": "ROWS",
                    "startIndex": start,
                    "endIndex": end + 1
                }
            }
        }]))
        .await?;
        Ok(())
    }

    async fn create_sheet(&self, title: &str, rows: Vec<Row>) -> Result<(), SheetError> {
        self.batch_update(json!([{
            "addSheet": {
                "properties": { "title": title }
            }
        }]))
        .await?;

        let range = format!("'{}'!A1:C{}", title, rows.len().max(1));
        self.put_values(&range, &rows).await
    }
}

/// A1 range over the record columns for an inclusive 1-based data-row
/// range. Data row n lives at sheet row n + 1 (header is row 1).
fn data_range(worksheet: &str, start: usize, end: usize) -> String {
    format!("'{worksheet}'!A{}:C{}", start + 1, end + 1)
}

fn map_transport_error(e: reqwest::Error) -> SheetError {
    if e.is_connect() || e.is_timeout() {
        SheetError::Unavailable(e.to_string())
    } else {
        SheetError::Request(e.to_string())
    }
}

fn parse_rows(body: &Value) -> Vec<Row> {
    body.get("values")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| {
                            cells
                                .iter()
                                .map(|c| c.as_str().unwrap_or_default().to_string())
                                .collect()
                        })
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}
