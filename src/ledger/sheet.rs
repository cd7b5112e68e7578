// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The ordered-row capability the ledger writer is built on.
//!
//! Row indices are 1-based **data** rows: row 1 is the newest record, the
//! header is not addressable through this trait. Implementations translate
//! to their own physical layout (the Sheets API backend maps data row `n`
//! to sheet row `n + 1`).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// One ledger row: timestamp, email, display name.
pub type Row = Vec<String>;

#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("sheet store authorization failed: {0}")]
    Auth(String),

    #[error("sheet store request failed: {0}")]
    Request(String),

    #[error("sheet store response was invalid: {0}")]
    InvalidResponse(String),

    #[error("sheet store unreachable: {0}")]
    Unavailable(String),

    #[error("data row range {start}..={end} is out of bounds")]
    OutOfRange { start: usize, end: usize },
}

/// Ordered-row storage: the spreadsheet engine as the ledger sees it.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// The header row of the active sheet (empty when the sheet has none).
    async fn header(&self) -> Result<Row, SheetError>;

    /// Number of data rows in the active sheet.
    async fn data_row_count(&self) -> Result<usize, SheetError>;

    /// Insert a row above all existing data rows (newest-first order).
    async fn insert_top(&self, row: Row) -> Result<(), SheetError>;

    /// Read the inclusive data-row range `start..=end`.
    async fn read_range(&self, start: usize, end: usize) -> Result<Vec<Row>, SheetError>;

    /// Delete the inclusive data-row range `start..=end`.
    async fn delete_range(&self, start: usize, end: usize) -> Result<(), SheetError>;

    /// Create a new sheet with the given title and rows (header included).
    async fn create_sheet(&self, title: &str, rows: Vec<Row>) -> Result<(), SheetError>;
}

/// In-memory sheet, used in tests and as the development fallback when no
/// service account is configured.
pub struct InMemorySheet {
    header: Row,
    rows: RwLock<Vec<Row>>,
    archives: RwLock<HashMap<String, Vec<Row>>>,
}

impl InMemorySheet {
    pub fn new(header: Row) -> Self {
        Self {
            header,
            rows: RwLock::new(Vec::new()),
            archives: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of the active data rows, newest first.
    pub async fn rows(&self) -> Vec<Row> {
        self.rows.read().await.clone()
    }

    /// Snapshot of all archive sheets by title.
    pub async fn archives(&self) -> HashMap<String, Vec<Row>> {
        self.archives.read().await.clone()
    }
}

#[async_trait]
impl SheetStore for InMemorySheet {
    async fn header(&self) -> Result<Row, SheetError> {
        Ok(self.header.clone())
    }

    async fn data_row_count(&self) -> Result<usize, SheetError> {
        Ok(self.rows.read().await.len())
    }

    async fn insert_top(&self, row: Row) -> Result<(), SheetError> {
        self.rows.write().await.insert(0, row);
        Ok(())
    }

    async fn read_range(&self, start: usize, end: usize) -> Result<Vec<Row>, SheetError> {
        let rows = self.rows.read().await;
        if start == 0 || start > end || end > rows.len() {
            return Err(SheetError::OutOfRange { start, end });
        }
        Ok(rows[start - 1..end].to_vec())
    }

    async fn delete_range(&self, start: usize, end: usize) -> Result<(), SheetError> {
        let mut rows = self.rows.write().await;
        if start == 0 || start > end || end > rows.len() {
            return Err(SheetError::OutOfRange { start, end });
        }
        rows.drain(start - 1..end);
        Ok(())
    }

    async fn create_sheet(&self, title: &str, rows: Vec<Row>) -> Result<(), SheetError> {
        let mut archives = self.archives.write().await;
        if archives.contains_key(title) {
            return Err(SheetError::Request(format!(
                "sheet \"{title}\" already exists"
            )));
        }
        archives.insert(title.to_string(), rows);
        Ok(())
    }
}
