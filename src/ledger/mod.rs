// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Attendance Ledger
//!
//! Append-only log of check-ins backed by an ordered-row sheet store.
//!
//! ## Ordering
//!
//! Records are inserted at data row 1 (newest-first); the header stays
//! fixed at the physical top of the sheet. With this ordering the oldest
//! rows are the contiguous bottom range, which is what archival evicts.
//!
//! ## Archival
//!
//! When the active sheet holds more data rows than the configured limit,
//! the overflow (oldest rows beyond the limit) plus the header row is
//! copied into a uniquely named archive sheet and then deleted from the
//! active sheet. If the delete fails after the archive was created, the
//! inconsistency is logged and the archive is kept; duplicated rows are
//! safer than lost rows. Archival runs only after a successful append,
//! detached from the request, and never fails the triggering check-in.

pub mod sheet;
pub mod sheets_api;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{error, info, warn};

use crate::error::CheckInError;
use crate::identity::Identity;

pub use sheet::{InMemorySheet, Row, SheetError, SheetStore};
pub use sheets_api::GoogleSheetsStore;

/// Header row written to archive sheets (and expected on the active sheet).
pub const LEDGER_HEADER: [&str; 3] = ["Timestamp", "Email", "Name"];

/// Ledger timestamp format, matching what ends up in the sheet cells.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp suffix making archive sheet names unique.
const ARCHIVE_SUFFIX_FORMAT: &str = "%Y%m%d%H%M%S";

/// One check-in: an independent, timestamped fact. Identical records are
/// deliberately not deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub email: String,
    pub display_name: String,
}

impl AttendanceRecord {
    pub fn to_row(&self) -> Row {
        vec![
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            self.email.clone(),
            self.display_name.clone(),
        ]
    }
}

/// Outcome of a completed archival pass.
#[derive(Debug, Clone)]
pub struct ArchiveReport {
    pub archive_title: String,
    pub rows_moved: usize,
}

/// Appends attendance records and performs capacity-triggered archival.
pub struct LedgerWriter {
    store: Arc<dyn SheetStore>,
    worksheet_name: String,
    row_limit: usize,
    utc_offset: FixedOffset,
}

impl LedgerWriter {
    pub fn new(
        store: Arc<dyn SheetStore>,
        worksheet_name: String,
        row_limit: usize,
        utc_offset_hours: i32,
    ) -> Self {
        let utc_offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
        Self {
            store,
            worksheet_name,
            row_limit,
            utc_offset,
        }
    }

    /// Build a record for `identity`, stamped now in the configured offset.
    pub fn record_now(&self, identity: &Identity) -> AttendanceRecord {
        AttendanceRecord {
            timestamp: Utc::now().with_timezone(&self.utc_offset),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
        }
    }

    /// Append one record at the top of the active sheet.
    pub async fn append(&self, record: &AttendanceRecord) -> Result<(), CheckInError> {
        self.store
            .insert_top(record.to_row())
            .await
            .map_err(|e| match e {
                SheetError::Unavailable(detail) => CheckInError::UpstreamUnavailable(detail),
                other => CheckInError::LedgerWriteFailed(other.to_string()),
            })
    }

    /// Move overflow rows into a fresh archive sheet if the active sheet
    /// has grown past the row limit. Returns `None` when under the limit.
    pub async fn archive_if_over_threshold(&self) -> Result<Option<ArchiveReport>, CheckInError> {
        let archival = |e: SheetError| CheckInError::ArchivalFailed(e.to_string());

        let count = self.store.data_row_count().await.map_err(archival)?;
        if count <= self.row_limit {
            return Ok(None);
        }

        let start = self.row_limit + 1;
        let overflow = self
            .store
            .read_range(start, count)
            .await
            .map_err(archival)?;
        let header = self.store.header().await.map_err(archival)?;

        let archive_title = format!(
            "{} archive {}",
            self.worksheet_name,
            Utc::now()
                .with_timezone(&self.utc_offset)
                .format(ARCHIVE_SUFFIX_FORMAT)
        );

        let mut rows = Vec::with_capacity(overflow.len() + 1);
        rows.push(if header.is_empty() {
            LEDGER_HEADER.iter().map(|s| s.to_string()).collect()
        } else {
            header
        });
        rows.extend(overflow);

        let rows_moved = rows.len() - 1;
        self.store
            .create_sheet(&archive_title, rows)
            .await
            .map_err(archival)?;

        // The archive exists from here on. A failed delete leaves the
        // moved rows duplicated in the active sheet; log the inconsistency
        // and keep the archive rather than losing data.
        if let Err(e) = self.store.delete_range(start, count).await {
            warn!(
                archive_title = %archive_title,
                start,
                end = count,
                error = %e,
                "archive sheet created but source rows were not deleted"
            );
            return Err(CheckInError::ArchivalFailed(format!(
                "source delete failed after creating \"{archive_title}\": {e}"
            )));
        }

        Ok(Some(ArchiveReport {
            archive_title,
            rows_moved,
        }))
    }

    /// Fire-and-forget archival, invoked after a successful append.
    pub fn spawn_archival(self: Arc<Self>) {
        tokio::spawn(async move {
            match self.archive_if_over_threshold().await {
                Ok(Some(report)) => info!(
                    archive_title = %report.archive_title,
                    rows_moved = report.rows_moved,
                    "ledger rows archived"
                ),
                Ok(None) => {}
                Err(e) => error!(
                    error_code = e.error_code(),
                    detail = e.detail(),
                    "ledger archival failed"
                ),
            }
        });
    }
}
