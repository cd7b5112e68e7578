// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Attend Server - QR Attendance Check-in Service
//!
//! This crate implements a token-gated, location-aware attendance check-in
//! workflow: a user scans a short-lived QR code, optionally proves physical
//! proximity via device geolocation, signs in with an external identity
//! provider, and has a timestamped row written to a spreadsheet-backed
//! ledger.
//!
//! ## Modules
//!
//! - `api` - HTTP surface (Axum)
//! - `checkin` - check-in orchestrator state machine
//! - `token` - short-lived signed check-in tokens
//! - `geo` - haversine proximity evaluation
//! - `policy` - network-origin access policy
//! - `identity` - external identity handoff
//! - `ledger` - attendance ledger with capacity-triggered archival
//! - `session` - pending check-in session store
//! - `qr` - QR image rendering

pub mod api;
pub mod checkin;
pub mod config;
pub mod error;
pub mod geo;
pub mod identity;
pub mod ledger;
pub mod policy;
pub mod qr;
pub mod session;
pub mod state;
pub mod token;
