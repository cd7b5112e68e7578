// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Proximity evaluation.
//!
//! Pure great-circle math, no I/O. Callers are responsible for rejecting
//! requests with missing or non-numeric coordinates before evaluating; by
//! the time a claim reaches this module it is a well-formed pair.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Result of evaluating a location claim against the reference point.
#[derive(Debug, Clone, Copy)]
pub struct Proximity {
    pub within_bounds: bool,
    pub distance_meters: f64,
}

/// Decide whether `claim` lies within `max_radius_meters` of `reference`.
///
/// A distance exactly equal to the radius counts as within bounds.
pub fn evaluate(claim: Coordinates, reference: Coordinates, max_radius_meters: f64) -> Proximity {
    let distance_meters = haversine_meters(claim, reference);
    Proximity {
        within_bounds: distance_meters <= max_radius_meters,
        distance_meters,
    }
}

/// Haversine great-circle distance between two points, in meters.
fn haversine_meters(a: Coordinates, b: Coordinates) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}
