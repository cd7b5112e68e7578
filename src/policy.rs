// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Network-origin access policy.
//!
//! Origins whose address starts with a configured prefix skip the proximity
//! gate and go straight to the identity handoff. Matching is plain string
//! prefix matching, not CIDR-aware: a coarse trust shortcut for a known
//! network (e.g. the campus LAN), not a security boundary. Proximity is the
//! default: an empty allow-list gates every origin.

/// Per-request decision on whether a proximity proof is required.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    trusted_prefixes: Vec<String>,
}

impl AccessPolicy {
    pub fn new(trusted_prefixes: Vec<String>) -> Self {
        Self { trusted_prefixes }
    }

    /// True unless the origin address matches a trusted prefix.
    pub fn requires_proximity_check(&self, client_origin: &str) -> bool {
        !self
            .trusted_prefixes
            .iter()
            .any(|prefix| client_origin.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_prefix_skips_the_gate() {
        let policy = AccessPolicy::new(vec!["127.0.0.1".to_string()]);
        assert!(!policy.requires_proximity_check("127.0.0.1"));
    }

    #[test]
    fn unlisted_origin_is_gated() {
        let policy = AccessPolicy::new(vec!["127.0.0.1".to_string(), "10.8.".to_string()]);
        assert!(policy.requires_proximity_check("203.0.113.7"));
        assert!(policy.requires_proximity_check("127.0.0.2"));
        assert!(!policy.requires_proximity_check("10.8.14.2"));
    }

    #[test]
    fn empty_allow_list_gates_everyone() {
        let policy = AccessPolicy::default();
        assert!(policy.requires_proximity_check("127.0.0.1"));
    }

    #[test]
    fn prefix_matching_is_string_based_not_network_based() {
        // "10.1" also matches 10.10.x.x, the documented looseness of
        // prefix matching. Configure full octets ("10.1.") to avoid it.
        let policy = AccessPolicy::new(vec!["10.1".to_string()]);
        assert!(!policy.requires_proximity_check("10.10.0.1"));
    }
}
