//! Weighted transport selection
//!
//! For every requested transport type, one advertised transport endpoint is
//! drawn with probability proportional to its weight. The draw walks the
//! group in manifest order and picks the first member whose cumulative
//! weight ratio exceeds a uniform seed in `[0, 1)`.

use std::collections::HashMap;

use rand::Rng;

use super::{ClusterEndpointsManifest, TransportEndpoint};

/// Selected public endpoints, keyed by transport type
pub type EndpointSelection = HashMap<String, Vec<String>>;

/// Group the manifest's transports by type, keeping only requested types.
///
/// Members keep their manifest order (node order, then transport order).
pub fn group_by_type<'a>(
    manifest: &'a ClusterEndpointsManifest,
    transport_types: &[String],
) -> HashMap<&'a str, Vec<&'a TransportEndpoint>> {
    let mut groups: HashMap<&str, Vec<&TransportEndpoint>> = HashMap::new();
    for transport in manifest.transports() {
        if transport_types.iter().any(|t| *t == transport.transport_type) {
            groups
                .entry(transport.transport_type.as_str())
                .or_default()
                .push(transport);
        }
    }
    groups
}

/// Pick one member of `group` given a uniform `seed` in `[0, 1)`.
///
/// A single-member group always yields that member. Otherwise a group whose
/// total weight is not positive yields nothing. Negative weights count as 0.
pub fn select_weighted<'a>(
    group: &[&'a TransportEndpoint],
    seed: f64,
) -> Option<&'a TransportEndpoint> {
    if let [only] = group {
        return Some(*only);
    }

    let total: f64 = group.iter().map(|t| t.effective_weight()).sum();
    if total <= 0.0 {
        return None;
    }

    let mut cumulative = 0.0;
    for transport in group {
        cumulative += transport.effective_weight();
        if cumulative / total > seed {
            return Some(*transport);
        }
    }

    // Rounding can leave the final ratio a hair below a seed close to 1.0
    group.iter().rev().find(|t| t.effective_weight() > 0.0).copied()
}

/// Run one weighted draw per requested transport type.
///
/// Types with no advertised transport, or no viable weight, are absent.
pub fn select_endpoints<R: Rng>(
    manifest: &ClusterEndpointsManifest,
    transport_types: &[String],
    rng: &mut R,
) -> EndpointSelection {
    group_by_type(manifest, transport_types)
        .into_iter()
        .filter_map(|(transport_type, group)| {
            let seed: f64 = rng.gen();
            select_weighted(&group, seed)
                .map(|chosen| (transport_type.to_string(), chosen.public_endpoints.clone()))
        })
        .collect()
}
