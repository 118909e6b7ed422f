//! Power draw model for the mesh.

use crate::meshviewer::Node;

/// Base draw of an online node, in watts.
pub const BASE_WATTS: u64 = 5;

/// Additional draw per connected client, in watts.
pub const WATTS_PER_CLIENT: u64 = 1;

/// Estimate the total power draw of the mesh in watts.
///
/// Every online node adds `BASE_WATTS` plus `WATTS_PER_CLIENT` per client.
/// Offline nodes add nothing.
pub fn estimate(nodes: &[Node]) -> u64 {
    nodes
        .iter()
        .filter(|node| node.is_online)
        .map(|node| BASE_WATTS.saturating_add(node.clients.saturating_mul(WATTS_PER_CLIENT)))
        .fold(0, u64::saturating_add)
}
