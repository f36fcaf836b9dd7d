//! Request-to-node routing.

use crate::registry::Registry;
use crate::scheduler::score_node;
use rand::seq::SliceRandom;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct RoutingRequest {
    pub prompt_fp: Option<[u8; 16]>,
    pub kv_estimate: u64,
    pub slo_latency_ms: u32,
    pub model: String,
}

pub struct Router<'a> {
    registry: &'a Registry,
}

impl<'a> Router<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Route a request to a node id, preferring warm (cache-hit) nodes,
    /// falling back to the best-scoring node, then a uniform-random
    /// candidate, and only returning `None` if no node serves the model.
    pub fn route(&self, req: &RoutingRequest, warm_nodes: &HashSet<String>) -> Option<String> {
        let candidates = self.registry.nodes_for_model(&req.model);
        if candidates.is_empty() {
            return None;
        }

        let mut scored: Vec<(String, f64)> = candidates
            .iter()
            .filter_map(|node| {
                let warm = warm_nodes.contains(&node.id);
                score_node(node, warm, req.kv_estimate, req.slo_latency_ms)
                    .map(|score| (node.id.clone(), score))
            })
            .collect();

        if !scored.is_empty() {
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
            return Some(scored[0].0.clone());
        }

        // No node has headroom; fall back to a uniform-random candidate
        // rather than rejecting the request outright.
        candidates.choose(&mut rand::thread_rng()).map(|n| n.id.clone())
    }
}
