//! Node scoring and slice selection.

use crate::registry::NodeRecord;

/// Score a candidate node for a placement. Returns `None` when the node
/// cannot safely host the request (headroom guard: free HBM must exceed
/// 110% of the estimated KV requirement).
pub fn score_node(node: &NodeRecord, warm: bool, kv_required: u64, slo_latency_ms: u32) -> Option<f64> {
    if node.free_hbm as f64 <= 1.1 * kv_required as f64 {
        return None;
    }
    let headroom = node.free_hbm as f64 / kv_required.max(1) as f64;
    let slo_penalty = (slo_latency_ms as f64 / 250.0).max(1.0);
    let warm_bonus = if warm { 0.2 } else { 0.0 };
    Some(headroom + node.link_bw - node.queue_penalty - slo_penalty + warm_bonus)
}

/// Pick the node best able to host `required_kv` bytes among `candidates`,
/// preferring the most free headroom, then the lowest queue penalty, then
/// the highest link bandwidth.
pub fn pick_slice(required_kv: u64, candidates: &[NodeRecord]) -> Option<String> {
    let mut sorted: Vec<&NodeRecord> = candidates
        .iter()
        .filter(|n| n.free_hbm as f64 > 1.1 * required_kv as f64)
        .collect();

    sorted.sort_by(|a, b| {
        let headroom_a = a.free_hbm as f64 - required_kv as f64;
        let headroom_b = b.free_hbm as f64 - required_kv as f64;
        headroom_b
            .partial_cmp(&headroom_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.queue_penalty
                    .partial_cmp(&b.queue_penalty)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| {
                b.link_bw
                    .partial_cmp(&a.link_bw)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });

    sorted.first().map(|n| n.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, free_hbm: u64, link_bw: f64, queue_penalty: f64) -> NodeRecord {
        NodeRecord {
            id: id.to_string(),
            models: vec![],
            free_hbm,
            link_bw,
            queue_penalty,
        }
    }

    #[test]
    fn score_node_rejects_insufficient_headroom() {
        let n = node("a", 1000, 1.0, 0.0);
        assert_eq!(score_node(&n, false, 1000, 250), None);
        assert_eq!(score_node(&n, false, 910, 250), None);
    }

    #[test]
    fn score_node_accepts_with_headroom() {
        let n = node("a", 10_000, 1.0, 0.0);
        assert!(score_node(&n, false, 1000, 250).is_some());
    }

    #[test]
    fn warm_bonus_increases_score() {
        let n = node("a", 10_000, 1.0, 0.0);
        let cold = score_node(&n, false, 1000, 250).unwrap();
        let warm = score_node(&n, true, 1000, 250).unwrap();
        assert!(warm > cold);
        assert!((warm - cold - 0.2).abs() < 1e-9);
    }

    #[test]
    fn pick_slice_prefers_headroom_then_queue_then_bandwidth() {
        let candidates = vec![
            node("low-headroom", 2_100, 5.0, 0.0),
            node("best", 10_000, 1.0, 0.0),
            node("tied-queue", 10_000, 2.0, 0.1),
        ];
        assert_eq!(pick_slice(1000, &candidates), Some("best".to_string()));
    }

    #[test]
    fn pick_slice_excludes_nodes_without_headroom() {
        let candidates = vec![node("tight", 1050, 1.0, 0.0)];
        assert_eq!(pick_slice(1000, &candidates), None);
    }

    #[test]
    fn pick_slice_empty_candidates_is_none() {
        assert_eq!(pick_slice(1000, &[]), None);
    }
}
