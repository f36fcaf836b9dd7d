//! Cross-module invariants from the testable-properties section, exercised
//! as black-box property tests against the library's public API.

use primerl_bridge::registry::{NodeRecord, Registry};
use primerl_bridge::router::{Router, RoutingRequest};
use primerl_bridge::scheduler::score_node;
use primerl_bridge::session::SessionManager;
use proptest::prelude::*;
use std::collections::HashSet;

fn arb_node() -> impl Strategy<Value = NodeRecord> {
    (1u64..1_000_000, 0.0f64..10.0, 0.0f64..10.0).prop_map(|(free_hbm, link_bw, queue_penalty)| {
        NodeRecord {
            id: "n".to_string(),
            models: vec!["m".to_string()],
            free_hbm,
            link_bw,
            queue_penalty,
        }
    })
}

proptest! {
    #[test]
    fn scheduler_headroom_guard(node in arb_node(), kv_required in 1u64..1_000_000, slo in 1u32..5000) {
        let score = score_node(&node, false, kv_required, slo);
        let has_headroom = node.free_hbm as f64 > 1.1 * kv_required as f64;
        prop_assert_eq!(score.is_some(), has_headroom);
    }

    #[test]
    fn router_admissibility(nodes in proptest::collection::vec(arb_node(), 1..5), kv_required in 1u64..1_000_000) {
        let registry = Registry::new();
        let mut ids = HashSet::new();
        for (i, mut node) in nodes.into_iter().enumerate() {
            node.id = format!("n{i}");
            ids.insert(node.id.clone());
            registry.register_node(node);
        }

        let router = Router::new(&registry);
        let req = RoutingRequest {
            prompt_fp: None,
            kv_estimate: kv_required,
            slo_latency_ms: 250,
            model: "m".to_string(),
        };
        let routed = router.route(&req, &HashSet::new());
        prop_assert!(routed.is_some());
        prop_assert!(ids.contains(&routed.unwrap()));
    }

    #[test]
    fn session_length_invariant(
        batches in proptest::collection::vec(proptest::collection::vec(any::<bool>(), 0..8), 0..10)
    ) {
        let mgr = SessionManager::new();
        let sid = mgr.start("env".to_string(), "m".to_string());
        for batch in &batches {
            let tokens: Vec<String> = batch.iter().enumerate().map(|(i, _)| format!("t{i}")).collect();
            mgr.record_tokens(&sid, &tokens, batch).unwrap();
        }
        let session = mgr.get(&sid).unwrap();
        prop_assert_eq!(session.tokens.len(), session.accepted_mask.len());
    }
}
