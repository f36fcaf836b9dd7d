//! Model and node registry.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct ModelRecord {
    pub name: String,
    pub version: String,
    pub artifacts: HashMap<String, String>,
    pub metrics: HashMap<String, f64>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: String,
    pub models: Vec<String>,
    pub free_hbm: u64,
    pub link_bw: f64,
    pub queue_penalty: f64,
}

#[derive(Default)]
pub struct Registry {
    models: RwLock<HashMap<String, ModelRecord>>,
    nodes: RwLock<HashMap<String, NodeRecord>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_model(&self, record: ModelRecord) {
        self.models
            .write()
            .expect("registry lock poisoned")
            .insert(record.name.clone(), record);
    }

    pub fn register_node(&self, record: NodeRecord) {
        self.nodes
            .write()
            .expect("registry lock poisoned")
            .insert(record.id.clone(), record);
    }

    /// No-op if the node is unknown.
    pub fn update_node_capacity(&self, node_id: &str, free_hbm: u64, queue_penalty: f64) {
        let mut nodes = self.nodes.write().expect("registry lock poisoned");
        if let Some(node) = nodes.get_mut(node_id) {
            node.free_hbm = free_hbm;
            node.queue_penalty = queue_penalty;
        }
    }

    pub fn nodes_for_model(&self, model: &str) -> Vec<NodeRecord> {
        self.nodes
            .read()
            .expect("registry lock poisoned")
            .values()
            .filter(|n| n.models.iter().any(|m| m == model))
            .cloned()
            .collect()
    }

    pub fn artifact_path(&self, model: &str, artifact: &str) -> Option<String> {
        self.models
            .read()
            .expect("registry lock poisoned")
            .get(model)?
            .artifacts
            .get(artifact)
            .cloned()
    }
}
