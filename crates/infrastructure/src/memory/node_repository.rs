use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use nodepool_core::errors::{SchedulerError, SchedulerResult};
use nodepool_core::models::{NodeId, WorkerNode};
use nodepool_core::traits::{NodeEntry, NodeRepository};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// 内存节点仓储，按node_id有序
#[derive(Default)]
pub struct InMemoryNodeRepository {
    nodes: RwLock<BTreeMap<NodeId, NodeEntry>>,
}

impl InMemoryNodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeRepository for InMemoryNodeRepository {
    async fn get_or_insert(&self, node: WorkerNode) -> SchedulerResult<(NodeEntry, bool)> {
        let mut nodes = self.nodes.write().await;
        if let Some(existing) = nodes.get(&node.id) {
            return Ok((existing.clone(), false));
        }
        let id = node.id.clone();
        let entry = Arc::new(Mutex::new(node));
        nodes.insert(id, entry.clone());
        Ok((entry, true))
    }

    async fn entry(&self, node_id: &str) -> SchedulerResult<NodeEntry> {
        self.nodes
            .read()
            .await
            .get(node_id)
            .cloned()
            .ok_or_else(|| SchedulerError::unknown_node(node_id))
    }

    async fn entries(&self) -> SchedulerResult<Vec<NodeEntry>> {
        Ok(self.nodes.read().await.values().cloned().collect())
    }

    async fn remove_if(
        &self,
        node_id: &str,
        predicate: &(dyn for<'n> Fn(&'n WorkerNode) -> bool + Send + Sync),
    ) -> SchedulerResult<bool> {
        let mut nodes = self.nodes.write().await;
        let Some(entry) = nodes.get(node_id).cloned() else {
            return Ok(false);
        };
        let mut node = entry.lock().await;
        if !predicate(&node) {
            return Ok(false);
        }
        node.retired = true;
        nodes.remove(node_id);
        debug!("节点记录已移除: {}", node_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodepool_core::models::{NodeFilter, NodeHealth, NodeRegistration, ResourceSpec};
    use tokio::time::Instant;

    fn node(id: &str) -> WorkerNode {
        WorkerNode::from_registration(
            NodeRegistration {
                node_id: id.to_string(),
                hostname: None,
                capacity: ResourceSpec::default(),
                container_isolation: true,
            },
            Instant::now(),
        )
    }

    #[tokio::test]
    async fn test_get_or_insert_keeps_existing() {
        let repo = InMemoryNodeRepository::new();
        let (_, inserted) = repo.get_or_insert(node("n1")).await.unwrap();
        assert!(inserted);
        let mut replacement = node("n1");
        replacement.hostname = Some("other".to_string());
        let (entry, inserted) = repo.get_or_insert(replacement).await.unwrap();
        assert!(!inserted);
        assert_eq!(entry.lock().await.hostname, None);
    }

    #[tokio::test]
    async fn test_list_sorted_by_id() {
        let repo = InMemoryNodeRepository::new();
        for id in ["n3", "n1", "n2"] {
            repo.get_or_insert(node(id)).await.unwrap();
        }
        let nodes = repo.list(&NodeFilter::default()).await.unwrap();
        let ids: Vec<_> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2", "n3"]);
    }

    #[tokio::test]
    async fn test_remove_if_marks_retired() {
        let repo = InMemoryNodeRepository::new();
        let (entry, _) = repo.get_or_insert(node("n1")).await.unwrap();
        let removed = repo
            .remove_if("n1", &|n| n.health == NodeHealth::Dead)
            .await
            .unwrap();
        assert!(!removed);

        entry.lock().await.health = NodeHealth::Dead;
        let removed = repo
            .remove_if("n1", &|n| n.health == NodeHealth::Dead)
            .await
            .unwrap();
        assert!(removed);
        assert!(entry.lock().await.retired);
        assert!(matches!(
            repo.entry("n1").await,
            Err(SchedulerError::UnknownNode { .. })
        ));
    }
}
