//! 外部协作方的测试替身

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nodepool_core::errors::{SchedulerError, SchedulerResult};
use nodepool_core::models::{NodeCommand, NodeId};
use nodepool_core::traits::{CreditGate, NodeNotifier};

/// 可控的积分网关，记录所有扣费
#[derive(Debug, Clone)]
pub struct MockCreditGate {
    allow: Arc<AtomicBool>,
    fail_debit: Arc<AtomicBool>,
    debits: Arc<Mutex<Vec<(String, u64)>>>,
    releases: Arc<Mutex<Vec<(String, u64)>>>,
}

impl MockCreditGate {
    pub fn new() -> Self {
        Self {
            allow: Arc::new(AtomicBool::new(true)),
            fail_debit: Arc::new(AtomicBool::new(false)),
            debits: Arc::new(Mutex::new(Vec::new())),
            releases: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn rejecting() -> Self {
        let gate = Self::new();
        gate.set_allow(false);
        gate
    }

    pub fn set_allow(&self, allow: bool) {
        self.allow.store(allow, Ordering::SeqCst);
    }

    pub fn set_fail_debit(&self, fail: bool) {
        self.fail_debit.store(fail, Ordering::SeqCst);
    }

    pub fn debits(&self) -> Vec<(String, u64)> {
        self.debits.lock().unwrap().clone()
    }

    pub fn releases(&self) -> Vec<(String, u64)> {
        self.releases.lock().unwrap().clone()
    }
}

impl Default for MockCreditGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CreditGate for MockCreditGate {
    async fn authorize(&self, _owner_id: &str, _estimated_cost: u64) -> SchedulerResult<bool> {
        Ok(self.allow.load(Ordering::SeqCst))
    }

    async fn debit(&self, owner_id: &str, actual_cost: u64) -> SchedulerResult<()> {
        if self.fail_debit.load(Ordering::SeqCst) {
            return Err(SchedulerError::CreditGate("mock debit failure".to_string()));
        }
        self.debits
            .lock()
            .unwrap()
            .push((owner_id.to_string(), actual_cost));
        Ok(())
    }

    async fn release(&self, owner_id: &str, reserved: u64) -> SchedulerResult<()> {
        self.releases
            .lock()
            .unwrap()
            .push((owner_id.to_string(), reserved));
        Ok(())
    }
}

/// 记录所有下发指令的节点通知器，可对指定节点模拟投递失败
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(NodeId, NodeCommand)>>>,
    unreachable: Arc<Mutex<HashSet<NodeId>>>,
    forgotten: Arc<Mutex<Vec<NodeId>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, node_id: &str, unreachable: bool) {
        let mut nodes = self.unreachable.lock().unwrap();
        if unreachable {
            nodes.insert(node_id.to_string());
        } else {
            nodes.remove(node_id);
        }
    }

    pub fn sent(&self) -> Vec<(NodeId, NodeCommand)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, node_id: &str) -> Vec<NodeCommand> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| target == node_id)
            .map(|(_, command)| command.clone())
            .collect()
    }

    pub fn forgotten(&self) -> Vec<NodeId> {
        self.forgotten.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeNotifier for RecordingNotifier {
    async fn dispatch(&self, node_id: &str, command: NodeCommand) -> SchedulerResult<()> {
        if self.unreachable.lock().unwrap().contains(node_id) {
            return Err(SchedulerError::notification(node_id, "mock unreachable"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((node_id.to_string(), command));
        Ok(())
    }

    async fn forget(&self, node_id: &str) {
        self.forgotten.lock().unwrap().push(node_id.to_string());
    }
}
