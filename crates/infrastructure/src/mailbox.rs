use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodepool_core::errors::{SchedulerError, SchedulerResult};
use nodepool_core::models::{NodeCommand, NodeId};
use nodepool_core::traits::NodeNotifier;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Default)]
struct Mailbox {
    commands: Mutex<VecDeque<NodeCommand>>,
    notify: Notify,
}

/// 节点指令信箱
///
/// 每个节点一个有界队列，节点通过长轮询 [`MailboxNotifier::poll`] 取走指令。
pub struct MailboxNotifier {
    mailboxes: RwLock<HashMap<NodeId, Arc<Mailbox>>>,
    capacity: usize,
}

impl MailboxNotifier {
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new(capacity: usize) -> Self {
        Self {
            mailboxes: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    async fn mailbox(&self, node_id: &str) -> Arc<Mailbox> {
        if let Some(mailbox) = self.mailboxes.read().await.get(node_id) {
            return mailbox.clone();
        }
        self.mailboxes
            .write()
            .await
            .entry(node_id.to_string())
            .or_default()
            .clone()
    }

    /// 取走节点的全部待处理指令；为空时最多等待 `wait`
    pub async fn poll(&self, node_id: &str, wait: Duration) -> Vec<NodeCommand> {
        let mailbox = self.mailbox(node_id).await;
        let deadline = Instant::now() + wait;
        loop {
            let notified = mailbox.notify.notified();
            {
                let mut commands = mailbox.commands.lock().await;
                if !commands.is_empty() {
                    return commands.drain(..).collect();
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Vec::new();
            }
        }
    }

    pub async fn pending(&self, node_id: &str) -> usize {
        match self.mailboxes.read().await.get(node_id) {
            Some(mailbox) => mailbox.commands.lock().await.len(),
            None => 0,
        }
    }
}

impl Default for MailboxNotifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl NodeNotifier for MailboxNotifier {
    async fn dispatch(&self, node_id: &str, command: NodeCommand) -> SchedulerResult<()> {
        let mailbox = self.mailbox(node_id).await;
        {
            let mut commands = mailbox.commands.lock().await;
            if commands.len() >= self.capacity {
                warn!("节点 {} 指令队列已满, 丢弃任务 {} 的指令", node_id, command.task_id());
                return Err(SchedulerError::notification(node_id, "指令队列已满"));
            }
            debug!("指令入队: 节点 {} 任务 {}", node_id, command.task_id());
            commands.push_back(command);
        }
        mailbox.notify.notify_one();
        Ok(())
    }

    async fn forget(&self, node_id: &str) {
        if let Some(mailbox) = self.mailboxes.write().await.remove(node_id) {
            mailbox.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(task_id: &str) -> NodeCommand {
        NodeCommand::Stop {
            task_id: task_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_poll_returns_queued_commands_in_order() {
        let notifier = MailboxNotifier::default();
        notifier.dispatch("n1", stop("t1")).await.unwrap();
        notifier.dispatch("n1", stop("t2")).await.unwrap();
        assert_eq!(notifier.pending("n1").await, 2);

        let commands = notifier.poll("n1", Duration::from_secs(1)).await;
        assert_eq!(commands, vec![stop("t1"), stop("t2")]);
        assert_eq!(notifier.pending("n1").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_when_empty() {
        let notifier = MailboxNotifier::default();
        let commands = notifier.poll("n1", Duration::from_secs(25)).await;
        assert!(commands.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_wakes_on_dispatch() {
        let notifier = Arc::new(MailboxNotifier::default());
        let poller = {
            let notifier = notifier.clone();
            tokio::spawn(async move { notifier.poll("n1", Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        notifier.dispatch("n1", stop("t1")).await.unwrap();
        let commands = poller.await.unwrap();
        assert_eq!(commands, vec![stop("t1")]);
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let notifier = MailboxNotifier::new(1);
        notifier.dispatch("n1", stop("t1")).await.unwrap();
        assert!(matches!(
            notifier.dispatch("n1", stop("t2")).await,
            Err(SchedulerError::Notification { .. })
        ));
        notifier.forget("n1").await;
        assert_eq!(notifier.pending("n1").await, 0);
    }
}
