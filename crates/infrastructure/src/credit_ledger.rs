use std::collections::HashMap;

use async_trait::async_trait;
use nodepool_core::config::CreditConfig;
use nodepool_core::errors::{SchedulerError, SchedulerResult};
use nodepool_core::traits::CreditGate;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 单个用户的积分账户
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditAccount {
    pub balance: u64,
    /// 已授权但尚未结算的任务预留
    pub reserved: u64,
}

impl CreditAccount {
    fn opened(initial_balance: u64) -> Self {
        Self {
            balance: initial_balance,
            reserved: 0,
        }
    }

    pub fn available(&self) -> u64 {
        self.balance.saturating_sub(self.reserved)
    }

    fn unreserve(&mut self, amount: u64) {
        self.reserved = self.reserved.saturating_sub(amount);
    }
}

/// 内存积分账本
///
/// 用户首次出现时以 `initial_balance` 开户。授权即预留预估费用，
/// 扣费和转账都只能动用未被预留的余额。
pub struct InMemoryCreditLedger {
    accounts: Mutex<HashMap<String, CreditAccount>>,
    initial_balance: u64,
    enabled: bool,
}

impl InMemoryCreditLedger {
    pub fn new(config: &CreditConfig) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            initial_balance: config.initial_balance,
            enabled: config.enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn account(&self, owner_id: &str) -> SchedulerResult<CreditAccount> {
        validate_owner(owner_id)?;
        let mut accounts = self.accounts.lock().await;
        Ok(*accounts
            .entry(owner_id.to_string())
            .or_insert_with(|| CreditAccount::opened(self.initial_balance)))
    }

    pub async fn balance(&self, owner_id: &str) -> u64 {
        self.account(owner_id)
            .await
            .map(|account| account.balance)
            .unwrap_or(0)
    }

    pub async fn deposit(&self, owner_id: &str, amount: u64) -> SchedulerResult<u64> {
        validate_owner(owner_id)?;
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .entry(owner_id.to_string())
            .or_insert_with(|| CreditAccount::opened(self.initial_balance));
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| SchedulerError::CreditGate("余额溢出".to_string()))?;
        info!("用户 {} 充值 {}, 余额 {}", owner_id, amount, account.balance);
        Ok(account.balance)
    }

    pub async fn transfer(&self, from: &str, to: &str, amount: u64) -> SchedulerResult<()> {
        validate_owner(from)?;
        validate_owner(to)?;
        if from == to {
            return Err(SchedulerError::invalid_input("不能向自己转账"));
        }
        if amount == 0 {
            return Err(SchedulerError::invalid_input("转账金额必须大于零"));
        }
        let mut accounts = self.accounts.lock().await;
        let source = *accounts
            .entry(from.to_string())
            .or_insert_with(|| CreditAccount::opened(self.initial_balance));
        if source.available() < amount {
            return Err(SchedulerError::InsufficientBalance {
                owner_id: from.to_string(),
                available: source.available(),
                requested: amount,
            });
        }
        let target = accounts
            .entry(to.to_string())
            .or_insert_with(|| CreditAccount::opened(self.initial_balance));
        target.balance = target
            .balance
            .checked_add(amount)
            .ok_or_else(|| SchedulerError::CreditGate("余额溢出".to_string()))?;
        if let Some(source) = accounts.get_mut(from) {
            source.balance -= amount;
        }
        info!("转账完成: {} -> {} 金额 {}", from, to, amount);
        Ok(())
    }
}

fn validate_owner(owner_id: &str) -> SchedulerResult<()> {
    if owner_id.trim().is_empty() {
        return Err(SchedulerError::invalid_input("用户ID不能为空"));
    }
    Ok(())
}

#[async_trait]
impl CreditGate for InMemoryCreditLedger {
    async fn authorize(&self, owner_id: &str, estimated_cost: u64) -> SchedulerResult<bool> {
        if !self.enabled {
            return Ok(true);
        }
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .entry(owner_id.to_string())
            .or_insert_with(|| CreditAccount::opened(self.initial_balance));
        let granted = account.available() >= estimated_cost;
        if granted {
            account.reserved += estimated_cost;
        }
        debug!(
            owner_id = owner_id,
            balance = account.balance,
            reserved = account.reserved,
            estimated_cost = estimated_cost,
            granted = granted,
            "积分授权检查"
        );
        Ok(granted)
    }

    async fn debit(&self, owner_id: &str, actual_cost: u64) -> SchedulerResult<()> {
        self.settle(owner_id, 0, actual_cost).await
    }

    async fn settle(&self, owner_id: &str, reserved: u64, actual_cost: u64) -> SchedulerResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .entry(owner_id.to_string())
            .or_insert_with(|| CreditAccount::opened(self.initial_balance));
        account.unreserve(reserved);
        if account.available() < actual_cost {
            warn!(
                "用户 {} 可用余额 {} 不足以扣除 {}",
                owner_id,
                account.available(),
                actual_cost
            );
            return Err(SchedulerError::CreditGate(format!(
                "用户 {owner_id} 余额不足"
            )));
        }
        account.balance -= actual_cost;
        debug!("用户 {} 扣费 {}, 余额 {}", owner_id, actual_cost, account.balance);
        Ok(())
    }

    async fn release(&self, owner_id: &str, reserved: u64) -> SchedulerResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut accounts = self.accounts.lock().await;
        if let Some(account) = accounts.get_mut(owner_id) {
            account.unreserve(reserved);
            debug!("用户 {} 释放预留 {}, 剩余预留 {}", owner_id, reserved, account.reserved);
        }
        Ok(())
    }
}
