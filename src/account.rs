//! Accounts and the account manager interface
//!
//! The broker only needs two things from account storage: look an account up
//! by id, and apply the balance effect of an executed order atomically.
//! [`InMemoryAccountManager`] is the storage used by the simulator and tests.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::oms::{AccountId, Order};
use crate::{Balance, Price};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("account not found: {0}")]
    NotFound(AccountId),

    #[error("account already exists: {0}")]
    AlreadyExists(AccountId),
}

/// A brokerage account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Balance,
}

impl Account {
    pub fn new(id: impl Into<AccountId>, balance: Balance) -> Self {
        Self {
            id: id.into(),
            balance,
        }
    }

    /// Apply the financial effect of an executed order.
    ///
    /// Buys debit `quantity * price`, sells credit it. The balance may go negative.
    pub fn reflect_order(&mut self, order: &Order, execution_price: Price) {
        let quantity = i64::try_from(order.quantity).unwrap_or(i64::MAX);
        let amount = execution_price.saturating_mul(quantity);
        if order.is_buy() {
            self.balance = self.balance.saturating_sub(amount);
        } else {
            self.balance = self.balance.saturating_add(amount);
        }
        debug!(
            account = %self.id,
            order_id = order.id,
            amount,
            balance = self.balance,
            "Order reflected in account"
        );
    }
}

/// Account storage consumed by the trade execution processor
pub trait AccountManager: Send + Sync {
    /// Snapshot of the account
    fn get_account(&self, id: &str) -> Result<Account, AccountError>;

    /// Look the order's account up and apply the order's balance effect
    fn reflect_order(&self, order: &Order, execution_price: Price) -> Result<Account, AccountError>;
}

/// Account manager backed by a map
#[derive(Debug, Default)]
pub struct InMemoryAccountManager {
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl InMemoryAccountManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_account(
        &self,
        id: impl Into<AccountId>,
        balance: Balance,
    ) -> Result<Account, AccountError> {
        let account = Account::new(id, balance);
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&account.id) {
            return Err(AccountError::AlreadyExists(account.id));
        }
        info!(account = %account.id, balance, "Account created");
        accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}

impl AccountManager for InMemoryAccountManager {
    fn get_account(&self, id: &str) -> Result<Account, AccountError> {
        self.accounts
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| AccountError::NotFound(id.to_string()))
    }

    fn reflect_order(&self, order: &Order, execution_price: Price) -> Result<Account, AccountError> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(&order.account_id)
            .ok_or_else(|| AccountError::NotFound(order.account_id.clone()))?;
        account.reflect_order(order, execution_price);
        Ok(account.clone())
    }
}
