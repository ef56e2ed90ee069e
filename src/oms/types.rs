//! Core order types
//!
//! Defines orders, order kinds and boundary validation.

use crate::{Price, Side, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Order ID type - u64 for performance
pub type OrderId = u64;

/// Account identifier
pub type AccountId = String;

/// Atomic counter for fast order ID generation
static ORDER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate next order ID (thread-safe, lock-free)
pub fn next_order_id() -> OrderId {
    ORDER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Order kind - determines which queue holds the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Buy at the market as soon as the market is open
    MarketBuy,

    /// Sell at the market as soon as the market is open
    MarketSell,

    /// Buy stop: dispatchable once the market price reaches or exceeds the limit
    StopBuy,

    /// Sell stop: dispatchable once the market price drops to or below the limit
    StopSell,
}

impl OrderKind {
    pub fn side(&self) -> Side {
        match self {
            OrderKind::MarketBuy | OrderKind::StopBuy => Side::Buy,
            OrderKind::MarketSell | OrderKind::StopSell => Side::Sell,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, OrderKind::StopBuy | OrderKind::StopSell)
    }
}

/// Largest quantity an order may carry; settlement converts it to a `Balance`
pub const MAX_QUANTITY: u64 = i64::MAX as u64;

/// Order validation errors, raised before an order reaches any queue
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order {0}: quantity must be > 0")]
    ZeroQuantity(OrderId),

    #[error("order {id}: quantity {quantity} exceeds the maximum of {max}", max = MAX_QUANTITY)]
    QuantityTooLarge { id: OrderId, quantity: u64 },

    #[error("order {0}: account id is empty")]
    MissingAccount(OrderId),

    #[error("order {0}: symbol is empty")]
    MissingSymbol(OrderId),

    #[error("order {id}: stop orders need a positive limit price, got {price:?}")]
    InvalidStopPrice { id: OrderId, price: Option<Price> },

    #[error("order {id}: market orders carry no limit price, got {price}")]
    UnexpectedPrice { id: OrderId, price: Price },
}

/// A broker order
///
/// Identity (id, account, symbol, quantity) and the stop limit price are fixed
/// at creation. Whichever queue holds the order owns it; dispatch moves it into
/// the order processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID
    pub id: OrderId,

    /// Account placing the order
    pub account_id: AccountId,

    /// Stock being traded
    pub symbol: Symbol,

    /// Market or stop, buy or sell
    pub kind: OrderKind,

    /// Number of shares
    pub quantity: u64,

    /// Stop limit price (stop orders only)
    pub price: Option<Price>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Order {
    fn new(
        account_id: impl Into<AccountId>,
        symbol: Symbol,
        kind: OrderKind,
        quantity: u64,
        price: Option<Price>,
    ) -> Self {
        Self {
            id: next_order_id(),
            account_id: account_id.into(),
            symbol,
            kind,
            quantity,
            price,
            created_at: Utc::now(),
        }
    }

    pub fn market_buy(account_id: impl Into<AccountId>, symbol: Symbol, quantity: u64) -> Self {
        Self::new(account_id, symbol, OrderKind::MarketBuy, quantity, None)
    }

    pub fn market_sell(account_id: impl Into<AccountId>, symbol: Symbol, quantity: u64) -> Self {
        Self::new(account_id, symbol, OrderKind::MarketSell, quantity, None)
    }

    pub fn stop_buy(
        account_id: impl Into<AccountId>,
        symbol: Symbol,
        quantity: u64,
        price: Price,
    ) -> Self {
        Self::new(account_id, symbol, OrderKind::StopBuy, quantity, Some(price))
    }

    pub fn stop_sell(
        account_id: impl Into<AccountId>,
        symbol: Symbol,
        quantity: u64,
        price: Price,
    ) -> Self {
        Self::new(account_id, symbol, OrderKind::StopSell, quantity, Some(price))
    }

    pub fn side(&self) -> Side {
        self.kind.side()
    }

    pub fn is_buy(&self) -> bool {
        self.side() == Side::Buy
    }

    /// Stop limit price; market orders report 0 so price-based filters never see them
    pub fn limit_price(&self) -> Price {
        self.price.unwrap_or(0)
    }

    /// Check that the order is well formed
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.quantity == 0 {
            return Err(OrderError::ZeroQuantity(self.id));
        }
        if self.quantity > MAX_QUANTITY {
            return Err(OrderError::QuantityTooLarge {
                id: self.id,
                quantity: self.quantity,
            });
        }
        if self.account_id.trim().is_empty() {
            return Err(OrderError::MissingAccount(self.id));
        }
        if self.symbol.as_str().trim().is_empty() {
            return Err(OrderError::MissingSymbol(self.id));
        }

        match (self.kind.is_stop(), self.price) {
            (true, Some(price)) if price > 0 => Ok(()),
            (true, price) => Err(OrderError::InvalidStopPrice { id: self.id, price }),
            (false, Some(price)) => Err(OrderError::UnexpectedPrice { id: self.id, price }),
            (false, None) => Ok(()),
        }
    }
}

impl std::fmt::Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {:?} {} x{} acct={}",
            self.id, self.kind, self.symbol, self.quantity, self.account_id
        )?;
        if let Some(price) = self.price {
            write!(f, " @{}", price)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_generation() {
        let id1 = next_order_id();
        let id2 = next_order_id();
        assert!(id2 > id1);
    }

    #[test]
    fn test_order_constructors() {
        let order = Order::stop_buy("acct-1", Symbol::new("BA"), 10, 95);
        assert_eq!(order.kind, OrderKind::StopBuy);
        assert_eq!(order.price, Some(95));
        assert!(order.is_buy());
        assert!(order.validate().is_ok());

        let order = Order::market_sell("acct-1", Symbol::new("BA"), 3);
        assert_eq!(order.side(), Side::Sell);
        assert_eq!(order.limit_price(), 0);
        assert!(order.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_orders() {
        let order = Order::market_buy("acct-1", Symbol::new("BA"), 0);
        assert_eq!(order.validate(), Err(OrderError::ZeroQuantity(order.id)));

        let order = Order::market_buy("acct-1", Symbol::new("BA"), u64::MAX);
        assert_eq!(
            order.validate(),
            Err(OrderError::QuantityTooLarge {
                id: order.id,
                quantity: u64::MAX
            })
        );
        assert!(Order::stop_sell("acct-1", Symbol::new("BA"), MAX_QUANTITY, 5)
            .validate()
            .is_ok());

        let order = Order::market_buy("  ", Symbol::new("BA"), 1);
        assert_eq!(order.validate(), Err(OrderError::MissingAccount(order.id)));

        let order = Order::market_buy("acct-1", Symbol::new(""), 1);
        assert_eq!(order.validate(), Err(OrderError::MissingSymbol(order.id)));

        let order = Order::stop_sell("acct-1", Symbol::new("BA"), 1, 0);
        assert!(matches!(
            order.validate(),
            Err(OrderError::InvalidStopPrice { price: Some(0), .. })
        ));

        let mut order = Order::stop_buy("acct-1", Symbol::new("BA"), 1, 10);
        order.price = None;
        assert!(matches!(
            order.validate(),
            Err(OrderError::InvalidStopPrice { price: None, .. })
        ));

        let mut order = Order::market_buy("acct-1", Symbol::new("BA"), 1);
        order.price = Some(12);
        assert!(matches!(
            order.validate(),
            Err(OrderError::UnexpectedPrice { price: 12, .. })
        ));
    }

    #[test]
    fn test_kind_serde_snake_case() {
        let json = serde_json::to_string(&OrderKind::StopSell).unwrap();
        assert_eq!(json, "\"stop_sell\"");
    }
}
