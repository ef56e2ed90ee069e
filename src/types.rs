//! Core data types used across the broker

use serde::{Deserialize, Serialize};

/// Share price in whole currency units (integer, as quoted by the exchange)
pub type Price = i64;

/// Account balance in whole currency units
pub type Balance = i64;

/// Stock ticker symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every order, queue name and manager key.
/// Using Arc<str> instead of String keeps those clones to a refcount bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_clone_shares_storage() {
        let a = Symbol::new("BA");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(b.as_str(), "BA");
        assert_eq!(b.to_string(), "BA");
    }

    #[test]
    fn test_symbol_serde_transparent() {
        let symbol = Symbol::new("F");
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"F\"");
        let back: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(back, symbol);
    }
}
