//! Syncable entity payloads.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of entity the store tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Money movements. Full create/update/delete offline semantics.
    Transaction,
    /// Accounts. Reduced variant: no local create, no soft delete.
    Account,
}

impl EntityKind {
    /// Returns the lowercase name used in logs and table names.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Transaction => "transaction",
            EntityKind::Account => "account",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain payload that can live in the record store.
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Kind tag for this entity.
    const KIND: EntityKind;

    /// Backing table name.
    const TABLE: &'static str;

    /// Whether records may be created locally with a placeholder identity
    /// and soft-deleted before the server confirms.
    const OFFLINE_MUTABLE: bool;
}

/// A single money movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Owning account (server identity).
    pub account_id: i64,
    /// Category reference (server identity).
    pub category_id: i64,
    /// Amount in minor units.
    pub amount: i64,
    /// ISO-8601 date of the transaction.
    pub transaction_date: String,
    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Entity for Transaction {
    const KIND: EntityKind = EntityKind::Transaction;
    const TABLE: &'static str = "transactions";
    const OFFLINE_MUTABLE: bool = true;
}

/// A user account as cached from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Display name.
    pub name: String,
    /// Balance in minor units.
    pub balance: i64,
    /// ISO-4217 currency code.
    pub currency: String,
}

impl Entity for Account {
    const KIND: EntityKind = EntityKind::Account;
    const TABLE: &'static str = "accounts";
    const OFFLINE_MUTABLE: bool = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_wire_shape() {
        let tx = Transaction {
            account_id: 1,
            category_id: 3,
            amount: 500,
            transaction_date: "2026-03-01T10:00:00Z".into(),
            comment: None,
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["categoryId"], 3);
        assert_eq!(json["amount"], 500);
        assert!(json.get("comment").is_none());
    }

    #[test]
    fn kinds() {
        assert!(Transaction::OFFLINE_MUTABLE);
        assert!(!Account::OFFLINE_MUTABLE);
        assert_eq!(Account::KIND.to_string(), "account");
    }
}
