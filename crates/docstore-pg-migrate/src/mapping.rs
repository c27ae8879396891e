//! Source collection to destination table lookup.

use std::collections::BTreeMap;

use crate::error::{MigrateError, Result};

/// Built-in collection -> table associations, in migration order.
pub static BUILTIN_MAPPINGS: &[(&str, &str)] = &[
    ("users", "users"),
    ("investments", "investments"),
    ("user-investments", "user_investments"),
    ("transactions-mangopay", "transactions_mangopay"),
    ("transactions-blockchain", "transactions_blockchain"),
    ("reserves", "reserves"),
    ("dividends", "dividends"),
    ("dividend-claims", "dividend_claims"),
    ("wallets", "wallets"),
    ("kyc-results", "kyc_verifications"),
    ("documents", "documents"),
    ("fiscal-documents", "fiscal_documents"),
    ("user-bonuses", "user_bonuses"),
    ("user-notifications", "user_notifications"),
    ("user-panel", "user_preferences"),
];

/// One collection -> table association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionMapping {
    pub collection: String,
    pub table: String,
}

/// Resolves source collections to destination tables.
///
/// Built-in entries come first, then config-supplied extras in key order.
/// Lookups never guess: a collection without an entry is a mapping error.
#[derive(Debug, Clone)]
pub struct CollectionMapper {
    entries: Vec<CollectionMapping>,
}

impl Default for CollectionMapper {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CollectionMapper {
    pub fn builtin() -> Self {
        Self::from_pairs(BUILTIN_MAPPINGS.iter().copied())
    }

    /// Mapper with exactly the given associations. Later duplicates are ignored.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut mapper = Self {
            entries: Vec::new(),
        };
        for (collection, table) in pairs {
            mapper.push(collection, table);
        }
        mapper
    }

    /// Add config-supplied associations after the built-in ones.
    pub fn with_extra(mut self, extra: &BTreeMap<String, String>) -> Self {
        for (collection, table) in extra {
            self.push(collection, table);
        }
        self
    }

    fn push(&mut self, collection: &str, table: &str) {
        if self.contains(collection) {
            return;
        }
        self.entries.push(CollectionMapping {
            collection: collection.to_string(),
            table: table.to_string(),
        });
    }

    /// Destination table for `collection`.
    pub fn resolve(&self, collection: &str) -> Result<&str> {
        self.entries
            .iter()
            .find(|m| m.collection == collection)
            .map(|m| m.table.as_str())
            .ok_or_else(|| MigrateError::Mapping {
                collection: collection.to_string(),
            })
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.entries.iter().any(|m| m.collection == collection)
    }

    pub fn entries(&self) -> &[CollectionMapping] {
        &self.entries
    }

    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|m| m.collection.as_str())
    }
}
