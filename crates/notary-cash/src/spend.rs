//! The notary's double-spend set (§4.7, §6 storage-plugin contract:
//! `checkAndMarkTokenSpent(notary, unit, series, id) -> {FreshlyMarked,
//! AlreadySpent}`). Backed by its own sled tree — this is a separate
//! storage concern from `notary-ledger::StateDb` (keyed by token identity,
//! not by account), so it gets its own small wrapper rather than being
//! folded into the ledger crate.

use std::path::Path;

use notary_core::error::NotaryError;
use notary_core::types::{NotaryId, UnitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendResult {
    FreshlyMarked,
    AlreadySpent,
}

pub struct SpendLedger {
    spent: sled::Tree,
}

fn storage_err(e: impl std::fmt::Display) -> NotaryError {
    NotaryError::Storage(e.to_string())
}

fn key(notary: &NotaryId, unit: &UnitId, series: u64, id: &[u8; 32]) -> Vec<u8> {
    let mut k = Vec::with_capacity(32 + 32 + 8 + 32);
    k.extend_from_slice(notary.as_bytes());
    k.extend_from_slice(unit.as_bytes());
    k.extend_from_slice(&series.to_be_bytes());
    k.extend_from_slice(id);
    k
}

impl SpendLedger {
    pub fn open<P: AsRef<Path>>(db: &sled::Db, _path: P) -> Result<Self, NotaryError> {
        Ok(Self { spent: db.open_tree("spent_tokens").map_err(storage_err)? })
    }

    pub fn from_tree(tree: sled::Tree) -> Self {
        Self { spent: tree }
    }

    /// Atomic check-and-set: a token id can be `FreshlyMarked` at most once
    /// across all notary runs, for a given `(notary, unit, series, id)`.
    pub fn check_and_mark_token_spent(
        &self,
        notary: &NotaryId,
        unit: &UnitId,
        series: u64,
        id: &[u8; 32],
    ) -> Result<SpendResult, NotaryError> {
        let k = key(notary, unit, series, id);
        let prior = self.spent.insert(k, &[1u8]).map_err(storage_err)?;
        Ok(if prior.is_some() { SpendResult::AlreadySpent } else { SpendResult::FreshlyMarked })
    }

    pub fn is_spent(&self, notary: &NotaryId, unit: &UnitId, series: u64, id: &[u8; 32]) -> Result<bool, NotaryError> {
        let k = key(notary, unit, series, id);
        Ok(self.spent.contains_key(k).map_err(storage_err)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_mark_is_fresh_second_is_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let ledger = SpendLedger::open(&db, dir.path()).unwrap();
        let notary = NotaryId::from_bytes([1u8; 32]);
        let unit = UnitId::from_bytes([2u8; 32]);
        let id = [7u8; 32];

        assert_eq!(ledger.check_and_mark_token_spent(&notary, &unit, 1, &id).unwrap(), SpendResult::FreshlyMarked);
        assert_eq!(ledger.check_and_mark_token_spent(&notary, &unit, 1, &id).unwrap(), SpendResult::AlreadySpent);
        assert!(ledger.is_spent(&notary, &unit, 1, &id).unwrap());
    }

    #[test]
    fn distinct_series_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let ledger = SpendLedger::open(&db, dir.path()).unwrap();
        let notary = NotaryId::from_bytes([1u8; 32]);
        let unit = UnitId::from_bytes([2u8; 32]);
        let id = [7u8; 32];

        assert_eq!(ledger.check_and_mark_token_spent(&notary, &unit, 1, &id).unwrap(), SpendResult::FreshlyMarked);
        assert_eq!(ledger.check_and_mark_token_spent(&notary, &unit, 2, &id).unwrap(), SpendResult::FreshlyMarked);
    }
}
