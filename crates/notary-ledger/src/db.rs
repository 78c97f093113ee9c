use std::path::Path;

use notary_core::error::NotaryError;
use notary_core::types::{AccountId, NymId, NotaryId, UnitId};

use crate::models::{Account, Notary, Nym, Unit};
use crate::numbers::NumberLedger;
use crate::receipts::Inbox;

/// Persistent state database backed by sled (pure-Rust, no C dependencies).
/// An implementation of the storage-plugin contract named in §6; the storage
/// layer itself is an out-of-scope external collaborator, so this is "a"
/// concrete plugin, not the only legal one.
///
/// Named trees:
///   nyms          — NymId bytes              → bincode(Nym)
///   notary        — "self" meta key           → bincode(Notary)
///   units         — UnitId bytes              → bincode(Unit)
///   accounts      — AccountId bytes           → bincode(Account)
///   numbers       — NymId || NotaryId bytes   → bincode(NumberLedger)
///   inboxes       — AccountId bytes           → bincode(Inbox)
///   meta          — utf8 key bytes            → raw bytes
pub struct StateDb {
    db: sled::Db,
    nyms: sled::Tree,
    notary: sled::Tree,
    units: sled::Tree,
    accounts: sled::Tree,
    numbers: sled::Tree,
    inboxes: sled::Tree,
    nymboxes: sled::Tree,
    meta: sled::Tree,
}

fn storage_err(e: impl std::fmt::Display) -> NotaryError {
    NotaryError::Storage(e.to_string())
}

impl StateDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, NotaryError> {
        let db = sled::open(path).map_err(storage_err)?;
        Ok(Self {
            nyms: db.open_tree("nyms").map_err(storage_err)?,
            notary: db.open_tree("notary").map_err(storage_err)?,
            units: db.open_tree("units").map_err(storage_err)?,
            accounts: db.open_tree("accounts").map_err(storage_err)?,
            numbers: db.open_tree("numbers").map_err(storage_err)?,
            inboxes: db.open_tree("inboxes").map_err(storage_err)?,
            nymboxes: db.open_tree("nymboxes").map_err(storage_err)?,
            meta: db.open_tree("meta").map_err(storage_err)?,
            db,
        })
    }

    fn get<T: serde::de::DeserializeOwned>(tree: &sled::Tree, key: &[u8]) -> Result<Option<T>, NotaryError> {
        match tree.get(key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: serde::Serialize>(tree: &sled::Tree, key: &[u8], value: &T) -> Result<(), NotaryError> {
        let bytes = bincode::serialize(value)?;
        tree.insert(key, bytes).map_err(storage_err)?;
        Ok(())
    }

    // ── Nyms ─────────────────────────────────────────────────────────────────

    pub fn get_nym(&self, id: &NymId) -> Result<Option<Nym>, NotaryError> {
        Self::get(&self.nyms, id.as_bytes())
    }

    pub fn put_nym(&self, nym: &Nym) -> Result<(), NotaryError> {
        Self::put(&self.nyms, nym.nym_id.as_bytes(), nym)
    }

    // ── Notary self-identity ─────────────────────────────────────────────────

    pub fn get_self_notary(&self) -> Result<Option<Notary>, NotaryError> {
        Self::get(&self.notary, b"self")
    }

    pub fn put_self_notary(&self, notary: &Notary) -> Result<(), NotaryError> {
        Self::put(&self.notary, b"self", notary)
    }

    // ── Units ────────────────────────────────────────────────────────────────

    pub fn get_unit(&self, id: &UnitId) -> Result<Option<Unit>, NotaryError> {
        Self::get(&self.units, id.as_bytes())
    }

    pub fn put_unit(&self, unit: &Unit) -> Result<(), NotaryError> {
        Self::put(&self.units, unit.unit_id.as_bytes(), unit)
    }

    // ── Accounts ─────────────────────────────────────────────────────────────

    pub fn get_account(&self, id: &AccountId) -> Result<Option<Account>, NotaryError> {
        Self::get(&self.accounts, id.as_bytes())
    }

    pub fn put_account(&self, account: &Account) -> Result<(), NotaryError> {
        Self::put(&self.accounts, account.account_id.as_bytes(), account)
    }

    // ── Transaction-number ledgers (C3) ──────────────────────────────────────

    fn numbers_key(nym_id: &NymId, notary_id: &NotaryId) -> Vec<u8> {
        let mut key = nym_id.as_bytes().to_vec();
        key.extend_from_slice(notary_id.as_bytes());
        key
    }

    pub fn get_number_ledger(&self, nym_id: &NymId, notary_id: &NotaryId) -> Result<NumberLedger, NotaryError> {
        let key = Self::numbers_key(nym_id, notary_id);
        Ok(Self::get(&self.numbers, &key)?.unwrap_or_else(|| NumberLedger::new(nym_id.clone())))
    }

    pub fn put_number_ledger(
        &self,
        nym_id: &NymId,
        notary_id: &NotaryId,
        ledger: &NumberLedger,
    ) -> Result<(), NotaryError> {
        let key = Self::numbers_key(nym_id, notary_id);
        Self::put(&self.numbers, &key, ledger)
    }

    // ── Inboxes (C4) ─────────────────────────────────────────────────────────

    pub fn get_inbox(&self, account_id: &AccountId) -> Result<Inbox, NotaryError> {
        Ok(Self::get(&self.inboxes, account_id.as_bytes())?.unwrap_or_else(|| Inbox::new(account_id.clone())))
    }

    pub fn put_inbox(&self, account_id: &AccountId, inbox: &Inbox) -> Result<(), NotaryError> {
        Self::put(&self.inboxes, account_id.as_bytes(), inbox)
    }

    // ── Nymbox (§4.3 "opening number on the Nymbox") ────────────────────────
    //
    // A separate append-only ledger from the per-account inbox: finalReceipts
    // drop their opening-number copy here, keyed by NymId directly, while
    // each closing number's copy still goes to `inboxes` via `put_inbox`.

    pub fn get_nymbox(&self, nym_id: &NymId) -> Result<Inbox, NotaryError> {
        Ok(Self::get(&self.nymboxes, nym_id.as_bytes())?
            .unwrap_or_else(|| Inbox::new(AccountId::from_bytes(*nym_id.as_bytes()))))
    }

    pub fn put_nymbox(&self, nym_id: &NymId, inbox: &Inbox) -> Result<(), NotaryError> {
        Self::put(&self.nymboxes, nym_id.as_bytes(), inbox)
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), NotaryError> {
        self.meta.insert(key.as_bytes(), value).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, NotaryError> {
        self.meta.get(key.as_bytes()).map(|v| v.map(|iv| iv.to_vec())).map_err(storage_err)
    }

    /// Allocate the next sequential transaction number for this notary.
    pub fn next_transaction_number(&self) -> Result<u64, NotaryError> {
        let key = "next_transaction_number";
        let current = self
            .get_meta(key)?
            .map(|b| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&b[..8]);
                u64::from_be_bytes(arr)
            })
            .unwrap_or(1);
        self.put_meta(key, &(current + 1).to_be_bytes())?;
        Ok(current)
    }

    pub fn flush(&self) -> Result<(), NotaryError> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}
