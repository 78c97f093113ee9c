pub mod db;
pub mod engine;
pub mod models;
pub mod numbers;
pub mod receipts;

pub use db::StateDb;
pub use engine::{atomic_four_account_move, LedgerEngine, StagedAccounts};
pub use models::{Account, Notary, Nym, Unit};
pub use numbers::NumberLedger;
pub use receipts::{final_receipt_item, market_receipt_item, market_rejection_item, Inbox, Item, ItemKind, ItemStatus, Transaction};
