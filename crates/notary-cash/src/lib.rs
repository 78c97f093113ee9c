//! Cash purse & blinded token state machine (C8).

pub mod engine;
pub mod mint;
pub mod purse;
pub mod spend;
pub mod token;

pub use engine::CashEngine;
pub use mint::{DilithiumMint, MintBackend};
pub use purse::{Purse, PurseType};
pub use spend::{SpendLedger, SpendResult};
pub use token::{Spendable, Token, TokenState};
