//! Cron scheduler (C5): per-Notary tick processing of long-lived CronItems.

pub mod cron;

pub use cron::{Cron, CronHandler, CronItem, CronItemKind, ProcessOutcome};
