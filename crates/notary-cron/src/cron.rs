//! Cron scheduler (C5), §4.4.
//!
//! CronItem is modeled as a tagged envelope (§9 Design Notes) rather than a
//! class hierarchy with virtual hooks: shared fields live here, and
//! kind-specific behavior is dispatched through [`CronHandler`], one
//! implementation per [`CronItemKind`] supplied by the caller (notary-market
//! for Trades; notary-ledger-adjacent callers for PaymentPlan/SmartContract).

use std::collections::HashMap;

use notary_core::error::NotaryError;
use notary_core::types::{Timestamp, TransactionNumber};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CronItemKind {
    Trade,
    PaymentPlan,
    SmartContract,
}

/// `{openingNum, closingNums[], creation, validFrom, validTo, processInterval,
/// lastProcessed, removalFlag, canceled?}` (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CronItem {
    pub opening_num: TransactionNumber,
    pub closing_nums: Vec<TransactionNumber>,
    pub creation: Timestamp,
    pub valid_from: Timestamp,
    pub valid_to: Timestamp,
    pub process_interval: i64,
    pub last_processed: Timestamp,
    pub removal_flag: bool,
    pub canceled: bool,
    pub kind: CronItemKind,
    /// Kind-specific state, opaque to the scheduler itself.
    pub payload: Vec<u8>,
}

impl CronItem {
    pub fn new(
        opening_num: TransactionNumber,
        closing_nums: Vec<TransactionNumber>,
        creation: Timestamp,
        valid_from: Timestamp,
        valid_to: Timestamp,
        process_interval: i64,
        kind: CronItemKind,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            opening_num,
            closing_nums,
            creation,
            valid_from,
            valid_to,
            process_interval,
            last_processed: 0,
            removal_flag: false,
            canceled: false,
            kind,
            payload,
        }
    }
}

/// What a tick's `ProcessItem` call decided.
pub enum ProcessOutcome {
    Keep,
    Remove,
}

/// Kind-specific hooks (§4.4, §9). One handler per [`CronItemKind`].
pub trait CronHandler: Send + Sync {
    /// Runs once when the item is first accepted onto Cron.
    fn on_activate(&self, item: &CronItem) -> Result<(), NotaryError>;

    /// The per-tick effect (matching for Trades, installment drawdown for
    /// PaymentPlans, clause execution for SmartContracts).
    fn process_item(&self, item: &mut CronItem, now: Timestamp) -> Result<ProcessOutcome, NotaryError>;

    /// Drop a finalReceipt to the Nymbox (opening number) and to each
    /// closing account's inbox (closing numbers), per §4.3.
    fn on_final_receipt(&self, item: &CronItem, now: Timestamp) -> Result<(), NotaryError>;

    /// Subclass cleanup once the finalReceipt has been dropped (e.g. remove
    /// the Offer from its Market).
    fn on_removal_from_cron(&self, item: &CronItem) -> Result<(), NotaryError>;
}

/// Per-Notary Cron: active items indexed by opening number, processed at a
/// global tick in insertion order (§4.4 tie-break; §8 "Cron ordering").
pub struct Cron {
    items: HashMap<TransactionNumber, CronItem>,
    order: Vec<TransactionNumber>,
    handlers: HashMap<CronItemKind, Box<dyn CronHandler>>,
}

impl Cron {
    pub fn new() -> Self {
        Self { items: HashMap::new(), order: Vec::new(), handlers: HashMap::new() }
    }

    pub fn register_handler(&mut self, kind: CronItemKind, handler: Box<dyn CronHandler>) {
        self.handlers.insert(kind, handler);
    }

    fn handler_for(&self, kind: CronItemKind) -> Result<&dyn CronHandler, NotaryError> {
        self.handlers
            .get(&kind)
            .map(|b| b.as_ref())
            .ok_or_else(|| NotaryError::InvalidState(format!("no cron handler registered for {kind:?}")))
    }

    /// Add a freshly-activated item to Cron; runs `onActivate` once.
    pub fn add_item(&mut self, item: CronItem) -> Result<(), NotaryError> {
        self.handler_for(item.kind)?.on_activate(&item)?;
        self.order.push(item.opening_num);
        self.items.insert(item.opening_num, item);
        Ok(())
    }

    /// Flag an item for removal at the end of the current tick (e.g.
    /// cancellation). Returning numbers to `Available` for a cancellation
    /// before activation is the caller's job, not Cron's (§4.4): this only
    /// marks intent to remove.
    pub fn flag_for_removal(&mut self, opening_num: TransactionNumber) {
        if let Some(item) = self.items.get_mut(&opening_num) {
            item.removal_flag = true;
        }
    }

    pub fn get(&self, opening_num: TransactionNumber) -> Option<&CronItem> {
        self.items.get(&opening_num)
    }

    pub fn active_count(&self) -> usize {
        self.order.len()
    }

    /// One global tick over every active item, in insertion order (§4.4).
    pub fn tick(&mut self, now: Timestamp) -> Result<(), NotaryError> {
        let mut to_remove = Vec::new();

        for opening_num in self.order.clone() {
            let Some(item) = self.items.get_mut(&opening_num) else { continue };

            if now > item.valid_to || item.removal_flag {
                to_remove.push(opening_num);
                continue;
            }
            if now - item.last_processed < item.process_interval {
                continue;
            }
            if now < item.valid_from {
                continue;
            }

            let handler = self
                .handlers
                .get(&item.kind)
                .ok_or_else(|| NotaryError::InvalidState(format!("no cron handler registered for {:?}", item.kind)))?;
            let outcome = handler.process_item(item, now)?;
            item.last_processed = now;
            if matches!(outcome, ProcessOutcome::Remove) {
                to_remove.push(opening_num);
            }
        }

        for opening_num in to_remove {
            self.hook_removal(opening_num, now)?;
        }
        Ok(())
    }

    /// `onFinalReceipt → drop to Nymbox/account inboxes → onRemovalFromCron →
    /// erase` (§4.4 fixed ordering).
    fn hook_removal(&mut self, opening_num: TransactionNumber, now: Timestamp) -> Result<(), NotaryError> {
        let Some(item) = self.items.remove(&opening_num) else { return Ok(()) };
        self.order.retain(|&n| n != opening_num);

        let handler = self.handler_for(item.kind)?;
        handler.on_final_receipt(&item, now)?;
        handler.on_removal_from_cron(&item)?;
        Ok(())
    }
}

impl Default for Cron {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingHandler {
        activated: AtomicUsize,
        processed: Mutex<Vec<TransactionNumber>>,
        final_receipts: Mutex<Vec<TransactionNumber>>,
        removed: Mutex<Vec<TransactionNumber>>,
        remove_after_first_process: bool,
    }

    impl RecordingHandler {
        fn new(remove_after_first_process: bool) -> Self {
            Self {
                activated: AtomicUsize::new(0),
                processed: Mutex::new(Vec::new()),
                final_receipts: Mutex::new(Vec::new()),
                removed: Mutex::new(Vec::new()),
                remove_after_first_process,
            }
        }
    }

    impl CronHandler for RecordingHandler {
        fn on_activate(&self, _item: &CronItem) -> Result<(), NotaryError> {
            self.activated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn process_item(&self, item: &mut CronItem, _now: Timestamp) -> Result<ProcessOutcome, NotaryError> {
            self.processed.lock().unwrap().push(item.opening_num);
            if self.remove_after_first_process {
                Ok(ProcessOutcome::Remove)
            } else {
                Ok(ProcessOutcome::Keep)
            }
        }

        fn on_final_receipt(&self, item: &CronItem, _now: Timestamp) -> Result<(), NotaryError> {
            self.final_receipts.lock().unwrap().push(item.opening_num);
            Ok(())
        }

        fn on_removal_from_cron(&self, item: &CronItem) -> Result<(), NotaryError> {
            self.removed.lock().unwrap().push(item.opening_num);
            Ok(())
        }
    }

    fn item(opening_num: TransactionNumber, valid_from: Timestamp, valid_to: Timestamp, interval: i64) -> CronItem {
        CronItem::new(opening_num, vec![], 0, valid_from, valid_to, interval, CronItemKind::Trade, vec![])
    }

    #[test]
    fn ticks_item_in_insertion_order() {
        let mut cron = Cron::new();
        let handler = std::sync::Arc::new(RecordingHandler::new(false));
        struct Wrapper(std::sync::Arc<RecordingHandler>);
        impl CronHandler for Wrapper {
            fn on_activate(&self, i: &CronItem) -> Result<(), NotaryError> { self.0.on_activate(i) }
            fn process_item(&self, i: &mut CronItem, now: Timestamp) -> Result<ProcessOutcome, NotaryError> { self.0.process_item(i, now) }
            fn on_final_receipt(&self, i: &CronItem, now: Timestamp) -> Result<(), NotaryError> { self.0.on_final_receipt(i, now) }
            fn on_removal_from_cron(&self, i: &CronItem) -> Result<(), NotaryError> { self.0.on_removal_from_cron(i) }
        }
        cron.register_handler(CronItemKind::Trade, Box::new(Wrapper(handler.clone())));

        cron.add_item(item(1, 0, 1000, 0)).unwrap();
        cron.add_item(item(2, 0, 1000, 0)).unwrap();
        cron.tick(10).unwrap();

        assert_eq!(*handler.processed.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn skips_when_below_process_interval() {
        let mut cron = Cron::new();
        let handler = std::sync::Arc::new(RecordingHandler::new(false));
        struct Wrapper(std::sync::Arc<RecordingHandler>);
        impl CronHandler for Wrapper {
            fn on_activate(&self, i: &CronItem) -> Result<(), NotaryError> { self.0.on_activate(i) }
            fn process_item(&self, i: &mut CronItem, now: Timestamp) -> Result<ProcessOutcome, NotaryError> { self.0.process_item(i, now) }
            fn on_final_receipt(&self, i: &CronItem, now: Timestamp) -> Result<(), NotaryError> { self.0.on_final_receipt(i, now) }
            fn on_removal_from_cron(&self, i: &CronItem) -> Result<(), NotaryError> { self.0.on_removal_from_cron(i) }
        }
        cron.register_handler(CronItemKind::Trade, Box::new(Wrapper(handler.clone())));
        cron.add_item(item(1, 0, 1000, 100)).unwrap();

        cron.tick(10).unwrap();
        cron.tick(50).unwrap();
        assert_eq!(handler.processed.lock().unwrap().len(), 1);
    }

    #[test]
    fn expired_item_triggers_hook_removal_in_order() {
        let mut cron = Cron::new();
        let handler = std::sync::Arc::new(RecordingHandler::new(false));
        struct Wrapper(std::sync::Arc<RecordingHandler>);
        impl CronHandler for Wrapper {
            fn on_activate(&self, i: &CronItem) -> Result<(), NotaryError> { self.0.on_activate(i) }
            fn process_item(&self, i: &mut CronItem, now: Timestamp) -> Result<ProcessOutcome, NotaryError> { self.0.process_item(i, now) }
            fn on_final_receipt(&self, i: &CronItem, now: Timestamp) -> Result<(), NotaryError> { self.0.on_final_receipt(i, now) }
            fn on_removal_from_cron(&self, i: &CronItem) -> Result<(), NotaryError> { self.0.on_removal_from_cron(i) }
        }
        cron.register_handler(CronItemKind::Trade, Box::new(Wrapper(handler.clone())));
        cron.add_item(item(1, 0, 50, 0)).unwrap();

        cron.tick(100).unwrap();
        assert_eq!(*handler.final_receipts.lock().unwrap(), vec![1]);
        assert_eq!(*handler.removed.lock().unwrap(), vec![1]);
        assert_eq!(cron.active_count(), 0);
    }

    #[test]
    fn not_yet_active_item_is_kept() {
        let mut cron = Cron::new();
        let handler = std::sync::Arc::new(RecordingHandler::new(false));
        struct Wrapper(std::sync::Arc<RecordingHandler>);
        impl CronHandler for Wrapper {
            fn on_activate(&self, i: &CronItem) -> Result<(), NotaryError> { self.0.on_activate(i) }
            fn process_item(&self, i: &mut CronItem, now: Timestamp) -> Result<ProcessOutcome, NotaryError> { self.0.process_item(i, now) }
            fn on_final_receipt(&self, i: &CronItem, now: Timestamp) -> Result<(), NotaryError> { self.0.on_final_receipt(i, now) }
            fn on_removal_from_cron(&self, i: &CronItem) -> Result<(), NotaryError> { self.0.on_removal_from_cron(i) }
        }
        cron.register_handler(CronItemKind::Trade, Box::new(Wrapper(handler.clone())));
        cron.add_item(item(1, 500, 1000, 0)).unwrap();

        cron.tick(100).unwrap();
        assert!(handler.processed.lock().unwrap().is_empty());
        assert_eq!(cron.active_count(), 1);
    }

    #[test]
    fn process_item_returning_remove_triggers_hook_removal() {
        let mut cron = Cron::new();
        let handler = std::sync::Arc::new(RecordingHandler::new(true));
        struct Wrapper(std::sync::Arc<RecordingHandler>);
        impl CronHandler for Wrapper {
            fn on_activate(&self, i: &CronItem) -> Result<(), NotaryError> { self.0.on_activate(i) }
            fn process_item(&self, i: &mut CronItem, now: Timestamp) -> Result<ProcessOutcome, NotaryError> { self.0.process_item(i, now) }
            fn on_final_receipt(&self, i: &CronItem, now: Timestamp) -> Result<(), NotaryError> { self.0.on_final_receipt(i, now) }
            fn on_removal_from_cron(&self, i: &CronItem) -> Result<(), NotaryError> { self.0.on_removal_from_cron(i) }
        }
        cron.register_handler(CronItemKind::Trade, Box::new(Wrapper(handler.clone())));
        cron.add_item(item(1, 0, 1000, 0)).unwrap();

        cron.tick(10).unwrap();
        assert_eq!(*handler.removed.lock().unwrap(), vec![1]);
    }
}
