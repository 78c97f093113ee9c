//! Offer (§3, §4.5).

use serde::{Deserialize, Serialize};

use notary_core::error::NotaryError;
use notary_core::types::{Amount, MarketId, Scale, Timestamp, TransactionNumber};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// `{marketId, side, priceLimit, totalAssets, finishedSoFar, minIncrement,
/// scale, transactionNum, validFrom, validTo, dateAddedToMarket}` (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Offer {
    pub market_id: MarketId,
    pub side: Side,
    /// `0` marks a market order.
    pub price_limit: Amount,
    pub total_assets: Amount,
    pub finished_so_far: Amount,
    pub min_increment: Amount,
    pub scale: Scale,
    pub transaction_num: TransactionNumber,
    pub valid_from: Timestamp,
    pub valid_to: Timestamp,
    pub date_added_to_market: Timestamp,
}

impl Offer {
    pub fn available(&self) -> Amount {
        self.total_assets - self.finished_so_far
    }

    pub fn is_market_order(&self) -> bool {
        self.price_limit == 0
    }

    /// `minIncrement ≥ scale ∧ minIncrement % scale = 0` (§3).
    pub fn validate(&self) -> Result<(), NotaryError> {
        let scale = self.scale as Amount;
        if self.min_increment < scale || self.min_increment % scale != 0 {
            return Err(NotaryError::InvalidOffer(format!(
                "minIncrement {} must be >= scale {} and a multiple of it",
                self.min_increment, self.scale
            )));
        }
        if self.valid_from >= self.valid_to {
            return Err(NotaryError::InvalidOffer("validFrom must precede validTo".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_offer() -> Offer {
        Offer {
            market_id: MarketId::from_bytes([1u8; 32]),
            side: Side::Ask,
            price_limit: 1300,
            total_assets: 100,
            finished_so_far: 0,
            min_increment: 50,
            scale: 10,
            transaction_num: 1,
            valid_from: 0,
            valid_to: 1000,
            date_added_to_market: 0,
        }
    }

    #[test]
    fn valid_offer_passes() {
        assert!(base_offer().validate().is_ok());
    }

    #[test]
    fn min_increment_not_multiple_of_scale_is_invalid() {
        let mut o = base_offer();
        o.min_increment = 55;
        assert!(matches!(o.validate(), Err(NotaryError::InvalidOffer(_))));
    }

    #[test]
    fn min_increment_below_scale_is_invalid() {
        let mut o = base_offer();
        o.min_increment = 5;
        o.scale = 10;
        assert!(matches!(o.validate(), Err(NotaryError::InvalidOffer(_))));
    }

    #[test]
    fn zero_price_limit_is_market_order() {
        let mut o = base_offer();
        o.price_limit = 0;
        assert!(o.is_market_order());
    }
}
