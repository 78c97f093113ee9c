//! JSON-facing DTOs for the §6 wire command set. Identifiers cross the wire
//! as hex strings (`notary_core::types::*Id::to_hex`/`from_hex`); everything
//! else mirrors the matching `notary-ledger`/`notary-market`/`notary-cash`
//! type closely enough that the conversion here is a flat field copy.

use serde::{Deserialize, Serialize};

use jsonrpsee::types::ErrorObjectOwned;
use notary_core::error::NotaryError;
use notary_core::types::{AccountId, MarketId, NotaryId, NymId, UnitId};

pub fn to_rpc_error(err: NotaryError) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(-32000, err.to_string(), None::<()>)
}

pub fn parse_nym_id(s: &str) -> Result<NymId, ErrorObjectOwned> {
    NymId::from_hex(s).map_err(|e| ErrorObjectOwned::owned(-32602, format!("bad nymId: {e}"), None::<()>))
}

pub fn parse_notary_id(s: &str) -> Result<NotaryId, ErrorObjectOwned> {
    NotaryId::from_hex(s).map_err(|e| ErrorObjectOwned::owned(-32602, format!("bad notaryId: {e}"), None::<()>))
}

pub fn parse_unit_id(s: &str) -> Result<UnitId, ErrorObjectOwned> {
    UnitId::from_hex(s).map_err(|e| ErrorObjectOwned::owned(-32602, format!("bad unitId: {e}"), None::<()>))
}

pub fn parse_account_id(s: &str) -> Result<AccountId, ErrorObjectOwned> {
    AccountId::from_hex(s).map_err(|e| ErrorObjectOwned::owned(-32602, format!("bad accountId: {e}"), None::<()>))
}

pub fn parse_market_id(s: &str) -> Result<MarketId, ErrorObjectOwned> {
    MarketId::from_hex(s).map_err(|e| ErrorObjectOwned::owned(-32602, format!("bad marketId: {e}"), None::<()>))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcAccount {
    pub account_id: String,
    pub owner: String,
    pub notary_id: String,
    pub unit_id: String,
    pub balance: i128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcItem {
    pub kind: String,
    pub status: String,
    pub amount: i128,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcTransaction {
    pub transaction_num: u64,
    pub in_reference_to: u64,
    pub account_id: String,
    pub notary_id: String,
    pub timestamp: i64,
    pub items: Vec<RpcItem>,
    pub notary_signature_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcOfferRequest {
    pub unit_id: String,
    pub currency_id: String,
    pub scale: u64,
    pub side: String,
    pub price_limit: i128,
    pub total_assets: i128,
    pub min_increment: i128,
    pub asset_account: String,
    pub currency_account: String,
    pub valid_from: i64,
    pub valid_to: i64,
    pub stop_sign: Option<String>,
    pub stop_price: i128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcOfferSummary {
    pub opening_num: u64,
    pub side: String,
    pub price_limit: i128,
    pub available: i128,
    pub scale: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRecentTrade {
    pub opening_num: u64,
    pub time: i64,
    pub price: i128,
    pub amount_sold: i128,
}
