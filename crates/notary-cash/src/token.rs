//! Blinded cash token state machine (C8, §4.7).
//!
//! State machine: `Blinded -> Signed -> Ready -> {Spent, Expired}`, with a
//! direct `Expired` transition legal from any non-terminal state. Exactly
//! one payload field is populated per state, mirroring the protobuf
//! one-field-per-state layout in
//! `examples/original_source/src/blind/Token.hpp`/`token/Lucre.hpp`: a
//! prototoken request (`private_proto`/`public_proto`) while blinded, a
//! mint `signature` once signed, and an unblinded `spendable` once ready.

use notary_core::error::NotaryError;
use notary_core::types::{Amount, NotaryId, Timestamp, UnitId};
use serde::{Deserialize, Serialize};

use crate::mint::MintBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenState {
    Blinded,
    Signed,
    Ready,
    Spent,
    Expired,
}

/// The unblinded form of a token, the only part the notary ever needs to
/// look at to detect a double spend. `id` is the `id=...` field named in
/// §4.7 — parsed out of `spendable` rather than carried as a separate
/// struct field, same as the original's `Lucre::ID()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spendable {
    pub id: [u8; 32],
    pub series: u64,
    pub denomination: Amount,
    pub mint_signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub notary: NotaryId,
    pub unit: UnitId,
    pub series: u64,
    pub denomination: Amount,
    pub valid_from: Timestamp,
    pub valid_to: Timestamp,
    pub state: TokenState,
    private_proto: Option<Vec<u8>>,
    public_proto: Option<Vec<u8>>,
    signature: Option<Vec<u8>>,
    spendable: Option<Spendable>,
}

impl Token {
    /// `GenerateRequest` (§4.7): blind a fresh request against the mint's
    /// per-denomination-per-series public key. `private_proto` carries the
    /// blinding secret (owner-only, sealed under the purse's secondary key
    /// by the caller); `public_proto` carries the blinded bytes the mint
    /// will sign (sealed under the purse's primary key by the caller).
    pub fn generate_request(
        mint: &dyn MintBackend,
        notary: NotaryId,
        unit: UnitId,
        series: u64,
        denomination: Amount,
    ) -> Result<Self, NotaryError> {
        let (valid_from, valid_to) = mint.series_window(series)?;
        let (blinding_secret, blinded) = mint.blind(series, denomination)?;
        Ok(Self {
            notary,
            unit,
            series,
            denomination,
            valid_from,
            valid_to,
            state: TokenState::Blinded,
            private_proto: Some(blinding_secret),
            public_proto: Some(blinded),
            signature: None,
            spendable: None,
        })
    }

    /// Notary side: sign the blinded request. `Blinded -> Signed`.
    pub fn mint_sign(&mut self, mint: &dyn MintBackend) -> Result<(), NotaryError> {
        if self.state != TokenState::Blinded {
            return Err(NotaryError::InvalidState("mint_sign requires Blinded".into()));
        }
        let blinded = self
            .public_proto
            .as_ref()
            .ok_or_else(|| NotaryError::InvalidState("blinded token missing public_proto".into()))?;
        let sig = mint.blind_sign(self.series, self.denomination, blinded)?;
        self.signature = Some(sig);
        self.state = TokenState::Signed;
        Ok(())
    }

    /// `Process(owner, mint)` (§4.7): `Signed -> Ready`. Verifies the mint's
    /// signature, unblinds using the secret kept in `private_proto`, and
    /// clears both prototoken fields — only `spendable` survives.
    pub fn process(&mut self, mint: &dyn MintBackend) -> Result<(), NotaryError> {
        if self.state != TokenState::Signed {
            return Err(NotaryError::InvalidState("process requires Signed".into()));
        }
        let blinding_secret = self
            .private_proto
            .as_ref()
            .ok_or_else(|| NotaryError::InvalidState("signed token missing private_proto".into()))?;
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| NotaryError::InvalidState("signed token missing signature".into()))?;
        let spendable = mint.unblind(self.series, self.denomination, blinding_secret, signature)?;
        if !mint.verify(self.series, self.denomination, &spendable)? {
            return Err(NotaryError::BadCrypto("unblinded token failed mint verification".into()));
        }
        self.private_proto = None;
        self.public_proto = None;
        self.signature = None;
        self.spendable = Some(spendable);
        self.state = TokenState::Ready;
        Ok(())
    }

    /// `ChangeOwner` (§4.7): no-op at this layer — re-encryption under a new
    /// primary key is the Purse's job (it owns the symmetric keys), not the
    /// Token's. Kept as a marker so the operation from the spec is visible
    /// at the call site that matters: `Purse::add_nym`/`unlock`.
    pub fn is_spent(&self) -> bool {
        self.state == TokenState::Spent
    }

    pub fn spendable_id(&self) -> Option<[u8; 32]> {
        self.spendable.as_ref().map(|s| s.id)
    }

    pub fn spendable(&self) -> Option<&Spendable> {
        self.spendable.as_ref()
    }

    /// `MarkSpent` (§4.7): only valid from `Ready`.
    pub fn mark_spent(&mut self) -> Result<(), NotaryError> {
        if self.state != TokenState::Ready {
            return Err(NotaryError::InvalidState("mark_spent requires Ready".into()));
        }
        self.state = TokenState::Spent;
        Ok(())
    }

    pub fn expire(&mut self) {
        if self.state != TokenState::Spent {
            self.state = TokenState::Expired;
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.state == TokenState::Expired || now >= self.valid_to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mint::{DilithiumMint, MintBackend};

    fn mint() -> DilithiumMint {
        let mut m = DilithiumMint::new(NotaryId::from_bytes([1u8; 32]), UnitId::from_bytes([2u8; 32]));
        m.open_series(1, 0, 10_000);
        m.ensure_denomination_key(1, 10);
        m
    }

    #[test]
    fn full_round_trip_reaches_ready() {
        let mint = mint();
        let mut token = Token::generate_request(&mint, mint.notary_id(), mint.unit_id(), 1, 10).unwrap();
        assert_eq!(token.state, TokenState::Blinded);
        token.mint_sign(&mint).unwrap();
        assert_eq!(token.state, TokenState::Signed);
        token.process(&mint).unwrap();
        assert_eq!(token.state, TokenState::Ready);
        assert!(token.spendable_id().is_some());
    }

    #[test]
    fn mark_spent_requires_ready() {
        let mint = mint();
        let mut token = Token::generate_request(&mint, mint.notary_id(), mint.unit_id(), 1, 10).unwrap();
        assert!(token.mark_spent().is_err());
        token.mint_sign(&mint).unwrap();
        assert!(token.mark_spent().is_err());
        token.process(&mint).unwrap();
        assert!(token.mark_spent().is_ok());
        assert!(token.is_spent());
    }

    #[test]
    fn process_requires_signed() {
        let mint = mint();
        let mut token = Token::generate_request(&mint, mint.notary_id(), mint.unit_id(), 1, 10).unwrap();
        assert!(token.process(&mint).is_err());
    }
}
