//! Purse (§4.7): a sealed container of cash tokens. Grounded on the shape of
//! `examples/original_source/src/blind/Purse.hpp` (primary/secondary
//! symmetric keys, `AddNym`/`Unlock`/`Push`/`Pop`/`Process`/`Verify`,
//! running `total_value`/`latest_valid_from`/`earliest_valid_to`), expressed
//! with `chacha20poly1305` in place of the original's `crypto::key::Symmetric`
//! envelope type (the key/identity subsystem itself — how a Nym's own
//! credential unlocks its session key — is an out-of-scope collaborator per
//! §1, so `AddNym`/`Unlock` here take the caller's already-derived unlock key
//! rather than a `Nym&`).

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use notary_core::error::NotaryError;
use notary_core::types::{Amount, NotaryId, NymId, Timestamp, UnitId};

use crate::mint::MintBackend;
use crate::token::{Token, TokenState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurseType {
    Request,
    Issue,
    Normal,
}

impl PurseType {
    fn allowed_states(self) -> &'static [TokenState] {
        match self {
            PurseType::Request => &[TokenState::Blinded],
            PurseType::Issue => &[TokenState::Signed],
            PurseType::Normal => &[TokenState::Ready, TokenState::Spent, TokenState::Expired],
        }
    }
}

struct SealedPassword {
    nym_id: NymId,
    nonce: [u8; 12],
    ciphertext: Vec<u8>,
}

fn derive_key(material: &[u8]) -> Key {
    *Key::from_slice(blake3::hash(material).as_bytes())
}

fn seal(key_material: &[u8], plaintext: &[u8]) -> (Vec<u8>, [u8; 12]) {
    let cipher = ChaCha20Poly1305::new(&derive_key(key_material));
    let mut nonce_bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher.encrypt(nonce, plaintext).expect("chacha20poly1305 encryption is infallible");
    (ciphertext, nonce_bytes)
}

fn open(key_material: &[u8], nonce: &[u8; 12], ciphertext: &[u8]) -> Option<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(&derive_key(key_material));
    cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
}

/// `{notary, unit, type, totalValue, latestValidFrom, earliestValidTo,
/// tokens[], primaryKey, primarySessionKeys[], secondaryKey?,
/// secondaryPassword?}` (§4.1 data model, §4.7).
pub struct Purse {
    pub notary: NotaryId,
    pub unit: UnitId,
    purse_type: PurseType,
    total_value: Amount,
    latest_valid_from: Timestamp,
    earliest_valid_to: Timestamp,
    tokens: Vec<Token>,
    primary_password: Option<[u8; 32]>,
    session_keys: Vec<SealedPassword>,
    secondary_password: Option<[u8; 32]>,
    unlocked: bool,
}

impl Drop for Purse {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        if let Some(p) = &mut self.primary_password {
            p.zeroize();
        }
        if let Some(p) = &mut self.secondary_password {
            p.zeroize();
        }
    }
}

impl Purse {
    /// A fresh Request purse: generates its own primary key material and
    /// seals it for `owner` immediately. Issue/Normal purses are produced by
    /// transitioning an existing Request purse via `push`/`process`, so
    /// there is only one constructor.
    pub fn new_request(notary: NotaryId, unit: UnitId, owner: NymId, owner_unlock_key: &[u8]) -> Self {
        let mut primary_password = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut primary_password);
        let mut secondary_password = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secondary_password);
        let mut purse = Self {
            notary,
            unit,
            purse_type: PurseType::Request,
            total_value: 0,
            latest_valid_from: Timestamp::MIN,
            earliest_valid_to: Timestamp::MAX,
            tokens: Vec::new(),
            primary_password: Some(primary_password),
            session_keys: Vec::new(),
            secondary_password: Some(secondary_password),
            unlocked: true,
        };
        purse.add_nym(&owner, owner_unlock_key).expect("fresh purse is unlocked");
        purse
    }

    pub fn purse_type(&self) -> PurseType {
        self.purse_type
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn total_value(&self) -> Amount {
        self.total_value
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut [Token] {
        &mut self.tokens
    }

    pub fn latest_valid_from(&self) -> Timestamp {
        self.latest_valid_from
    }

    pub fn earliest_valid_to(&self) -> Timestamp {
        self.earliest_valid_to
    }

    /// `AddNym(n)` (§4.7): requires `unlocked`; seals the primary-key
    /// password for `n` and appends the session key.
    pub fn add_nym(&mut self, nym_id: &NymId, nym_unlock_key: &[u8]) -> Result<(), NotaryError> {
        if !self.unlocked {
            return Err(NotaryError::InvalidState("add_nym requires an unlocked purse".into()));
        }
        let password = self.primary_password.expect("unlocked implies primary_password is set");
        let (ciphertext, nonce) = seal(nym_unlock_key, &password);
        self.session_keys.push(SealedPassword { nym_id: nym_id.clone(), nonce, ciphertext });
        Ok(())
    }

    /// `Unlock(n)` (§4.7): iterates session keys, attempts open with each;
    /// sets `unlocked` on first success.
    pub fn unlock(&mut self, nym_unlock_key: &[u8]) -> bool {
        for entry in &self.session_keys {
            if let Some(plain) = open(nym_unlock_key, &entry.nonce, &entry.ciphertext) {
                if plain.len() == 32 {
                    let mut password = [0u8; 32];
                    password.copy_from_slice(&plain);
                    self.primary_password = Some(password);
                    self.unlocked = true;
                    return true;
                }
            }
        }
        false
    }

    fn recompute_times(&mut self) {
        self.latest_valid_from = self.tokens.iter().map(|t| t.valid_from).max().unwrap_or(Timestamp::MIN);
        self.earliest_valid_to = self.tokens.iter().map(|t| t.valid_to).min().unwrap_or(Timestamp::MAX);
    }

    fn recompute_total_value(&mut self) {
        self.total_value = self
            .tokens
            .iter()
            .filter(|t| matches!(t.state, TokenState::Blinded | TokenState::Signed | TokenState::Ready))
            .map(|t| t.denomination)
            .sum();
    }

    /// `Push(token)` (§4.7): validates state, prepends (most recently added
    /// is popped first), updates totals and the valid-time bounds. The
    /// spec's "re-encrypts under the purse's primary" step is this crate's
    /// storage boundary, not a field on `Token` itself — see the module doc.
    pub fn push(&mut self, token: Token) -> Result<(), NotaryError> {
        if !self.unlocked {
            return Err(NotaryError::InvalidState("push requires an unlocked purse".into()));
        }
        if token.notary != self.notary {
            return Err(NotaryError::NotaryMismatch { expected: self.notary.clone(), got: token.notary.clone() });
        }
        if token.unit != self.unit {
            return Err(NotaryError::UnitMismatch { expected: self.unit.clone(), got: token.unit.clone() });
        }
        self.tokens.insert(0, token);
        self.recompute_total_value();
        self.recompute_times();
        Ok(())
    }

    /// `Pop()` (§4.7): removes the last-pushed token.
    pub fn pop(&mut self) -> Option<Token> {
        if self.tokens.is_empty() {
            return None;
        }
        let token = self.tokens.remove(0);
        self.recompute_total_value();
        self.recompute_times();
        Some(token)
    }

    /// `Process(owner, mint)` (§4.7): Issue purses only; processes every
    /// token (`Signed -> Ready`); on all-success transitions to Normal and
    /// clears the secondary key material (no longer needed once every token
    /// is unblinded).
    pub fn process(&mut self, mint: &dyn MintBackend) -> Result<(), NotaryError> {
        if self.purse_type != PurseType::Issue {
            return Err(NotaryError::InvalidState("process requires an Issue purse".into()));
        }
        for token in &mut self.tokens {
            token.process(mint)?;
        }
        self.purse_type = PurseType::Normal;
        self.secondary_password = None;
        self.recompute_total_value();
        Ok(())
    }

    /// Notary side: sign every Blinded token in a Request purse, producing
    /// an Issue purse. Not named directly in §4.7's Purse operation list but
    /// required to move a purse from Request to Issue — the per-token
    /// counterpart of `Process`.
    pub fn mint_sign_all(&mut self, mint: &dyn MintBackend) -> Result<(), NotaryError> {
        if self.purse_type != PurseType::Request {
            return Err(NotaryError::InvalidState("mint_sign_all requires a Request purse".into()));
        }
        for token in &mut self.tokens {
            token.mint_sign(mint)?;
        }
        self.purse_type = PurseType::Issue;
        self.recompute_total_value();
        Ok(())
    }

    /// Reassemble a Normal purse out of tokens a caller already holds
    /// `Ready`, e.g. raw `Token`s arriving over the wire for `depositCash`
    /// (§6) rather than a full client-side Request/Issue/Normal walk.
    pub fn from_ready_tokens(notary: NotaryId, unit: UnitId, tokens: Vec<Token>) -> Result<Self, NotaryError> {
        for token in &tokens {
            if token.notary != notary {
                return Err(NotaryError::NotaryMismatch { expected: notary.clone(), got: token.notary.clone() });
            }
            if token.unit != unit {
                return Err(NotaryError::UnitMismatch { expected: unit.clone(), got: token.unit.clone() });
            }
        }
        let mut purse = Self {
            notary,
            unit,
            purse_type: PurseType::Normal,
            total_value: 0,
            latest_valid_from: Timestamp::MIN,
            earliest_valid_to: Timestamp::MAX,
            tokens,
            primary_password: None,
            session_keys: Vec::new(),
            secondary_password: None,
            unlocked: false,
        };
        purse.recompute_total_value();
        purse.recompute_times();
        Ok(purse)
    }

    /// `Verify(mintResolver)` (§4.7, notary side): per-purse-type allowed
    /// state set, notary/unit/series/validFrom/validTo agreement with the
    /// resolved Mint, and the `totalValue`/time-bound invariants.
    pub fn verify(&self, resolve_window: impl Fn(u64) -> Option<(Timestamp, Timestamp)>) -> Result<(), NotaryError> {
        let allowed = self.purse_type.allowed_states();
        for token in &self.tokens {
            if !allowed.contains(&token.state) {
                return Err(NotaryError::InvalidState(format!(
                    "token state {:?} not legal for purse type {:?}",
                    token.state, self.purse_type
                )));
            }
            if token.notary != self.notary {
                return Err(NotaryError::NotaryMismatch { expected: self.notary.clone(), got: token.notary.clone() });
            }
            if token.unit != self.unit {
                return Err(NotaryError::UnitMismatch { expected: self.unit.clone(), got: token.unit.clone() });
            }
            let (valid_from, valid_to) = resolve_window(token.series)
                .ok_or_else(|| NotaryError::BadMint(format!("unknown series {}", token.series)))?;
            if token.valid_from != valid_from || token.valid_to != valid_to {
                return Err(NotaryError::BadMint("token validity window does not match resolved mint series".into()));
            }
        }

        let expected_total: Amount = self
            .tokens
            .iter()
            .filter(|t| matches!(t.state, TokenState::Blinded | TokenState::Signed | TokenState::Ready))
            .map(|t| t.denomination)
            .sum();
        if expected_total != self.total_value {
            return Err(NotaryError::InvalidState("purse totalValue does not match token denominations".into()));
        }

        let expected_latest = self.tokens.iter().map(|t| t.valid_from).max().unwrap_or(Timestamp::MIN);
        let expected_earliest = self.tokens.iter().map(|t| t.valid_to).min().unwrap_or(Timestamp::MAX);
        if expected_latest != self.latest_valid_from || expected_earliest != self.earliest_valid_to {
            return Err(NotaryError::InvalidState("purse valid-time bounds are stale".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mint::DilithiumMint;

    fn mint() -> DilithiumMint {
        let mut m = DilithiumMint::new(NotaryId::from_bytes([1u8; 32]), UnitId::from_bytes([2u8; 32]));
        m.open_series(1, 0, 10_000);
        m.ensure_denomination_key(1, 10);
        m.ensure_denomination_key(1, 20);
        m
    }

    #[test]
    fn add_nym_unlock_round_trip() {
        let owner = NymId::from_bytes([5u8; 32]);
        let key = b"owner-unlock-key";
        let mut purse =
            Purse::new_request(NotaryId::from_bytes([1u8; 32]), UnitId::from_bytes([2u8; 32]), owner.clone(), key);
        purse.unlocked = false;
        purse.primary_password = None;
        assert!(purse.unlock(key));
        assert!(!purse.unlock(b"wrong key"));
    }

    #[test]
    fn push_updates_total_value_and_bounds() {
        let mint = mint();
        let owner = NymId::from_bytes([5u8; 32]);
        let mut purse = Purse::new_request(mint.notary_id(), mint.unit_id(), owner, b"key");
        let t1 = Token::generate_request(&mint, mint.notary_id(), mint.unit_id(), 1, 10).unwrap();
        let t2 = Token::generate_request(&mint, mint.notary_id(), mint.unit_id(), 1, 20).unwrap();
        purse.push(t1).unwrap();
        purse.push(t2).unwrap();
        assert_eq!(purse.total_value(), 30);
    }

    #[test]
    fn full_purse_round_trip_request_to_normal() {
        let mint = mint();
        let owner = NymId::from_bytes([5u8; 32]);
        let mut purse = Purse::new_request(mint.notary_id(), mint.unit_id(), owner, b"key");
        purse.push(Token::generate_request(&mint, mint.notary_id(), mint.unit_id(), 1, 10).unwrap()).unwrap();
        purse.push(Token::generate_request(&mint, mint.notary_id(), mint.unit_id(), 1, 20).unwrap()).unwrap();

        purse.mint_sign_all(&mint).unwrap();
        assert_eq!(purse.purse_type(), PurseType::Issue);

        purse.process(&mint).unwrap();
        assert_eq!(purse.purse_type(), PurseType::Normal);
        assert!(purse.tokens().iter().all(|t| t.state == TokenState::Ready));
        assert_eq!(purse.total_value(), 30);

        purse.verify(|series| if series == 1 { Some((0, 10_000)) } else { None }).unwrap();
    }
}
