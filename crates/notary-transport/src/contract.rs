//! Transport collaborator contract (§6).
//!
//! The notary core treats wire-level networking as an out-of-scope external
//! collaborator (§1): this module defines only the trait boundary a server
//! or client plugs a concrete transport into — `send`, `subscribePush`,
//! `changeAddressType`, `setProxy`. No concrete network stack lives here;
//! [`loopback`] provides the one trivial implementation this crate ships,
//! used by callers that need a `Transport` for in-process wiring or tests.

use notary_core::error::NotaryError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressType {
    Ipv4,
    Ipv6,
    Onion,
}

#[derive(Clone, Debug, Default)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

/// Invoked with each pushed frame once a push subscription is active.
pub type PushCallback = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// `Transport: send(endpoint, frame) -> frame`, plus push subscription and
/// the two connection-shaping operations named in §6.
pub trait Transport: Send + Sync {
    /// Deliver `frame` to `endpoint` and block for the reply frame.
    fn send(&self, endpoint: &str, frame: Vec<u8>) -> Result<Vec<u8>, NotaryError>;

    /// Ask `endpoint` to stream unsolicited replies to `callback` (notary
    /// push notifications after the first successful request, §4.8).
    fn subscribe_push(&self, endpoint: &str, callback: PushCallback) -> Result<(), NotaryError>;

    fn change_address_type(&self, address_type: AddressType) -> Result<(), NotaryError>;

    fn set_proxy(&self, proxy: Option<ProxyConfig>) -> Result<(), NotaryError>;
}
