//! Transport collaborator contract (§6): a trait boundary only, no concrete
//! networking stack. A server or client binary supplies its own
//! `Transport` impl (HTTP, an RPC client, an in-process loopback); this
//! crate does not pick one for them.

pub mod contract;
pub mod loopback;

pub use contract::{AddressType, ProxyConfig, PushCallback, Transport};
pub use loopback::LoopbackTransport;
