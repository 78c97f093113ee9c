//! An in-process [`Transport`] that calls a handler closure directly instead
//! of going over any network — useful for wiring a `notary-node` and a
//! `notary-client` together in the same process (tests, single-binary
//! demos) without pulling in a concrete networking crate.

use std::sync::Mutex;

use notary_core::error::NotaryError;
use tracing::debug;

use crate::contract::{AddressType, ProxyConfig, PushCallback, Transport};

pub struct LoopbackTransport<F>
where
    F: Fn(&str, Vec<u8>) -> Result<Vec<u8>, NotaryError> + Send + Sync,
{
    handler: F,
    push_subscribers: Mutex<Vec<(String, PushCallback)>>,
}

impl<F> LoopbackTransport<F>
where
    F: Fn(&str, Vec<u8>) -> Result<Vec<u8>, NotaryError> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler, push_subscribers: Mutex::new(Vec::new()) }
    }

    /// Deliver `frame` to every subscriber registered against `endpoint`.
    pub fn push(&self, endpoint: &str, frame: Vec<u8>) {
        let subs = self.push_subscribers.lock().expect("push subscriber lock poisoned");
        for (ep, cb) in subs.iter() {
            if ep == endpoint {
                cb(frame.clone());
            }
        }
    }
}

impl<F> Transport for LoopbackTransport<F>
where
    F: Fn(&str, Vec<u8>) -> Result<Vec<u8>, NotaryError> + Send + Sync,
{
    fn send(&self, endpoint: &str, frame: Vec<u8>) -> Result<Vec<u8>, NotaryError> {
        (self.handler)(endpoint, frame)
    }

    fn subscribe_push(&self, endpoint: &str, callback: PushCallback) -> Result<(), NotaryError> {
        debug!(endpoint, "loopback transport: push subscription registered");
        self.push_subscribers.lock().expect("push subscriber lock poisoned").push((endpoint.to_string(), callback));
        Ok(())
    }

    fn change_address_type(&self, _address_type: AddressType) -> Result<(), NotaryError> {
        Ok(())
    }

    fn set_proxy(&self, _proxy: Option<ProxyConfig>) -> Result<(), NotaryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn send_round_trips_through_handler() {
        let transport = LoopbackTransport::new(|endpoint, frame| {
            assert_eq!(endpoint, "notary://local");
            Ok(frame)
        });
        let reply = transport.send("notary://local", vec![1, 2, 3]).unwrap();
        assert_eq!(reply, vec![1, 2, 3]);
    }

    #[test]
    fn push_delivers_only_to_matching_endpoint() {
        let transport = LoopbackTransport::new(|_, frame| Ok(frame));
        let received = Arc::new(AtomicUsize::new(0));
        let r = received.clone();
        transport
            .subscribe_push("nym://a", Box::new(move |_frame| { r.fetch_add(1, Ordering::SeqCst); }))
            .unwrap();

        transport.push("nym://b", vec![9]);
        assert_eq!(received.load(Ordering::SeqCst), 0);
        transport.push("nym://a", vec![9]);
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
