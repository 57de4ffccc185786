//! Bindability checks for a listening address.

use std::net::{SocketAddr, TcpListener};

/// Tests whether an address can currently be bound.
pub trait PortProbe: Send + Sync {
    fn is_bindable(&self, addr: SocketAddr) -> bool;
}

/// Binds a real socket and releases it immediately.
///
/// `bind` on a TCP socket never waits for the network, so the probe returns
/// promptly whether the port is free or taken.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpPortProbe;

impl PortProbe for TcpPortProbe {
    fn is_bindable(&self, addr: SocketAddr) -> bool {
        match TcpListener::bind(addr) {
            Ok(listener) => {
                drop(listener);
                true
            }
            Err(e) => {
                tracing::trace!(%addr, "Port probe failed: {}", e);
                false
            }
        }
    }
}
