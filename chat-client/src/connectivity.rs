//! Read-only view of session and network state.
//!
//! The network, socket and session layers own a [`ConnectivityPublisher`];
//! everything in this crate only ever holds a [`ConnectivityGate`]. Updates
//! are visible to readers as soon as they are published, and waiters on
//! [`ConnectivityGate::changed`] are woken immediately.

use crate::config::ClientConfig;
use chat_types::UserId;
use tokio::sync::watch;

/// Process-wide connectivity flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectivityState {
    /// A user session is logged in.
    pub session_active: bool,
    /// The device has network reachability.
    pub network_reachable: bool,
    /// The message socket is connected.
    pub socket_connected: bool,
}

impl ConnectivityState {
    /// Logged in, reachable and connected.
    pub fn online() -> Self {
        Self {
            session_active: true,
            network_reachable: true,
            socket_connected: true,
        }
    }

    /// Logged in with no network.
    pub fn offline() -> Self {
        Self {
            session_active: true,
            network_reachable: false,
            socket_connected: false,
        }
    }
}

/// Write side, held by the external session/network layers.
#[derive(Debug)]
pub struct ConnectivityPublisher {
    tx: watch::Sender<ConnectivityState>,
}

impl ConnectivityPublisher {
    /// Replace the whole state.
    pub fn publish(&self, state: ConnectivityState) {
        self.tx.send_replace(state);
    }

    /// Update network reachability.
    pub fn set_network_reachable(&self, reachable: bool) {
        self.tx.send_modify(|s| s.network_reachable = reachable);
    }

    /// Update socket connection state.
    pub fn set_socket_connected(&self, connected: bool) {
        self.tx.send_modify(|s| s.socket_connected = connected);
    }

    /// Update session state.
    pub fn set_session_active(&self, active: bool) {
        self.tx.send_modify(|s| s.session_active = active);
    }

    /// A new read-only view.
    pub fn gate(&self) -> ConnectivityGate {
        ConnectivityGate {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only connectivity accessor.
#[derive(Debug, Clone)]
pub struct ConnectivityGate {
    rx: watch::Receiver<ConnectivityState>,
}

impl ConnectivityGate {
    /// Create a publisher/gate pair starting at `initial`.
    pub fn channel(initial: ConnectivityState) -> (ConnectivityPublisher, ConnectivityGate) {
        let (tx, rx) = watch::channel(initial);
        (ConnectivityPublisher { tx }, ConnectivityGate { rx })
    }

    /// Current state.
    pub fn state(&self) -> ConnectivityState {
        *self.rx.borrow()
    }

    /// Session is active.
    pub fn session_active(&self) -> bool {
        self.rx.borrow().session_active
    }

    /// Network is reachable.
    pub fn network_reachable(&self) -> bool {
        self.rx.borrow().network_reachable
    }

    /// Socket is connected.
    pub fn socket_connected(&self) -> bool {
        self.rx.borrow().socket_connected
    }

    /// A receiver for change notifications, marked as up to date.
    pub fn watcher(&self) -> watch::Receiver<ConnectivityState> {
        let mut rx = self.rx.clone();
        rx.borrow_and_update();
        rx
    }
}

/// Read-only dependencies shared by the scheduler and every store.
#[derive(Debug, Clone)]
pub struct ClientContext {
    /// Connectivity view.
    pub connectivity: ConnectivityGate,
    /// The local user.
    pub me: UserId,
    /// Loaded configuration.
    pub config: ClientConfig,
}

impl ClientContext {
    /// Bundle the shared dependencies.
    pub fn new(connectivity: ConnectivityGate, me: UserId, config: ClientConfig) -> Self {
        Self {
            connectivity,
            me,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_reflects_published_state() {
        let (publisher, gate) = ConnectivityGate::channel(ConnectivityState::offline());
        assert!(gate.session_active());
        assert!(!gate.network_reachable());

        publisher.set_network_reachable(true);
        assert!(gate.network_reachable());
        assert!(!gate.socket_connected());

        publisher.publish(ConnectivityState::default());
        assert!(!gate.session_active());
    }

    #[test]
    fn extra_gates_share_state() {
        let (publisher, _gate) = ConnectivityGate::channel(ConnectivityState::offline());
        let other = publisher.gate();
        publisher.set_socket_connected(true);
        assert!(other.socket_connected());
    }

    #[tokio::test]
    async fn watcher_wakes_on_change() {
        let (publisher, gate) = ConnectivityGate::channel(ConnectivityState::offline());
        let mut rx = gate.watcher();
        let waiter = tokio::spawn(async move {
            rx.changed().await.unwrap();
            rx.borrow().network_reachable
        });
        tokio::task::yield_now().await;
        publisher.set_network_reachable(true);
        assert!(waiter.await.unwrap());
    }
}
