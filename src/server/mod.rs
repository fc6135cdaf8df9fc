use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Notify};

use crate::protocol::ClientId;

pub mod tcp;
pub mod udp;

pub use tcp::TcpDispatcher;
pub use udp::UdpDispatcher;

/// Server-side configuration shared by both dispatchers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Probability in [0, 1] that a UDP acknowledgment is withheld to
    /// simulate loss. Ignored by the TCP dispatcher.
    pub loss_probability: f64,
    /// Receive buffer for inbound frames/datagrams.
    pub buffer_size: usize,
    /// Exchange log, truncated when the dispatcher binds.
    pub log_path: PathBuf,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16, log_path: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port,
            loss_probability: 0.0,
            buffer_size: crate::defaults::RECV_BUFFER,
            log_path: log_path.into(),
        }
    }

    pub fn with_loss_probability(mut self, loss_probability: f64) -> Self {
        self.loss_probability = loss_probability;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Identity book for one server run.
///
/// Addresses map to client ids under a single lock; the counter only moves
/// forward, so ids stay unique for the lifetime of the run even after
/// entries are removed.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    peers: HashMap<SocketAddr, ClientId>,
    next_id: u32,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing id for `addr`, or a freshly assigned one.
    ///
    /// The read-check-then-insert runs under the lock, so two concurrent
    /// arrivals from the same new peer cannot race into two identities.
    pub async fn register(&self, addr: SocketAddr) -> ClientId {
        let mut inner = self.inner.lock().await;
        if let Some(&id) = inner.peers.get(&addr) {
            return id;
        }
        inner.next_id += 1;
        let id = ClientId(inner.next_id);
        inner.peers.insert(addr, id);
        id
    }

    pub async fn lookup(&self, addr: &SocketAddr) -> Option<ClientId> {
        self.inner.lock().await.peers.get(addr).copied()
    }

    pub async fn remove(&self, addr: &SocketAddr) {
        self.inner.lock().await.peers.remove(addr);
    }

    /// Peers currently registered.
    pub async fn active_peers(&self) -> usize {
        self.inner.lock().await.peers.len()
    }

    /// Total identities handed out since startup; never decreases.
    pub async fn peers_assigned(&self) -> usize {
        self.inner.lock().await.next_id as usize
    }

    /// Current address-to-identity mapping.
    pub async fn snapshot(&self) -> Vec<(SocketAddr, ClientId)> {
        let inner = self.inner.lock().await;
        inner.peers.iter().map(|(&a, &id)| (a, id)).collect()
    }
}

/// Shutdown flag shared between a dispatch loop and its handlers.
///
/// Handlers trigger it when they see the STOP payload; the loop selects on
/// `wait` so the signal is never missed between accepts/receives.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolves once `trigger` has been called, immediately if it already
    /// was.
    pub async fn wait(&self) {
        while !self.is_triggered() {
            let notified = self.notify.notified();
            // Re-check after registering interest so a trigger racing with
            // the check above cannot be lost.
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[tokio::test]
    async fn test_registry_assigns_monotonic_distinct_ids() {
        let registry = PeerRegistry::new();
        let first = registry.register(addr(1000)).await;
        let second = registry.register(addr(2000)).await;
        assert_eq!(first, ClientId(1));
        assert_eq!(second, ClientId(2));
        assert_eq!(registry.peers_assigned().await, 2);
    }

    #[tokio::test]
    async fn test_registry_is_stable_for_reused_addresses() {
        let registry = PeerRegistry::new();
        let first = registry.register(addr(1000)).await;
        let again = registry.register(addr(1000)).await;
        assert_eq!(first, again);
        assert_eq!(registry.active_peers().await, 1);
    }

    #[tokio::test]
    async fn test_registry_never_reuses_removed_ids() {
        let registry = PeerRegistry::new();
        let first = registry.register(addr(1000)).await;
        registry.remove(&addr(1000)).await;
        let second = registry.register(addr(1000)).await;
        assert_ne!(first, second);
        assert_eq!(registry.active_peers().await, 1);
        assert_eq!(registry.peers_assigned().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_registration_yields_one_identity_per_peer() {
        let registry = Arc::new(PeerRegistry::new());
        let mut workers = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            workers.push(tokio::spawn(
                async move { registry.register(addr(3000)).await },
            ));
        }
        let mut ids = Vec::new();
        for worker in workers {
            ids.push(worker.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(registry.peers_assigned().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_signal_wakes_waiters() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            tokio::spawn(async move { signal.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake after trigger")
            .unwrap();
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_shutdown_wait_returns_immediately_when_already_triggered() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("wait should not block after trigger");
    }
}
