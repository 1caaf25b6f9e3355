// Lifecycle of the LAN pairing server: Stopped -> Listening -> Closed.
// A server listens at most once; after `stop()` a new server must be created.

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::serve::Listener;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info};

use crate::config::SessionConfig;
use crate::error::CaptureError;
use crate::network::create_exclusive_listener;
use crate::relay_slot::RelaySlot;
use crate::web::{AppState, create_app};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Listening,
    Closed,
}

enum ServerState {
    Stopped,
    Listening(ListeningServer),
    // Carries the release signal of the port this server held, if any.
    Closed(Option<watch::Receiver<bool>>),
}

struct ListeningServer {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    port_released: watch::Receiver<bool>,
    // Detached on stop; in-flight requests finish on their own.
    _task: JoinHandle<()>,
}

// Flips to `true` when dropped.
struct PortRelease(watch::Sender<bool>);

impl Drop for PortRelease {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

// The listener handed to `axum::serve`. axum drops it as soon as graceful
// shutdown stops accepting, before in-flight connections drain.
struct ReleasingListener {
    inner: TcpListener,
    // Declared after `inner` so the socket is closed before the signal fires.
    _released: PortRelease,
}

impl Listener for ReleasingListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    fn accept(&mut self) -> impl Future<Output = (Self::Io, Self::Addr)> + Send {
        Listener::accept(&mut self.inner)
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Listener::local_addr(&self.inner)
    }
}

pub struct PairingServer {
    state: Mutex<ServerState>,
    app_state: AppState,
}

/// The URL a phone opens after scanning the QR code.
pub fn pairing_url(addr: SocketAddr) -> String {
    format!("http://{}", addr)
}

impl PairingServer {
    pub fn new(relay: Arc<RelaySlot>, config: &SessionConfig) -> Self {
        Self {
            state: Mutex::new(ServerState::Stopped),
            app_state: AppState::new(relay, &config.field_name, config.max_upload_bytes),
        }
    }

    pub fn state(&self) -> SessionState {
        match *self.lock() {
            ServerState::Stopped => SessionState::Stopped,
            ServerState::Listening(_) => SessionState::Listening,
            ServerState::Closed(_) => SessionState::Closed,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.lock() {
            ServerState::Listening(server) => Some(server.local_addr),
            _ => None,
        }
    }

    /// Binds `ip:port` exclusively and starts serving. Returns the pairing URL.
    ///
    /// Port `0` binds an ephemeral port; the URL carries the real one.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, ip: Ipv4Addr, port: u16) -> Result<String, CaptureError> {
        let mut state = self.lock();
        if !matches!(*state, ServerState::Stopped) {
            return Err(CaptureError::SessionClosed);
        }

        let addr = SocketAddr::new(IpAddr::V4(ip), port);
        let (local_addr, listener) =
            create_exclusive_listener(addr).map_err(|source| CaptureError::Bind { addr, source })?;

        let (released_tx, port_released) = watch::channel(false);
        let listener = ReleasingListener {
            inner: listener,
            _released: PortRelease(released_tx),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = create_app(self.app_state.clone());
        let task = tokio::spawn(async move {
            let shutdown = async move {
                // Also resolves if the sender is dropped with the server
                let _ = shutdown_rx.await;
                info!("Pairing server on {} no longer accepting connections", local_addr);
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Pairing server on {} failed: {}", local_addr, e);
            }
            info!("Pairing server on {} has shut down", local_addr);
        });

        *state = ServerState::Listening(ListeningServer {
            local_addr,
            shutdown_tx,
            port_released,
            _task: task,
        });

        let url = pairing_url(local_addr);
        info!("Pairing server listening: {}", url);
        Ok(url)
    }

    /// Stops accepting connections. Safe to call any number of times from any thread.
    ///
    /// Returns before the port is free; use [`PairingServer::stop_and_wait`]
    /// when the same port is about to be bound again.
    pub fn stop(&self) {
        let mut state = self.lock();
        let previous = std::mem::replace(&mut *state, ServerState::Closed(None));
        *state = match previous {
            ServerState::Listening(server) => {
                info!("Stopping pairing server on {}", server.local_addr);
                let _ = server.shutdown_tx.send(());
                ServerState::Closed(Some(server.port_released))
            }
            ServerState::Stopped => {
                info!("Pairing server closed before it was started");
                ServerState::Closed(None)
            }
            closed @ ServerState::Closed(_) => closed,
        };
    }

    /// Stops the server and resolves once its listening socket is closed.
    ///
    /// Does not wait for in-flight requests.
    pub async fn stop_and_wait(&self) {
        self.stop();
        let mut released = match &*self.lock() {
            ServerState::Closed(Some(released)) => released.clone(),
            _ => return,
        };
        // An error means the serve task is gone, and the listener with it
        if released.wait_for(|freed| *freed).await.is_ok() {
            debug!("Pairing server port released");
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PairingServer {
    fn drop(&mut self) {
        self.stop();
    }
}
