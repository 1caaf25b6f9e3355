// Orchestrates one phone capture: resolve a LAN address, start the pairing
// server, render the QR code, relay readiness to the UI and persist the photo.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::SessionConfig;
use crate::dispatch::{SessionEvent, UiDispatcher};
use crate::error::{CaptureError, PersistError};
use crate::image_codec::{PersistedCapture, persist_capture};
use crate::network::{AddressResolver, ResolveAddress};
use crate::qr::{ErrorCorrection, QrBitmap, QrEncoder};
use crate::relay_slot::RelaySlot;
use crate::server::{PairingServer, SessionState};

/// Snapshot of the current pairing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingSession {
    pub bound_address: Ipv4Addr,
    pub port: u16,
    pub pairing_url: String,
    pub state: SessionState,
}

/// What the host shows the user after a session starts.
///
/// When the URL cannot be encoded the session is still usable; the host should
/// fall back to displaying `pairing_url` as selectable text.
#[derive(Debug)]
pub struct PairingDisplay {
    pub pairing_url: String,
    pub qr_code: Result<QrBitmap, CaptureError>,
}

struct ActiveSession {
    bound_address: Ipv4Addr,
    port: u16,
    pairing_url: String,
    storage_dir: PathBuf,
    relay: Arc<RelaySlot>,
    server: PairingServer,
    watcher: JoinHandle<()>,
}

impl ActiveSession {
    fn close(&self) {
        self.server.stop();
        self.watcher.abort();
    }
}

pub struct SessionController {
    config: SessionConfig,
    resolver: Arc<dyn ResolveAddress>,
    dispatcher: UiDispatcher,
    active: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(config: SessionConfig, dispatcher: UiDispatcher) -> Self {
        Self::with_resolver(config, dispatcher, Arc::new(AddressResolver::system()))
    }

    pub fn with_resolver(
        config: SessionConfig,
        dispatcher: UiDispatcher,
        resolver: Arc<dyn ResolveAddress>,
    ) -> Self {
        Self {
            config,
            resolver,
            dispatcher,
            active: None,
        }
    }

    pub fn session(&self) -> Option<PairingSession> {
        self.active.as_ref().map(|active| PairingSession {
            bound_address: active.bound_address,
            port: active.port,
            pairing_url: active.pairing_url.clone(),
            state: active.server.state(),
        })
    }

    /// Starts a fresh pairing session that saves captures under `storage_dir`.
    ///
    /// Any previous session is closed first, and its port released before the
    /// new server binds. Must be called from within a Tokio runtime.
    pub async fn start_session(
        &mut self,
        storage_dir: impl Into<PathBuf>,
    ) -> Result<PairingDisplay, CaptureError> {
        if let Some(previous) = self.active.take() {
            info!("Closing previous pairing session {}", previous.pairing_url);
            previous.close();
            previous.server.stop_and_wait().await;
        }

        let resolver = Arc::clone(&self.resolver);
        let bound_address = tokio::task::spawn_blocking(move || resolver.resolve())
            .await
            .map_err(|e| CaptureError::InterfaceEnumeration(std::io::Error::other(e)))??;

        let relay = Arc::new(RelaySlot::new());
        let server = PairingServer::new(Arc::clone(&relay), &self.config);
        let pairing_url = server.start(bound_address, self.config.port)?;
        let port = server
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or(self.config.port);

        let qr_code = QrEncoder::encode(&pairing_url, self.config.qr_size, ErrorCorrection::Medium);
        if let Err(err) = &qr_code {
            warn!("Showing pairing URL as text only: {}", err);
        }

        let watcher = spawn_ready_watcher(Arc::clone(&relay), self.dispatcher.clone());

        self.active = Some(ActiveSession {
            bound_address,
            port,
            pairing_url: pairing_url.clone(),
            storage_dir: storage_dir.into(),
            relay,
            server,
            watcher,
        });

        Ok(PairingDisplay {
            pairing_url,
            qr_code,
        })
    }

    /// Saves the pending photo, closes the session and returns the capture.
    ///
    /// On a persist failure the photo is discarded but the session keeps
    /// listening, so the phone can upload again without re-pairing.
    pub async fn proceed(&mut self) -> Result<PersistedCapture, CaptureError> {
        let active = self.active.as_ref().ok_or(CaptureError::NoActiveSession)?;
        if active.server.state() != SessionState::Listening {
            return Err(CaptureError::SessionClosed);
        }

        let image = active.relay.take().ok_or(CaptureError::EmptyRelay)?;
        let storage_dir = active.storage_dir.clone();

        let persisted = tokio::task::spawn_blocking(move || {
            persist_capture(&image.bytes, &storage_dir, SystemTime::now())
        })
        .await
        .unwrap_or_else(|join_err| {
            Err((
                active.storage_dir.clone(),
                PersistError::Worker(join_err.to_string()),
            ))
        });

        match persisted {
            Ok(capture) => {
                info!("Capture saved to {}", capture.file_path.display());
                active.close();
                self.dispatcher.post(SessionEvent::SessionReady {
                    file_path: capture.file_path.clone(),
                });
                Ok(capture)
            }
            Err((path, source)) => {
                error!("Failed to save capture to {}: {}", path.display(), source);
                self.dispatcher.post(SessionEvent::PersistFailed {
                    message: source.to_string(),
                });
                Err(CaptureError::Persist { path, source })
            }
        }
    }

    /// Abandons the current session without saving anything.
    pub fn stop(&mut self) {
        if let Some(active) = &self.active {
            active.close();
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

// Forwards relay readiness to the UI; runs until the session closes.
fn spawn_ready_watcher(relay: Arc<RelaySlot>, dispatcher: UiDispatcher) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            relay.wait_ready().await;
            if relay.peek_ready() {
                dispatcher.post(SessionEvent::ImageReady {
                    received_at: SystemTime::now(),
                });
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ui_channel;
    use crate::network::FixedAddress;

    struct NoLan;

    impl ResolveAddress for NoLan {
        fn resolve(&self) -> Result<Ipv4Addr, CaptureError> {
            Err(CaptureError::NoAddressFound)
        }
    }

    fn loopback_controller() -> (SessionController, crate::dispatch::UiEvents) {
        let (dispatcher, events) = ui_channel();
        let controller = SessionController::with_resolver(
            SessionConfig::default().with_port(0),
            dispatcher,
            Arc::new(FixedAddress(Ipv4Addr::LOCALHOST)),
        );
        (controller, events)
    }

    #[tokio::test]
    async fn test_start_session_without_lan_fails() {
        let (dispatcher, _events) = ui_channel();
        let mut controller = SessionController::with_resolver(
            SessionConfig::default().with_port(0),
            dispatcher,
            Arc::new(NoLan),
        );

        assert!(matches!(
            controller.start_session("unused").await,
            Err(CaptureError::NoAddressFound)
        ));
        assert!(controller.session().is_none());
    }

    #[tokio::test]
    async fn test_start_session_renders_qr_for_url() {
        let (mut controller, _events) = loopback_controller();
        let display = controller.start_session("unused").await.unwrap();

        let session = controller.session().unwrap();
        assert_eq!(session.state, SessionState::Listening);
        assert_eq!(session.bound_address, Ipv4Addr::LOCALHOST);
        assert_eq!(display.pairing_url, format!("http://127.0.0.1:{}", session.port));
        assert_eq!(display.qr_code.unwrap().size(), 250);
    }

    #[tokio::test]
    async fn test_proceed_before_upload_is_empty_relay() {
        let (mut controller, _events) = loopback_controller();
        controller.start_session("unused").await.unwrap();

        assert!(matches!(
            controller.proceed().await,
            Err(CaptureError::EmptyRelay)
        ));
        assert_eq!(controller.session().unwrap().state, SessionState::Listening);
    }

    #[tokio::test]
    async fn test_proceed_without_session() {
        let (mut controller, _events) = loopback_controller();
        assert!(matches!(
            controller.proceed().await,
            Err(CaptureError::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_session_listening() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, mut events) = loopback_controller();
        controller.start_session(dir.path()).await.unwrap();

        let relay = Arc::clone(&controller.active.as_ref().unwrap().relay);
        relay.set(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00]);

        let err = controller.proceed().await.unwrap_err();
        assert!(matches!(err, CaptureError::Persist { .. }));
        assert!(err.keeps_session_listening());
        assert!(!relay.peek_ready());
        assert_eq!(controller.session().unwrap().state, SessionState::Listening);

        loop {
            match events.next().await.unwrap() {
                SessionEvent::PersistFailed { .. } => break,
                SessionEvent::ImageReady { .. } => continue,
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn png_bytes() -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        image::RgbImage::from_pixel(4, 4, image::Rgb([10, 200, 30]))
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[tokio::test]
    async fn test_restart_on_fixed_port_rebinds_same_port() {
        let port = free_port();
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, _events) = ui_channel();
        let mut controller = SessionController::with_resolver(
            SessionConfig::default().with_port(port),
            dispatcher,
            Arc::new(FixedAddress(Ipv4Addr::LOCALHOST)),
        );

        let first = controller.start_session(dir.path()).await.unwrap();
        let second = controller.start_session(dir.path()).await.unwrap();
        assert_eq!(first.pairing_url, second.pairing_url);
        let session = controller.session().unwrap();
        assert_eq!(session.port, port);
        assert_eq!(session.state, SessionState::Listening);

        // A finished capture followed by a fresh session on the same port
        controller.active.as_ref().unwrap().relay.set(png_bytes());
        controller.proceed().await.unwrap();
        assert_eq!(controller.session().unwrap().state, SessionState::Closed);

        controller.start_session(dir.path()).await.unwrap();
        let session = controller.session().unwrap();
        assert_eq!(session.port, port);
        assert_eq!(session.state, SessionState::Listening);
    }

    #[tokio::test]
    async fn test_restarting_closes_previous_session() {
        let (mut controller, _events) = loopback_controller();
        controller.start_session("unused").await.unwrap();
        let first_port = controller.session().unwrap().port;

        controller.start_session("unused").await.unwrap();
        let second = controller.session().unwrap();
        assert_eq!(second.state, SessionState::Listening);
        assert_ne!(second.port, first_port);

        let first_addr = std::net::SocketAddr::from((Ipv4Addr::LOCALHOST, first_port));
        let mut refused = false;
        for _ in 0..100 {
            if tokio::net::TcpStream::connect(first_addr).await.is_err() {
                refused = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(refused, "previous session still accepting connections");
    }
}
