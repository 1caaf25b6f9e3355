// Phone-to-desktop image capture relay.
// A short-lived LAN HTTP server, paired through a QR code, that lets a phone
// browser upload one photo to the desktop host without installing anything.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod image_codec;
pub mod network;
pub mod qr;
pub mod relay_slot;
pub mod server;
pub mod session;
pub mod web;

pub use config::SessionConfig;
pub use dispatch::{SessionEvent, UiDispatcher, UiEvents, ui_channel};
pub use error::{CaptureError, PersistError};
pub use image_codec::PersistedCapture;
pub use network::{AddressResolver, FixedAddress, ResolveAddress};
pub use qr::{ErrorCorrection, QrBitmap, QrEncoder};
pub use relay_slot::{RelaySlot, UploadedImage};
pub use server::{PairingServer, SessionState};
pub use session::{PairingDisplay, PairingSession, SessionController};
