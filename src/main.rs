// Headless host for the phone capture relay.
// Starts a pairing session, shows the QR code in the terminal, waits for the
// phone's upload and hands the saved capture to an optional external program.

mod shutdown_signal;

use clap::Parser;
use phone_capture_relay::{
    CaptureError, ErrorCorrection, FixedAddress, PairingDisplay, PersistedCapture, QrEncoder,
    SessionConfig, SessionController, SessionEvent,
    config::{DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PORT, DEFAULT_QR_SIZE},
    ui_channel,
};
use shutdown_signal::shutdown_signal;
use std::{
    net::Ipv4Addr,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, debug, error, info, warn};

/// Command line arguments for phone-capture-relay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct AppConfig {
    /// LAN IPv4 address to bind and advertise.
    /// If omitted, the first active non-loopback interface is used.
    #[arg(long, env = "PHONE_RELAY_HOST")]
    host: Option<Ipv4Addr>,

    /// Port number to listen on.
    #[arg(short, long, env = "PHONE_RELAY_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory accepted photos are written to.
    #[arg(long, env = "PHONE_RELAY_STORAGE_DIR", default_value = "captured_images")]
    storage_dir: PathBuf,

    /// Edge length of the QR code image in pixels.
    #[arg(long, env = "PHONE_RELAY_QR_SIZE", default_value_t = DEFAULT_QR_SIZE)]
    qr_size: u32,

    /// Largest accepted upload body in bytes.
    #[arg(long, env = "PHONE_RELAY_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// Also save the QR code as a PNG image at this path.
    #[arg(long, env = "PHONE_RELAY_QR_PNG")]
    qr_png: Option<PathBuf>,

    /// Save the photo as soon as it arrives instead of waiting for Enter.
    #[arg(long, env = "PHONE_RELAY_AUTO_PROCEED", action = clap::ArgAction::SetTrue)]
    auto_proceed: bool,

    /// Program to run with the saved capture's path once the session completes.
    #[arg(long, env = "PHONE_RELAY_ON_READY")]
    on_ready: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let config = AppConfig::parse();

    tracing_subscriber::fmt()
        .with_max_level(if config.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting phone-capture-relay...");

    let session_config = SessionConfig::default()
        .with_port(config.port)
        .with_qr_size(config.qr_size)
        .with_max_upload_bytes(config.max_upload_bytes);

    let (dispatcher, mut events) = ui_channel();
    let mut controller = match config.host {
        Some(ip) => {
            info!("Using configured LAN address {}", ip);
            SessionController::with_resolver(session_config, dispatcher, Arc::new(FixedAddress(ip)))
        }
        None => SessionController::new(session_config, dispatcher),
    };

    let display = match controller.start_session(&config.storage_dir).await {
        Ok(display) => display,
        Err(e) => {
            error!("Failed to start pairing session: {}", e);
            eprintln!("ERROR: Could not start pairing session: {}. Check the network connection and try again.", e);
            std::process::exit(1);
        }
    };
    show_pairing(&display, config.qr_png.as_deref());

    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut progress = CaptureProgress::default();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(SessionEvent::ImageReady { .. }) => {
                    if !progress.image_arrived() {
                        debug!("Ignoring upload that arrived after the capture was saved");
                    } else if config.auto_proceed {
                        proceed(&mut controller, &mut progress).await;
                    } else {
                        println!("Photo received. Press Enter to save it and continue.");
                    }
                }
                Some(SessionEvent::SessionReady { file_path }) => {
                    println!("Capture saved: {}", file_path.display());
                    if let Some(program) = &config.on_ready {
                        run_on_ready(program, &file_path).await;
                    }
                    break;
                }
                Some(SessionEvent::PersistFailed { message }) => {
                    eprintln!("Could not save the photo ({}). Upload again from the phone.", message);
                }
                None => break,
            },
            line = stdin_lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) if progress.image_ready => proceed(&mut controller, &mut progress).await,
                Ok(Some(_)) => println!("Waiting for the phone to upload a photo..."),
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = &mut shutdown => {
                info!("Shutdown requested, closing pairing session");
                controller.stop();
                break;
            }
        }
    }

    tracing::info!("phone-capture-relay has shut down.");
}

fn show_pairing(display: &PairingDisplay, qr_png: Option<&Path>) {
    println!("Connect your phone to the same network and open:");
    println!("    {}", display.pairing_url);

    match &display.qr_code {
        Ok(bitmap) => {
            // One character column per module; the full-size bitmap is for image output
            match QrEncoder::encode(&display.pairing_url, 0, ErrorCorrection::Medium) {
                Ok(compact) => println!("\n{}", compact.to_terminal_string()),
                Err(e) => warn!("Failed to render QR code for terminal: {}", e),
            }

            if let Some(path) = qr_png {
                match bitmap.to_gray_image().save(path) {
                    Ok(()) => info!("QR code written to {}", path.display()),
                    Err(e) => warn!("Failed to write QR code to {}: {}", path.display(), e),
                }
            }
        }
        Err(e) => println!("(QR code unavailable: {})", e),
    }
}

// Where the host is in the single capture it waits for
#[derive(Debug, Default)]
struct CaptureProgress {
    image_ready: bool,
    saved: bool,
}

impl CaptureProgress {
    /// Records an `ImageReady` event. Returns false once the capture is saved.
    fn image_arrived(&mut self) -> bool {
        if self.saved {
            return false;
        }
        self.image_ready = true;
        true
    }

    /// Claims the pending image for one proceed attempt.
    fn begin_proceed(&mut self) -> bool {
        std::mem::take(&mut self.image_ready) && !self.saved
    }

    fn finish_proceed(&mut self, result: &Result<PersistedCapture, CaptureError>) {
        if matches!(result, Ok(_) | Err(CaptureError::SessionClosed)) {
            self.saved = true;
        }
    }
}

async fn proceed(controller: &mut SessionController, progress: &mut CaptureProgress) {
    if !progress.begin_proceed() {
        return;
    }

    let result = controller.proceed().await;
    progress.finish_proceed(&result);
    match result {
        // The controller posts SessionReady; the event loop finishes from there
        Ok(capture) => info!("Proceeding with {}", capture.file_name),
        Err(CaptureError::EmptyRelay) => {
            println!("No photo is waiting yet.");
        }
        Err(CaptureError::SessionClosed) => debug!("Capture already saved"),
        Err(e) => warn!("Proceed failed: {}", e),
    }
}

// Hands the capture to the external analysis step and logs what it printed
async fn run_on_ready(program: &Path, file_path: &Path) {
    info!("Running {} {}", program.display(), file_path.display());
    match tokio::process::Command::new(program).arg(file_path).output().await {
        Ok(output) => {
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                info!("[{}] {}", program.display(), line);
            }
            for line in String::from_utf8_lossy(&output.stderr).lines() {
                warn!("[{}] {}", program.display(), line);
            }
            if !output.status.success() {
                error!("{} exited with {}", program.display(), output.status);
            }
        }
        Err(e) => error!("Failed to run {}: {}", program.display(), e),
    }
}
