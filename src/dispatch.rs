// Post-to-UI primitive. Server tasks and background workers never touch the host
// UI directly; they post events that the host's single event loop drains.

use std::path::PathBuf;
use std::time::SystemTime;

use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A photo is waiting in the relay slot; the host may enable "proceed".
    ImageReady { received_at: SystemTime },
    /// `proceed()` persisted the capture and closed the session.
    SessionReady { file_path: PathBuf },
    /// The uploaded photo could not be saved; the session keeps listening.
    PersistFailed { message: String },
}

/// Sending half, cloneable into any thread or task.
#[derive(Debug, Clone)]
pub struct UiDispatcher {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

/// Receiving half, owned by the host event loop.
#[derive(Debug)]
pub struct UiEvents {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

pub fn ui_channel() -> (UiDispatcher, UiEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiDispatcher { tx }, UiEvents { rx })
}

impl UiDispatcher {
    /// Queues `event` for the UI. Dropped silently once the UI has gone away.
    pub fn post(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("UI event loop is gone; dropping session event");
        }
    }
}

impl UiEvents {
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order_across_threads() {
        let (dispatcher, mut events) = ui_channel();
        let worker = {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || {
                dispatcher.post(SessionEvent::PersistFailed {
                    message: "disk full".to_string(),
                });
                dispatcher.post(SessionEvent::SessionReady {
                    file_path: PathBuf::from("captured_1.jpg"),
                });
            })
        };
        worker.join().unwrap();

        assert!(matches!(
            events.try_next(),
            Some(SessionEvent::PersistFailed { .. })
        ));
        assert!(matches!(
            events.try_next(),
            Some(SessionEvent::SessionReady { .. })
        ));
        assert!(events.try_next().is_none());
    }

    #[test]
    fn test_post_after_ui_dropped_is_harmless() {
        let (dispatcher, events) = ui_channel();
        drop(events);
        dispatcher.post(SessionEvent::ImageReady {
            received_at: SystemTime::now(),
        });
    }
}
