use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, info, warn};

use crate::coordinator::Coordinator;

/// Commands sent to the retrier thread.
enum RetryCommand {
    /// Stop the loop.
    Shutdown,
}

/// Background thread that periodically re-delivers recorded decisions to
/// residual participants.
///
/// The loop stops when the retrier is dropped.
pub struct NotificationRetrier {
    sender: Sender<RetryCommand>,
    handle: Option<JoinHandle<()>>,
}

impl NotificationRetrier {
    pub fn spawn(coordinator: Arc<Coordinator>, interval: Duration) -> Self {
        let (sender, receiver) = bounded::<RetryCommand>(1);

        let handle = thread::spawn(move || {
            info!("Notification retrier started, every {:?}", interval);
            loop {
                match receiver.recv_timeout(interval) {
                    Ok(RetryCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => match coordinator.redrive_pending() {
                        Ok(0) => {}
                        Ok(resolved) => debug!("Retrier resolved {} transactions", resolved),
                        Err(e) => warn!("Retrier pass failed: {}", e),
                    },
                }
            }
            info!("Notification retrier shutting down");
        });

        Self {
            sender,
            handle: Some(handle),
        }
    }
}

impl Drop for NotificationRetrier {
    fn drop(&mut self) {
        let _ = self.sender.send(RetryCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join() {
                warn!("Failed to join notification retrier: {:?}", e);
            }
        }
    }
}
