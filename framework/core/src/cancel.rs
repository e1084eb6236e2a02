use tokio::sync::watch::{Receiver, Sender};

/// Broadcasts run cancellation to every in-flight scenario.
///
/// The handle owns the cancelled flag. Listeners observe it either by polling or by waiting,
/// and listeners created after [`CancelHandle::cancel`] has been called still see the
/// cancelled state.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Sender<bool>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::watch::channel(false).0,
        }
    }

    pub fn cancel(&self) {
        let was_cancelled = self.sender.send_replace(true);
        if !was_cancelled {
            log::info!("Cancelling run, waiting for in-flight scenarios to stop");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> CancelListener {
        CancelListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct CancelListener {
    receiver: Receiver<bool>,
}

impl CancelListener {
    pub(crate) fn new(receiver: Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check whether the run has been cancelled. If this returns true then no
    /// further work should be started on behalf of the scenario.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until the run is cancelled. It is safe to race this with another future so that
    /// cancellation can be used to abandon work in progress.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.receiver.borrow_and_update() {
                return;
            }
            if self.receiver.changed().await.is_err() {
                // The handle is gone so nothing can signal cancellation anymore. Treat the
                // run as cancelled.
                return;
            }
        }
    }
}
