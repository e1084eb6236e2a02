use gauntlet_core::prelude::CancelHandle;
use tokio::signal;

pub(crate) fn start_interrupt_listener(cancel: &CancelHandle) {
    let handle = cancel.clone();
    tokio::spawn(async move {
        // A panic here would be swallowed by the detached task, so a registration failure
        // is logged and the run carries on without Ctrl-C handling.
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C, the run cannot be interrupted: {e}");
            return;
        }
        handle.cancel();
        println!("Received Ctrl-C, stopping the run...");
    });
}
