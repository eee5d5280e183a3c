//! Module concerned with handling the global application lifecycle of snwatcher.
//! Currently, this only means handling application exit: [`subscribe_exit`] hands out a receiver
//! that yields an event once the process is asked to terminate.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use tokio::sync::broadcast;

pub static APPLICATION_EXIT_SENDER: Lazy<broadcast::Sender<()>> = Lazy::new(|| broadcast::channel(2).0);

/// Notify all listening tasks of the termination of the snwatcher process.
pub fn send_exit() -> Result<()> {
    (APPLICATION_EXIT_SENDER).send(()).context("Failed to send exit lifecycle event")?;
    Ok(())
}

/// Receiver for exit lifecycle events. Only events sent after this call are seen, so subscribe
/// before anything that might send one is installed.
pub fn subscribe_exit() -> broadcast::Receiver<()> {
    (APPLICATION_EXIT_SENDER).subscribe()
}

/// Turn SIGINT and SIGTERM into exit lifecycle events.
pub fn install_signal_handler() {
    simple_signal::set_handler(&[simple_signal::Signal::Int, simple_signal::Signal::Term], move |_| {
        log::info!("Shutting down snwatcher...");
        if let Err(e) = send_exit() {
            log::error!("Failed to send application shutdown event: {:?}", e);
            std::process::exit(1);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_sent_before_waiting_is_received() {
        let mut exit = subscribe_exit();
        send_exit().unwrap();
        // nothing awaited between subscribing and sending; the event must still arrive
        assert!(exit.recv().await.is_ok());
    }
}
