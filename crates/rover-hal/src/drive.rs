//! [`CommandSink`] – the single seam between decisions and the drive base.
//!
//! The autopilot only ever talks to this trait, so the physical link (serial
//! byte protocol, simulator, network bridge) can be swapped without touching
//! the decision loop.  Sinks are owned by the caller and may be shared with
//! other subsystems (e.g. a manual teleop endpoint) through an `Arc`.

use async_trait::async_trait;
use rover_types::{Command, RoverError};

/// Turns a validated [`Command`] into a physical actuation request.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Perform `command`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] when the link is down or the
    /// write fails.
    async fn send(&self, command: Command) -> Result<(), RoverError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<Command>>);

    #[async_trait]
    impl CommandSink for Recorder {
        async fn send(&self, command: Command) -> Result<(), RoverError> {
            self.0.lock().unwrap().push(command);
            Ok(())
        }
    }

    #[tokio::test]
    async fn sink_is_usable_through_trait_object() {
        let rec = std::sync::Arc::new(Recorder(Mutex::new(Vec::new())));
        let sink: std::sync::Arc<dyn CommandSink> = rec.clone();
        sink.send(Command::Left).await.unwrap();
        sink.send(Command::Stop).await.unwrap();
        assert_eq!(*rec.0.lock().unwrap(), vec![Command::Left, Command::Stop]);
    }
}
