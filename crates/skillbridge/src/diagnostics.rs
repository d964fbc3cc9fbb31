//! Out-of-band text toward the simulator's error stream.
//!
//! The simulator shows whatever arrives here in its console. Every message is
//! also emitted as a tracing event so it reaches the bridge's own log.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::bridge::ChannelError;

/// Pause before each debug message; the simulator console drops lines that
/// arrive in quick bursts.
pub const DEFAULT_DEBUG_DELAY: Duration = Duration::from_secs(1);

pub struct Diagnostics<E> {
    writer: E,
    debug: bool,
    debug_delay: Duration,
}

impl<E: AsyncWrite + Unpin> Diagnostics<E> {
    pub fn new(writer: E) -> Self {
        Self {
            writer,
            debug: false,
            debug_delay: DEFAULT_DEBUG_DELAY,
        }
    }

    pub fn with_debug(mut self, enabled: bool, delay: Duration) -> Self {
        self.debug = enabled;
        self.debug_delay = delay;
        self
    }

    pub async fn send_warning(&mut self, text: &str) -> Result<(), ChannelError> {
        tracing::warn!(target: "skillbridge::diagnostics", "{}", text.trim_end());
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// No-op unless debug output was enabled.
    pub async fn send_debug(&mut self, text: &str) -> Result<(), ChannelError> {
        if !self.debug {
            tracing::debug!(text, "Debug diagnostic suppressed");
            return Ok(());
        }
        tokio::time::sleep(self.debug_delay).await;
        self.send_warning(&format!("[Debug] {}", text)).await
    }

    pub async fn close(&mut self) -> Result<(), ChannelError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Diagnostics over this process's own stderr.
pub fn stderr() -> Diagnostics<tokio::io::Stderr> {
    Diagnostics::new(tokio::io::stderr())
}
