//! Batched long-polling loop driving the bot.
//!
//! Updates are processed strictly one at a time, in arrival order. The
//! offset always moves past the whole batch so one bad update cannot wedge
//! the loop. A failed poll is fatal: the loop stops and the caller exits.

use super::listener::UpdateListener;
use super::transport::{IncomingUpdate, ReplySink, TransportError, UpdateSource};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Reasons the consumer loop stops.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Polling for the next batch failed.
    #[error("failed to fetch updates at offset {offset}: {source}")]
    Fetch {
        /// Offset of the failed poll.
        offset: i32,
        /// Transport failure.
        #[source]
        source: TransportError,
    },
}

/// Feeds polled updates to the listener and delivers its replies.
pub struct BatchConsumer<S, R> {
    source: S,
    sink: R,
    listener: UpdateListener,
    batch_size: u8,
}

impl<S: UpdateSource, R: ReplySink> BatchConsumer<S, R> {
    /// Create a consumer polling `batch_size` updates at a time
    pub fn new(source: S, sink: R, listener: UpdateListener, batch_size: u8) -> Self {
        Self {
            source,
            sink,
            listener,
            batch_size,
        }
    }

    /// Poll until `shutdown` is cancelled or a poll fails.
    ///
    /// Shutdown is only observed while waiting for a batch; a batch that is
    /// already being processed runs to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::Fetch`] when a poll fails.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ConsumerError> {
        info!(batch_size = self.batch_size, "Consuming updates");

        let mut offset = 0;
        loop {
            let updates = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!(offset, "Shutdown requested, stopping consumer");
                    return Ok(());
                }
                fetched = self.source.fetch(offset, self.batch_size) => {
                    fetched.map_err(|source| ConsumerError::Fetch { offset, source })?
                }
            };
            offset = self.process(offset, updates).await;
        }
    }

    /// Fetch and process a single batch, returning the next offset.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the poll fails.
    pub async fn run_batch(&self, offset: i32) -> Result<i32, TransportError> {
        let updates = self.source.fetch(offset, self.batch_size).await?;
        Ok(self.process(offset, updates).await)
    }

    async fn process(&self, offset: i32, updates: Vec<IncomingUpdate>) -> i32 {
        if !updates.is_empty() {
            debug!(offset, count = updates.len(), "Processing batch");
        }

        let mut next = offset;
        for update in updates {
            next = next.max(update.id.saturating_add(1));

            let Some(event) = update.event else {
                debug!(update_id = update.id, "Skipping unsupported update");
                continue;
            };

            let Some(reply) = self.listener.handle(event).await else {
                continue;
            };
            let chat_id = reply.chat_id();
            if let Err(e) = self.sink.deliver(reply).await {
                error!(update_id = update.id, chat_id, error = %e, "Failed to deliver reply");
            }
        }
        next
    }
}
