//! Streaming domain generation.
//!
//! [`generate`] runs the odometer from [`crate::pattern`] on its own task and
//! pushes each domain into a bounded channel. The producer stalls whenever
//! the channel is full, so memory stays proportional to the channel capacity
//! no matter how many combinations the pattern describes.
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use gois_lib::generate::generate;
//! use gois_lib::pattern::compile;
//!
//! let (plan, _) = compile("[ab]{2}.org").unwrap();
//! let mut stream = generate(plan);
//! let mut names = Vec::new();
//! while let Some(domain) = stream.recv().await {
//!     names.push(domain);
//! }
//! assert_eq!(names, ["aa.org", "ab.org", "ba.org", "bb.org"]);
//! # }
//! ```

use crate::pattern::{PatternPlan, TotalCount};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the generator's output channel.
pub const GENERATOR_CHANNEL_CAPACITY: usize = 1024;

/// Receiving end of a running generator.
///
/// End of stream is signalled by the channel closing after the last
/// combination, never by a sentinel value. Dropping the stream stops the
/// producer at its next send.
#[derive(Debug)]
pub struct DomainStream {
    rx: mpsc::Receiver<String>,
    producer: JoinHandle<()>,
    total: TotalCount,
}

impl DomainStream {
    /// Wait for the next domain; `None` once the producer has finished.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Combination count reported by the compiler.
    pub fn total(&self) -> TotalCount {
        self.total
    }

    /// Domains produced but not yet received.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Whether the producer task is still running (possibly parked on a
    /// full channel).
    pub fn is_producing(&self) -> bool {
        !self.producer.is_finished()
    }

    pub(crate) fn into_receiver(self) -> mpsc::Receiver<String> {
        self.rx
    }
}

impl Stream for DomainStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.rx.poll_recv(cx)
    }
}

/// Start generating every domain of `plan` into a channel of
/// [`GENERATOR_CHANNEL_CAPACITY`] entries.
///
/// Must be called from within a Tokio runtime.
pub fn generate(plan: PatternPlan) -> DomainStream {
    generate_with_capacity(plan, GENERATOR_CHANNEL_CAPACITY)
}

/// Like [`generate`] with an explicit channel capacity (minimum 1).
pub fn generate_with_capacity(plan: PatternPlan, capacity: usize) -> DomainStream {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let total = plan.total();

    let producer = tokio::spawn(async move {
        let mut emitted: u64 = 0;
        for domain in plan.combinations() {
            if tx.send(domain).await.is_err() {
                tracing::debug!(emitted, "domain stream receiver dropped; stopping generator");
                return;
            }
            emitted += 1;
        }
        tracing::debug!(emitted, pattern = plan.template(), "generation finished");
    });

    DomainStream { rx, producer, total }
}
