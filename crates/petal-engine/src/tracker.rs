//! Fire-and-forget persistence for behavioural records.
//!
//! Request handlers hand records to a bounded channel and return at once.
//! A single background task drains the channel and writes each record with
//! a bounded retry. When the queue is full or retries run out, the record
//! is dropped and logged; the caller never sees the failure.

use std::{
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use petal_core::{
  event::InteractionEvent,
  feedback::{RecommendationClick, RecommendationImpression, SearchQuery},
  store::EngineStore,
};
use tokio::{
  sync::{mpsc, oneshot},
  task::JoinHandle,
};
use tracing::{error, warn};

/// One append-only write.
#[derive(Debug, Clone)]
pub enum Record {
  Interaction(InteractionEvent),
  Impression(RecommendationImpression),
  Click(RecommendationClick),
  Search(SearchQuery),
}

impl Record {
  fn kind(&self) -> &'static str {
    match self {
      Self::Interaction(_) => "interaction",
      Self::Impression(_) => "impression",
      Self::Click(_) => "click",
      Self::Search(_) => "search",
    }
  }
}

enum Command {
  Write(Record),
  Flush(oneshot::Sender<()>),
}

/// Counters for records written and records given up on.
#[derive(Debug, Default)]
pub struct TrackerStats {
  written: AtomicU64,
  dropped: AtomicU64,
}

impl TrackerStats {
  pub fn written(&self) -> u64 { self.written.load(Ordering::Relaxed) }

  pub fn dropped(&self) -> u64 { self.dropped.load(Ordering::Relaxed) }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub retries: u32,
  pub backoff: Duration,
}

/// Cheap to clone; every clone feeds the same writer task.
#[derive(Clone)]
pub struct Tracker {
  tx:    mpsc::Sender<Command>,
  stats: Arc<TrackerStats>,
}

impl Tracker {
  /// Start the writer task. It runs until every `Tracker` clone is dropped.
  pub fn spawn<S>(store: Arc<S>, capacity: usize, policy: RetryPolicy) -> (Self, JoinHandle<()>)
  where
    S: EngineStore + 'static,
  {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(TrackerStats::default());
    let handle = tokio::spawn(run(store, rx, policy, stats.clone()));
    (Self { tx, stats }, handle)
  }

  /// Queue a record. Never blocks and never fails the caller.
  pub fn record(&self, record: Record) {
    match self.tx.try_send(Command::Write(record)) {
      Ok(()) => {}
      Err(mpsc::error::TrySendError::Full(Command::Write(r))) => {
        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(kind = r.kind(), "tracker queue full, dropping record");
      }
      Err(_) => {
        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        warn!("tracker stopped, dropping record");
      }
    }
  }

  /// Wait until every record queued before this call has been handled.
  pub async fn flush(&self) {
    let (done, wait) = oneshot::channel();
    if self.tx.send(Command::Flush(done)).await.is_ok() {
      let _ = wait.await;
    }
  }

  pub fn stats(&self) -> &TrackerStats { &self.stats }
}

async fn run<S: EngineStore>(
  store: Arc<S>,
  mut rx: mpsc::Receiver<Command>,
  policy: RetryPolicy,
  stats: Arc<TrackerStats>,
) {
  while let Some(command) = rx.recv().await {
    match command {
      Command::Write(record) => {
        if write_with_retry(store.as_ref(), &record, policy).await {
          stats.written.fetch_add(1, Ordering::Relaxed);
        } else {
          stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
      }
      Command::Flush(done) => {
        let _ = done.send(());
      }
    }
  }
}

async fn write_with_retry<S: EngineStore>(store: &S, record: &Record, policy: RetryPolicy) -> bool {
  let mut attempt = 0u32;
  loop {
    match write(store, record.clone()).await {
      Ok(()) => return true,
      Err(e) if attempt < policy.retries => {
        warn!(kind = record.kind(), attempt, error = %e, "tracker write failed, retrying");
        tokio::time::sleep(policy.backoff * 2u32.saturating_pow(attempt)).await;
        attempt += 1;
      }
      Err(e) => {
        error!(kind = record.kind(), error = %e, "tracker retries exhausted, dropping record");
        return false;
      }
    }
  }
}

async fn write<S: EngineStore>(store: &S, record: Record) -> Result<(), S::Error> {
  match record {
    Record::Interaction(event) => store.append_interaction(event).await,
    Record::Impression(impression) => store.append_impression(impression).await,
    Record::Click(click) => store.append_click(click).await,
    Record::Search(query) => store.append_search(query).await,
  }
}
