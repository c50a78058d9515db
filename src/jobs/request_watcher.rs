//! Background job: notify the admin about newly created requests.
//!
//! Each cycle:
//! 1. Fetches rows with `created_at` after the watermark, oldest first.
//! 2. Sends one admin alert per row, in order.
//! 3. Moves the watermark to each row's `created_at` as soon as its alert
//!    is accepted, and marks the row `notified`. The first failed alert ends
//!    the batch; it and everything after it are picked up again by the next
//!    cycle, unless they share the watermark's timestamp.
//!
//! The watermark lives only in memory. A restart starts `lookback` in the
//! past, so alerts sent in that window can be repeated.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::models::request::Request;
use crate::notification::AdminNotifier;
use crate::store::{RequestSource, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherSettings {
    /// Sleep between cycles.
    pub check_interval: Duration,
    /// Sleep after a cycle fails unexpectedly.
    pub error_backoff: Duration,
    /// How far back the first poll looks.
    pub lookback: Duration,
    pub store_timeout: Duration,
    pub notify_timeout: Duration,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            error_backoff: Duration::from_secs(30),
            lookback: Duration::from_secs(60),
            store_timeout: Duration::from_secs(10),
            notify_timeout: Duration::from_secs(15),
        }
    }
}

/// Every row at or before this instant has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp)
    }

    /// `now - lookback`, saturating to `now` if the lookback is out of range.
    pub fn starting_at(now: DateTime<Utc>, lookback: Duration) -> Self {
        let start = chrono::Duration::from_std(lookback)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(now);
        Self(start)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// What a single poll cycle did.
#[derive(Debug)]
pub enum PollOutcome {
    /// Nothing newer than the watermark.
    Idle,
    /// The store could not be read. Handled like `Idle` by the loop.
    FetchFailed(StoreError),
    /// `sent` alerts went out; `deferred` rows wait for the next cycle.
    /// `skipped` rows failed with the same `created_at` as the last alert
    /// sent, so `created_at > watermark` will never return them again.
    Dispatched {
        sent: usize,
        deferred: usize,
        skipped: usize,
    },
}

/// A cycle failure outside the per-row notify path.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("request {id} at {created_at} is not after {previous}")]
    OutOfOrder {
        id: i64,
        created_at: DateTime<Utc>,
        previous: DateTime<Utc>,
    },

    #[error("poll cycle panicked: {0}")]
    Panicked(String),
}

pub struct RequestWatcher {
    source: Arc<dyn RequestSource>,
    notifier: AdminNotifier,
    settings: WatcherSettings,
}

impl RequestWatcher {
    pub fn new(
        source: Arc<dyn RequestSource>,
        notifier: AdminNotifier,
        settings: WatcherSettings,
    ) -> Self {
        Self {
            source,
            notifier,
            settings,
        }
    }

    pub fn initial_watermark(&self) -> Watermark {
        Watermark::starting_at(Utc::now(), self.settings.lookback)
    }

    /// Read the batch after `watermark`, bounded by the store timeout.
    pub async fn fetch(&self, watermark: Watermark) -> Result<Vec<Request>, StoreError> {
        self.with_store_timeout(self.source.fetch_since(watermark.timestamp()))
            .await
    }

    async fn with_store_timeout<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.settings.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.settings.store_timeout)),
        }
    }

    /// Status bookkeeping only; the watermark has already moved.
    async fn record_notified(&self, request_id: i64) {
        if let Err(e) = self
            .with_store_timeout(self.source.mark_notified(request_id))
            .await
        {
            warn!(request_id, error = %e, "failed to mark request as notified");
        }
    }

    /// Notify each row in order, advancing `watermark` after every accepted
    /// alert. Stops at the first failure.
    ///
    /// The batch is checked before anything is sent: a row that is not after
    /// the watermark, or older than the row before it, fails the whole cycle.
    pub async fn dispatch(
        &self,
        batch: &[Request],
        watermark: &mut Watermark,
    ) -> Result<PollOutcome, CycleError> {
        check_batch_order(batch, *watermark)?;

        for (idx, request) in batch.iter().enumerate() {
            if self.notifier.notify(request).await {
                metrics::NOTIFICATIONS.with_label_values(&["sent"]).inc();
                *watermark = Watermark::at(request.created_at);
                self.record_notified(request.id).await;
                continue;
            }

            metrics::NOTIFICATIONS.with_label_values(&["failed"]).inc();
            let rest = &batch[idx..];
            let mark = watermark.timestamp();
            let skipped = rest.iter().take_while(|r| r.created_at == mark).count();
            let deferred = rest.len() - skipped;

            if skipped > 0 {
                metrics::NOTIFICATIONS
                    .with_label_values(&["skipped"])
                    .inc_by(skipped as u64);
                warn!(
                    request_id = request.id,
                    created_at = %request.created_at,
                    skipped,
                    deferred,
                    "notification failed, request shares its created_at with the last alert sent and will be skipped"
                );
            } else {
                warn!(
                    request_id = request.id,
                    deferred,
                    "notification failed, will retry next cycle"
                );
            }
            return Ok(PollOutcome::Dispatched {
                sent: idx,
                deferred,
                skipped,
            });
        }

        Ok(PollOutcome::Dispatched {
            sent: batch.len(),
            deferred: 0,
            skipped: 0,
        })
    }

    /// One fetch + dispatch cycle. Timer-free, so tests can drive it directly.
    pub async fn poll_once(&self, watermark: &mut Watermark) -> Result<PollOutcome, CycleError> {
        debug!(watermark = %watermark, "checking for new requests");

        let batch = match self.fetch(*watermark).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(kind = e.kind(), error = %e, "failed to fetch new requests");
                metrics::POLL_ERRORS.with_label_values(&[e.kind()]).inc();
                return Ok(PollOutcome::FetchFailed(e));
            }
        };

        if batch.is_empty() {
            debug!("no new requests found");
            return Ok(PollOutcome::Idle);
        }

        for request in &batch {
            debug!(
                request_id = request.id,
                room = %request.room_number,
                created_at = %request.created_at,
                "request found"
            );
        }
        info!(count = batch.len(), "processing {} new request(s)", batch.len());

        self.dispatch(&batch, watermark).await
    }

    /// `poll_once` with panics turned into `CycleError::Panicked`.
    /// Progress made before a panic is kept in `watermark`.
    async fn guarded_poll(&self, watermark: &mut Watermark) -> Result<PollOutcome, CycleError> {
        match AssertUnwindSafe(self.poll_once(watermark)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(CycleError::Panicked(panic_message(&*panic))),
        }
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    /// Returns the final watermark.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Watermark {
        let mut watermark = self.initial_watermark();
        info!(
            watermark = %watermark,
            check_interval_secs = self.settings.check_interval.as_secs(),
            "starting request watcher"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.guarded_poll(&mut watermark).await {
                Ok(_) => self.settings.check_interval,
                Err(e) => {
                    error!(
                        error = %e,
                        backoff_secs = self.settings.error_backoff.as_secs(),
                        "unexpected error in request watcher"
                    );
                    metrics::POLL_ERRORS.with_label_values(&["unexpected"]).inc();
                    self.settings.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(watermark = %watermark, "request watcher stopped");
        watermark
    }
}

fn check_batch_order(batch: &[Request], watermark: Watermark) -> Result<(), CycleError> {
    let mut previous = watermark.timestamp();
    let mut first = true;
    for request in batch {
        let in_order = if first {
            request.created_at > previous
        } else {
            request.created_at >= previous
        };
        if !in_order {
            return Err(CycleError::OutOfOrder {
                id: request.id,
                created_at: request.created_at,
                previous,
            });
        }
        previous = request.created_at;
        first = false;
    }
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
