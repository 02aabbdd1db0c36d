//! Waits for the backend clock to move past a submission, then collects the
//! receipts that carry its hash.
//!
//! The wait is bounded twice: by a tick delta and by a number of poll rounds.
//! Running out of rounds is a soft timeout, not a failure: receipts are fetched
//! either way and an empty result means "not observed yet".

use crate::{
    backend::ReceiptSource,
    error::{
        ConfirmError,
        DispatchError,
    },
    messages::{
        Receipt,
        ReceiptBatch,
        Submission,
        Tick,
    },
};
use std::time::Duration;
use tokio::{
    sync::watch,
    time,
};
use tracing::{
    debug,
    info,
    warn,
};

/// Anything that can report the backend's current tick.
pub trait TickSource: Send + Sync {
    fn read_tick(&self) -> impl Future<Output = Result<Tick, DispatchError>> + Send;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmPolicy {
    pub required_tick_delta: u64,
    pub max_poll_rounds: u32,
    pub poll_interval: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            required_tick_delta: 2,
            max_poll_rounds: 6,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// How the tick wait ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickWait {
    Reached { start: Tick, latest: Tick, rounds: u32 },
    /// Rounds ran out before the clock advanced far enough.
    Expired { start: Tick, latest: Tick, rounds: u32 },
}

impl TickWait {
    pub fn start(&self) -> Tick {
        match *self {
            TickWait::Reached { start, .. } | TickWait::Expired { start, .. } => start,
        }
    }

    pub fn latest(&self) -> Tick {
        match *self {
            TickWait::Reached { latest, .. } | TickWait::Expired { latest, .. } => latest,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Confirmation {
    pub submission: Submission,
    pub wait: TickWait,
    /// Tick window the receipt batch covered.
    pub start_tick: Tick,
    pub end_tick: Tick,
    /// Receipts for the submission's hash, in batch order.
    pub receipts: Vec<Receipt>,
}

impl Confirmation {
    pub fn is_observed(&self) -> bool {
        !self.receipts.is_empty()
    }

    pub fn soft_timed_out(&self) -> bool {
        matches!(self.wait, TickWait::Expired { .. })
    }

    pub fn succeeded(&self) -> bool {
        self.is_observed() && self.receipts.iter().all(Receipt::succeeded)
    }
}

pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cooperative cancellation for a confirmation in flight. Cloning shares the signal.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn cancelled(&self) {
        if let Some(rx) = &self.rx {
            let mut rx = rx.clone();
            if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                return;
            }
        }
        // handle dropped without cancelling
        std::future::pending::<()>().await
    }
}

pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

/// Receipts in `batch` whose hash matches, keeping batch order and duplicates.
pub fn correlate(batch: &ReceiptBatch, tx_hash: &str) -> Vec<Receipt> {
    batch
        .receipts
        .iter()
        .filter(|receipt| receipt.tx_hash == tx_hash)
        .cloned()
        .collect()
}

pub struct ConfirmationEngine<'a, T, R> {
    ticks: &'a T,
    receipts: &'a R,
}

impl<'a, T: TickSource, R: ReceiptSource> ConfirmationEngine<'a, T, R> {
    pub fn new(ticks: &'a T, receipts: &'a R) -> Self {
        Self { ticks, receipts }
    }

    /// Reads only; confirming the same submission twice sends no transaction.
    pub async fn confirm(
        &self,
        submission: &Submission,
        policy: &ConfirmPolicy,
        cancel: &CancelSignal,
    ) -> Result<Confirmation, ConfirmError> {
        let start = self.ticks.read_tick().await.map_err(|err| {
            warn!(?err, tx_hash = %submission.tx_hash, "cannot read starting tick");
            ConfirmError::Query(err)
        })?;
        debug!(
            tx_hash = %submission.tx_hash,
            start,
            required = policy.required_tick_delta,
            "waiting for ticks"
        );

        let wait = self.wait_for_ticks(start, policy, cancel).await?;
        if let TickWait::Expired { latest, rounds, .. } = wait {
            warn!(
                tx_hash = %submission.tx_hash,
                start,
                latest,
                rounds,
                "tick wait timed out; fetching receipts anyway"
            );
        }

        let batch = self
            .receipts
            .fetch_receipts(submission.tick)
            .await
            .inspect_err(|err| warn!(?err, tx_hash = %submission.tx_hash, "receipt fetch failed"))?;
        let receipts = correlate(&batch, &submission.tx_hash);
        info!(
            tx_hash = %submission.tx_hash,
            matched = receipts.len(),
            window_start = batch.start_tick,
            window_end = batch.end_tick,
            "confirmation finished"
        );

        Ok(Confirmation {
            submission: submission.clone(),
            wait,
            start_tick: batch.start_tick,
            end_tick: batch.end_tick,
            receipts,
        })
    }

    async fn wait_for_ticks(
        &self,
        start: Tick,
        policy: &ConfirmPolicy,
        cancel: &CancelSignal,
    ) -> Result<TickWait, ConfirmError> {
        if policy.required_tick_delta == 0 {
            return Ok(TickWait::Reached {
                start,
                latest: start,
                rounds: 0,
            });
        }

        let mut latest = start;
        for round in 1..=policy.max_poll_rounds {
            if cancel.is_cancelled() {
                return Err(ConfirmError::Cancelled);
            }
            tokio::select! {
                _ = time::sleep(policy.poll_interval) => {}
                _ = cancel.cancelled() => return Err(ConfirmError::Cancelled),
            }

            match self.ticks.read_tick().await {
                Ok(tick) => {
                    latest = latest.max(tick);
                    if tick.saturating_sub(start) >= policy.required_tick_delta {
                        return Ok(TickWait::Reached {
                            start,
                            latest: tick,
                            rounds: round,
                        });
                    }
                    debug!(round, start, tick, "tick not far enough yet");
                }
                // a failed read only costs this round
                Err(err) => warn!(?err, round, "tick read failed while waiting"),
            }
        }

        Ok(TickWait::Expired {
            start,
            latest,
            rounds: policy.max_poll_rounds,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::{
        FakeReceiptSource,
        ScriptedTicks,
        receipt,
    };
    use proptest::prelude::*;

    fn batch(start: Tick, end: Tick, receipts: Vec<Receipt>) -> ReceiptBatch {
        ReceiptBatch {
            start_tick: start,
            end_tick: end,
            receipts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn confirm__ticks_advance__returns_matching_receipts_only() {
        // given
        let ticks = ScriptedTicks::new([Some(10), Some(11), Some(12)]);
        let receipts =
            FakeReceiptSource::new(batch(10, 12, vec![receipt("X", 11), receipt("Y", 11)]));
        let engine = ConfirmationEngine::new(&ticks, &receipts);
        let submission = Submission::new("X", 10);

        // when
        let confirmation = engine
            .confirm(&submission, &ConfirmPolicy::default(), &CancelSignal::never())
            .await
            .unwrap();

        // then
        assert_eq!(confirmation.receipts, vec![receipt("X", 11)]);
        assert_eq!(
            confirmation.wait,
            TickWait::Reached {
                start: 10,
                latest: 12,
                rounds: 2
            }
        );
        assert!(confirmation.succeeded());
        assert_eq!(receipts.requests(), vec![10]);
    }

    #[tokio::test(start_paused = true)]
    async fn confirm__hash_not_in_window__is_empty_not_error() {
        // given
        let ticks = ScriptedTicks::new([Some(10), Some(12)]);
        let receipts = FakeReceiptSource::new(batch(10, 12, vec![receipt("Y", 11)]));
        let engine = ConfirmationEngine::new(&ticks, &receipts);

        // when
        let confirmation = engine
            .confirm(
                &Submission::new("X", 10),
                &ConfirmPolicy::default(),
                &CancelSignal::never(),
            )
            .await
            .unwrap();

        // then
        assert!(confirmation.receipts.is_empty());
        assert!(!confirmation.is_observed());
        assert!(!confirmation.succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn confirm__starting_tick_unavailable__fails_without_fetching() {
        // given
        let ticks = ScriptedTicks::new([None]);
        let receipts = FakeReceiptSource::new(batch(10, 12, vec![receipt("X", 11)]));
        let engine = ConfirmationEngine::new(&ticks, &receipts);

        // when
        let result = engine
            .confirm(
                &Submission::new("X", 10),
                &ConfirmPolicy::default(),
                &CancelSignal::never(),
            )
            .await;

        // then
        assert!(matches!(result, Err(ConfirmError::Query(_))));
        assert!(receipts.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn confirm__clock_stalls__soft_times_out_and_fetches_once() {
        // given
        let ticks = ScriptedTicks::new([Some(10)]);
        let receipts = FakeReceiptSource::new(batch(10, 10, vec![]));
        let engine = ConfirmationEngine::new(&ticks, &receipts);
        let policy = ConfirmPolicy {
            max_poll_rounds: 3,
            ..ConfirmPolicy::default()
        };
        let started = time::Instant::now();

        // when
        let confirmation = engine
            .confirm(&Submission::new("X", 10), &policy, &CancelSignal::never())
            .await
            .unwrap();

        // then
        assert!(confirmation.soft_timed_out());
        assert_eq!(
            confirmation.wait,
            TickWait::Expired {
                start: 10,
                latest: 10,
                rounds: 3
            }
        );
        assert_eq!(ticks.reads(), 4);
        assert_eq!(receipts.requests(), vec![10]);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[test]
    fn tick_wait__start_and_latest__read_either_outcome() {
        let reached = TickWait::Reached {
            start: 10,
            latest: 12,
            rounds: 2,
        };
        let expired = TickWait::Expired {
            start: 7,
            latest: 8,
            rounds: 6,
        };
        assert_eq!((reached.start(), reached.latest()), (10, 12));
        assert_eq!((expired.start(), expired.latest()), (7, 8));
    }

    #[tokio::test(start_paused = true)]
    async fn confirm__transient_tick_failure__consumes_round_and_continues() {
        // given
        let ticks = ScriptedTicks::new([Some(10), None, Some(12)]);
        let receipts = FakeReceiptSource::new(batch(10, 12, vec![receipt("X", 11)]));
        let engine = ConfirmationEngine::new(&ticks, &receipts);

        // when
        let confirmation = engine
            .confirm(
                &Submission::new("X", 10),
                &ConfirmPolicy::default(),
                &CancelSignal::never(),
            )
            .await
            .unwrap();

        // then
        assert_eq!(
            confirmation.wait,
            TickWait::Reached {
                start: 10,
                latest: 12,
                rounds: 2
            }
        );
        assert_eq!(confirmation.receipts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn confirm__receipt_fetch_fails__is_fetch_error() {
        // given
        let ticks = ScriptedTicks::new([Some(10), Some(12)]);
        let receipts = FakeReceiptSource::failing(503);
        let engine = ConfirmationEngine::new(&ticks, &receipts);

        // when
        let result = engine
            .confirm(
                &Submission::new("X", 10),
                &ConfirmPolicy::default(),
                &CancelSignal::never(),
            )
            .await;

        // then
        assert!(matches!(result, Err(ConfirmError::Fetch(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn confirm__same_submission_twice__gives_same_receipts() {
        // given
        let ticks = ScriptedTicks::new([Some(10), Some(12)]);
        let receipts = FakeReceiptSource::new(batch(10, 12, vec![receipt("X", 11)]));
        let engine = ConfirmationEngine::new(&ticks, &receipts);
        let submission = Submission::new("X", 10);
        let policy = ConfirmPolicy::default();

        // when
        let first = engine
            .confirm(&submission, &policy, &CancelSignal::never())
            .await
            .unwrap();
        let second = engine
            .confirm(&submission, &policy, &CancelSignal::never())
            .await
            .unwrap();

        // then
        assert_eq!(first.receipts, second.receipts);
        assert_eq!(receipts.requests(), vec![10, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn confirm__cancelled_before_start__does_not_fetch() {
        // given
        let ticks = ScriptedTicks::new([Some(10)]);
        let receipts = FakeReceiptSource::new(batch(10, 10, vec![]));
        let engine = ConfirmationEngine::new(&ticks, &receipts);
        let (handle, signal) = cancellation();
        handle.cancel();

        // when
        let result = engine
            .confirm(&Submission::new("X", 10), &ConfirmPolicy::default(), &signal)
            .await;

        // then
        assert!(matches!(result, Err(ConfirmError::Cancelled)));
        assert!(receipts.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn confirm__cancelled_mid_wait__stops_polling() {
        // given
        let ticks = ScriptedTicks::new([Some(10)]);
        let receipts = FakeReceiptSource::new(batch(10, 10, vec![]));
        let engine = ConfirmationEngine::new(&ticks, &receipts);
        let (handle, signal) = cancellation();
        let policy = ConfirmPolicy::default();
        let submission = Submission::new("X", 10);

        // when
        let (result, ()) = tokio::join!(engine.confirm(&submission, &policy, &signal), async {
            time::sleep(Duration::from_millis(1_500)).await;
            handle.cancel();
        });

        // then
        assert!(matches!(result, Err(ConfirmError::Cancelled)));
        assert_eq!(ticks.reads(), 2);
        assert!(receipts.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn confirm__zero_delta__fetches_without_polling() {
        // given
        let ticks = ScriptedTicks::new([Some(10)]);
        let receipts = FakeReceiptSource::new(batch(10, 10, vec![receipt("X", 10)]));
        let engine = ConfirmationEngine::new(&ticks, &receipts);
        let policy = ConfirmPolicy {
            required_tick_delta: 0,
            ..ConfirmPolicy::default()
        };

        // when
        let confirmation = engine
            .confirm(&Submission::new("X", 10), &policy, &CancelSignal::never())
            .await
            .unwrap();

        // then
        assert_eq!(ticks.reads(), 1);
        assert!(confirmation.is_observed());
    }

    #[test]
    fn correlate__keeps_batch_order_and_duplicates() {
        // given
        let batch = batch(
            0,
            5,
            vec![
                receipt("A", 1),
                receipt("B", 2),
                receipt("C", 3),
                receipt("B", 4),
            ],
        );

        // when
        let matched = correlate(&batch, "B");

        // then
        assert_eq!(matched, vec![receipt("B", 2), receipt("B", 4)]);
    }

    proptest! {
        #[test]
        fn correlate__returns_exactly_the_matching_subsequence(
            hashes in proptest::collection::vec(proptest::sample::select(vec!["A", "B", "C"]), 0..32),
            wanted in proptest::sample::select(vec!["A", "B", "D"]),
        ) {
            let receipts: Vec<Receipt> = hashes
                .iter()
                .enumerate()
                .map(|(tick, hash)| receipt(hash, tick as Tick))
                .collect();
            let batch = batch(0, receipts.len() as Tick, receipts.clone());

            let matched = correlate(&batch, wanted);

            let expected: Vec<Receipt> =
                receipts.into_iter().filter(|r| r.tx_hash == wanted).collect();
            prop_assert_eq!(matched, expected);
        }
    }
}
