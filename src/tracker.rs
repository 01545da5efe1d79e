use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::extractor::PriceExtractor;
use crate::fetcher::PageFetch;
use crate::notifier::{NotificationMessage, Notify};

/// One tracked item's immutable configuration. Invariants (threshold >= 0,
/// interval > 0) are enforced by the registry before construction.
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    pub url: String,
    pub sender: String,
    pub password: String,
    pub recipient: String,
    pub threshold: Decimal,
    pub interval: Duration,
}

/// What a single poll cycle did. Failures here are recoverable by design:
/// the loop skips the cycle's notification and keeps its schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    FetchFailed,
    ExtractFailed,
    ThresholdNotMet,
    NotificationSent,
    NotificationFailed,
}

/// Drives the repeating fetch -> extract -> compare -> notify cycle for
/// one item.
pub struct Tracker {
    config: TrackingConfig,
    fetcher: Arc<dyn PageFetch>,
    extractor: PriceExtractor,
    notifier: Arc<dyn Notify>,
}

/// Control handle for a running tracker: identity plus a cooperative stop
/// signal, observed at the top of each cycle and during the interval wait.
pub struct TrackerHandle {
    id: Uuid,
    url: String,
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl TrackerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request the tracker to stop. The loop exits at the next stop check
    /// rather than mid-cycle.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Stop and wait for the loop to wind down.
    pub async fn stopped(self) {
        self.stop();
        let _ = self.join.await;
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Tracker {
    pub fn new(
        config: TrackingConfig,
        fetcher: Arc<dyn PageFetch>,
        notifier: Arc<dyn Notify>,
    ) -> Self {
        Tracker {
            config,
            fetcher,
            extractor: PriceExtractor::new(),
            notifier,
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Run one fetch -> extract -> compare -> notify pass. Never fails the
    /// caller; every error is logged and reported in the outcome.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let page = match self.fetcher.fetch(&self.config.url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}", self.config.url, e);
                return CycleOutcome::FetchFailed;
            }
        };

        let listing = match self.extractor.extract(&page) {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!("Failed to extract listing from {}: {}", self.config.url, e);
                return CycleOutcome::ExtractFailed;
            }
        };

        // Strict inequality: a price equal to the threshold never triggers
        if listing.price >= self.config.threshold {
            return CycleOutcome::ThresholdNotMet;
        }

        let message =
            NotificationMessage::price_drop(&listing, self.config.threshold, &self.config.url);
        match self.notifier.notify(&message).await {
            Ok(()) => {
                tracing::info!(
                    "Sent price drop alert for {:?} at {} (threshold {})",
                    listing.title,
                    listing.price,
                    self.config.threshold
                );
                CycleOutcome::NotificationSent
            }
            Err(e) => {
                tracing::warn!("Failed to send alert for {:?}: {}", listing.title, e);
                CycleOutcome::NotificationFailed
            }
        }
    }

    /// Start the polling loop as an independent task and hand back its
    /// control handle.
    pub fn spawn(self) -> TrackerHandle {
        let id = Uuid::new_v4();
        let url = self.config.url.clone();
        let interval = self.config.interval;
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            tracing::debug!("Tracker {} started for {}", id, self.config.url);
            loop {
                if *stop_rx.borrow() {
                    break;
                }

                self.run_cycle().await;

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = stop_rx.changed() => {
                        // A closed channel means the handle is gone; stop
                        // rather than spin without an owner.
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Tracker {} stopped", id);
        });

        TrackerHandle {
            id,
            url,
            stop: stop_tx,
            join,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppError, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn product_page(title: &str, whole: &str, fraction: &str) -> String {
        format!(
            r#"<html><body>
                <span id="productTitle">{}</span>
                <span class="a-price-whole">{}</span>
                <span class="a-price-fraction">{}</span>
            </body></html>"#,
            title, whole, fraction
        )
    }

    /// Replays a fixed sequence of pages, then repeats the last entry.
    struct ScriptedFetcher {
        pages: Mutex<VecDeque<std::result::Result<String, ()>>>,
        last: Mutex<std::result::Result<String, ()>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(pages: Vec<std::result::Result<String, ()>>) -> Self {
            let last = pages.last().cloned().unwrap_or(Err(()));
            ScriptedFetcher {
                pages: Mutex::new(pages.into()),
                last: Mutex::new(last),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetch for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.last.lock().unwrap().clone());
            next.map_err(|_| AppError::Validation(format!("scripted fetch failure for {}", url)))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<NotificationMessage>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            RecordingNotifier {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Notify for RecordingNotifier {
        async fn notify(&self, message: &NotificationMessage) -> Result<()> {
            if self.fail {
                return Err(AppError::Validation("scripted notify failure".to_string()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn test_config(threshold: Decimal, interval: Duration) -> TrackingConfig {
        TrackingConfig {
            url: "https://example.com/item".to_string(),
            sender: "sender@example.com".to_string(),
            password: "app-password".to_string(),
            recipient: "recipient@example.com".to_string(),
            threshold,
            interval,
        }
    }

    fn tracker_with(
        threshold: &str,
        fetcher: Arc<ScriptedFetcher>,
        notifier: Arc<RecordingNotifier>,
    ) -> Tracker {
        Tracker::new(
            test_config(threshold.parse().unwrap(), Duration::from_secs(5)),
            fetcher,
            notifier,
        )
    }

    #[tokio::test]
    async fn test_cycle_notifies_below_threshold() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(product_page(
            "Widget", "49", "99",
        ))]));
        let notifier = Arc::new(RecordingNotifier::default());
        let tracker = tracker_with("50.00", fetcher, Arc::clone(&notifier));

        let outcome = tracker.run_cycle().await;
        assert_eq!(outcome, CycleOutcome::NotificationSent);
        assert_eq!(notifier.sent_count(), 1);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "Price Drop Alert");
        assert!(sent[0].html_body.contains("Widget"));
    }

    #[tokio::test]
    async fn test_cycle_silent_at_threshold() {
        // price == threshold must not trigger
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(product_page(
            "Widget", "50", "00",
        ))]));
        let notifier = Arc::new(RecordingNotifier::default());
        let tracker = tracker_with("50.00", fetcher, Arc::clone(&notifier));

        let outcome = tracker.run_cycle().await;
        assert_eq!(outcome, CycleOutcome::ThresholdNotMet);
        assert_eq!(notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_cycle_silent_above_threshold() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(product_page(
            "Widget", "50", "01",
        ))]));
        let notifier = Arc::new(RecordingNotifier::default());
        let tracker = tracker_with("50.00", fetcher, Arc::clone(&notifier));

        let outcome = tracker.run_cycle().await;
        assert_eq!(outcome, CycleOutcome::ThresholdNotMet);
        assert_eq!(notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_cycle_reports_fetch_failure() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Err(())]));
        let notifier = Arc::new(RecordingNotifier::default());
        let tracker = tracker_with("50.00", fetcher, Arc::clone(&notifier));

        let outcome = tracker.run_cycle().await;
        assert_eq!(outcome, CycleOutcome::FetchFailed);
        assert_eq!(notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_cycle_reports_extract_failure() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(
            "<html><body>no product here</body></html>".to_string(),
        )]));
        let notifier = Arc::new(RecordingNotifier::default());
        let tracker = tracker_with("50.00", fetcher, Arc::clone(&notifier));

        let outcome = tracker.run_cycle().await;
        assert_eq!(outcome, CycleOutcome::ExtractFailed);
        assert_eq!(notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_cycle_skips_oversized_price_without_notifying() {
        // A page whose digits overflow the cents representation must read
        // as a failed extraction, never as a (wrapped) below-threshold price
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(product_page(
            "Widget",
            "99999999999999999",
            "99",
        ))]));
        let notifier = Arc::new(RecordingNotifier::default());
        let tracker = tracker_with("50.00", fetcher, Arc::clone(&notifier));

        let outcome = tracker.run_cycle().await;
        assert_eq!(outcome, CycleOutcome::ExtractFailed);
        assert_eq!(notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_cycle_reports_notify_failure() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(product_page(
            "Widget", "49", "99",
        ))]));
        let notifier = Arc::new(RecordingNotifier::failing());
        let tracker = tracker_with("50.00", fetcher, notifier);

        let outcome = tracker.run_cycle().await;
        assert_eq!(outcome, CycleOutcome::NotificationFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_failed_cycles() {
        // First poll fails to fetch, second parses nothing, third succeeds;
        // the schedule must carry through all of them
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Err(()),
            Ok("<html><body>layout changed</body></html>".to_string()),
            Ok(product_page("Widget", "49", "99")),
        ]));
        let notifier = Arc::new(RecordingNotifier::default());
        let tracker = tracker_with("50.00", Arc::clone(&fetcher), Arc::clone(&notifier));

        let handle = tracker.spawn();

        // Paused clock: sleeps auto-advance, so several intervals elapse
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(fetcher.calls() >= 3);
        assert!(notifier.sent_count() >= 1);

        handle.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_trackers_schedule_independently() {
        let fast_fetcher = Arc::new(ScriptedFetcher::new(vec![Err(())]));
        let slow_fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(product_page(
            "Widget", "49", "99",
        ))]));
        let fast_notifier = Arc::new(RecordingNotifier::default());
        let slow_notifier = Arc::new(RecordingNotifier::default());

        let fast = Tracker::new(
            test_config("50.00".parse().unwrap(), Duration::from_secs(5)),
            Arc::clone(&fast_fetcher) as Arc<dyn PageFetch>,
            Arc::clone(&fast_notifier) as Arc<dyn Notify>,
        )
        .spawn();
        let slow = Tracker::new(
            test_config("50.00".parse().unwrap(), Duration::from_secs(30)),
            Arc::clone(&slow_fetcher) as Arc<dyn PageFetch>,
            Arc::clone(&slow_notifier) as Arc<dyn Notify>,
        )
        .spawn();

        tokio::time::sleep(Duration::from_secs(61)).await;

        // The 5s tracker polls far more often than the 30s one, and the
        // fast tracker's constant fetch failures never slow the other down
        assert!(fast_fetcher.calls() > slow_fetcher.calls());
        assert!(slow_fetcher.calls() >= 2);
        assert_eq!(fast_notifier.sent_count(), 0);
        assert!(slow_notifier.sent_count() >= 2);

        fast.stopped().await;
        slow.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_signal_ends_loop() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Err(())]));
        let notifier = Arc::new(RecordingNotifier::default());
        let tracker = tracker_with("50.00", Arc::clone(&fetcher), notifier);

        let handle = tracker.spawn();
        tokio::time::sleep(Duration::from_secs(12)).await;

        handle.stop();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.is_finished());

        let polls_at_stop = fetcher.calls();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fetcher.calls(), polls_at_stop);
    }
}
