use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::fetcher::PageFetch;
use crate::notifier::{EmailNotifier, Notify};
use crate::tracker::{Tracker, TrackerHandle, TrackingConfig};
use crate::{AppError, Result};

/// One tracking request as the caller supplies it: six raw text fields.
/// Numeric fields stay text until the registry validates them.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTrackerInput {
    pub url: String,
    pub sender: String,
    pub recipient: String,
    pub password: String,
    pub threshold: String,
    pub interval_secs: String,
}

/// TOML watchlist with one `[[alert]]` table per tracked item.
#[derive(Debug, Clone, Deserialize)]
pub struct Watchlist {
    #[serde(rename = "alert", default)]
    pub alerts: Vec<RawTrackerInput>,
}

impl Watchlist {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let watchlist = toml::from_str(&raw)?;
        Ok(watchlist)
    }
}

/// Accepts tracking requests, validates them, and owns the handles of the
/// trackers it spawns. Trackers share nothing with each other; the registry
/// never blocks on a tracker's cycle.
pub struct TrackerRegistry {
    fetcher: Arc<dyn PageFetch>,
    smtp: SmtpConfig,
    handles: Vec<TrackerHandle>,
}

impl TrackerRegistry {
    pub fn new(fetcher: Arc<dyn PageFetch>, smtp: SmtpConfig) -> Self {
        TrackerRegistry {
            fetcher,
            smtp,
            handles: Vec::new(),
        }
    }

    /// Validate `input`, spawn a tracker for it, and return the new
    /// tracker's id. On validation failure no tracker is created.
    pub fn add_tracker(&mut self, input: RawTrackerInput) -> Result<Uuid> {
        let notifier = Arc::new(EmailNotifier::new(
            self.smtp.clone(),
            input.sender.clone(),
            input.password.clone(),
            input.recipient.clone(),
        ));
        self.add_tracker_with_notifier(input, notifier)
    }

    /// Same as `add_tracker` but with an injected notifier.
    pub fn add_tracker_with_notifier(
        &mut self,
        input: RawTrackerInput,
        notifier: Arc<dyn Notify>,
    ) -> Result<Uuid> {
        let config = Self::validate(input)?;
        let interval = config.interval;
        let threshold = config.threshold;

        let tracker = Tracker::new(config, Arc::clone(&self.fetcher), notifier);
        let handle = tracker.spawn();
        let id = handle.id();

        tracing::info!(
            "Tracking {} every {}s (threshold {})",
            handle.url(),
            interval.as_secs(),
            threshold
        );

        self.handles.push(handle);
        Ok(id)
    }

    fn validate(input: RawTrackerInput) -> Result<TrackingConfig> {
        Url::parse(input.url.trim())
            .map_err(|e| AppError::Validation(format!("invalid product URL: {}", e)))?;

        let threshold: Decimal = input.threshold.trim().parse().map_err(|_| {
            AppError::Validation(format!(
                "threshold must be a decimal number, got {:?}",
                input.threshold
            ))
        })?;
        if threshold < Decimal::ZERO {
            return Err(AppError::Validation(
                "threshold must not be negative".to_string(),
            ));
        }

        let interval_secs: u64 = input.interval_secs.trim().parse().map_err(|_| {
            AppError::Validation(format!(
                "interval must be a whole number of seconds, got {:?}",
                input.interval_secs
            ))
        })?;
        if interval_secs == 0 {
            return Err(AppError::Validation(
                "interval must be greater than 0".to_string(),
            ));
        }

        Ok(TrackingConfig {
            url: input.url.trim().to_string(),
            sender: input.sender,
            password: input.password,
            recipient: input.recipient,
            threshold,
            interval: Duration::from_secs(interval_secs),
        })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every tracker to stop and wait for their loops to wind down.
    pub async fn shutdown(&mut self) {
        let handles: Vec<TrackerHandle> = self.handles.drain(..).collect();
        for handle in &handles {
            handle.stop();
        }
        join_all(handles.into_iter().map(TrackerHandle::stopped)).await;
    }
}
