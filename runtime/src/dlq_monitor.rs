//! Dead-letter queue monitoring: threshold alerts and periodic reports.

use std::sync::Arc;
use storefront_core::error::Result;
use storefront_core::store::OutboxStore;

/// Default unresolved-row count that triggers an alert.
pub const DEFAULT_ALERT_THRESHOLD: i64 = 10;

/// How many DLQ rows a report inspects at most.
const REPORT_SCAN_LIMIT: usize = 500;

/// Pluggable alert sink for DLQ threshold breaches.
pub trait AlertChannel: Send + Sync {
    /// Deliver an alert message.
    fn alert(&self, message: &str);
}

/// Default alert channel: structured error log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertChannel;

impl AlertChannel for LogAlertChannel {
    fn alert(&self, message: &str) {
        tracing::error!(message, "DLQ alert");
    }
}

/// Watches the DLQ: counts unresolved rows every minute and emits a
/// grouped textual report every ten minutes (driven by the worker
/// scheduler; this type only implements the two checks).
pub struct DlqMonitor<S> {
    store: Arc<S>,
    channel: Arc<dyn AlertChannel>,
    threshold: i64,
}

impl<S> DlqMonitor<S>
where
    S: OutboxStore,
{
    /// Create a monitor with the default threshold.
    #[must_use]
    pub fn new(store: Arc<S>, channel: Arc<dyn AlertChannel>) -> Self {
        Self {
            store,
            channel,
            threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }

    /// Override the alert threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: i64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Count unresolved DLQ rows and alert when the threshold is reached.
    /// Returns the count.
    ///
    /// # Errors
    ///
    /// Returns store errors from the count query.
    pub async fn check(&self) -> Result<i64> {
        let count = self.store.count_unresolved_dlq().await?;
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("outbox.dlq.unresolved").set(count as f64);

        if count >= self.threshold {
            self.channel.alert(&format!(
                "dead letter queue has {count} unresolved events (threshold {})",
                self.threshold
            ));
        }
        Ok(count)
    }

    /// Build the periodic textual report: per-event-type counts plus the
    /// oldest unresolved entry.
    ///
    /// # Errors
    ///
    /// Returns store errors from the listing query.
    pub async fn report(&self) -> Result<String> {
        let rows = self.store.list_unresolved_dlq(REPORT_SCAN_LIMIT).await?;
        if rows.is_empty() {
            let report = "dead letter queue: empty".to_string();
            tracing::info!(report = report.as_str(), "DLQ report");
            return Ok(report);
        }

        let mut by_type: Vec<(String, usize)> = Vec::new();
        for row in &rows {
            match by_type.iter_mut().find(|(t, _)| *t == row.event_type) {
                Some((_, n)) => *n += 1,
                None => by_type.push((row.event_type.clone(), 1)),
            }
        }
        by_type.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        // Rows come back oldest first.
        let oldest = &rows[0];
        let mut report = format!("dead letter queue: {} unresolved", rows.len());
        for (event_type, count) in &by_type {
            report.push_str(&format!("\n  {event_type}: {count}"));
        }
        report.push_str(&format!(
            "\n  oldest: event {} ({}) failed at {}",
            oldest.original_event_id, oldest.event_type, oldest.failed_at
        ));

        tracing::info!(report = report.as_str(), "DLQ report");
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChannel {
        messages: Mutex<Vec<String>>,
    }

    impl AlertChannel for RecordingChannel {
        fn alert(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn log_channel_is_constructible() {
        // Smoke test: the default channel only logs.
        LogAlertChannel.alert("something is wrong");
    }

    #[test]
    fn recording_channel_captures() {
        let channel = RecordingChannel::default();
        channel.alert("first");
        assert_eq!(channel.messages.lock().unwrap().len(), 1);
    }
}
