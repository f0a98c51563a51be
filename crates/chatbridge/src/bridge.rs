//! Orchestration of one full send-and-capture round trip.
//!
//! The bridge owns the platform driver, sequences focus / new conversation /
//! send, then hands the driver to the poller. The whole run sits under an
//! independent hard wall-clock guard: accessibility calls can block
//! indefinitely, and the caller must observe a failure instead of waiting
//! forever.

use crate::errors::BridgeError;
use crate::locator::ConversationLocator;
use crate::poller::{ConversationSource, PollConfig, ResponsePoller};
use crate::reader::ReaderConfig;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Platform surface the bridge drives. All methods are best-effort wrappers
/// around OS automation; reading happens through the inherited
/// [`ConversationSource`]. Every method is synchronous and may block on OS
/// calls; the bridge runs them on the blocking pool, never on its own task.
pub trait DesktopDriver: ConversationSource + Send + 'static {
    /// Fail fast if the target application has no visible process.
    fn ensure_running(&mut self) -> Result<(), BridgeError>;
    /// Bring the target application to the foreground.
    fn focus(&mut self) -> Result<(), BridgeError>;
    /// Open a fresh conversation thread.
    fn new_conversation(&mut self) -> Result<(), BridgeError>;
    /// Deliver the message text and submit it.
    fn send_message(&mut self, message: &str) -> Result<(), BridgeError>;
}

/// Everything configurable about one bridge instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Process/application name of the automation target.
    pub app_name: String,
    pub poll: PollConfig,
    pub reader: ReaderConfig,
    pub locator: ConversationLocator,
    /// Slack added on top of `poll.max_wait` for the hard wall-clock guard.
    pub hard_timeout_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            app_name: "ChatGPT".to_string(),
            poll: PollConfig::default(),
            reader: ReaderConfig::default(),
            locator: ConversationLocator::default(),
            hard_timeout_grace: Duration::from_millis(10_000),
        }
    }
}

/// Timing breakdown of one query, camelCase on the wire.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub ui_reads: u32,
    pub total_read_time: u64,
    pub focus_time: u64,
    pub paste_time: u64,
    pub waiting_time: u64,
}

/// Final, JSON-serializable answer of one `query()` call.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    pub success: bool,
    /// Truncated echo of the sent message, for log correlation.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whole-run wall time in seconds.
    pub elapsed: u64,
    pub metrics: Metrics,
}

/// Orchestrator for a single conversation exchange with the target app.
///
/// The driver is held in an `Option`: a call abandoned by the hard deadline
/// leaves its thread parked with the driver inside, so the bridge records
/// the loss instead of reusing a driver in an unknown state.
pub struct ChatBridge<D: DesktopDriver> {
    driver: Option<D>,
    config: BridgeConfig,
}

impl<D: DesktopDriver> ChatBridge<D> {
    pub fn new(driver: D, config: BridgeConfig) -> Self {
        Self {
            driver: Some(driver),
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Send `message` and capture the assistant's response.
    ///
    /// A response that never stabilizes resolves to a soft-fail
    /// [`QueryOutcome`]; only a conversation mismatch, a platform failure
    /// or the hard deadline produce an `Err`. The deadline preempts even a
    /// driver call that never returns, because every driver call runs on
    /// the blocking pool while this task waits at an await point.
    pub async fn query(
        &mut self,
        message: &str,
        new_conversation: bool,
    ) -> Result<QueryOutcome, BridgeError> {
        let deadline = self.config.poll.max_wait + self.config.hard_timeout_grace;
        match tokio::time::timeout(deadline, self.run(message, new_conversation)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::HardTimeout(deadline)),
        }
    }

    /// Run one driver method on the blocking pool, handing the driver back
    /// afterwards. If the future is cancelled mid-call the driver stays on
    /// the parked thread and `self.driver` remains `None`.
    async fn driver_call<T, F>(&mut self, f: F) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: FnOnce(&mut D) -> Result<T, BridgeError> + Send + 'static,
    {
        let mut driver = self.driver.take().ok_or_else(driver_lost)?;
        let (driver, result) = tokio::task::spawn_blocking(move || {
            let result = f(&mut driver);
            (driver, result)
        })
        .await
        .map_err(|e| BridgeError::Platform(format!("driver call panicked: {e}")))?;
        self.driver = Some(driver);
        result
    }

    async fn run(
        &mut self,
        message: &str,
        new_conversation: bool,
    ) -> Result<QueryOutcome, BridgeError> {
        let started = tokio::time::Instant::now();
        let mut metrics = Metrics::default();

        info!(
            app = %self.config.app_name,
            chars = message.len(),
            new_conversation,
            "starting query"
        );

        self.driver_call(|d| d.ensure_running()).await?;

        let t = tokio::time::Instant::now();
        self.driver_call(|d| d.focus()).await?;
        metrics.focus_time = t.elapsed().as_millis() as u64;

        if new_conversation {
            self.driver_call(|d| d.new_conversation()).await?;
        }

        let text = message.to_string();
        let t = tokio::time::Instant::now();
        self.driver_call(move |d| d.send_message(&text)).await?;
        metrics.paste_time = t.elapsed().as_millis() as u64;

        let driver = self.driver.take().ok_or_else(driver_lost)?;
        let poller = ResponsePoller::new(self.config.poll.clone());
        let (outcome, driver) = poller.wait_for_response(driver, message).await?;
        self.driver = Some(driver);

        metrics.ui_reads = outcome.ui_reads;
        metrics.total_read_time = outcome.total_read_time.as_millis() as u64;
        metrics.waiting_time = outcome.waiting_time.as_millis() as u64;

        let success = outcome.response.is_some();
        let error = if outcome.timed_out && outcome.response.is_none() {
            Some(format!(
                "timed out after {}s without capturing a response",
                outcome.waiting_time.as_secs()
            ))
        } else {
            None
        };

        Ok(QueryOutcome {
            success,
            message: echo_preview(message),
            response: outcome.response,
            error,
            elapsed: started.elapsed().as_secs(),
            metrics,
        })
    }
}

fn driver_lost() -> BridgeError {
    BridgeError::Platform("driver is no longer available after an earlier failed run".to_string())
}

/// First 100 characters of the sent message, with an ellipsis when cut.
fn echo_preview(message: &str) -> String {
    let head: String = message.chars().take(100).collect();
    if head.len() < message.len() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_preview_truncates_at_100_chars() {
        let long = "y".repeat(150);
        let echoed = echo_preview(&long);
        assert!(echoed.ends_with("..."));
        assert_eq!(echoed.chars().count(), 103);
        assert_eq!(echo_preview("short"), "short");
    }

    #[test]
    fn outcome_serializes_camel_case_and_skips_absent_fields() {
        let outcome = QueryOutcome {
            success: true,
            message: "hi".into(),
            response: Some("there".into()),
            error: None,
            elapsed: 7,
            metrics: Metrics {
                ui_reads: 3,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["metrics"]["uiReads"], 3);
        assert_eq!(json["response"], "there");
        assert!(json.get("error").is_none());
    }
}
