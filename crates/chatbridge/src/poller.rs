//! Response capture: poll the reader until the assistant's answer stops
//! changing, validate we are watching the right conversation, and degrade
//! gracefully when it never settles.

use crate::errors::{BridgeError, ExtractError};
use crate::reader::Extraction;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Anything the poller can read a conversation snapshot from. The live
/// implementation resolves the target window and runs the tree reader;
/// tests feed scripted sequences.
pub trait ConversationSource {
    fn snapshot(&mut self) -> Result<Extraction, ExtractError>;
}

/// Knobs for one polling session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between reader invocations.
    pub check_interval: Duration,
    /// Consecutive identical reads required before the response counts as
    /// final.
    pub stable_checks: u32,
    /// Soft deadline: past this we stop and return whatever we have.
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(5000),
            stable_checks: 2,
            // Reasoning-heavy assistants can stream for a long time.
            max_wait: Duration::from_millis(1_200_000),
        }
    }
}

/// Where a polling session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollPhase {
    /// Nothing in the conversation yet, not even our own message.
    AwaitingFirstMessage,
    /// Our message is visible; the assistant has not produced anything.
    AwaitingResponse,
    /// A response candidate exists and is still changing between reads.
    ResponseGrowing,
    /// Terminal: the candidate survived `stable_checks` identical reads.
    ResponseStable,
    /// Terminal: `max_wait` elapsed first.
    TimedOut,
    /// Terminal: the visible conversation is not the one we started.
    Mismatch,
}

/// What one observed tick means for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickDecision {
    Continue,
    Stable(String),
    Mismatch { expected: String, found: String },
}

/// Mutable session state, owned exclusively by one `wait_for_response` call
/// and discarded on return.
#[derive(Debug)]
pub struct PollState {
    last_response: Option<String>,
    stable_count: u32,
    check_number: u32,
    conversation_validated: bool,
    phase: PollPhase,
}

impl Default for PollState {
    fn default() -> Self {
        Self::new()
    }
}

impl PollState {
    pub fn new() -> Self {
        Self {
            last_response: None,
            stable_count: 0,
            check_number: 0,
            conversation_validated: false,
            phase: PollPhase::AwaitingFirstMessage,
        }
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    pub fn stable_count(&self) -> u32 {
        self.stable_count
    }

    pub fn check_number(&self) -> u32 {
        self.check_number
    }

    pub fn conversation_validated(&self) -> bool {
        self.conversation_validated
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    fn take_last_response(&mut self) -> Option<String> {
        self.last_response.take()
    }

    /// Apply one successful read to the session. This is the entire state
    /// machine; it touches no clock and no UI, so every transition is
    /// directly unit-testable.
    pub fn observe(&mut self, messages: &[String], sent: &str, stable_checks: u32) -> TickDecision {
        self.check_number += 1;

        if messages.is_empty() {
            self.phase = PollPhase::AwaitingFirstMessage;
            return TickDecision::Continue;
        }
        if messages.len() < 2 {
            self.phase = PollPhase::AwaitingResponse;
            return TickDecision::Continue;
        }

        // One-time guard against reading a stale window: the second-to-last
        // message must be the one we sent.
        if !self.conversation_validated {
            let sent_prefix = normalize_prefix(sent, 100);
            if !sent_prefix.is_empty() {
                let found_prefix = normalize_prefix(&messages[messages.len() - 2], 100);
                if !prefixes_overlap(&sent_prefix, &found_prefix) {
                    self.phase = PollPhase::Mismatch;
                    return TickDecision::Mismatch {
                        expected: head_chars(&sent_prefix, 50),
                        found: head_chars(&found_prefix, 50),
                    };
                }
            }
            self.conversation_validated = true;
            info!("conversation validated - correct thread");
        }

        let Some(candidate) = messages.last() else {
            return TickDecision::Continue;
        };
        if candidate.trim().is_empty() {
            // The assistant's turn exists but has rendered no text yet.
            return TickDecision::Continue;
        }

        if self.last_response.as_deref() == Some(candidate.as_str()) {
            self.stable_count += 1;
            if self.stable_count >= stable_checks {
                self.phase = PollPhase::ResponseStable;
                return TickDecision::Stable(candidate.clone());
            }
        } else {
            self.stable_count = 0;
            self.last_response = Some(candidate.clone());
        }
        self.phase = PollPhase::ResponseGrowing;
        TickDecision::Continue
    }
}

/// First `limit` characters with newlines collapsed to spaces, trimmed.
fn normalize_prefix(text: &str, limit: usize) -> String {
    let head: String = text.chars().take(limit).collect();
    head.replace(['\n', '\r'], " ").trim().to_string()
}

fn head_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Neither prefix being a substring of the other means we are looking at a
/// different conversation.
fn prefixes_overlap(sent: &str, found: &str) -> bool {
    found.contains(&head_chars(sent, 50)) || sent.contains(&head_chars(found, 50))
}

/// How one polling session ended (mismatch aside, which is a hard error).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Final response text: the stable candidate, or on timeout the last
    /// candidate ever captured.
    pub response: Option<String>,
    pub timed_out: bool,
    /// Successful reads applied to the state machine.
    pub checks: u32,
    /// Reader invocations, including failed ones.
    pub ui_reads: u32,
    pub total_read_time: Duration,
    pub waiting_time: Duration,
}

/// Stateful polling loop over a [`ConversationSource`].
#[derive(Debug, Clone, Default)]
pub struct ResponsePoller {
    config: PollConfig,
}

impl ResponsePoller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    /// Poll until the response stabilizes, the conversation turns out to be
    /// the wrong one, or `max_wait` passes. Returns the source together with
    /// the outcome so the caller can keep using it; on a hard error the
    /// source is dropped with the session.
    ///
    /// Each read runs on the blocking pool: accessibility calls can park
    /// indefinitely, and the loop must sit at an await point while they do
    /// so that the caller's deadline can still cancel it.
    ///
    /// Transient read errors are logged and retried on the next tick; they
    /// never advance the state machine and never end the loop on their own.
    pub async fn wait_for_response<S>(
        &self,
        mut source: S,
        sent_message: &str,
    ) -> Result<(PollOutcome, S), BridgeError>
    where
        S: ConversationSource + Send + 'static,
    {
        let started = tokio::time::Instant::now();
        let mut state = PollState::new();
        let mut ui_reads = 0u32;
        let mut total_read_time = Duration::ZERO;

        while started.elapsed() < self.config.max_wait {
            let read_started = tokio::time::Instant::now();
            let (returned, snapshot) = tokio::task::spawn_blocking(move || {
                let snapshot = source.snapshot();
                (source, snapshot)
            })
            .await
            .map_err(|e| BridgeError::Platform(format!("conversation read panicked: {e}")))?;
            source = returned;
            ui_reads += 1;
            total_read_time += read_started.elapsed();

            match snapshot {
                Err(err) => {
                    warn!(error = %err, "UI read error, retrying next tick");
                }
                Ok(extraction) => {
                    match state.observe(&extraction.messages, sent_message, self.config.stable_checks)
                    {
                        TickDecision::Stable(response) => {
                            info!(
                                elapsed_s = started.elapsed().as_secs(),
                                chars = response.len(),
                                "response confirmed stable"
                            );
                            return Ok((
                                PollOutcome {
                                    response: Some(response),
                                    timed_out: false,
                                    checks: state.check_number(),
                                    ui_reads,
                                    total_read_time,
                                    waiting_time: started.elapsed(),
                                },
                                source,
                            ));
                        }
                        TickDecision::Mismatch { expected, found } => {
                            warn!(%expected, %found, "conversation mismatch, aborting");
                            return Err(BridgeError::ConversationMismatch { expected, found });
                        }
                        TickDecision::Continue => {
                            debug!(
                                check = state.check_number(),
                                elapsed_s = started.elapsed().as_secs(),
                                phase = ?state.phase(),
                                stable = state.stable_count(),
                                chars = state.last_response().map(str::len).unwrap_or(0),
                                "poll tick"
                            );
                        }
                    }
                }
            }

            tokio::time::sleep(self.config.check_interval).await;
        }

        let waiting_time = started.elapsed();
        info!(
            elapsed_s = waiting_time.as_secs(),
            captured = state.last_response().is_some(),
            "timeout reached, returning best effort"
        );
        Ok((
            PollOutcome {
                response: state.take_last_response(),
                timed_out: true,
                checks: state.check_number(),
                ui_reads,
                total_read_time,
                waiting_time,
            },
            source,
        ))
    }
}
