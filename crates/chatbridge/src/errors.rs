use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by one attempt to read the conversation out of the UI.
///
/// Everything here is recoverable from the poller's point of view: a failed
/// read is logged and retried on the next tick. Only the bridge decides
/// whether a read failure is worth aborting for (e.g. the app was never
/// running in the first place).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The target application has no process we can see.
    #[error("{0} not running")]
    AppNotRunning(String),

    /// The application is running but exposes no window to read from.
    #[error("No window")]
    NoWindow,

    /// The fixed structural path to the conversation container no longer
    /// resolves. This is the UI-version-drift signal: we fail explicitly
    /// instead of guessing at a new layout.
    #[error("Conversation area not found")]
    ContainerNotFound { nodes_checked: u32 },

    /// Any other transient accessibility failure.
    #[error("UI read failed: {0}")]
    Read(String),
}

impl ExtractError {
    /// Budget units consumed before the failure, where that is meaningful.
    pub fn nodes_checked(&self) -> Option<u32> {
        match self {
            ExtractError::ContainerNotFound { nodes_checked } => Some(*nodes_checked),
            _ => None,
        }
    }
}

/// Wire shape for a failed extraction, mirroring the success side of
/// [`crate::reader::Extraction`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractFailure {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes_checked: Option<u32>,
}

impl From<&ExtractError> for ExtractFailure {
    fn from(err: &ExtractError) -> Self {
        Self {
            error: err.to_string(),
            nodes_checked: err.nodes_checked(),
        }
    }
}

/// Hard failures of a whole `query()` run.
///
/// Note that running out of `max_wait` while the response is still changing
/// is deliberately *not* in this list: slow responses are common and partial
/// text is still useful, so that case resolves to a soft-fail
/// [`crate::bridge::QueryOutcome`] instead.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The target application has no process we can see.
    #[error("{0} not running")]
    AppNotRunning(String),

    /// The conversation visible in the UI is not the one we started. Reading
    /// on would capture a response to somebody else's question, so this
    /// aborts immediately rather than waiting out the timeout.
    #[error("wrong conversation thread: sent {expected:?}, found {found:?}")]
    ConversationMismatch { expected: String, found: String },

    /// The independent wall-clock guard fired. Accessibility calls can block
    /// indefinitely; this keeps a hung read from stranding the caller.
    #[error("automation exceeded hard deadline of {0:?}")]
    HardTimeout(Duration),

    /// The platform layer could not drive the application at all
    /// (osascript/clipboard/keystroke failures, missing permissions, ...).
    #[error("platform automation failed: {0}")]
    Platform(String),
}
