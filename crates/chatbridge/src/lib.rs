//! chatbridge: drive a desktop chat application through its accessibility
//! tree and capture the assistant's streamed response.
//!
//! The crate has no protocol- or UI-framework-specific knowledge of the
//! target application beyond a [`locator::ConversationLocator`]: everything
//! is read through the generic [`node::UiNode`] capability surface under a
//! strict node [`walk::Budget`], and response completion is detected by the
//! [`poller::ResponsePoller`] state machine watching for textual stability.
//!
//! Typical use:
//!
//! ```no_run
//! # #[cfg(target_os = "macos")]
//! # async fn run() -> Result<(), chatbridge::BridgeError> {
//! use chatbridge::{BridgeConfig, ChatBridge, MacOsDriver};
//!
//! let config = BridgeConfig::default();
//! let driver = MacOsDriver::new(&config);
//! let mut bridge = ChatBridge::new(driver, config);
//! let outcome = bridge.query("Explain the borrow checker", true).await?;
//! println!("{}", serde_json::to_string_pretty(&outcome).unwrap());
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod errors;
pub mod locator;
pub mod node;
pub mod platforms;
pub mod poller;
pub mod reader;
pub mod walk;

pub use bridge::{BridgeConfig, ChatBridge, DesktopDriver, Metrics, QueryOutcome};
pub use errors::{BridgeError, ExtractError, ExtractFailure};
pub use locator::{ConversationLocator, LocatorDrift};
pub use node::{FixtureNode, UiNode, UiNodeImpl};
pub use poller::{ConversationSource, PollConfig, PollOutcome, PollPhase, PollState, ResponsePoller};
pub use reader::{Extraction, ExtractionMeta, ReaderConfig, TreeReader};
pub use walk::{Budget, Step};

#[cfg(target_os = "macos")]
pub use platforms::MacOsDriver;
