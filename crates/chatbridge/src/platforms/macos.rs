//! macOS driver: AX API node adapter plus osascript/clipboard/keystroke
//! plumbing for driving the target application.

use crate::bridge::{BridgeConfig, DesktopDriver};
use crate::errors::{BridgeError, ExtractError};
use crate::node::{UiNode, UiNodeImpl};
use crate::poller::ConversationSource;
use crate::reader::{Extraction, TreeReader};
use accessibility::{AXAttribute, AXUIElement, AXUIElementAttributes};
use core_foundation::array::CFArray;
use core_foundation::string::CFString;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;

/// One live AX element behind the [`UiNode`] capability surface.
///
/// Every accessor swallows AX errors into `None`: a node that refuses to
/// report an attribute is treated as simply not having it.
struct AxNode {
    ax: AXUIElement,
}

// SAFETY: AXUIElement is a CoreFoundation wrapper around an AXUIElementRef.
// We only perform short-lived read-only queries, which the AX API tolerates
// across threads in practice. If that assumption is ever violated, confine
// AX queries to a dedicated thread and proxy requests.
unsafe impl Send for AxNode {}
unsafe impl Sync for AxNode {}

impl AxNode {
    fn new(ax: AXUIElement) -> Self {
        Self { ax }
    }

    fn ax_string(res: Result<CFString, accessibility::Error>) -> Option<String> {
        res.ok().map(|s| s.to_string())
    }
}

impl UiNodeImpl for AxNode {
    fn role(&self) -> Option<String> {
        Self::ax_string(self.ax.role())
    }

    fn description(&self) -> Option<String> {
        Self::ax_string(self.ax.description())
    }

    fn title(&self) -> Option<String> {
        Self::ax_string(self.ax.title())
    }

    fn value(&self) -> Option<String> {
        // Value is a CFType; anything that isn't a string reads as absent.
        self.ax
            .value()
            .ok()
            .and_then(|v| v.downcast::<CFString>().map(|s| s.to_string()))
    }

    fn children(&self) -> Vec<UiNode> {
        let attr_children: AXAttribute<CFArray<AXUIElement>> = AXAttribute::children();
        match self.ax.attribute(&attr_children) {
            Ok(children) => children
                .iter()
                .map(|c| UiNode::new(Box::new(AxNode::new((*c).clone()))))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Live driver for the target application on macOS.
pub struct MacOsDriver {
    app_name: String,
    reader: TreeReader,
    system: System,
}

impl MacOsDriver {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            reader: TreeReader::new(config.locator.clone(), config.reader.clone()),
            system: System::new(),
        }
    }

    fn find_pid(&mut self) -> Option<i32> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        self.system
            .processes()
            .iter()
            .find(|(_, p)| {
                p.name()
                    .to_string_lossy()
                    .eq_ignore_ascii_case(&self.app_name)
            })
            .map(|(pid, _)| pid.as_u32() as i32)
    }

    fn front_window(&mut self) -> Result<UiNode, ExtractError> {
        let pid = self
            .find_pid()
            .ok_or_else(|| ExtractError::AppNotRunning(self.app_name.clone()))?;
        let app = AXUIElement::application(pid);
        let windows = app
            .windows()
            .map_err(|e| ExtractError::Read(format!("AXWindows unavailable: {e}")))?;
        let window = windows.iter().next().ok_or(ExtractError::NoWindow)?;
        Ok(UiNode::new(Box::new(AxNode::new((*window).clone()))))
    }

    fn enigo() -> Result<Enigo, BridgeError> {
        Enigo::new(&Settings::default())
            .map_err(|e| BridgeError::Platform(format!("Failed to initialize input backend: {e}")))
    }

    /// Press one character key while holding Cmd.
    fn command_key(ch: char) -> Result<(), BridgeError> {
        let mut enigo = Self::enigo()?;
        enigo
            .key(Key::Meta, Direction::Press)
            .map_err(|e| BridgeError::Platform(format!("Failed to press modifier: {e}")))?;
        let result = enigo
            .key(Key::Unicode(ch), Direction::Click)
            .map_err(|e| BridgeError::Platform(format!("Failed to press key: {e}")));
        let _ = enigo.key(Key::Meta, Direction::Release);
        result
    }

    fn press_return() -> Result<(), BridgeError> {
        let mut enigo = Self::enigo()?;
        enigo
            .key(Key::Return, Direction::Click)
            .map_err(|e| BridgeError::Platform(format!("Failed to press Return: {e}")))
    }

    /// Put text on the system clipboard via pbcopy, avoiding every
    /// shell-escaping pitfall of passing it through osascript.
    fn set_clipboard(text: &str) -> Result<(), BridgeError> {
        let mut child = Command::new("pbcopy")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BridgeError::Platform(format!("Failed to spawn pbcopy: {e}")))?;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| BridgeError::Platform(format!("Failed to write clipboard: {e}")))?;
        }
        let status = child
            .wait()
            .map_err(|e| BridgeError::Platform(format!("Failed to wait for pbcopy: {e}")))?;
        if !status.success() {
            return Err(BridgeError::Platform(
                "pbcopy returned non-zero exit status".to_string(),
            ));
        }
        Ok(())
    }

    fn osascript(script: &str) -> Result<(), BridgeError> {
        let status = Command::new("osascript")
            .args(["-e", script])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| BridgeError::Platform(format!("Failed to run osascript: {e}")))?;
        if !status.success() {
            return Err(BridgeError::Platform(
                "osascript returned non-zero exit status".to_string(),
            ));
        }
        Ok(())
    }

    fn settle(ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

impl ConversationSource for MacOsDriver {
    fn snapshot(&mut self) -> Result<Extraction, ExtractError> {
        let window = self.front_window()?;
        self.reader.extract(&window)
    }
}

impl DesktopDriver for MacOsDriver {
    fn ensure_running(&mut self) -> Result<(), BridgeError> {
        if self.find_pid().is_none() {
            return Err(BridgeError::AppNotRunning(self.app_name.clone()));
        }
        Ok(())
    }

    fn focus(&mut self) -> Result<(), BridgeError> {
        debug!(app = %self.app_name, "activating application");
        let script = format!(
            "tell application \"{}\" to activate",
            self.app_name.replace('"', "\\\"")
        );
        Self::osascript(&script)?;
        Self::settle(500);
        Ok(())
    }

    fn new_conversation(&mut self) -> Result<(), BridgeError> {
        debug!("opening new conversation (Cmd+N)");
        Self::command_key('n')?;
        // The fresh thread needs a moment before it accepts input.
        Self::settle(1500);
        Ok(())
    }

    fn send_message(&mut self, message: &str) -> Result<(), BridgeError> {
        debug!(chars = message.len(), "pasting and sending message");
        Self::set_clipboard(message)?;
        Self::settle(200);
        Self::command_key('v')?;
        Self::settle(300);
        Self::press_return()?;
        Self::settle(1500);
        Ok(())
    }
}
