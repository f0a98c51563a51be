//! Capability surface over a single accessibility node.
//!
//! The reader never talks to a platform API directly; it sees an opaque
//! [`UiNode`] whose every accessor may fail independently. Failures degrade
//! to `None`/empty so that one missing attribute never aborts a traversal.

use serde::{Deserialize, Serialize};

/// Platform implementation behind a [`UiNode`].
///
/// Implementations must never panic or propagate platform errors: an
/// attribute that cannot be read is simply absent.
pub trait UiNodeImpl: Send + Sync {
    fn role(&self) -> Option<String>;
    fn description(&self) -> Option<String>;
    fn title(&self) -> Option<String>;
    fn value(&self) -> Option<String>;
    fn children(&self) -> Vec<UiNode>;
}

/// Opaque handle to one element of the live accessibility tree.
pub struct UiNode(Box<dyn UiNodeImpl>);

impl UiNode {
    pub fn new(imp: Box<dyn UiNodeImpl>) -> Self {
        Self(imp)
    }

    pub fn role(&self) -> Option<String> {
        self.0.role()
    }

    pub fn description(&self) -> Option<String> {
        self.0.description()
    }

    pub fn title(&self) -> Option<String> {
        self.0.title()
    }

    pub fn value(&self) -> Option<String> {
        self.0.value()
    }

    pub fn children(&self) -> Vec<UiNode> {
        self.0.children()
    }

    /// The `index`-th child, if it exists.
    pub fn child(&self, index: usize) -> Option<UiNode> {
        self.0.children().into_iter().nth(index)
    }
}

impl std::fmt::Debug for UiNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiNode")
            .field("role", &self.role())
            .field("title", &self.title())
            .finish()
    }
}

/// Role comparison that tolerates the platform's naming convention:
/// macOS reports "AXScrollArea" where we configure "ScrollArea", and case
/// varies across backends.
pub fn role_matches(role: Option<&str>, want: &str) -> bool {
    let Some(role) = role else { return false };
    let got = role.trim_start_matches("AX").to_ascii_lowercase();
    let want = want.trim_start_matches("AX").to_ascii_lowercase();
    got == want
}

/// In-memory tree node, loadable from a recorded JSON snapshot of a real
/// accessibility tree.
///
/// This backs two things: locator validation against a known-good fixture
/// (so UI drift is caught by a test instead of in production), and every
/// reader/poller test in this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct FixtureNode {
    pub role: Option<String>,
    pub description: Option<String>,
    pub title: Option<String>,
    pub value: Option<String>,
    pub children: Vec<FixtureNode>,
}

impl FixtureNode {
    pub fn role(role: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            ..Default::default()
        }
    }

    /// A static-text leaf carrying its text in the description attribute,
    /// the way the macOS AX tree exposes rendered message text.
    pub fn text(role: &str, description: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            description: Some(description.to_string()),
            ..Default::default()
        }
    }

    pub fn with_children(mut self, children: Vec<FixtureNode>) -> Self {
        self.children = children;
        self
    }

    pub fn into_node(self) -> UiNode {
        UiNode::new(Box::new(self))
    }
}

impl UiNodeImpl for FixtureNode {
    fn role(&self) -> Option<String> {
        self.role.clone()
    }

    fn description(&self) -> Option<String> {
        self.description.clone()
    }

    fn title(&self) -> Option<String> {
        self.title.clone()
    }

    fn value(&self) -> Option<String> {
        self.value.clone()
    }

    fn children(&self) -> Vec<UiNode> {
        self.children
            .iter()
            .map(|c| UiNode::new(Box::new(c.clone())))
            .collect()
    }
}
