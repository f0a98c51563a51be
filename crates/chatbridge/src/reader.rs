//! Budget-bounded extraction of conversation text from a live window.
//!
//! The reader is stateless and purely read-only: given the window root it
//! navigates to the conversation container, locates the message list and
//! pulls the rendered text of every message group, all under one node
//! budget. Each attribute access is an IPC round-trip into the target
//! process, so it reads as few attributes as it can get away with: the
//! blind descent reads none at all.

use crate::errors::ExtractError;
use crate::locator::ConversationLocator;
use crate::node::{role_matches, UiNode};
use crate::walk::{walk_bounded, Budget, Step};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Cost ceilings for one extraction pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReaderConfig {
    /// Depth cap for the overall traversal, measured from the window root.
    pub max_depth: usize,
    /// Total node visits allowed per extraction.
    pub node_budget: u32,
    /// Recursion cap inside a single message group, independent of
    /// `max_depth`. Message text sits shallow; anything deeper is chrome.
    pub text_depth: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            node_budget: 100,
            text_depth: 2,
        }
    }
}

/// Timing and cost metadata attached to a successful extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMeta {
    pub elapsed_ms: u64,
    pub nodes_visited: u32,
    pub message_count: usize,
}

/// One successful read of the conversation: message texts in UI document
/// order, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub messages: Vec<String>,
    pub meta: ExtractionMeta,
}

/// Stateless, budget-bounded conversation reader.
#[derive(Debug, Clone, Default)]
pub struct TreeReader {
    locator: ConversationLocator,
    config: ReaderConfig,
}

impl TreeReader {
    pub fn new(locator: ConversationLocator, config: ReaderConfig) -> Self {
        Self { locator, config }
    }

    pub fn locator(&self) -> &ConversationLocator {
        &self.locator
    }

    /// Extract the conversation from a window root.
    ///
    /// A missing structural path is the only error; everything past the
    /// container degrades to fewer (possibly zero) messages, and budget
    /// exhaustion keeps whatever was collected so far.
    pub fn extract(&self, window: &UiNode) -> Result<Extraction, ExtractError> {
        let started = Instant::now();
        let mut budget = Budget::new(self.config.node_budget);

        let container = self
            .locator
            .descend(window, &mut budget)
            .ok_or(ExtractError::ContainerNotFound {
                nodes_checked: budget.spent(),
            })?;

        let messages = self.collect_messages(&container, &mut budget);

        Ok(Extraction {
            meta: ExtractionMeta {
                elapsed_ms: started.elapsed().as_millis() as u64,
                nodes_visited: budget.spent(),
                message_count: messages.len(),
            },
            messages,
        })
    }

    /// Guided structural search below the container: probe the first few
    /// children for the scroll area, then descend through one or two nested
    /// lists to the message groups. Absent roles abandon the search without
    /// an error, since an empty conversation view is a normal sight.
    fn collect_messages(&self, container: &UiNode, budget: &mut Budget) -> Vec<String> {
        let probed = container.children();
        for child in probed.into_iter().take(self.locator.scroll_probe_width) {
            if !budget.charge() {
                break;
            }
            if !role_matches(child.role().as_deref(), &self.locator.scroll_role) {
                continue;
            }
            for scroll_child in child.children() {
                if !budget.charge() {
                    return Vec::new();
                }
                if role_matches(scroll_child.role().as_deref(), &self.locator.list_role) {
                    let groups = self.message_groups(scroll_child, budget);
                    return self.extract_group_texts(groups, budget);
                }
            }
        }
        Vec::new()
    }

    /// Some app versions nest the message groups inside a second list; in
    /// others the outer list holds them directly.
    fn message_groups(&self, outer: UiNode, budget: &mut Budget) -> Vec<UiNode> {
        let children = outer.children();
        let mut inner_at = None;
        for (i, child) in children.iter().enumerate() {
            if !budget.charge() {
                return Vec::new();
            }
            if role_matches(child.role().as_deref(), &self.locator.list_role) {
                inner_at = Some(i);
                break;
            }
        }
        match inner_at {
            Some(i) => children
                .into_iter()
                .nth(i)
                .map(|inner| inner.children())
                .unwrap_or_default(),
            None => children,
        }
    }

    fn extract_group_texts(&self, groups: Vec<UiNode>, budget: &mut Budget) -> Vec<String> {
        let mut messages = Vec::new();
        for group in groups {
            if !budget.charge() {
                break;
            }
            if !role_matches(group.role().as_deref(), &self.locator.group_role) {
                continue;
            }
            let text = self.leaf_text(&group, budget);
            if !text.is_empty() {
                messages.push(text);
            }
        }
        messages
    }

    /// Newline-joined text of the static-text leaves under one message
    /// group. Only leaves are read; containers are descended through
    /// without touching their text attributes.
    fn leaf_text(&self, group: &UiNode, budget: &mut Budget) -> String {
        let mut parts: Vec<String> = Vec::new();
        walk_bounded(group, self.config.text_depth, budget, &mut |node, _| {
            let role = node.role();
            if role_matches(role.as_deref(), &self.locator.text_role) {
                if let Some(text) = node.description().or_else(|| node.value()) {
                    if !text.is_empty() {
                        parts.push(text);
                    }
                }
                return Step::SkipChildren;
            }
            if role_matches(role.as_deref(), &self.locator.group_role)
                || role_matches(role.as_deref(), &self.locator.scroll_role)
            {
                Step::Continue
            } else {
                Step::SkipChildren
            }
        });
        parts.join("\n")
    }
}
