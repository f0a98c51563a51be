//! Declarative description of where the conversation lives in the target UI.
//!
//! The path from the window to the conversation container is a structural
//! assumption about one version of a third-party application. Keeping it as
//! data (a blind index path plus role constraints) means UI drift is fixed
//! by editing a locator, and [`ConversationLocator::validate`] catches drift
//! against a recorded tree fixture before it silently reads the wrong node.

use crate::node::{role_matches, FixtureNode, UiNode};
use crate::walk::Budget;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where and how to find the message list inside the target application's
/// window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationLocator {
    /// Blind child-index hops from the window to the conversation container.
    /// Reference layout: window > Group[0] > SplitGroup[0] > Group[2].
    pub container_path: Vec<usize>,
    /// How many leading children of the container to probe for the scroll
    /// area before giving up.
    pub scroll_probe_width: usize,
    pub scroll_role: String,
    pub list_role: String,
    pub group_role: String,
    pub text_role: String,
}

impl Default for ConversationLocator {
    fn default() -> Self {
        Self {
            container_path: vec![0, 0, 2],
            scroll_probe_width: 2,
            scroll_role: "ScrollArea".to_string(),
            list_role: "List".to_string(),
            group_role: "Group".to_string(),
            text_role: "StaticText".to_string(),
        }
    }
}

/// First locator step that no longer matches a recorded fixture.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocatorDrift {
    #[error("container path hop {hop} (child index {index}) is out of range")]
    PathHop { hop: usize, index: usize },
    #[error("no {role:?} among the first {probed} children of the container")]
    ScrollAreaMissing { role: String, probed: usize },
    #[error("no {role:?} under the scroll area")]
    ListMissing { role: String },
    #[error("message list contains no {role:?} children")]
    GroupsMissing { role: String },
}

impl ConversationLocator {
    /// Blind navigation: follow `container_path` without reading any node
    /// attribute, charging one budget unit per hop. `None` means an index
    /// was out of range or the budget ran out before the container.
    pub fn descend(&self, window: &UiNode, budget: &mut Budget) -> Option<UiNode> {
        let mut current: Option<UiNode> = None;
        for &index in &self.container_path {
            if !budget.charge() {
                return None;
            }
            let next = match current.as_ref() {
                Some(node) => node.child(index)?,
                None => window.child(index)?,
            };
            current = Some(next);
        }
        current
    }

    /// Check every structural assumption of this locator against a recorded
    /// tree snapshot, reporting the first step that no longer holds.
    pub fn validate(&self, window: &FixtureNode) -> Result<(), LocatorDrift> {
        let mut container = window;
        for (hop, &index) in self.container_path.iter().enumerate() {
            container = container
                .children
                .get(index)
                .ok_or(LocatorDrift::PathHop { hop, index })?;
        }

        let scroll = container
            .children
            .iter()
            .take(self.scroll_probe_width)
            .find(|c| role_matches(c.role.as_deref(), &self.scroll_role))
            .ok_or_else(|| LocatorDrift::ScrollAreaMissing {
                role: self.scroll_role.clone(),
                probed: self.scroll_probe_width,
            })?;

        let outer = scroll
            .children
            .iter()
            .find(|c| role_matches(c.role.as_deref(), &self.list_role))
            .ok_or_else(|| LocatorDrift::ListMissing {
                role: self.list_role.clone(),
            })?;

        // The message groups either sit under a nested list or directly
        // under the outer one.
        let section = outer
            .children
            .iter()
            .find(|c| role_matches(c.role.as_deref(), &self.list_role))
            .unwrap_or(outer);

        if !section
            .children
            .iter()
            .any(|c| role_matches(c.role.as_deref(), &self.group_role))
        {
            return Err(LocatorDrift::GroupsMissing {
                role: self.group_role.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_window() -> FixtureNode {
        FixtureNode::role("Window").with_children(vec![FixtureNode::role("Group").with_children(
            vec![FixtureNode::role("SplitGroup").with_children(vec![
                    FixtureNode::role("Group"),
                    FixtureNode::role("Group"),
                    FixtureNode::role("Group").with_children(vec![FixtureNode::role(
                        "AXScrollArea",
                    )
                    .with_children(vec![FixtureNode::role("AXList").with_children(vec![
                        FixtureNode::role("AXList").with_children(vec![
                            FixtureNode::role("AXGroup")
                                .with_children(vec![FixtureNode::text("AXStaticText", "hi")]),
                        ]),
                    ])])]),
                ])],
        )])
    }

    #[test]
    fn descend_follows_index_path_and_charges_per_hop() {
        let locator = ConversationLocator::default();
        let window = reference_window().into_node();
        let mut budget = Budget::new(10);
        let container = locator.descend(&window, &mut budget).unwrap();
        assert!(role_matches(container.role().as_deref(), "Group"));
        assert_eq!(budget.spent(), 3);
    }

    #[test]
    fn descend_fails_on_out_of_range_index() {
        let locator = ConversationLocator::default();
        let window = FixtureNode::role("Window").into_node();
        let mut budget = Budget::new(10);
        assert!(locator.descend(&window, &mut budget).is_none());
        assert!(budget.spent() <= 10);
    }

    #[test]
    fn descend_respects_budget() {
        let locator = ConversationLocator::default();
        let window = reference_window().into_node();
        let mut budget = Budget::new(2);
        assert!(locator.descend(&window, &mut budget).is_none());
        assert_eq!(budget.spent(), 2);
    }

    #[test]
    fn validate_accepts_the_reference_fixture() {
        let locator = ConversationLocator::default();
        assert_eq!(locator.validate(&reference_window()), Ok(()));
    }

    #[test]
    fn validate_reports_the_first_drifted_step() {
        let locator = ConversationLocator::default();

        let err = locator.validate(&FixtureNode::role("Window")).unwrap_err();
        assert_eq!(err, LocatorDrift::PathHop { hop: 0, index: 0 });

        // Same skeleton, but the scroll area was replaced by a web view.
        let mut drifted = reference_window();
        drifted.children[0].children[0].children[2].children[0].role = Some("WebArea".into());
        let err = locator.validate(&drifted).unwrap_err();
        assert_eq!(
            err,
            LocatorDrift::ScrollAreaMissing {
                role: "ScrollArea".into(),
                probed: 2
            }
        );
    }

    #[test]
    fn locator_round_trips_through_json() {
        let locator = ConversationLocator::default();
        let json = serde_json::to_string(&locator).unwrap();
        assert!(json.contains("containerPath"));
        let back: ConversationLocator = serde_json::from_str(&json).unwrap();
        assert_eq!(locator, back);
    }
}
