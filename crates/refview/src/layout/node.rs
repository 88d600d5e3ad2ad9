//! Declarative layout tree
//!
//! A layout is a recursive tree of sequences, boxes, panels and workspaces.
//! Only workspaces host plugin views; everything else arranges them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// How a workspace shows its views
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceKind {
    #[default]
    Tabs,
    Stack,
}

/// Requested size; `-1` asks to fill the available space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
}

impl SizeHints {
    pub fn new(width: Option<i32>, height: Option<i32>) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }
}

/// A box child with its stretch weight (0 = fixed size)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxItem {
    pub node: LayoutNode,
    #[serde(default)]
    pub stretch: u32,
}

/// A named tab group inside a workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabGroup {
    pub title: String,
    pub node: LayoutNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayoutNode {
    /// Pure grouping; children become siblings of each other
    Seq {
        #[serde(default)]
        children: Vec<LayoutNode>,
    },
    Box {
        orientation: Orientation,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "SizeHints::is_empty")]
        hints: SizeHints,
        #[serde(default)]
        children: Vec<BoxItem>,
    },
    /// User-resizable split
    Panel {
        orientation: Orientation,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "SizeHints::is_empty")]
        hints: SizeHints,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sizes: Option<Vec<i32>>,
        #[serde(default)]
        children: Vec<LayoutNode>,
    },
    Workspace {
        name: String,
        #[serde(default)]
        kind: WorkspaceKind,
        #[serde(default)]
        group: u32,
        #[serde(default, skip_serializing_if = "SizeHints::is_empty")]
        hints: SizeHints,
        #[serde(default)]
        use_toolbar: bool,
        #[serde(default)]
        tabs: Vec<TabGroup>,
    },
}

/// Node variant without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Seq,
    Box,
    Panel,
    Workspace,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeKind::Seq => "seq",
            NodeKind::Box => "box",
            NodeKind::Panel => "panel",
            NodeKind::Workspace => "workspace",
        };
        f.write_str(label)
    }
}

impl LayoutNode {
    // ─────────────────────────────────────────────────────────────────────
    // Construction helpers
    // ─────────────────────────────────────────────────────────────────────

    pub fn seq(children: Vec<LayoutNode>) -> Self {
        LayoutNode::Seq { children }
    }

    pub fn vbox(name: Option<&str>) -> Self {
        Self::boxed(Orientation::Vertical, name)
    }

    pub fn hbox(name: Option<&str>) -> Self {
        Self::boxed(Orientation::Horizontal, name)
    }

    fn boxed(orientation: Orientation, name: Option<&str>) -> Self {
        LayoutNode::Box {
            orientation,
            name: name.map(str::to_string),
            hints: SizeHints::default(),
            children: Vec::new(),
        }
    }

    pub fn vpanel(name: Option<&str>) -> Self {
        Self::panel(Orientation::Vertical, name)
    }

    pub fn hpanel(name: Option<&str>) -> Self {
        Self::panel(Orientation::Horizontal, name)
    }

    fn panel(orientation: Orientation, name: Option<&str>) -> Self {
        LayoutNode::Panel {
            orientation,
            name: name.map(str::to_string),
            hints: SizeHints::default(),
            sizes: None,
            children: Vec::new(),
        }
    }

    pub fn workspace(name: &str, kind: WorkspaceKind, group: u32) -> Self {
        LayoutNode::Workspace {
            name: name.to_string(),
            kind,
            group,
            hints: SizeHints::default(),
            use_toolbar: false,
            tabs: Vec::new(),
        }
    }

    /// Append a child; box children get `stretch`, panel and seq children
    /// ignore it. Workspaces take children through [`LayoutNode::tab`].
    pub fn child(mut self, node: LayoutNode, stretch: u32) -> Self {
        match &mut self {
            LayoutNode::Seq { children } | LayoutNode::Panel { children, .. } => {
                children.push(node)
            }
            LayoutNode::Box { children, .. } => children.push(BoxItem { node, stretch }),
            LayoutNode::Workspace { name, .. } => {
                tracing::warn!("Workspace '{}' takes tabs, not children", name);
            }
        }
        self
    }

    /// Add a titled tab group to a workspace.
    pub fn tab(mut self, title: &str, node: LayoutNode) -> Self {
        if let LayoutNode::Workspace { tabs, .. } = &mut self {
            tabs.push(TabGroup {
                title: title.to_string(),
                node,
            });
        }
        self
    }

    pub fn with_size(mut self, width: Option<i32>, height: Option<i32>) -> Self {
        if let Some(hints) = self.hints_mut() {
            *hints = SizeHints::new(width, height);
        }
        self
    }

    pub fn with_toolbar(mut self) -> Self {
        if let LayoutNode::Workspace { use_toolbar, .. } = &mut self {
            *use_toolbar = true;
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────

    pub fn kind(&self) -> NodeKind {
        match self {
            LayoutNode::Seq { .. } => NodeKind::Seq,
            LayoutNode::Box { .. } => NodeKind::Box,
            LayoutNode::Panel { .. } => NodeKind::Panel,
            LayoutNode::Workspace { .. } => NodeKind::Workspace,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            LayoutNode::Seq { .. } => None,
            LayoutNode::Box { name, .. } | LayoutNode::Panel { name, .. } => name.as_deref(),
            LayoutNode::Workspace { name, .. } => Some(name),
        }
    }

    pub fn hints(&self) -> SizeHints {
        match self {
            LayoutNode::Seq { .. } => SizeHints::default(),
            LayoutNode::Box { hints, .. }
            | LayoutNode::Panel { hints, .. }
            | LayoutNode::Workspace { hints, .. } => *hints,
        }
    }

    pub fn hints_mut(&mut self) -> Option<&mut SizeHints> {
        match self {
            LayoutNode::Seq { .. } => None,
            LayoutNode::Box { hints, .. }
            | LayoutNode::Panel { hints, .. }
            | LayoutNode::Workspace { hints, .. } => Some(hints),
        }
    }

    /// Direct child nodes, in order.
    pub fn children(&self) -> Vec<&LayoutNode> {
        match self {
            LayoutNode::Seq { children } | LayoutNode::Panel { children, .. } => {
                children.iter().collect()
            }
            LayoutNode::Box { children, .. } => children.iter().map(|item| &item.node).collect(),
            LayoutNode::Workspace { tabs, .. } => tabs.iter().map(|tab| &tab.node).collect(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut LayoutNode> {
        match self {
            LayoutNode::Seq { children } | LayoutNode::Panel { children, .. } => {
                children.iter_mut().collect()
            }
            LayoutNode::Box { children, .. } => {
                children.iter_mut().map(|item| &mut item.node).collect()
            }
            LayoutNode::Workspace { tabs, .. } => tabs.iter_mut().map(|tab| &mut tab.node).collect(),
        }
    }

    /// Every (name, kind) pair in the tree. Two trees with equal sets have
    /// the same named topology.
    pub fn named_nodes(&self) -> BTreeSet<(String, NodeKind)> {
        let mut found = BTreeSet::new();
        self.collect_named(&mut found);
        found
    }

    fn collect_named(&self, found: &mut BTreeSet<(String, NodeKind)>) {
        if let Some(name) = self.name() {
            found.insert((name.to_string(), self.kind()));
        }
        for child in self.children() {
            child.collect_named(found);
        }
    }

    /// Depth-first search by name.
    pub fn find(&self, wanted: &str) -> Option<&LayoutNode> {
        if self.name() == Some(wanted) {
            return Some(self);
        }
        self.children().into_iter().find_map(|child| child.find(wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LayoutNode {
        LayoutNode::seq(vec![
            LayoutNode::vbox(Some("top"))
                .with_size(Some(800), Some(600))
                .child(LayoutNode::workspace("main", WorkspaceKind::Tabs, 1).with_toolbar(), 1)
                .child(
                    LayoutNode::workspace("side", WorkspaceKind::Stack, 2)
                        .tab("Info", LayoutNode::workspace("info", WorkspaceKind::Tabs, 3)),
                    0,
                ),
        ])
    }

    #[test]
    fn test_named_nodes() {
        let names: Vec<(String, NodeKind)> = sample().named_nodes().into_iter().collect();
        assert_eq!(
            names,
            vec![
                ("info".to_string(), NodeKind::Workspace),
                ("main".to_string(), NodeKind::Workspace),
                ("side".to_string(), NodeKind::Workspace),
                ("top".to_string(), NodeKind::Box),
            ]
        );
    }

    #[test]
    fn test_json_shape() {
        let tree = sample();
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["type"], "seq");
        assert_eq!(json["children"][0]["type"], "box");
        assert_eq!(json["children"][0]["hints"]["width"], 800);
        assert_eq!(json["children"][0]["children"][0]["stretch"], 1);
        assert_eq!(json["children"][0]["children"][0]["node"]["use_toolbar"], true);

        let back: LayoutNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_find_and_children() {
        let tree = sample();
        let side = tree.find("side").unwrap();
        assert_eq!(side.kind(), NodeKind::Workspace);
        assert_eq!(side.children().len(), 1);
        assert!(tree.find("missing").is_none());
    }
}
