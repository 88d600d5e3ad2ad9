// Layout Compiler - turns a declarative tree into a concrete container hierarchy
//
// Containers live in a flat arena indexed by `ContainerId`; parents and
// children refer to each other by id. Only named nodes enter the name index.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::node::{BoxItem, LayoutNode, NodeKind, Orientation, SizeHints, TabGroup, WorkspaceKind};
use super::persist;

/// Default maximum nesting depth
pub const DEFAULT_MAX_DEPTH: usize = 2000;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("layout name '{0}' is used more than once")]
    DuplicateName(String),

    #[error("panel {name} has {regions} region(s); at least two are required")]
    PanelTooSmall { name: String, regions: usize },

    #[error("workspace with an empty name")]
    EmptyWorkspaceName,

    #[error("layout nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("no workspace '{workspace}' and none in group {group:?}")]
    Unplaceable { workspace: String, group: Option<u32> },

    #[error("saved layout does not match: {0}")]
    Incompatible(String),

    #[error("cannot read or write layout file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("malformed layout file: {0}")]
    Json(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Containers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContainerId(pub usize);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ContainerKind {
    Box { orientation: Orientation },
    Panel { orientation: Orientation, sizes: Option<Vec<i32>> },
    Workspace { kind: WorkspaceKind, group: u32, use_toolbar: bool },
    /// One titled tab group of a workspace
    Page { title: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Container {
    pub id: ContainerId,
    pub name: Option<String>,
    pub kind: ContainerKind,
    pub parent: Option<ContainerId>,
    pub children: Vec<ContainerId>,
    pub hints: SizeHints,
    /// Stretch weight inside a parent box
    pub stretch: u32,
    /// Plugin views attached to a workspace, in attach order
    pub views: Vec<String>,
}

impl Container {
    pub fn is_workspace(&self) -> bool {
        matches!(self.kind, ContainerKind::Workspace { .. })
    }

    pub fn group(&self) -> Option<u32> {
        match self.kind {
            ContainerKind::Workspace { group, .. } => Some(group),
            _ => None,
        }
    }
}

/// Result of compiling a layout tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledLayout {
    containers: Vec<Container>,
    toplevels: Vec<ContainerId>,
    index: HashMap<String, ContainerId>,
}

impl CompiledLayout {
    pub fn get(&self, id: ContainerId) -> Option<&Container> {
        self.containers.get(id.0)
    }

    pub fn by_name(&self, name: &str) -> Option<&Container> {
        self.index.get(name).and_then(|&id| self.get(id))
    }

    /// Workspace container with this exact name.
    pub fn workspace(&self, name: &str) -> Option<&Container> {
        self.by_name(name).filter(|c| c.is_workspace())
    }

    pub fn workspaces(&self) -> impl Iterator<Item = &Container> {
        self.containers.iter().filter(|c| c.is_workspace())
    }

    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn toplevels(&self) -> &[ContainerId] {
        &self.toplevels
    }

    /// Pick the workspace for a view: the named workspace if it exists,
    /// else the first workspace (in compile order) of `group`.
    pub fn place(&self, workspace: &str, group: Option<u32>) -> Result<ContainerId, LayoutError> {
        if !workspace.is_empty() {
            if let Some(ws) = self.workspace(workspace) {
                return Ok(ws.id);
            }
        }
        if let Some(group) = group {
            if let Some(ws) = self.workspaces().find(|c| c.group() == Some(group)) {
                tracing::debug!(
                    "No workspace '{}', using '{}' from group {}",
                    workspace,
                    ws.name.as_deref().unwrap_or_default(),
                    group
                );
                return Ok(ws.id);
            }
        }
        Err(LayoutError::Unplaceable {
            workspace: workspace.to_string(),
            group,
        })
    }

    /// Record a plugin view as hosted by a workspace.
    pub fn attach_view(&mut self, id: ContainerId, view: impl Into<String>) {
        if let Some(container) = self.containers.get_mut(id.0) {
            container.views.push(view.into());
        }
    }

    pub fn detach_view(&mut self, id: ContainerId, view: &str) {
        if let Some(container) = self.containers.get_mut(id.0) {
            container.views.retain(|v| v != view);
        }
    }

    /// Update geometry reported by the toolkit.
    pub fn set_hints(&mut self, id: ContainerId, hints: SizeHints) {
        if let Some(container) = self.containers.get_mut(id.0) {
            container.hints = hints;
        }
    }

    /// Turn the compiled hierarchy back into a tree, current geometry
    /// included.
    pub fn record(&self) -> LayoutNode {
        LayoutNode::seq(self.toplevels.iter().map(|&id| self.record_node(id)).collect())
    }

    fn record_node(&self, id: ContainerId) -> LayoutNode {
        let c = &self.containers[id.0];
        match &c.kind {
            ContainerKind::Box { orientation } => LayoutNode::Box {
                orientation: *orientation,
                name: c.name.clone(),
                hints: c.hints,
                children: c
                    .children
                    .iter()
                    .map(|&child| BoxItem {
                        node: self.record_node(child),
                        stretch: self.containers[child.0].stretch,
                    })
                    .collect(),
            },
            ContainerKind::Panel { orientation, sizes } => LayoutNode::Panel {
                orientation: *orientation,
                name: c.name.clone(),
                hints: c.hints,
                sizes: sizes.clone(),
                children: c.children.iter().map(|&child| self.record_node(child)).collect(),
            },
            ContainerKind::Workspace { kind, group, use_toolbar } => LayoutNode::Workspace {
                name: c.name.clone().unwrap_or_default(),
                kind: *kind,
                group: *group,
                hints: c.hints,
                use_toolbar: *use_toolbar,
                tabs: c
                    .children
                    .iter()
                    .filter_map(|&page| self.record_page(page))
                    .collect(),
            },
            // Pages are recorded through their workspace
            ContainerKind::Page { .. } => LayoutNode::seq(
                c.children.iter().map(|&child| self.record_node(child)).collect(),
            ),
        }
    }

    fn record_page(&self, id: ContainerId) -> Option<TabGroup> {
        let page = &self.containers[id.0];
        let ContainerKind::Page { title } = &page.kind else {
            return None;
        };
        let node = match page.children.as_slice() {
            [only] => self.record_node(*only),
            many => LayoutNode::seq(many.iter().map(|&child| self.record_node(child)).collect()),
        };
        Some(TabGroup {
            title: title.clone(),
            node,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Compiler
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LayoutCompiler {
    tree: LayoutNode,
    saved: Option<PathBuf>,
    max_depth: usize,
}

impl LayoutCompiler {
    pub fn new(tree: LayoutNode) -> Self {
        Self {
            tree,
            saved: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Merge geometry from a saved layout file, if it is usable.
    pub fn with_saved_layout(mut self, path: Option<PathBuf>) -> Self {
        self.saved = path;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// The tree that will actually be compiled, after the saved-layout merge.
    pub fn effective_tree(&self) -> LayoutNode {
        persist::resolve_effective(&self.tree, self.saved.as_deref())
    }

    pub fn compile(&self) -> Result<CompiledLayout, LayoutError> {
        let tree = self.effective_tree();
        let mut builder = Builder {
            layout: CompiledLayout {
                containers: Vec::new(),
                toplevels: Vec::new(),
                index: HashMap::new(),
            },
            max_depth: self.max_depth,
        };
        builder.visit(&tree, None, 0, 0)?;
        tracing::debug!(
            "Compiled layout: {} containers, {} workspaces",
            builder.layout.containers.len(),
            builder.layout.workspaces().count()
        );
        Ok(builder.layout)
    }
}

struct Builder {
    layout: CompiledLayout,
    max_depth: usize,
}

impl Builder {
    fn visit(
        &mut self,
        node: &LayoutNode,
        parent: Option<ContainerId>,
        stretch: u32,
        depth: usize,
    ) -> Result<(), LayoutError> {
        if depth > self.max_depth {
            return Err(LayoutError::TooDeep(self.max_depth));
        }

        match node {
            LayoutNode::Seq { children } => {
                for child in children {
                    self.visit(child, parent, stretch, depth + 1)?;
                }
            }
            LayoutNode::Box {
                orientation,
                name,
                hints,
                children,
            } => {
                let kind = ContainerKind::Box {
                    orientation: *orientation,
                };
                let id = self.add(name.clone(), kind, parent, *hints, stretch)?;
                for item in children {
                    self.visit(&item.node, Some(id), item.stretch, depth + 1)?;
                }
            }
            LayoutNode::Panel {
                orientation,
                name,
                hints,
                sizes,
                children,
            } => {
                if children.len() < 2 {
                    return Err(LayoutError::PanelTooSmall {
                        name: name.clone().unwrap_or_else(|| "<unnamed>".to_string()),
                        regions: children.len(),
                    });
                }
                let kind = ContainerKind::Panel {
                    orientation: *orientation,
                    sizes: sizes.clone(),
                };
                let id = self.add(name.clone(), kind, parent, *hints, stretch)?;
                for child in children {
                    self.visit(child, Some(id), 0, depth + 1)?;
                }
            }
            LayoutNode::Workspace {
                name,
                kind,
                group,
                hints,
                use_toolbar,
                tabs,
            } => {
                if name.trim().is_empty() {
                    return Err(LayoutError::EmptyWorkspaceName);
                }
                let ws_kind = ContainerKind::Workspace {
                    kind: *kind,
                    group: *group,
                    use_toolbar: *use_toolbar,
                };
                let id = self.add(Some(name.clone()), ws_kind, parent, *hints, stretch)?;
                for tab in tabs {
                    let page_kind = ContainerKind::Page {
                        title: tab.title.clone(),
                    };
                    let page = self.add(None, page_kind, Some(id), SizeHints::default(), 0)?;
                    self.visit(&tab.node, Some(page), 0, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    fn add(
        &mut self,
        name: Option<String>,
        kind: ContainerKind,
        parent: Option<ContainerId>,
        hints: SizeHints,
        stretch: u32,
    ) -> Result<ContainerId, LayoutError> {
        let id = ContainerId(self.layout.containers.len());
        let name = name.filter(|n| !n.is_empty());
        if let Some(name) = &name {
            if self.layout.index.contains_key(name) {
                return Err(LayoutError::DuplicateName(name.clone()));
            }
            self.layout.index.insert(name.clone(), id);
        }

        self.layout.containers.push(Container {
            id,
            name,
            kind,
            parent,
            children: Vec::new(),
            hints,
            stretch,
            views: Vec::new(),
        });
        match parent {
            Some(parent) => self.layout.containers[parent.0].children.push(id),
            None => self.layout.toplevels.push(id),
        }
        Ok(id)
    }
}

/// Kind of the tree node a container was compiled from.
pub fn node_kind(container: &Container) -> Option<NodeKind> {
    match container.kind {
        ContainerKind::Box { .. } => Some(NodeKind::Box),
        ContainerKind::Panel { .. } => Some(NodeKind::Panel),
        ContainerKind::Workspace { .. } => Some(NodeKind::Workspace),
        ContainerKind::Page { .. } => None,
    }
}
