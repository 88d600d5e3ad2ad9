//! Saved layout files
//!
//! The saved layout is the JSON form of a recorded tree. On load only its
//! geometry is used; topology always comes from the default tree.

use std::collections::HashMap;
use std::path::Path;

use super::compiler::LayoutError;
use super::node::{LayoutNode, SizeHints};

pub fn load_saved_layout(path: &Path) -> Result<LayoutNode, LayoutError> {
    let content = std::fs::read_to_string(path).map_err(|e| LayoutError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| LayoutError::Json(e.to_string()))
}

pub fn save_layout(path: &Path, tree: &LayoutNode) -> Result<(), LayoutError> {
    let io_err = |e: std::io::Error| LayoutError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    let json = serde_json::to_string_pretty(tree).map_err(|e| LayoutError::Json(e.to_string()))?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(io_err)?;
    }
    std::fs::write(path, json).map_err(io_err)?;
    tracing::debug!("Saved layout to {}", path.display());
    Ok(())
}

/// Geometry saved for one named node
#[derive(Debug, Clone, Default)]
struct SavedGeometry {
    hints: SizeHints,
    sizes: Option<Vec<i32>>,
}

/// Apply the saved tree's geometry to the default tree, node by node name.
///
/// Fails when the two trees do not have the same named nodes.
pub fn merge(default: &LayoutNode, saved: &LayoutNode) -> Result<LayoutNode, LayoutError> {
    let expected = default.named_nodes();
    let found = saved.named_nodes();
    if expected != found {
        let missing = expected.difference(&found).count();
        let extra = found.difference(&expected).count();
        return Err(LayoutError::Incompatible(format!(
            "{} node(s) missing, {} unexpected",
            missing, extra
        )));
    }

    let mut geometry = HashMap::new();
    collect_geometry(saved, &mut geometry);

    let mut merged = default.clone();
    apply_geometry(&mut merged, &geometry);
    Ok(merged)
}

fn collect_geometry(node: &LayoutNode, out: &mut HashMap<String, SavedGeometry>) {
    if let Some(name) = node.name() {
        let sizes = match node {
            LayoutNode::Panel { sizes, .. } => sizes.clone(),
            _ => None,
        };
        out.insert(
            name.to_string(),
            SavedGeometry {
                hints: node.hints(),
                sizes,
            },
        );
    }
    for child in node.children() {
        collect_geometry(child, out);
    }
}

fn apply_geometry(node: &mut LayoutNode, geometry: &HashMap<String, SavedGeometry>) {
    if let Some(saved) = node.name().and_then(|name| geometry.get(name)).cloned() {
        if let Some(hints) = node.hints_mut() {
            *hints = saved.hints;
        }
        if let LayoutNode::Panel { sizes, .. } = node {
            if saved.sizes.is_some() {
                *sizes = saved.sizes;
            }
        }
    }
    for child in node.children_mut() {
        apply_geometry(child, geometry);
    }
}

/// The tree to compile: the default with saved geometry merged in, or the
/// default alone when the saved file is missing, unreadable or does not fit.
pub fn resolve_effective(default: &LayoutNode, saved: Option<&Path>) -> LayoutNode {
    let Some(path) = saved else {
        return default.clone();
    };
    if !path.exists() {
        tracing::debug!("No saved layout at {}", path.display());
        return default.clone();
    }

    match load_saved_layout(path).and_then(|saved| merge(default, &saved)) {
        Ok(merged) => {
            tracing::debug!("Restored layout geometry from {}", path.display());
            merged
        }
        Err(e) => {
            tracing::warn!("Ignoring saved layout {}: {}", path.display(), e);
            default.clone()
        }
    }
}
