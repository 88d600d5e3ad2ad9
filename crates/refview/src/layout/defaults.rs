use super::node::{LayoutNode, WorkspaceKind};

/// The viewer's stock window layout.
///
/// Group ids: 1 channel viewers, 2 side panes and dialogs, 3 the info
/// stack, 99 single-row strips under the viewer.
pub fn default_layout() -> LayoutNode {
    use WorkspaceKind::{Stack, Tabs};

    let left = LayoutNode::workspace("left", Tabs, 2)
        .with_size(Some(300), Some(-1))
        .tab(
            "Info",
            LayoutNode::vpanel(None)
                .child(
                    LayoutNode::workspace("uleft", Stack, 3).with_size(None, Some(250)),
                    0,
                )
                .child(
                    LayoutNode::workspace("lleft", Tabs, 3).with_size(None, Some(330)),
                    0,
                ),
        );

    let main = LayoutNode::vbox(Some("main"))
        .with_size(Some(600), None)
        .child(LayoutNode::workspace("channels", Tabs, 1).with_toolbar(), 1)
        .child(LayoutNode::workspace("cbar", Stack, 99), 0)
        .child(LayoutNode::workspace("readout", Stack, 99), 0)
        .child(LayoutNode::workspace("operations", Stack, 99), 0);

    let right = LayoutNode::workspace("right", Tabs, 2)
        .with_size(Some(400), Some(-1))
        .tab("Dialogs", LayoutNode::workspace("dialogs", Tabs, 2));

    let hpnl = LayoutNode::hpanel(Some("hpnl"))
        .child(left, 0)
        .child(main, 0)
        .child(right, 0);

    LayoutNode::seq(vec![
        LayoutNode::vbox(Some("top"))
            .with_size(Some(1400), Some(700))
            .child(LayoutNode::hbox(Some("menu")), 0)
            .child(hpnl, 1)
            .child(
                LayoutNode::workspace("toolbar", Stack, 2).with_size(None, Some(40)),
                0,
            )
            .child(LayoutNode::hbox(Some("status")), 0),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::node::NodeKind;

    #[test]
    fn test_default_layout_workspaces() {
        let tree = default_layout();
        let workspaces: Vec<String> = tree
            .named_nodes()
            .into_iter()
            .filter(|(_, kind)| *kind == NodeKind::Workspace)
            .map(|(name, _)| name)
            .collect();
        assert_eq!(
            workspaces,
            vec![
                "cbar", "channels", "dialogs", "left", "lleft", "operations", "readout",
                "right", "toolbar", "uleft"
            ]
        );
    }
}
