// Layout - declarative window layout, compilation and persistence

pub mod compiler;
pub mod defaults;
pub mod node;
pub mod persist;

pub use compiler::{
    CompiledLayout, Container, ContainerId, ContainerKind, DEFAULT_MAX_DEPTH, LayoutCompiler,
    LayoutError,
};
pub use defaults::default_layout;
pub use node::{BoxItem, LayoutNode, NodeKind, Orientation, SizeHints, TabGroup, WorkspaceKind};
pub use persist::{load_saved_layout, merge, resolve_effective, save_layout};
