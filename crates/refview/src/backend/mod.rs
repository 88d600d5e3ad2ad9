// Backend - toolkit selection, window geometry, I/O and optional subsystems

pub mod geometry;
pub mod io;
pub mod subsystems;
pub mod toolkit;

pub use geometry::{Geometry, ParseGeometryError};
pub use io::{FileProbe, ImageInfo, ImageOpener, split_extension};
pub use subsystems::{Accelerator, SubsystemOverrides, Subsystems};
pub use toolkit::{HeadlessState, HeadlessToolkit, Toolkit, ToolkitRegistry};
