//! Refview - extensible image-viewer shell
//!
//! This crate provides the viewer's orchestration core:
//! - Declarative window layouts compiled into workspaces
//! - A plugin registry with defaults, discovery and per-channel instances
//! - Channels holding the images loaded into each viewer
//! - The startup state machine and the single-threaded event loop
//!
//! Background work runs on the `refview_tasks` pool.

// Re-export the task pool
pub use refview_tasks;

// Toolkit seam, geometry, image I/O and optional subsystems
pub mod backend;

// Channel management
pub mod channel;

// Command-line interface
pub mod cli;

// Settings and the user hook file
pub mod config;

// File argument expansion
pub mod files;

// Window layout
pub mod layout;

// Plugin system
pub mod plugin;

// Startup and event loop
pub mod shell;

pub mod types;

pub use types::{Error, Result};
