//! External AV tooling: discovery, probing and remuxing.

pub mod command;
pub mod probe;
pub mod remux;
pub mod tools;

pub use command::{ToolCommand, ToolOutput};
pub use remux::{FfmpegRemuxer, Remuxer};
pub use tools::ToolRegistry;
