pub mod endpoint;
pub mod render;
pub mod store;
pub mod style;

pub use endpoint::{HostEndpoint, ParseHostError};
pub use render::{render, render_snapshot, strip_ansi, OutputFormat, RenderError, RenderOptions};
pub use store::{HostStatusStore, StatusEntry};
