//! CLI command implementations.

mod download;
mod filters;
mod search;

pub use download::cmd_download;
pub use filters::cmd_filters;
pub use search::cmd_search;
