//! CLI command implementations

mod config;
mod info;
mod list;
mod share;

pub use config::{config, ConfigArgs};
pub use info::info;
pub use list::{list_sources, ListArgs};
pub use share::{share, ShareArgs};
