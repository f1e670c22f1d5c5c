//! Map dashboard and embedded-notebook demo pages.
//!
//! The core is [`handler::MapHandler`]: one UI action in, at most one
//! rendered map document out.

pub mod basemap;
pub mod cli;
pub mod config;
pub mod error;
pub mod handler;
pub mod map;
pub mod models;
pub mod notebook;
pub mod render;
pub mod server;
pub mod template_engine;
pub mod upload;
