//! margin-core - Core library for Margin
//!
//! This crate contains the anchor model, the document tree the anchors are
//! resolved against, both highlight renderers, and the local-first storage
//! layer shared by every Margin client.

pub mod anchor;
pub mod config;
pub mod db;
pub mod device;
pub mod document;
pub mod error;
pub mod export;
pub mod models;
pub mod render;
pub mod store;
pub mod util;

pub use error::{Error, Result};
pub use models::{Anchor, Highlight, HighlightColor, HighlightId, TextQuote};
