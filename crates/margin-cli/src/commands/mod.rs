pub mod add;
pub mod common;
pub mod completions;
pub mod delete;
pub mod export;
pub mod list;
pub mod note;
pub mod render;
pub mod sync;
