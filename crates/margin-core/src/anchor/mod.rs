//! Anchor construction, resolution and self-healing.

mod builder;
mod heal;
mod resolver;
mod text_index;

pub use builder::{locator_for, AnchorBuilder};
pub use heal::{
    heal_channel, HealRequest, HealSender, HealTracker, HealWorker, MaterialEpoch,
};
pub use resolver::{AnchorResolver, MatchKind, Resolution};
pub use text_index::TextIndex;
