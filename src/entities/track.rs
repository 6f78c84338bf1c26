//! Track - an ordered, typed lane of clips.
//!
//! `order` determines stacking: ascending order is rendered first, so the
//! highest-order visible track ends up on top. Hidden tracks contribute no
//! active clips; muted tracks contribute no audio.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of clips a track carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
    Text,
}

/// A lane on the timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub kind: TrackKind,
    /// Stacking order, ascending = rendered first (bottom of the stack).
    pub order: i32,
    /// Hidden tracks contribute no active clips.
    #[serde(default)]
    pub hidden: bool,
    /// Muted tracks contribute no audio.
    #[serde(default)]
    pub muted: bool,
    /// Locked tracks reject edits (enforced by the editing layer, not here).
    #[serde(default)]
    pub locked: bool,
    /// User-visible track name.
    pub name: String,
}

impl Track {
    pub fn new(kind: TrackKind, order: i32, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            order,
            hidden: false,
            muted: false,
            locked: false,
            name: name.into(),
        }
    }
}
