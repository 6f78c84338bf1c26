//! MediaAsset - immutable media reference resolved by clips.
//!
//! Assets are read-only from the preview core's perspective: the core looks
//! them up by id, reads the url and intrinsic dimensions, and never mutates
//! or deletes them. Asset CRUD lives outside this crate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Video,
    Audio,
    Image,
    Text,
}

/// Media referenced by clips.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: Uuid,
    pub kind: AssetKind,
    /// Source location. For file-backed providers this is a path.
    pub url: String,
    /// Display name, also used by the text-overlay stand-in.
    pub name: String,
    /// Intrinsic pixel width, when known.
    #[serde(default)]
    pub width: Option<u32>,
    /// Intrinsic pixel height, when known.
    #[serde(default)]
    pub height: Option<u32>,
    /// Intrinsic duration in seconds, when known.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl MediaAsset {
    pub fn new(kind: AssetKind, url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            url: url.into(),
            name: name.into(),
            width: None,
            height: None,
            duration: None,
        }
    }

    /// Intrinsic dimensions when both axes are known.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}
