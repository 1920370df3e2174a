//! Per-request preferences.

use serde::{Deserialize, Serialize};

/// Two independent toggles supplied by the API layer with each call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Creating an existing entity is a conflict instead of a no-op.
    pub strict_create: bool,
    /// Checks return itemized grants instead of a boolean.
    pub respond_detail: bool,
}

impl RequestOptions {
    pub const PREFER_CONFLICT: &'static str = "respond-conflict";
    pub const PREFER_DETAIL: &'static str = "respond-detail";

    pub fn strict() -> Self {
        Self {
            strict_create: true,
            ..Self::default()
        }
    }

    pub fn detail() -> Self {
        Self {
            respond_detail: true,
            ..Self::default()
        }
    }

    /// Build options from `Prefer` values. Each value may hold several
    /// comma-separated preferences; unknown ones are ignored.
    pub fn from_prefer<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut options = Self::default();
        for pref in values.into_iter().flat_map(|v| v.split(',')) {
            match pref.trim() {
                Self::PREFER_CONFLICT => options.strict_create = true,
                Self::PREFER_DETAIL => options.respond_detail = true,
                _ => {}
            }
        }
        options
    }
}
