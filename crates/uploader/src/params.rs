//! Training parameters sent alongside the video.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const ITERATIONS_FIELD: &str = "iterations";
pub const KEEP_PRE_FIELD: &str = "keep_pre";
pub const KEEP_POST_FIELD: &str = "keep_post";
pub const KEEP_TRAIN_IMAGES_FIELD: &str = "keep_train_images";

/// Optional training parameters.
///
/// Values are forwarded verbatim; the server applies its own defaults and
/// clamping. Only supplied fields become form parts, and an explicitly
/// supplied empty string is sent as an empty part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_pre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_post: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_train_images: Option<String>,
    /// Additional fields, for server builds that accept more options.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl TrainingParams {
    pub fn is_empty(&self) -> bool {
        self.named().all(|(_, v)| v.is_none()) && self.extra.is_empty()
    }

    /// Returns `self` with every field supplied in `overrides` replaced.
    pub fn merged_with(&self, overrides: &TrainingParams) -> TrainingParams {
        let mut extra = self.extra.clone();
        extra.extend(overrides.extra.clone());
        TrainingParams {
            iterations: overrides.iterations.clone().or_else(|| self.iterations.clone()),
            keep_pre: overrides.keep_pre.clone().or_else(|| self.keep_pre.clone()),
            keep_post: overrides.keep_post.clone().or_else(|| self.keep_post.clone()),
            keep_train_images: overrides
                .keep_train_images
                .clone()
                .or_else(|| self.keep_train_images.clone()),
            extra,
        }
    }

    /// Form fields to send. Named fields win over `extra` entries with the
    /// same key.
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        let mut fields = self.extra.clone();
        for (key, value) in self.named() {
            if let Some(v) = value {
                fields.insert(key.to_string(), v.clone());
            }
        }
        fields
    }

    fn named(&self) -> impl Iterator<Item = (&'static str, &Option<String>)> {
        [
            (ITERATIONS_FIELD, &self.iterations),
            (KEEP_PRE_FIELD, &self.keep_pre),
            (KEEP_POST_FIELD, &self.keep_post),
            (KEEP_TRAIN_IMAGES_FIELD, &self.keep_train_images),
        ]
        .into_iter()
    }
}
