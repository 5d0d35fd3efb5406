//! Image source with broken-asset fallback.
//!
//! An image whose path could not be resolved shows a broken-image
//! placeholder instead of an empty `src`.

use serde::{Deserialize, Serialize};

/// Shown when an image has no usable path.
pub const BROKEN_IMAGE_PLACEHOLDER: &str = "data:image/svg+xml,studio-broken-image-placeholder";

/// Settled state of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageState {
    /// The path resolved.
    Loaded,
    /// Nothing to load.
    Broken,
}

/// Which `src` to display for an image path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    path: String,
    state: ImageState,
}

impl ImageSource {
    /// Loaded when there is a path, broken when there is none.
    #[must_use]
    pub fn settled(path: Option<String>) -> Self {
        match path {
            Some(path) => Self {
                path,
                state: ImageState::Loaded,
            },
            None => {
                tracing::debug!("Image has no source, using broken-image placeholder");
                Self {
                    path: String::new(),
                    state: ImageState::Broken,
                }
            }
        }
    }

    /// Requested path; empty when broken.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ImageState {
        self.state
    }

    /// The `src` to display.
    #[must_use]
    pub fn src(&self) -> &str {
        match self.state {
            ImageState::Loaded => &self.path,
            ImageState::Broken => BROKEN_IMAGE_PLACEHOLDER,
        }
    }
}
