//! Pages, assets and render parameters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::instance::InstanceId;
use crate::value::AssetId;

/// Unique identifier of a page.
pub type PageId = String;

/// A page of the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Unique identifier.
    pub id: PageId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// URL path; the home page uses `""`.
    pub path: String,
    /// Root instance rendered for this page.
    pub root_instance_id: InstanceId,
    /// Optional section anchor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Page {
    /// Create a page.
    #[must_use]
    pub fn new(
        id: impl Into<PageId>,
        path: impl Into<String>,
        root_instance_id: impl Into<InstanceId>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            path: path.into(),
            root_instance_id: root_instance_id.into(),
            hash: None,
        }
    }
}

/// The home page plus every other page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pages {
    /// The home page.
    pub home_page: Page,
    /// Remaining pages.
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl Pages {
    /// Create a page set with only a home page.
    #[must_use]
    pub fn new(home_page: Page) -> Self {
        Self {
            home_page,
            pages: Vec::new(),
        }
    }

    /// Iterate over all pages, home page first.
    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        std::iter::once(&self.home_page).chain(self.pages.iter())
    }

    /// Pages keyed by id.
    #[must_use]
    pub fn by_id(&self) -> HashMap<PageId, Page> {
        self.iter().map(|page| (page.id.clone(), page.clone())).collect()
    }

    /// Find a page by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Page> {
        self.iter().find(|page| page.id == id)
    }
}

/// Kind of an uploaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Raster or vector image.
    Image,
    /// Web font.
    Font,
    /// Any other file.
    File,
}

/// An uploaded asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Unique identifier.
    pub id: AssetId,
    /// Stored file name.
    pub name: String,
    /// Asset kind.
    pub kind: AssetKind,
}

/// Pass-through render parameters used to rewrite asset URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Base URL for image assets (image optimizer endpoint).
    #[serde(default)]
    pub image_base_url: String,
    /// Base URL for every other asset.
    #[serde(default)]
    pub asset_base_url: String,
}

impl Params {
    /// Create parameters.
    #[must_use]
    pub fn new(image_base_url: impl Into<String>, asset_base_url: impl Into<String>) -> Self {
        Self {
            image_base_url: image_base_url.into(),
            asset_base_url: asset_base_url.into(),
        }
    }

    /// Rewrite the URL of an asset.
    #[must_use]
    pub fn asset_url(&self, asset: &Asset) -> String {
        let base = match asset.kind {
            AssetKind::Image => &self.image_base_url,
            AssetKind::Font | AssetKind::File => &self.asset_base_url,
        };
        format!("{base}{}", asset.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_lookup_includes_home() {
        let mut pages = Pages::new(Page::new("home", "", "root"));
        pages.pages.push(Page::new("about", "/about", "about-root"));
        assert_eq!(pages.get("home").map(|p| p.path.as_str()), Some(""));
        assert_eq!(pages.by_id().len(), 2);
        assert!(pages.get("missing").is_none());
    }

    #[test]
    fn test_asset_url_by_kind() {
        let params = Params::new("/cgi/image/", "/cgi/asset/");
        let image = Asset {
            id: "a".to_string(),
            name: "hero.png".to_string(),
            kind: AssetKind::Image,
        };
        let font = Asset {
            id: "b".to_string(),
            name: "inter.woff2".to_string(),
            kind: AssetKind::Font,
        };
        assert_eq!(params.asset_url(&image), "/cgi/image/hero.png");
        assert_eq!(params.asset_url(&font), "/cgi/asset/inter.woff2");
    }
}
