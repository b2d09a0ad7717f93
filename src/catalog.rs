//! Static item catalog.
//!
//! The catalog is defined by the game, not by us: the pipeline reads it and
//! never writes it back. It is either loaded from a JSON file or synthesized
//! as `item0..itemN`, matching the keys of the bulk market preview.

use std::{collections::HashSet, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of tradeable items in the game's default catalog
pub const DEFAULT_ITEM_COUNT: i32 = 165;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i32,
    pub name: String,
    #[serde(rename = "imageUrl", alias = "image_url")]
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    items: Vec<Item>,
}

impl Catalog {
    /// Catalog of `count` items with ids `0..count` and placeholder names.
    pub fn numbered(count: i32) -> Self {
        let items = (0..count.max(0))
            .map(|id| Item {
                id,
                name: format!("Item {}", id),
                image_url: format!("/assets/game/items/{}.webp", id),
            })
            .collect();
        Self { items }
    }

    /// Parse a JSON array of items, keeping file order. Duplicate ids are rejected.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let items: Vec<Item> =
            serde_json::from_str(json).map_err(|e| ConfigError::Catalog(e.to_string()))?;

        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.id) {
                return Err(ConfigError::Catalog(format!("duplicate item id {}", item.id)));
            }
        }

        Ok(Self { items })
    }

    /// Load from `path`, or fall back to the default numbered catalog.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let json = fs::read_to_string(path).map_err(|e| {
                    ConfigError::Catalog(format!("{}: {}", path.display(), e))
                })?;
                let catalog = Self::from_json(&json)?;
                tracing::info!(path = %path.display(), items = catalog.len(), "Loaded item catalog");
                Ok(catalog)
            }
            None => Ok(Self::numbered(DEFAULT_ITEM_COUNT)),
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, id: i32) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
