use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error as ThisError;

use super::{Rarity, MAX_ITEM_ID_LENGTH};

/// A collectible item that can be drawn from containers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub rarity: Rarity,
    pub category: String,
    /// Overrides the rarity's base price when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_price: Option<u64>,
}

impl Item {
    pub fn base_price(&self) -> u64 {
        self.base_price.unwrap_or_else(|| self.rarity.base_price())
    }
}

/// A purchasable/openable container type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerKind {
    pub id: String,
    pub name: String,
    pub price: u64,
    /// Item categories this container draws from.
    pub categories: Vec<String>,
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum CatalogueError {
    #[error("duplicate id {0}")]
    DuplicateId(String),
    #[error("invalid id {0:?}")]
    InvalidId(String),
    #[error("container {0} has an empty item pool")]
    EmptyPool(String),
    #[error("{0} has zero price")]
    ZeroPrice(String),
}

/// Static item and container definitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalogue {
    pub items: Vec<Item>,
    pub containers: Vec<ContainerKind>,
}

impl Catalogue {
    pub fn validate(&self) -> Result<(), CatalogueError> {
        let mut ids = BTreeSet::new();
        let all_ids = self
            .items
            .iter()
            .map(|item| &item.id)
            .chain(self.containers.iter().map(|container| &container.id));
        for id in all_ids {
            if id.is_empty() || id.len() > MAX_ITEM_ID_LENGTH || id.contains(':') {
                return Err(CatalogueError::InvalidId(id.clone()));
            }
            if !ids.insert(id.as_str()) {
                return Err(CatalogueError::DuplicateId(id.clone()));
            }
        }
        if let Some(item) = self.items.iter().find(|item| item.base_price == Some(0)) {
            return Err(CatalogueError::ZeroPrice(item.id.clone()));
        }
        for container in &self.containers {
            if container.price == 0 {
                return Err(CatalogueError::ZeroPrice(container.id.clone()));
            }
            if self.pool_for(container).is_empty() {
                return Err(CatalogueError::EmptyPool(container.id.clone()));
            }
        }
        Ok(())
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn container(&self, id: &str) -> Option<&ContainerKind> {
        self.containers.iter().find(|container| container.id == id)
    }

    /// Items eligible to be drawn from `container`.
    pub fn pool_for(&self, container: &ContainerKind) -> Vec<&Item> {
        self.items
            .iter()
            .filter(|item| container.categories.iter().any(|c| *c == item.category))
            .collect()
    }
}

fn item(id: &str, name: &str, rarity: Rarity, category: &str) -> Item {
    Item {
        id: id.to_string(),
        name: name.to_string(),
        rarity,
        category: category.to_string(),
        base_price: None,
    }
}

impl Default for Catalogue {
    fn default() -> Self {
        Self {
            items: vec![
                item("paper-star", "Paper Star", Rarity::Common, "badge"),
                item("tin-medal", "Tin Medal", Rarity::Common, "badge"),
                item("bronze-cog", "Bronze Cog", Rarity::Uncommon, "badge"),
                item("silver-wreath", "Silver Wreath", Rarity::Rare, "badge"),
                item("gold-laurel", "Gold Laurel", Rarity::Epic, "badge"),
                item("pixel-cat", "Pixel Cat", Rarity::Common, "meme"),
                item("stonks", "Stonks", Rarity::Uncommon, "meme"),
                item("rare-pepe", "Rare Frog", Rarity::Rare, "meme"),
                item("golden-frog", "Golden Frog", Rarity::Legendary, "meme"),
                item("old-coin", "Old Coin", Rarity::Uncommon, "relic"),
                item("jade-seal", "Jade Seal", Rarity::Rare, "relic"),
                item("dragon-scale", "Dragon Scale", Rarity::Epic, "relic"),
                item("imperial-crown", "Imperial Crown", Rarity::Legendary, "relic"),
            ],
            containers: vec![
                ContainerKind {
                    id: "standard".to_string(),
                    name: "Standard Case".to_string(),
                    price: 100,
                    categories: vec!["badge".to_string(), "meme".to_string()],
                },
                ContainerKind {
                    id: "premium".to_string(),
                    name: "Premium Case".to_string(),
                    price: 350,
                    categories: vec!["meme".to_string(), "relic".to_string()],
                },
            ],
        }
    }
}
