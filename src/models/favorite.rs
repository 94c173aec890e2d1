use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Product,
    Activity,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Product => "product",
            ItemType::Activity => "activity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub item_type: ItemType,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteIds {
    #[serde(default)]
    pub products: Vec<i64>,
    #[serde(default)]
    pub activities: Vec<i64>,
}

impl FavoriteIds {
    pub fn of(&self, item_type: ItemType) -> &[i64] {
        match item_type {
            ItemType::Product => &self.products,
            ItemType::Activity => &self.activities,
        }
    }
}
