//! Category model

use serde::{Deserialize, Serialize};

use super::Food;

/// A named, ordered group of foods. Insertion order is display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(alias = "category_name")]
    pub(crate) name: String,
    #[serde(default, alias = "food")]
    pub(crate) foods: Vec<Food>,
}

impl Category {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            foods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn foods(&self) -> &[Food] {
        &self.foods
    }

    pub fn food(&self, name: &str) -> Option<&Food> {
        self.foods.iter().find(|food| food.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.foods.is_empty()
    }
}
