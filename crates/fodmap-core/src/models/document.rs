//! The full user dataset: ordered categories plus the logical clock.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, Food, Outcome};
use crate::error::ValidationError;

/// Next value of a document's logical clock.
///
/// Never goes backwards and always moves forward by at least a millisecond,
/// even when the wall clock stalls or jumps back.
#[must_use]
pub fn next_modified(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(previous) if previous >= now => previous + Duration::milliseconds(1),
        _ => now,
    }
}

/// Categories in display order and the timestamp of the last mutation.
///
/// Food names are unique across the whole document and category names are
/// unique within it. Mutators are crate-private so that every change goes
/// through the local store, which bumps `last_modified` and persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(alias = "food_category")]
    categories: Vec<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_modified: Option<DateTime<Utc>>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub const fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// True when the user has created at least one category.
    pub fn has_data(&self) -> bool {
        !self.categories.is_empty()
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .map(|category| category.name.clone())
            .collect()
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.name == name)
    }

    /// Locate a food anywhere in the document, with its owning category.
    pub fn find_food(&self, name: &str) -> Option<(&Category, &Food)> {
        self.categories
            .iter()
            .find_map(|category| category.food(name).map(|food| (category, food)))
    }

    pub fn food_count(&self) -> usize {
        self.categories
            .iter()
            .map(|category| category.foods.len())
            .sum()
    }

    /// Check the uniqueness invariants of a document built outside the store.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut category_names = HashSet::new();
        let mut food_names = HashSet::new();
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(ValidationError::EmptyName);
            }
            if !category_names.insert(category.name.as_str()) {
                return Err(ValidationError::DuplicateCategory(category.name.clone()));
            }
            for food in &category.foods {
                if !food_names.insert(food.name()) {
                    return Err(ValidationError::DuplicateFood {
                        name: food.name().to_string(),
                        category: category.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_modified = Some(next_modified(self.last_modified, now));
    }

    pub(crate) fn set_last_modified(&mut self, last_modified: Option<DateTime<Utc>>) {
        self.last_modified = last_modified;
    }

    pub(crate) fn add_category(&mut self, name: &str) -> Result<(), ValidationError> {
        let name = required_name(name)?;
        if self.category(&name).is_some() {
            return Err(ValidationError::DuplicateCategory(name));
        }
        self.categories.push(Category::new(name));
        Ok(())
    }

    /// Returns `false` when the new name equals the old one (nothing to do).
    pub(crate) fn rename_category(
        &mut self,
        old_name: &str,
        new_name: &str,
    ) -> Result<bool, ValidationError> {
        let new_name = required_name(new_name)?;
        if old_name == new_name {
            return Ok(false);
        }
        if self.category(&new_name).is_some() {
            return Err(ValidationError::DuplicateCategory(new_name));
        }
        let category = self
            .categories
            .iter_mut()
            .find(|category| category.name == old_name)
            .ok_or_else(|| ValidationError::CategoryNotFound(old_name.to_string()))?;
        category.name = new_name;
        Ok(true)
    }

    pub(crate) fn delete_category(&mut self, name: &str) -> Result<Category, ValidationError> {
        let index = self
            .categories
            .iter()
            .position(|category| category.name == name)
            .ok_or_else(|| ValidationError::CategoryNotFound(name.to_string()))?;
        Ok(self.categories.remove(index))
    }

    pub(crate) fn add_food(&mut self, name: &str, category_name: &str) -> Result<(), ValidationError> {
        let name = required_name(name)?;
        if let Some((owner, _)) = self.find_food(&name) {
            return Err(ValidationError::DuplicateFood {
                category: owner.name.clone(),
                name,
            });
        }
        let category = self
            .categories
            .iter_mut()
            .find(|category| category.name == category_name)
            .ok_or_else(|| ValidationError::CategoryNotFound(category_name.to_string()))?;
        category.foods.push(Food::new(name));
        Ok(())
    }

    /// Returns `false` when the new name equals the old one (nothing to do).
    pub(crate) fn rename_food(&mut self, old_name: &str, new_name: &str) -> Result<bool, ValidationError> {
        let new_name = required_name(new_name)?;
        if old_name == new_name {
            return Ok(false);
        }
        if let Some((owner, _)) = self.find_food(&new_name) {
            return Err(ValidationError::DuplicateFood {
                category: owner.name.clone(),
                name: new_name,
            });
        }
        self.food_mut(old_name)?.rename(new_name);
        Ok(true)
    }

    pub(crate) fn delete_food(&mut self, name: &str) -> Result<Food, ValidationError> {
        for category in &mut self.categories {
            if let Some(index) = category.foods.iter().position(|food| food.name() == name) {
                return Ok(category.foods.remove(index));
            }
        }
        Err(ValidationError::FoodNotFound(name.to_string()))
    }

    pub(crate) fn log_food(
        &mut self,
        name: &str,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        self.food_mut(name)?.record(outcome, now)
    }

    pub(crate) fn update_food_stats(
        &mut self,
        name: &str,
        total_count: u32,
        tolerated_count: u32,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        self.food_mut(name)?
            .set_counts(total_count, tolerated_count, now)
    }

    fn food_mut(&mut self, name: &str) -> Result<&mut Food, ValidationError> {
        self.categories
            .iter_mut()
            .flat_map(|category| category.foods.iter_mut())
            .find(|food| food.name() == name)
            .ok_or_else(|| ValidationError::FoodNotFound(name.to_string()))
    }
}

fn required_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        Err(ValidationError::EmptyName)
    } else {
        Ok(name.to_string())
    }
}
