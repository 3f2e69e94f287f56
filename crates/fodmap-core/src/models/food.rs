//! Food model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const MAX_RATING: f64 = 5.0;
const STAR_COUNT: u32 = 5;

/// Result of one logged consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Tolerated,
    Reaction,
}

/// Derived 0.0-5.0 rating, rounded to 3 decimals. Zero when never logged.
#[must_use]
pub fn compute_rating(tolerated_count: u32, total_count: u32) -> f64 {
    if total_count == 0 {
        return 0.0;
    }
    let ratio = f64::from(tolerated_count) / f64::from(total_count);
    (ratio * MAX_RATING * 1000.0).round() / 1000.0
}

/// A tracked food. Counts are only changed through methods that keep
/// `tolerated_count <= total_count` and recompute the rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FoodRecord", into = "FoodRecord")]
pub struct Food {
    name: String,
    total_count: u32,
    tolerated_count: u32,
    rating: f64,
    last_modified: Option<DateTime<Utc>>,
}

impl Food {
    /// Create a food that has never been logged.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total_count: 0,
            tolerated_count: 0,
            rating: 0.0,
            last_modified: None,
        }
    }

    /// Build a food with explicit counts, rejecting `tolerated > total`.
    pub fn with_counts(
        name: impl Into<String>,
        total_count: u32,
        tolerated_count: u32,
    ) -> Result<Self, ValidationError> {
        let mut food = Self::new(name);
        food.apply_counts(total_count, tolerated_count)?;
        Ok(food)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn total_count(&self) -> u32 {
        self.total_count
    }

    pub const fn tolerated_count(&self) -> u32 {
        self.tolerated_count
    }

    pub const fn rating(&self) -> f64 {
        self.rating
    }

    pub const fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// Percentage of logged outcomes that were tolerated, rounded.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn safe_percent(&self) -> u32 {
        // Bounded to 0..=100 by the count invariant.
        let total = self.total_count.max(1);
        (f64::from(self.tolerated_count) / f64::from(total) * 100.0).round() as u32
    }

    /// Five-glyph bar: full stars, a dim star for a partial step, empty stars.
    #[must_use]
    pub fn star_bar(&self) -> String {
        (1..=STAR_COUNT)
            .map(|step| {
                let step = f64::from(step);
                if self.rating >= step {
                    '★'
                } else if self.rating > step - 1.0 {
                    '✫'
                } else {
                    '☆'
                }
            })
            .collect()
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn record(
        &mut self,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let total = self
            .total_count
            .checked_add(1)
            .ok_or_else(|| ValidationError::CountOverflow(self.name.clone()))?;
        let tolerated = match outcome {
            Outcome::Tolerated => self.tolerated_count + 1,
            Outcome::Reaction => self.tolerated_count,
        };
        self.apply_counts(total, tolerated)?;
        self.last_modified = Some(now);
        Ok(())
    }

    pub(crate) fn set_counts(
        &mut self,
        total_count: u32,
        tolerated_count: u32,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        self.apply_counts(total_count, tolerated_count)?;
        self.last_modified = Some(now);
        Ok(())
    }

    fn apply_counts(&mut self, total_count: u32, tolerated_count: u32) -> Result<(), ValidationError> {
        if tolerated_count > total_count {
            return Err(ValidationError::ToleratedExceedsTotal {
                tolerated: tolerated_count,
                total: total_count,
            });
        }
        self.total_count = total_count;
        self.tolerated_count = tolerated_count;
        self.rating = compute_rating(tolerated_count, total_count);
        Ok(())
    }
}

/// Wire shape of a food. Also accepts the legacy snake_case field names.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FoodRecord {
    #[serde(alias = "food_name")]
    name: String,
    #[serde(default, alias = "food_count")]
    total_count: u32,
    #[serde(default, alias = "food_no_lactose_count")]
    tolerated_count: u32,
    #[serde(default, alias = "food_star")]
    rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_modified: Option<DateTime<Utc>>,
}

impl TryFrom<FoodRecord> for Food {
    type Error = ValidationError;

    fn try_from(record: FoodRecord) -> Result<Self, Self::Error> {
        let name = record.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        // The stored rating is ignored; it is always derived from the counts.
        let mut food = Self::with_counts(name, record.total_count, record.tolerated_count)?;
        food.last_modified = record.last_modified;
        Ok(food)
    }
}

impl From<Food> for FoodRecord {
    fn from(food: Food) -> Self {
        Self {
            name: food.name,
            total_count: food.total_count,
            tolerated_count: food.tolerated_count,
            rating: food.rating,
            last_modified: food.last_modified,
        }
    }
}
