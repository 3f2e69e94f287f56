use chrono::{DateTime, Local, Utc};
use fodmap_core::sync::{SkipReason, SyncOutcome};
use fodmap_core::{Document, Food};
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct FoodListItem {
    pub category: String,
    pub name: String,
    pub total_count: u32,
    pub tolerated_count: u32,
    pub rating: f64,
    pub safe_percent: u32,
    pub last_modified: Option<String>,
}

pub fn food_to_list_item(category: &str, food: &Food) -> FoodListItem {
    FoodListItem {
        category: category.to_string(),
        name: food.name().to_string(),
        total_count: food.total_count(),
        tolerated_count: food.tolerated_count(),
        rating: food.rating(),
        safe_percent: food.safe_percent(),
        last_modified: food.last_modified().map(|stamp| stamp.to_rfc3339()),
    }
}

/// Foods in display order, optionally restricted to one category.
pub fn collect_food_items(
    document: &Document,
    category: Option<&str>,
) -> Result<Vec<FoodListItem>, CliError> {
    if let Some(name) = category {
        let category = document
            .category(name)
            .ok_or_else(|| CliError::CategoryNotFound(name.to_string()))?;
        return Ok(category
            .foods()
            .iter()
            .map(|food| food_to_list_item(category.name(), food))
            .collect());
    }

    Ok(document
        .categories()
        .iter()
        .flat_map(|category| {
            category
                .foods()
                .iter()
                .map(|food| food_to_list_item(category.name(), food))
        })
        .collect())
}

pub fn format_food_line(food: &Food) -> String {
    if food.total_count() == 0 {
        return format!("{:<24}  {}  not tried yet", food.name(), food.star_bar());
    }
    format!(
        "{:<24}  {}  {:>3}% safe ({}/{})",
        food.name(),
        food.star_bar(),
        food.safe_percent(),
        food.tolerated_count(),
        food.total_count()
    )
}

/// Category headers followed by indented food lines.
pub fn format_document_lines(document: &Document, category: Option<&str>) -> Result<Vec<String>, CliError> {
    let categories = match category {
        Some(name) => vec![document
            .category(name)
            .ok_or_else(|| CliError::CategoryNotFound(name.to_string()))?],
        None => document.categories().iter().collect(),
    };

    let mut lines = Vec::new();
    for category in categories {
        lines.push(category.name().to_string());
        if category.is_empty() {
            lines.push("  (no foods)".to_string());
        }
        for food in category.foods() {
            lines.push(format!("  {}", format_food_line(food)));
        }
    }
    Ok(lines)
}

pub fn describe_outcome(outcome: SyncOutcome) -> &'static str {
    match outcome {
        SyncOutcome::Skipped(SkipReason::NotConnected) => "Sync skipped: not connected to Google Drive",
        SyncOutcome::Skipped(SkipReason::Offline) => "Sync skipped: offline",
        SyncOutcome::Skipped(SkipReason::InProgress) => "Sync skipped: another sync is running",
        SyncOutcome::Bootstrapped => "Created myFodmap.json on Google Drive from local data",
        SyncOutcome::NothingToSync => "Nothing to sync yet",
        SyncOutcome::Pulled => "Pulled newer data from Google Drive",
        SyncOutcome::Pushed => "Pushed local changes to Google Drive",
        SyncOutcome::UpToDate => "Already up to date",
    }
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
