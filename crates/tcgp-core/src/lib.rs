//! Core domain model and naming rules for the TCG price tracker.

use chrono::{DateTime, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "tcgp-core";

pub const DEFAULT_API_BASE: &str = "https://tcgcsv.com/tcgplayer";
pub const DEFAULT_CATEGORY_ID: u32 = 79;

/// Groups processed by the automatic run mode.
pub const AUTO_GROUPS: [u32; 5] = [
    23405, // Spark of Rebellion
    23488, // Shadows of the Galaxy
    23597, // Twilight of the Republic
    23956, // Jump to Lightspeed
    24279, // Legends of the Force
];

/// One catalog group (a card set) as published by the pricing API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_id: u32,
    pub name: String,
    #[serde(default)]
    pub abbreviation: Option<String>,
    #[serde(default)]
    pub is_supplemental: bool,
    #[serde(default)]
    pub published_on: Option<String>,
    #[serde(default)]
    pub modified_on: Option<String>,
    #[serde(default)]
    pub category_id: Option<u32>,
}

impl Group {
    pub fn new(group_id: u32, name: impl Into<String>) -> Self {
        Self {
            group_id,
            name: name.into(),
            abbreviation: None,
            is_supplemental: false,
            published_on: None,
            modified_on: None,
            category_id: None,
        }
    }

    pub fn display_label(&self) -> String {
        format!("{}_{}", self.group_id, self.name)
    }
}

/// Envelope returned by the `groups` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GroupCatalog {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub total_items: Option<u64>,
    #[serde(default)]
    pub results: Vec<Group>,
}

impl GroupCatalog {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn find(&self, group_id: u32) -> Option<&Group> {
        self.results.iter().find(|g| g.group_id == group_id)
    }
}

/// Replaces every character outside `[A-Za-z0-9]` with `_`.
pub fn sanitize_group_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn price_file_name(group: &Group, date: NaiveDate) -> String {
    format!(
        "{}_{}_Prices_{}.csv",
        group.group_id,
        sanitize_group_name(&group.name),
        date.format("%Y%m%d")
    )
}

pub fn merged_file_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("Prices_{}.csv", at.format("%Y%m%d_%H%M"))
}

pub fn groups_url(api_base: &str, category_id: u32) -> String {
    format!("{}/{}/groups", api_base.trim_end_matches('/'), category_id)
}

pub fn prices_csv_url(api_base: &str, category_id: u32, group_id: u32) -> String {
    format!(
        "{}/{}/{}/ProductsAndPrices.csv",
        api_base.trim_end_matches('/'),
        category_id,
        group_id
    )
}
