//! Listing records and their enumerations

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Produce category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Vegetables,
    Fruits,
    Grains,
    Dairy,
    Poultry,
    Livestock,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Vegetables,
        Category::Fruits,
        Category::Grains,
        Category::Dairy,
        Category::Poultry,
        Category::Livestock,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Vegetables => "Vegetables",
            Category::Fruits => "Fruits",
            Category::Grains => "Grains",
            Category::Dairy => "Dairy",
            Category::Poultry => "Poultry",
            Category::Livestock => "Livestock",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

/// Unit a quantity and price refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Kg,
    G,
    Ton,
    Piece,
    Dozen,
    Crate,
    Bag,
    Liter,
}

impl Unit {
    pub const ALL: [Unit; 8] = [
        Unit::Kg,
        Unit::G,
        Unit::Ton,
        Unit::Piece,
        Unit::Dozen,
        Unit::Crate,
        Unit::Bag,
        Unit::Liter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Kg => "kg",
            Unit::G => "g",
            Unit::Ton => "ton",
            Unit::Piece => "piece",
            Unit::Dozen => "dozen",
            Unit::Crate => "crate",
            Unit::Bag => "bag",
            Unit::Liter => "liter",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::ALL
            .into_iter()
            .find(|u| u.as_str() == s)
            .ok_or_else(|| format!("unknown unit: {}", s))
    }
}

/// Listing visibility; only `Available` shows in the marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Available,
    Unavailable,
    Sold,
    #[serde(other)]
    Other,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Available => "available",
            ListingStatus::Unavailable => "unavailable",
            ListingStatus::Sold => "sold",
            ListingStatus::Other => "other",
        }
    }
}

/// Public contact fields of the owning farmer, joined from `profiles`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerContact {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub farm_name: Option<String>,
    pub location: Option<String>,
    pub phone_number: Option<String>,
}

impl SellerContact {
    /// Farm name when set, otherwise the person's name
    pub fn display_name(&self) -> Option<&str> {
        self.farm_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.full_name.as_deref())
    }

    pub fn has_phone(&self) -> bool {
        self.phone_number
            .as_deref()
            .map(|p| !p.trim().is_empty())
            .unwrap_or(false)
    }
}

/// A product listing row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub quantity: f64,
    pub unit: Unit,
    pub price_per_unit: f64,
    pub location: String,
    #[serde(default)]
    pub availability_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub images: Vec<String>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Present when the query embedded the owner's profile
    #[serde(default, rename = "profiles", skip_serializing_if = "Option::is_none")]
    pub seller: Option<SellerContact>,
}

impl Listing {
    pub fn is_available(&self) -> bool {
        self.status == ListingStatus::Available
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
