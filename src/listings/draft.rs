//! Listing drafts as bound to the form, and their validation

use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::listings::types::{Category, Listing, ListingStatus, Unit};
use crate::storage::{ImageFile, MAX_IMAGE_BYTES};

/// Form values for a new or edited listing.
///
/// Numeric fields are kept as the text the user typed; nothing is checked
/// until [`ListingDraft::validate`] runs on submit.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub quantity: String,
    pub unit: String,
    pub price_per_unit: String,
    pub location: String,
    /// `YYYY-MM-DD`
    pub availability_date: String,
    /// Image URLs already attached to the listing
    pub images: Vec<String>,
    /// Files picked but not uploaded yet
    pub staged: Vec<ImageFile>,
}

impl Default for ListingDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            category: String::new(),
            quantity: String::new(),
            unit: String::new(),
            price_per_unit: String::new(),
            location: String::new(),
            availability_date: Utc::now().date_naive().format("%Y-%m-%d").to_string(),
            images: Vec::new(),
            staged: Vec::new(),
        }
    }
}

impl ListingDraft {
    /// Seed a draft from a listing's current values
    pub fn from_listing(listing: &Listing) -> Self {
        Self {
            title: listing.title.clone(),
            description: listing.description.clone(),
            category: listing.category.as_str().to_string(),
            quantity: listing.quantity.to_string(),
            unit: listing.unit.as_str().to_string(),
            price_per_unit: listing.price_per_unit.to_string(),
            location: listing.location.clone(),
            availability_date: listing
                .availability_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            images: listing.images.clone(),
            staged: Vec::new(),
        }
    }

    /// Check every rule and report all failures together
    ///
    /// # Errors
    ///
    /// A [`ValidationError`] naming each failing field.
    pub fn validate(&self) -> Result<ListingValues, ValidationError> {
        let mut problems = ValidationError::default();

        let title = self.title.trim();
        if title.is_empty() {
            problems.push("title", "Title is required");
        }
        let category = self.category.parse::<Category>().ok();
        if category.is_none() {
            problems.push("category", "Select a category");
        }
        let quantity = positive_number(&self.quantity);
        if quantity.is_none() {
            problems.push("quantity", "Quantity must be a positive number");
        }
        let unit = self.unit.parse::<Unit>().ok();
        if unit.is_none() {
            problems.push("unit", "Select a unit");
        }
        let price_per_unit = positive_number(&self.price_per_unit);
        if price_per_unit.is_none() {
            problems.push("price_per_unit", "Price per unit must be a positive number");
        }
        let location = self.location.trim();
        if location.is_empty() {
            problems.push("location", "Location is required");
        }
        let description = self.description.trim();
        if description.is_empty() {
            problems.push("description", "Description is required");
        }
        let availability_date = match self.availability_date.trim() {
            "" => None,
            raw => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    problems.push("availability_date", "Availability date must be YYYY-MM-DD");
                    None
                }
            },
        };

        match (category, quantity, unit, price_per_unit) {
            (Some(category), Some(quantity), Some(unit), Some(price_per_unit))
                if problems.is_empty() =>
            {
                Ok(ListingValues {
                    title: title.to_string(),
                    description: description.to_string(),
                    category,
                    quantity,
                    unit,
                    price_per_unit,
                    location: location.to_string(),
                    availability_date,
                })
            }
            _ => Err(problems),
        }
    }
}

fn positive_number(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Validated, typed listing fields
#[derive(Debug, Clone, PartialEq)]
pub struct ListingValues {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub quantity: f64,
    pub unit: Unit,
    pub price_per_unit: f64,
    pub location: String,
    pub availability_date: Option<NaiveDate>,
}

impl ListingValues {
    /// Mutable columns, as written by both insert and update
    pub fn to_row(&self, images: &[String]) -> Value {
        json!({
            "title": self.title,
            "description": self.description,
            "category": self.category,
            "quantity": self.quantity,
            "unit": self.unit,
            "price_per_unit": self.price_per_unit,
            "location": self.location,
            "availability_date": self.availability_date,
            "images": images,
        })
    }

    /// Row for a new listing; timestamps are left to the database
    pub fn to_insert_row(&self, images: &[String], farmer_id: &Uuid) -> Value {
        let mut row = self.to_row(images);
        row["farmer_id"] = json!(farmer_id);
        row["status"] = json!(ListingStatus::Available);
        row
    }
}

/// Reject the whole batch if any file is not an image or is over 5 MiB
///
/// # Errors
///
/// A [`ValidationError`] naming each offending file.
pub fn validate_images(files: &[ImageFile]) -> Result<(), ValidationError> {
    let mut problems = ValidationError::default();
    for file in files {
        if !file.is_image() {
            problems.push("images", format!("{} is not an image file", file.name));
        } else if file.size() > MAX_IMAGE_BYTES {
            problems.push("images", format!("{} is too large (max 5MB)", file.name));
        }
    }
    problems.into_result()
}
