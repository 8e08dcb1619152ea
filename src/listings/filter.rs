//! Marketplace filter criteria

use crate::listings::types::{Category, ListingStatus};
use crate::postgrest::{Filter, Query};

/// Columns for marketplace reads: the listing plus its seller's contact fields
pub const LISTING_WITH_SELLER: &str =
    "*,profiles:farmer_id(id,full_name,farm_name,location,phone_number)";

/// Search, category, price range and location, combined with AND.
///
/// Empty fields are left out of the query rather than matching nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub search: String,
    pub category: Option<Category>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub location: String,
}

impl ListingFilter {
    pub fn is_empty(&self) -> bool {
        self.search.trim().is_empty()
            && self.category.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
            && self.location.trim().is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Query for available listings matching this filter, newest first
    pub fn to_query(&self) -> Query {
        let mut query = Query::select(LISTING_WITH_SELLER)
            .eq("status", ListingStatus::Available.as_str());

        let search = self.search.trim();
        if !search.is_empty() {
            let pattern = format!("%{}%", search);
            query = query.filter(Filter::Or(vec![
                Filter::ilike("title", &pattern),
                Filter::ilike("description", &pattern),
            ]));
        }
        if let Some(category) = self.category {
            query = query.eq("category", category.as_str());
        }
        if let Some(min) = self.min_price {
            query = query.filter(Filter::gte("price_per_unit", min));
        }
        if let Some(max) = self.max_price {
            query = query.filter(Filter::lte("price_per_unit", max));
        }
        let location = self.location.trim();
        if !location.is_empty() {
            query = query.filter(Filter::ilike("location", &format!("%{}%", location)));
        }

        query.order("created_at", false)
    }
}

/// Offset paging for large result sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            offset: number.saturating_mul(size),
            limit: size,
        }
    }

    pub fn next(&self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.limit),
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_only_restricts_status() {
        let query = ListingFilter::default().to_query();
        assert_eq!(query.filters, vec![Filter::eq("status", "available")]);
        assert_eq!(query.order.as_ref().map(|o| o.ascending), Some(false));
    }

    #[test]
    fn whitespace_fields_count_as_empty() {
        let filter = ListingFilter {
            search: "   ".into(),
            location: "\t".into(),
            ..Default::default()
        };
        assert!(filter.is_empty());
        assert_eq!(filter.to_query().filters.len(), 1);
    }

    #[test]
    fn full_filter_composes_every_predicate() {
        let filter = ListingFilter {
            search: "tomato".into(),
            category: Some(Category::Vegetables),
            min_price: Some(20.0),
            max_price: Some(80.0),
            location: "Nakuru".into(),
        };
        let query = filter.to_query();

        assert_eq!(query.filters.len(), 6);
        assert!(query.filters.contains(&Filter::Or(vec![
            Filter::ilike("title", "%tomato%"),
            Filter::ilike("description", "%tomato%"),
        ])));
        assert!(query.filters.contains(&Filter::eq("category", "Vegetables")));
        assert!(query.filters.contains(&Filter::gte("price_per_unit", 20.0)));
        assert!(query.filters.contains(&Filter::lte("price_per_unit", 80.0)));
        assert!(query.filters.contains(&Filter::ilike("location", "%Nakuru%")));
    }

    #[test]
    fn pages_advance() {
        let page = Page::new(2, 20);
        assert_eq!(page.offset, 40);
        assert_eq!(page.next().offset, 60);
    }
}
