//! Marketplace search over a catalog snapshot
use crate::listing::{CropCategory, Listing};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(CropCategory),
}

impl CategoryFilter {
    pub fn admits(&self, category: CropCategory) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => *wanted == category,
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(CategoryFilter::All);
        }
        s.parse().map(CategoryFilter::Only)
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::All => f.write_str("all"),
            CategoryFilter::Only(category) => fmt::Display::fmt(category, f),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    query: String,
    category: CategoryFilter,
}

impl SearchCriteria {
    pub fn new(query: &str, category: CategoryFilter) -> Self {
        Self {
            query: query.to_lowercase(),
            category,
        }
    }
    pub fn query(&self) -> &str {
        &self.query
    }
    pub fn category(&self) -> CategoryFilter {
        self.category
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        if !self.category.admits(listing.crop_category) {
            return false;
        }
        if self.query.is_empty() {
            return true;
        }
        [
            &listing.crop_name,
            &listing.farmer_name,
            &listing.description,
        ]
        .into_iter()
        .any(|text| text.to_lowercase().contains(&self.query))
    }
}

/// Listings matching `criteria`, in their original relative order.
pub fn search(listings: &[Listing], criteria: &SearchCriteria) -> Vec<Listing> {
    listings
        .iter()
        .filter(|listing| criteria.matches(listing))
        .cloned()
        .collect()
}
