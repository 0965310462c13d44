//! Product categories a policy request can be filed under

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RequestError;

/// Insurance product category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductCategory {
    Life,
    Auto,
    Home,
    Business,
    Other,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 5] = [
        ProductCategory::Life,
        ProductCategory::Auto,
        ProductCategory::Home,
        ProductCategory::Business,
        ProductCategory::Other,
    ];

    /// Human-readable label used in audit notes
    pub fn label(self) -> &'static str {
        match self {
            ProductCategory::Life => "Life",
            ProductCategory::Auto => "Auto",
            ProductCategory::Home => "Home",
            ProductCategory::Business => "Business",
            ProductCategory::Other => "Other",
        }
    }

    /// Wire/storage name
    pub fn as_str(self) -> &'static str {
        match self {
            ProductCategory::Life => "LIFE",
            ProductCategory::Auto => "AUTO",
            ProductCategory::Home => "HOME",
            ProductCategory::Business => "BUSINESS",
            ProductCategory::Other => "OTHER",
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductCategory {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| RequestError::validation(format!("unknown product category: {}", s)))
    }
}
