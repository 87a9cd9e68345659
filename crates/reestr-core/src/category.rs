//! The closed set of registry categories.
//!
//! Every crawl, ledger entry, and persisted record is scoped by one of
//! these. Each category carries the three remote-facing tokens it needs:
//! the DevExpress listbox item id used to select it in the registry UI,
//! the display name the UI echoes back into the filter input, and the URL
//! path segment used to rebuild a detail-page URL from a bare document
//! number.

use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Invention,
    UtilityModel,
    SelectionAchievement,
    Trademark,
    WellKnownTrademark,
}

/// Crawl order. Selection achievements and trademarks first, matching the
/// order the registry operators publish updates in.
const ALL: [Category; 5] = [
    Category::SelectionAchievement,
    Category::Trademark,
    Category::Invention,
    Category::UtilityModel,
    Category::WellKnownTrademark,
];

impl Category {
    /// All categories in crawl order.
    #[must_use]
    pub fn all() -> impl Iterator<Item = Category> {
        ALL.into_iter()
    }

    /// Stable token stored in the database and accepted in API paths.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Invention => "Invention",
            Category::UtilityModel => "UtilityModel",
            Category::SelectionAchievement => "SelectionAchievement",
            Category::Trademark => "Trademark",
            Category::WellKnownTrademark => "WellKnownTrademark",
        }
    }

    /// Path segment of the registry's detail page for this category.
    ///
    /// Detail URLs have the shape
    /// `https://<site>/<segment>/Details?docNumber=<n>`.
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        self.as_str()
    }

    /// Display name the registry UI uses for this category.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Category::Invention => "Изобретения",
            Category::UtilityModel => "Полезные модели",
            Category::SelectionAchievement => "Селекционные достижения",
            Category::Trademark => "Товарные знаки",
            Category::WellKnownTrademark => "Общеизвестные товарные знаки",
        }
    }

    /// Element id of this category's entry in the registry's type dropdown.
    #[must_use]
    pub fn selector_id(self) -> &'static str {
        match self {
            Category::Invention => "cbReestrType_DDD_L_LBI1T0",
            Category::UtilityModel => "cbReestrType_DDD_L_LBI2T0",
            Category::SelectionAchievement => "cbReestrType_DDD_L_LBI4T0",
            Category::Trademark => "cbReestrType_DDD_L_LBI5T0",
            Category::WellKnownTrademark => "cbReestrType_DDD_L_LBI6T0",
        }
    }

    #[must_use]
    pub fn id(self) -> u8 {
        match self {
            Category::Invention => 1,
            Category::UtilityModel => 2,
            Category::SelectionAchievement => 3,
            Category::Trademark => 4,
            Category::WellKnownTrademark => 5,
        }
    }

    /// Whether detail pages in this category carry a representative image.
    /// Only imagery-bearing categories are eligible for image backfill.
    #[must_use]
    pub fn has_imagery(self) -> bool {
        matches!(self, Category::Trademark | Category::WellKnownTrademark)
    }

    /// Parses either the stable token or the registry display name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCategory`] when `name` matches neither.
    pub fn parse(name: &str) -> Result<Category, CoreError> {
        ALL.into_iter()
            .find(|c| c.as_str() == name || c.display_name() == name)
            .ok_or_else(|| CoreError::UnknownCategory(name.to_owned()))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_token_and_display_name() {
        assert_eq!(Category::parse("Trademark").unwrap(), Category::Trademark);
        assert_eq!(
            Category::parse("Товарные знаки").unwrap(),
            Category::Trademark
        );
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!(Category::parse("IndustrialDesign").is_err());
    }

    #[test]
    fn all_lists_every_category_once() {
        let all: Vec<_> = Category::all().collect();
        assert_eq!(all.len(), 5);
        for c in [
            Category::Invention,
            Category::UtilityModel,
            Category::SelectionAchievement,
            Category::Trademark,
            Category::WellKnownTrademark,
        ] {
            assert_eq!(all.iter().filter(|&&x| x == c).count(), 1);
        }
    }

    #[test]
    fn only_trademark_categories_carry_imagery() {
        assert!(Category::Trademark.has_imagery());
        assert!(Category::WellKnownTrademark.has_imagery());
        assert!(!Category::Invention.has_imagery());
    }
}
