//! Category defaults for credit issuance.
//!
//! When a project declares no explicit credit cap or unit price, approval
//! falls back to this table.  There is exactly one copy of it.

/// (category, credits, price per credit)
const CATEGORY_DEFAULTS: &[(&str, i64, f64)] = &[
    ("Forestry", 1000, 15.0),
    ("Renewable Energy", 500, 20.0),
    ("Agriculture", 750, 12.0),
    ("Waste Management", 600, 10.0),
];

const FALLBACK: (i64, f64) = (500, 15.0);

/// Default (credits, price) for a category.  Matching is case-insensitive;
/// unknown categories get the fallback.
pub fn for_category(category: &str) -> (i64, f64) {
    CATEGORY_DEFAULTS
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(category.trim()))
        .map(|(_, credits, price)| (*credits, *price))
        .unwrap_or(FALLBACK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_categories() {
        assert_eq!(for_category("Forestry"), (1000, 15.0));
        assert_eq!(for_category("Renewable Energy"), (500, 20.0));
        assert_eq!(for_category("Agriculture"), (750, 12.0));
        assert_eq!(for_category("Waste Management"), (600, 10.0));
    }

    #[test]
    fn matching_is_case_insensitive_and_trimmed() {
        assert_eq!(for_category("  renewable energy "), (500, 20.0));
        assert_eq!(for_category("FORESTRY"), (1000, 15.0));
    }

    #[test]
    fn unknown_category_gets_fallback() {
        assert_eq!(for_category("Blue Carbon"), (500, 15.0));
        assert_eq!(for_category(""), (500, 15.0));
    }
}
