//! Rule matching.
//!
//! Checks run in a fixed order and stop at the first failure:
//! promotion class, size, seeders, category, include keywords, exclude
//! keywords. No I/O.

use std::fmt;

use crate::directory::Rule;
use crate::tracker::TrackerItem;

/// First predicate an item failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    NotFree,
    NotDoubleUpload,
    TooSmall { size_gb: f64, min: f64 },
    TooLarge { size_gb: f64, max: f64 },
    TooFewSeeders { seeders: u32, min: u32 },
    TooManySeeders { seeders: u32, max: u32 },
    Category(Option<String>),
    NoKeyword,
    Excluded(String),
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::NotFree => write!(f, "promotion is not free"),
            Mismatch::NotDoubleUpload => write!(f, "promotion is not double upload"),
            Mismatch::TooSmall { size_gb, min } => write!(f, "{} GB below {} GB", size_gb, min),
            Mismatch::TooLarge { size_gb, max } => write!(f, "{} GB above {} GB", size_gb, max),
            Mismatch::TooFewSeeders { seeders, min } => {
                write!(f, "{} seeders below {}", seeders, min)
            }
            Mismatch::TooManySeeders { seeders, max } => {
                write!(f, "{} seeders above {}", seeders, max)
            }
            Mismatch::Category(c) => write!(f, "category {:?} not accepted", c),
            Mismatch::NoKeyword => write!(f, "no keyword matched"),
            Mismatch::Excluded(k) => write!(f, "excluded keyword {:?}", k),
        }
    }
}

/// Evaluate `rule` against `item`, reporting the first failed predicate.
/// Zero size and seeder bounds count as unset.
pub fn evaluate(item: &TrackerItem, rule: &Rule) -> Result<(), Mismatch> {
    if rule.free_only && !item.promotion.is_free() {
        return Err(Mismatch::NotFree);
    }
    if rule.double_upload && !item.promotion.is_double_upload() {
        return Err(Mismatch::NotDoubleUpload);
    }

    let size_gb = item.size_gb();
    if let Some(min) = rule.min_size_gb.filter(|v| *v > 0.0) {
        if size_gb < min {
            return Err(Mismatch::TooSmall { size_gb, min });
        }
    }
    if let Some(max) = rule.max_size_gb.filter(|v| *v > 0.0) {
        if size_gb > max {
            return Err(Mismatch::TooLarge { size_gb, max });
        }
    }

    if let Some(min) = rule.min_seeders.filter(|v| *v > 0) {
        if item.seeders < min {
            return Err(Mismatch::TooFewSeeders {
                seeders: item.seeders,
                min,
            });
        }
    }
    if let Some(max) = rule.max_seeders.filter(|v| *v > 0) {
        if item.seeders > max {
            return Err(Mismatch::TooManySeeders {
                seeders: item.seeders,
                max,
            });
        }
    }

    if !rule.categories.is_empty() {
        let accepted = item
            .category
            .as_ref()
            .is_some_and(|c| rule.categories.iter().any(|rc| rc == c));
        if !accepted {
            return Err(Mismatch::Category(item.category.clone()));
        }
    }

    let name = item.name.to_lowercase();
    let description = item.description.as_deref().unwrap_or("").to_lowercase();
    let hit = |keyword: &str| name.contains(keyword) || description.contains(keyword);

    let include = rule.include_keywords();
    if !include.is_empty() && !include.iter().any(|k| hit(k)) {
        return Err(Mismatch::NoKeyword);
    }

    if let Some(excluded) = rule.excluded_keywords().into_iter().find(|k| hit(k)) {
        return Err(Mismatch::Excluded(excluded));
    }

    Ok(())
}

/// Whether `item` satisfies `rule`.
pub fn matches(item: &TrackerItem, rule: &Rule) -> bool {
    evaluate(item, rule).is_ok()
}
