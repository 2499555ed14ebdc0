//! Rule-table fact extraction from chat messages
//!
//! Each category owns an ordered list of patterns. Categories are tried in
//! table order; within a category the first pattern that matches decides
//! the outcome, even when its captured value is then rejected.

use crate::error::{BondError, Result};
use crate::types::FactCategory;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};

/// Values must be longer than this many characters
const MIN_VALUE_LEN: usize = 1;
/// ...and shorter than this many
const MAX_VALUE_LEN: usize = 100;

/// A fact-shaped record pulled from one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedFact {
    pub category: FactCategory,
    pub value: String,
}

/// Narrow interface so a smarter extractor can replace the rule table
pub trait FactExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<ExtractedFact>;
}

/// One category and its patterns, tried in order
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub category: FactCategory,
    pub patterns: Vec<Regex>,
}

const BUILTIN_RULES: &[(FactCategory, &[&str])] = &[
    (
        FactCategory::FavoriteFood,
        &[
            r"(?:my |i )?(?:favorite|fav|favourite) (?:food|dish|meal|cuisine) (?:is|are|would be) (.+?)(?:\.|!|,|$)",
            r"i (?:love|like|enjoy|prefer) (?:eating|to eat|having) (.+?)(?:\.|!|,|$)",
            r"i (?:really )?(?:love|like|enjoy) (.+?) (?:food|dish|dishes|cuisine)",
            r"nothing beats (.+?) for (?:dinner|lunch|breakfast)",
        ],
    ),
    (
        FactCategory::FavoriteColor,
        &[r"(?:my |i )?(?:favorite|fav|favourite) colou?r (?:is|would be) (.+?)(?:\.|!|,|$)"],
    ),
    (
        FactCategory::Hobby,
        &[
            r"(?:my |i )?(?:hobbies?|hobby) (?:is|are|include) (.+?)(?:\.|!|,|$)",
            r"i (?:love|like|enjoy) (?:to )?(.+?)(?:ing)? in my (?:free|spare) time",
            r"i(?:'m| am) (?:really )?(?:into|passionate about) (.+?)(?:\.|!|,|$)",
        ],
    ),
    (
        FactCategory::FavoriteMovie,
        &[r"(?:my |i )?(?:favorite|fav|favourite) (?:movie|film|show|series) (?:is|would be) (.+?)(?:\.|!|,|$)"],
    ),
    (
        FactCategory::FavoriteMusic,
        &[r"(?:my |i )?(?:favorite|fav|favourite) (?:music|song|band|artist|singer) (?:is|are|would be) (.+?)(?:\.|!|,|$)"],
    ),
    (
        FactCategory::FavoritePlace,
        &[r"(?:my |i )?(?:favorite|fav|favourite) (?:place|city|country|destination) (?:is|would be) (.+?)(?:\.|!|,|$)"],
    ),
    (
        FactCategory::Pet,
        &[
            r"i (?:have|own|got) (?:a |an )?(.+?)(?:named|called) .+?(?:\.|!|,|$)",
            r"my (?:pet|dog|cat|bird|fish|hamster|rabbit) (?:is named|is called|is) (.+?)(?:\.|!|,|$)",
            r"i (?:have|own|got) (?:a |an )?(dog|cat|bird|fish|hamster|rabbit|parrot|turtle)",
        ],
    ),
    (
        FactCategory::FamilyDetail,
        &[
            r"i have (\d+) (?:brothers?|sisters?|siblings?|kids?|children)",
            r"my (?:mom|dad|mother|father|brother|sister|grandma|grandpa) (.+?)(?:\.|!|,|$)",
        ],
    ),
    (
        FactCategory::Fear,
        &[
            r"i(?:'m| am) (?:really )?(?:afraid|scared|terrified) of (.+?)(?:\.|!|,|$)",
            r"my (?:biggest )?fear (?:is|would be) (.+?)(?:\.|!|,|$)",
        ],
    ),
    (
        FactCategory::Dream,
        &[
            r"my dream (?:is|would be) (?:to )?(.+?)(?:\.|!|,|$)",
            r"i (?:dream|wish|hope) (?:to|of) (.+?)(?:\.|!|,|$)",
        ],
    ),
    (
        FactCategory::CulturalTradition,
        &[r"(?:in my (?:culture|country|family)|we) (?:celebrate|have|observe) (.+?)(?:\.|!|,|$)"],
    ),
    (
        FactCategory::DailyRoutine,
        &[r"(?:every|each) (?:morning|evening|day|night) i (.+?)(?:\.|!|,|$)"],
    ),
];

/// Compiled once on first use
static BUILTIN_TABLE: LazyLock<Arc<Vec<CategoryRule>>> = LazyLock::new(|| {
    Arc::new(
        compile_rules(BUILTIN_RULES)
            .unwrap_or_else(|e| panic!("builtin fact patterns must compile: {}", e)),
    )
});

fn compile_rules(table: &[(FactCategory, &[&str])]) -> Result<Vec<CategoryRule>> {
    table
        .iter()
        .map(|(category, sources)| {
            let patterns = sources
                .iter()
                .map(|source| {
                    Regex::new(source).map_err(|e| {
                        BondError::validation(format!("bad pattern for {}: {}", category, e))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(CategoryRule {
                category: *category,
                patterns,
            })
        })
        .collect()
}

fn clean_value(raw: &str) -> &str {
    raw.trim()
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | '!' | '?') || c.is_whitespace())
}

/// Extractor driven by a category -> patterns table
#[derive(Debug, Clone)]
pub struct RuleTableExtractor {
    rules: Arc<Vec<CategoryRule>>,
}

impl RuleTableExtractor {
    /// The built-in English rule table
    pub fn builtin() -> Self {
        Self {
            rules: Arc::clone(&BUILTIN_TABLE),
        }
    }

    /// Build an extractor from a custom table; patterns are matched
    /// against lower-cased text
    pub fn with_rules(table: &[(FactCategory, &[&str])]) -> Result<Self> {
        Ok(Self {
            rules: Arc::new(compile_rules(table)?),
        })
    }

    pub fn categories(&self) -> impl Iterator<Item = FactCategory> + '_ {
        self.rules.iter().map(|rule| rule.category)
    }
}

impl Default for RuleTableExtractor {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FactExtractor for RuleTableExtractor {
    fn extract(&self, text: &str) -> Vec<ExtractedFact> {
        let text = text.trim().to_lowercase();
        let mut facts = Vec::new();

        for rule in self.rules.iter() {
            let captured = rule
                .patterns
                .iter()
                .find_map(|pattern| pattern.captures(&text))
                .and_then(|caps| caps.get(1).map(|m| m.as_str()));

            if let Some(raw) = captured {
                let value = clean_value(raw);
                let len = value.chars().count();
                if len > MIN_VALUE_LEN && len < MAX_VALUE_LEN {
                    facts.push(ExtractedFact {
                        category: rule.category,
                        value: value.to_string(),
                    });
                }
            }
        }

        facts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<ExtractedFact> {
        RuleTableExtractor::builtin().extract(text)
    }

    fn fact(category: FactCategory, value: &str) -> ExtractedFact {
        ExtractedFact {
            category,
            value: value.to_string(),
        }
    }

    #[test]
    fn test_favorite_food_only() {
        assert_eq!(
            extract("My favorite food is pizza"),
            vec![fact(FactCategory::FavoriteFood, "pizza")]
        );
    }

    #[test]
    fn test_multiple_categories_in_table_order() {
        let facts = extract("My dream is to visit Japan! My favorite color is blue.");
        assert_eq!(
            facts,
            vec![
                fact(FactCategory::FavoriteColor, "blue"),
                fact(FactCategory::Dream, "visit japan"),
            ]
        );
    }

    #[test]
    fn test_trailing_punctuation_stripped() {
        assert_eq!(
            extract("I'm afraid of spiders?!"),
            vec![fact(FactCategory::Fear, "spiders")]
        );
    }

    #[test]
    fn test_pet_and_family() {
        assert_eq!(
            extract("I have a dog named Rex"),
            vec![fact(FactCategory::Pet, "dog")]
        );
        assert_eq!(
            extract("I have 10 siblings"),
            vec![fact(FactCategory::FamilyDetail, "10")]
        );
        // Single-digit counts fall under the minimum value length
        assert!(extract("i have 3 sisters").is_empty());
    }

    #[test]
    fn test_daily_routine_and_tradition() {
        assert_eq!(
            extract("Every morning I drink green tea."),
            vec![fact(FactCategory::DailyRoutine, "drink green tea")]
        );
        assert_eq!(
            extract("In my family we celebrate Diwali, it's huge"),
            vec![fact(FactCategory::CulturalTradition, "diwali")]
        );
    }

    #[test]
    fn test_too_short_value_rejected() {
        assert!(extract("my favorite food is x").is_empty());
    }

    #[test]
    fn test_too_long_value_rejected() {
        let text = format!("my favorite movie is {}", "a".repeat(120));
        assert!(extract(&text).is_empty());
    }

    #[test]
    fn test_small_talk_yields_nothing() {
        assert!(extract("hey, how was your day?").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_custom_table() {
        let extractor = RuleTableExtractor::with_rules(&[(
            FactCategory::Achievement,
            &[r"i won (.+?)(?:\.|!|$)"],
        )])
        .unwrap();
        assert_eq!(
            extractor.extract("I won the chess cup!"),
            vec![fact(FactCategory::Achievement, "the chess cup")]
        );
        assert_eq!(
            extractor.categories().collect::<Vec<_>>(),
            vec![FactCategory::Achievement]
        );
    }

    #[test]
    fn test_invalid_custom_pattern() {
        let result = RuleTableExtractor::with_rules(&[(FactCategory::Hobby, &[r"(unclosed"])]);
        assert!(matches!(result, Err(BondError::Validation { .. })));
    }
}
