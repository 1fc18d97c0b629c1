//! Similarity scoring between lost and found item reports.
//!
//! Two independently parameterized strategies live behind the [`Scorer`]
//! trait and must not be merged:
//!
//! - [`WeightedJaccard`] drives the automatic match pass that runs when an
//!   item is reported.
//! - [`FieldHeuristic`] drives the interactive candidate search, with its own
//!   additive formula.
//!
//! Both only count attributes populated on *both* sides. A pair sharing a
//! single populated attribute can therefore score 1.0 — sparse records
//! overstate confidence. That is long-standing behavior callers rely on;
//! do not "fix" it here.

use std::collections::HashSet;

use crate::records::Item;

/// Threshold above which the match engine persists a pair. Fixed, not
/// configurable.
pub const MATCH_THRESHOLD: f64 = 0.4;

pub trait Scorer: Send + Sync {
    /// Likelihood in [0, 1] that two reports describe the same object.
    fn score(&self, a: &Item, b: &Item) -> f64;
}

/// Weighted Jaccard overlap across item attributes.
pub struct WeightedJaccard;

const NAME_WEIGHT: f64 = 3.0;
const CATEGORY_WEIGHT: f64 = 2.0;
const BRAND_WEIGHT: f64 = 2.5;
const LOCATION_WEIGHT: f64 = 1.5;
const DESCRIPTION_WEIGHT: f64 = 1.0;
const AI_DESCRIPTION_WEIGHT: f64 = 1.5;
const KEYWORDS_WEIGHT: f64 = 2.0;

impl Scorer for WeightedJaccard {
    fn score(&self, a: &Item, b: &Item) -> f64 {
        let mut score = 0.0;
        let mut total_weight = 0.0;

        // Attribute pairs missing on either side are skipped entirely: not
        // penalized, not counted in the denominator.
        let mut weigh = |left: &str, right: &str, weight: f64| {
            if !left.is_empty() && !right.is_empty() {
                score += jaccard_text(left, right) * weight;
                total_weight += weight;
            }
        };

        weigh(&a.name, &b.name, NAME_WEIGHT);
        weigh(&a.category, &b.category, CATEGORY_WEIGHT);
        weigh(
            a.brand.as_deref().unwrap_or(""),
            b.brand.as_deref().unwrap_or(""),
            BRAND_WEIGHT,
        );
        weigh(&a.location, &b.location, LOCATION_WEIGHT);
        weigh(&a.description, &b.description, DESCRIPTION_WEIGHT);
        weigh(
            a.ai_description.as_deref().unwrap_or(""),
            b.ai_description.as_deref().unwrap_or(""),
            AI_DESCRIPTION_WEIGHT,
        );

        if !a.keywords.is_empty() && !b.keywords.is_empty() {
            score += jaccard_keywords(&a.keywords, &b.keywords) * KEYWORDS_WEIGHT;
            total_weight += KEYWORDS_WEIGHT;
        }

        if total_weight > 0.0 {
            score / total_weight
        } else {
            0.0
        }
    }
}

/// Additive field heuristic used by the interactive candidate search.
///
/// Not normalized the same way as [`WeightedJaccard`]; the two formulas are
/// intentionally separate code paths.
pub struct FieldHeuristic;

impl Scorer for FieldHeuristic {
    fn score(&self, a: &Item, b: &Item) -> f64 {
        let mut score = 0.0;

        let a_name = a.name.to_lowercase();
        let b_name = b.name.to_lowercase();
        if !a_name.is_empty() && !b_name.is_empty() && (a_name.contains(&b_name) || b_name.contains(&a_name))
        {
            score += 0.3;
        }

        if !a.category.is_empty() && a.category.eq_ignore_ascii_case(&b.category) {
            score += 0.2;
        }

        let a_loc = a.location.to_lowercase();
        let b_loc = b.location.to_lowercase();
        if !a_loc.is_empty() && !b_loc.is_empty() && (a_loc.contains(&b_loc) || b_loc.contains(&a_loc)) {
            score += 0.15;
        }

        if let (Some(a_brand), Some(b_brand)) = (&a.brand, &b.brand) {
            if a_brand.eq_ignore_ascii_case(b_brand) {
                score += 0.2;
            }
        }

        // Description overlap: words of length > 3, capped contribution.
        let a_words = long_words(&a.description);
        let b_words = long_words(&b.description);
        let common = a_words.iter().filter(|w| b_words.contains(*w)).count();
        if common > 0 {
            score += f64::min(0.15, common as f64 * 0.03);
        }

        score
    }
}

/// Jaccard similarity over lowercased word tokens. 0 if either side
/// tokenizes to nothing.
pub fn jaccard_text(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    intersection as f64 / union as f64
}

/// Same computation directly over keyword lists (already lowercased at item
/// creation).
pub fn jaccard_keywords(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union > 0 {
        intersection as f64 / union as f64
    } else {
        0.0
    }
}

/// Lowercase, split on non-word-character runs, drop tokens of length <= 2.
fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

fn long_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() > 3)
        .map(str::to_string)
        .collect()
}

// --- interactive text search (query vs item) ---

/// Query terms for the interactive text search: lowercased whitespace split,
/// terms of length <= 2 dropped.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

/// Term-overlap score of a query against an item's combined text. Returns
/// None when no term matches (the item is filtered out, not scored 0).
pub fn score_query(terms: &[String], item: &Item) -> Option<f64> {
    let text = format!(
        "{} {} {} {}",
        item.name,
        item.description,
        item.category,
        item.brand.as_deref().unwrap_or("")
    )
    .to_lowercase();

    let matching = terms.iter().filter(|t| text.contains(t.as_str())).count();
    if matching == 0 || terms.is_empty() {
        return None;
    }

    let similarity = matching as f64 / terms.len() as f64 * 0.7 + 0.3;
    Some(f64::min(similarity, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ItemKind, ItemStatus};
    use crate::eid::Eid;
    use chrono::Utc;

    fn item(kind: ItemKind) -> Item {
        Item {
            id: Eid::new(),
            kind,
            name: String::new(),
            description: String::new(),
            category: String::new(),
            brand: None,
            date: String::new(),
            time: String::new(),
            location: String::new(),
            image_url: None,
            identifying_features: None,
            reward: None,
            user_id: Eid::new(),
            created_at: Utc::now(),
            status: ItemStatus::Pending,
            ai_description: None,
            keywords: vec![],
        }
    }

    #[test]
    fn test_tokenize_drops_short_tokens() {
        let tokens = tokenize("a blue backpack at the gym");
        assert!(tokens.contains("blue"));
        assert!(tokens.contains("backpack"));
        assert!(tokens.contains("gym"));
        assert!(!tokens.contains("a"));
        assert!(!tokens.contains("at"));
    }

    #[test]
    fn test_jaccard_text_identical() {
        assert_eq!(jaccard_text("Blue Backpack", "blue backpack"), 1.0);
    }

    #[test]
    fn test_jaccard_text_partial() {
        // {"library"} vs {"library", "cafe"} -> 1/2
        assert_eq!(jaccard_text("Library", "Library Cafe"), 0.5);
    }

    #[test]
    fn test_jaccard_text_empty_side() {
        assert_eq!(jaccard_text("", "backpack"), 0.0);
        // all tokens too short
        assert_eq!(jaccard_text("a b c", "backpack"), 0.0);
    }

    #[test]
    fn test_weighted_jaccard_backpack_example() {
        let mut lost = item(ItemKind::Lost);
        lost.name = "Blue Backpack".into();
        lost.category = "Bags".into();
        lost.location = "Library".into();

        let mut found = item(ItemKind::Found);
        found.name = "Blue Backpack".into();
        found.category = "Bags".into();
        found.location = "Library Cafe".into();

        // (3*1 + 2*1 + 1.5*0.5) / (3 + 2 + 1.5) = 5.75 / 6.5
        let score = WeightedJaccard.score(&lost, &found);
        assert!((score - 5.75 / 6.5).abs() < 1e-9);
        assert!(score >= MATCH_THRESHOLD);
    }

    #[test]
    fn test_weighted_jaccard_sparse_overstatement() {
        // Only category populated on both sides: 2/2 = 1.0 despite no other
        // overlap. Documented quirk, asserted literally.
        let mut lost = item(ItemKind::Lost);
        lost.category = "Electronics".into();

        let mut found = item(ItemKind::Found);
        found.category = "Electronics".into();

        assert_eq!(WeightedJaccard.score(&lost, &found), 1.0);
    }

    #[test]
    fn test_weighted_jaccard_no_shared_attributes() {
        let mut lost = item(ItemKind::Lost);
        lost.name = "Wallet".into();

        let mut found = item(ItemKind::Found);
        found.category = "Accessories".into();

        // zero shared populated attributes: score 0, no division by zero
        assert_eq!(WeightedJaccard.score(&lost, &found), 0.0);
    }

    #[test]
    fn test_weighted_jaccard_symmetric() {
        let mut lost = item(ItemKind::Lost);
        lost.name = "Black Umbrella".into();
        lost.description = "long black umbrella with wooden handle".into();
        lost.keywords = vec!["umbrella".into(), "black".into()];

        let mut found = item(ItemKind::Found);
        found.name = "Umbrella".into();
        found.description = "black umbrella, wooden handle".into();
        found.keywords = vec!["umbrella".into(), "wooden".into()];

        let ab = WeightedJaccard.score(&lost, &found);
        let ba = WeightedJaccard.score(&found, &lost);
        assert_eq!(ab, ba);
        assert!(ab > 0.0 && ab <= 1.0);
    }

    #[test]
    fn test_weighted_jaccard_keywords_only() {
        let mut lost = item(ItemKind::Lost);
        lost.keywords = vec!["backpack".into(), "blue".into()];

        let mut found = item(ItemKind::Found);
        found.keywords = vec!["backpack".into(), "nylon".into()];

        // intersection 1, union 3
        assert!((WeightedJaccard.score(&lost, &found) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_field_heuristic_all_fields() {
        let mut lost = item(ItemKind::Lost);
        lost.name = "iPhone 13".into();
        lost.category = "Electronics".into();
        lost.location = "Main Station".into();
        lost.brand = Some("Apple".into());
        lost.description = "black phone with cracked screen protector".into();

        let mut found = item(ItemKind::Found);
        found.name = "iphone 13".into();
        found.category = "electronics".into();
        found.location = "station".into();
        found.brand = Some("apple".into());
        found.description = "phone, cracked screen".into();

        // 0.3 + 0.2 + 0.15 + 0.2 + min(0.15, 3*0.03) = 0.94
        let score = FieldHeuristic.score(&lost, &found);
        assert!((score - 0.94).abs() < 1e-9);
    }

    #[test]
    fn test_field_heuristic_ignores_empty_fields() {
        // two blank reports share nothing; empty names/locations/categories
        // must not collect containment or equality credit
        let lost = item(ItemKind::Lost);
        let found = item(ItemKind::Found);
        assert_eq!(FieldHeuristic.score(&lost, &found), 0.0);
    }

    #[test]
    fn test_field_heuristic_description_cap() {
        let mut lost = item(ItemKind::Lost);
        lost.description = "alpha bravo charlie delta echo foxtrot golf".into();

        let mut found = item(ItemKind::Found);
        found.description = lost.description.clone();

        // 7 common words would give 0.21, capped at 0.15
        assert!((FieldHeuristic.score(&lost, &found) - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_query_terms_drop_short() {
        assert_eq!(
            query_terms("my Blue backpack at gym"),
            vec!["blue", "backpack", "gym"]
        );
    }

    #[test]
    fn test_score_query_overlap_ratio() {
        let mut it = item(ItemKind::Found);
        it.name = "Blue Backpack".into();
        it.description = "nylon backpack".into();
        it.category = "Bags".into();

        let terms = query_terms("blue backpack zipper");
        // 2 of 3 terms match: 2/3 * 0.7 + 0.3 ~ 0.7667
        let score = score_query(&terms, &it).unwrap();
        assert!((score - (2.0 / 3.0 * 0.7 + 0.3)).abs() < 1e-9);
    }

    #[test]
    fn test_score_query_no_match_filtered() {
        let mut it = item(ItemKind::Found);
        it.name = "Umbrella".into();

        let terms = query_terms("laptop charger");
        assert!(score_query(&terms, &it).is_none());
    }

    #[test]
    fn test_score_query_capped_at_one() {
        let mut it = item(ItemKind::Found);
        it.name = "blue backpack".into();

        let terms = query_terms("blue backpack");
        assert_eq!(score_query(&terms, &it), Some(1.0));
    }
}
