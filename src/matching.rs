//! The match engine: pairwise scoring of lost against found reports,
//! persistence of qualifying matches, and notification fanout.

use chrono::Utc;

use crate::{
    db::Database,
    eid::Eid,
    notify,
    records::{Item, ItemKind, ItemMatch, ItemStatus, MatchStatus},
    scoring::{FieldHeuristic, Scorer, WeightedJaccard, MATCH_THRESHOLD},
};

pub struct MatchEngine {
    scorer: Box<dyn Scorer>,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchEngine {
    pub fn new() -> Self {
        Self {
            scorer: Box::new(WeightedJaccard),
        }
    }

    /// Evaluates a newly created item against every opposite-kind report.
    /// Qualifying pairs (score >= 0.4) are persisted through the
    /// deduplicating save, and both parties are notified. An item with no
    /// opposite-kind candidates yields no matches and no error.
    pub fn run_for_item(&self, db: &Database, item: &Item) -> anyhow::Result<Vec<ItemMatch>> {
        let candidates = db.items_of_kind(item.kind.opposite())?;
        let mut created = vec![];

        for other in &candidates {
            let similarity = self.scorer.score(item, other);
            if similarity < MATCH_THRESHOLD {
                continue;
            }

            let (lost, found) = match item.kind {
                ItemKind::Lost => (item, other),
                ItemKind::Found => (other, item),
            };

            let m = db.save_match(ItemMatch {
                id: Eid::new(),
                lost_item_id: lost.id.clone(),
                found_item_id: found.id.clone(),
                similarity,
                status: MatchStatus::Pending,
                created_at: Utc::now(),
            })?;

            notify::notify_match(db, &m, lost, found)?;
            created.push(m);
        }

        if !created.is_empty() {
            log::info!(
                "{} potential match(es) for {} item {}",
                created.len(),
                item.kind.as_str(),
                item.id
            );
        }

        Ok(created)
    }

    /// Interactive candidate search for an existing item, using the additive
    /// field heuristic (a separate formula from the automatic pass). Skips
    /// candidates already matched or resolved. Results are sorted best first.
    pub fn find_candidates(&self, db: &Database, item: &Item) -> anyhow::Result<Vec<(Item, f64)>> {
        let heuristic = FieldHeuristic;

        let mut hits: Vec<(Item, f64)> = db
            .items_of_kind(item.kind.opposite())?
            .into_iter()
            .filter(|i| i.status != ItemStatus::Matched && i.status != ItemStatus::Resolved)
            .filter_map(|candidate| {
                let score = heuristic.score(item, &candidate);
                if score >= MATCH_THRESHOLD {
                    Some((candidate, score))
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits)
    }
}
