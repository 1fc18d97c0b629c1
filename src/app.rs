use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use chrono::Utc;
use serde::Serialize;

use crate::{
    auth,
    classifier::{compare_classifications, describe_classifications, ImageClassifier, RemoteClassifier},
    config::Config,
    db::Database,
    eid::Eid,
    errors::AppError,
    matching::MatchEngine,
    notify,
    records::{Item, ItemCreate, ItemKind, ItemMatch, ItemStatus, MatchStatus, Notification, User},
    scoring::{self, MATCH_THRESHOLD},
};

/// Images must clear this before a result is even considered for display.
/// The display pass then applies the shared 0.4 threshold like every other
/// search path.
const IMAGE_CANDIDATE_THRESHOLD: f64 = 0.5;

/// The application service: wires the record store, match engine and
/// classifier adapter behind the boundary surface consumed by the CLI and
/// the HTTP daemon.
pub struct App {
    config: Arc<RwLock<Config>>,
    db: Database,
    engine: MatchEngine,
    classifier: Option<Box<dyn ImageClassifier>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub item: Item,
    pub similarity: f64,
    /// Present when the hit was persisted as a pending match (an anchor item
    /// was known); feedback and contact take this id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<Eid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    pub item: Item,
    pub matches: Vec<ItemMatch>,
}

impl App {
    pub fn new(config: Arc<RwLock<Config>>, data_dir: &str) -> anyhow::Result<Self> {
        let db = Database::open(data_dir)?;

        let classifier_cfg = config.read().unwrap().classifier.clone();
        let classifier: Option<Box<dyn ImageClassifier>> = if classifier_cfg.enabled {
            Some(Box::new(RemoteClassifier::new(classifier_cfg)))
        } else {
            None
        };

        Ok(Self {
            config,
            db,
            engine: MatchEngine::new(),
            classifier,
        })
    }

    pub(crate) fn with_parts(db: Database, classifier: Option<Box<dyn ImageClassifier>>) -> Self {
        Self {
            config: Arc::new(RwLock::new(Config::default())),
            db,
            engine: MatchEngine::new(),
            classifier,
        }
    }

    pub fn config(&self) -> Arc<RwLock<Config>> {
        self.config.clone()
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    // --- session ---

    pub fn signup(&self, name: &str, email: &str, password: &str) -> Result<User, AppError> {
        auth::signup(&self.db, name, email, password)
    }

    pub fn login(&self, email: &str, password: &str) -> Result<Option<User>, AppError> {
        auth::login(&self.db, email, password)
    }

    pub fn logout(&self) -> Result<(), AppError> {
        auth::logout(&self.db)
    }

    pub fn current_user(&self) -> Result<Option<User>, AppError> {
        auth::current_user(&self.db)
    }

    fn require_user(&self) -> Result<User, AppError> {
        self.current_user()?.ok_or(AppError::NotLoggedIn)
    }

    // --- items ---

    /// Persists a report and immediately runs the match engine against the
    /// opposite-kind collection. When an image is attached and the
    /// classifier is enabled, the image is analyzed first to enrich the
    /// record; analysis failures are logged and the report proceeds without
    /// that signal.
    pub fn report_item(
        &self,
        kind: ItemKind,
        create: ItemCreate,
        image: Option<Vec<u8>>,
    ) -> Result<ReportOutcome, AppError> {
        let user = self.require_user()?;

        let mut keywords: Vec<String> = create.keywords.iter().map(|k| k.to_lowercase()).collect();
        let mut ai_description = None;
        let mut image_url = create.image_url.clone();

        if let Some(bytes) = image {
            let blob_key = format!("image-{}", Eid::new());
            self.db.write_blob(&blob_key, &bytes)?;
            image_url = Some(blob_key);

            if let Some(classifier) = &self.classifier {
                match classifier.classify(&bytes) {
                    Ok(classifications) if !classifications.is_empty() => {
                        ai_description = Some(describe_classifications(&classifications));
                        for c in classifications.iter().take(3) {
                            let label = c.label.to_lowercase();
                            if !keywords.contains(&label) {
                                keywords.push(label);
                            }
                        }
                    }
                    Ok(_) => log::warn!("classifier returned no labels for report image"),
                    Err(err) => {
                        log::warn!("image analysis failed, reporting without it: {err:?}")
                    }
                }
            }
        }

        let item = self.db.save_item(Item {
            id: Eid::new(),
            kind,
            name: create.name,
            description: create.description,
            category: create.category,
            brand: create.brand,
            date: create.date,
            time: create.time,
            location: create.location,
            image_url,
            identifying_features: create.identifying_features,
            reward: create.reward,
            user_id: user.id,
            created_at: Utc::now(),
            status: ItemStatus::Pending,
            ai_description,
            keywords,
        })?;

        let matches = self.engine.run_for_item(&self.db, &item)?;
        Ok(ReportOutcome { item, matches })
    }

    pub fn get_item(&self, id: &Eid) -> Result<Item, AppError> {
        self.db.item_by_id(id)?.ok_or(AppError::NotFound)
    }

    pub fn items_by_user(&self, user_id: &Eid) -> Result<Vec<Item>, AppError> {
        Ok(self.db.items_by_user(user_id)?)
    }

    pub fn lost_items(&self) -> Result<Vec<Item>, AppError> {
        Ok(self.db.items_of_kind(ItemKind::Lost)?)
    }

    pub fn found_items(&self) -> Result<Vec<Item>, AppError> {
        Ok(self.db.items_of_kind(ItemKind::Found)?)
    }

    // --- interactive search ---

    /// Term-overlap text search. With an anchor item the scope narrows to
    /// the opposite-kind collection and every displayed hit is persisted as
    /// a pending match.
    pub fn search_text(&self, query: &str, anchor: Option<&Eid>) -> Result<Vec<SearchHit>, AppError> {
        let terms = scoring::query_terms(query);
        if terms.is_empty() {
            return Err(AppError::Other(anyhow!(
                "please enter more specific search terms"
            )));
        }

        let (scope, anchor_item) = self.search_scope(anchor)?;

        let hits: Vec<(Item, f64)> = scope
            .into_iter()
            .filter_map(|item| scoring::score_query(&terms, &item).map(|score| (item, score)))
            .collect();

        self.display_matches(hits, anchor_item.as_ref())
    }

    /// Image search through the classifier boundary. Candidates without a
    /// locally stored image are skipped; per-candidate classification
    /// failures degrade to "no match" for that candidate.
    pub fn search_image(
        &self,
        image: &[u8],
        anchor: Option<&Eid>,
    ) -> Result<(String, Vec<SearchHit>), AppError> {
        let classifier = self
            .classifier
            .as_ref()
            .ok_or_else(|| AppError::Classifier("image analysis is disabled".to_string()))?;

        let query = classifier
            .classify(image)
            .map_err(|err| AppError::Classifier(err.to_string()))?;
        if query.is_empty() {
            return Err(AppError::Classifier(
                "we couldn't identify the object in this image, please try a clearer photo"
                    .to_string(),
            ));
        }
        let description = describe_classifications(&query);

        let (scope, anchor_item) = self.search_scope(anchor)?;

        let mut hits = vec![];
        for item in scope {
            let Some(ref image_key) = item.image_url else {
                continue;
            };
            let Some(bytes) = self.db.read_blob(image_key)? else {
                log::debug!("item {} image {image_key} is not locally stored, skipping", item.id);
                continue;
            };

            let candidate = match classifier.classify(&bytes) {
                Ok(c) => c,
                Err(err) => {
                    log::warn!("classification failed for item {}: {err:?}", item.id);
                    continue;
                }
            };

            let similarity = compare_classifications(&query, &candidate);
            if similarity >= IMAGE_CANDIDATE_THRESHOLD {
                hits.push((item, similarity));
            }
        }

        let hits = self.display_matches(hits, anchor_item.as_ref())?;
        Ok((description, hits))
    }

    /// Field-heuristic candidate scan for an existing report (the automatic
    /// "we found matches for your item" page). Hits are persisted as pending
    /// matches.
    pub fn find_candidates(&self, item_id: &Eid) -> Result<Vec<SearchHit>, AppError> {
        let item = self.get_item(item_id)?;
        let hits = self.engine.find_candidates(&self.db, &item)?;
        self.display_matches(hits, Some(&item))
    }

    fn search_scope(&self, anchor: Option<&Eid>) -> Result<(Vec<Item>, Option<Item>), AppError> {
        match anchor {
            Some(id) => {
                let item = self.get_item(id)?;
                let scope = self.db.items_of_kind(item.kind.opposite())?;
                Ok((scope, Some(item)))
            }
            None => Ok((self.db.items()?, None)),
        }
    }

    /// Shared display pass for all interactive search paths: filter by the
    /// 0.4 display threshold, sort best first, and, when the anchor item is
    /// known, persist each hit as a pending match through the deduplicating
    /// save.
    fn display_matches(
        &self,
        mut hits: Vec<(Item, f64)>,
        anchor: Option<&Item>,
    ) -> Result<Vec<SearchHit>, AppError> {
        hits.retain(|(_, score)| *score >= MATCH_THRESHOLD);
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut out = vec![];
        for (item, similarity) in hits {
            let match_id = match anchor {
                Some(anchor) => {
                    let (lost_item_id, found_item_id) = match anchor.kind {
                        ItemKind::Lost => (anchor.id.clone(), item.id.clone()),
                        ItemKind::Found => (item.id.clone(), anchor.id.clone()),
                    };
                    let m = self.db.save_match(ItemMatch {
                        id: Eid::new(),
                        lost_item_id,
                        found_item_id,
                        similarity,
                        status: MatchStatus::Pending,
                        created_at: Utc::now(),
                    })?;
                    Some(m.id)
                }
                None => None,
            };

            out.push(SearchHit {
                item,
                similarity,
                match_id,
            });
        }
        Ok(out)
    }

    // --- matches ---

    pub fn matches_for_item(&self, item_id: &Eid) -> Result<Vec<ItemMatch>, AppError> {
        Ok(self.db.matches_for_item(item_id)?)
    }

    /// Thumbs up/down on a proposed match. Approving cascades both items to
    /// Matched status; rejecting leaves item status alone.
    pub fn feedback(&self, match_id: &Eid, positive: bool) -> Result<ItemMatch, AppError> {
        let status = if positive {
            MatchStatus::Approved
        } else {
            MatchStatus::Rejected
        };
        self.db
            .set_match_status(match_id, status)?
            .ok_or(AppError::NotFound)
    }

    /// Sends a message to the other party of a match. This is the only point
    /// where contact details are exchanged, and it implicitly approves the
    /// match.
    pub fn contact_owner(
        &self,
        match_id: &Eid,
        item_id: &Eid,
        message: &str,
    ) -> Result<(), AppError> {
        if message.trim().is_empty() {
            return Err(AppError::Other(anyhow!("please enter a message to send")));
        }

        let sender = self.require_user()?;
        let m = self.db.match_by_id(match_id)?.ok_or(AppError::NotFound)?;
        let item = self.get_item(item_id)?;
        let counterpart = self.db.user_by_id(&item.user_id)?;

        notify::notify_contact(&self.db, &sender, counterpart.as_ref(), &item, &m.id, message)?;
        self.db.set_match_status(&m.id, MatchStatus::Approved)?;
        Ok(())
    }

    // --- notifications ---

    /// Defaults to the logged-in user when no user id is given.
    pub fn notifications(&self, user_id: Option<&Eid>) -> Result<Vec<Notification>, AppError> {
        let user_id = match user_id {
            Some(id) => id.clone(),
            None => self.require_user()?.id,
        };
        Ok(self.db.notifications_for_user(&user_id)?)
    }

    pub fn mark_read(&self, notification_id: &Eid) -> Result<(), AppError> {
        Ok(self.db.mark_read(notification_id)?)
    }
}
