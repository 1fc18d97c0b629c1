use tempfile::TempDir;

use crate::app::App;
use crate::classifier::{Classification, ImageClassifier};
use crate::db::Database;
use crate::errors::AppError;
use crate::records::{ItemCreate, ItemKind, ItemStatus, MatchStatus};

/// Canned classifier keyed on the first image byte, so tests control the
/// labels without a network.
struct StubClassifier;

impl ImageClassifier for StubClassifier {
    fn classify(&self, image: &[u8]) -> anyhow::Result<Vec<Classification>> {
        let c = |label: &str, confidence: f64| Classification {
            label: label.to_string(),
            confidence,
        };

        match image.first() {
            Some(1) => Ok(vec![c("backpack", 0.9)]),
            Some(2) => Ok(vec![c("backpack", 0.85), c("bag", 0.1)]),
            Some(3) => Ok(vec![c("umbrella", 0.9)]),
            Some(9) => anyhow::bail!("model is loading"),
            _ => Ok(vec![]),
        }
    }
}

fn test_app(classifier: Option<Box<dyn ImageClassifier>>) -> (TempDir, App) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().to_str().unwrap()).unwrap();
    (dir, App::with_parts(db, classifier))
}

fn create(name: &str) -> ItemCreate {
    ItemCreate {
        name: name.to_string(),
        ..Default::default()
    }
}

#[test]
fn test_report_requires_login() {
    let (_dir, app) = test_app(None);

    let err = app
        .report_item(ItemKind::Lost, create("Blue Backpack"), None)
        .unwrap_err();
    assert!(matches!(err, AppError::NotLoggedIn));
}

#[test]
fn test_report_enriches_record_from_image() {
    let (_dir, app) = test_app(Some(Box::new(StubClassifier)));
    app.signup("Ada", "ada@example.com", "hunter2").unwrap();

    let mut spec = create("Backpack");
    spec.keywords = vec!["Navy".to_string()];

    let outcome = app
        .report_item(ItemKind::Found, spec, Some(vec![2]))
        .unwrap();
    let item = &outcome.item;

    assert_eq!(item.keywords, vec!["navy", "backpack", "bag"]);
    assert_eq!(
        item.ai_description.as_deref(),
        Some("This appears to be a backpack (85% confidence), or possibly a bag (10% confidence)")
    );

    // the image itself is kept in the local store for later comparisons
    let key = item.image_url.as_deref().unwrap();
    assert!(key.starts_with("image-"));
    assert_eq!(app.db().read_blob(key).unwrap().unwrap(), vec![2]);
}

#[test]
fn test_report_survives_classifier_failure() {
    let (_dir, app) = test_app(Some(Box::new(StubClassifier)));
    app.signup("Ada", "ada@example.com", "hunter2").unwrap();

    let outcome = app
        .report_item(ItemKind::Found, create("Backpack"), Some(vec![9]))
        .unwrap();

    // the report goes through without the analysis signal
    assert!(outcome.item.ai_description.is_none());
    assert!(outcome.item.keywords.is_empty());
    assert!(outcome.item.image_url.is_some());
}

#[test]
fn test_report_runs_the_match_pass() {
    let (_dir, app) = test_app(None);

    app.signup("Ada", "ada@example.com", "hunter2").unwrap();
    let mut lost_spec = create("Blue Backpack");
    lost_spec.category = "Bags".to_string();
    let lost = app.report_item(ItemKind::Lost, lost_spec, None).unwrap();
    assert!(lost.matches.is_empty());

    app.signup("Bob", "bob@example.com", "secret").unwrap();
    let mut found_spec = create("Blue Backpack");
    found_spec.category = "Bags".to_string();
    let found = app.report_item(ItemKind::Found, found_spec, None).unwrap();

    assert_eq!(found.matches.len(), 1);
    assert_eq!(found.matches[0].lost_item_id, lost.item.id);
    assert_eq!(app.db().matches().unwrap().len(), 1);
}

#[test]
fn test_search_text_scores_and_sorts() {
    let (_dir, app) = test_app(None);
    app.signup("Bob", "bob@example.com", "secret").unwrap();

    app.report_item(ItemKind::Found, create("blue backpack"), None)
        .unwrap();
    let wallet = app
        .report_item(ItemKind::Found, create("blue leather wallet"), None)
        .unwrap();
    app.report_item(ItemKind::Found, create("red scarf"), None)
        .unwrap();

    let hits = app.search_text("blue wallet", None).unwrap();

    // wallet matches both terms, backpack one, scarf none
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].item.id, wallet.item.id);
    assert_eq!(hits[0].similarity, 1.0);
    assert!((hits[1].similarity - 0.65).abs() < 1e-9);
    // without an anchor item, nothing is persisted
    assert!(hits.iter().all(|h| h.match_id.is_none()));
    assert!(app.db().matches().unwrap().is_empty());
}

#[test]
fn test_search_text_rejects_vague_query() {
    let (_dir, app) = test_app(None);

    let err = app.search_text("a an of", None).unwrap_err();
    assert!(matches!(err, AppError::Other(_)));
}

#[test]
fn test_search_text_with_anchor_scopes_and_persists() {
    let (_dir, app) = test_app(None);

    app.signup("Ada", "ada@example.com", "hunter2").unwrap();
    let lost = app
        .report_item(ItemKind::Lost, create("blue backpack"), None)
        .unwrap();
    // a second lost item that matches the query text but is out of scope
    app.report_item(ItemKind::Lost, create("blue umbrella"), None)
        .unwrap();

    app.signup("Bob", "bob@example.com", "secret").unwrap();
    let found = app
        .report_item(ItemKind::Found, create("blue backpack"), None)
        .unwrap();

    let hits = app
        .search_text("blue backpack", Some(&lost.item.id))
        .unwrap();

    // anchored to a lost item, only found reports are searched
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.id, found.item.id);
    assert!(hits[0].match_id.is_some());

    // the displayed hit deduplicates against the automatic match
    assert_eq!(app.db().matches().unwrap().len(), 1);
}

#[test]
fn test_search_image_compares_stored_images() {
    let (_dir, app) = test_app(Some(Box::new(StubClassifier)));
    app.signup("Bob", "bob@example.com", "secret").unwrap();

    let backpack = app
        .report_item(ItemKind::Found, create("found bag"), Some(vec![2]))
        .unwrap();
    app.report_item(ItemKind::Found, create("found umbrella"), Some(vec![3]))
        .unwrap();
    // no stored image: silently skipped
    app.report_item(ItemKind::Found, create("found wallet"), None)
        .unwrap();
    // classification failure on a candidate: skipped, not fatal
    app.report_item(ItemKind::Found, create("found mystery"), Some(vec![9]))
        .unwrap();

    let (analysis, hits) = app.search_image(&[1], None).unwrap();

    assert_eq!(analysis, "This appears to be a backpack");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.id, backpack.item.id);
    // 0.8 + 0.2 * 0.9 * 0.85
    assert!((hits[0].similarity - 0.953).abs() < 1e-9);
}

#[test]
fn test_search_image_with_anchor_persists_matches() {
    let (_dir, app) = test_app(Some(Box::new(StubClassifier)));

    app.signup("Ada", "ada@example.com", "hunter2").unwrap();
    let lost = app
        .report_item(ItemKind::Lost, create("blue backpack"), None)
        .unwrap();

    app.signup("Bob", "bob@example.com", "secret").unwrap();
    // no textual overlap with the anchor, so nothing matched at report time
    let found = app
        .report_item(ItemKind::Found, create("found bag"), Some(vec![2]))
        .unwrap();
    assert!(app.db().matches().unwrap().is_empty());

    let (_, hits) = app.search_image(&[1], Some(&lost.item.id)).unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.id, found.item.id);
    assert!(hits[0].match_id.is_some());

    // the displayed hit is persisted as a pending lost -> found match
    let stored = app.db().matches().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].lost_item_id, lost.item.id);
    assert_eq!(stored[0].found_item_id, found.item.id);
    assert_eq!(stored[0].status, MatchStatus::Pending);
    assert!((stored[0].similarity - 0.953).abs() < 1e-9);
}

#[test]
fn test_search_image_requires_classifier() {
    let (_dir, app) = test_app(None);

    let err = app.search_image(&[1], None).unwrap_err();
    assert!(matches!(err, AppError::Classifier(_)));
}

#[test]
fn test_search_image_rejects_unrecognized_query() {
    let (_dir, app) = test_app(Some(Box::new(StubClassifier)));

    let err = app.search_image(&[0], None).unwrap_err();
    assert!(matches!(err, AppError::Classifier(_)));
}

#[test]
fn test_find_candidates_persists_pending_matches() {
    let (_dir, app) = test_app(None);

    app.signup("Ada", "ada@example.com", "hunter2").unwrap();
    let mut lost_spec = create("iPhone 13");
    lost_spec.category = "Electronics".to_string();
    let lost = app.report_item(ItemKind::Lost, lost_spec, None).unwrap();

    app.signup("Bob", "bob@example.com", "secret").unwrap();
    let mut found_spec = create("iPhone 13");
    found_spec.category = "Electronics".to_string();
    found_spec.location = "Main Station".to_string();
    let found = app.report_item(ItemKind::Found, found_spec, None).unwrap();

    let hits = app.find_candidates(&lost.item.id).unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.id, found.item.id);
    // name containment + category equality under the field heuristic
    assert!((hits[0].similarity - 0.5).abs() < 1e-9);
    assert!(hits[0].match_id.is_some());
}

#[test]
fn test_feedback_updates_match_and_items() {
    let (_dir, app) = test_app(None);

    app.signup("Ada", "ada@example.com", "hunter2").unwrap();
    let lost = app
        .report_item(ItemKind::Lost, create("Blue Backpack"), None)
        .unwrap();
    app.signup("Bob", "bob@example.com", "secret").unwrap();
    let found = app
        .report_item(ItemKind::Found, create("Blue Backpack"), None)
        .unwrap();
    let match_id = found.matches[0].id.clone();

    let rejected = app.feedback(&match_id, false).unwrap();
    assert_eq!(rejected.status, MatchStatus::Rejected);
    assert_eq!(
        app.get_item(&lost.item.id).unwrap().status,
        ItemStatus::Pending
    );

    let approved = app.feedback(&match_id, true).unwrap();
    assert_eq!(approved.status, MatchStatus::Approved);
    assert_eq!(
        app.get_item(&lost.item.id).unwrap().status,
        ItemStatus::Matched
    );
    assert_eq!(
        app.get_item(&found.item.id).unwrap().status,
        ItemStatus::Matched
    );

    let err = app.feedback(&crate::eid::Eid::new(), true).unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[test]
fn test_contact_owner_exchanges_details_and_approves() {
    let (_dir, app) = test_app(None);

    let ada = app.signup("Ada", "ada@example.com", "hunter2").unwrap();
    let lost = app
        .report_item(ItemKind::Lost, create("Blue Backpack"), None)
        .unwrap();
    let bob = app.signup("Bob", "bob@example.com", "secret").unwrap();
    let found = app
        .report_item(ItemKind::Found, create("Blue Backpack"), None)
        .unwrap();
    let m = &found.matches[0];

    let err = app.contact_owner(&m.id, &lost.item.id, "   ").unwrap_err();
    assert!(matches!(err, AppError::Other(_)));

    app.contact_owner(&m.id, &lost.item.id, "I think I found your bag")
        .unwrap();

    // the owner receives the sender's contact details, unread
    let to_ada = app.notifications(Some(&ada.id)).unwrap();
    let received = to_ada
        .iter()
        .find(|n| n.title == "New Message About Your Lost Item")
        .unwrap();
    assert!(!received.is_read);
    assert_eq!(received.contact_email.as_deref(), Some("bob@example.com"));
    assert_eq!(received.contact_name.as_deref(), Some("Bob"));
    assert!(received.message.contains("I think I found your bag"));

    // the sender gets a pre-read copy with the counterpart's details
    let to_bob = app.notifications(Some(&bob.id)).unwrap();
    let sent = to_bob
        .iter()
        .find(|n| n.title == "You Contacted About Lost Item")
        .unwrap();
    assert!(sent.is_read);
    assert_eq!(sent.contact_email.as_deref(), Some("ada@example.com"));

    // contacting implicitly approves the match
    let stored = app.db().match_by_id(&m.id).unwrap().unwrap();
    assert_eq!(stored.status, MatchStatus::Approved);
}

#[test]
fn test_notifications_default_to_current_user() {
    let (_dir, app) = test_app(None);

    app.signup("Ada", "ada@example.com", "hunter2").unwrap();
    app.report_item(ItemKind::Lost, create("Blue Backpack"), None)
        .unwrap();
    app.signup("Bob", "bob@example.com", "secret").unwrap();
    app.report_item(ItemKind::Found, create("Blue Backpack"), None)
        .unwrap();

    // Bob is logged in; he sees only his own match notification
    let mine = app.notifications(None).unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].title, "Potential Match Found!");

    app.mark_read(&mine[0].id).unwrap();
    assert!(app.notifications(None).unwrap()[0].is_read);

    app.logout().unwrap();
    let err = app.notifications(None).unwrap_err();
    assert!(matches!(err, AppError::NotLoggedIn));
}
