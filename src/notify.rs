//! Notification fanout.
//!
//! Match notifications are deliberately generic: no similarity score and no
//! counterpart contact details are disclosed. Contact details are only
//! exchanged through an explicit user-initiated message, which creates a
//! fresh pair of notifications carrying the sender's name and email.

use chrono::Utc;

use crate::{
    db::Database,
    eid::Eid,
    records::{Item, ItemKind, ItemMatch, Notification, User},
};

/// One notification per involved party: the lost item's owner and the found
/// item's reporter.
pub fn notify_match(db: &Database, m: &ItemMatch, lost: &Item, found: &Item) -> anyhow::Result<()> {
    db.notify(Notification {
        id: Eid::new(),
        user_id: lost.user_id.clone(),
        title: "Potential Match Found!".to_string(),
        message: format!("We found a potential match for your lost {}.", lost.name),
        related_item_id: Some(lost.id.clone()),
        match_id: Some(m.id.clone()),
        is_read: false,
        created_at: Utc::now(),
        contact_email: None,
        contact_phone: None,
        contact_name: None,
    })?;

    db.notify(Notification {
        id: Eid::new(),
        user_id: found.user_id.clone(),
        title: "Potential Match Found!".to_string(),
        message: format!("We found a potential owner for the {} you found.", found.name),
        related_item_id: Some(found.id.clone()),
        match_id: Some(m.id.clone()),
        is_read: false,
        created_at: Utc::now(),
        contact_email: None,
        contact_phone: None,
        contact_name: None,
    })?;

    Ok(())
}

/// Direct user-to-user contact about a matched item. The recipient gets the
/// sender's contact details; the sender gets a pre-read copy carrying the
/// counterpart's details.
pub fn notify_contact(
    db: &Database,
    sender: &User,
    counterpart: Option<&User>,
    item: &Item,
    match_id: &Eid,
    message: &str,
) -> anyhow::Result<()> {
    let kind_word = match item.kind {
        ItemKind::Lost => "Lost",
        ItemKind::Found => "Found",
    };
    let party = match item.kind {
        ItemKind::Lost => "owner",
        ItemKind::Found => "finder",
    };

    db.notify(Notification {
        id: Eid::new(),
        user_id: item.user_id.clone(),
        title: format!("New Message About Your {kind_word} Item"),
        message: format!(
            "{} has sent you a message regarding your {}: \"{message}\"",
            sender.name, item.name
        ),
        related_item_id: Some(item.id.clone()),
        match_id: Some(match_id.clone()),
        is_read: false,
        created_at: Utc::now(),
        contact_email: Some(sender.email.clone()),
        contact_phone: None,
        contact_name: Some(sender.name.clone()),
    })?;

    db.notify(Notification {
        id: Eid::new(),
        user_id: sender.id.clone(),
        title: format!("You Contacted About {kind_word} Item"),
        message: format!(
            "You sent a message to the {party} of {}: \"{message}\"",
            item.name
        ),
        related_item_id: Some(item.id.clone()),
        match_id: Some(match_id.clone()),
        is_read: true,
        created_at: Utc::now(),
        contact_email: counterpart.map(|u| u.email.clone()),
        contact_phone: None,
        contact_name: Some(
            counterpart
                .map(|u| u.name.clone())
                .unwrap_or_else(|| "Item Owner".to_string()),
        ),
    })?;

    Ok(())
}
