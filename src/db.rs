use std::io::ErrorKind;

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    eid::Eid,
    records::{Item, ItemKind, ItemMatch, ItemStatus, MatchStatus, Notification, User},
    storage::{BackendLocal, StorageManager},
};

const USERS_KEY: &str = "users.json";
const ITEMS_KEY: &str = "items.json";
const MATCHES_KEY: &str = "matches.json";
const NOTIFICATIONS_KEY: &str = "notifications.json";
const SESSION_KEY: &str = "current_user.json";

/// Typed collections over the flat blob store.
///
/// Every operation is read-modify-write against a whole collection snapshot.
/// There are no transactions; concurrent writers can overwrite each other's
/// snapshot. Single-process use is assumed.
pub struct Database {
    store: Box<dyn StorageManager>,
}

impl Database {
    pub fn new(store: Box<dyn StorageManager>) -> Self {
        Self { store }
    }

    pub fn open(data_dir: &str) -> anyhow::Result<Self> {
        let store = BackendLocal::new(data_dir)?;
        Ok(Self::new(Box::new(store)))
    }

    /// A missing key reads as an empty collection.
    fn read_collection<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Vec<T>> {
        match self.store.read(key) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(vec![]),
            Err(err) => Err(err.into()),
        }
    }

    fn write_collection<T: Serialize>(&self, key: &str, records: &[T]) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(records)?;
        self.store.write(key, &bytes)?;
        Ok(())
    }

    /// Raw blob access, used for locally stored report images.
    pub fn write_blob(&self, key: &str, data: &[u8]) -> anyhow::Result<()> {
        self.store.write(key, data)?;
        Ok(())
    }

    pub fn read_blob(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match self.store.read(key) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    // --- users ---

    pub fn users(&self) -> anyhow::Result<Vec<User>> {
        self.read_collection(USERS_KEY)
    }

    pub fn save_user(&self, user: User) -> anyhow::Result<User> {
        let mut users = self.users()?;
        users.push(user.clone());
        self.write_collection(USERS_KEY, &users)?;
        Ok(user)
    }

    pub fn user_by_id(&self, id: &Eid) -> anyhow::Result<Option<User>> {
        Ok(self.users()?.into_iter().find(|u| &u.id == id))
    }

    pub fn user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.users()?.into_iter().find(|u| u.email == email))
    }

    // --- session pointer ---

    pub fn set_current_user(&self, user: &User) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(user)?;
        self.store.write(SESSION_KEY, &bytes)?;
        Ok(())
    }

    pub fn current_user(&self) -> anyhow::Result<Option<User>> {
        match self.store.read(SESSION_KEY) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn clear_current_user(&self) -> anyhow::Result<()> {
        match self.store.delete(SESSION_KEY) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    // --- items ---

    pub fn items(&self) -> anyhow::Result<Vec<Item>> {
        self.read_collection(ITEMS_KEY)
    }

    pub fn save_item(&self, item: Item) -> anyhow::Result<Item> {
        let mut items = self.items()?;
        items.push(item.clone());
        self.write_collection(ITEMS_KEY, &items)?;
        Ok(item)
    }

    pub fn item_by_id(&self, id: &Eid) -> anyhow::Result<Option<Item>> {
        Ok(self.items()?.into_iter().find(|i| &i.id == id))
    }

    /// Replaces the stored record with the same id. Returns None if absent.
    pub fn update_item(&self, updated: Item) -> anyhow::Result<Option<Item>> {
        let mut items = self.items()?;
        match items.iter().position(|i| i.id == updated.id) {
            Some(idx) => {
                items[idx] = updated.clone();
                self.write_collection(ITEMS_KEY, &items)?;
                Ok(Some(updated))
            }
            None => Ok(None),
        }
    }

    pub fn items_by_user(&self, user_id: &Eid) -> anyhow::Result<Vec<Item>> {
        Ok(self
            .items()?
            .into_iter()
            .filter(|i| &i.user_id == user_id)
            .collect())
    }

    pub fn items_of_kind(&self, kind: ItemKind) -> anyhow::Result<Vec<Item>> {
        Ok(self
            .items()?
            .into_iter()
            .filter(|i| i.kind == kind)
            .collect())
    }

    // --- matches ---

    pub fn matches(&self) -> anyhow::Result<Vec<ItemMatch>> {
        self.read_collection(MATCHES_KEY)
    }

    /// Deduplicating save. At most one match is stored per
    /// (lost_item_id, found_item_id) pair: on a duplicate the stored
    /// similarity is raised to the new score if that is higher, otherwise the
    /// existing record is returned untouched.
    pub fn save_match(&self, m: ItemMatch) -> anyhow::Result<ItemMatch> {
        let mut matches = self.matches()?;

        if let Some(existing) = matches
            .iter_mut()
            .find(|e| e.lost_item_id == m.lost_item_id && e.found_item_id == m.found_item_id)
        {
            if existing.similarity < m.similarity {
                existing.similarity = m.similarity;
                let result = existing.clone();
                self.write_collection(MATCHES_KEY, &matches)?;
                return Ok(result);
            }
            return Ok(existing.clone());
        }

        matches.push(m.clone());
        self.write_collection(MATCHES_KEY, &matches)?;
        Ok(m)
    }

    pub fn match_by_id(&self, id: &Eid) -> anyhow::Result<Option<ItemMatch>> {
        Ok(self.matches()?.into_iter().find(|m| &m.id == id))
    }

    pub fn matches_for_item(&self, item_id: &Eid) -> anyhow::Result<Vec<ItemMatch>> {
        Ok(self
            .matches()?
            .into_iter()
            .filter(|m| &m.lost_item_id == item_id || &m.found_item_id == item_id)
            .collect())
    }

    /// Sets a match status. Approving forces both referenced items to
    /// Matched; rejecting leaves item status untouched.
    pub fn set_match_status(
        &self,
        match_id: &Eid,
        status: MatchStatus,
    ) -> anyhow::Result<Option<ItemMatch>> {
        let mut matches = self.matches()?;
        let Some(m) = matches.iter_mut().find(|m| &m.id == match_id) else {
            return Ok(None);
        };

        m.status = status;
        let result = m.clone();
        self.write_collection(MATCHES_KEY, &matches)?;

        if status == MatchStatus::Approved {
            for item_id in [&result.lost_item_id, &result.found_item_id] {
                if let Some(mut item) = self.item_by_id(item_id)? {
                    item.status = ItemStatus::Matched;
                    self.update_item(item)?;
                } else {
                    log::warn!("match {match_id} references missing item {item_id}");
                }
            }
        }

        Ok(Some(result))
    }

    // --- notifications ---

    pub fn notifications(&self) -> anyhow::Result<Vec<Notification>> {
        self.read_collection(NOTIFICATIONS_KEY)
    }

    pub fn notify(&self, notification: Notification) -> anyhow::Result<Notification> {
        let mut notifications = self.notifications()?;
        notifications.push(notification.clone());
        self.write_collection(NOTIFICATIONS_KEY, &notifications)?;
        Ok(notification)
    }

    /// All notifications for a user, newest first.
    pub fn notifications_for_user(&self, user_id: &Eid) -> anyhow::Result<Vec<Notification>> {
        let mut result: Vec<Notification> = self
            .notifications()?
            .into_iter()
            .filter(|n| &n.user_id == user_id)
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    /// Flips is_read in place. Unknown ids are a no-op, not an error.
    pub fn mark_read(&self, notification_id: &Eid) -> anyhow::Result<()> {
        let mut notifications = self.notifications()?;
        if let Some(n) = notifications.iter_mut().find(|n| &n.id == notification_id) {
            n.is_read = true;
            self.write_collection(NOTIFICATIONS_KEY, &notifications)?;
        }
        Ok(())
    }
}
