//! In-memory activity list and annotation store.
//!
//! Single-threaded stand-ins for the SQLite implementations. Hosts without a
//! database and tests use them; both honour the same trait contracts.

use crate::model::activity::{Activity, ActivityDraft, ActivityId};
use crate::model::annotation::{AnnotationKey, AnnotationValue};
use crate::repo::activity_repo::{ActivityList, RepoError, RepoResult};
use crate::repo::annotation_store::{
    decode_annotation, encode_annotation, AnnotationResult, AnnotationStore,
};
use std::cell::RefCell;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Vector-backed activity list preserving insertion order.
#[derive(Debug, Default)]
pub struct MemoryActivityList {
    activities: RefCell<Vec<Activity>>,
}

impl MemoryActivityList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the list with already-identified activities.
    pub fn with_activities(activities: Vec<Activity>) -> Self {
        Self {
            activities: RefCell::new(activities),
        }
    }

    pub fn len(&self) -> usize {
        self.activities.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.borrow().is_empty()
    }

    /// Clones the current contents in list order.
    pub fn snapshot(&self) -> Vec<Activity> {
        self.activities.borrow().clone()
    }
}

impl ActivityList for MemoryActivityList {
    fn list(&self) -> RepoResult<Vec<Activity>> {
        Ok(self.snapshot())
    }

    fn create(&self, draft: ActivityDraft) -> RepoResult<Activity> {
        draft.validate()?;
        let activity = draft.into_activity(Uuid::new_v4());
        self.activities.borrow_mut().push(activity.clone());
        Ok(activity)
    }

    fn remove(&self, id: ActivityId) -> RepoResult<()> {
        let mut activities = self.activities.borrow_mut();
        let position = activities
            .iter()
            .position(|activity| activity.id == id)
            .ok_or(RepoError::NotFound(id))?;
        activities.remove(position);
        Ok(())
    }
}

/// Map-backed annotation store holding the encoded text form.
#[derive(Debug, Default)]
pub struct MemoryAnnotationStore {
    entries: RefCell<BTreeMap<AnnotationKey, String>>,
}

impl MemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw text without encoding, e.g. to simulate a damaged entry.
    pub fn insert_raw(&self, key: AnnotationKey, stored: impl Into<String>) {
        self.entries.borrow_mut().insert(key, stored.into());
    }

    /// Raw stored text for one key.
    pub fn raw(&self, key: &AnnotationKey) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Clones every stored entry in key order.
    pub fn snapshot(&self) -> BTreeMap<AnnotationKey, String> {
        self.entries.borrow().clone()
    }
}

impl AnnotationStore for MemoryAnnotationStore {
    fn read(&self, key: &AnnotationKey) -> AnnotationResult<Option<AnnotationValue>> {
        self.entries
            .borrow()
            .get(key)
            .map(|stored| decode_annotation(key, stored))
            .transpose()
    }

    fn write(&self, key: &AnnotationKey, value: &AnnotationValue) -> AnnotationResult<()> {
        let encoded = encode_annotation(key, value)?;
        self.entries.borrow_mut().insert(*key, encoded);
        Ok(())
    }
}
