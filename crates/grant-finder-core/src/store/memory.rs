//! In-memory [`GrantStore`] and [`PreferenceStore`] implementations for
//! testing and embedding.
//!
//! Uses `Vec` and `HashMap` behind `std::sync::RwLock`. Predicates are
//! evaluated with [`Predicate::matches`] and ordering with
//! [`compare_records`], so results agree with the SQL rendering.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{GrantRecord, PreferenceProfile, UserPreferences};
use crate::query::{compare_records, OrderTerm, Predicate, Window};

use super::{GrantStore, PreferenceStore};

/// In-memory grant collection.
pub struct InMemoryGrantStore {
    grants: RwLock<Vec<GrantRecord>>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self { grants: RwLock::new(Vec::new()) }
    }

    pub fn with_grants(grants: Vec<GrantRecord>) -> Self {
        let store = Self::new();
        store.upsert_all(grants);
        store
    }

    /// Insert or replace records by id.
    pub fn upsert_all(&self, grants: Vec<GrantRecord>) {
        let mut stored = self.grants.write().unwrap_or_else(|e| e.into_inner());
        for grant in grants {
            match stored.iter_mut().find(|g| g.id == grant.id) {
                Some(existing) => *existing = grant,
                None => stored.push(grant),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.grants.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryGrantStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn count(&self, predicates: &[Predicate]) -> Result<u64> {
        let grants = self.grants.read().map_err(|_| anyhow!("grant store lock poisoned"))?;
        let n = grants
            .iter()
            .filter(|g| predicates.iter().all(|p| p.matches(g)))
            .count();
        Ok(n as u64)
    }

    async fn fetch(
        &self,
        predicates: &[Predicate],
        order: &[OrderTerm],
        window: Window,
    ) -> Result<Vec<GrantRecord>> {
        let grants = self.grants.read().map_err(|_| anyhow!("grant store lock poisoned"))?;
        let mut matched: Vec<GrantRecord> = grants
            .iter()
            .filter(|g| predicates.iter().all(|p| p.matches(g)))
            .cloned()
            .collect();
        matched.sort_by(|a, b| compare_records(a, b, order));
        Ok(window.apply(matched))
    }
}

/// In-memory preference profiles keyed by user id.
pub struct InMemoryPreferenceStore {
    profiles: RwLock<HashMap<String, UserPreferences>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self { profiles: RwLock::new(HashMap::new()) }
    }

    pub fn insert(&self, profile: PreferenceProfile) {
        let mut profiles = self.profiles.write().unwrap_or_else(|e| e.into_inner());
        profiles.insert(profile.user_id, profile.preferences);
    }
}

impl Default for InMemoryPreferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| anyhow!("preference store lock poisoned"))?;
        Ok(profiles.get(user_id).cloned())
    }
}
