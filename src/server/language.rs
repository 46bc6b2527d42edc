//! Per-user preferred-language cache.
//!
//! `/api/search` resolves the caller's languages on every request;
//! going to the profile store each time would put a storage read on the
//! hot path, so resolved lists are cached briefly per uid.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::profile::ProfileStore;
use crate::search::TieredCache;

const LANGUAGE_CACHE_TTL: Duration = Duration::from_secs(120);
const LANGUAGE_CACHE_CAP: usize = 512;

pub struct UserLanguageCache {
    cache: TieredCache<String, Arc<Vec<String>>>,
}

impl UserLanguageCache {
    pub fn new() -> Self {
        Self {
            cache: TieredCache::with_ttl(LANGUAGE_CACHE_TTL, LANGUAGE_CACHE_CAP),
        }
    }

    /// The user's preferred languages, lowercased. Unknown users and
    /// store failures resolve to an empty list.
    pub async fn preferred_languages(
        &self,
        profiles: &Arc<dyn ProfileStore>,
        uid: &str,
    ) -> Vec<String> {
        if let Some((languages, _)) = self.cache.get(&uid.to_string()) {
            return languages.as_ref().clone();
        }

        let languages = match profiles.preferences(uid).await {
            Ok(Some(preferences)) => preferences
                .languages
                .iter()
                .map(|l| l.to_lowercase())
                .collect(),
            Ok(None) => Vec::new(),
            Err(err) => {
                debug!("language resolution failed for {uid}: {err}");
                return Vec::new();
            }
        };

        self.cache.put(uid.to_string(), Arc::new(languages.clone()));
        languages
    }

    pub fn invalidate(&self, uid: &str) {
        self.cache.remove(&uid.to_string());
    }
}

impl Default for UserLanguageCache {
    fn default() -> Self {
        Self::new()
    }
}
