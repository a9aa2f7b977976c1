//! Manage provider records for content ids.

use std::fmt::Debug;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use lru::LruCache;
use tracing::trace;

use crate::common::{ContentId, PeerId};
use crate::Context;

/// How long a provider record stays valid after it was announced.
pub const PROVIDE_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// Index of which peers provide which content.
///
/// Owns provider record expiry.
pub trait ProviderIndex: Send + Sync + Debug {
    /// Unexpired providers of `cid`, possibly empty.
    fn get_providers(&self, ctx: &Context, cid: &ContentId) -> Vec<PeerId>;

    /// Record `provider` as a provider of `cid`.
    fn add_provider(&self, ctx: &Context, cid: &ContentId, provider: &PeerId);
}

#[derive(Debug, Clone)]
pub struct ProviderStoreSettings {
    /// Maximum number of content ids to keep providers for.
    ///
    /// Defaults to 2000
    pub max_keys: NonZeroUsize,
    /// Maximum number of providers kept per content id.
    ///
    /// Defaults to 500
    pub max_providers_per_key: NonZeroUsize,
    /// Defaults to [PROVIDE_VALIDITY]
    pub provide_validity: Duration,
}

impl Default for ProviderStoreSettings {
    fn default() -> Self {
        Self {
            max_keys: NonZeroUsize::new(2000).unwrap_or(NonZeroUsize::MIN),
            max_providers_per_key: NonZeroUsize::new(500).unwrap_or(NonZeroUsize::MIN),
            provide_validity: PROVIDE_VALIDITY,
        }
    }
}

#[derive(Debug)]
/// An LRU cache of providers per content id, each expiring on its own.
pub struct ProviderStore {
    keys: Mutex<LruCache<Bytes, LruCache<PeerId, Instant>>>,
    settings: ProviderStoreSettings,
}

impl ProviderStore {
    pub fn new(settings: ProviderStoreSettings) -> Self {
        Self {
            keys: Mutex::new(LruCache::new(settings.max_keys)),
            settings,
        }
    }

    /// Number of content ids with at least one provider entry, expired or not.
    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProviderStore {
    fn default() -> Self {
        Self::new(ProviderStoreSettings::default())
    }
}

impl ProviderIndex for ProviderStore {
    fn get_providers(&self, _ctx: &Context, cid: &ContentId) -> Vec<PeerId> {
        let now = Instant::now();
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);

        let providers = match keys.get_mut(cid.as_bytes()) {
            Some(providers) => providers,
            None => return vec![],
        };

        let expired: Vec<PeerId> = providers
            .iter()
            .filter(|(_, expires)| **expires <= now)
            .map(|(provider, _)| provider.clone())
            .collect();

        for provider in &expired {
            trace!(?provider, "Dropping expired provider record");
            providers.pop(provider);
        }

        let result = providers.iter().map(|(provider, _)| provider.clone()).collect();

        if providers.is_empty() {
            keys.pop(cid.as_bytes());
        }

        result
    }

    fn add_provider(&self, _ctx: &Context, cid: &ContentId, provider: &PeerId) {
        let expires = Instant::now() + self.settings.provide_validity;
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(providers) = keys.get_mut(cid.as_bytes()) {
            providers.put(provider.clone(), expires);
        } else {
            let mut providers = LruCache::new(self.settings.max_providers_per_key);
            providers.put(provider.clone(), expires);
            keys.put(Bytes::copy_from_slice(cid.as_bytes()), providers);
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::RAW;

    fn cid(n: u8) -> ContentId {
        ContentId::new_v1(RAW, 0x12, &[n; 32])
    }

    fn store(max_keys: usize, max_providers_per_key: usize) -> ProviderStore {
        ProviderStore::new(ProviderStoreSettings {
            max_keys: NonZeroUsize::new(max_keys).unwrap(),
            max_providers_per_key: NonZeroUsize::new(max_providers_per_key).unwrap(),
            provide_validity: PROVIDE_VALIDITY,
        })
    }

    #[test]
    fn max_keys() {
        let ctx = Context::new();
        let store = store(1, 100);

        let provider = PeerId::random();

        store.add_provider(&ctx, &cid(1), &provider);
        store.add_provider(&ctx, &cid(2), &provider);

        assert_eq!(store.len(), 1);
        assert!(store.get_providers(&ctx, &cid(1)).is_empty());
        assert_eq!(store.get_providers(&ctx, &cid(2)), vec![provider]);
    }

    #[test]
    fn most_recent_providers() {
        let ctx = Context::new();
        let store = store(1, 2);

        let a = PeerId::random();
        let b = PeerId::random();
        let c = PeerId::random();

        store.add_provider(&ctx, &cid(1), &a);
        store.add_provider(&ctx, &cid(1), &b);
        store.add_provider(&ctx, &cid(1), &c);

        assert_eq!(store.get_providers(&ctx, &cid(1)), vec![c, b]);
    }

    #[test]
    fn readding_does_not_duplicate() {
        let ctx = Context::new();
        let store = ProviderStore::default();
        let provider = PeerId::random();

        store.add_provider(&ctx, &cid(1), &provider);
        store.add_provider(&ctx, &cid(1), &provider);

        assert_eq!(store.get_providers(&ctx, &cid(1)), vec![provider]);
    }

    #[test]
    fn expired_providers() {
        let ctx = Context::new();
        let store = ProviderStore::new(ProviderStoreSettings {
            provide_validity: Duration::ZERO,
            ..Default::default()
        });

        store.add_provider(&ctx, &cid(1), &PeerId::random());

        assert!(store.get_providers(&ctx, &cid(1)).is_empty());
        assert!(store.is_empty());
    }
}
