//! Channel → actor routing.
//!
//! Actors are spawned lazily on first use and share nothing: each gets its
//! own scoped store from the [`StoreFactory`].

use std::collections::HashMap;
use std::sync::Arc;

use berth_state::{validate_scope, StoreFactory};
use tokio::sync::Mutex;
use tracing::info;

use crate::actor::{ActorHandle, ReleaseActor, Settings};
use crate::domain::{BerthError, Result};

/// One channel's actor; locked only while that channel starts up.
type Slot = Arc<Mutex<Option<ActorHandle>>>;

pub struct ChannelRegistry {
    factory: Arc<dyn StoreFactory>,
    settings: Settings,
    actors: Mutex<HashMap<String, Slot>>,
}

impl ChannelRegistry {
    pub fn new(factory: Arc<dyn StoreFactory>, settings: Settings) -> Self {
        Self {
            factory,
            settings,
            actors: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Handle for `channel`, starting its actor if none is running.
    ///
    /// Opening a channel's store holds only that channel's slot, so a slow
    /// open never delays lookups on other channels.
    pub async fn actor(&self, channel: &str) -> Result<ActorHandle> {
        validate_scope(channel).map_err(|_| {
            BerthError::InvalidChannel(format!(
                "'{channel}' must be 1-64 characters of [A-Za-z0-9_-]"
            ))
        })?;

        let slot = self
            .actors
            .lock()
            .await
            .entry(channel.to_string())
            .or_default()
            .clone();

        let mut slot = slot.lock().await;
        if let Some(handle) = slot.as_ref() {
            if !handle.is_closed() {
                return Ok(handle.clone());
            }
        }

        let store = self.factory.open(channel).await?;
        let handle = ReleaseActor::spawn(channel, store, self.settings.clone());
        info!(channel = %channel, "release actor spawned");
        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Channels with a live actor.
    pub async fn channels(&self) -> Vec<String> {
        let slots: Vec<(String, Slot)> = self
            .actors
            .lock()
            .await
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect();
        let mut names = Vec::new();
        for (name, slot) in slots {
            if slot.lock().await.as_ref().is_some_and(|h| !h.is_closed()) {
                names.push(name);
            }
        }
        names.sort();
        names
    }

    /// Stop every actor and wait for each to finish its queue.
    pub async fn shutdown(&self) {
        let slots: Vec<Slot> = self.actors.lock().await.drain().map(|(_, s)| s).collect();
        for slot in slots {
            let handle = slot.lock().await.take();
            if let Some(handle) = handle {
                handle.shutdown().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use berth_state::fakes::MemoryStoreFactory;
    use berth_state::{StateStore, StorageResult};
    use tokio::sync::Notify;

    /// Holds `open("slow")` until released.
    struct GatedFactory {
        inner: MemoryStoreFactory,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl StoreFactory for GatedFactory {
        async fn open(&self, scope: &str) -> StorageResult<Arc<dyn StateStore>> {
            if scope == "slow" {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.open(scope).await
        }
    }

    #[tokio::test]
    async fn rejects_malformed_channel_names() {
        let registry = ChannelRegistry::new(Arc::new(MemoryStoreFactory::new()), Settings::default());
        let long = "x".repeat(65);
        for bad in ["", "has space", "slash/name", long.as_str()] {
            assert!(matches!(
                registry.actor(bad).await,
                Err(BerthError::InvalidChannel(_))
            ));
        }
    }

    #[tokio::test]
    async fn reuses_live_actor_and_respawns_stopped_one() {
        let registry = ChannelRegistry::new(Arc::new(MemoryStoreFactory::new()), Settings::default());
        let first = registry.actor("web").await.unwrap();
        let again = registry.actor("web").await.unwrap();
        assert!(!again.is_closed());
        assert_eq!(registry.channels().await, vec!["web"]);

        first.shutdown().await;
        assert!(again.is_closed());
        let respawned = registry.actor("web").await.unwrap();
        assert!(!respawned.is_closed());

        registry.shutdown().await;
        assert!(respawned.is_closed());
        assert!(registry.channels().await.is_empty());
    }

    #[tokio::test]
    async fn slow_store_open_does_not_block_other_channels() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let registry = Arc::new(ChannelRegistry::new(
            Arc::new(GatedFactory {
                inner: MemoryStoreFactory::new(),
                entered: entered.clone(),
                release: release.clone(),
            }),
            Settings::default(),
        ));

        let pending = tokio::spawn({
            let registry = registry.clone();
            async move { registry.actor("slow").await }
        });
        entered.notified().await;

        let fast = tokio::time::timeout(Duration::from_secs(2), registry.actor("fast"))
            .await
            .expect("lookup on another channel waited for the slow open")
            .unwrap();
        assert!(!fast.is_closed());

        release.notify_one();
        let slow = pending.await.unwrap().unwrap();
        assert!(!slow.is_closed());
        assert_eq!(registry.channels().await, vec!["fast", "slow"]);
        registry.shutdown().await;
    }
}
