//! The sync server facade.
//!
//! Owns one reconciler and change feed per registered entity type,
//! shares a single tombstone log across all of them, and resolves
//! tokens to owner ids before dispatching.

use crate::auth::TokenAuthority;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::feed::ChangeFeed;
use crate::reconciler::Reconciler;
use crate::store::{AuthoritativeStore, MemoryStore};
use crate::tombstone::TombstoneLog;
use driftsync_model::{EntityRegistry, EntityType};
use driftsync_protocol::{PullRequest, PullResult, PushRequest, PushResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

struct Collection {
    reconciler: Reconciler,
    feed: ChangeFeed,
}

/// Entry point for the authoritative side of a sync deployment.
pub struct SyncServer {
    config: ServerConfig,
    auth: Option<TokenAuthority>,
    tombstones: Arc<TombstoneLog>,
    registry: RwLock<EntityRegistry>,
    collections: RwLock<HashMap<String, Collection>>,
}

impl SyncServer {
    /// Creates a server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let auth = config.auth.clone().map(TokenAuthority::new);
        Self {
            config,
            auth,
            tombstones: Arc::new(TombstoneLog::new()),
            registry: RwLock::new(EntityRegistry::new()),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Registers an entity type backed by a fresh in-memory store.
    pub fn register_entity(&self, entity_type: impl Into<EntityType>) {
        self.register_entity_with_store(entity_type, Arc::new(MemoryStore::new()));
    }

    /// Registers an entity type backed by the given store.
    ///
    /// The declaration governs what the feed serves: fields outside the
    /// type's persistent projection never leave the server.
    pub fn register_entity_with_store(
        &self,
        entity_type: impl Into<EntityType>,
        store: Arc<dyn AuthoritativeStore>,
    ) {
        let entity_type = entity_type.into();
        let name = entity_type.name().to_string();
        let collection = Collection {
            reconciler: Reconciler::new(&name, store.clone(), self.tombstones.clone()),
            feed: ChangeFeed::new(entity_type.clone(), store, self.tombstones.clone()),
        };
        self.registry.write().register(entity_type);
        self.collections.write().insert(name.clone(), collection);
        info!(entity_type = %name, "registered entity type");
    }

    /// Returns the names of the registered entity types.
    pub fn registered_entity_types(&self) -> Vec<String> {
        self.registry.read().names().map(String::from).collect()
    }

    /// Issues a token for an owner.
    ///
    /// With authentication disabled the token is the owner id itself.
    pub fn issue_token(&self, owner_id: &str) -> Vec<u8> {
        match &self.auth {
            Some(authority) => authority.issue(owner_id),
            None => owner_id.as_bytes().to_vec(),
        }
    }

    /// Applies a pushed batch for the entity type, scoped to the
    /// token's owner.
    pub fn handle_push(
        &self,
        token: &[u8],
        entity_type: &str,
        request: &PushRequest,
    ) -> ServerResult<PushResult> {
        let owner_id = self.resolve_owner(token)?;
        if request.changes.len() > self.config.max_push_batch {
            return Err(ServerError::InvalidRequest(format!(
                "too many changes: {} > {}",
                request.changes.len(),
                self.config.max_push_batch
            )));
        }

        self.with_collection(entity_type, |collection| {
            Ok(collection
                .reconciler
                .apply_client_changes(&owner_id, &request.changes, &request.options))
        })
    }

    /// Serves a pull for the entity type, scoped to the token's owner.
    pub fn handle_pull(
        &self,
        token: &[u8],
        entity_type: &str,
        request: &PullRequest,
    ) -> ServerResult<PullResult> {
        let owner_id = self.resolve_owner(token)?;
        self.with_collection(entity_type, |collection| {
            collection.feed.changes_since(&owner_id, request)
        })
    }

    /// Returns the shared tombstone log.
    pub fn tombstones(&self) -> &Arc<TombstoneLog> {
        &self.tombstones
    }

    fn resolve_owner(&self, token: &[u8]) -> ServerResult<String> {
        match &self.auth {
            Some(authority) => authority.resolve(token),
            None => String::from_utf8(token.to_vec())
                .map_err(|_| ServerError::NotAuthorized("owner id is not valid UTF-8".into())),
        }
    }

    fn with_collection<T>(
        &self,
        entity_type: &str,
        f: impl FnOnce(&Collection) -> ServerResult<T>,
    ) -> ServerResult<T> {
        let collections = self.collections.read();
        let collection = collections
            .get(entity_type)
            .ok_or_else(|| ServerError::UnknownEntityType(entity_type.to_string()))?;
        f(collection)
    }
}
