//! Registry of live table sessions.
//!
//! Process-scoped owner of the table map and the user→table index, with
//! explicit lifecycle: sessions are spawned here (restoring cached hand
//! state when present) and removed when they report closure. All index
//! updates go through this one owner.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use uuid::Uuid;

use super::config::TableConfig;
use super::messages::{RegistryEvent, SeatedInfo, ServerEvent, SessionError, SessionMessage};
use super::session::{SessionHandle, TableSession};
use crate::cache::{hand_key, HandStore};
use crate::directory::DirectoryClient;
use crate::game::entities::{Action, Chips};
use crate::game::errors::HandError;
use crate::game::hand::{Hand, HandView};

pub struct TableRegistry {
    store: Arc<dyn HandStore>,
    directory: Arc<DirectoryClient>,
    tables: RwLock<HashMap<String, SessionHandle>>,
    user_tables: RwLock<HashMap<i64, String>>,
    events: mpsc::UnboundedSender<RegistryEvent>,
}

impl TableRegistry {
    pub fn new(store: Arc<dyn HandStore>, directory: Arc<DirectoryClient>) -> Arc<Self> {
        let (events, mut rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            store,
            directory,
            tables: RwLock::new(HashMap::new()),
            user_tables: RwLock::new(HashMap::new()),
            events,
        });

        // Sessions report departures and closure back through a channel;
        // this task is the only writer applying them to the indexes.
        let weak = Arc::downgrade(&registry);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(registry) = weak.upgrade() else {
                    break;
                };
                match event {
                    RegistryEvent::UserLeft { user_id, table_id } => {
                        let mut users = registry.user_tables.write().await;
                        if users.get(&user_id) == Some(&table_id) {
                            users.remove(&user_id);
                        }
                    }
                    RegistryEvent::TableClosed { table_id } => {
                        registry.tables.write().await.remove(&table_id);
                        log::info!("table {table_id} removed from registry");
                    }
                }
            }
        });

        registry
    }

    pub async fn get(&self, table_id: &str) -> Option<SessionHandle> {
        self.tables.read().await.get(table_id).cloned()
    }

    pub async fn active_table_count(&self) -> usize {
        self.tables.read().await.len()
    }

    pub async fn table_for_user(&self, user_id: i64) -> Option<String> {
        self.user_tables.read().await.get(&user_id).cloned()
    }

    /// Fetch or spawn the session for a table, restoring serialized hand
    /// state from the cache when an entry exists.
    pub async fn get_or_create(
        &self,
        table_id: &str,
        community_id: Option<String>,
        config: TableConfig,
    ) -> Result<SessionHandle, SessionError> {
        if let Some(handle) = self.get(table_id).await {
            return Ok(handle);
        }
        config
            .validate()
            .map_err(|e| SessionError::Game(HandError::InvalidInput(e)))?;

        let restored = match self.store.load(&hand_key(table_id)).await {
            Ok(Some(bytes)) => match Hand::from_bytes(&bytes) {
                Ok(hand) => {
                    log::info!("table {table_id}: restored hand state from cache");
                    Some(hand)
                }
                Err(e) => {
                    log::error!("table {table_id}: discarding corrupt cached state: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::error!("table {table_id}: cache load failed: {e}");
                None
            }
        };

        let mut tables = self.tables.write().await;
        if let Some(handle) = tables.get(table_id) {
            return Ok(handle.clone());
        }
        let (session, handle) = TableSession::new(
            table_id.to_string(),
            community_id,
            config,
            restored,
            self.store.clone(),
            self.directory.clone(),
            self.events.clone(),
        );
        let restored_users = session.seated_users();
        tables.insert(table_id.to_string(), handle.clone());
        drop(tables);

        tokio::spawn(session.run());

        if !restored_users.is_empty() {
            let mut users = self.user_tables.write().await;
            for user_id in restored_users {
                users.insert(user_id, table_id.to_string());
            }
        }

        log::info!("table {table_id} session spawned");
        Ok(handle)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn seat_player(
        &self,
        table_id: &str,
        community_id: Option<String>,
        config: TableConfig,
        user_id: i64,
        name: String,
        seat: usize,
        buy_in: Chips,
    ) -> Result<SeatedInfo, SessionError> {
        let handle = self.get_or_create(table_id, community_id, config).await?;
        let (tx, rx) = oneshot::channel();
        handle
            .send(SessionMessage::SeatPlayer {
                user_id,
                name,
                seat,
                buy_in,
                respond: tx,
            })
            .await?;
        let info = rx.await.map_err(|_| SessionError::Closed)??;
        self.user_tables
            .write()
            .await
            .insert(user_id, table_id.to_string());
        Ok(info)
    }

    /// Mark a user's socket connected at whatever table hosts them.
    /// Returns the table id when the user was routed.
    pub async fn connect_user(
        &self,
        user_id: i64,
        socket_id: Uuid,
        sender: mpsc::Sender<ServerEvent>,
    ) -> Option<String> {
        let table_id = self.table_for_user(user_id).await?;
        let handle = self.get(&table_id).await?;
        handle
            .send(SessionMessage::Connect {
                user_id,
                socket_id,
                sender,
            })
            .await
            .ok()?;
        Some(table_id)
    }

    pub async fn disconnect_user(&self, user_id: i64, socket_id: Uuid) {
        if let Some(table_id) = self.table_for_user(user_id).await {
            if let Some(handle) = self.get(&table_id).await {
                let _ = handle
                    .send(SessionMessage::Disconnect { user_id, socket_id })
                    .await;
            }
        }
    }

    /// Admit an action at the table hosting the user.
    pub async fn submit_action(
        &self,
        user_id: i64,
        action: Action,
    ) -> Result<HandView, SessionError> {
        let table_id = self
            .table_for_user(user_id)
            .await
            .ok_or(SessionError::NotSeated)?;
        self.submit_action_at(&table_id, user_id, action).await
    }

    /// Admit an action at a specific table (agent/administrative path).
    pub async fn submit_action_at(
        &self,
        table_id: &str,
        user_id: i64,
        action: Action,
    ) -> Result<HandView, SessionError> {
        let handle = self.get(table_id).await.ok_or(SessionError::Closed)?;
        let (tx, rx) = oneshot::channel();
        handle
            .send(SessionMessage::TakeAction {
                user_id,
                action,
                respond: Some(tx),
            })
            .await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn state_for(&self, table_id: &str, user_id: i64) -> Option<HandView> {
        let handle = self.get(table_id).await?;
        let (tx, rx) = oneshot::channel();
        handle
            .send(SessionMessage::GetState {
                user_id,
                respond: tx,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Chat to an explicit table, or to wherever the user is seated.
    pub async fn chat(&self, user_id: i64, text: String, table_id: Option<String>) {
        let table_id = match table_id {
            Some(t) => Some(t),
            None => self.table_for_user(user_id).await,
        };
        if let Some(table_id) = table_id {
            if let Some(handle) = self.get(&table_id).await {
                let _ = handle.send(SessionMessage::Chat { user_id, text }).await;
            }
        }
    }

    pub async fn leave(&self, user_id: i64) -> Result<(), SessionError> {
        let table_id = self
            .table_for_user(user_id)
            .await
            .ok_or(SessionError::NotSeated)?;
        let handle = self.get(&table_id).await.ok_or(SessionError::Closed)?;
        let (tx, rx) = oneshot::channel();
        handle
            .send(SessionMessage::Leave {
                user_id,
                respond: Some(tx),
            })
            .await?;
        let result = rx.await.map_err(|_| SessionError::Closed)?;
        self.user_tables.write().await.remove(&user_id);
        result
    }
}
