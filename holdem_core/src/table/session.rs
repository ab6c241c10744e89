//! Table session actor.
//!
//! One actor per table. Its inbox is the single writer for everything
//! the table owns: the hand, readiness sets, disconnect records, the
//! chat ring, and the cache entry. Operations on different tables run in
//! parallel; within a table the inbox serializes them. After every
//! admitted transition the actor persists the hand bytes to the cache
//! and only then fans out personalized snapshots, so a crash never
//! broadcasts state that was not saved.
//!
//! Directory I/O (buy-in debits, payouts, unseats, hand history) is
//! spawned off the actor turn: the state transition commits first, the
//! intent report happens outside the writer.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::interval;
use uuid::Uuid;

use super::chat::{ChatMessage, ChatRing};
use super::config::TableConfig;
use super::messages::{
    RegistryEvent, SeatedInfo, ServerEvent, SessionError, SessionMessage,
};
use crate::cache::{hand_key, HandStore};
use crate::directory::DirectoryClient;
use crate::game::constants::NEXT_HAND_DELAY_MS;
use crate::game::entities::{Action, Stage};
use crate::game::errors::HandError;
use crate::game::hand::{Hand, HandSummary, HandView, JoinStatus};

/// A seated user who lost their socket: who may resume, until when, and
/// what to replay when they do.
#[derive(Debug)]
struct DisconnectRecord {
    socket_id: Uuid,
    deadline: DateTime<Utc>,
    snapshot: HandView,
    chat_snapshot: Vec<ChatMessage>,
}

/// Handle for sending messages to a table session.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    table_id: String,
}

impl SessionHandle {
    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    pub async fn send(&self, message: SessionMessage) -> Result<(), SessionError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

pub struct TableSession {
    table_id: String,
    community_id: Option<String>,
    config: TableConfig,
    hand: Hand,
    inbox: mpsc::Receiver<SessionMessage>,
    store: Arc<dyn HandStore>,
    directory: Arc<DirectoryClient>,
    events: mpsc::UnboundedSender<RegistryEvent>,
    /// user id -> display name for everyone holding a seat.
    seated: HashMap<i64, String>,
    /// user id -> live socket; always a subset of `seated`.
    connected: HashMap<i64, Uuid>,
    senders: HashMap<i64, mpsc::Sender<ServerEvent>>,
    chat: ChatRing,
    disconnects: HashMap<i64, DisconnectRecord>,
    next_hand_at: Option<DateTime<Utc>>,
    closed: bool,
}

impl TableSession {
    pub fn new(
        table_id: String,
        community_id: Option<String>,
        config: TableConfig,
        restored: Option<Hand>,
        store: Arc<dyn HandStore>,
        directory: Arc<DirectoryClient>,
        events: mpsc::UnboundedSender<RegistryEvent>,
    ) -> (Self, SessionHandle) {
        let (sender, inbox) = mpsc::channel(100);
        let hand = restored.unwrap_or_else(|| Hand::new(config.hand_config()));
        let seated = hand
            .seats()
            .iter()
            .map(|s| (s.user_id, s.name.clone()))
            .collect();

        let session = Self {
            table_id: table_id.clone(),
            community_id,
            config,
            hand,
            inbox,
            store,
            directory,
            events,
            seated,
            connected: HashMap::new(),
            senders: HashMap::new(),
            chat: ChatRing::default(),
            disconnects: HashMap::new(),
            next_hand_at: None,
            closed: false,
        };
        let handle = SessionHandle { sender, table_id };
        (session, handle)
    }

    /// Users holding seats (used by the registry when restoring a table
    /// from the cache).
    pub fn seated_users(&self) -> Vec<i64> {
        self.seated.keys().copied().collect()
    }

    /// Actor loop: inbox messages plus a 1-second timer pulse.
    pub async fn run(mut self) {
        log::info!(
            "table {} '{}' session starting",
            self.table_id,
            self.config.name
        );
        let mut tick = interval(std::time::Duration::from_secs(1));

        loop {
            tokio::select! {
                maybe = self.inbox.recv() => {
                    match maybe {
                        Some(message) => self.handle_message(message).await,
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    self.tick().await;
                }
            }
            if self.closed {
                break;
            }
        }

        log::info!("table {} session closed", self.table_id);
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::SeatPlayer {
                user_id,
                name,
                seat,
                buy_in,
                respond,
            } => {
                let result = self.handle_seat_player(user_id, name, seat, buy_in).await;
                let _ = respond.send(result);
            }
            SessionMessage::Connect {
                user_id,
                socket_id,
                sender,
            } => {
                self.handle_connect(user_id, socket_id, sender).await;
            }
            SessionMessage::Disconnect { user_id, socket_id } => {
                self.handle_disconnect(user_id, socket_id);
            }
            SessionMessage::TakeAction {
                user_id,
                action,
                respond,
            } => {
                let result = self.handle_action(user_id, action).await;
                if let Some(respond) = respond {
                    let _ = respond.send(result);
                }
            }
            SessionMessage::Chat { user_id, text } => {
                self.handle_chat(user_id, text);
            }
            SessionMessage::GetState { user_id, respond } => {
                let view = self
                    .seated
                    .contains_key(&user_id)
                    .then(|| self.hand.view_for(user_id));
                let _ = respond.send(view);
            }
            SessionMessage::Leave { user_id, respond } => {
                let result = self.handle_leave(user_id).await;
                if let Some(respond) = respond {
                    let _ = respond.send(result);
                }
            }
            SessionMessage::Tick => {
                self.tick().await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Seating and presence
    // ------------------------------------------------------------------

    async fn handle_seat_player(
        &mut self,
        user_id: i64,
        name: String,
        seat: usize,
        buy_in: u32,
    ) -> Result<SeatedInfo, SessionError> {
        if self.seated.contains_key(&user_id) {
            return Err(SessionError::AlreadySeated);
        }
        if seat >= self.config.max_seats {
            return Err(SessionError::Game(HandError::InvalidInput(format!(
                "seat number must be below {}",
                self.config.max_seats
            ))));
        }
        if self.seated.len() >= self.config.max_seats {
            return Err(SessionError::TableFull);
        }

        let status = match self.hand.add_seat(user_id, &name, seat, buy_in) {
            Ok(status) => status,
            Err(HandError::SeatOccupied(n)) => return Err(SessionError::SeatOccupied(n)),
            Err(HandError::TableFull) => return Err(SessionError::TableFull),
            Err(HandError::AlreadySeated) => return Err(SessionError::AlreadySeated),
            Err(e) => return Err(SessionError::Game(e)),
        };
        self.seated.insert(user_id, name.clone());
        if status == JoinStatus::WaitingForBigBlind {
            log::info!(
                "table {}: {} seated at {} waiting for the big blind",
                self.table_id,
                name,
                seat
            );
        }

        // Buy-in debit intent, reported off the actor turn.
        let directory = self.directory.clone();
        let community = self.community_id.clone();
        let table_id = self.table_id.clone();
        tokio::spawn(async move {
            let memo = format!("buy-in table {table_id}");
            if let Err(e) = directory
                .debit_wallet(user_id, community.as_deref(), buy_in as i64, &memo)
                .await
            {
                log::error!("table {table_id}: buy-in debit for {user_id} failed: {e}");
            }
        });

        self.persist().await;
        self.broadcast_state();
        self.maybe_start_hand(Utc::now()).await;

        Ok(SeatedInfo {
            game_id: self.table_id.clone(),
            player_id: user_id,
            players_count: self.seated.len(),
            max_seats: self.config.max_seats,
        })
    }

    async fn handle_connect(
        &mut self,
        user_id: i64,
        socket_id: Uuid,
        sender: mpsc::Sender<ServerEvent>,
    ) {
        if !self.seated.contains_key(&user_id) {
            let _ = sender.try_send(ServerEvent::Error {
                message: "not seated at this table".to_string(),
            });
            return;
        }
        if self.connected.get(&user_id) == Some(&socket_id) {
            return;
        }

        let name = self.seated[&user_id].clone();
        let record = self.disconnects.remove(&user_id);
        self.connected.insert(user_id, socket_id);
        self.senders.insert(user_id, sender);

        if let Some(record) = record {
            log::info!("table {}: {} reconnected", self.table_id, name);
            self.send_to(
                user_id,
                ServerEvent::Reconnected {
                    table_id: self.table_id.clone(),
                    state: record.snapshot,
                },
            );
            self.send_to(
                user_id,
                ServerEvent::ChatHistory {
                    messages: record.chat_snapshot,
                },
            );
            self.broadcast_except(user_id, ServerEvent::PlayerReconnected { name });
            // Catch the client up past the snapshot.
            let state = self.hand.view_for(user_id);
            self.send_to(user_id, ServerEvent::TableStateUpdate { state });
        } else {
            let state = self.hand.view_for(user_id);
            self.send_to(user_id, ServerEvent::TableStateUpdate { state });
            if !self.chat.is_empty() {
                let messages = self.chat.history();
                self.send_to(user_id, ServerEvent::ChatHistory { messages });
            }
        }

        self.maybe_start_hand(Utc::now()).await;
    }

    fn handle_disconnect(&mut self, user_id: i64, socket_id: Uuid) {
        // A newer socket may already have replaced this one.
        if self.connected.get(&user_id) != Some(&socket_id) {
            return;
        }
        self.connected.remove(&user_id);
        self.senders.remove(&user_id);
        let Some(name) = self.seated.get(&user_id).cloned() else {
            return;
        };

        let grace_ms = self.config.reconnect_grace_ms;
        self.disconnects.insert(
            user_id,
            DisconnectRecord {
                socket_id,
                deadline: Utc::now() + chrono::Duration::milliseconds(grace_ms as i64),
                snapshot: self.hand.view_for(user_id),
                chat_snapshot: self.chat.history(),
            },
        );
        log::info!(
            "table {}: {} disconnected, {}ms to reconnect",
            self.table_id,
            name,
            grace_ms
        );
        self.broadcast(ServerEvent::PlayerDisconnected { name, grace_ms });
    }

    async fn handle_leave(&mut self, user_id: i64) -> Result<(), SessionError> {
        let Some(name) = self.seated.remove(&user_id) else {
            return Err(SessionError::NotSeated);
        };
        self.connected.remove(&user_id);
        self.senders.remove(&user_id);
        self.disconnects.remove(&user_id);

        let now = Utc::now();
        let mut payout = 0u32;
        match self.hand.remove_seat(user_id, now) {
            Ok((stack, summary)) => {
                payout = stack;
                self.persist().await;
                self.broadcast_state();
                if let Some(summary) = summary {
                    self.finish_hand(summary, now);
                }
            }
            Err(HandError::UnknownSeat) => {}
            Err(e) => {
                log::error!(
                    "table {}: removing seat for {user_id} failed: {e}",
                    self.table_id
                );
            }
        }

        // Leave is the single payout point: report the remaining stack,
        // then the unseat.
        let directory = self.directory.clone();
        let community = self.community_id.clone();
        let table_id = self.table_id.clone();
        tokio::spawn(async move {
            if payout > 0 {
                let memo = format!("cash-out table {table_id}");
                if let Err(e) = directory
                    .credit_wallet(user_id, community.as_deref(), payout as i64, &memo)
                    .await
                {
                    log::error!("table {table_id}: payout credit for {user_id} failed: {e}");
                }
            }
            if let Err(e) = directory.unseat_player(&table_id, user_id).await {
                log::warn!("table {table_id}: unseat report for {user_id} failed: {e}");
            }
        });

        log::info!(
            "table {}: {} left with {} chips",
            self.table_id,
            name,
            payout
        );
        let _ = self.events.send(RegistryEvent::UserLeft {
            user_id,
            table_id: self.table_id.clone(),
        });

        if self.seated.is_empty() {
            self.close_table().await;
        }
        Ok(())
    }

    async fn close_table(&mut self) {
        if let Err(e) = self.store.delete(&hand_key(&self.table_id)).await {
            log::error!("table {}: cache delete failed: {e}", self.table_id);
        }
        let directory = self.directory.clone();
        let table_id = self.table_id.clone();
        tokio::spawn(async move {
            match directory.check_cleanup(&table_id).await {
                Ok(deleted) => {
                    log::info!("table {table_id}: cleanup check done (deleted={deleted})");
                }
                Err(e) => log::warn!("table {table_id}: cleanup check failed: {e}"),
            }
        });
        let _ = self.events.send(RegistryEvent::TableClosed {
            table_id: self.table_id.clone(),
        });
        self.closed = true;
    }

    // ------------------------------------------------------------------
    // Hand lifecycle
    // ------------------------------------------------------------------

    async fn maybe_start_hand(&mut self, now: DateTime<Utc>) {
        if !matches!(self.hand.stage(), Stage::Waiting | Stage::Complete) {
            return;
        }
        // A completed hand restarts through the next-hand delay.
        if self.next_hand_at.is_some() {
            return;
        }
        if self.ready_count() >= 2 {
            self.start_hand(now).await;
        }
    }

    /// Seated users with a live connection.
    fn ready_count(&self) -> usize {
        self.seated
            .keys()
            .filter(|u| self.connected.contains_key(u))
            .count()
    }

    async fn start_hand(&mut self, now: DateTime<Utc>) {
        match self.hand.start_hand(now) {
            Ok(summary) => {
                let dealt = self.hand.seats().iter().filter(|s| s.in_hand).count();
                log::info!("table {}: hand started, {} seats dealt", self.table_id, dealt);
                self.persist().await;
                self.broadcast_state();
                if let Some(summary) = summary {
                    // Blinds and antes put everyone all-in; the board ran
                    // out before anyone could act.
                    self.finish_hand(summary, now);
                }
            }
            Err(HandError::NotEnoughSeats) => {
                log::debug!("table {}: not enough funded seats to start", self.table_id);
            }
            Err(e) => {
                log::error!("table {}: failed to start hand: {e}", self.table_id);
            }
        }
    }

    async fn handle_action(
        &mut self,
        user_id: i64,
        action: Action,
    ) -> Result<HandView, SessionError> {
        if !self.seated.contains_key(&user_id) {
            return Err(SessionError::NotSeated);
        }
        let now = Utc::now();
        match self.hand.apply_action(user_id, action, now) {
            Ok(outcome) => {
                self.persist().await;
                self.broadcast_state();
                if let Some(summary) = outcome.summary {
                    self.finish_hand(summary, now);
                }
                Ok(self.hand.view_for(user_id))
            }
            Err(e) => {
                self.send_to(
                    user_id,
                    ServerEvent::ActionError {
                        reason: e.to_string(),
                    },
                );
                Err(SessionError::Game(e))
            }
        }
    }

    /// Hand is over: announce it, emit the best-effort history record,
    /// and schedule the next hand.
    fn finish_hand(&mut self, summary: HandSummary, now: DateTime<Utc>) {
        self.broadcast(ServerEvent::HandComplete {
            winners: summary.winners.clone(),
            pot: summary.pot,
        });

        let directory = self.directory.clone();
        let community = self.community_id.clone();
        let table_id = self.table_id.clone();
        let name = self.config.name.clone();
        tokio::spawn(async move {
            if let Err(e) = directory
                .record_hand_history(community.as_deref(), &table_id, &name, &summary)
                .await
            {
                log::warn!("table {table_id}: hand history record failed: {e}");
            }
        });

        self.next_hand_at = Some(now + chrono::Duration::milliseconds(NEXT_HAND_DELAY_MS));
    }

    fn handle_chat(&mut self, user_id: i64, text: String) {
        if text.trim().is_empty() {
            return;
        }
        let Some(name) = self.seated.get(&user_id).cloned() else {
            return;
        };
        let message = self.chat.push(user_id, name, text);
        self.broadcast(ServerEvent::ChatMessage { message });
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    async fn tick(&mut self) {
        if self.closed {
            return;
        }
        let now = Utc::now();

        // Action deadline: auto-check or auto-fold through the same
        // admission path a player action takes.
        match self.hand.resolve_timeout(now) {
            Ok(Some(resolution)) => {
                log::info!(
                    "table {}: {} timed out, auto-resolving with {}",
                    self.table_id,
                    resolution.name,
                    resolution.action
                );
                self.broadcast(ServerEvent::ActionTimeout {
                    name: resolution.name.clone(),
                });
                self.persist().await;
                self.broadcast_state();
                if let Some(summary) = resolution.outcome.summary {
                    self.finish_hand(summary, now);
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("table {}: timeout resolution failed: {e}", self.table_id);
            }
        }

        // Reconnect grace expiry: evict through the leave path, which
        // reports the payout intent and unseat.
        let expired: Vec<i64> = self
            .disconnects
            .iter()
            .filter(|(_, record)| now > record.deadline)
            .map(|(&user_id, _)| user_id)
            .collect();
        for user_id in expired {
            if let Some(record) = self.disconnects.remove(&user_id) {
                log::info!(
                    "table {}: user {user_id} (socket {}) did not reconnect in time, evicting",
                    self.table_id,
                    record.socket_id
                );
            }
            let _ = self.handle_leave(user_id).await;
        }
        if self.closed {
            return;
        }

        // Delayed start of the next hand.
        if self.next_hand_at.is_some_and(|at| now >= at) {
            self.next_hand_at = None;
            if self.ready_count() >= 2 {
                self.start_hand(now).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Persistence and fan-out
    // ------------------------------------------------------------------

    /// Save the hand bytes under `hand:<table_id>`. Runs inside the
    /// writer turn so the save always precedes the broadcast.
    async fn persist(&mut self) {
        match self.hand.to_bytes() {
            Ok(bytes) => {
                if let Err(e) = self.store.save(&hand_key(&self.table_id), bytes).await {
                    log::error!("table {}: cache save failed: {e}", self.table_id);
                }
            }
            Err(e) => {
                log::error!("table {}: state encode failed: {e}", self.table_id);
            }
        }
    }

    /// Personalized snapshot to every connected seat; only the recipient
    /// sees their own hole cards.
    fn broadcast_state(&mut self) {
        let hand = &self.hand;
        self.senders.retain(|&user_id, sender| {
            let event = ServerEvent::TableStateUpdate {
                state: hand.view_for(user_id),
            };
            match sender.try_send(event) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("subscriber {user_id} channel full, dropping update");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    fn broadcast(&mut self, event: ServerEvent) {
        self.senders.retain(|user_id, sender| {
            match sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("subscriber {user_id} channel full, dropping event");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    fn broadcast_except(&mut self, skip: i64, event: ServerEvent) {
        self.senders.retain(|&user_id, sender| {
            if user_id == skip {
                return true;
            }
            match sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    fn send_to(&mut self, user_id: i64, event: ServerEvent) {
        if let Some(sender) = self.senders.get(&user_id) {
            if sender.try_send(event).is_err() {
                log::debug!("event to user {user_id} dropped");
            }
        }
    }
}
