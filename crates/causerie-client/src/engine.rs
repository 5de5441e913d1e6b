//! Conversation reconciliation engine.
//!
//! Owns the client's session state: chat list, per-chat message logs,
//! unread counts, typing sets, presence, the publication feed and the
//! connection status.  Collaborators are injected (store, bulk sync,
//! realtime transport, notification sink) and every external failure is
//! swallowed into a log line; nothing here panics or propagates errors to
//! the UI.
//!
//! Locking: state and store sit behind plain mutexes, never held across an
//! await point.  Unread counts are always recomputed from the message log
//! after a mutation, never adjusted incrementally.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use causerie_net::ChatSubscription;
use causerie_shared::constants::MESSAGE_SYNC_INTERVAL_SECS;
use causerie_shared::protocol::InstantMessage;
use causerie_shared::types::{Chat, Comment, Message, Publication, User};
use causerie_store::{Database, StoreError};

use crate::events::{ClientEvent, ConnectionStatus};
use crate::notify::{NotificationData, NotificationSink};
use crate::realtime::Realtime;
use crate::reconcile::MessageLog;
use crate::sync::BulkSync;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct EngineState {
    connection: Option<ConnectionStatus>,
    chats: Vec<Chat>,
    messages: HashMap<i64, MessageLog>,
    unread_by_chat: HashMap<i64, usize>,
    typing_by_chat: HashMap<i64, BTreeSet<String>>,
    online_users: Vec<String>,
    publications: Vec<Publication>,
    subscriptions: Vec<ChatSubscription>,
}

impl EngineState {
    fn recompute_unread(&mut self, chat_id: i64, current_user_id: i64) {
        let count = self
            .messages
            .get(&chat_id)
            .map(|log| log.unread_from_others(current_user_id))
            .unwrap_or(0);
        self.unread_by_chat.insert(chat_id, count);
    }
}

struct EngineInner {
    current_user: User,
    store: Mutex<Database>,
    api: Arc<dyn BulkSync>,
    realtime: Mutex<Option<Arc<dyn Realtime>>>,
    notifier: Box<dyn NotificationSink>,
    state: Mutex<EngineState>,
    events: broadcast::Sender<ClientEvent>,
    /// Chats with a message sync currently in flight.
    syncing: Mutex<HashSet<i64>>,
}

/// The session-state engine.  Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct ChatEngine {
    inner: Arc<EngineInner>,
}

impl ChatEngine {
    pub fn new(
        current_user: User,
        store: Database,
        api: Arc<dyn BulkSync>,
        notifier: Box<dyn NotificationSink>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(EngineInner {
                current_user,
                store: Mutex::new(store),
                api,
                realtime: Mutex::new(None),
                notifier,
                state: Mutex::new(EngineState::default()),
                events,
                syncing: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn current_user(&self) -> &User {
        &self.inner.current_user
    }

    /// Subscribe to engine events.  Each receiver gets every event from the
    /// point of subscription.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Install the realtime transport.  Called once the connection is up.
    pub fn attach_realtime(&self, realtime: Arc<dyn Realtime>) {
        *lock(&self.inner.realtime) = Some(realtime);
    }

    // -- connection lifecycle ------------------------------------------------

    pub fn connection_status(&self) -> ConnectionStatus {
        self.state()
            .connection
            .unwrap_or(ConnectionStatus::Disconnected)
    }

    pub(crate) fn set_connection(&self, status: ConnectionStatus) {
        let changed = {
            let mut state = self.state();
            let changed = state.connection != Some(status);
            state.connection = Some(status);
            changed
        };
        if changed {
            info!(?status, "connection status changed");
            self.emit(ClientEvent::ConnectionChanged(status));
        }
    }

    /// Forget subscription guards made stale by a connection drop.  The
    /// broker-side subscriptions died with the connection, so the guards
    /// must not publish UNSUBSCRIBE frames later.
    pub(crate) fn invalidate_subscriptions(&self) {
        let mut state = self.state();
        for sub in &mut state.subscriptions {
            sub.disarm();
        }
        state.subscriptions.clear();
    }

    /// Re-issue per-chat subscriptions for every known chat.  Runs on every
    /// (re)connect; previous guards are discarded first.
    pub fn resubscribe_all(&self) {
        let Some(realtime) = self.realtime() else {
            return;
        };
        let mut state = self.state();
        for sub in &mut state.subscriptions {
            sub.disarm();
        }
        state.subscriptions.clear();

        let chat_ids: Vec<i64> = state.chats.iter().map(|c| c.id).collect();
        for chat_id in &chat_ids {
            let sub = realtime.subscribe_to_chat(*chat_id);
            state.subscriptions.push(sub);
        }
        debug!(count = chat_ids.len(), "resubscribed chats");
    }

    /// Disconnect, wipe session state and clear the local cache.
    pub fn logout(&self) {
        if let Some(realtime) = lock(&self.inner.realtime).take() {
            realtime.disconnect();
        }
        {
            let mut state = self.state();
            for sub in &mut state.subscriptions {
                sub.disarm();
            }
            *state = EngineState::default();
            state.connection = Some(ConnectionStatus::Disconnected);
        }
        self.with_store("clear cache", |store| {
            store.clear_all()?;
            store.clear_session_token()
        });
        info!("logged out");
        self.emit(ClientEvent::ConnectionChanged(ConnectionStatus::Disconnected));
    }

    // -- initial load and sync ----------------------------------------------

    /// Cache-then-network load of chats and publications.  The cached
    /// snapshot is installed immediately; the server responses replace it
    /// and are written back.
    pub async fn load_initial_data(&self) {
        if let Some(chats) = self.with_store("load cached chats", |s| s.get_chats()) {
            if !chats.is_empty() {
                self.state().chats = chats;
            }
        }
        if let Some(publications) =
            self.with_store("load cached publications", |s| s.get_publications())
        {
            if !publications.is_empty() {
                self.state().publications = publications;
            }
        }

        let (chats, publications) =
            tokio::join!(self.inner.api.fetch_chats(), self.inner.api.fetch_publications());

        match chats {
            Ok(chats) => {
                self.state().chats = chats.clone();
                self.with_store("save chats", |s| s.save_chats(&chats));
                debug!(count = chats.len(), "chats loaded");
                // The known chat set changed; chats that appeared in the
                // snapshot need their topic subscriptions.
                if self.realtime().is_some_and(|r| r.is_connected()) {
                    self.resubscribe_all();
                }
            }
            Err(e) => warn!(error = %e, "failed to fetch chats, keeping cache"),
        }
        match publications {
            Ok(publications) => {
                self.state().publications = publications.clone();
                self.with_store("save publications", |s| s.save_publications(&publications));
            }
            Err(e) => warn!(error = %e, "failed to fetch publications, keeping cache"),
        }
    }

    /// Install the cached message list for one chat.  Runs under its own
    /// sync window so a later server sync supersedes it.
    pub fn load_cached_messages(&self, chat_id: i64) {
        let generation = self.state().messages.entry(chat_id).or_default().begin_sync();
        let Some(messages) = self.with_store("load cached messages", |s| s.get_messages(chat_id))
        else {
            return;
        };
        let mut state = self.state();
        state
            .messages
            .entry(chat_id)
            .or_default()
            .replace(messages, generation);
        state.recompute_unread(chat_id, self.inner.current_user.id);
    }

    /// Fetch the first page of one chat from the server and reconcile it.
    /// A sync already in flight for the chat makes this a no-op.
    pub async fn sync_chat_messages(&self, chat_id: i64) {
        if !lock(&self.inner.syncing).insert(chat_id) {
            debug!(chat = chat_id, "sync already in flight, skipping");
            return;
        }

        let generation = self.state().messages.entry(chat_id).or_default().begin_sync();
        match self.inner.api.fetch_chat_messages(chat_id).await {
            Ok(messages) => {
                self.set_chat_messages(chat_id, messages.clone(), generation);
                self.with_store("save messages", |s| s.save_messages(chat_id, &messages));
            }
            Err(e) => warn!(chat = chat_id, error = %e, "message sync failed"),
        }

        lock(&self.inner.syncing).remove(&chat_id);
    }

    /// Run [`ChatEngine::sync_chat_messages`] on a fixed interval until the
    /// returned handle is aborted.  The in-flight guard keeps slow fetches
    /// from piling up.
    pub fn spawn_message_sync(&self, chat_id: i64) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut tick =
                tokio::time::interval(Duration::from_secs(MESSAGE_SYNC_INTERVAL_SECS));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                engine.sync_chat_messages(chat_id).await;
            }
        })
    }

    /// Authoritative replace of one chat's timeline, reconciled against
    /// realtime arrivals under the given sync window.
    pub fn set_chat_messages(&self, chat_id: i64, messages: Vec<Message>, generation: u64) {
        let mut state = self.state();
        state
            .messages
            .entry(chat_id)
            .or_default()
            .replace(messages, generation);
        state.recompute_unread(chat_id, self.inner.current_user.id);
    }

    // -- realtime mutations --------------------------------------------------

    /// One message from the broker.  Duplicate ids are dropped silently.
    pub fn ingest_realtime_message(&self, message: Message) {
        let chat_id = message.chat_id();
        {
            let mut state = self.state();
            if !state
                .messages
                .entry(chat_id)
                .or_default()
                .ingest(message.clone())
            {
                debug!(chat = chat_id, message = message.id, "duplicate message dropped");
                return;
            }
            state.recompute_unread(chat_id, self.inner.current_user.id);
        }

        self.with_store("append message", |s| {
            s.append_message(chat_id, &message)?;
            s.save_last_message(chat_id, &message)
        });

        if message.sender.id != self.inner.current_user.id {
            self.inner.notifier.notify(
                &message.sender.full_name(),
                &message.content_text,
                NotificationData {
                    chat_id: Some(chat_id),
                    message_id: Some(message.id),
                    ..NotificationData::default()
                },
            );
        }

        self.emit(ClientEvent::NewMessage { chat_id, message });
    }

    /// Optimistic local read flip plus exactly one read-receipt publish.
    /// Re-marking an already-read message publishes nothing.
    pub fn mark_message_as_read(&self, chat_id: i64, message_id: i64) {
        let flipped = {
            let mut state = self.state();
            let flipped = state
                .messages
                .get_mut(&chat_id)
                .is_some_and(|log| log.mark_read(message_id));
            if flipped {
                state.recompute_unread(chat_id, self.inner.current_user.id);
            }
            flipped
        };
        if !flipped {
            return;
        }

        if let Some(realtime) = self.realtime() {
            realtime.mark_message_as_read(chat_id, message_id);
        }
        self.emit(ClientEvent::MessageRead { chat_id, message_id });
    }

    /// Inbound read receipt from another device or participant.
    pub fn apply_read_receipt(&self, chat_id: i64, message_id: i64) {
        let flipped = {
            let mut state = self.state();
            let flipped = state
                .messages
                .get_mut(&chat_id)
                .is_some_and(|log| log.mark_read(message_id));
            if flipped {
                state.recompute_unread(chat_id, self.inner.current_user.id);
            }
            flipped
        };
        if flipped {
            self.emit(ClientEvent::MessageRead { chat_id, message_id });
        }
    }

    pub fn set_typing_status(&self, chat_id: i64, username: &str, is_typing: bool) {
        {
            let mut state = self.state();
            let set = state.typing_by_chat.entry(chat_id).or_default();
            if is_typing {
                set.insert(username.to_owned());
            } else {
                set.remove(username);
            }
        }
        self.emit(ClientEvent::TypingChanged {
            chat_id,
            users: self.typing_users(chat_id),
        });
    }

    /// Who is typing in a chat, the current user excluded.
    pub fn typing_users(&self, chat_id: i64) -> Vec<String> {
        self.state()
            .typing_by_chat
            .get(&chat_id)
            .map(|set| {
                set.iter()
                    .filter(|u| **u != self.inner.current_user.username)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Wholesale replace of the online-user list.  The broker broadcasts
    /// the full list on every change; there are no deltas to merge.
    pub fn replace_online_users(&self, users: Vec<String>) {
        self.state().online_users = users.clone();
        self.emit(ClientEvent::PresenceChanged { online: users });
    }

    // -- publications --------------------------------------------------------

    pub async fn refresh_publications(&self) {
        match self.inner.api.fetch_publications().await {
            Ok(publications) => {
                self.state().publications = publications.clone();
                self.with_store("save publications", |s| s.save_publications(&publications));
            }
            Err(e) => warn!(error = %e, "failed to refresh publications"),
        }
    }

    /// New publication from the feed topic.
    pub fn add_publication(&self, publication: Publication) {
        {
            let mut state = self.state();
            if state.publications.iter().any(|p| p.id == publication.id) {
                return;
            }
            state.publications.insert(0, publication.clone());
        }
        self.with_store("cache publication", |s| s.add_publication(&publication));

        if publication.author.id != self.inner.current_user.id {
            self.inner.notifier.notify(
                &format!("New post from {}", publication.author.full_name()),
                &publication.title,
                NotificationData {
                    publication_id: Some(publication.id),
                    ..NotificationData::default()
                },
            );
        }
        self.emit(ClientEvent::NewPublication(publication));
    }

    /// Like/comment-count update to an existing publication.
    pub fn update_publication(&self, publication: Publication) {
        {
            let mut state = self.state();
            match state.publications.iter_mut().find(|p| p.id == publication.id) {
                Some(existing) => *existing = publication.clone(),
                None => state.publications.insert(0, publication.clone()),
            }
            let publications = state.publications.clone();
            drop(state);
            self.with_store("save publications", |s| s.save_publications(&publications));
        }
        self.emit(ClientEvent::PublicationUpdated(publication));
    }

    /// New comment: bump the parent's count and notify.
    pub fn apply_new_comment(&self, comment: Comment) {
        {
            let mut state = self.state();
            if let Some(publication) = state
                .publications
                .iter_mut()
                .find(|p| p.id == comment.publication.id)
            {
                publication.comments_count += 1;
            }
        }

        if comment.author.id != self.inner.current_user.id {
            self.inner.notifier.notify(
                &format!("{} commented", comment.author.full_name()),
                &comment.content,
                NotificationData {
                    publication_id: Some(comment.publication.id),
                    comment_id: Some(comment.id),
                    ..NotificationData::default()
                },
            );
        }
        self.emit(ClientEvent::NewComment(comment));
    }

    // -- outbound ------------------------------------------------------------

    /// Fire-and-forget message publish; the server echoes the full message
    /// back on the chat topic.
    pub fn send_message(&self, chat_id: i64, message: InstantMessage) {
        let Some(realtime) = self.realtime() else {
            warn!(chat = chat_id, "cannot send message: no transport");
            return;
        };
        realtime.send_message(chat_id, &message);
    }

    pub fn send_typing(&self, chat_id: i64, is_typing: bool) {
        if let Some(realtime) = self.realtime() {
            realtime.send_typing_status(chat_id, &self.inner.current_user.username, is_typing);
        }
    }

    // -- snapshots -----------------------------------------------------------

    pub fn chats(&self) -> Vec<Chat> {
        self.state().chats.clone()
    }

    pub fn messages(&self, chat_id: i64) -> Vec<Message> {
        self.state()
            .messages
            .get(&chat_id)
            .map(MessageLog::messages)
            .unwrap_or_default()
    }

    pub fn unread_count(&self, chat_id: i64) -> usize {
        self.state()
            .unread_by_chat
            .get(&chat_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_unread(&self) -> usize {
        self.state().unread_by_chat.values().sum()
    }

    pub fn online_users(&self) -> Vec<String> {
        self.state().online_users.clone()
    }

    pub fn publications(&self) -> Vec<Publication> {
        self.state().publications.clone()
    }

    // -- plumbing ------------------------------------------------------------

    pub(crate) fn emit(&self, event: ClientEvent) {
        // No receivers is fine; state snapshots stay authoritative.
        let _ = self.inner.events.send(event);
    }

    fn realtime(&self) -> Option<Arc<dyn Realtime>> {
        lock(&self.inner.realtime).clone()
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        lock(&self.inner.state)
    }

    fn with_store<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&Database) -> Result<T, StoreError>,
    ) -> Option<T> {
        let store = lock(&self.inner.store);
        match f(&store) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(op, error = %e, "store operation failed");
                None
            }
        }
    }
}

/// Lock a mutex, recovering from poisoning; engine state stays usable even
/// if a panicking thread held the guard.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
