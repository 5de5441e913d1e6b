//! Per-chat message reconciliation.
//!
//! A [`MessageLog`] is the single in-memory timeline of one chat, newest
//! first, keyed by message id so ingesting a duplicate is structurally a
//! no-op.  Entries carry the sync generation at which they were inserted;
//! that is what reconciles a server snapshot with realtime messages that
//! arrived while the fetch was in flight.

use std::collections::HashSet;

use causerie_shared::types::Message;

struct Entry {
    message: Message,
    generation: u64,
}

/// Order-preserving, id-keyed message timeline for one chat.
#[derive(Default)]
pub struct MessageLog {
    /// Newest first, the order the server and broker deliver.
    entries: Vec<Entry>,
    ids: HashSet<i64>,
    generation: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a sync window: every entry inserted from now on is tagged with
    /// the returned generation, and a later [`MessageLog::replace`] with
    /// this generation keeps those entries.
    pub fn begin_sync(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Insert one realtime message at the front.  Returns false when the id
    /// is already present.
    pub fn ingest(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id) {
            return false;
        }
        self.entries.insert(
            0,
            Entry {
                message,
                generation: self.generation,
            },
        );
        true
    }

    /// Install an authoritative baseline fetched under the sync window
    /// `since`.
    ///
    /// Entries inserted at generation >= `since` and absent from the
    /// baseline raced the fetch and are kept in front, in order.  Everything
    /// older is superseded by the baseline.
    pub fn replace(&mut self, baseline: Vec<Message>, since: u64) {
        let baseline_ids: HashSet<i64> = baseline.iter().map(|m| m.id).collect();

        let survivors: Vec<Entry> = self
            .entries
            .drain(..)
            .filter(|e| e.generation >= since && !baseline_ids.contains(&e.message.id))
            .collect();

        self.ids = baseline_ids;
        self.entries = survivors;
        for entry in &self.entries {
            self.ids.insert(entry.message.id);
        }
        self.entries.extend(baseline.into_iter().map(|message| Entry {
            message,
            generation: since,
        }));
    }

    /// Flip one message to read.  Returns false when the message is missing
    /// or already read.
    pub fn mark_read(&mut self, message_id: i64) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.message.id == message_id && !e.message.read)
        {
            Some(entry) => {
                entry.message.read = true;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, message_id: i64) -> bool {
        self.ids.contains(&message_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the timeline, newest first.
    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    /// Unread count as the UI defines it: unread messages sent by someone
    /// else.
    pub fn unread_from_others(&self, current_user_id: i64) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.message.read && e.message.sender.id != current_user_id)
            .count()
    }
}
