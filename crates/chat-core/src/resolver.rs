//! Conversation resolver
//!
//! Decides create-vs-reuse for a pair of users, writes message logs and keeps
//! both participants' conversation indexes in step.
//!
//! None of the read-modify-write cycles here are transactional. Two senders
//! appending to the same conversation race, and the last index write wins.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::DirectoryConfig;
use crate::error::{DirectoryError, Result, StoreError};
use crate::identity::CanonicalId;
use crate::ids::{conversation_id_for, MessageIdGenerator};
use crate::layout;
use crate::models::{
    ConversationId, ConversationIndexEntry, LatestMessage, Message, MessageKind, Participant,
};
use crate::session::SessionContext;
use crate::store::{DocumentStore, Subscription, SubscriptionHandle};
use crate::tree;

/// Where the next message between two users should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationTarget {
    Existing(ConversationId),
    New,
}

/// Live, fully decoded view of a stored sequence.
///
/// Every item is the whole rebuilt sequence, never a delta.
pub struct Feed<T> {
    subscription: Subscription,
    store: Arc<dyn DocumentStore>,
    decode: fn(Value) -> Vec<T>,
}

impl<T> Feed<T> {
    /// Wait for the next rebuild. `None` once the subscription is closed.
    pub async fn next(&mut self) -> Option<Vec<T>> {
        self.subscription.next().await.map(self.decode)
    }

    /// Next rebuild if one is already queued.
    pub fn try_next(&mut self) -> Option<Vec<T>> {
        self.subscription.try_next().map(self.decode)
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.subscription.handle()
    }

    pub async fn cancel(self) {
        self.store.unsubscribe(self.subscription.handle()).await;
    }
}

pub type MessageFeed = Feed<Message>;
pub type ConversationFeed = Feed<ConversationIndexEntry>;

pub struct ConversationResolver {
    store: Arc<dyn DocumentStore>,
    config: DirectoryConfig,
    ids: MessageIdGenerator,
}

impl ConversationResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, DirectoryConfig::default())
    }

    pub fn with_config(store: Arc<dyn DocumentStore>, config: DirectoryConfig) -> Self {
        Self {
            store,
            config,
            ids: MessageIdGenerator::new(),
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Mint a message id for a message from the caller to `other`.
    pub fn next_message_id(&self, ctx: &SessionContext, other: &CanonicalId) -> String {
        self.ids.next_id(other, ctx.id(), Utc::now())
    }

    /// Build a message from the caller to `other`, stamped now.
    pub fn compose(&self, ctx: &SessionContext, other: &CanonicalId, kind: MessageKind) -> Message {
        Message::new(self.next_message_id(ctx, other), ctx.participant(), kind)
    }

    /// The caller's conversation index, in storage order. Unreadable entries
    /// are skipped.
    pub async fn conversations(&self, ctx: &SessionContext) -> Result<Vec<ConversationIndexEntry>> {
        let value = self.store.read(&layout::index_path(ctx.id())).await?;
        Ok(decode_index(value.unwrap_or(Value::Null)))
    }

    /// Id of the caller's conversation with `other`.
    ///
    /// If several entries match, the first in storage order wins.
    pub async fn conversation_exists(
        &self,
        ctx: &SessionContext,
        other: &CanonicalId,
    ) -> Result<ConversationId> {
        self.conversations(ctx)
            .await?
            .into_iter()
            .find(|entry| &entry.other_user_email == other)
            .map(|entry| entry.id)
            .ok_or_else(|| {
                DirectoryError::NotFound(format!("conversation between {} and {}", ctx.id(), other))
            })
    }

    /// Reuse the existing conversation with `other`, or signal that a new
    /// one has to be created by the first message.
    pub async fn open_conversation(
        &self,
        ctx: &SessionContext,
        other: &CanonicalId,
    ) -> Result<ConversationTarget> {
        match self.conversation_exists(ctx, other).await {
            Ok(id) => Ok(ConversationTarget::Existing(id)),
            Err(DirectoryError::NotFound(_)) => Ok(ConversationTarget::New),
            Err(e) => Err(e),
        }
    }

    /// Start a conversation with `other` whose log holds `first_message`.
    ///
    /// Writes the log, then the caller's index entry, then the counterpart's.
    /// If the counterpart's write fails the conversation stays visible to
    /// the caller only and [`DirectoryError::PartialWrite`] is returned.
    pub async fn create_conversation(
        &self,
        ctx: &SessionContext,
        other: &Participant,
        first_message: &Message,
    ) -> Result<ConversationId> {
        let id = conversation_id_for(&first_message.id);
        let log_path = layout::messages_path(&id);
        let record = codec::encode(first_message).to_value();

        self.store
            .write(&log_path, Value::Array(vec![record]))
            .await
            .map_err(|e| DirectoryError::write(&log_path, e))?;

        let preview = codec::preview(&first_message.kind, &self.config);
        let own = ConversationIndexEntry {
            id: id.clone(),
            other_user_email: other.id.clone(),
            name: other.display_name.clone(),
            latest_message: LatestMessage {
                date: first_message.sent_at,
                message: preview.clone(),
                is_read: true,
            },
        };
        let mirrored = ConversationIndexEntry {
            id: id.clone(),
            other_user_email: ctx.id().clone(),
            name: ctx.display_name().to_string(),
            latest_message: LatestMessage {
                date: first_message.sent_at,
                message: preview,
                is_read: false,
            },
        };

        self.push_index_entry(ctx.id(), &own)
            .await
            .map_err(|e| DirectoryError::write(layout::index_path(ctx.id()), e))?;

        if let Err(source) = self.push_index_entry(&other.id, &mirrored).await {
            warn!(
                "[Resolver] Conversation {} created without an index entry for {}: {}",
                id, other.id, source
            );
            return Err(DirectoryError::PartialWrite {
                conversation_id: id,
                written: vec![ctx.id().clone()],
                missing: other.id.clone(),
                source,
            });
        }

        info!("[Resolver] Created conversation {} ({} <-> {})", id, ctx.id(), other.id);
        Ok(id)
    }

    /// Append `message` to an existing conversation and refresh both
    /// participants' previews.
    ///
    /// Entries are located by conversation id. A participant who removed the
    /// conversation gets a fresh entry, so the thread reappears for them.
    pub async fn append_message(
        &self,
        ctx: &SessionContext,
        conversation_id: &ConversationId,
        counterpart: &Participant,
        message: &Message,
    ) -> Result<()> {
        let log_path = layout::messages_path(conversation_id);
        let current = self
            .store
            .read(&log_path)
            .await?
            .ok_or_else(|| DirectoryError::NotFound(format!("message log {}", log_path)))?;

        let mut log = tree::into_sequence(current);
        log.push(codec::encode(message).to_value());
        self.store
            .write(&log_path, Value::Array(log))
            .await
            .map_err(|e| DirectoryError::write(&log_path, e))?;

        let preview = codec::preview(&message.kind, &self.config);
        let latest = |is_read| LatestMessage {
            date: message.sent_at,
            message: preview.clone(),
            is_read,
        };

        let own = ConversationIndexEntry {
            id: conversation_id.clone(),
            other_user_email: counterpart.id.clone(),
            name: counterpart.display_name.clone(),
            latest_message: latest(true),
        };
        self.upsert_latest(ctx.id(), own)
            .await
            .map_err(|e| DirectoryError::write(layout::index_path(ctx.id()), e))?;

        let mirrored = ConversationIndexEntry {
            id: conversation_id.clone(),
            other_user_email: ctx.id().clone(),
            name: ctx.display_name().to_string(),
            latest_message: latest(false),
        };
        self.upsert_latest(&counterpart.id, mirrored)
            .await
            .map_err(|e| DirectoryError::write(layout::index_path(&counterpart.id), e))?;

        debug!("[Resolver] Appended {} to {}", message.id, conversation_id);
        Ok(())
    }

    /// Soft leave: drop the caller's index entry only. The message log and
    /// the counterpart's entry are untouched.
    pub async fn remove_conversation(
        &self,
        ctx: &SessionContext,
        conversation_id: &ConversationId,
    ) -> Result<()> {
        let path = layout::index_path(ctx.id());
        let mut entries = self.read_sequence(&path).await?;
        let before = entries.len();
        entries.retain(|entry| !has_id(entry, conversation_id));

        if entries.len() == before {
            debug!("[Resolver] {} has no entry for {}", ctx.id(), conversation_id);
        }
        self.store
            .write(&path, Value::Array(entries))
            .await
            .map_err(|e| DirectoryError::write(&path, e))?;

        info!("[Resolver] {} left conversation {}", ctx.id(), conversation_id);
        Ok(())
    }

    /// Mark the caller's preview for `conversation_id` as read.
    pub async fn mark_read(&self, ctx: &SessionContext, conversation_id: &ConversationId) -> Result<()> {
        let path = layout::index_path(ctx.id());
        let mut entries = self.read_sequence(&path).await?;

        let latest = entries
            .iter_mut()
            .find(|entry| has_id(entry, conversation_id))
            .and_then(|entry| entry.get_mut("latest_message"))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                DirectoryError::NotFound(format!("index entry {} for {}", conversation_id, ctx.id()))
            })?;
        latest.insert("is_read".to_string(), Value::Bool(true));

        self.store
            .write(&path, Value::Array(entries))
            .await
            .map_err(|e| DirectoryError::write(&path, e))
    }

    /// Mint a message and send it to `counterpart`, creating the conversation
    /// when `target` is [`ConversationTarget::New`].
    pub async fn send_message(
        &self,
        ctx: &SessionContext,
        target: &ConversationTarget,
        counterpart: &Participant,
        kind: MessageKind,
    ) -> Result<(ConversationId, Message)> {
        let message = self.compose(ctx, &counterpart.id, kind);
        let id = self.send_composed(ctx, target, counterpart, &message).await?;
        Ok((id, message))
    }

    /// Send a message whose id was minted earlier, e.g. to name an uploaded
    /// attachment after it.
    pub async fn send_composed(
        &self,
        ctx: &SessionContext,
        target: &ConversationTarget,
        counterpart: &Participant,
        message: &Message,
    ) -> Result<ConversationId> {
        match target {
            ConversationTarget::Existing(id) => {
                self.append_message(ctx, id, counterpart, message).await?;
                Ok(id.clone())
            }
            ConversationTarget::New => self.create_conversation(ctx, counterpart, message).await,
        }
    }

    /// Resolve the conversation with `counterpart` from the caller's index,
    /// then send. The lookup always runs first, so a second conversation is
    /// only created if another client's create races this one.
    pub async fn send_to(
        &self,
        ctx: &SessionContext,
        counterpart: &Participant,
        kind: MessageKind,
    ) -> Result<(ConversationId, Message)> {
        let target = self.open_conversation(ctx, &counterpart.id).await?;
        self.send_message(ctx, &target, counterpart, kind).await
    }

    /// [`Self::send_to`] for a message built with [`Self::compose`] or
    /// [`Self::next_message_id`].
    pub async fn send_composed_to(
        &self,
        ctx: &SessionContext,
        counterpart: &Participant,
        message: &Message,
    ) -> Result<ConversationId> {
        let target = self.open_conversation(ctx, &counterpart.id).await?;
        self.send_composed(ctx, &target, counterpart, message).await
    }

    /// Watch a conversation's message log. The current log arrives first.
    pub async fn subscribe_to_messages(&self, conversation_id: &ConversationId) -> Result<MessageFeed> {
        let subscription = self
            .store
            .subscribe(&layout::messages_path(conversation_id))
            .await?;
        Ok(Feed {
            subscription,
            store: self.store.clone(),
            decode: decode_messages,
        })
    }

    /// Watch the caller's conversation index.
    pub async fn subscribe_to_conversations(&self, ctx: &SessionContext) -> Result<ConversationFeed> {
        let subscription = self.store.subscribe(&layout::index_path(ctx.id())).await?;
        Ok(Feed {
            subscription,
            store: self.store.clone(),
            decode: decode_index,
        })
    }

    async fn read_sequence(&self, path: &str) -> Result<Vec<Value>> {
        let value = self.store.read(path).await?;
        Ok(tree::into_sequence(value.unwrap_or(Value::Null)))
    }

    async fn push_index_entry(
        &self,
        owner: &CanonicalId,
        entry: &ConversationIndexEntry,
    ) -> std::result::Result<(), StoreError> {
        let path = layout::index_path(owner);
        let current = self.store.read(&path).await?;
        let mut entries = tree::into_sequence(current.unwrap_or(Value::Null));
        entries.push(serde_json::to_value(entry)?);
        self.store.write(&path, Value::Array(entries)).await
    }

    /// Replace `latest_message` on the owner's entry for `entry.id`, or
    /// re-insert the whole entry when the owner has none.
    async fn upsert_latest(
        &self,
        owner: &CanonicalId,
        entry: ConversationIndexEntry,
    ) -> std::result::Result<(), StoreError> {
        let path = layout::index_path(owner);
        let current = self.store.read(&path).await?;
        let mut entries = tree::into_sequence(current.unwrap_or(Value::Null));

        match entries
            .iter_mut()
            .find(|existing| has_id(existing, &entry.id))
            .and_then(Value::as_object_mut)
        {
            Some(existing) => {
                existing.insert(
                    "latest_message".to_string(),
                    serde_json::to_value(&entry.latest_message)?,
                );
            }
            None => {
                info!("[Resolver] Restoring {} in the index of {}", entry.id, owner);
                entries.push(serde_json::to_value(&entry)?);
            }
        }

        self.store.write(&path, Value::Array(entries)).await
    }
}

fn has_id(entry: &Value, id: &ConversationId) -> bool {
    entry.get("id").and_then(Value::as_str) == Some(id.as_str())
}

fn decode_messages(value: Value) -> Vec<Message> {
    codec::decode_batch(&tree::into_sequence(value)).messages
}

fn decode_index(value: Value) -> Vec<ConversationIndexEntry> {
    tree::into_sequence(value)
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("[Resolver] Skipping index entry {}: {}", index, e);
                None
            }
        })
        .collect()
}
