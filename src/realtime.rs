//! Lead change feed.
//!
//! The lead store publishes a [`ChangeEvent`] after every committed write.
//! Subscribers keep a [`LeadCache`] and apply events in arrival order; each
//! event carries the full row, so the last one applied wins.

use std::collections::HashMap;

use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::lead;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "record", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeEvent {
    Insert(lead::Model),
    Update(lead::Model),
    Delete { id: Uuid, user_id: Uuid },
}

impl ChangeEvent {
    pub fn user_id(&self) -> Uuid {
        match self {
            ChangeEvent::Insert(lead) | ChangeEvent::Update(lead) => lead.user_id,
            ChangeEvent::Delete { user_id, .. } => *user_id,
        }
    }

    pub fn lead_id(&self) -> Uuid {
        match self {
            ChangeEvent::Insert(lead) | ChangeEvent::Update(lead) => lead.id,
            ChangeEvent::Delete { id, .. } => *id,
        }
    }
}

/// Publisher side of the feed. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let lead_id = event.lead_id();
        if self.sender.send(event).is_err() {
            tracing::trace!(lead_id = %lead_id, "No realtime subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

/// A user's leads as seen by a realtime subscriber.
#[derive(Debug, Default, Clone)]
pub struct LeadCache {
    user_id: Option<Uuid>,
    leads: HashMap<Uuid, lead::Model>,
}

impl LeadCache {
    /// Cache that only accepts events for `user_id`.
    pub fn for_user(user_id: Uuid, snapshot: impl IntoIterator<Item = lead::Model>) -> Self {
        Self {
            user_id: Some(user_id),
            leads: snapshot.into_iter().map(|lead| (lead.id, lead)).collect(),
        }
    }

    /// Applies one event. Returns false when the event belongs to another user.
    pub fn apply(&mut self, event: ChangeEvent) -> bool {
        if self.user_id.is_some_and(|user| user != event.user_id()) {
            return false;
        }
        match event {
            ChangeEvent::Insert(lead) | ChangeEvent::Update(lead) => {
                self.leads.insert(lead.id, lead);
            }
            ChangeEvent::Delete { id, .. } => {
                self.leads.remove(&id);
            }
        }
        true
    }

    pub fn get(&self, id: Uuid) -> Option<&lead::Model> {
        self.leads.get(&id)
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }

    pub fn leads(&self) -> impl Iterator<Item = &lead::Model> {
        self.leads.values()
    }
}

/// Applies events from `receiver` to `cache` until the feed closes or `shutdown` fires.
///
/// A lagged receiver logs how many events it missed and keeps going; callers
/// that need exact state reload a snapshot.
pub async fn follow(
    mut receiver: broadcast::Receiver<ChangeEvent>,
    cache: &mut LeadCache,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = receiver.recv() => match received {
                Ok(event) => {
                    cache.apply(event);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Realtime subscriber lagged, cache may be stale");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// One item of a user's live stream.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Change(ChangeEvent),
    /// The subscriber fell behind and missed this many events.
    Lagged(u64),
}

/// Events for `user_id` from `receiver`, ending when the feed closes or `shutdown` fires.
pub fn user_stream(
    receiver: broadcast::Receiver<ChangeEvent>,
    user_id: Uuid,
    shutdown: CancellationToken,
) -> impl Stream<Item = FeedItem> + Send + 'static {
    stream::unfold(
        (receiver, shutdown),
        move |(mut receiver, shutdown)| async move {
            loop {
                let received = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return None,
                    received = receiver.recv() => received,
                };
                match received {
                    Ok(event) if event.user_id() == user_id => {
                        return Some((FeedItem::Change(event), (receiver, shutdown)));
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(user_id = %user_id, missed, "Lead stream lagged");
                        return Some((FeedItem::Lagged(missed), (receiver, shutdown)));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::lead;

    #[test]
    fn last_write_wins() {
        let mut first = lead("A", "nuevo_lead");
        first.user_id = Uuid::new_v4();
        let mut cache = LeadCache::for_user(first.user_id, []);

        assert!(cache.apply(ChangeEvent::Insert(first.clone())));
        let mut moved = first.clone();
        moved.estado_actual = "ganado".into();
        cache.apply(ChangeEvent::Update(moved));
        assert_eq!(cache.get(first.id).unwrap().estado_actual, "ganado");

        cache.apply(ChangeEvent::Delete {
            id: first.id,
            user_id: first.user_id,
        });
        assert!(cache.is_empty());
    }

    #[test]
    fn events_for_other_users_are_ignored() {
        let mut cache = LeadCache::for_user(Uuid::new_v4(), []);
        let mut other = lead("B", "nuevo_lead");
        other.user_id = Uuid::new_v4();
        assert!(!cache.apply(ChangeEvent::Insert(other)));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn follow_applies_until_feed_closes() {
        let feed = ChangeFeed::new();
        let receiver = feed.subscribe();
        let mut a = lead("A", "nuevo_lead");
        a.user_id = Uuid::new_v4();
        let mut cache = LeadCache::for_user(a.user_id, []);

        feed.publish(ChangeEvent::Insert(a.clone()));
        drop(feed);
        follow(receiver, &mut cache, CancellationToken::new()).await;

        assert_eq!(cache.len(), 1);
        assert!(cache.get(a.id).is_some());
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_value(ChangeEvent::Delete {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
        })
        .unwrap();
        assert_eq!(json["type"], "DELETE");
    }

    #[tokio::test]
    async fn user_stream_only_yields_the_owners_changes() {
        use futures::StreamExt;

        let feed = ChangeFeed::new();
        let owner = Uuid::new_v4();
        let stream = user_stream(feed.subscribe(), owner, CancellationToken::new());

        let mut foreign = lead("Otro", "nuevo_lead");
        foreign.user_id = Uuid::new_v4();
        let mut mine = lead("Mío", "nuevo_lead");
        mine.user_id = owner;

        feed.publish(ChangeEvent::Insert(foreign));
        feed.publish(ChangeEvent::Insert(mine.clone()));
        drop(feed);

        let items: Vec<FeedItem> = stream.collect().await;
        assert_eq!(items, vec![FeedItem::Change(ChangeEvent::Insert(mine))]);
    }

    #[tokio::test]
    async fn lagging_subscriber_is_told_how_many_events_it_missed() {
        use futures::StreamExt;

        let feed = ChangeFeed::new();
        let owner = Uuid::new_v4();
        let mut stream = Box::pin(user_stream(feed.subscribe(), owner, CancellationToken::new()));
        let mut row = lead("Bar", "nuevo_lead");
        row.user_id = owner;
        for _ in 0..CHANNEL_CAPACITY + 3 {
            feed.publish(ChangeEvent::Update(row.clone()));
        }

        assert_eq!(stream.next().await, Some(FeedItem::Lagged(3)));
        assert!(matches!(stream.next().await, Some(FeedItem::Change(_))));
    }

    #[tokio::test]
    async fn user_stream_ends_on_shutdown() {
        use futures::StreamExt;

        let feed = ChangeFeed::new();
        let shutdown = CancellationToken::new();
        let mut stream = Box::pin(user_stream(feed.subscribe(), Uuid::new_v4(), shutdown.clone()));
        shutdown.cancel();
        assert_eq!(stream.next().await, None);
    }
}
