use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use pipeline_core::{
    models::{
        message_event::MessageEvent, player_state::PlayerState, publishers::AdvertiseOptions,
        subscriptions::SubscribePayload,
    },
    player::Player,
    subscriptions::{merge_subscriptions, SubscriptionMemoizer},
};

use crate::modules::message_pipeline::context::{
    MessageEventsBySubscriberId, MessagePipelineContext, PlaybackControls,
};

type SubscriberId = String;
type TopicName = String;

#[derive(Debug)]
pub enum PipelineAction {
    UpdateSubscriber {
        id: SubscriberId,
        payloads: Vec<SubscribePayload>,
    },
    UpdatePlayerState(PlayerState),
}

fn same_arc<T>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Single-writer state mediating between one player and its subscribers.
/// Only [`MessagePipelineStore::dispatch`] and the publisher bookkeeping
/// mutate it; every mutation publishes a fresh [`MessagePipelineContext`].
pub struct MessagePipelineStore {
    player: Option<Arc<dyn Player>>,
    // {
    //   "${subscriber_id}" : [SubscribePayload, ...],
    // }
    subscriptions_by_id: BTreeMap<SubscriberId, Vec<SubscribePayload>>,
    // Derived from `subscriptions_by_id`; an id appears at most once per topic
    subscriber_ids_by_topic: HashMap<TopicName, Vec<SubscriberId>>,
    last_message_event_by_topic: HashMap<TopicName, MessageEvent>,
    publishers_by_id: BTreeMap<SubscriberId, Vec<AdvertiseOptions>>,
    last_capabilities: Vec<String>,
    memoizer: SubscriptionMemoizer,
    public: Arc<MessagePipelineContext>,
}

impl MessagePipelineStore {
    pub fn new(player: Option<Arc<dyn Player>>) -> Self {
        let mut memoizer = SubscriptionMemoizer::new();
        let subscriptions = memoizer.memoize(Vec::new());

        MessagePipelineStore {
            player,
            subscriptions_by_id: BTreeMap::new(),
            subscriber_ids_by_topic: HashMap::new(),
            last_message_event_by_topic: HashMap::new(),
            publishers_by_id: BTreeMap::new(),
            last_capabilities: Vec::new(),
            memoizer,
            public: Arc::new(MessagePipelineContext::new(subscriptions)),
        }
    }

    pub fn public(&self) -> Arc<MessagePipelineContext> {
        self.public.clone()
    }

    pub fn player(&self) -> Option<&Arc<dyn Player>> {
        self.player.as_ref()
    }

    pub fn subscriptions_by_id(&self) -> &BTreeMap<SubscriberId, Vec<SubscribePayload>> {
        &self.subscriptions_by_id
    }

    pub fn subscriber_ids_by_topic(&self) -> &HashMap<TopicName, Vec<SubscriberId>> {
        &self.subscriber_ids_by_topic
    }

    pub fn last_message_event_by_topic(&self) -> &HashMap<TopicName, MessageEvent> {
        &self.last_message_event_by_topic
    }

    pub fn dispatch(&mut self, action: PipelineAction) {
        match action {
            PipelineAction::UpdateSubscriber { id, payloads } => {
                self.update_subscriber(id, payloads)
            }
            PipelineAction::UpdatePlayerState(player_state) => {
                self.update_player_state(player_state)
            }
        }
    }

    /// Replaces the subscriptions of `id` and forwards the merged set to the
    /// player when it changed.
    pub fn set_subscriptions(&mut self, id: String, payloads: Vec<SubscribePayload>) {
        let previous = self.public.subscriptions.clone();
        self.dispatch(PipelineAction::UpdateSubscriber { id, payloads });

        let subscriptions = &self.public.subscriptions;
        if !Arc::ptr_eq(&previous, subscriptions) {
            if let Some(player) = &self.player {
                tracing::debug!(count = subscriptions.len(), "forwarding subscriptions to player");
                player.set_subscriptions(subscriptions.clone());
            }
        }
    }

    pub fn set_publishers(&mut self, id: String, payloads: Vec<AdvertiseOptions>) {
        if payloads.is_empty() {
            self.publishers_by_id.remove(&id);
        } else {
            self.publishers_by_id.insert(id, payloads);
        }

        let all_publishers: Vec<AdvertiseOptions> =
            self.publishers_by_id.values().flatten().cloned().collect();
        self.public = Arc::new(MessagePipelineContext {
            publishers: Arc::new(all_publishers.clone()),
            ..(*self.public).clone()
        });

        if let Some(player) = &self.player {
            player.set_publishers(all_publishers);
        }
    }

    /// Drops every subscription, publisher and cached message. The player
    /// binding is kept.
    pub fn reset(&mut self) {
        tracing::info!("resetting message pipeline store");
        let player = self.player.take();
        *self = MessagePipelineStore::new(player);
    }

    fn update_subscriber(&mut self, id: SubscriberId, payloads: Vec<SubscribePayload>) {
        let previous_topics: HashSet<&str> = self
            .subscriptions_by_id
            .get(&id)
            .map(|subs| subs.iter().map(|s| s.topic.as_str()).collect())
            .unwrap_or_default();
        let mut new_topics_for_id: Vec<TopicName> = Vec::new();
        for payload in payloads.iter() {
            if !previous_topics.contains(payload.topic.as_str())
                && !new_topics_for_id.contains(&payload.topic)
            {
                new_topics_for_id.push(payload.topic.clone());
            }
        }

        let unsubscribed = payloads.is_empty();
        if unsubscribed {
            self.subscriptions_by_id.remove(&id);
        } else {
            self.subscriptions_by_id.insert(id.clone(), payloads);
        }

        let mut subscriber_ids_by_topic: HashMap<TopicName, Vec<SubscriberId>> = HashMap::new();
        for (subscriber_id, subscriptions) in self.subscriptions_by_id.iter() {
            for subscription in subscriptions {
                let ids = subscriber_ids_by_topic
                    .entry(subscription.topic.clone())
                    .or_default();
                if !ids.contains(subscriber_id) {
                    ids.push(subscriber_id.clone());
                }
            }
        }
        self.subscriber_ids_by_topic = subscriber_ids_by_topic;

        // Late subscribers get the latest cached message right away instead of
        // waiting for the next live one
        let backfill: Vec<MessageEvent> = new_topics_for_id
            .iter()
            .filter_map(|topic| self.last_message_event_by_topic.get(topic).cloned())
            .collect();

        let mut message_events_by_subscriber_id: MessageEventsBySubscriberId =
            (*self.public.message_events_by_subscriber_id).clone();
        if unsubscribed {
            message_events_by_subscriber_id.remove(&id);
        } else if !backfill.is_empty() {
            tracing::trace!(%id, count = backfill.len(), "backfilling cached messages");
            let mut bucket: Vec<MessageEvent> = message_events_by_subscriber_id
                .get(&id)
                .map(|bucket| bucket.as_ref().clone())
                .unwrap_or_default();
            bucket.extend(backfill);
            message_events_by_subscriber_id.insert(id, Arc::new(bucket));
        }

        // A cached message never outlives every subscriber of its topic
        let subscriber_ids_by_topic = &self.subscriber_ids_by_topic;
        self.last_message_event_by_topic
            .retain(|topic, _| subscriber_ids_by_topic.contains_key(topic));

        let merged = merge_subscriptions(self.subscriptions_by_id.values().flatten());
        let subscriptions = self.memoizer.memoize(merged);

        self.public = Arc::new(MessagePipelineContext {
            subscriptions,
            message_events_by_subscriber_id: Arc::new(message_events_by_subscriber_id),
            ..(*self.public).clone()
        });
    }

    fn update_player_state(&mut self, player_state: PlayerState) {
        let previous = self.public.clone();
        let previous_active_data = previous.player_state.active_data.as_ref();
        let active_data = player_state.active_data.as_ref();

        let mut buckets: HashMap<SubscriberId, Vec<MessageEvent>> = HashMap::new();
        let messages = active_data.map(|data| &data.messages);
        if let Some(messages) = messages {
            // An unchanged message list was already delivered last tick
            if !same_arc(previous_active_data.map(|data| &data.messages), Some(messages)) {
                for event in messages.iter() {
                    self.last_message_event_by_topic
                        .insert(event.topic.clone(), event.clone());
                    let Some(ids) = self.subscriber_ids_by_topic.get(&event.topic) else {
                        continue;
                    };
                    for id in ids {
                        buckets.entry(id.clone()).or_default().push(event.clone());
                    }
                }
            }
        }

        let topics = active_data.map(|data| &data.topics);
        let sorted_topics = if same_arc(previous_active_data.map(|data| &data.topics), topics) {
            previous.sorted_topics.clone()
        } else {
            let mut sorted = topics.map(|t| t.as_ref().clone()).unwrap_or_default();
            sorted.sort_by(|a, b| a.name.cmp(&b.name));
            Arc::new(sorted)
        };

        let datatypes = active_data.map(|data| &data.datatypes);
        let datatypes = if same_arc(previous_active_data.map(|data| &data.datatypes), datatypes) {
            previous.datatypes.clone()
        } else {
            datatypes.cloned().unwrap_or_default()
        };

        let mut playback = previous.playback.clone();
        if *player_state.capabilities != self.last_capabilities {
            if let Some(player) = &self.player {
                tracing::debug!(capabilities = ?player_state.capabilities, "rebinding playback controls");
                playback = PlaybackControls::bind(player, &player_state.capabilities);
            }
            self.last_capabilities = player_state.capabilities.as_ref().clone();
        }

        let message_events_by_subscriber_id = buckets
            .into_iter()
            .map(|(id, events)| (id, Arc::new(events)))
            .collect();

        self.public = Arc::new(MessagePipelineContext {
            player_state: Arc::new(player_state),
            sorted_topics,
            datatypes,
            subscriptions: previous.subscriptions.clone(),
            publishers: previous.publishers.clone(),
            message_events_by_subscriber_id: Arc::new(message_events_by_subscriber_id),
            playback,
        });
    }
}
