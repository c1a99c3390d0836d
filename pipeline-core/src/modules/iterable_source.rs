use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    message_event::MessageEvent,
    player_state::{Datatypes, PlayerProblem, Topic},
    time::Time,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Initialization {
    pub start: Time,
    pub end: Time,
    pub topics: Vec<Topic>,
    pub datatypes: Datatypes,
    pub profile: Option<String>,
    pub problems: Vec<PlayerProblem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageIteratorArgs {
    pub topics: Vec<String>,
    pub start: Option<Time>,
    pub end: Option<Time>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetBackfillMessagesArgs {
    pub topics: Vec<String>,
    pub time: Time,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IteratorResult {
    MessageEvent(MessageEvent),
    Problem(PlayerProblem),
    // Emitted by sources that know no message precedes this time
    Stamp(Time),
}

impl IteratorResult {
    pub fn time(&self) -> Option<Time> {
        match self {
            IteratorResult::MessageEvent(event) => Some(event.receive_time),
            IteratorResult::Stamp(time) => Some(*time),
            IteratorResult::Problem(_) => None,
        }
    }
}

#[async_trait]
pub trait MessageCursor: Send + 'static {
    /// `Ok(None)` marks the end of the stream.
    async fn next(&mut self) -> Result<Option<IteratorResult>>;

    /// Reads results for up to `duration_ms` of wall time. Always returns at
    /// least one result unless the stream has ended.
    async fn next_batch(&mut self, duration_ms: u64) -> Result<Option<Vec<IteratorResult>>> {
        let deadline = Instant::now() + Duration::from_millis(duration_ms);
        let first = match self.next().await? {
            Some(result) => result,
            None => return Ok(None),
        };

        let mut results = vec![first];
        while Instant::now() < deadline {
            match self.next().await? {
                Some(result) => results.push(result),
                None => break,
            }
        }
        Ok(Some(results))
    }

    /// Reads every result with a time at or before `end`.
    async fn read_until(&mut self, end: Time) -> Result<Option<Vec<IteratorResult>>>;

    async fn end(&mut self) -> Result<()>;
}

#[async_trait]
pub trait IterableSource: Send + 'static {
    async fn initialize(&mut self) -> Result<Initialization>;
    fn message_iterator(&self, args: MessageIteratorArgs) -> Result<Box<dyn MessageCursor>>;
    async fn get_backfill_messages(
        &self,
        args: GetBackfillMessagesArgs,
    ) -> Result<Vec<MessageEvent>>;
}

/// Source over messages already in memory, ordered by receive time.
pub struct VecIterableSource {
    messages: Arc<Vec<MessageEvent>>,
    topics: Vec<Topic>,
}

impl VecIterableSource {
    pub fn new(mut messages: Vec<MessageEvent>) -> Self {
        messages.sort_by_key(|event| event.receive_time);

        let mut topics: Vec<Topic> = Vec::new();
        for event in messages.iter() {
            if !topics.iter().any(|topic| topic.name == event.topic) {
                topics.push(Topic::new(event.topic.clone(), event.schema_name.clone()));
            }
        }
        topics.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            messages: Arc::new(messages),
            topics,
        }
    }
}

#[async_trait]
impl IterableSource for VecIterableSource {
    async fn initialize(&mut self) -> Result<Initialization> {
        let start = self.messages.first().map(|e| e.receive_time).unwrap_or_default();
        let end = self.messages.last().map(|e| e.receive_time).unwrap_or_default();
        Ok(Initialization {
            start,
            end,
            topics: self.topics.clone(),
            ..Default::default()
        })
    }

    fn message_iterator(&self, args: MessageIteratorArgs) -> Result<Box<dyn MessageCursor>> {
        let position = match args.start {
            Some(start) => self.messages.partition_point(|e| e.receive_time < start),
            None => 0,
        };
        Ok(Box::new(VecCursor {
            messages: self.messages.clone(),
            topics: args.topics.into_iter().collect(),
            position,
            end: args.end,
            closed: false,
        }))
    }

    async fn get_backfill_messages(
        &self,
        args: GetBackfillMessagesArgs,
    ) -> Result<Vec<MessageEvent>> {
        // Latest message at or before `time` for each requested topic
        let mut backfill = Vec::new();
        for topic in args.topics.iter() {
            let latest = self
                .messages
                .iter()
                .rev()
                .find(|e| &e.topic == topic && e.receive_time <= args.time);
            if let Some(event) = latest {
                backfill.push(event.clone());
            }
        }
        backfill.sort_by_key(|event| event.receive_time);
        Ok(backfill)
    }
}

struct VecCursor {
    messages: Arc<Vec<MessageEvent>>,
    topics: HashSet<String>,
    position: usize,
    end: Option<Time>,
    closed: bool,
}

impl VecCursor {
    fn peek(&mut self) -> Option<&MessageEvent> {
        if self.closed {
            return None;
        }
        while let Some(event) = self.messages.get(self.position) {
            if self.end.is_some_and(|end| event.receive_time > end) {
                return None;
            }
            if self.topics.contains(&event.topic) {
                return self.messages.get(self.position);
            }
            self.position += 1;
        }
        None
    }
}

#[async_trait]
impl MessageCursor for VecCursor {
    async fn next(&mut self) -> Result<Option<IteratorResult>> {
        let event = self.peek().cloned();
        if event.is_some() {
            self.position += 1;
        }
        Ok(event.map(IteratorResult::MessageEvent))
    }

    async fn read_until(&mut self, end: Time) -> Result<Option<Vec<IteratorResult>>> {
        if self.peek().is_none() {
            return Ok(None);
        }

        let mut results = Vec::new();
        while let Some(event) = self.peek() {
            if event.receive_time > end {
                break;
            }
            results.push(IteratorResult::MessageEvent(event.clone()));
            self.position += 1;
        }
        Ok(Some(results))
    }

    async fn end(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
