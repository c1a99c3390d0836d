use std::{collections::HashMap, sync::Arc};

use crate::{
    message_converters::{
        collate_topic_schema_conversions, convert_message, converted_schema_names,
        converters_by_key, ConverterKey, RegisteredConverter, TopicSchemaConversions,
    },
    models::{
        message_event::MessageEvent,
        player_state::{BlockCache, Parameters, Topic},
    },
    render_state::{HoverValueType, RenderState, RenderStateInput, WatchedField},
};

fn same_arc<T: ?Sized>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Incrementally derives a consumer's [`RenderState`]. Every consumer owns its
/// own builder; the only state kept between calls is the previous inputs.
///
/// Inputs are compared by `Arc` identity. Producers must replace collections
/// instead of mutating them, otherwise changes go unnoticed.
#[derive(Default)]
pub struct RenderStateBuilder {
    render_state: RenderState,
    prev_seek_time: Option<u64>,
    prev_sorted_topics: Option<Arc<Vec<Topic>>>,
    prev_message_converters: Option<Arc<Vec<RegisteredConverter>>>,
    prev_current_frame: Option<Arc<Vec<MessageEvent>>>,
    prev_blocks: Option<Arc<BlockCache>>,
    prev_conversions: Option<TopicSchemaConversions>,
    empty_parameters: Arc<Parameters>,
}

impl RenderStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new render state when any watched field changed, `None`
    /// when the consumer does not need to re-render.
    pub fn build(&mut self, input: RenderStateInput<'_>) -> Option<RenderState> {
        let watched = input.watched_fields;
        let active_data = input.player_state.and_then(|state| state.active_data.as_ref());
        let converters: &[RegisteredConverter] = input
            .message_converters
            .map(|converters| converters.as_slice())
            .unwrap_or_default();

        let conversions =
            collate_topic_schema_conversions(input.subscriptions, input.sorted_topics, converters);
        let conversions_changed = self.prev_conversions.as_ref() != Some(&conversions);
        let converters_by_key = converters_by_key(converters);

        let mut should_render = false;

        if watched.contains(&WatchedField::DidSeek) {
            let seek_time = active_data.map(|data| data.last_seek_time);
            let did_seek = self.prev_seek_time != seek_time;
            if self.render_state.did_seek != Some(did_seek) {
                self.render_state.did_seek = Some(did_seek);
                should_render = true;
            }
            self.prev_seek_time = seek_time;
        }

        if watched.contains(&WatchedField::Parameters) {
            let parameters = active_data
                .and_then(|data| data.parameters.clone())
                .unwrap_or_else(|| self.empty_parameters.clone());
            if !same_arc(self.render_state.parameters.as_ref(), Some(&parameters)) {
                self.render_state.parameters = Some(parameters);
                should_render = true;
            }
        }

        if watched.contains(&WatchedField::Variables)
            && !same_arc(self.render_state.variables.as_ref(), Some(input.global_variables))
        {
            self.render_state.variables = Some(input.global_variables.clone());
            should_render = true;
        }

        if watched.contains(&WatchedField::Topics)
            && (!same_arc(self.prev_sorted_topics.as_ref(), Some(input.sorted_topics))
                || !same_arc(self.prev_message_converters.as_ref(), input.message_converters))
        {
            let topics = input
                .sorted_topics
                .iter()
                .map(|topic| Topic {
                    converted_schema_names: converted_schema_names(&topic.schema_name, converters),
                    ..topic.clone()
                })
                .collect();
            self.render_state.topics = Some(Arc::new(topics));
            self.prev_sorted_topics = Some(input.sorted_topics.clone());
            self.prev_message_converters = input.message_converters.cloned();
            should_render = true;
        }

        if watched.contains(&WatchedField::CurrentFrame) {
            match input.current_frame {
                Some(frame) if !same_arc(self.prev_current_frame.as_ref(), Some(frame)) => {
                    let mut post_processed = Vec::with_capacity(frame.len());
                    for event in frame.iter() {
                        push_event(event, &conversions, &converters_by_key, &mut post_processed);
                    }
                    self.render_state.current_frame = Some(Arc::new(post_processed));
                    should_render = true;
                }
                Some(_) => {}
                None => {
                    let had_messages = self
                        .render_state
                        .current_frame
                        .as_ref()
                        .is_some_and(|frame| !frame.is_empty());
                    if had_messages {
                        self.render_state.current_frame = None;
                        should_render = true;
                    }
                }
            }
            self.prev_current_frame = input.current_frame.cloned();
        }

        if watched.contains(&WatchedField::AllFrames) {
            // Coarse gate: only a new block cache or new conversions trigger the
            // full walk over preloaded messages
            let blocks = input
                .player_state
                .and_then(|state| state.progress.message_cache.as_ref());
            // A dropped block cache counts as a change and clears the frames
            let blocks_changed = !same_arc(self.prev_blocks.as_ref(), blocks);
            if blocks_changed || conversions_changed {
                let all_frames = match blocks {
                    Some(blocks) => collect_all_frames(blocks, &conversions, &converters_by_key),
                    None => Vec::new(),
                };
                self.render_state.all_frames = Some(Arc::new(all_frames));
                should_render = true;
            }
            self.prev_blocks = blocks.cloned();
        }

        if watched.contains(&WatchedField::CurrentTime) {
            let current_time = active_data.map(|data| data.current_time);
            if current_time != self.render_state.current_time {
                self.render_state.current_time = current_time;
                should_render = true;
            }
        }

        if watched.contains(&WatchedField::StartTime) {
            let start_time = active_data.map(|data| data.start_time);
            if start_time != self.render_state.start_time {
                self.render_state.start_time = start_time;
                should_render = true;
            }
        }

        if watched.contains(&WatchedField::EndTime) {
            let end_time = active_data.map(|data| data.end_time);
            if end_time != self.render_state.end_time {
                self.render_state.end_time = end_time;
                should_render = true;
            }
        }

        if watched.contains(&WatchedField::PreviewTime) {
            let preview_time = match (active_data, input.hover_value) {
                (Some(data), Some(hover)) if hover.value_type == HoverValueType::PlaybackSeconds => {
                    Some(data.start_time.to_seconds() + hover.value)
                }
                _ => None,
            };
            if preview_time != self.render_state.preview_time {
                self.render_state.preview_time = preview_time;
                should_render = true;
            }
        }

        if watched.contains(&WatchedField::ColorScheme)
            && input.color_scheme != self.render_state.color_scheme
        {
            self.render_state.color_scheme = input.color_scheme;
            should_render = true;
        }

        if watched.contains(&WatchedField::AppSettings)
            && !same_arc(self.render_state.app_settings.as_ref(), input.app_settings)
        {
            self.render_state.app_settings = input.app_settings.cloned();
            should_render = true;
        }

        self.prev_conversions = Some(conversions);

        if should_render {
            Some(self.render_state.clone())
        } else {
            None
        }
    }
}

fn push_event(
    event: &MessageEvent,
    conversions: &TopicSchemaConversions,
    converters: &HashMap<ConverterKey, RegisteredConverter>,
    out: &mut Vec<MessageEvent>,
) {
    if conversions.unconverted_topics.contains(&event.topic) {
        out.push(event.clone());
    }
    convert_message(event, conversions, converters, out);
}

fn collect_all_frames(
    blocks: &BlockCache,
    conversions: &TopicSchemaConversions,
    converters: &HashMap<ConverterKey, RegisteredConverter>,
) -> Vec<MessageEvent> {
    let mut all_frames = Vec::new();

    for block in blocks.blocks.iter().flatten() {
        let mut block_frames = Vec::new();
        for events in block.messages_by_topic.values() {
            for event in events {
                push_event(event, conversions, converters, &mut block_frames);
            }
        }
        block_frames.sort_by_key(|event| event.receive_time);
        all_frames.append(&mut block_frames);
    }

    all_frames
}
