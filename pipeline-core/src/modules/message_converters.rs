use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use crate::models::{
    message_event::MessageEvent, player_state::Topic, subscriptions::SubscribePayload,
};

pub type ConvertFn =
    dyn Fn(&serde_json::Value, &MessageEvent) -> Option<serde_json::Value> + Send + Sync;

/// `(source schema, target schema)`
pub type ConverterKey = (String, String);

#[derive(Clone)]
pub struct RegisteredConverter {
    pub from_schema_name: String,
    pub to_schema_name: String,
    pub converter: Arc<ConvertFn>,
}

impl RegisteredConverter {
    pub fn new<F>(from_schema_name: &str, to_schema_name: &str, converter: F) -> Self
    where
        F: Fn(&serde_json::Value, &MessageEvent) -> Option<serde_json::Value> + Send + Sync + 'static,
    {
        RegisteredConverter {
            from_schema_name: from_schema_name.to_string(),
            to_schema_name: to_schema_name.to_string(),
            converter: Arc::new(converter),
        }
    }

    pub fn key(&self) -> ConverterKey {
        (self.from_schema_name.clone(), self.to_schema_name.clone())
    }
}

impl fmt::Debug for RegisteredConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredConverter")
            .field("from_schema_name", &self.from_schema_name)
            .field("to_schema_name", &self.to_schema_name)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSchemaConversions {
    // Topics delivered as-is
    pub unconverted_topics: BTreeSet<String>,
    pub converter_keys_by_topic: BTreeMap<String, Vec<ConverterKey>>,
}

/// Partitions subscribed topics into pass-through topics and topics that need
/// one or more schema conversions.
pub fn collate_topic_schema_conversions(
    subscriptions: &[SubscribePayload],
    sorted_topics: &[Topic],
    converters: &[RegisteredConverter],
) -> TopicSchemaConversions {
    let topics_by_name: HashMap<&str, &Topic> =
        sorted_topics.iter().map(|t| (t.name.as_str(), t)).collect();
    let mut conversions = TopicSchemaConversions::default();

    for subscription in subscriptions {
        let convert_to = match &subscription.convert_to {
            Some(convert_to) => convert_to,
            None => {
                conversions.unconverted_topics.insert(subscription.topic.clone());
                continue;
            }
        };

        let topic = match topics_by_name.get(subscription.topic.as_str()) {
            Some(topic) => topic,
            None => continue,
        };

        if &topic.schema_name == convert_to {
            conversions.unconverted_topics.insert(topic.name.clone());
            continue;
        }

        let key = (topic.schema_name.clone(), convert_to.clone());
        if converters.iter().any(|c| c.key() == key) {
            let keys = conversions
                .converter_keys_by_topic
                .entry(topic.name.clone())
                .or_default();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    conversions
}

pub fn converters_by_key(
    converters: &[RegisteredConverter],
) -> HashMap<ConverterKey, RegisteredConverter> {
    converters.iter().map(|c| (c.key(), c.clone())).collect()
}

/// Appends every conversion of `event` registered for its topic. Events whose
/// converter is missing or returns nothing are dropped from the output.
pub fn convert_message(
    event: &MessageEvent,
    conversions: &TopicSchemaConversions,
    converters: &HashMap<ConverterKey, RegisteredConverter>,
    out: &mut Vec<MessageEvent>,
) {
    let keys = match conversions.converter_keys_by_topic.get(&event.topic) {
        Some(keys) => keys,
        None => return,
    };

    for key in keys {
        if key.0 != event.schema_name {
            continue;
        }
        let Some(converter) = converters.get(key) else {
            continue;
        };
        if let Some(message) = (converter.converter)(event.message.as_ref(), event) {
            out.push(event.converted(&converter.to_schema_name, message));
        }
    }
}

/// Schemas reachable from `schema_name` through any registered converter.
pub fn converted_schema_names(
    schema_name: &str,
    converters: &[RegisteredConverter],
) -> Option<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for converter in converters {
        if converter.from_schema_name == schema_name && !names.contains(&converter.to_schema_name) {
            names.push(converter.to_schema_name.clone());
        }
    }

    if names.is_empty() { None } else { Some(names) }
}

#[cfg(test)]
mod success {
    use serde_json::json;

    use crate::{
        message_converters::{
            collate_topic_schema_conversions, convert_message, converted_schema_names,
            converters_by_key, RegisteredConverter,
        },
        models::{
            message_event::MessageEvent, player_state::Topic, subscriptions::SubscribePayload,
            time::Time,
        },
    };

    fn imu_to_vector() -> RegisteredConverter {
        RegisteredConverter::new("sensor_msgs/Imu", "foxglove.Vector3", |message, _| {
            Some(json!({ "x": message["ax"] }))
        })
    }

    fn topics() -> Vec<Topic> {
        vec![
            Topic::new("/imu", "sensor_msgs/Imu"),
            Topic::new("/odom", "nav_msgs/Odometry"),
        ]
    }

    #[test]
    fn collate_partitions_topics() {
        let subscriptions = vec![
            SubscribePayload::new("/odom"),
            SubscribePayload::converted("/imu", "foxglove.Vector3"),
            SubscribePayload::converted("/odom", "nav_msgs/Odometry"),
            SubscribePayload::converted("/odom", "foxglove.Pose"),
        ];

        let conversions =
            collate_topic_schema_conversions(&subscriptions, &topics(), &[imu_to_vector()]);

        assert_eq!(
            conversions.unconverted_topics.iter().collect::<Vec<_>>(),
            vec!["/odom"]
        );
        assert_eq!(
            conversions.converter_keys_by_topic.get("/imu"),
            Some(&vec![("sensor_msgs/Imu".to_string(), "foxglove.Vector3".to_string())])
        );
        // No converter registered for odometry
        assert!(!conversions.converter_keys_by_topic.contains_key("/odom"));
    }

    #[test]
    fn convert_message_applies_matching_converter() {
        let converters = vec![imu_to_vector()];
        let subscriptions = vec![SubscribePayload::converted("/imu", "foxglove.Vector3")];
        let conversions = collate_topic_schema_conversions(&subscriptions, &topics(), &converters);
        let event = MessageEvent::new("/imu", "sensor_msgs/Imu", Time::new(1, 0), json!({ "ax": 9.8 }));

        let mut out = vec![];
        convert_message(&event, &conversions, &converters_by_key(&converters), &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].schema_name, "foxglove.Vector3");
        assert_eq!(*out[0].message, json!({ "x": 9.8 }));
    }

    #[test]
    fn convert_message_drops_when_converter_declines() {
        let converters = vec![RegisteredConverter::new(
            "sensor_msgs/Imu",
            "foxglove.Vector3",
            |_, _| None,
        )];
        let subscriptions = vec![SubscribePayload::converted("/imu", "foxglove.Vector3")];
        let conversions = collate_topic_schema_conversions(&subscriptions, &topics(), &converters);
        let event = MessageEvent::new("/imu", "sensor_msgs/Imu", Time::new(1, 0), json!({}));

        let mut out = vec![];
        convert_message(&event, &conversions, &converters_by_key(&converters), &mut out);

        assert!(out.is_empty());
    }

    #[test]
    fn converted_schema_names_lists_targets() {
        let converters = vec![
            imu_to_vector(),
            RegisteredConverter::new("sensor_msgs/Imu", "foxglove.Pose", |m, _| Some(m.clone())),
            RegisteredConverter::new("nav_msgs/Odometry", "foxglove.Pose", |m, _| Some(m.clone())),
        ];

        assert_eq!(
            converted_schema_names("sensor_msgs/Imu", &converters),
            Some(vec!["foxglove.Vector3".to_string(), "foxglove.Pose".to_string()])
        );
        assert_eq!(converted_schema_names("std_msgs/String", &converters), None);
    }
}
