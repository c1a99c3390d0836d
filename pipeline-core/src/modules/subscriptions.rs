use std::{collections::BTreeMap, sync::Arc};

use crate::models::subscriptions::SubscribePayload;

type SubscriptionKey = (String, Option<String>);

fn merge_into(merged: &mut SubscribePayload, payload: &SubscribePayload) {
    merged.preload_type = merged.preload_type.max(payload.preload_type);

    // A request for every field wins over any slice
    merged.fields = match (merged.fields.take(), &payload.fields) {
        (Some(mut fields), Some(other)) => {
            fields.extend(other.iter().cloned());
            Some(fields)
        }
        _ => None,
    };
}

/// Collapses the subscriptions of every consumer into the minimal set handed
/// to the player. Payloads for the same topic and conversion target are merged
/// into the strictest request; raw and converted subscriptions to one topic
/// stay separate.
pub fn merge_subscriptions<'a, I>(payloads: I) -> Vec<SubscribePayload>
where
    I: IntoIterator<Item = &'a SubscribePayload>,
{
    let mut merged: BTreeMap<SubscriptionKey, SubscribePayload> = BTreeMap::new();

    for payload in payloads {
        let key = (payload.topic.clone(), payload.convert_to.clone());
        match merged.get_mut(&key) {
            Some(existing) => merge_into(existing, payload),
            None => {
                merged.insert(key, payload.clone());
            }
        }
    }

    merged.into_values().collect()
}

/// Hands out the same `Arc` for as long as the merged subscriptions are equal,
/// so identity-diffing players do not resubscribe upstream.
#[derive(Debug, Default)]
pub struct SubscriptionMemoizer {
    previous: Option<Arc<Vec<SubscribePayload>>>,
}

impl SubscriptionMemoizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memoize(&mut self, subscriptions: Vec<SubscribePayload>) -> Arc<Vec<SubscribePayload>> {
        if let Some(previous) = &self.previous {
            if **previous == subscriptions {
                return previous.clone();
            }
        }

        let subscriptions = Arc::new(subscriptions);
        self.previous = Some(subscriptions.clone());
        subscriptions
    }
}

#[cfg(test)]
mod success {
    use std::sync::Arc;

    use crate::{
        models::subscriptions::{PreloadType, SubscribePayload},
        subscriptions::{merge_subscriptions, SubscriptionMemoizer},
    };

    #[test]
    fn merge_deduplicates_same_topic() {
        let payloads = vec![
            SubscribePayload::new("/imu"),
            SubscribePayload::new("/odom"),
            SubscribePayload::new("/imu"),
        ];

        let merged = merge_subscriptions(&payloads);

        assert_eq!(
            merged,
            vec![SubscribePayload::new("/imu"), SubscribePayload::new("/odom")]
        );
    }

    #[test]
    fn merge_keeps_raw_and_converted_apart() {
        let payloads = vec![
            SubscribePayload::converted("/imu", "foxglove.Vector3"),
            SubscribePayload::new("/imu"),
        ];

        let merged = merge_subscriptions(&payloads);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].convert_to, None);
        assert_eq!(merged[1].convert_to.as_deref(), Some("foxglove.Vector3"));
    }

    #[test]
    fn merge_prefers_full_preload() {
        let payloads = vec![
            SubscribePayload::new("/scan"),
            SubscribePayload::new("/scan").with_preload_type(PreloadType::Full),
        ];

        let merged = merge_subscriptions(&payloads);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].preload_type, PreloadType::Full);
    }

    #[test]
    fn merge_unions_field_slices() {
        let payloads = vec![
            SubscribePayload::new("/pose").with_fields(["x"]),
            SubscribePayload::new("/pose").with_fields(["y"]),
        ];

        let merged = merge_subscriptions(&payloads);

        let fields: Vec<_> = merged[0].fields.as_ref().unwrap().iter().cloned().collect();
        assert_eq!(fields, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn merge_all_fields_wins_over_slice() {
        let payloads = vec![
            SubscribePayload::new("/pose").with_fields(["x"]),
            SubscribePayload::new("/pose"),
            SubscribePayload::new("/pose").with_fields(["y"]),
        ];

        let merged = merge_subscriptions(&payloads);

        assert_eq!(merged[0].fields, None);
    }

    #[test]
    fn memoize_returns_same_reference_for_equal_content() {
        let mut memoizer = SubscriptionMemoizer::new();

        let first = memoizer.memoize(vec![SubscribePayload::new("/imu")]);
        let second = memoizer.memoize(vec![SubscribePayload::new("/imu")]);
        let third = memoizer.memoize(vec![SubscribePayload::new("/odom")]);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&second, &third));
    }
}
