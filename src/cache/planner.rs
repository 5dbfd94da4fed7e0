//! Invalidation plan generation.
//!
//! Merges a batch of events into the distinct set of tags to purge.

use std::collections::HashSet;
use std::fmt;

use super::events::{Epoch, InvalidationEvent};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Distinct tags in the order they were first seen.
    pub tags: Vec<String>,
    /// Events that contributed after deduplication.
    pub event_count: usize,
    /// Highest epoch covered by this plan.
    pub latest_epoch: Option<Epoch>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ events: {}, tags: {}, latest_epoch: {:?} }}",
            self.event_count,
            self.tags.len(),
            self.latest_epoch,
        )
    }
}

impl InvalidationPlan {
    /// Merge events into a plan.
    ///
    /// Events are deduplicated by id and processed in epoch order.
    pub fn from_events(events: Vec<InvalidationEvent>) -> Self {
        let mut seen_ids = HashSet::new();
        let mut events: Vec<_> = events
            .into_iter()
            .filter(|event| seen_ids.insert(event.id))
            .collect();
        events.sort_by_key(|event| event.epoch);

        let mut plan = Self {
            event_count: events.len(),
            latest_epoch: events.last().map(|event| event.epoch),
            ..Self::default()
        };

        let mut seen_tags = HashSet::new();
        for event in &events {
            for tag in event.kind.tags() {
                if seen_tags.insert(tag.clone()) {
                    plan.tags.push(tag);
                }
            }
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::events::InvalidationKind;

    fn make_event(kind: InvalidationKind, epoch: u64) -> InvalidationEvent {
        InvalidationEvent::new(kind, epoch)
    }

    #[test]
    fn entity_events_become_entity_tags() {
        let plan = InvalidationPlan::from_events(vec![
            make_event(InvalidationKind::updated("node", 42), 1),
            make_event(InvalidationKind::deleted("taxonomy_term", 7), 2),
        ]);

        assert_eq!(plan.tags, vec!["node:42", "taxonomy_term:7"]);
        assert_eq!(plan.event_count, 2);
        assert_eq!(plan.latest_epoch, Some(2));
    }

    #[test]
    fn duplicate_tags_collapse_in_first_seen_order() {
        let plan = InvalidationPlan::from_events(vec![
            make_event(InvalidationKind::updated("node", 1), 1),
            make_event(
                InvalidationKind::TagsPurged {
                    tags: vec!["node:2".into(), "node:1".into()],
                },
                2,
            ),
            make_event(InvalidationKind::deleted("node", 2), 3),
        ]);

        assert_eq!(plan.tags, vec!["node:1", "node:2"]);
    }

    #[test]
    fn dedupe_by_event_id() {
        let event = make_event(InvalidationKind::updated("node", 1), 1);
        let plan = InvalidationPlan::from_events(vec![event.clone(), event]);

        assert_eq!(plan.event_count, 1);
        assert_eq!(plan.tags, vec!["node:1"]);
    }

    #[test]
    fn events_are_ordered_by_epoch() {
        let plan = InvalidationPlan::from_events(vec![
            make_event(InvalidationKind::updated("node", 9), 5),
            make_event(InvalidationKind::updated("node", 3), 2),
        ]);

        assert_eq!(plan.tags, vec!["node:3", "node:9"]);
        assert_eq!(plan.latest_epoch, Some(5));
    }

    #[test]
    fn display_format() {
        let plan = InvalidationPlan::from_events(vec![make_event(
            InvalidationKind::updated("node", 1),
            4,
        )]);
        assert_eq!(
            plan.to_string(),
            "InvalidationPlan { events: 1, tags: 1, latest_epoch: Some(4) }"
        );
    }

    #[test]
    fn is_empty() {
        assert!(InvalidationPlan::from_events(Vec::new()).is_empty());
        assert!(
            InvalidationPlan::from_events(vec![make_event(
                InvalidationKind::TagsPurged { tags: Vec::new() },
                0
            )])
            .is_empty()
        );
    }
}
