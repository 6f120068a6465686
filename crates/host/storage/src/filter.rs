//! Criteria for event log queries.

use crate::{
    StorageError,
    models::{EventLogEntry, EventLogKey},
};
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Criteria selecting event logs.
///
/// All criteria are combined with AND. Within the emitter addresses and within each topic
/// position the values are combined with OR. An empty address list or an empty topic set
/// matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogFilter {
    /// Only logs emitted by this batch.
    pub batch_hash: Option<B256>,
    /// Lowest batch height, inclusive.
    pub from_height: Option<u64>,
    /// Highest batch height, inclusive.
    pub to_height: Option<u64>,
    /// Accepted emitter addresses.
    pub addresses: Vec<Address>,
    /// Accepted topics, by position.
    pub topics: Vec<Vec<B256>>,
}

impl EventLogFilter {
    /// The largest number of topic positions a filter may constrain.
    pub const MAX_TOPICS: usize = 5;

    /// Restricts the filter to a single batch.
    pub const fn with_batch_hash(mut self, batch_hash: B256) -> Self {
        self.batch_hash = Some(batch_hash);
        self
    }

    /// Restricts the filter to a range of batch heights.
    pub const fn with_height_range(mut self, from: u64, to: u64) -> Self {
        self.from_height = Some(from);
        self.to_height = Some(to);
        self
    }

    /// Restricts the filter to logs emitted by one of `addresses`.
    pub fn with_addresses(mut self, addresses: impl IntoIterator<Item = Address>) -> Self {
        self.addresses = addresses.into_iter().collect();
        self
    }

    /// Restricts the filter to logs carrying one of `topics` at `position`.
    ///
    /// A position past [`Self::MAX_TOPICS`] is not stored; it only marks the filter so that
    /// [`validate`](Self::validate) rejects it.
    pub fn with_topic(mut self, position: usize, topics: impl IntoIterator<Item = B256>) -> Self {
        if position >= Self::MAX_TOPICS {
            if self.topics.len() <= Self::MAX_TOPICS {
                self.topics.resize_with(Self::MAX_TOPICS + 1, Vec::new);
            }
            return self;
        }
        if self.topics.len() <= position {
            self.topics.resize_with(position + 1, Vec::new);
        }
        self.topics[position] = topics.into_iter().collect();
        self
    }

    /// Rejects filters that can never be served.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.topics.len() > Self::MAX_TOPICS {
            return Err(StorageError::InvalidQuery(format!(
                "too many topics: {} (max {})",
                self.topics.len(),
                Self::MAX_TOPICS
            )));
        }
        match (self.from_height, self.to_height) {
            (Some(from), Some(to)) if from > to => Err(StorageError::InvalidQuery(format!(
                "inverted height range: {from} > {to}"
            ))),
            _ => Ok(()),
        }
    }

    /// Returns the first constrained topic position and its accepted values.
    pub(crate) fn first_topic_constraint(&self) -> Option<(usize, &[B256])> {
        self.topics
            .iter()
            .enumerate()
            .find(|(_, accepted)| !accepted.is_empty())
            .map(|(position, accepted)| (position, accepted.as_slice()))
    }

    /// Lowest height in range.
    pub(crate) fn lowest_height(&self) -> u64 {
        self.from_height.unwrap_or(0)
    }

    /// Highest height in range.
    pub(crate) fn highest_height(&self) -> u64 {
        self.to_height.unwrap_or(u64::MAX)
    }

    /// Returns `true` if the log at `key` satisfies every criterion.
    ///
    /// Visibility to the requesting account is checked separately.
    pub fn matches(&self, key: &EventLogKey, entry: &EventLogEntry) -> bool {
        if key.number < self.lowest_height() || key.number > self.highest_height() {
            return false;
        }
        if self.batch_hash.is_some_and(|hash| hash != entry.batch_hash) {
            return false;
        }
        if !self.addresses.is_empty() && !self.addresses.contains(&entry.address) {
            return false;
        }
        self.topics.iter().enumerate().all(|(position, accepted)| {
            accepted.is_empty() ||
                entry.topics.get(position).is_some_and(|topic| accepted.contains(&topic.full))
        })
    }
}
