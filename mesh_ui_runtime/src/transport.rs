//! Transport contract and the coalescing delta channel.
//!
//! Delivery of property deltas is last-value-wins per topic, not an ordered
//! event log: a `no_duplicates` command overwrites a still-queued command
//! with the same opcode and topic, keeping the queued position.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::trace;

use crate::command::RoutedCommand;

/// Outbound side of the mesh pub-sub layer. Fire-and-forget.
pub trait Transport: Send + Sync {
    fn publish_to_node(&self, node_id: &str, command: RoutedCommand);
    fn publish_broadcast(&self, command: RoutedCommand);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Destination {
    Node(String),
    Broadcast,
}

/// FIFO queue where no-duplicates commands coalesce by topic.
#[derive(Default)]
pub struct CoalescingChannel {
    queue: Mutex<VecDeque<RoutedCommand>>,
    coalesced: AtomicU64,
}

impl CoalescingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `command`. Returns true if it replaced a queued command.
    pub fn push(&self, command: RoutedCommand) -> bool {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if command.no_duplicates {
            if let Some(slot) = queue.iter_mut().find(|queued| {
                queued.no_duplicates
                    && queued.opcode == command.opcode
                    && queued.topic == command.topic
            }) {
                trace!("coalesced {} {}", command.opcode, command.topic);
                *slot = command;
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }
        queue.push_back(command);
        false
    }

    /// Take everything queued, oldest first.
    pub fn drain(&self) -> Vec<RoutedCommand> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Commands dropped by overwriting since creation.
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

/// Transport that parks commands in one coalescing channel per
/// destination until a pump (or a test) drains them.
#[derive(Default)]
pub struct QueuedTransport {
    channels: Mutex<BTreeMap<Destination, Arc<CoalescingChannel>>>,
}

impl QueuedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, destination: &Destination) -> Arc<CoalescingChannel> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            channels
                .entry(destination.clone())
                .or_insert_with(|| Arc::new(CoalescingChannel::new())),
        )
    }

    pub fn drain(&self, destination: &Destination) -> Vec<RoutedCommand> {
        self.channel(destination).drain()
    }

    /// Destinations that currently hold queued commands.
    pub fn pending_destinations(&self) -> Vec<Destination> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, channel)| !channel.is_empty())
            .map(|(destination, _)| destination.clone())
            .collect()
    }
}

impl Transport for QueuedTransport {
    fn publish_to_node(&self, node_id: &str, command: RoutedCommand) {
        self.channel(&Destination::Node(node_id.to_string()))
            .push(command);
    }

    fn publish_broadcast(&self, command: RoutedCommand) {
        self.channel(&Destination::Broadcast).push(command);
    }
}
