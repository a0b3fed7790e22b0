//! Outbound property propagation.
//!
//! Every call is fire-and-forget and returns the routing decision instead
//! of an error. Topics:
//!
//!   <controlId>[/<ownerThingId>][#<subControl>][:<property>]
//!
//! The `:<property>` suffix is only present on single-assignment sends,
//! which are also marked no-duplicates so a queued older value for the
//! same control and property is overwritten. Each qualifier is escaped
//! like a SETNP field.

use std::sync::Arc;

use log::{debug, trace};

use crate::command::{
    escape, opcode, Assignment, RoutedCommand, SetPropertyBody, BROADCAST_ORIGIN,
};
use crate::config::SyncConfig;
use crate::registry::MeshRegistry;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Node(String),
    Broadcast,
}

impl Target {
    pub fn node(node_id: &str) -> Self {
        Target::Node(node_id.to_string())
    }

    /// `all` maps to the broadcast target.
    pub fn from_origin(origin: &str) -> Self {
        if origin == BROADCAST_ORIGIN {
            Target::Broadcast
        } else {
            Target::Node(origin.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotRunning,
    NoAssignments,
    UnknownNode,
    UnscopedCloudBroadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    Skipped(SkipReason),
}

impl PublishOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, PublishOutcome::Sent)
    }
}

/// Build the SETNP/SETFNP command for one control.
pub fn property_command(
    sender: &str,
    control_id: &str,
    assignments: &[Assignment],
    owner_thing_id: Option<&str>,
    sub_control: Option<&str>,
) -> RoutedCommand {
    let op = if owner_thing_id.is_some() {
        opcode::SET_OWNED_PROPERTY
    } else {
        opcode::SET_PROPERTY
    };
    let body = SetPropertyBody {
        assignments: assignments.to_vec(),
        owner_thing_id: owner_thing_id.map(str::to_string),
        sub_control: sub_control.map(str::to_string),
    };

    let mut topic = control_id.to_string();
    if let Some(owner) = owner_thing_id {
        topic.push('/');
        topic.push_str(&escape(owner));
    }
    if let Some(sub) = sub_control {
        topic.push('#');
        topic.push_str(&escape(sub));
    }

    let mut command = RoutedCommand::new(op, &body.encode()).with_origin(sender);
    if let [(name, _)] = assignments {
        topic.push(':');
        topic.push_str(&escape(name));
        command.no_duplicates = true;
    }
    command.with_topic(&topic)
}

pub struct PropertyPublisher {
    registry: Arc<MeshRegistry>,
    transport: Arc<dyn Transport>,
    config: SyncConfig,
}

impl PropertyPublisher {
    pub fn new(registry: Arc<MeshRegistry>, transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        Self {
            registry,
            transport,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<MeshRegistry> {
        &self.registry
    }

    pub fn set_remote_property(
        &self,
        target: &Target,
        control_id: &str,
        assignments: &[Assignment],
        owner_thing_id: Option<&str>,
        sub_control: Option<&str>,
    ) -> PublishOutcome {
        if !self.registry.is_running() {
            return self.skip(control_id, SkipReason::NotRunning);
        }
        if assignments.is_empty() {
            return self.skip(control_id, SkipReason::NoAssignments);
        }

        let mut command = property_command(
            self.registry.node_id(),
            control_id,
            assignments,
            owner_thing_id,
            sub_control,
        );

        match target {
            Target::Broadcast => {
                if !self.config.may_broadcast() {
                    return self.skip(control_id, SkipReason::UnscopedCloudBroadcast);
                }
                command.nodes_only = true;
                trace!("broadcast {} {}", command.opcode, command.topic);
                self.transport.publish_broadcast(command);
            }
            Target::Node(node_id) => {
                if !self.registry.is_known(node_id) {
                    return self.skip(control_id, SkipReason::UnknownNode);
                }
                trace!("send {} {} to {}", command.opcode, command.topic, node_id);
                self.transport.publish_to_node(node_id, command);
            }
        }
        PublishOutcome::Sent
    }

    fn skip(&self, control_id: &str, reason: SkipReason) -> PublishOutcome {
        debug!("property send for {} suppressed: {:?}", control_id, reason);
        PublishOutcome::Skipped(reason)
    }
}
