//! Routed commands: the single message shape used for outbound deltas and
//! inbound requests or mutations. Also converts to and from the protobuf
//! wire types and holds the opcode-specific body codecs.
//!
//! Body conventions:
//!   - fields joined by `:;:`
//!   - SETNP/SETFNP: `<assignments>[:<ownerThingId>[:<subControlSelector>]]`
//!   - `%` and `:` inside assignment names/values are escaped as `%25`/`%3A`
//!     so the trailing `:`-fields parse unambiguously

use mesh_ui_model::PlatformClass;
use prost::Message;

use crate::error::CodecError;
use crate::wire::{ProtoRequestContext, ProtoRoutedCommand};

pub mod opcode {
    pub const SET_PROPERTY: &str = "SETNP";
    pub const SET_OWNED_PROPERTY: &str = "SETFNP";
    pub const GET_DATA: &str = "NMI_GET_DATA";
    pub const SET_DATA: &str = "NMI_SET_DATA";
    pub const GET_SCREEN: &str = "NMI_GET_SCREEN";
    pub const SET_SCREEN: &str = "NMI_SET_SCREEN";
    pub const GET_RESOURCE: &str = "NMI_GET_RESOURCE";
    pub const SET_RESOURCE: &str = "NMI_SET_RESOURCE";
    pub const UPDATE_DATA: &str = "NMI_UPD_DATA";
    pub const UPDATE_DATA_RET: &str = "NMI_UPD_DATA_RET";
    pub const DELETE_ID: &str = "NMI_DEL_ID";
    pub const DELETE_ID_RET: &str = "NMI_DEL_ID_RET";
    pub const REFRESH: &str = "NMI_REFRESH";
    pub const ERROR: &str = "NMI_ERROR";
}

/// Reserved separator between body fields and between assignments.
pub const FIELD_SEPARATOR: &str = ":;:";

/// Origin used for messages addressed to every node.
pub const BROADCAST_ORIGIN: &str = "all";

/// Topic suffix of the shared-source refresh notification.
pub const RETRIEVED_SUFFIX: &str = "-retrieved";

/// A single `name=value` assignment.
pub type Assignment = (String, String);

/// Convenience for building assignment lists from literals.
pub fn assignments(pairs: &[(&str, &str)]) -> Vec<Assignment> {
    pairs
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}

// ── Sub-verbs ──────────────────────────────────────────────────

/// Specialized picker requests carried as `NMI_GET_DATA:<VERB>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSubVerb {
    Thing,
    DeviceType,
    Property,
    Certificate,
    Resolve,
}

impl DataSubVerb {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "THING" => Some(DataSubVerb::Thing),
            "DEVICETYPE" => Some(DataSubVerb::DeviceType),
            "PROPERTY" => Some(DataSubVerb::Property),
            "CERTIFICATE" => Some(DataSubVerb::Certificate),
            "RESOLVE" => Some(DataSubVerb::Resolve),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSubVerb::Thing => "THING",
            DataSubVerb::DeviceType => "DEVICETYPE",
            DataSubVerb::Property => "PROPERTY",
            DataSubVerb::Certificate => "CERTIFICATE",
            DataSubVerb::Resolve => "RESOLVE",
        }
    }
}

// ── Routed command ─────────────────────────────────────────────

/// Who is asking: drives access checks, localization and overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub user_id: String,
    /// 0 means "use the node default".
    pub lcid: u32,
    pub platform: Option<PlatformClass>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutedCommand {
    pub opcode: String,
    /// Control id (+ `:<property>` de-dup suffix) or notification topic.
    pub topic: String,
    pub origin: String,
    pub body: String,
    pub payload: Vec<u8>,
    /// A queued command with the same topic may be overwritten.
    pub no_duplicates: bool,
    /// Never re-delivered to the sender's own local loop.
    pub nodes_only: bool,
    /// Relay hops so far; zero means the first node.
    pub hops: u32,
    pub context: RequestContext,
}

impl RoutedCommand {
    pub fn new(opcode: &str, body: &str) -> Self {
        Self {
            opcode: opcode.to_string(),
            body: body.to_string(),
            ..Default::default()
        }
    }

    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = topic.to_string();
        self
    }

    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = origin.to_string();
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Opcode without any `:<SUBVERB>` suffix.
    pub fn base_opcode(&self) -> &str {
        self.opcode
            .split_once(':')
            .map(|(base, _)| base)
            .unwrap_or(&self.opcode)
    }

    pub fn sub_verb(&self) -> Option<&str> {
        self.opcode.split_once(':').map(|(_, verb)| verb)
    }

    pub fn is_first_node(&self) -> bool {
        self.hops == 0
    }

    /// Body split on the reserved separator.
    pub fn fields(&self) -> Vec<&str> {
        self.body.split(FIELD_SEPARATOR).collect()
    }

    /// Copy for relaying to another engine; only the hop count changes.
    pub fn relayed(&self) -> RoutedCommand {
        let mut next = self.clone();
        next.hops = next.hops.saturating_add(1);
        next
    }

    /// Answer addressed back at this command's origin.
    pub fn reply(&self, opcode: &str, body: &str, from: &str) -> RoutedCommand {
        RoutedCommand {
            opcode: opcode.to_string(),
            topic: self.topic.clone(),
            origin: from.to_string(),
            body: body.to_string(),
            context: self.context.clone(),
            ..Default::default()
        }
    }

    pub fn to_proto(&self) -> ProtoRoutedCommand {
        ProtoRoutedCommand {
            opcode: self.opcode.clone(),
            topic: self.topic.clone(),
            origin: self.origin.clone(),
            body: self.body.clone(),
            payload: self.payload.clone(),
            no_duplicates: self.no_duplicates,
            nodes_only: self.nodes_only,
            hops: self.hops,
            context: Some(ProtoRequestContext {
                user_id: self.context.user_id.clone(),
                lcid: self.context.lcid,
                platform: self
                    .context
                    .platform
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default(),
            }),
        }
    }

    pub fn from_proto(proto: &ProtoRoutedCommand) -> RoutedCommand {
        let context = proto
            .context
            .as_ref()
            .map(|c| RequestContext {
                user_id: c.user_id.clone(),
                lcid: c.lcid,
                platform: PlatformClass::parse(&c.platform),
            })
            .unwrap_or_default();
        RoutedCommand {
            opcode: proto.opcode.clone(),
            topic: proto.topic.clone(),
            origin: proto.origin.clone(),
            body: proto.body.clone(),
            payload: proto.payload.clone(),
            no_duplicates: proto.no_duplicates,
            nodes_only: proto.nodes_only,
            hops: proto.hops,
            context,
        }
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<RoutedCommand, CodecError> {
        let proto = ProtoRoutedCommand::decode(bytes)?;
        Ok(RoutedCommand::from_proto(&proto))
    }
}

// ── SETNP / SETFNP body ────────────────────────────────────────

/// Decoded body of a property-set command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetPropertyBody {
    pub assignments: Vec<Assignment>,
    pub owner_thing_id: Option<String>,
    /// Omitted: the assignment applies to every control with that id.
    pub sub_control: Option<String>,
}

impl SetPropertyBody {
    pub fn encode(&self) -> String {
        let mut out = encode_assignments(&self.assignments);
        if self.owner_thing_id.is_some() || self.sub_control.is_some() {
            out.push(':');
            out.push_str(&escape(self.owner_thing_id.as_deref().unwrap_or("")));
            if let Some(sub) = &self.sub_control {
                out.push(':');
                out.push_str(&escape(sub));
            }
        }
        out
    }

    pub fn decode(opcode: &str, body: &str) -> Result<SetPropertyBody, CodecError> {
        let malformed = || CodecError::MalformedBody {
            opcode: opcode.to_string(),
            body: body.to_string(),
        };

        let mut pieces: Vec<&str> = body.split(FIELD_SEPARATOR).collect();
        let last = pieces.pop().unwrap_or("");
        let mut tail = last.split(':');
        let last_assignment = tail.next().unwrap_or("");
        let owner = tail.next().filter(|s| !s.is_empty());
        let sub_control = tail.next().filter(|s| !s.is_empty());
        if tail.next().is_some() {
            return Err(malformed());
        }
        let owner = owner.map(unescape).transpose().map_err(|_| malformed())?;
        let sub_control = sub_control
            .map(unescape)
            .transpose()
            .map_err(|_| malformed())?;
        pieces.push(last_assignment);

        Ok(SetPropertyBody {
            assignments: decode_assignments(&pieces).map_err(|_| malformed())?,
            owner_thing_id: owner,
            sub_control,
        })
    }
}

/// `name=value` pairs joined by the reserved separator, escaped.
pub fn encode_assignments(assignments: &[Assignment]) -> String {
    assignments
        .iter()
        .map(|(name, value)| format!("{}={}", escape(name), escape(value)))
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

/// Inverse of [`encode_assignments`] over already-split fields.
/// Empty fields are skipped.
pub fn decode_assignments(fields: &[&str]) -> Result<Vec<Assignment>, CodecError> {
    fields
        .iter()
        .filter(|f| !f.is_empty())
        .map(|f| {
            let (name, value) = f
                .split_once('=')
                .ok_or_else(|| CodecError::MalformedAssignment(f.to_string()))?;
            Ok((unescape(name)?, unescape(value)?))
        })
        .collect()
}

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    out
}

pub fn unescape(raw: &str) -> Result<String, CodecError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3).map(|c| c.to_ascii_uppercase());
        match code.as_deref() {
            Some("25") => out.push('%'),
            Some("3A") => out.push(':'),
            _ => return Err(CodecError::BadEscape(raw.to_string())),
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Ok(out)
}
