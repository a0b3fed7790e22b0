//! Hand-written protobuf types for the routed-command wire.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Field numbers are part of the mesh protocol; never renumber.

use prost::Message;

// ── Routed command ─────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoRoutedCommand {
    #[prost(string, tag = "1")]
    pub opcode: String,
    #[prost(string, tag = "2")]
    pub topic: String,
    #[prost(string, tag = "3")]
    pub origin: String,
    #[prost(string, tag = "4")]
    pub body: String,
    #[prost(bytes = "vec", tag = "5")]
    pub payload: Vec<u8>,
    #[prost(bool, tag = "6")]
    pub no_duplicates: bool,
    #[prost(bool, tag = "7")]
    pub nodes_only: bool,
    #[prost(uint32, tag = "8")]
    pub hops: u32,
    #[prost(message, optional, tag = "9")]
    pub context: Option<ProtoRequestContext>,
}

// ── Request context ────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoRequestContext {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(uint32, tag = "2")]
    pub lcid: u32,
    #[prost(string, tag = "3")]
    pub platform: String,
}
