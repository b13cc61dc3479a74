//! Hand-written protobuf types for the snapshot wire form.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Maps are `BTreeMap` so encoding is deterministic.

use std::collections::BTreeMap;

use prost::Message;

// ── Snapshot ───────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoSnapshot {
    #[prost(uint32, tag = "1")]
    pub format_version: u32,
    #[prost(string, tag = "2")]
    pub schema: String,
    #[prost(btree_map = "string, message", tag = "3")]
    pub places: BTreeMap<String, ProtoPlace>,
    #[prost(btree_map = "string, message", tag = "4")]
    pub transitions: BTreeMap<String, ProtoTransition>,
}

// ── Place ──────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoPlace {
    #[prost(uint64, tag = "1")]
    pub initial: u64,
    #[prost(uint64, tag = "2")]
    pub capacity: u64,
    #[prost(uint64, tag = "3")]
    pub offset: u64,
    #[prost(message, optional, tag = "4")]
    pub coords: Option<ProtoCoords>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoCoords {
    #[prost(sint64, tag = "1")]
    pub x: i64,
    #[prost(sint64, tag = "2")]
    pub y: i64,
}

// ── Transition ─────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoTransition {
    #[prost(sint64, repeated, tag = "1")]
    pub delta: Vec<i64>,
    #[prost(string, tag = "2")]
    pub role: String,
    #[prost(btree_map = "string, uint64", tag = "3")]
    pub guards: BTreeMap<String, u64>,
}
