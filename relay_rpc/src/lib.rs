//! This crate provides the relay domain types and the JSON-RPC payloads
//! exchanged between clients and the relay.

pub mod domain;
pub mod macros;
pub mod rpc;
