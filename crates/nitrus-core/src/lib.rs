//! Byte-incremental protocol engines for a cooperative event loop.
//!
//! Everything in this crate is sans-io: components consume arbitrary chunk
//! boundaries of transport bytes and produce higher-level events without
//! buffering whole messages and without blocking. The pieces:
//! - A generic hierarchical state machine with substate fallback
//! - A progressive XML tokenizer and a document assembler on top of it
//! - HTTP/1.1 request and response framers with fluent writers
//! - An XMPP client session negotiator
//!
//! Feeding bytes into a component returns the ordered events that feed
//! produced; outbound bytes accumulate in a per-component buffer that the
//! caller drains and hands to its transport. Scheduling and sockets live in
//! nitrus-runtime.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod encoding;
pub mod error;
pub mod http;
pub mod jabber;
pub mod machine;
pub mod xml;

pub use error::{Error, Result};
pub use machine::StateMachine;
