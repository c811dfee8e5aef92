//! Streaming XML: a progressive tokenizer, a document assembler over it,
//! and the element tree both of them share.

mod document;
mod element;
mod progressive;

pub use document::DocumentParser;
pub use element::{escape, unescape, XmlAttribute, XmlElement};
pub use progressive::{Parser, XmlEvent};
