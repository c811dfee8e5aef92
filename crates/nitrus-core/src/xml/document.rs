//! XML document assembly over the progressive tokenizer.
//!
//! Builds an element tree from tokenizer events and yields each completed
//! top-level element by value, so one parser instance can assemble an
//! unbounded sequence of documents from a single stream.

use crate::xml::element::XmlElement;
use crate::xml::progressive::{Parser, XmlEvent};
use crate::{Error, Result};

/// Assembles whole documents from a byte stream.
pub struct DocumentParser {
    parser: Parser,
    root: XmlElement,
    depth: usize,
    pending_attribute: (String, String),
}

impl Default for DocumentParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser {
    /// Creates a parser with an empty synthetic root.
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            root: XmlElement::default(),
            depth: 0,
            pending_attribute: (String::new(), String::new()),
        }
    }

    /// Appends bytes and returns every document completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<XmlElement>> {
        let events = self.parser.feed(bytes)?;
        let mut documents = Vec::new();

        for event in events {
            match event {
                XmlEvent::StartElement { ns, name } => {
                    self.top_mut().add_ns(&ns, &name);
                    self.depth += 1;
                }
                XmlEvent::AttributeName { ns, name } => {
                    self.pending_attribute = (ns, name);
                }
                XmlEvent::AttributeValue { value } => {
                    let (ns, name) = self.pending_attribute.clone();
                    self.top_mut().attribute_ns_mut(&ns, &name).set_value(&value);
                }
                XmlEvent::Text { data } => {
                    self.top_mut().set_text(&data);
                }
                XmlEvent::EndElement { ns, name } => {
                    if self.depth == 0 {
                        return Err(Error::Malformed(format!(
                            "end tag {name} without a matching start tag"
                        )));
                    }
                    let top = self.top_mut();
                    if top.ns() != ns || top.name() != name {
                        return Err(Error::Malformed(format!(
                            "end tag {ns}:{name} does not match {}:{}",
                            top.ns(),
                            top.name()
                        )));
                    }
                    self.depth -= 1;
                    if self.depth == 0 {
                        let document = self.root.pop_child().expect("a completed child");
                        self.root = XmlElement::default();
                        documents.push(document);
                    }
                }
            }
        }

        Ok(documents)
    }

    /// The unconsumed tail of the input.
    pub fn buffer(&self) -> &[u8] {
        self.parser.buffer()
    }

    fn top_mut(&mut self) -> &mut XmlElement {
        let mut current = &mut self.root;
        for _ in 0..self.depth {
            current = current
                .last_child_mut()
                .expect("stack depth matches the tree");
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_a_nested_document() {
        let mut parser = DocumentParser::new();
        let documents = parser.feed(b"<a x='1'><b>hi</b></a>").unwrap();

        assert_eq!(documents.len(), 1);
        let a = &documents[0];
        assert_eq!(a.name(), "a");
        assert_eq!(a.attribute("x").value(), "1");
        assert_eq!(a.children().len(), 1);
        assert_eq!(a.child("b").text(), "hi");
    }

    #[test]
    fn one_byte_feeds_produce_the_same_document() {
        let input = b"<a x='1'><b>hi</b></a>";
        let mut whole = DocumentParser::new();
        let expected = whole.feed(input).unwrap();

        let mut parser = DocumentParser::new();
        let mut documents = Vec::new();
        for byte in input {
            documents.extend(parser.feed(&[*byte]).unwrap());
        }
        assert_eq!(documents, expected);
    }

    #[test]
    fn yields_each_top_level_element() {
        let mut parser = DocumentParser::new();
        let documents = parser.feed(b"<a></a><b></b>").unwrap();
        let names: Vec<_> = documents.iter().map(|doc| doc.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn partial_document_yields_nothing_until_complete() {
        let mut parser = DocumentParser::new();
        assert!(parser.feed(b"<iq type='get'><query>").unwrap().is_empty());
        let documents = parser.feed(b"</query></iq>").unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].name(), "iq");
    }

    #[test]
    fn mismatched_end_tag_is_malformed() {
        let mut parser = DocumentParser::new();
        let err = parser.feed(b"<a><b></a>").unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[test]
    fn parent_text_before_children_is_preserved() {
        let mut parser = DocumentParser::new();
        let documents = parser.feed(b"<a>first<b>inner</b></a>").unwrap();
        assert_eq!(documents[0].text(), "first");
        assert_eq!(documents[0].child("b").text(), "inner");
    }

    #[test]
    fn duplicate_children_are_preserved_in_order() {
        let mut parser = DocumentParser::new();
        let documents = parser.feed(b"<r><i>1</i><i>2</i></r>").unwrap();
        let texts: Vec<_> = documents[0]
            .children()
            .iter()
            .map(|child| child.text().to_string())
            .collect();
        assert_eq!(texts, vec!["1", "2"]);
    }
}
