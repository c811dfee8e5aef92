//! XML conformance: the canonical event sequence for a byte-at-a-time feed
//! and the serialize/parse round-trip.

use nitrus_core::xml::{DocumentParser, Parser, XmlElement, XmlEvent};

#[test]
fn single_byte_feed_yields_the_canonical_event_sequence() {
    let mut parser = Parser::new();
    let mut events = Vec::new();
    for byte in b"<a x='1'><b>hi</b></a>" {
        events.extend(parser.feed(&[*byte]).unwrap());
    }

    assert_eq!(
        events,
        vec![
            XmlEvent::StartElement {
                ns: String::new(),
                name: "a".into()
            },
            XmlEvent::AttributeName {
                ns: String::new(),
                name: "x".into()
            },
            XmlEvent::AttributeValue { value: "1".into() },
            XmlEvent::StartElement {
                ns: String::new(),
                name: "b".into()
            },
            XmlEvent::Text { data: "hi".into() },
            XmlEvent::EndElement {
                ns: String::new(),
                name: "b".into()
            },
            XmlEvent::EndElement {
                ns: String::new(),
                name: "a".into()
            },
        ]
    );
}

#[test]
fn single_byte_feed_assembles_the_document() {
    let mut parser = DocumentParser::new();
    let mut documents = Vec::new();
    for byte in b"<a x='1'><b>hi</b></a>" {
        documents.extend(parser.feed(&[*byte]).unwrap());
    }

    assert_eq!(documents.len(), 1);
    let a = &documents[0];
    assert_eq!(a.name(), "a");
    assert_eq!(a.attribute("x").value(), "1");
    assert_eq!(a.children().len(), 1);
    assert_eq!(a.child("b").text(), "hi");
}

fn round_trips(tree: &XmlElement) {
    let serialized = tree.to_xml();
    let mut parser = DocumentParser::new();
    let documents = parser.feed(serialized.as_bytes()).unwrap();
    assert_eq!(documents.len(), 1, "serialized form: {serialized}");
    assert_eq!(&documents[0], tree, "serialized form: {serialized}");
}

#[test]
fn plain_trees_round_trip() {
    let mut tree = XmlElement::new("root");
    tree.attribute_mut("kind").set_value("demo");
    tree.attribute_ns_mut("x", "id").set_value("12");
    tree.set_text("payload");
    round_trips(&tree);

    let mut nested = XmlElement::new_ns("ns", "outer");
    nested.add("inner").set_text("one");
    nested.add("inner").set_text("two");
    nested.child_mut("other").attribute_mut("a").set_value("b");
    round_trips(&nested);
}

#[test]
fn reserved_characters_round_trip_through_the_escape_tables() {
    let mut tree = XmlElement::new("m");
    tree.attribute_mut("q").set_value("a'b\"c<d>e&f");
    tree.set_text("1 < 2 & 3 > 2");
    round_trips(&tree);
}

#[test]
fn consecutive_documents_round_trip_independently() {
    let mut first = XmlElement::new("first");
    first.set_text("1");
    let mut second = XmlElement::new("second");
    second.attribute_mut("n").set_value("2");

    let mut wire = first.to_xml();
    wire.push_str(&second.to_xml());

    let mut parser = DocumentParser::new();
    let documents = parser.feed(wire.as_bytes()).unwrap();
    assert_eq!(documents, vec![first, second]);
}
