//! XML element trees.
//!
//! Attributes are keyed by the lowercased `ns:name` pair and iterate in key
//! order; children keep insertion order and may repeat. Keyed lookups on the
//! immutable accessors return shared null sentinels whose `exists()` is
//! false, so chained navigation over absent branches stays panic-free.

use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Replaces the five reserved symbols with their escaped abbreviations.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Replaces the five escaped abbreviations with their reserved symbols in
/// one left-to-right pass, so `&amp;lt;` becomes the literal `&lt;`.
pub fn unescape(value: &str) -> String {
    const TABLE: [(&str, char); 5] = [
        ("&apos;", '\''),
        ("&quot;", '"'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&amp;", '&'),
    ];

    let mut unescaped = String::with_capacity(value.len());
    let mut rest = value;
    'outer: while !rest.is_empty() {
        if rest.starts_with('&') {
            for (entity, symbol) in TABLE {
                if let Some(tail) = rest.strip_prefix(entity) {
                    unescaped.push(symbol);
                    rest = tail;
                    continue 'outer;
                }
            }
        }
        let ch = rest.chars().next().expect("checked non-empty");
        unescaped.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    unescaped
}

fn key(ns: &str, name: &str) -> String {
    format!("{ns}:{name}").to_ascii_lowercase()
}

/// A single attribute: namespace, local name and value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlAttribute {
    ns: String,
    name: String,
    value: String,
}

impl XmlAttribute {
    /// Creates an attribute with a namespace and an empty value.
    pub fn new(ns: &str, name: &str) -> Self {
        Self {
            ns: ns.to_string(),
            name: name.to_string(),
            value: String::new(),
        }
    }

    /// The namespace prefixing the name; empty when absent.
    pub fn ns(&self) -> &str {
        &self.ns
    }

    /// The local name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value; always present, possibly empty.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Replaces the value.
    pub fn set_value(&mut self, value: &str) -> &mut Self {
        self.value = value.to_string();
        self
    }

    /// False only for the null sentinel returned on lookup misses.
    pub fn exists(&self) -> bool {
        !self.name.is_empty()
    }
}

fn null_attribute() -> &'static XmlAttribute {
    static NULL: OnceLock<XmlAttribute> = OnceLock::new();
    NULL.get_or_init(XmlAttribute::default)
}

fn null_element() -> &'static XmlElement {
    static NULL: OnceLock<XmlElement> = OnceLock::new();
    NULL.get_or_init(XmlElement::default)
}

/// An element: namespace, local name, text, attributes and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    ns: String,
    name: String,
    text: String,
    attributes: BTreeMap<String, XmlAttribute>,
    children: Vec<XmlElement>,
}

impl XmlElement {
    /// Creates an element without a namespace.
    pub fn new(name: &str) -> Self {
        Self::new_ns("", name)
    }

    /// Creates an element with a namespace.
    pub fn new_ns(ns: &str, name: &str) -> Self {
        Self {
            ns: ns.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// The namespace prefixing the name; empty when absent.
    pub fn ns(&self) -> &str {
        &self.ns
    }

    /// The local name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The text content.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replaces the text content.
    pub fn set_text(&mut self, text: &str) -> &mut Self {
        self.text = text.to_string();
        self
    }

    /// False only for the null sentinel returned on lookup misses.
    pub fn exists(&self) -> bool {
        !self.name.is_empty()
    }

    /// Appends a child without a namespace and returns it.
    pub fn add(&mut self, name: &str) -> &mut XmlElement {
        self.add_ns("", name)
    }

    /// Appends a child with a namespace and returns it.
    pub fn add_ns(&mut self, ns: &str, name: &str) -> &mut XmlElement {
        self.children.push(XmlElement::new_ns(ns, name));
        self.children.last_mut().expect("just pushed")
    }

    /// The first child matching `name`, or the null sentinel.
    pub fn child(&self, name: &str) -> &XmlElement {
        self.child_ns("", name)
    }

    /// The first child matching `ns:name`, or the null sentinel.
    pub fn child_ns(&self, ns: &str, name: &str) -> &XmlElement {
        let wanted = key(ns, name);
        self.children
            .iter()
            .find(|child| key(&child.ns, &child.name) == wanted)
            .unwrap_or_else(|| null_element())
    }

    /// The first child matching `name`, added first if absent.
    pub fn child_mut(&mut self, name: &str) -> &mut XmlElement {
        self.child_ns_mut("", name)
    }

    /// The first child matching `ns:name`, added first if absent.
    pub fn child_ns_mut(&mut self, ns: &str, name: &str) -> &mut XmlElement {
        let wanted = key(ns, name);
        let position = self
            .children
            .iter()
            .position(|child| key(&child.ns, &child.name) == wanted);
        match position {
            Some(index) => &mut self.children[index],
            None => self.add_ns(ns, name),
        }
    }

    /// All children in insertion order.
    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    /// Removes and returns the last child, if any.
    pub(crate) fn pop_child(&mut self) -> Option<XmlElement> {
        self.children.pop()
    }

    /// The most recently added child, if any.
    pub(crate) fn last_child_mut(&mut self) -> Option<&mut XmlElement> {
        self.children.last_mut()
    }

    /// The attribute named `name`, or the null sentinel.
    pub fn attribute(&self, name: &str) -> &XmlAttribute {
        self.attribute_ns("", name)
    }

    /// The attribute named `ns:name`, or the null sentinel.
    pub fn attribute_ns(&self, ns: &str, name: &str) -> &XmlAttribute {
        self.attributes
            .get(&key(ns, name))
            .unwrap_or_else(|| null_attribute())
    }

    /// The attribute named `name`, added empty if absent.
    pub fn attribute_mut(&mut self, name: &str) -> &mut XmlAttribute {
        self.attribute_ns_mut("", name)
    }

    /// The attribute named `ns:name`, added empty if absent.
    pub fn attribute_ns_mut(&mut self, ns: &str, name: &str) -> &mut XmlAttribute {
        self.attributes
            .entry(key(ns, name))
            .or_insert_with(|| XmlAttribute::new(ns, name))
    }

    /// The attributes in key order.
    pub fn attributes(&self) -> impl Iterator<Item = &XmlAttribute> {
        self.attributes.values()
    }

    fn push_qualified(buffer: &mut String, ns: &str, name: &str) {
        if !ns.is_empty() {
            buffer.push_str(ns);
            buffer.push(':');
        }
        buffer.push_str(name);
    }

    /// The start tag: qualified name plus single-quoted attributes.
    pub fn start_tag(&self) -> String {
        let mut buffer = String::new();
        buffer.push('<');
        Self::push_qualified(&mut buffer, &self.ns, &self.name);
        for attribute in self.attributes.values() {
            buffer.push(' ');
            Self::push_qualified(&mut buffer, &attribute.ns, &attribute.name);
            buffer.push_str("='");
            buffer.push_str(&escape(&attribute.value));
            buffer.push('\'');
        }
        buffer.push('>');
        buffer
    }

    /// The end tag.
    pub fn end_tag(&self) -> String {
        let mut buffer = String::new();
        buffer.push_str("</");
        Self::push_qualified(&mut buffer, &self.ns, &self.name);
        buffer.push('>');
        buffer
    }

    /// The whole element: start tag, children in insertion order, escaped
    /// text, end tag.
    pub fn to_xml(&self) -> String {
        let mut buffer = String::new();
        self.write_xml(&mut buffer);
        buffer
    }

    fn write_xml(&self, buffer: &mut String) {
        buffer.push_str(&self.start_tag());
        for child in &self.children {
            child.write_xml(buffer);
        }
        buffer.push_str(&escape(&self.text));
        buffer.push_str(&self.end_tag());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_serializes_a_small_tree() {
        let mut xml = XmlElement::new("root");
        xml.attribute_mut("attr1").set_value("12");
        xml.child_mut("test").set_text("abc");
        xml.child_mut("test").set_text("def");
        xml.add("test").set_text("ghi");

        assert_eq!(
            xml.to_xml(),
            "<root attr1='12'><test>def</test><test>ghi</test></root>"
        );
    }

    #[test]
    fn attributes_serialize_in_key_order() {
        let mut xml = XmlElement::new_ns("stream", "stream");
        xml.attribute_mut("to").set_value("example.com");
        xml.attribute_mut("xmlns").set_value("jabber:client");
        xml.attribute_ns_mut("xmlns", "stream")
            .set_value("http://etherx.jabber.org/streams");
        xml.attribute_mut("version").set_value("1.0");

        assert_eq!(
            xml.start_tag(),
            "<stream:stream to='example.com' version='1.0' xmlns='jabber:client' \
             xmlns:stream='http://etherx.jabber.org/streams'>"
        );
        assert_eq!(xml.end_tag(), "</stream:stream>");
    }

    #[test]
    fn lookup_misses_return_non_existent_sentinels() {
        let xml = XmlElement::new("root");
        assert!(!xml.child("missing").exists());
        assert!(!xml.attribute("missing").exists());
        assert_eq!(xml.child("a").child("b").attribute("c").value(), "");
    }

    #[test]
    fn keys_are_case_insensitive() {
        let mut xml = XmlElement::new("root");
        xml.attribute_mut("Id").set_value("7");
        assert_eq!(xml.attribute("id").value(), "7");
        xml.add("Body");
        assert!(xml.child("body").exists());
    }

    #[test]
    fn escape_covers_the_five_entities() {
        assert_eq!(escape("a<b>&'\""), "a&lt;b&gt;&amp;&apos;&quot;");
    }

    #[test]
    fn unescape_is_a_left_to_right_single_pass() {
        assert_eq!(unescape("&amp;lt;"), "&lt;");
        assert_eq!(unescape("&lt;x&gt;"), "<x>");
        assert_eq!(unescape("&amp;amp;"), "&amp;");
        assert_eq!(unescape("plain & broken &unknown;"), "plain & broken &unknown;");
    }

    #[test]
    fn text_and_attributes_escape_on_emit() {
        let mut xml = XmlElement::new("m");
        xml.attribute_mut("q").set_value("a'b");
        xml.set_text("1 < 2");
        assert_eq!(xml.to_xml(), "<m q='a&apos;b'>1 &lt; 2</m>");
    }
}
