//! Progressive XML tokenizer.
//!
//! Consumes UTF-8 XML fragments at arbitrary chunk boundaries and emits
//! element, attribute and text events. Each state entry attempts to peel a
//! prefix off the input buffer; with only partial data buffered it returns
//! and the next feed retries. The tokenizer never rewinds. A text run is
//! emitted only once its terminating `<` is buffered, so the event sequence
//! does not depend on how the input was chunked.

use crate::machine::StateMachine;
use crate::xml::element::unescape;
use crate::Result;

/// An event produced by the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    /// A start tag name was read.
    StartElement {
        /// Namespace prefix; empty when absent.
        ns: String,
        /// Local name.
        name: String,
    },
    /// An end tag name was read, or a start tag closed with `/>`.
    EndElement {
        /// Namespace prefix; empty when absent.
        ns: String,
        /// Local name.
        name: String,
    },
    /// An attribute name was read.
    AttributeName {
        /// Namespace prefix; empty when absent.
        ns: String,
        /// Local name.
        name: String,
    },
    /// A quoted attribute value was read.
    AttributeValue {
        /// The unescaped value.
        value: String,
    },
    /// A text run between tags was read.
    Text {
        /// The unescaped text.
        data: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum State {
    OpenElement,
    AfterOpenAngle,
    IgnoreDeclaration,
    EndElementName,
    StartElementName,
    OptionalWhitespace,
    OptionalAttribute,
    AttributeName,
    AttributeAssign,
    AttributeQuoteSelect,
    AttributeBodySingle,
    AttributeBodyDouble,
    AttributeCloseSingle,
    AttributeCloseDouble,
    OptionalSlashAfterAttributes,
    ImmediateEndElement,
    CloseElement,
    OptionalOpenElement,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Continue,
    OpenAngle,
    QuestionSeen,
    SlashSeen,
    NoSlash,
    Declaration,
    NameRead,
    WhitespaceSkipped,
    AttributeAhead,
    AttributesDone,
    AttrNameRead,
    AssignRead,
    SingleQuote,
    DoubleQuote,
    ValueRead,
    EmptyElementRead,
    CloseAngle,
    OpenAngleAhead,
    TextAhead,
    TextRead,
}

#[derive(Default)]
struct Feed {
    buffer: Vec<u8>,
    last_start: (String, String),
    events: Vec<XmlEvent>,
}

const NAME_DELIMITERS: &[u8] = b"/> \t\r\n";
const SKIPPED: &[u8] = b"? \t\r\n";

fn split_qualified(raw: &[u8]) -> (String, String) {
    let text = String::from_utf8_lossy(raw);
    match text.split_once(':') {
        Some((ns, name)) => (ns.to_string(), name.to_string()),
        None => (String::new(), text.to_string()),
    }
}

impl Feed {
    fn peek(&self) -> Option<u8> {
        self.buffer.first().copied()
    }

    fn consume(&mut self, count: usize) {
        self.buffer.drain(..count);
    }

    fn find(&self, byte: u8) -> Option<usize> {
        self.buffer.iter().position(|&b| b == byte)
    }

    fn open_element(&mut self) -> Result<Option<Trigger>> {
        match self.peek() {
            Some(b'<') => {
                self.consume(1);
                Ok(Some(Trigger::OpenAngle))
            }
            _ => Ok(None),
        }
    }

    fn after_open_angle(&mut self) -> Result<Option<Trigger>> {
        match self.peek() {
            Some(b'?') => Ok(Some(Trigger::QuestionSeen)),
            Some(b'/') => Ok(Some(Trigger::SlashSeen)),
            Some(_) => Ok(Some(Trigger::NoSlash)),
            None => Ok(None),
        }
    }

    fn ignore_declaration(&mut self) -> Result<Option<Trigger>> {
        let end = self.buffer.windows(2).position(|pair| pair == b"?>");
        match end {
            Some(end) => {
                self.consume(end + 2);
                Ok(Some(Trigger::Declaration))
            }
            None => Ok(None),
        }
    }

    fn end_element_name(&mut self) -> Result<Option<Trigger>> {
        match self.find(b'>') {
            Some(end) => {
                let (ns, name) = split_qualified(&self.buffer[1..end]);
                self.consume(end + 1);
                self.events.push(XmlEvent::EndElement { ns, name });
                Ok(Some(Trigger::NameRead))
            }
            None => Ok(None),
        }
    }

    fn start_element_name(&mut self) -> Result<Option<Trigger>> {
        let end = self
            .buffer
            .iter()
            .position(|b| NAME_DELIMITERS.contains(b));
        match end {
            Some(end) => {
                let (ns, name) = split_qualified(&self.buffer[..end]);
                self.consume(end);
                self.last_start = (ns.clone(), name.clone());
                self.events.push(XmlEvent::StartElement { ns, name });
                Ok(Some(Trigger::NameRead))
            }
            None => Ok(None),
        }
    }

    fn optional_whitespace(&mut self) -> Result<Option<Trigger>> {
        let end = self.buffer.iter().position(|b| !SKIPPED.contains(b));
        match end {
            Some(end) => {
                self.consume(end);
                Ok(Some(Trigger::WhitespaceSkipped))
            }
            None => Ok(None),
        }
    }

    fn optional_attribute(&mut self) -> Result<Option<Trigger>> {
        match self.peek() {
            Some(b'/') | Some(b'>') => Ok(Some(Trigger::AttributesDone)),
            Some(_) => Ok(Some(Trigger::AttributeAhead)),
            None => Ok(None),
        }
    }

    fn attribute_name(&mut self) -> Result<Option<Trigger>> {
        match self.find(b'=') {
            Some(end) => {
                let (ns, name) = split_qualified(&self.buffer[..end]);
                self.consume(end);
                self.events.push(XmlEvent::AttributeName { ns, name });
                Ok(Some(Trigger::AttrNameRead))
            }
            None => Ok(None),
        }
    }

    fn attribute_assign(&mut self) -> Result<Option<Trigger>> {
        match self.peek() {
            Some(b'=') => {
                self.consume(1);
                Ok(Some(Trigger::AssignRead))
            }
            _ => Ok(None),
        }
    }

    fn attribute_quote_select(&mut self) -> Result<Option<Trigger>> {
        match self.peek() {
            Some(b'\'') => {
                self.consume(1);
                Ok(Some(Trigger::SingleQuote))
            }
            Some(b'"') => {
                self.consume(1);
                Ok(Some(Trigger::DoubleQuote))
            }
            _ => Ok(None),
        }
    }

    fn attribute_body(&mut self, quote: u8) -> Result<Option<Trigger>> {
        match self.find(quote) {
            Some(end) => {
                let value = unescape(&String::from_utf8_lossy(&self.buffer[..end]));
                self.consume(end);
                self.events.push(XmlEvent::AttributeValue { value });
                Ok(Some(Trigger::ValueRead))
            }
            None => Ok(None),
        }
    }

    fn attribute_body_single(&mut self) -> Result<Option<Trigger>> {
        self.attribute_body(b'\'')
    }

    fn attribute_body_double(&mut self) -> Result<Option<Trigger>> {
        self.attribute_body(b'"')
    }

    fn attribute_close(&mut self, quote: u8, trigger: Trigger) -> Result<Option<Trigger>> {
        match self.peek() {
            Some(byte) if byte == quote => {
                self.consume(1);
                Ok(Some(trigger))
            }
            _ => Ok(None),
        }
    }

    fn attribute_close_single(&mut self) -> Result<Option<Trigger>> {
        self.attribute_close(b'\'', Trigger::SingleQuote)
    }

    fn attribute_close_double(&mut self) -> Result<Option<Trigger>> {
        self.attribute_close(b'"', Trigger::DoubleQuote)
    }

    fn optional_slash_after_attributes(&mut self) -> Result<Option<Trigger>> {
        match self.peek() {
            Some(b'/') => Ok(Some(Trigger::SlashSeen)),
            Some(_) => Ok(Some(Trigger::NoSlash)),
            None => Ok(None),
        }
    }

    fn immediate_end_element(&mut self) -> Result<Option<Trigger>> {
        if self.buffer.starts_with(b"/>") {
            self.consume(2);
            let (ns, name) = self.last_start.clone();
            self.events.push(XmlEvent::EndElement { ns, name });
            Ok(Some(Trigger::EmptyElementRead))
        } else {
            Ok(None)
        }
    }

    fn close_element(&mut self) -> Result<Option<Trigger>> {
        match self.peek() {
            Some(b'>') => {
                self.consume(1);
                Ok(Some(Trigger::CloseAngle))
            }
            _ => Ok(None),
        }
    }

    fn optional_open_element(&mut self) -> Result<Option<Trigger>> {
        match self.peek() {
            Some(b'<') => Ok(Some(Trigger::OpenAngleAhead)),
            Some(_) => Ok(Some(Trigger::TextAhead)),
            None => Ok(None),
        }
    }

    fn text(&mut self) -> Result<Option<Trigger>> {
        match self.find(b'<') {
            Some(end) => {
                let data = unescape(&String::from_utf8_lossy(&self.buffer[..end]));
                self.consume(end);
                self.events.push(XmlEvent::Text { data });
                Ok(Some(Trigger::TextRead))
            }
            None => Ok(None),
        }
    }
}

/// The progressive tokenizer.
pub struct Parser {
    machine: StateMachine<State, Trigger, Feed>,
    feed: Feed,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Creates a tokenizer resting before the first `<`.
    pub fn new() -> Self {
        let mut machine = StateMachine::new(State::OpenElement);

        machine
            .configure(State::OpenElement)
            .on_entry(Feed::open_element)
            .permit(Trigger::Continue, State::OpenElement)
            .permit(Trigger::OpenAngle, State::AfterOpenAngle);

        machine
            .configure(State::AfterOpenAngle)
            .on_entry(Feed::after_open_angle)
            .permit(Trigger::Continue, State::AfterOpenAngle)
            .permit(Trigger::QuestionSeen, State::IgnoreDeclaration)
            .permit(Trigger::SlashSeen, State::EndElementName)
            .permit(Trigger::NoSlash, State::StartElementName);

        machine
            .configure(State::IgnoreDeclaration)
            .on_entry(Feed::ignore_declaration)
            .permit(Trigger::Continue, State::IgnoreDeclaration)
            .permit(Trigger::Declaration, State::OpenElement);

        machine
            .configure(State::EndElementName)
            .on_entry(Feed::end_element_name)
            .permit(Trigger::Continue, State::EndElementName)
            .permit(Trigger::NameRead, State::OpenElement);

        machine
            .configure(State::StartElementName)
            .on_entry(Feed::start_element_name)
            .permit(Trigger::Continue, State::StartElementName)
            .permit(Trigger::NameRead, State::OptionalWhitespace);

        machine
            .configure(State::OptionalWhitespace)
            .on_entry(Feed::optional_whitespace)
            .permit(Trigger::Continue, State::OptionalWhitespace)
            .permit(Trigger::WhitespaceSkipped, State::OptionalAttribute);

        machine
            .configure(State::OptionalAttribute)
            .on_entry(Feed::optional_attribute)
            .permit(Trigger::Continue, State::OptionalAttribute)
            .permit(Trigger::AttributeAhead, State::AttributeName)
            .permit(Trigger::AttributesDone, State::OptionalSlashAfterAttributes);

        machine
            .configure(State::AttributeName)
            .on_entry(Feed::attribute_name)
            .permit(Trigger::Continue, State::AttributeName)
            .permit(Trigger::AttrNameRead, State::AttributeAssign);

        machine
            .configure(State::AttributeAssign)
            .on_entry(Feed::attribute_assign)
            .permit(Trigger::Continue, State::AttributeAssign)
            .permit(Trigger::AssignRead, State::AttributeQuoteSelect);

        machine
            .configure(State::AttributeQuoteSelect)
            .on_entry(Feed::attribute_quote_select)
            .permit(Trigger::Continue, State::AttributeQuoteSelect)
            .permit(Trigger::SingleQuote, State::AttributeBodySingle)
            .permit(Trigger::DoubleQuote, State::AttributeBodyDouble);

        machine
            .configure(State::AttributeBodySingle)
            .on_entry(Feed::attribute_body_single)
            .permit(Trigger::Continue, State::AttributeBodySingle)
            .permit(Trigger::ValueRead, State::AttributeCloseSingle);

        machine
            .configure(State::AttributeBodyDouble)
            .on_entry(Feed::attribute_body_double)
            .permit(Trigger::Continue, State::AttributeBodyDouble)
            .permit(Trigger::ValueRead, State::AttributeCloseDouble);

        machine
            .configure(State::AttributeCloseSingle)
            .on_entry(Feed::attribute_close_single)
            .permit(Trigger::Continue, State::AttributeCloseSingle)
            .permit(Trigger::SingleQuote, State::OptionalWhitespace);

        machine
            .configure(State::AttributeCloseDouble)
            .on_entry(Feed::attribute_close_double)
            .permit(Trigger::Continue, State::AttributeCloseDouble)
            .permit(Trigger::DoubleQuote, State::OptionalWhitespace);

        machine
            .configure(State::OptionalSlashAfterAttributes)
            .on_entry(Feed::optional_slash_after_attributes)
            .permit(Trigger::Continue, State::OptionalSlashAfterAttributes)
            .permit(Trigger::SlashSeen, State::ImmediateEndElement)
            .permit(Trigger::NoSlash, State::CloseElement);

        machine
            .configure(State::ImmediateEndElement)
            .on_entry(Feed::immediate_end_element)
            .permit(Trigger::Continue, State::ImmediateEndElement)
            .permit(Trigger::EmptyElementRead, State::OpenElement);

        machine
            .configure(State::CloseElement)
            .on_entry(Feed::close_element)
            .permit(Trigger::Continue, State::CloseElement)
            .permit(Trigger::CloseAngle, State::OptionalOpenElement);

        machine
            .configure(State::OptionalOpenElement)
            .on_entry(Feed::optional_open_element)
            .permit(Trigger::Continue, State::OptionalOpenElement)
            .permit(Trigger::OpenAngleAhead, State::OpenElement)
            .permit(Trigger::TextAhead, State::Text);

        machine
            .configure(State::Text)
            .on_entry(Feed::text)
            .permit(Trigger::Continue, State::Text)
            .permit(Trigger::TextRead, State::OpenElement);

        Self {
            machine,
            feed: Feed::default(),
        }
    }

    /// Appends bytes and returns the events they completed, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<XmlEvent>> {
        self.feed.buffer.extend_from_slice(bytes);
        self.machine.fire(Trigger::Continue, &mut self.feed)?;
        Ok(std::mem::take(&mut self.feed.events))
    }

    /// The unconsumed tail of the input.
    pub fn buffer(&self) -> &[u8] {
        &self.feed.buffer
    }
}
