//! XMPP client session negotiation.
//!
//! Drives a full client handshake over an opaque byte pipe: stream open,
//! SASL PLAIN (with in-band account registration when the server rejects
//! the account), resource binding, session creation, then presence
//! broadcast and stanza dispatch. Inbound bytes route to a progressive
//! tokenizer while a `<stream:stream>` opening tag is awaited and to a
//! document parser for everything after it.

use std::time::Duration;

use crate::encoding;
use crate::machine::StateMachine;
use crate::xml::{DocumentParser, Parser, XmlElement, XmlEvent};
use crate::Result;

const NS_CLIENT: &str = "jabber:client";
const NS_STREAMS: &str = "http://etherx.jabber.org/streams";
const NS_SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
const NS_BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
const NS_SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";
const NS_REGISTER: &str = "jabber:iq:register";
const NS_ROSTER: &str = "jabber:iq:roster";

/// How often [`Session::keep_alive`] should be invoked while established.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// An event produced by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The handshake finished; presence was broadcast and the keep-alive
    /// timer should be armed.
    Established,
    /// A contact's presence changed.
    PresenceReceived {
        /// The sender's jid.
        from: String,
        /// The advertised show value, e.g. `away`.
        show: String,
    },
    /// A chat message arrived.
    MessageReceived {
        /// The sender's jid.
        from: String,
        /// The message body.
        body: String,
    },
    /// The transport went away.
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum State {
    Idle,
    Connecting,
    CanDisconnect,
    Connected,
    Disconnected,
    CreatingPreLoginStream,
    CreatedPreLoginStream,
    LoggingIn,
    LoggedIn,
    LoginInvalidAccount,
    LoginInvalidPassword,
    CreatingAccount,
    CreatingPostLoginStream,
    CreatedPostLoginStream,
    BindingResource,
    BoundResource,
    CreatingSession,
    InSession,
    CreatedSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Connect,
    Connected,
    Disconnected,
    CreateStream,
    CreatedStream,
    Login,
    LoggedIn,
    LoginInvalidAccount,
    LoginInvalidPassword,
    CreateAccount,
    CreatedAccount,
    BindResource,
    BoundResource,
    CreateSession,
    CreatedSession,
}

struct Feed {
    username: String,
    password: String,
    domain: String,
    jid: String,
    next_id: u64,
    out: Vec<u8>,
    events: Vec<SessionEvent>,
    progressive: Parser,
    document: DocumentParser,
    header_bytes: Vec<u8>,
    header_seen: bool,
}

impl Feed {
    fn next_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }

    fn send_raw(&mut self, bytes: &[u8]) {
        tracing::debug!(data = %String::from_utf8_lossy(bytes), "sending");
        self.out.extend_from_slice(bytes);
    }

    fn send_element(&mut self, element: &XmlElement) {
        let text = element.to_xml();
        self.send_raw(text.as_bytes());
    }

    fn send_stream_open(&mut self) {
        let mut stream = XmlElement::new_ns("stream", "stream");
        stream.attribute_mut("to").set_value(&self.domain);
        stream.attribute_mut("xmlns").set_value(NS_CLIENT);
        stream
            .attribute_ns_mut("xmlns", "stream")
            .set_value(NS_STREAMS);
        stream.attribute_mut("version").set_value("1.0");
        let tag = stream.start_tag();
        self.send_raw(tag.as_bytes());
    }

    fn plain_credentials(&self) -> String {
        let mut decoded = vec![0u8];
        decoded.extend_from_slice(self.username.as_bytes());
        decoded.push(0);
        decoded.extend_from_slice(self.password.as_bytes());
        encoding::encode(&decoded)
    }

    fn await_stream_header(&mut self) {
        self.progressive = Parser::new();
        self.header_bytes.clear();
        self.header_seen = false;
    }

    fn connected(&mut self) -> Result<Option<Trigger>> {
        self.await_stream_header();
        self.send_stream_open();
        Ok(Some(Trigger::CreateStream))
    }

    fn created_pre_login_stream(&mut self) -> Result<Option<Trigger>> {
        let mut auth = XmlElement::new("auth");
        auth.attribute_mut("xmlns").set_value(NS_SASL);
        auth.attribute_mut("mechanism").set_value("PLAIN");
        auth.set_text(&self.plain_credentials());
        self.send_element(&auth);
        Ok(Some(Trigger::Login))
    }

    fn login_invalid_account(&mut self) -> Result<Option<Trigger>> {
        let id = self.next_id();
        let mut iq = XmlElement::new("iq");
        iq.attribute_mut("type").set_value("set");
        iq.attribute_mut("id").set_value(&id);
        let query = iq.child_mut("query");
        query.attribute_mut("xmlns").set_value(NS_REGISTER);
        query.child_mut("username").set_text(&self.username);
        query.child_mut("password").set_text(&self.password);
        self.send_element(&iq);
        Ok(Some(Trigger::CreateAccount))
    }

    fn login_invalid_password(&mut self) -> Result<Option<Trigger>> {
        tracing::error!(username = %self.username, "invalid password");
        Ok(None)
    }

    fn logged_in(&mut self) -> Result<Option<Trigger>> {
        self.await_stream_header();
        self.send_stream_open();
        Ok(Some(Trigger::CreateStream))
    }

    fn created_post_login_stream(&mut self) -> Result<Option<Trigger>> {
        let id = self.next_id();
        let mut iq = XmlElement::new("iq");
        iq.attribute_mut("to").set_value(&self.domain);
        iq.attribute_mut("type").set_value("set");
        iq.attribute_mut("id").set_value(&id);
        iq.child_mut("bind").attribute_mut("xmlns").set_value(NS_BIND);
        self.send_element(&iq);
        Ok(Some(Trigger::BindResource))
    }

    fn bound_resource(&mut self) -> Result<Option<Trigger>> {
        let id = self.next_id();
        let mut iq = XmlElement::new("iq");
        iq.attribute_mut("to").set_value(&self.domain);
        iq.attribute_mut("type").set_value("set");
        iq.attribute_mut("id").set_value(&id);
        iq.child_mut("session")
            .attribute_mut("xmlns")
            .set_value(NS_SESSION);
        self.send_element(&iq);
        Ok(Some(Trigger::CreateSession))
    }

    fn created_session(&mut self) -> Result<Option<Trigger>> {
        self.events.push(SessionEvent::Established);
        self.send_element(&XmlElement::new("presence"));
        Ok(None)
    }

    fn disconnected(&mut self) -> Result<Option<Trigger>> {
        self.events.push(SessionEvent::Disconnected);
        Ok(None)
    }

    fn accept_subscription(&mut self, jid: &str, id: &str) {
        let mut iq = XmlElement::new("iq");
        iq.attribute_mut("type").set_value("set");
        iq.attribute_mut("id").set_value(id);
        let query = iq.child_mut("query");
        query.attribute_mut("xmlns").set_value(NS_ROSTER);
        let item = query.child_mut("item");
        item.attribute_mut("jid").set_value(jid);
        item.attribute_mut("subscription").set_value("to");
        self.send_element(&iq);
    }

    fn send_presence_to(&mut self, to: &str, kind: &str) {
        let mut presence = XmlElement::new("presence");
        presence.attribute_mut("from").set_value(&self.jid);
        presence.attribute_mut("to").set_value(to);
        presence.attribute_mut("type").set_value(kind);
        self.send_element(&presence);
    }
}

/// An XMPP client session over an opaque byte pipe.
pub struct Session {
    machine: StateMachine<State, Trigger, Feed>,
    feed: Feed,
}

impl Session {
    /// Creates a session for the given account on the given server domain.
    pub fn new(username: &str, password: &str, domain: &str) -> Self {
        let mut machine = StateMachine::new(State::Idle);

        machine
            .configure(State::Idle)
            .permit(Trigger::Connect, State::Connecting);

        machine
            .configure(State::Connecting)
            .permit(Trigger::Connected, State::Connected);

        machine
            .configure(State::CanDisconnect)
            .permit(Trigger::Disconnected, State::Disconnected);

        machine
            .configure(State::Connected)
            .substate_of(State::CanDisconnect)
            .on_entry(Feed::connected)
            .permit(Trigger::CreateStream, State::CreatingPreLoginStream);

        machine
            .configure(State::CreatingPreLoginStream)
            .substate_of(State::CanDisconnect)
            .permit(Trigger::CreatedStream, State::CreatedPreLoginStream);

        machine
            .configure(State::CreatedPreLoginStream)
            .substate_of(State::CanDisconnect)
            .on_entry(Feed::created_pre_login_stream)
            .permit(Trigger::Login, State::LoggingIn);

        machine
            .configure(State::LoggingIn)
            .substate_of(State::CanDisconnect)
            .permit(Trigger::LoggedIn, State::LoggedIn)
            .permit(Trigger::LoginInvalidAccount, State::LoginInvalidAccount)
            .permit(Trigger::LoginInvalidPassword, State::LoginInvalidPassword);

        machine
            .configure(State::LoginInvalidAccount)
            .substate_of(State::CanDisconnect)
            .on_entry(Feed::login_invalid_account)
            .permit(Trigger::CreateAccount, State::CreatingAccount);

        machine
            .configure(State::LoginInvalidPassword)
            .substate_of(State::CanDisconnect)
            .on_entry(Feed::login_invalid_password)
            .permit(Trigger::Login, State::LoggingIn);

        machine
            .configure(State::CreatingAccount)
            .substate_of(State::CanDisconnect)
            .permit(Trigger::CreatedAccount, State::LoggedIn);

        machine
            .configure(State::LoggedIn)
            .substate_of(State::CanDisconnect)
            .on_entry(Feed::logged_in)
            .permit(Trigger::CreateStream, State::CreatingPostLoginStream);

        machine
            .configure(State::CreatingPostLoginStream)
            .substate_of(State::CanDisconnect)
            .permit(Trigger::CreatedStream, State::CreatedPostLoginStream);

        machine
            .configure(State::CreatedPostLoginStream)
            .substate_of(State::CanDisconnect)
            .on_entry(Feed::created_post_login_stream)
            .permit(Trigger::BindResource, State::BindingResource);

        machine
            .configure(State::BindingResource)
            .substate_of(State::CanDisconnect)
            .permit(Trigger::BoundResource, State::BoundResource);

        machine
            .configure(State::BoundResource)
            .substate_of(State::CanDisconnect)
            .on_entry(Feed::bound_resource)
            .permit(Trigger::CreateSession, State::CreatingSession);

        machine
            .configure(State::CreatingSession)
            .substate_of(State::CanDisconnect)
            .permit(Trigger::CreatedSession, State::CreatedSession);

        machine
            .configure(State::InSession)
            .substate_of(State::CanDisconnect);

        machine
            .configure(State::CreatedSession)
            .substate_of(State::InSession)
            .on_entry(Feed::created_session);

        machine
            .configure(State::Disconnected)
            .on_entry(Feed::disconnected);

        Self {
            machine,
            feed: Feed {
                username: username.to_string(),
                password: password.to_string(),
                domain: domain.to_string(),
                jid: String::new(),
                next_id: 0,
                out: Vec::new(),
                events: Vec::new(),
                progressive: Parser::new(),
                document: DocumentParser::new(),
                header_bytes: Vec::new(),
                header_seen: false,
            },
        }
    }

    /// The jid assigned during resource binding; empty before that.
    pub fn jid(&self) -> &str {
        &self.feed.jid
    }

    /// True once the handshake has completed.
    pub fn established(&self) -> bool {
        self.machine.state() == State::CreatedSession
    }

    /// Starts connecting. The caller owns the transport; call
    /// [`Session::connected`] once it is up.
    pub fn connect(&mut self) -> Result<()> {
        self.machine.fire(Trigger::Connect, &mut self.feed)
    }

    /// Reports that the transport connected; queues the stream open.
    pub fn connected(&mut self) -> Result<()> {
        self.machine.fire(Trigger::Connected, &mut self.feed)
    }

    /// Reports that the transport disconnected.
    pub fn disconnected(&mut self) -> Result<Vec<SessionEvent>> {
        if self.machine.can_fire(Trigger::Disconnected, &self.feed) {
            self.machine.fire(Trigger::Disconnected, &mut self.feed)?;
        }
        Ok(std::mem::take(&mut self.feed.events))
    }

    /// Appends received bytes and returns the events they completed.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<Vec<SessionEvent>> {
        tracing::debug!(data = %String::from_utf8_lossy(bytes), "received");

        match self.machine.state() {
            State::CreatingPreLoginStream | State::CreatingPostLoginStream => {
                self.feed.header_bytes.extend_from_slice(bytes);
                let events = self.feed.progressive.feed(bytes)?;
                if !self.feed.header_seen {
                    self.feed.header_seen = events.iter().any(|event| {
                        matches!(
                            event,
                            XmlEvent::StartElement { ns, name }
                                if ns == "stream" && name == "stream"
                        )
                    });
                }
                if self.feed.header_seen {
                    if let Some(tail) = self.header_tail() {
                        // Stanzas that arrived in the same segment as the
                        // stream header belong to the document parser. The
                        // acknowledgement fires first so they are dispatched
                        // in the state that expects them.
                        self.machine.fire(Trigger::CreatedStream, &mut self.feed)?;
                        let documents = self.feed.document.feed(&tail)?;
                        for document in documents {
                            self.on_document(document)?;
                        }
                    }
                }
            }
            _ => {
                let documents = self.feed.document.feed(bytes)?;
                for document in documents {
                    self.on_document(document)?;
                }
            }
        }

        Ok(std::mem::take(&mut self.feed.events))
    }

    /// Everything after the stream header's closing `>`, or `None` while
    /// that byte has not arrived yet.
    fn header_tail(&self) -> Option<Vec<u8>> {
        let buffer = &self.feed.header_bytes;
        let start = buffer
            .windows(b"<stream:stream".len())
            .position(|window| window == b"<stream:stream")
            .unwrap_or(0);
        let close = buffer[start..]
            .iter()
            .position(|&byte| byte == b'>')
            .map(|position| start + position)?;
        Some(buffer[close + 1..].to_vec())
    }

    /// Sends a chat message from the bound jid.
    pub fn message(&mut self, to: &str, body: &str) {
        let mut message = XmlElement::new("message");
        message
            .attribute_mut("from")
            .set_value(&self.feed.jid);
        message.attribute_mut("to").set_value(to);
        message.child_mut("body").set_text(body);
        self.feed.send_element(&message);
    }

    /// Queues the single-space keep-alive byte.
    pub fn keep_alive(&mut self) {
        self.feed.send_raw(b" ");
    }

    /// Drains the bytes to hand to the transport.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.feed.out)
    }

    fn on_document(&mut self, document: XmlElement) -> Result<()> {
        let state = self.machine.state();
        let sasl = document.attribute("xmlns").value() == NS_SASL;

        if state == State::LoggingIn && document.name() == "success" && sasl {
            self.machine.fire(Trigger::LoggedIn, &mut self.feed)?;
        } else if state == State::LoggingIn
            && document.name() == "failure"
            && sasl
            && document.child("bad-protocol").exists()
        {
            self.machine
                .fire(Trigger::LoginInvalidAccount, &mut self.feed)?;
        } else if state == State::LoggingIn
            && document.name() == "failure"
            && sasl
            && document.child("not-authorized").exists()
        {
            self.machine
                .fire(Trigger::LoginInvalidPassword, &mut self.feed)?;
        } else if state == State::CreatingAccount
            && document.name() == "iq"
            && document.child("query").attribute("xmlns").value() == NS_REGISTER
        {
            self.machine.fire(Trigger::CreatedAccount, &mut self.feed)?;
        } else if state == State::BindingResource
            && document.name() == "iq"
            && document.child("bind").attribute("xmlns").value() == NS_BIND
        {
            self.feed.jid = document.child("bind").child("jid").text().to_string();
            self.machine.fire(Trigger::BoundResource, &mut self.feed)?;
        } else if state == State::CreatingSession
            && document.name() == "iq"
            && document.child("session").attribute("xmlns").value() == NS_SESSION
        {
            self.machine.fire(Trigger::CreatedSession, &mut self.feed)?;
        } else if document.name() == "iq"
            && document.attribute("type").value() == "set"
            && document
                .child("query")
                .child("item")
                .attribute("subscription")
                .value()
                == "from"
        {
            let jid = document
                .child("query")
                .child("item")
                .attribute("jid")
                .value()
                .to_string();
            let id = document.attribute("id").value().to_string();
            self.feed.accept_subscription(&jid, &id);
        } else if document.name() == "presence"
            && document.attribute("type").value() == "subscribe"
        {
            let from = document.attribute("from").value().to_string();
            self.feed.send_presence_to(&from, "subscribed");
        } else if document.name() == "presence" && !document.child("show").text().is_empty() {
            self.feed.events.push(SessionEvent::PresenceReceived {
                from: document.attribute("from").value().to_string(),
                show: document.child("show").text().to_string(),
            });
        } else if document.name() == "message" {
            self.feed.events.push(SessionEvent::MessageReceived {
                from: document.attribute("from").value().to_string(),
                body: document.child("body").text().to_string(),
            });
        } else {
            tracing::warn!(document = %document.to_xml(), "unhandled stanza");
        }

        Ok(())
    }
}
