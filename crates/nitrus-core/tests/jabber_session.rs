//! XMPP session conformance: the happy-path handshake emits exactly the
//! expected documents in order, regardless of how the server's bytes are
//! chunked, and an established session dispatches stanzas.

use nitrus_core::jabber::{Session, SessionEvent};

const SERVER_SCRIPT: [&[u8]; 5] = [
    b"<stream:stream from='example.com' id='s1' version='1.0'>",
    b"<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>",
    b"<stream:stream from='example.com' id='s2' version='1.0'>",
    b"<iq type='result' id='0'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><jid>alice@example.com/nitrus</jid></bind></iq>",
    b"<iq type='result' id='1'><session xmlns='urn:ietf:params:xml:ns:xmpp-session'/></iq>",
];

fn expected_output() -> String {
    let stream_open = "<stream:stream to='example.com' version='1.0' xmlns='jabber:client' \
                       xmlns:stream='http://etherx.jabber.org/streams'>";
    format!(
        "{stream_open}\
         <auth mechanism='PLAIN' xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>AGFsaWNlAHNlY3JldQ==</auth>\
         {stream_open}\
         <iq id='0' to='example.com' type='set'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'></bind></iq>\
         <iq id='1' to='example.com' type='set'><session xmlns='urn:ietf:params:xml:ns:xmpp-session'></session></iq>\
         <presence></presence>"
    )
}

fn start_session() -> Session {
    let mut session = Session::new("alice", "secret", "example.com");
    session.connect().unwrap();
    session.connected().unwrap();
    session
}

#[test]
fn happy_path_sends_the_documented_sequence() {
    let mut session = start_session();
    let mut events = Vec::new();
    for step in SERVER_SCRIPT {
        events.extend(session.receive(step).unwrap());
    }

    assert_eq!(events, vec![SessionEvent::Established]);
    assert_eq!(
        String::from_utf8(session.take_output()).unwrap(),
        expected_output()
    );
    assert_eq!(session.jid(), "alice@example.com/nitrus");
}

#[test]
fn handshake_survives_single_byte_delivery() {
    let mut session = start_session();
    let mut events = Vec::new();
    for step in SERVER_SCRIPT {
        for byte in step {
            events.extend(session.receive(&[*byte]).unwrap());
        }
    }

    assert_eq!(events, vec![SessionEvent::Established]);
    assert_eq!(
        String::from_utf8(session.take_output()).unwrap(),
        expected_output()
    );
}

#[test]
fn handshake_survives_a_fully_coalesced_delivery() {
    let mut session = start_session();
    // The server's pre-login bytes arrive as one segment, the post-login
    // bytes as another: stanzas share a segment with each stream header.
    let pre_login: Vec<u8> = SERVER_SCRIPT[..2].concat();
    let post_login: Vec<u8> = SERVER_SCRIPT[2..].concat();

    let mut events = Vec::new();
    events.extend(session.receive(&pre_login).unwrap());
    events.extend(session.receive(&post_login).unwrap());

    assert_eq!(events, vec![SessionEvent::Established]);
    assert_eq!(
        String::from_utf8(session.take_output()).unwrap(),
        expected_output()
    );
}

#[test]
fn established_session_raises_message_events() {
    let mut session = start_session();
    for step in SERVER_SCRIPT {
        session.receive(step).unwrap();
    }
    session.take_output();

    let events = session
        .receive(b"<message from='f'><body>b</body></message>")
        .unwrap();
    assert_eq!(
        events,
        vec![SessionEvent::MessageReceived {
            from: "f".into(),
            body: "b".into(),
        }]
    );
}
