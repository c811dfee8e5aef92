//! Chunk-invariance conformance.
//!
//! For any partition of an input byte stream into chunks, feeding the
//! chunks in order must yield the same events as feeding the stream whole.
//! Body content may arrive in differently sized slices, so content runs are
//! coalesced before comparison.

use nitrus_core::http::{ClientConnection, ClientEvent, ServerConnection, ServerEvent};
use nitrus_core::xml::{DocumentParser, Parser, XmlEvent};

/// Every split of `input` into two chunks, plus whole and byte-at-a-time.
fn partitions(input: &[u8]) -> Vec<Vec<Vec<u8>>> {
    let mut all = vec![vec![input.to_vec()]];
    for split in 1..input.len() {
        all.push(vec![input[..split].to_vec(), input[split..].to_vec()]);
    }
    all.push(input.iter().map(|byte| vec![*byte]).collect());
    all
}

#[test]
fn xml_tokenizer_events_are_chunk_invariant() {
    let input = b"<?xml version='1.0'?><a x='1' y=\"2\"><b>hi &amp; bye</b><c/></a>";

    let mut reference = Parser::new();
    let expected = reference.feed(input).unwrap();
    assert!(!expected.is_empty());

    for partition in partitions(input) {
        let mut parser = Parser::new();
        let mut events: Vec<XmlEvent> = Vec::new();
        for chunk in partition {
            events.extend(parser.feed(&chunk).unwrap());
        }
        assert_eq!(events, expected);
    }
}

#[test]
fn xml_documents_are_chunk_invariant() {
    let input = b"<iq type='set' id='9'><query xmlns='jabber:iq:roster'><item jid='a@b' subscription='from'/></query></iq><presence/>";

    let mut reference = DocumentParser::new();
    let expected = reference.feed(input).unwrap();
    assert_eq!(expected.len(), 2);

    for partition in partitions(input) {
        let mut parser = DocumentParser::new();
        let mut documents = Vec::new();
        for chunk in partition {
            documents.extend(parser.feed(&chunk).unwrap());
        }
        assert_eq!(documents, expected);
    }
}

#[derive(Debug, PartialEq)]
enum Step {
    Started(String),
    Header(String, String),
    Content(Vec<u8>),
    Ended,
}

fn coalesce_server(events: impl IntoIterator<Item = ServerEvent>) -> Vec<Step> {
    let mut steps: Vec<Step> = Vec::new();
    for event in events {
        match event {
            ServerEvent::RequestStarted { method, path, .. } => {
                steps.push(Step::Started(format!("{method} {path}")))
            }
            ServerEvent::HeaderReceived { key, value } => steps.push(Step::Header(key, value)),
            ServerEvent::ContentReceived(chunk) => match steps.last_mut() {
                Some(Step::Content(run)) => run.extend_from_slice(&chunk),
                _ => steps.push(Step::Content(chunk)),
            },
            ServerEvent::RequestEnded => steps.push(Step::Ended),
            ServerEvent::ClientDisconnected => {}
        }
    }
    steps
}

fn coalesce_client(events: impl IntoIterator<Item = ClientEvent>) -> Vec<Step> {
    let mut steps: Vec<Step> = Vec::new();
    for event in events {
        match event {
            ClientEvent::ResponseStarted { code, phrase, .. } => {
                steps.push(Step::Started(format!("{code} {phrase}")))
            }
            ClientEvent::HeaderReceived { key, value } => steps.push(Step::Header(key, value)),
            ClientEvent::ContentReceived(chunk) => match steps.last_mut() {
                Some(Step::Content(run)) => run.extend_from_slice(&chunk),
                _ => steps.push(Step::Content(chunk)),
            },
            ClientEvent::ResponseEnded => steps.push(Step::Ended),
        }
    }
    steps
}

#[test]
fn http_requests_are_chunk_invariant() {
    let inputs: [&[u8]; 3] = [
        b"GET /x HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\n\r\nhello",
        b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n3\r\nabc\r\n0\r\n\r\n",
        b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n",
    ];

    for input in inputs {
        let mut reference = ServerConnection::new();
        let expected = coalesce_server(reference.receive(input).unwrap());

        for partition in partitions(input) {
            let mut connection = ServerConnection::new();
            let mut events = Vec::new();
            for chunk in partition {
                events.extend(connection.receive(&chunk).unwrap());
            }
            assert_eq!(coalesce_server(events), expected);
        }
    }
}

#[test]
fn http_responses_are_chunk_invariant() {
    let inputs: [&[u8]; 3] = [
        b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello",
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n",
        b"HTTP/1.1 204 No Content\r\nX: y\r\n\r\n",
    ];

    let request_sent = || {
        let mut connection = ClientConnection::new();
        connection.connected().unwrap();
        connection.begin("GET", "/", "HTTP/1.1").unwrap();
        connection.send(b"").unwrap();
        connection.end().unwrap();
        connection.take_output();
        connection
    };

    for input in inputs {
        let mut reference = request_sent();
        let expected = coalesce_client(reference.receive(input).unwrap());

        for partition in partitions(input) {
            let mut connection = request_sent();
            let mut events = Vec::new();
            for chunk in partition {
                events.extend(connection.receive(&chunk).unwrap());
            }
            assert_eq!(coalesce_client(events), expected);
        }
    }
}
