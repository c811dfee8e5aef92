//! End-to-end HTTP conformance: the writer on one side must produce bytes
//! the framer on the other side parses back into the matching events.

use nitrus_core::http::{ClientConnection, ClientEvent, ServerConnection, ServerEvent};

fn headers_of(events: &[ServerEvent]) -> Vec<(String, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            ServerEvent::HeaderReceived { key, value } => Some((key.clone(), value.clone())),
            _ => None,
        })
        .collect()
}

fn body_of(events: &[ServerEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            ServerEvent::ContentReceived(chunk) => Some(chunk.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

#[test]
fn client_request_bytes_parse_on_the_server_side() {
    let mut client = ClientConnection::new();
    client.connected().unwrap();
    client.begin("POST", "/submit", "HTTP/1.1").unwrap();
    client.send_header("Host", "example.com").unwrap();
    client.send_header("X-Token", "abc123").unwrap();
    client.send(b"first ").unwrap();
    client.send(b"second").unwrap();
    client.end().unwrap();
    let wire = client.take_output();

    let mut server = ServerConnection::new();
    let events = server.receive(&wire).unwrap();

    assert_eq!(
        events[0],
        ServerEvent::RequestStarted {
            method: "POST".into(),
            path: "/submit".into(),
            protocol: "HTTP/1.1".into(),
        }
    );
    assert_eq!(
        headers_of(&events),
        vec![
            ("Host".to_string(), "example.com".to_string()),
            ("X-Token".to_string(), "abc123".to_string()),
            ("Transfer-Encoding".to_string(), "chunked".to_string()),
        ]
    );
    assert_eq!(body_of(&events), b"first second");
    assert!(events
        .iter()
        .any(|event| matches!(event, ServerEvent::RequestEnded)));
}

#[test]
fn server_response_bytes_parse_on_the_client_side() {
    let mut server = ServerConnection::new();
    server.receive(b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
    server.begin("HTTP/1.1", 200, "OK").unwrap();
    server.send_header("Server", "nitrus").unwrap();
    server.send(b"hello").unwrap();
    server.end().unwrap();
    let wire = server.take_output();

    let mut client = ClientConnection::new();
    client.connected().unwrap();
    client.begin("GET", "/x", "HTTP/1.1").unwrap();
    client.send(b"").unwrap();
    client.end().unwrap();
    client.take_output();

    let events = client.receive(&wire).unwrap();
    assert!(matches!(
        events[0],
        ClientEvent::ResponseStarted { code: 200, .. }
    ));
    let body: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::ContentReceived(chunk) => Some(chunk.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(body, b"hello");
    assert!(events
        .iter()
        .any(|event| matches!(event, ClientEvent::ResponseEnded)));
}

#[test]
fn close_delimited_response_round_trips() {
    let mut server = ServerConnection::new();
    server
        .receive(b"GET /x HTTP/1.1\r\nConnection: close\r\n\r\n")
        .unwrap();
    server.begin("HTTP/1.1", 200, "OK").unwrap();
    server.send_header("Server", "nitrus").unwrap();
    server.send(b"stream until close").unwrap();
    server.end().unwrap();
    assert!(server.close_requested());
    let wire = server.take_output();

    let mut client = ClientConnection::new();
    client.connected().unwrap();
    client.begin("GET", "/x", "HTTP/1.1").unwrap();
    client.send(b"").unwrap();
    client.end().unwrap();
    client.take_output();

    let events = client.receive(&wire).unwrap();
    let body: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::ContentReceived(chunk) => Some(chunk.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(body, b"stream until close");
    assert!(!events
        .iter()
        .any(|event| matches!(event, ClientEvent::ResponseEnded)));

    let last = client.disconnected().unwrap();
    assert!(last
        .iter()
        .any(|event| matches!(event, ClientEvent::ResponseEnded)));
}

#[test]
fn two_requests_round_trip_over_one_keep_alive_connection() {
    let mut server = ServerConnection::new();

    for path in ["/first", "/second"] {
        let request = format!("GET {path} HTTP/1.1\r\nHost: h\r\n\r\n");
        let events = server.receive(request.as_bytes()).unwrap();
        assert!(events.iter().any(|event| matches!(
            event,
            ServerEvent::RequestStarted { path: p, .. } if p == path
        )));

        server.begin("HTTP/1.1", 200, "OK").unwrap();
        server.send_header("Server", "nitrus").unwrap();
        server.send(path.as_bytes()).unwrap();
        server.end().unwrap();
        assert!(!server.close_requested());
        assert!(!server.take_output().is_empty());
    }
}

#[test]
fn empty_send_emits_no_chunk() {
    let mut server = ServerConnection::new();
    server.receive(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    server.begin("HTTP/1.1", 204, "No Content").unwrap();
    server.send_header("Server", "nitrus").unwrap();
    server.send(b"").unwrap();
    server.end().unwrap();

    assert_eq!(
        server.take_output(),
        b"HTTP/1.1 204 No Content\r\nServer: nitrus\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n"
    );
}
