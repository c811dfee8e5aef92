//! A small JSON web server on the cooperative runtime.
//!
//! Answers `GET /entities` with a canned collection and everything else
//! with 404, over chunked keep-alive responses (or close-delimited ones
//! when the client asks for `Connection: close`).
//!
//! Run with: `cargo run --example webserver -- --port 9091`

use std::collections::VecDeque;

use nitrus_core::http::{ServerConnection, ServerEvent};
use nitrus_runtime::net::{Listener, Read, Stream, POLL_INTERVAL};
use nitrus_runtime::params::Params;
use nitrus_runtime::Scheduler;

fn main() -> nitrus_runtime::Result<()> {
    tracing_subscriber::fmt::init();

    let params = Params::from_env();
    let port: u16 = params.get_parsed("--port", 9091);
    let listener = Listener::bind(("127.0.0.1", port))?;
    tracing::info!(address = %listener.local_addr()?, "listening");

    let mut scheduler = Scheduler::new();
    scheduler.invoke(move |scheduler| accept_tick(scheduler, listener));
    scheduler.run();
    Ok(())
}

fn accept_tick(scheduler: &mut Scheduler, listener: Listener) {
    loop {
        match listener.poll_accept() {
            Ok(Some(stream)) => {
                let connection = ServerConnection::new();
                scheduler
                    .invoke(move |scheduler| pump(scheduler, stream, connection, String::new()));
            }
            Ok(None) => break,
            Err(err) => {
                tracing::error!(%err, "accept failed");
                return;
            }
        }
    }
    scheduler.set_timeout(POLL_INTERVAL, move |scheduler| accept_tick(scheduler, listener));
}

fn pump(scheduler: &mut Scheduler, mut stream: Stream, mut connection: ServerConnection, mut path: String) {
    let mut buffer = [0u8; 4096];
    loop {
        match stream.poll_read(&mut buffer) {
            Ok(Read::Data(count)) => {
                let events = match connection.receive(&buffer[..count]) {
                    Ok(events) => events,
                    Err(err) => {
                        tracing::error!(%err, "dropping connection");
                        stream.disconnect();
                        return;
                    }
                };
                if let Err(err) = respond(&mut connection, events, &mut path) {
                    tracing::error!(%err, "dropping connection");
                    stream.disconnect();
                    return;
                }
            }
            Ok(Read::WouldBlock) => break,
            Ok(Read::Closed) | Err(_) => {
                let _ = connection.disconnected();
                return;
            }
        }
    }

    let output = connection.take_output();
    if !output.is_empty() {
        if let Err(err) = stream.send(&output) {
            tracing::error!(%err, "send failed");
            return;
        }
    }
    if connection.close_requested() {
        stream.disconnect();
        let _ = connection.disconnected();
        return;
    }

    scheduler.set_timeout(POLL_INTERVAL, move |scheduler| {
        pump(scheduler, stream, connection, path)
    });
}

fn respond(
    connection: &mut ServerConnection,
    events: Vec<ServerEvent>,
    path: &mut String,
) -> nitrus_core::Result<()> {
    let mut queue: VecDeque<ServerEvent> = events.into();
    while let Some(event) = queue.pop_front() {
        match event {
            ServerEvent::RequestStarted {
                method,
                path: requested,
                ..
            } => {
                tracing::info!(%method, path = %requested, "request");
                *path = requested;
            }
            ServerEvent::RequestEnded => {
                let (code, phrase, body): (u16, &str, &str) = if path == "/entities" {
                    (200, "OK", "[{ \"id\": 100 }, { \"id\": 101 }]")
                } else {
                    (404, "Not Found", "{ \"error\": \"not found\" }")
                };
                connection.begin("HTTP/1.1", code, phrase)?;
                connection.send_header("Server", "nitrus")?;
                connection.send_header("Content-Type", "application/json")?;
                connection.send(body.as_bytes())?;
                // A pipelined request may complete here; keep draining.
                queue.extend(connection.end()?);
            }
            _ => {}
        }
    }
    Ok(())
}
