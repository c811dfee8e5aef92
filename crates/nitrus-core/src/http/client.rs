//! Client-side HTTP/1.1 connection: request writer plus response framer.
//!
//! The response body is delimited one of four ways: chunked, length,
//! close-delimited (`Connection: close` with no length or encoding), or —
//! when a keep-alive response advertises neither — zero-length, matching
//! the original wire behavior. Requests always use chunked bodies.

use crate::http::{classify_header, find_crlf, parse_hex, split_header_line, HeaderKind};
use crate::machine::StateMachine;
use crate::{Error, Result};

/// An event produced by the response framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The status line was read.
    ResponseStarted {
        /// Protocol, e.g. `HTTP/1.1`.
        protocol: String,
        /// Status code.
        code: u16,
        /// Reason phrase.
        phrase: String,
    },
    /// One header line was read. The key keeps its original case.
    HeaderReceived {
        /// Header key.
        key: String,
        /// Header value.
        value: String,
    },
    /// A slice of the response body arrived.
    ContentReceived(Vec<u8>),
    /// The response is complete.
    ResponseEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum State {
    Online,
    WaitForConnection,
    Connected,
    RequestStatus,
    RequestHeader,
    RequestLastHeader,
    RequestBody,
    ResponseStatus,
    ResponseHeader,
    ResponseHeaderChunked,
    ResponseHeaderLength,
    ResponseHeaderClose,
    ResponseHeaderLengthClose,
    ResponseHeaderChunkedClose,
    Content,
    ContentClose,
    ContentUntilClosed,
    ChunkSize,
    ChunkSizeClose,
    Chunk,
    ChunkClose,
    EndOfResponse,
    EndOfResponseUntilClosed,
    WaitForDisconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Connected,
    Disconnect,
    RequestBegin,
    RequestHeader,
    RequestChunk,
    RequestEnd,
    Continue,
    Break,
    Chunked,
    Length,
    Close,
    EndOfChunks,
}

#[derive(Default)]
struct Feed {
    buffer: Vec<u8>,
    remaining: usize,
    out: Vec<u8>,
    events: Vec<ClientEvent>,
}

impl Feed {
    fn wait_for_connection(&mut self) -> Result<Option<Trigger>> {
        self.buffer.clear();
        Ok(None)
    }

    fn status_line(&mut self) -> Result<Option<Trigger>> {
        let Some(end_of_protocol) = self.buffer.iter().position(|&b| b == b' ') else {
            return Ok(None);
        };
        let Some(end_of_code) = self.buffer[end_of_protocol + 1..]
            .iter()
            .position(|&b| b == b' ')
            .map(|p| end_of_protocol + 1 + p)
        else {
            return Ok(None);
        };
        let Some(end_of_phrase) =
            find_crlf(&self.buffer[end_of_code + 1..]).map(|p| end_of_code + 1 + p)
        else {
            return Ok(None);
        };

        let protocol = String::from_utf8_lossy(&self.buffer[..end_of_protocol]).to_string();
        let code_text =
            String::from_utf8_lossy(&self.buffer[end_of_protocol + 1..end_of_code]).to_string();
        let code = code_text
            .parse()
            .map_err(|_| Error::Malformed(format!("bad status code {code_text:?}")))?;
        let phrase =
            String::from_utf8_lossy(&self.buffer[end_of_code + 1..end_of_phrase]).to_string();
        self.buffer.drain(..end_of_phrase + 2);

        self.remaining = 0;
        self.events.push(ClientEvent::ResponseStarted {
            protocol,
            code,
            phrase,
        });
        Ok(Some(Trigger::Break))
    }

    fn header_line(&mut self) -> Result<Option<Trigger>> {
        let Some(end_of_line) = find_crlf(&self.buffer) else {
            return Ok(None);
        };
        if end_of_line == 0 {
            self.buffer.drain(..2);
            return Ok(Some(Trigger::Break));
        }

        let (key, value) = split_header_line(&self.buffer[..end_of_line])?;
        self.buffer.drain(..end_of_line + 2);

        let kind = classify_header(&key, &value)?;
        self.events.push(ClientEvent::HeaderReceived { key, value });
        Ok(Some(match kind {
            HeaderKind::Chunked => Trigger::Chunked,
            HeaderKind::Length(length) => {
                self.remaining = length;
                Trigger::Length
            }
            HeaderKind::Close => Trigger::Close,
            HeaderKind::Other => Trigger::Continue,
        }))
    }

    fn content(&mut self) -> Result<Option<Trigger>> {
        if self.remaining == 0 {
            return Ok(Some(Trigger::Break));
        }
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let count = self.remaining.min(self.buffer.len());
        let chunk: Vec<u8> = self.buffer.drain(..count).collect();
        self.remaining -= count;
        self.events.push(ClientEvent::ContentReceived(chunk));
        Ok(Some(Trigger::Continue))
    }

    fn content_until_closed(&mut self) -> Result<Option<Trigger>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let chunk = std::mem::take(&mut self.buffer);
        self.events.push(ClientEvent::ContentReceived(chunk));
        Ok(Some(Trigger::Continue))
    }

    fn chunk_size(&mut self) -> Result<Option<Trigger>> {
        let Some(end_of_size) = find_crlf(&self.buffer) else {
            return Ok(None);
        };
        let size = parse_hex(&self.buffer[..end_of_size])?;
        if size == 0 {
            if self.buffer.len() < end_of_size + 4 {
                return Ok(None);
            }
            self.buffer.drain(..end_of_size + 4);
            return Ok(Some(Trigger::EndOfChunks));
        }
        self.buffer.drain(..end_of_size + 2);
        self.remaining = size;
        Ok(Some(Trigger::Break))
    }

    fn chunk(&mut self) -> Result<Option<Trigger>> {
        if self.remaining == 0 {
            if self.buffer.starts_with(b"\r\n") {
                self.buffer.drain(..2);
                return Ok(Some(Trigger::Break));
            }
            return Ok(None);
        }
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let count = self.remaining.min(self.buffer.len());
        let chunk: Vec<u8> = self.buffer.drain(..count).collect();
        self.remaining -= count;
        self.events.push(ClientEvent::ContentReceived(chunk));
        Ok(Some(Trigger::Continue))
    }

    fn end_of_response(&mut self) -> Result<Option<Trigger>> {
        self.events.push(ClientEvent::ResponseEnded);
        Ok(None)
    }

    fn end_of_response_until_closed(&mut self) -> Result<Option<Trigger>> {
        self.events.push(ClientEvent::ResponseEnded);
        Ok(Some(Trigger::Break))
    }

    fn request_last_header(&mut self) -> Result<Option<Trigger>> {
        self.out.extend_from_slice(b"Transfer-Encoding: chunked\r\n\r\n");
        Ok(Some(Trigger::Break))
    }
}

/// One outbound HTTP connection.
pub struct ClientConnection {
    machine: StateMachine<State, Trigger, Feed>,
    feed: Feed,
}

impl Default for ClientConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConnection {
    /// Creates a connection waiting for its transport to come up.
    pub fn new() -> Self {
        let mut machine = StateMachine::new(State::WaitForConnection);

        machine
            .configure(State::Online)
            .permit(Trigger::Disconnect, State::WaitForConnection);

        machine
            .configure(State::WaitForConnection)
            .on_entry(Feed::wait_for_connection)
            .permit(Trigger::Continue, State::WaitForConnection)
            .permit(Trigger::Break, State::WaitForConnection)
            .permit(Trigger::Connected, State::Connected);

        machine
            .configure(State::Connected)
            .substate_of(State::Online)
            .permit(Trigger::RequestBegin, State::RequestStatus);

        machine
            .configure(State::RequestStatus)
            .substate_of(State::Online)
            .permit(Trigger::RequestHeader, State::RequestHeader)
            .permit(Trigger::RequestChunk, State::RequestLastHeader);

        machine
            .configure(State::RequestHeader)
            .substate_of(State::Online)
            .permit(Trigger::RequestHeader, State::RequestHeader)
            .permit(Trigger::RequestChunk, State::RequestLastHeader);

        machine
            .configure(State::RequestLastHeader)
            .substate_of(State::Online)
            .on_entry(Feed::request_last_header)
            .permit(Trigger::Break, State::RequestBody);

        machine
            .configure(State::RequestBody)
            .substate_of(State::Online)
            .permit(Trigger::RequestChunk, State::RequestBody)
            .permit(Trigger::RequestEnd, State::ResponseStatus);

        machine
            .configure(State::ResponseStatus)
            .substate_of(State::Online)
            .on_entry(Feed::status_line)
            .permit(Trigger::Continue, State::ResponseStatus)
            .permit(Trigger::Break, State::ResponseHeader);

        machine
            .configure(State::ResponseHeader)
            .substate_of(State::Online)
            .on_entry(Feed::header_line)
            .permit(Trigger::Continue, State::ResponseHeader)
            .permit(Trigger::Chunked, State::ResponseHeaderChunked)
            .permit(Trigger::Length, State::ResponseHeaderLength)
            .permit(Trigger::Close, State::ResponseHeaderClose)
            .permit(Trigger::Break, State::Content);

        machine
            .configure(State::ResponseHeaderChunked)
            .substate_of(State::Online)
            .on_entry(Feed::header_line)
            .permit(Trigger::Continue, State::ResponseHeaderChunked)
            .permit(Trigger::Close, State::ResponseHeaderChunkedClose)
            .permit(Trigger::Break, State::ChunkSize);

        machine
            .configure(State::ResponseHeaderLength)
            .substate_of(State::Online)
            .on_entry(Feed::header_line)
            .permit(Trigger::Continue, State::ResponseHeaderLength)
            .permit(Trigger::Close, State::ResponseHeaderLengthClose)
            .permit(Trigger::Break, State::Content);

        machine
            .configure(State::ResponseHeaderClose)
            .substate_of(State::Online)
            .on_entry(Feed::header_line)
            .permit(Trigger::Continue, State::ResponseHeaderClose)
            .permit(Trigger::Length, State::ResponseHeaderLengthClose)
            .permit(Trigger::Chunked, State::ResponseHeaderChunkedClose)
            .permit(Trigger::Break, State::ContentUntilClosed);

        machine
            .configure(State::ResponseHeaderLengthClose)
            .substate_of(State::Online)
            .on_entry(Feed::header_line)
            .permit(Trigger::Continue, State::ResponseHeaderLengthClose)
            .permit(Trigger::Break, State::ContentClose);

        machine
            .configure(State::ResponseHeaderChunkedClose)
            .substate_of(State::Online)
            .on_entry(Feed::header_line)
            .permit(Trigger::Continue, State::ResponseHeaderChunkedClose)
            .permit(Trigger::Break, State::ChunkSizeClose);

        machine
            .configure(State::Content)
            .substate_of(State::Online)
            .on_entry(Feed::content)
            .permit(Trigger::Continue, State::Content)
            .permit(Trigger::Break, State::EndOfResponse);

        machine
            .configure(State::ContentClose)
            .substate_of(State::Online)
            .on_entry(Feed::content)
            .permit(Trigger::Continue, State::ContentClose)
            .permit(Trigger::Break, State::EndOfResponseUntilClosed);

        machine
            .configure(State::ContentUntilClosed)
            .substate_of(State::Online)
            .on_entry(Feed::content_until_closed)
            .permit(Trigger::Continue, State::ContentUntilClosed)
            .permit(Trigger::Disconnect, State::EndOfResponseUntilClosed);

        machine
            .configure(State::ChunkSize)
            .substate_of(State::Online)
            .on_entry(Feed::chunk_size)
            .permit(Trigger::Continue, State::ChunkSize)
            .permit(Trigger::EndOfChunks, State::EndOfResponse)
            .permit(Trigger::Break, State::Chunk);

        machine
            .configure(State::ChunkSizeClose)
            .substate_of(State::Online)
            .on_entry(Feed::chunk_size)
            .permit(Trigger::Continue, State::ChunkSizeClose)
            .permit(Trigger::EndOfChunks, State::EndOfResponseUntilClosed)
            .permit(Trigger::Break, State::ChunkClose);

        machine
            .configure(State::Chunk)
            .substate_of(State::Online)
            .on_entry(Feed::chunk)
            .permit(Trigger::Continue, State::Chunk)
            .permit(Trigger::Break, State::ChunkSize);

        machine
            .configure(State::ChunkClose)
            .substate_of(State::Online)
            .on_entry(Feed::chunk)
            .permit(Trigger::Continue, State::ChunkClose)
            .permit(Trigger::Break, State::ChunkSizeClose);

        machine
            .configure(State::EndOfResponse)
            .substate_of(State::Online)
            .on_entry(Feed::end_of_response)
            .permit(Trigger::RequestBegin, State::RequestStatus);

        machine
            .configure(State::EndOfResponseUntilClosed)
            .substate_of(State::Online)
            .on_entry(Feed::end_of_response_until_closed)
            .permit(Trigger::Continue, State::EndOfResponseUntilClosed)
            .permit(Trigger::Break, State::WaitForDisconnect);

        machine
            .configure(State::WaitForDisconnect)
            .substate_of(State::Online);

        Self {
            machine,
            feed: Feed::default(),
        }
    }

    /// Reports that the transport connected.
    pub fn connected(&mut self) -> Result<()> {
        self.machine.fire(Trigger::Connected, &mut self.feed)
    }

    /// Reports a transport disconnect. A close-delimited response in flight
    /// is completed first; the machine always comes to rest waiting for the
    /// next connection.
    pub fn disconnected(&mut self) -> Result<Vec<ClientEvent>> {
        if self.machine.state() != State::WaitForConnection {
            self.machine.fire(Trigger::Disconnect, &mut self.feed)?;
            if self.machine.state() == State::WaitForDisconnect {
                self.machine.fire(Trigger::Disconnect, &mut self.feed)?;
            }
        }
        Ok(std::mem::take(&mut self.feed.events))
    }

    /// Appends received bytes and returns the events they completed.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<Vec<ClientEvent>> {
        self.feed.buffer.extend_from_slice(bytes);
        if self.machine.can_fire(Trigger::Continue, &self.feed) {
            self.machine.fire(Trigger::Continue, &mut self.feed)?;
        }
        Ok(std::mem::take(&mut self.feed.events))
    }

    /// Starts a request with its action line.
    pub fn begin(&mut self, method: &str, path: &str, protocol: &str) -> Result<()> {
        self.machine.fire(Trigger::RequestBegin, &mut self.feed)?;
        self.feed
            .out
            .extend_from_slice(format!("{method} {path} {protocol}\r\n").as_bytes());
        Ok(())
    }

    /// Sends one request header line.
    pub fn send_header(&mut self, key: &str, value: &str) -> Result<()> {
        self.machine.fire(Trigger::RequestHeader, &mut self.feed)?;
        self.feed
            .out
            .extend_from_slice(format!("{key}: {value}\r\n").as_bytes());
        Ok(())
    }

    /// Sends partial request content. The first call closes the header
    /// section with `Transfer-Encoding: chunked`; data is always
    /// chunk-framed.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        self.machine.fire(Trigger::RequestChunk, &mut self.feed)?;
        if !data.is_empty() {
            self.feed
                .out
                .extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
            self.feed.out.extend_from_slice(data);
            self.feed.out.extend_from_slice(b"\r\n");
        }
        Ok(())
    }

    /// Ends the request with the terminating zero chunk. Response bytes
    /// already buffered are parsed immediately and their events returned.
    pub fn end(&mut self) -> Result<Vec<ClientEvent>> {
        self.machine.fire(Trigger::RequestEnd, &mut self.feed)?;
        self.feed.out.extend_from_slice(b"0\r\n\r\n");
        Ok(std::mem::take(&mut self.feed.events))
    }

    /// Drains the bytes to hand to the transport.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.feed.out)
    }
}
