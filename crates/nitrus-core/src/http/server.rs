//! Server-side HTTP/1.1 connection: request framer plus response writer.
//!
//! The read path has two parallel state families distinguished by whether
//! `Connection: close` has been observed; the close family writes a
//! close-delimited response where the plain family writes a chunked one.
//! Every state shares a single disconnect edge through a common parent.

use crate::http::{classify_header, find_crlf, parse_hex, split_header_line, HeaderKind};
use crate::machine::StateMachine;
use crate::Result;

/// An event produced by the request framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The request line was read.
    RequestStarted {
        /// Request method, e.g. `GET`.
        method: String,
        /// Request path.
        path: String,
        /// Protocol, e.g. `HTTP/1.1`.
        protocol: String,
    },
    /// One header line was read. The key keeps its original case.
    HeaderReceived {
        /// Header key.
        key: String,
        /// Header value.
        value: String,
    },
    /// A slice of the request body arrived.
    ContentReceived(Vec<u8>),
    /// The request body is complete; the writer may respond.
    RequestEnded,
    /// The peer disconnected.
    ClientDisconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum State {
    Open,
    ActionLine,
    HeaderLine,
    HeaderLineClose,
    HeaderLineLength,
    HeaderLineChunked,
    HeaderLineLengthClose,
    HeaderLineChunkedClose,
    Content,
    ContentClose,
    ChunkSize,
    ChunkSizeClose,
    Chunk,
    ChunkClose,
    EndOfRequest,
    EndOfRequestClose,
    ResponseStatus,
    ResponseStatusClose,
    ResponseHeader,
    ResponseHeaderClose,
    ResponseLastHeader,
    ResponseLastHeaderClose,
    ResponseBody,
    ResponseBodyClose,
    ConnectionClose,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Continue,
    Break,
    Chunked,
    Length,
    Close,
    EndOfChunks,
    ResponseBegin,
    ResponseHeader,
    ResponseChunk,
    ResponseEnd,
    Disconnected,
}

#[derive(Default)]
struct Feed {
    buffer: Vec<u8>,
    remaining: usize,
    out: Vec<u8>,
    events: Vec<ServerEvent>,
    close_requested: bool,
}

impl Feed {
    fn action_line(&mut self) -> Result<Option<Trigger>> {
        let Some(end_of_method) = self.buffer.iter().position(|&b| b == b' ') else {
            return Ok(None);
        };
        let Some(end_of_path) = self.buffer[end_of_method + 1..]
            .iter()
            .position(|&b| b == b' ')
            .map(|p| end_of_method + 1 + p)
        else {
            return Ok(None);
        };
        let Some(end_of_protocol) =
            find_crlf(&self.buffer[end_of_path + 1..]).map(|p| end_of_path + 1 + p)
        else {
            return Ok(None);
        };

        let method = String::from_utf8_lossy(&self.buffer[..end_of_method]).to_string();
        let path =
            String::from_utf8_lossy(&self.buffer[end_of_method + 1..end_of_path]).to_string();
        let protocol =
            String::from_utf8_lossy(&self.buffer[end_of_path + 1..end_of_protocol]).to_string();
        self.buffer.drain(..end_of_protocol + 2);

        self.remaining = 0;
        self.events.push(ServerEvent::RequestStarted {
            method,
            path,
            protocol,
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
        self.events.push(ServerEvent::HeaderReceived { key, value });
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
        self.events.push(ServerEvent::ContentReceived(chunk));
        Ok(Some(Trigger::Continue))
    }

    fn chunk_size(&mut self) -> Result<Option<Trigger>> {
        let Some(end_of_size) = find_crlf(&self.buffer) else {
            return Ok(None);
        };
        let size = parse_hex(&self.buffer[..end_of_size])?;
        if size == 0 {
            // The zero chunk and its trailing CRLF pair are consumed
            // together, so a chunk boundary between them cannot desync the
            // next request.
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
        self.events.push(ServerEvent::ContentReceived(chunk));
        Ok(Some(Trigger::Continue))
    }

    fn end_of_request(&mut self) -> Result<Option<Trigger>> {
        self.events.push(ServerEvent::RequestEnded);
        Ok(None)
    }

    fn response_last_header(&mut self) -> Result<Option<Trigger>> {
        self.out.extend_from_slice(b"Transfer-Encoding: chunked\r\n\r\n");
        Ok(Some(Trigger::Break))
    }

    fn response_last_header_close(&mut self) -> Result<Option<Trigger>> {
        self.out.extend_from_slice(b"Connection: close\r\n\r\n");
        Ok(Some(Trigger::Break))
    }

    fn connection_close(&mut self) -> Result<Option<Trigger>> {
        self.close_requested = true;
        Ok(None)
    }

    fn closed(&mut self) -> Result<Option<Trigger>> {
        self.events.push(ServerEvent::ClientDisconnected);
        Ok(None)
    }
}

/// One accepted HTTP connection.
pub struct ServerConnection {
    machine: StateMachine<State, Trigger, Feed>,
    feed: Feed,
}

impl Default for ServerConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConnection {
    /// Creates a connection waiting for the first request line.
    pub fn new() -> Self {
        let mut machine = StateMachine::new(State::ActionLine);

        machine
            .configure(State::Open)
            .permit(Trigger::Disconnected, State::Closed);

        machine
            .configure(State::ActionLine)
            .substate_of(State::Open)
            .on_entry(Feed::action_line)
            .permit(Trigger::Continue, State::ActionLine)
            .permit(Trigger::Break, State::HeaderLine);

        machine
            .configure(State::HeaderLine)
            .substate_of(State::Open)
            .on_entry(Feed::header_line)
            .permit(Trigger::Continue, State::HeaderLine)
            .permit(Trigger::Chunked, State::HeaderLineChunked)
            .permit(Trigger::Length, State::HeaderLineLength)
            .permit(Trigger::Close, State::HeaderLineClose)
            .permit(Trigger::Break, State::Content);

        machine
            .configure(State::HeaderLineClose)
            .substate_of(State::Open)
            .on_entry(Feed::header_line)
            .permit(Trigger::Continue, State::HeaderLineClose)
            .permit(Trigger::Chunked, State::HeaderLineChunkedClose)
            .permit(Trigger::Length, State::HeaderLineLengthClose)
            .permit(Trigger::Break, State::ContentClose);

        machine
            .configure(State::HeaderLineLength)
            .substate_of(State::Open)
            .on_entry(Feed::header_line)
            .permit(Trigger::Continue, State::HeaderLineLength)
            .permit(Trigger::Close, State::HeaderLineLengthClose)
            .permit(Trigger::Break, State::Content);

        machine
            .configure(State::HeaderLineChunked)
            .substate_of(State::Open)
            .on_entry(Feed::header_line)
            .permit(Trigger::Continue, State::HeaderLineChunked)
            .permit(Trigger::Close, State::HeaderLineChunkedClose)
            .permit(Trigger::Break, State::ChunkSize);

        machine
            .configure(State::HeaderLineLengthClose)
            .substate_of(State::Open)
            .on_entry(Feed::header_line)
            .permit(Trigger::Continue, State::HeaderLineLengthClose)
            .permit(Trigger::Break, State::ContentClose);

        machine
            .configure(State::HeaderLineChunkedClose)
            .substate_of(State::Open)
            .on_entry(Feed::header_line)
            .permit(Trigger::Continue, State::HeaderLineChunkedClose)
            .permit(Trigger::Break, State::ChunkSizeClose);

        machine
            .configure(State::Content)
            .substate_of(State::Open)
            .on_entry(Feed::content)
            .permit(Trigger::Continue, State::Content)
            .permit(Trigger::Break, State::EndOfRequest);

        machine
            .configure(State::ContentClose)
            .substate_of(State::Open)
            .on_entry(Feed::content)
            .permit(Trigger::Continue, State::ContentClose)
            .permit(Trigger::Break, State::EndOfRequestClose);

        machine
            .configure(State::ChunkSize)
            .substate_of(State::Open)
            .on_entry(Feed::chunk_size)
            .permit(Trigger::Continue, State::ChunkSize)
            .permit(Trigger::EndOfChunks, State::EndOfRequest)
            .permit(Trigger::Break, State::Chunk);

        machine
            .configure(State::ChunkSizeClose)
            .substate_of(State::Open)
            .on_entry(Feed::chunk_size)
            .permit(Trigger::Continue, State::ChunkSizeClose)
            .permit(Trigger::EndOfChunks, State::EndOfRequestClose)
            .permit(Trigger::Break, State::ChunkClose);

        machine
            .configure(State::Chunk)
            .substate_of(State::Open)
            .on_entry(Feed::chunk)
            .permit(Trigger::Continue, State::Chunk)
            .permit(Trigger::Break, State::ChunkSize);

        machine
            .configure(State::ChunkClose)
            .substate_of(State::Open)
            .on_entry(Feed::chunk)
            .permit(Trigger::Continue, State::ChunkClose)
            .permit(Trigger::Break, State::ChunkSizeClose);

        machine
            .configure(State::EndOfRequest)
            .substate_of(State::Open)
            .on_entry(Feed::end_of_request)
            .permit(Trigger::ResponseBegin, State::ResponseStatus);

        machine
            .configure(State::EndOfRequestClose)
            .substate_of(State::Open)
            .on_entry(Feed::end_of_request)
            .permit(Trigger::ResponseBegin, State::ResponseStatusClose);

        machine
            .configure(State::ResponseStatus)
            .substate_of(State::Open)
            .permit(Trigger::ResponseHeader, State::ResponseHeader);

        machine
            .configure(State::ResponseStatusClose)
            .substate_of(State::Open)
            .permit(Trigger::ResponseHeader, State::ResponseHeaderClose);

        machine
            .configure(State::ResponseHeader)
            .substate_of(State::Open)
            .permit(Trigger::ResponseHeader, State::ResponseHeader)
            .permit(Trigger::ResponseChunk, State::ResponseLastHeader);

        machine
            .configure(State::ResponseHeaderClose)
            .substate_of(State::Open)
            .permit(Trigger::ResponseHeader, State::ResponseHeaderClose)
            .permit(Trigger::ResponseChunk, State::ResponseLastHeaderClose);

        machine
            .configure(State::ResponseLastHeader)
            .substate_of(State::Open)
            .on_entry(Feed::response_last_header)
            .permit(Trigger::Break, State::ResponseBody);

        machine
            .configure(State::ResponseLastHeaderClose)
            .substate_of(State::Open)
            .on_entry(Feed::response_last_header_close)
            .permit(Trigger::Break, State::ResponseBodyClose);

        machine
            .configure(State::ResponseBody)
            .substate_of(State::Open)
            .permit(Trigger::ResponseChunk, State::ResponseBody)
            .permit(Trigger::ResponseEnd, State::ActionLine);

        machine
            .configure(State::ResponseBodyClose)
            .substate_of(State::Open)
            .permit(Trigger::ResponseChunk, State::ResponseBodyClose)
            .permit(Trigger::ResponseEnd, State::ConnectionClose);

        machine
            .configure(State::ConnectionClose)
            .substate_of(State::Open)
            .on_entry(Feed::connection_close);

        machine.configure(State::Closed).on_entry(Feed::closed);

        Self {
            machine,
            feed: Feed::default(),
        }
    }

    /// Appends received bytes and returns the events they completed. Bytes
    /// arriving while a response is being written are buffered and parsed
    /// when the machine cycles back to the request line.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<Vec<ServerEvent>> {
        self.feed.buffer.extend_from_slice(bytes);
        if self.machine.can_fire(Trigger::Continue, &self.feed) {
            self.machine.fire(Trigger::Continue, &mut self.feed)?;
        }
        Ok(std::mem::take(&mut self.feed.events))
    }

    /// Reports a transport disconnect; emits [`ServerEvent::ClientDisconnected`].
    pub fn disconnected(&mut self) -> Result<Vec<ServerEvent>> {
        if self.machine.state() != State::Closed {
            self.machine.fire(Trigger::Disconnected, &mut self.feed)?;
        }
        Ok(std::mem::take(&mut self.feed.events))
    }

    /// Starts a response with a status line.
    pub fn begin(&mut self, protocol: &str, code: u16, phrase: &str) -> Result<()> {
        if self.writes_ignored() {
            return Ok(());
        }
        self.machine.fire(Trigger::ResponseBegin, &mut self.feed)?;
        self.feed
            .out
            .extend_from_slice(format!("{protocol} {code} {phrase}\r\n").as_bytes());
        Ok(())
    }

    /// Sends one response header line.
    pub fn send_header(&mut self, key: &str, value: &str) -> Result<()> {
        if self.writes_ignored() {
            return Ok(());
        }
        self.machine.fire(Trigger::ResponseHeader, &mut self.feed)?;
        self.feed
            .out
            .extend_from_slice(format!("{key}: {value}\r\n").as_bytes());
        Ok(())
    }

    /// Sends partial response content. The first call closes the header
    /// section; on a keep-alive connection the data is chunk-framed, on a
    /// close connection it is written raw.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.writes_ignored() {
            return Ok(());
        }
        self.machine.fire(Trigger::ResponseChunk, &mut self.feed)?;
        if !data.is_empty() {
            if self.machine.state() == State::ResponseBody {
                self.feed
                    .out
                    .extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
                self.feed.out.extend_from_slice(data);
                self.feed.out.extend_from_slice(b"\r\n");
            } else {
                self.feed.out.extend_from_slice(data);
            }
        }
        Ok(())
    }

    /// Ends the response. On a keep-alive connection this writes the
    /// terminating zero chunk and may immediately parse a pipelined request
    /// already buffered, whose events are returned.
    pub fn end(&mut self) -> Result<Vec<ServerEvent>> {
        if self.writes_ignored() {
            return Ok(Vec::new());
        }
        if self.machine.state() == State::ResponseBody {
            self.feed.out.extend_from_slice(b"0\r\n\r\n");
        }
        self.machine.fire(Trigger::ResponseEnd, &mut self.feed)?;
        Ok(std::mem::take(&mut self.feed.events))
    }

    /// Drains the bytes to hand to the transport.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.feed.out)
    }

    /// True once the machine wants the transport closed.
    pub fn close_requested(&self) -> bool {
        self.feed.close_requested
    }

    fn writes_ignored(&self) -> bool {
        matches!(
            self.machine.state(),
            State::ConnectionClose | State::Closed
        )
    }
}
