//! WebSocket client socket over `TcpStream`.
//!
//! Ground-up, thread-based: no async runtime. `open` performs the TCP
//! connect and the HTTP/1.1 upgrade handshake on the calling thread, then
//! hands the read half to a dedicated reader thread that decodes frames and
//! delivers [`SocketEvent`]s to the registered handler. `send` writes masked
//! binary frames from whichever thread calls it.
//!
//! Events are delivered on the reader thread; marshal back onto an
//! application thread via the platform scheduler if you need to.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};

use super::frame::{self, FrameDecoder, Incoming};
use crate::error::Error;
use crate::net::{Socket, SocketEvent, SocketEventHandler, SocketOptions};

/// https://datatracker.ietf.org/doc/html/rfc6455#section-1.3
/// honestly the accept field is ridiculous
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Cap on the upgrade response header block.
const MAX_HANDSHAKE_LEN: usize = 64 * 1024;

type HandlerSlot = Arc<Mutex<Option<SocketEventHandler>>>;

/// Fires the handler outside the lock so it may call back into the socket.
///
/// The slot is empty while a dispatch is in flight, so a socket must have a
/// single emitting thread at any time: the reader once the connection is up
/// (it emits `Open` itself, before decoding), the closing thread only before
/// open. An emit from a second thread during that window would be lost.
fn emit(slot: &HandlerSlot, event: SocketEvent) {
    let handler = slot.lock().unwrap().take();
    if let Some(mut handler) = handler {
        handler(event);
        let mut guard = slot.lock().unwrap();
        if guard.is_none() {
            *guard = Some(handler);
        }
    }
}

/// A `ws://` client socket on the native platform.
///
/// Created by [`NativeNet`](super::NativeNet); the address is parsed and
/// validated at creation, the connection is made by [`open`](Socket::open).
pub struct NativeSocket {
    addr: WsAddr,
    options: SocketOptions,
    handler: HandlerSlot,
    /// Write half once open; `None` before `open` and after `close`.
    stream: Option<TcpStream>,
    closed: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct WsAddr {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) path: String,
}

/// Parses `ws://host[:port][/path]`. Port defaults to 80, path to `/`.
pub(crate) fn parse_ws_addr(addr: &str) -> Result<WsAddr, Error> {
    let rest = addr.strip_prefix("ws://").ok_or_else(|| {
        Error::Unsupported(format!("address scheme in {:?}; expected ws://", addr))
    })?;
    let (authority, path) = match rest.find('/') {
        Some(slash) => (&rest[..slash], &rest[slash..]),
        None => (rest, "/"),
    };
    // an IPv6 literal is bracketed in the authority but resolves unbracketed
    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| Error::Message(format!("unclosed '[' in {:?}", addr)))?;
        let port = match after.strip_prefix(':') {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| Error::Message(format!("invalid port in {:?}", addr)))?,
            None if after.is_empty() => 80,
            None => {
                return Err(Error::Message(format!("invalid authority in {:?}", addr)));
            }
        };
        (host, port)
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::Message(format!("invalid port in {:?}", addr)))?;
                (host, port)
            }
            None => (authority, 80),
        }
    };
    if host.is_empty() {
        return Err(Error::Message(format!("missing host in {:?}", addr)));
    }
    Ok(WsAddr {
        host: host.to_string(),
        port,
        path: path.to_string(),
    })
}

/// The Sec-WebSocket-Accept value for a given Sec-WebSocket-Key.
pub(crate) fn accept_key(key: &str) -> String {
    use base64::Engine;
    use sha1::Digest;
    let mut hasher = sha1::Sha1::default();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::prelude::BASE64_STANDARD.encode(hasher.finalize())
}

impl NativeSocket {
    pub(crate) fn new(addr: &str, options: SocketOptions) -> Result<Self, Error> {
        Ok(NativeSocket {
            addr: parse_ws_addr(addr)?,
            options,
            handler: Arc::new(Mutex::new(None)),
            stream: None,
            closed: false,
        })
    }

    fn connect_tcp(&self) -> Result<TcpStream, Error> {
        match self.options.connect_timeout() {
            Some(timeout) => {
                let addr = (self.addr.host.as_str(), self.addr.port)
                    .to_socket_addrs()?
                    .next()
                    .ok_or_else(|| {
                        Error::Message(format!("could not resolve {:?}", self.addr.host))
                    })?;
                Ok(TcpStream::connect_timeout(&addr, timeout)?)
            }
            None => Ok(TcpStream::connect((
                self.addr.host.as_str(),
                self.addr.port,
            ))?),
        }
    }

    /// Sends the upgrade request and validates the response. Returns bytes
    /// that arrived after the response header, which belong to the frame
    /// stream.
    fn handshake(&self, stream: &mut TcpStream) -> Result<Vec<u8>, Error> {
        use base64::Engine;
        let nonce: [u8; 16] = rand::random();
        let key = base64::prelude::BASE64_STANDARD.encode(nonce);
        let request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}:{port}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {key}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n",
            path = self.addr.path,
            host = self.addr.host,
            port = self.addr.port,
        );
        stream.write_all(request.as_bytes())?;
        stream.flush()?;

        // apply the connect timeout to the response read as well, so a mute
        // server cannot hang open() forever
        stream.set_read_timeout(self.options.connect_timeout())?;
        let (status_line, headers, leftover) = read_response_head(stream)?;
        stream.set_read_timeout(None)?;

        if !status_line.contains(" 101 ") {
            return Err(Error::Handshake(format!(
                "expected 101 Switching Protocols, got {:?}",
                status_line
            )));
        }
        let upgraded = headers
            .get("upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        if !upgraded {
            return Err(Error::Handshake("missing Upgrade: websocket".to_string()));
        }
        let accept = headers.get("sec-websocket-accept").map(|s| s.as_str());
        if accept != Some(accept_key(&key).as_str()) {
            return Err(Error::Handshake(format!(
                "Sec-WebSocket-Accept mismatch: got {:?}",
                accept
            )));
        }
        Ok(leftover)
    }
}

/// Reads until the end of the HTTP header block. Returns the status line,
/// lowercase-keyed headers, and the leftover bytes beyond the block.
fn read_response_head(
    stream: &mut TcpStream,
) -> Result<(String, HashMap<String, String>, Vec<u8>), Error> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let pos = loop {
        if let Some(pos) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos;
        }
        if buf.len() > MAX_HANDSHAKE_LEN {
            return Err(Error::Handshake("oversized response header".to_string()));
        }
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            return Err(Error::ConnectionClosed);
        }
        buf.extend_from_slice(&chunk[..read]);
    };
    let leftover = buf[pos + 4..].to_vec();
    let head = String::from_utf8_lossy(&buf[..pos]).to_string();

    let mut lines = head.split("\r\n");
    let status_line = lines
        .next()
        .ok_or_else(|| Error::Handshake("empty response".to_string()))?
        .to_string();
    // http headers are case-insensitive, so we convert to lowercase
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }
    Ok((status_line, headers, leftover))
}

/// Decodes frames off the read half and delivers events until the stream
/// ends. Answers pings itself; everything else goes to the handler.
///
/// This thread is the sole emitter for the socket's whole open lifetime. It
/// emits `Open` itself so that a server greeting arriving in the same write
/// as the handshake response cannot race the open notification.
fn reader_loop(mut stream: TcpStream, handler: HandlerSlot, leftover: Vec<u8>) {
    let mut write_half = match stream.try_clone() {
        Ok(clone) => clone,
        Err(e) => {
            emit(&handler, SocketEvent::Error(Error::Io(e)));
            emit(&handler, SocketEvent::Closed);
            return;
        }
    };
    emit(&handler, SocketEvent::Open);
    let mut decoder = FrameDecoder::new();
    decoder.push(&leftover);
    let mut buf = [0u8; 4096];
    loop {
        loop {
            match decoder.next() {
                Ok(Some(Incoming::Message(message))) => {
                    emit(&handler, SocketEvent::Message(message));
                }
                Ok(Some(Incoming::Ping(payload))) => {
                    let pong = frame::encode_pong(&payload, rand::random());
                    if write_half.write_all(&pong).and_then(|_| write_half.flush()).is_err() {
                        crate::logging::log("underlay: pong write failed; reader exiting");
                    }
                }
                Ok(Some(Incoming::Pong(_))) => {}
                Ok(Some(Incoming::Close)) => {
                    // answer the closing handshake; the peer may already be gone
                    let _ = write_half.write_all(&frame::encode_close(rand::random()));
                    let _ = stream.shutdown(Shutdown::Both);
                    emit(&handler, SocketEvent::Closed);
                    return;
                }
                Ok(None) => break,
                Err(e) => {
                    emit(&handler, SocketEvent::Error(e));
                    emit(&handler, SocketEvent::Closed);
                    return;
                }
            }
        }
        match stream.read(&mut buf) {
            Ok(0) => {
                emit(&handler, SocketEvent::Closed);
                return;
            }
            Ok(read) => decoder.push(&buf[..read]),
            Err(e) => {
                emit(&handler, SocketEvent::Error(Error::Io(e)));
                emit(&handler, SocketEvent::Closed);
                return;
            }
        }
    }
}

impl Socket for NativeSocket {
    fn on_event(&mut self, handler: SocketEventHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    fn open(&mut self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        if self.stream.is_some() {
            return Err(Error::Message("socket is already open".to_string()));
        }
        if self.options.tls() {
            return Err(Error::Unsupported(
                "tls is not supported by the native adapter".to_string(),
            ));
        }
        let mut stream = self.connect_tcp()?;
        let leftover = self.handshake(&mut stream)?;

        let read_half = stream.try_clone()?;
        let handler = self.handler.clone();
        std::thread::Builder::new()
            .name("underlay::socket-reader".to_string())
            .spawn(move || reader_loop(read_half, handler, leftover))
            .map_err(Error::Io)?;

        self.stream = Some(stream);
        #[cfg(feature = "logwise")]
        logwise::info_sync!("underlay: websocket open");
        // the reader emits Open; emitting it here would race the reader's
        // first Message when the server greets us immediately
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
        let frame = frame::encode_binary(data, rand::random());
        stream.write_all(&frame)?;
        stream.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.take() {
            Some(mut stream) => {
                // best effort: the peer may already be gone
                let _ = stream.write_all(&frame::encode_close(rand::random()));
                let _ = stream.flush();
                let _ = stream.shutdown(Shutdown::Both);
                // the reader observes the shutdown and emits Closed
            }
            None => emit(&self.handler, SocketEvent::Closed),
        }
        Ok(())
    }
}
