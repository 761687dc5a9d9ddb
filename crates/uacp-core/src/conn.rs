//! Established UACP connection.
//!
//! A [`Conn`] owns one transport stream and the limits negotiated for it.
//! Raw reads and writes pass straight through (the secure channel layer does
//! its own framing on top); [`Conn::send_control`] and [`Conn::recv_frame`]
//! add UACP framing and enforce the buffer sizes.
//!
//! One reader and one writer may use a connection at the same time through
//! `tokio::io::split`. Concurrent writers must be serialized by the caller,
//! otherwise frames interleave.
//!
//! # Deadlines
//!
//! Deadlines are the only cancellation mechanism. An expired deadline fails
//! the pending read or write with [`io::ErrorKind::TimedOut`]; the connection
//! should then be closed.

use std::{
    fmt, io,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf},
    net::TcpStream,
    time::{Instant, Sleep},
};
use tracing::debug;
use uacp_proto::{
    Acknowledge, ChunkAssembler, ChunkLimits, ControlMessage, ErrorMessage, Frame, FrameHeader,
    MessageType, ProtocolError, Reassembled, StatusCode, decode_from, split_message,
};

use crate::{
    error::ConnError, handshake::Negotiated, ids::ConnId, limits::Limits, transport::Transport,
};

/// Pending deadline for one direction.
#[derive(Default)]
struct Deadline {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Deadline {
    fn set(&mut self, at: Option<Instant>) {
        self.sleep = at.map(|at| Box::pin(tokio::time::sleep_until(at)));
    }

    fn poll_expired(&mut self, cx: &mut Context<'_>) -> bool {
        self.sleep.as_mut().is_some_and(|sleep| sleep.as_mut().poll(cx).is_ready())
    }
}

fn deadline_exceeded(direction: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{direction} deadline exceeded"))
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection closed")
}

/// An established UACP connection.
pub struct Conn<T: Transport = TcpStream> {
    id: ConnId,
    stream: Option<T>,
    ack: Acknowledge,
    limits: Limits,
    send_chunks: ChunkLimits,
    receive_chunks: ChunkLimits,
    read_broken: bool,
    write_broken: bool,
    read_deadline: Deadline,
    write_deadline: Deadline,
}

impl<T: Transport> Conn<T> {
    /// Connection that has not finished its handshake yet. Uses `limits`
    /// until [`Conn::establish`] fixes the negotiated ones.
    pub(crate) fn handshaking(id: ConnId, stream: T, limits: Limits) -> Self {
        Self {
            id,
            stream: Some(stream),
            ack: limits.acknowledge(),
            limits,
            send_chunks: limits.send_chunk_limits(),
            receive_chunks: limits.receive_chunk_limits(),
            read_broken: false,
            write_broken: false,
            read_deadline: Deadline::default(),
            write_deadline: Deadline::default(),
        }
    }

    pub(crate) fn establish(&mut self, negotiated: Negotiated) {
        self.ack = negotiated.ack;
        self.limits = negotiated.limits;
        self.send_chunks = negotiated.send_chunks;
        self.receive_chunks = negotiated.receive_chunks;
    }

    /// Process-unique connection id.
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Largest frame this side accepts.
    pub fn receive_buf_size(&self) -> u32 {
        self.limits.receive_buf_size
    }

    /// Largest frame this side sends.
    pub fn send_buf_size(&self) -> u32 {
        self.limits.send_buf_size
    }

    /// Largest logical message.
    pub fn max_message_size(&self) -> u32 {
        self.limits.max_message_size
    }

    /// Most chunks per logical message.
    pub fn max_chunk_count(&self) -> u32 {
        self.limits.max_chunk_count
    }

    /// The acknowledge that fixed this connection's limits, with zero
    /// message limits already replaced by defaults.
    pub fn acknowledge(&self) -> &Acknowledge {
        &self.ack
    }

    /// All limits, from this side's point of view.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Bounds enforced on outgoing messages. Tighter than [`Conn::limits`]
    /// when the peer's hello announced smaller message limits.
    pub fn send_chunk_limits(&self) -> ChunkLimits {
        self.send_chunks
    }

    /// Bounds enforced on incoming messages. Tighter than [`Conn::limits`]
    /// when our own hello announced smaller message limits.
    pub fn receive_chunk_limits(&self) -> ChunkLimits {
        self.receive_chunks
    }

    /// True once [`Conn::close`] ran.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Local address of the underlying transport.
    pub fn local_addr(&self) -> Result<SocketAddr, ConnError> {
        let stream = self.stream.as_ref().ok_or(ConnError::AlreadyClosed)?;
        Ok(stream.local_addr()?)
    }

    /// Peer address of the underlying transport.
    pub fn peer_addr(&self) -> Result<SocketAddr, ConnError> {
        let stream = self.stream.as_ref().ok_or(ConnError::AlreadyClosed)?;
        Ok(stream.peer_addr()?)
    }

    /// Set both read and write deadlines. `None` clears them.
    ///
    /// # Panics
    ///
    /// Outside a tokio runtime with the time driver enabled.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.set_read_deadline(deadline);
        self.set_write_deadline(deadline);
    }

    /// Set the read deadline. `None` clears it.
    pub fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.read_deadline.set(deadline);
    }

    /// Set the write deadline. `None` clears it.
    pub fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        self.write_deadline.set(deadline);
    }

    /// Send a single-chunk control message.
    ///
    /// Nothing is written if the frame exceeds the send buffer size. A
    /// failed write leaves the stream in an unknown state, so later sends
    /// fail with [`ConnError::Broken`].
    pub async fn send_control(&mut self, msg: &ControlMessage) -> Result<(), ConnError> {
        let frame = msg.to_frame()?;
        if frame.header.message_size() > self.limits.send_buf_size {
            return Err(ProtocolError::MessageTooLarge {
                size: u64::from(frame.header.message_size()),
                limit: self.limits.send_buf_size,
            }
            .into());
        }
        self.write_frame(&frame).await
    }

    /// Receive one frame.
    ///
    /// The declared size is checked against the receive buffer before the
    /// payload is read. Any failure is terminal for the read side.
    pub async fn recv_frame(&mut self) -> Result<Frame, ConnError> {
        if self.read_broken {
            return Err(ConnError::Broken);
        }
        let result = self.read_frame().await;
        if result.is_err() {
            self.read_broken = true;
        }
        result
    }

    async fn read_frame(&mut self) -> Result<Frame, ConnError> {
        let mut header = [0u8; FrameHeader::SIZE];
        self.read_exact(&mut header).await?;
        let header = FrameHeader::from_bytes(&header)?;
        header.check_size(self.limits.receive_buf_size)?;

        let mut payload = vec![0u8; header.payload_size()];
        self.read_exact(&mut payload).await?;

        debug!(conn_id = %self.id, header = %header, "recv");
        Ok(Frame { header, payload: payload.into() })
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<(), ConnError> {
        if self.write_broken {
            return Err(ConnError::Broken);
        }
        let bytes = frame.to_bytes();
        let result = async {
            self.write_all(&bytes).await?;
            self.flush().await
        }
        .await;

        if let Err(err) = result {
            self.write_broken = true;
            return Err(err.into());
        }
        debug!(conn_id = %self.id, header = %frame.header, "sent");
        Ok(())
    }

    /// Tell the peer why the connection is being dropped.
    ///
    /// Best effort: a failure to send is logged and otherwise ignored, the
    /// caller is about to close anyway and has a more relevant error.
    pub async fn send_error(&mut self, code: StatusCode, reason: Option<String>) {
        let msg = ControlMessage::Error(ErrorMessage { code, reason });
        if let Err(err) = self.send_control(&msg).await {
            debug!(conn_id = %self.id, code = %code, error = %err, "failed to send ERR");
        }
    }

    /// Send a logical message, split into chunks that respect the
    /// negotiated buffer size, message size and chunk count.
    pub async fn send_message(
        &mut self,
        message_type: MessageType,
        body: &[u8],
    ) -> Result<(), ConnError> {
        if message_type.is_control() {
            return Err(ConnError::UnexpectedMessage(message_type));
        }
        for frame in split_message(message_type, body, self.send_chunks)? {
            self.write_frame(&frame).await?;
        }
        Ok(())
    }

    /// Receive the next logical message, reassembling its chunks.
    ///
    /// An `ERR` frame from the peer surfaces as [`ConnError::PeerError`].
    pub async fn recv_message(&mut self) -> Result<Reassembled, ConnError> {
        let mut assembler = ChunkAssembler::new(self.receive_chunks);
        loop {
            let frame = self.recv_frame().await?;
            match frame.message_type() {
                MessageType::Error => {
                    let (err, _) = decode_from::<ErrorMessage>(&frame.payload)?;
                    return Err(ConnError::PeerError { code: err.code, reason: err.reason });
                },
                other if other.is_control() => return Err(ConnError::UnexpectedMessage(other)),
                _ => {},
            }
            if let Some(message) = assembler.push(frame)? {
                return Ok(message);
            }
        }
    }

    /// Close the underlying transport.
    ///
    /// The transport is released exactly once; later calls return
    /// [`ConnError::AlreadyClosed`].
    pub async fn close(&mut self) -> Result<(), ConnError> {
        let mut stream = self.stream.take().ok_or(ConnError::AlreadyClosed)?;
        debug!(conn_id = %self.id, "close");
        stream.close().await?;
        Ok(())
    }

    /// Close and log instead of returning the error. Used on failure paths
    /// where another error is already being reported.
    pub(crate) async fn release(&mut self) {
        if let Err(err) = self.close().await {
            debug!(conn_id = %self.id, error = %err, "close failed");
        }
    }
}

impl<T: Transport> fmt::Debug for Conn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("id", &self.id)
            .field("limits", &self.limits)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> AsyncRead for Conn<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.read_deadline.poll_expired(cx) {
            return Poll::Ready(Err(deadline_exceeded("read")));
        }
        match this.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_read(cx, buf),
            None => Poll::Ready(Err(closed())),
        }
    }
}

impl<T: Transport> AsyncWrite for Conn<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.write_deadline.poll_expired(cx) {
            return Poll::Ready(Err(deadline_exceeded("write")));
        }
        match this.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_write(cx, buf),
            None => Poll::Ready(Err(closed())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.write_deadline.poll_expired(cx) {
            return Poll::Ready(Err(deadline_exceeded("write")));
        }
        match this.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_flush(cx),
            None => Poll::Ready(Err(closed())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_shutdown(cx),
            None => Poll::Ready(Err(closed())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use uacp_proto::{ChunkType, Hello};

    use super::*;
    use crate::{
        ids::ConnIdAllocator,
        limits::MB,
        transport::memory::{self, MemoryTransport},
    };

    fn conn(stream: MemoryTransport, limits: Limits) -> Conn<MemoryTransport> {
        Conn::handshaking(ConnIdAllocator::new().next_id(), stream, limits)
    }

    fn small() -> Limits {
        Limits {
            receive_buf_size: 32,
            send_buf_size: 32,
            max_message_size: MB,
            max_chunk_count: 16,
        }
    }

    fn hello() -> ControlMessage {
        ControlMessage::Hello(Hello {
            version: 0,
            receive_buf_size: 0xffff,
            send_buf_size: 0xffff,
            max_message_size: 0,
            max_chunk_count: 0,
            endpoint_url: "opc.tcp://plc:4840/line1".to_string(),
        })
    }

    #[tokio::test]
    async fn control_frame_crosses_the_pipe() {
        let (a, b) = memory::pair(memory::DEFAULT_CAPACITY);
        let mut client = conn(a, Limits::client());
        let mut server = conn(b, Limits::server());

        client.send_control(&hello()).await.unwrap();
        let frame = server.recv_frame().await.unwrap();

        assert_eq!(frame.message_type(), MessageType::Hello);
        assert_eq!(ControlMessage::from_frame(&frame).unwrap(), hello());
    }

    #[tokio::test]
    async fn oversized_control_is_not_written() {
        let (a, _b) = memory::pair(memory::DEFAULT_CAPACITY);
        let mut client = conn(a, small());

        let err = client.send_control(&hello()).await.unwrap_err();
        assert!(matches!(
            err,
            ConnError::Protocol(ProtocolError::MessageTooLarge { limit: 32, .. })
        ));

        // rejected before writing, so the connection stays usable
        let msg = ControlMessage::Acknowledge(Acknowledge::new(1, 1, 1, 1));
        client.send_control(&msg).await.unwrap();
    }

    #[tokio::test]
    async fn oversized_header_fails_without_reading_payload() {
        let (a, mut raw) = memory::pair(memory::DEFAULT_CAPACITY);
        let mut server = conn(a, small());

        // header declares 1000 bytes; the payload is never sent
        raw.write_all(b"MSGF\xe8\x03\x00\x00").await.unwrap();

        let err = server.recv_frame().await.unwrap_err();
        assert!(matches!(
            err,
            ConnError::Protocol(ProtocolError::MessageTooLarge { size: 1000, limit: 32 })
        ));
        assert!(matches!(server.recv_frame().await, Err(ConnError::Broken)));
    }

    #[tokio::test]
    async fn unknown_message_type_is_rejected() {
        let (a, mut raw) = memory::pair(memory::DEFAULT_CAPACITY);
        let mut server = conn(a, Limits::server());

        raw.write_all(b"XYZF\x08\x00\x00\x00").await.unwrap();

        let err = server.recv_frame().await.unwrap_err();
        assert!(matches!(err, ConnError::Protocol(ProtocolError::UnknownMessageType(_))));
    }

    #[tokio::test]
    async fn peer_close_mid_frame_is_an_io_error() {
        let (a, mut raw) = memory::pair(memory::DEFAULT_CAPACITY);
        let mut server = conn(a, Limits::server());

        raw.write_all(b"HELF\x20\x00\x00\x00\x00\x00").await.unwrap();
        raw.close().await.unwrap();

        let err = server.recv_frame().await.unwrap_err();
        assert!(matches!(err, ConnError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn messages_are_chunked_and_reassembled() {
        let (a, b) = memory::pair(memory::DEFAULT_CAPACITY);
        let mut client = conn(a, small());
        let mut server = conn(b, small());

        let body: Vec<u8> = (0..200u8).collect();
        let sender = tokio::spawn(async move {
            client.send_message(MessageType::Message, &body).await.unwrap();
            client
        });

        let message = server.recv_message().await.unwrap();
        let Reassembled::Complete { message_type, body } = message else {
            panic!("expected a complete message");
        };
        assert_eq!(message_type, MessageType::Message);
        assert_eq!(body.len(), 200);
        assert_eq!(body[199], 199);
        sender.await.unwrap();
    }

    #[tokio::test]
    async fn peer_error_frame_ends_message_receive() {
        let (a, b) = memory::pair(memory::DEFAULT_CAPACITY);
        let mut client = conn(a, Limits::server());
        let mut server = conn(b, Limits::server());

        server.send_error(StatusCode::BAD_TCP_SERVER_TOO_BUSY, Some("busy".into())).await;

        let err = client.recv_message().await.unwrap_err();
        assert!(matches!(
            err,
            ConnError::PeerError { code: StatusCode::BAD_TCP_SERVER_TOO_BUSY, reason: Some(ref r) }
                if r == "busy"
        ));
    }

    #[tokio::test]
    async fn control_types_are_not_data_messages() {
        let (a, _b) = memory::pair(memory::DEFAULT_CAPACITY);
        let mut client = conn(a, Limits::server());

        let err = client.send_message(MessageType::Hello, b"").await.unwrap_err();
        assert!(matches!(err, ConnError::UnexpectedMessage(MessageType::Hello)));
    }

    #[tokio::test]
    async fn abort_chunk_is_reported() {
        let (a, b) = memory::pair(memory::DEFAULT_CAPACITY);
        let mut client = conn(a, Limits::server());
        let mut server = conn(b, Limits::server());

        let first =
            Frame::new(MessageType::Message, ChunkType::Continuation, &b"part"[..]).unwrap();
        let abort = Frame::new(MessageType::Message, ChunkType::Abort, &b"stop"[..]).unwrap();
        client.write_frame(&first).await.unwrap();
        client.write_frame(&abort).await.unwrap();

        let message = server.recv_message().await.unwrap();
        assert!(
            matches!(message, Reassembled::Aborted { ref payload, .. } if &payload[..] == b"stop")
        );
    }

    #[tokio::test]
    async fn write_to_departed_peer_breaks_the_write_side() {
        let (a, b) = memory::pair(memory::DEFAULT_CAPACITY);
        let mut client = conn(a, Limits::client());
        drop(b);

        let err = client.send_control(&hello()).await.unwrap_err();
        assert!(matches!(err, ConnError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
        assert!(matches!(client.send_control(&hello()).await, Err(ConnError::Broken)));
        assert!(matches!(
            client.send_message(MessageType::Message, b"late").await,
            Err(ConnError::Broken)
        ));

        // the read side is tracked separately
        assert!(matches!(
            client.recv_frame().await,
            Err(ConnError::Io(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof
        ));
    }

    #[tokio::test]
    async fn split_halves_read_and_write_concurrently() {
        // small pipe so both directions must make progress together
        let (a, b) = memory::pair(1024);
        let mut client = conn(a, Limits::client());
        client.set_deadline(Some(Instant::now() + Duration::from_secs(30)));
        let (mut reader, mut writer) = tokio::io::split(client);
        let (mut peer_reader, mut peer_writer) = tokio::io::split(b);

        let outgoing: Vec<u8> = (0..16 * 1024u32).map(|i| i as u8).collect();
        let incoming: Vec<u8> = outgoing.iter().rev().copied().collect();

        let write = async {
            writer.write_all(&outgoing).await.unwrap();
            writer.flush().await.unwrap();
        };
        let read = async {
            let mut got = vec![0u8; incoming.len()];
            reader.read_exact(&mut got).await.unwrap();
            got
        };
        let peer_read = async {
            let mut got = vec![0u8; outgoing.len()];
            peer_reader.read_exact(&mut got).await.unwrap();
            got
        };
        let peer_write = async { peer_writer.write_all(&incoming).await.unwrap() };

        let ((), got, sent, ()) = tokio::join!(write, read, peer_read, peer_write);
        assert_eq!(got, incoming);
        assert_eq!(sent, outgoing);

        let client = reader.unsplit(writer);
        assert!(!client.is_closed());
    }

    #[tokio::test]
    async fn close_releases_transport_once() {
        let (a, _b) = memory::pair(memory::DEFAULT_CAPACITY);
        let closes = a.close_counter();
        let mut client = conn(a, Limits::client());

        client.close().await.unwrap();
        assert!(client.is_closed());
        assert!(matches!(client.close().await, Err(ConnError::AlreadyClosed)));
        assert!(matches!(client.local_addr(), Err(ConnError::AlreadyClosed)));
        assert_eq!(closes.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn read_deadline_expires() {
        let (a, _b) = memory::pair(memory::DEFAULT_CAPACITY);
        let mut client = conn(a, Limits::client());
        client.set_read_deadline(Some(Instant::now() + Duration::from_secs(5)));

        let err = client.recv_frame().await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_deadline_does_not_fire() {
        let (a, b) = memory::pair(memory::DEFAULT_CAPACITY);
        let mut client = conn(a, Limits::client());
        let mut server = conn(b, Limits::server());
        client.set_deadline(Some(Instant::now() + Duration::from_secs(1)));
        client.set_deadline(None);

        tokio::time::sleep(Duration::from_secs(2)).await;
        server.send_control(&hello()).await.unwrap();

        let frame = client.recv_frame().await.unwrap();
        assert_eq!(frame.message_type(), MessageType::Hello);
    }

    #[tokio::test]
    async fn accessors_report_local_limits() {
        let (a, _b) = memory::pair(memory::DEFAULT_CAPACITY);
        let client = conn(a, small());

        assert_eq!(client.id().get(), 1);
        assert_eq!(client.receive_buf_size(), 32);
        assert_eq!(client.send_buf_size(), 32);
        assert_eq!(client.max_message_size(), MB);
        assert_eq!(client.max_chunk_count(), 16);
        assert_eq!(client.peer_addr().unwrap().port(), 2);
    }
}
