// Copyright 2023 litep2p developers
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Mplex multiplexer, negotiated as a fallback when the peer lacks yamux.
//!
//! There is no flow control and no keepalive; a slow reader causes
//! head-of-line blocking. Both peers allocate stream IDs independently, so a
//! stream is identified by `(id, initiator_bit)`. Sessions enforce a
//! per-substream inbound byte cap and reset the substream when it is
//! exceeded.

use crate::{
    codec,
    error::{Error, FramingError},
    transport::Connection,
};

use bytes::{Buf, Bytes, BytesMut};
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use nohash_hasher::IntMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use std::{
    io,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    task::{Context, Poll, Waker},
};

use frame::{Frame, MplexFlag};

mod frame;

/// Logging target for the file.
const LOG_TARGET: &str = "mplex";

/// Default maximum payload of one frame.
const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Default inbound byte cap per substream.
const DEFAULT_MAX_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Mplex session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum payload carried by one frame.
    pub max_frame_size: usize,

    /// Inbound byte cap per substream; the substream is reset when exceeded.
    pub max_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

/// Commands handed to the writer task.
enum Command {
    /// Write a frame to the socket.
    Frame(Frame),

    /// Close the socket and exit.
    Shutdown,
}

/// Table key of a stream: the ID shifted left once, the low bit telling
/// whether the local node initiated the stream.
fn stream_key(stream_id: u64, local_initiator: bool) -> u64 {
    (stream_id << 1) | u64::from(local_initiator)
}

/// State of one substream, shared between its handle and the session tasks.
#[derive(Debug, Default)]
struct StreamContext {
    /// Bytes received from the remote but not yet read by the application.
    read_buffer: BytesMut,

    /// Remote half-closed its direction.
    remote_closed: bool,

    /// Local side sent a close frame.
    local_closed: bool,

    /// Stream is reset, all buffered data discarded.
    reset: bool,

    /// Waker of a blocked reader.
    read_waker: Option<Waker>,
}

impl StreamContext {
    fn wake_reader(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }
}

/// State shared between the session handle, its substreams and its tasks.
struct SessionContext {
    /// Live substreams, keyed by [`stream_key`].
    streams: Mutex<IntMap<u64, Arc<Mutex<StreamContext>>>>,

    /// Next locally allocated stream ID.
    next_stream_id: AtomicU64,

    /// Session has terminated.
    closed: AtomicBool,
}

impl SessionContext {
    /// Terminate the session, resetting all live substreams.
    fn terminate(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::debug!(target: LOG_TARGET, "terminate session");

        let streams = {
            let mut streams = self.streams.lock();
            streams.drain().collect::<Vec<_>>()
        };
        for (_, stream) in streams {
            let mut stream = stream.lock();
            stream.reset = true;
            stream.read_buffer.clear();
            stream.wake_reader();
        }
    }
}

/// Mplex session handle.
pub struct Session {
    /// Shared session state.
    context: Arc<SessionContext>,

    /// Session configuration.
    config: Config,

    /// Outbound command queue, drained by the writer task.
    command_tx: mpsc::UnboundedSender<Command>,

    /// Queue of unclaimed inbound substreams.
    accept_rx: mpsc::UnboundedReceiver<Substream>,
}

impl Session {
    /// Create a new mplex session over `io` and spawn its reader and writer
    /// tasks.
    pub fn new(io: Box<dyn Connection>, config: Config) -> Session {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();

        let context = Arc::new(SessionContext {
            streams: Mutex::new(IntMap::default()),
            next_stream_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        let (read_half, write_half) = io.split();

        tokio::spawn(reader_task(
            read_half,
            context.clone(),
            config.clone(),
            command_tx.clone(),
            accept_tx,
        ));
        tokio::spawn(writer_task(write_half, command_rx, context.clone()));

        Session {
            context,
            config,
            command_tx,
            accept_rx,
        }
    }

    /// Open a new outbound substream.
    pub fn open_stream(&self) -> crate::Result<Substream> {
        if self.context.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        let stream_id = self.context.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let stream = Arc::new(Mutex::new(StreamContext::default()));
        self.context
            .streams
            .lock()
            .insert(stream_key(stream_id, true), stream.clone());

        tracing::trace!(target: LOG_TARGET, ?stream_id, "open substream");

        self.command_tx
            .send(Command::Frame(Frame::new(
                MplexFlag::NewStream,
                stream_id,
                Bytes::new(),
            )))
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(Substream {
            stream_id,
            local_initiator: true,
            max_frame_size: self.config.max_frame_size,
            context: stream,
            session: Arc::downgrade(&self.context),
            command_tx: self.command_tx.clone(),
        })
    }

    /// Wait for the next inbound substream.
    pub async fn accept_stream(&mut self) -> crate::Result<Substream> {
        self.accept_rx.recv().await.ok_or(Error::ConnectionClosed)
    }

    /// Close the session, resetting all live substreams.
    pub fn close(&self) {
        if self.context.closed.load(Ordering::SeqCst) {
            return;
        }

        let _ = self.command_tx.send(Command::Shutdown);
        self.context.terminate();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Substream of an mplex session.
pub struct Substream {
    /// Stream ID in the initiator's numbering.
    stream_id: u64,

    /// Was the stream opened by the local node?
    local_initiator: bool,

    /// Maximum payload per outbound frame.
    max_frame_size: usize,

    /// Shared stream state.
    context: Arc<Mutex<StreamContext>>,

    /// Session owning the stream.
    session: Weak<SessionContext>,

    /// Outbound command queue of the session.
    command_tx: mpsc::UnboundedSender<Command>,
}

impl Substream {
    /// Flag naming the local side of this stream in outbound frames.
    fn message_flag(&self) -> MplexFlag {
        if self.local_initiator {
            MplexFlag::MessageInitiator
        } else {
            MplexFlag::MessageReceiver
        }
    }

    fn close_flag(&self) -> MplexFlag {
        if self.local_initiator {
            MplexFlag::CloseInitiator
        } else {
            MplexFlag::CloseReceiver
        }
    }

    fn reset_flag(&self) -> MplexFlag {
        if self.local_initiator {
            MplexFlag::ResetInitiator
        } else {
            MplexFlag::ResetReceiver
        }
    }

    /// Remove the stream from the session table.
    fn unregister(&self) {
        if let Some(session) = self.session.upgrade() {
            session
                .streams
                .lock()
                .remove(&stream_key(self.stream_id, self.local_initiator));
        }
    }
}

impl AsyncRead for Substream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let mut stream = this.context.lock();

        if stream.reset {
            return Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()));
        }

        if !stream.read_buffer.is_empty() {
            let nread = stream.read_buffer.len().min(buf.len());
            buf[..nread].copy_from_slice(&stream.read_buffer[..nread]);
            stream.read_buffer.advance(nread);

            let destroy =
                stream.read_buffer.is_empty() && stream.remote_closed && stream.local_closed;
            drop(stream);
            if destroy {
                this.unregister();
            }

            return Poll::Ready(Ok(nread));
        }

        if stream.remote_closed {
            let destroy = stream.local_closed;
            drop(stream);
            if destroy {
                this.unregister();
            }
            return Poll::Ready(Ok(0));
        }

        stream.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl AsyncWrite for Substream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let stream = this.context.lock();

        if stream.reset {
            return Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()));
        }
        if stream.local_closed {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        drop(stream);

        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let chunk = buf.len().min(this.max_frame_size);
        this.command_tx
            .send(Command::Frame(Frame::new(
                this.message_flag(),
                this.stream_id,
                Bytes::copy_from_slice(&buf[..chunk]),
            )))
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;

        Poll::Ready(Ok(chunk))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let mut stream = this.context.lock();

        if stream.reset || stream.local_closed {
            return Poll::Ready(Ok(()));
        }

        stream.local_closed = true;
        let destroy = stream.remote_closed && stream.read_buffer.is_empty();
        drop(stream);

        let _ = this.command_tx.send(Command::Frame(Frame::new(
            this.close_flag(),
            this.stream_id,
            Bytes::new(),
        )));
        if destroy {
            this.unregister();
        }

        Poll::Ready(Ok(()))
    }
}

impl Drop for Substream {
    fn drop(&mut self) {
        let reset = {
            let mut stream = self.context.lock();
            if stream.reset || (stream.local_closed && stream.remote_closed) {
                false
            } else {
                stream.reset = true;
                true
            }
        };

        if reset {
            let _ = self.command_tx.send(Command::Frame(Frame::new(
                self.reset_flag(),
                self.stream_id,
                Bytes::new(),
            )));
        }
        self.unregister();
    }
}

/// Read frames from the socket until the session dies.
async fn reader_task(
    mut io: futures::io::ReadHalf<Box<dyn Connection>>,
    context: Arc<SessionContext>,
    config: Config,
    command_tx: mpsc::UnboundedSender<Command>,
    accept_tx: mpsc::UnboundedSender<Substream>,
) {
    match read_loop(&mut io, &context, &config, &command_tx, &accept_tx).await {
        Ok(()) => tracing::debug!(target: LOG_TARGET, "session closed"),
        Err(error) => tracing::debug!(target: LOG_TARGET, ?error, "session failed"),
    }

    context.terminate();
    let _ = command_tx.send(Command::Shutdown);
}

async fn read_loop(
    io: &mut futures::io::ReadHalf<Box<dyn Connection>>,
    context: &Arc<SessionContext>,
    config: &Config,
    command_tx: &mpsc::UnboundedSender<Command>,
    accept_tx: &mpsc::UnboundedSender<Substream>,
) -> crate::Result<()> {
    loop {
        let header = match codec::read_varint(io, u64::MAX >> 1).await {
            Ok(header) => header,
            Err(Error::Io(error)) if error.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(())
            }
            Err(error) => return Err(error),
        };
        let (stream_id, flag) = Frame::parse_header(header)?;

        // An oversized frame is fatal to the whole session, checked before
        // the payload is allocated.
        let length = codec::read_varint(io, u64::MAX >> 1).await?;
        if length as usize > config.max_frame_size {
            return Err(Error::Framing(FramingError::OversizedFrame {
                size: length as usize,
                max: config.max_frame_size,
            }));
        }

        let mut payload = vec![0u8; length as usize];
        io.read_exact(&mut payload).await?;

        match flag {
            MplexFlag::NewStream => {
                on_new_stream(context, command_tx, accept_tx, config, stream_id);
            }
            MplexFlag::MessageReceiver | MplexFlag::MessageInitiator => {
                on_message(
                    context,
                    command_tx,
                    config,
                    stream_id,
                    // The sender speaks as the receiver side of streams the
                    // local node initiated.
                    flag == MplexFlag::MessageReceiver,
                    payload.into(),
                );
            }
            MplexFlag::CloseReceiver | MplexFlag::CloseInitiator => {
                on_close(context, stream_id, flag == MplexFlag::CloseReceiver);
            }
            MplexFlag::ResetReceiver | MplexFlag::ResetInitiator => {
                on_reset(context, stream_id, flag == MplexFlag::ResetReceiver);
            }
        }
    }
}

/// Handle a `NewStream` frame.
fn on_new_stream(
    context: &Arc<SessionContext>,
    command_tx: &mpsc::UnboundedSender<Command>,
    accept_tx: &mpsc::UnboundedSender<Substream>,
    config: &Config,
    stream_id: u64,
) {
    let mut streams = context.streams.lock();
    if streams.contains_key(&stream_key(stream_id, false)) {
        drop(streams);

        tracing::debug!(target: LOG_TARGET, ?stream_id, "NewStream for known stream, reset");
        let _ = command_tx.send(Command::Frame(Frame::new(
            MplexFlag::ResetReceiver,
            stream_id,
            Bytes::new(),
        )));
        return;
    }

    let stream = Arc::new(Mutex::new(StreamContext::default()));
    streams.insert(stream_key(stream_id, false), stream.clone());
    drop(streams);

    tracing::trace!(target: LOG_TARGET, ?stream_id, "inbound substream");

    let _ = accept_tx.send(Substream {
        stream_id,
        local_initiator: false,
        max_frame_size: config.max_frame_size,
        context: stream,
        session: Arc::downgrade(context),
        command_tx: command_tx.clone(),
    });
}

/// Handle a message frame, enforcing the per-substream inbound byte cap.
fn on_message(
    context: &Arc<SessionContext>,
    command_tx: &mpsc::UnboundedSender<Command>,
    config: &Config,
    stream_id: u64,
    local_initiator: bool,
    payload: Bytes,
) {
    let Some(stream) = context
        .streams
        .lock()
        .get(&stream_key(stream_id, local_initiator))
        .cloned()
    else {
        return;
    };

    let mut stream = stream.lock();
    if stream.read_buffer.len() + payload.len() > config.max_buffer_size {
        tracing::debug!(target: LOG_TARGET, ?stream_id, "inbound buffer cap exceeded, reset");

        stream.reset = true;
        stream.read_buffer.clear();
        stream.wake_reader();
        drop(stream);

        context
            .streams
            .lock()
            .remove(&stream_key(stream_id, local_initiator));
        let _ = command_tx.send(Command::Frame(Frame::new(
            if local_initiator {
                MplexFlag::ResetInitiator
            } else {
                MplexFlag::ResetReceiver
            },
            stream_id,
            Bytes::new(),
        )));
        return;
    }

    stream.read_buffer.extend_from_slice(&payload);
    stream.wake_reader();
}

/// Handle a half-close frame.
fn on_close(context: &Arc<SessionContext>, stream_id: u64, local_initiator: bool) {
    let Some(stream) = context
        .streams
        .lock()
        .get(&stream_key(stream_id, local_initiator))
        .cloned()
    else {
        return;
    };

    let mut stream = stream.lock();
    stream.remote_closed = true;
    stream.wake_reader();

    let destroy = stream.local_closed && stream.read_buffer.is_empty();
    drop(stream);
    if destroy {
        context
            .streams
            .lock()
            .remove(&stream_key(stream_id, local_initiator));
    }
}

/// Handle a reset frame.
fn on_reset(context: &Arc<SessionContext>, stream_id: u64, local_initiator: bool) {
    let Some(stream) = context
        .streams
        .lock()
        .remove(&stream_key(stream_id, local_initiator))
    else {
        return;
    };

    let mut stream = stream.lock();
    stream.reset = true;
    stream.read_buffer.clear();
    stream.wake_reader();
}

/// Write outbound frames.
async fn writer_task(
    mut io: futures::io::WriteHalf<Box<dyn Connection>>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    context: Arc<SessionContext>,
) {
    while let Some(command) = command_rx.recv().await {
        match command {
            Command::Frame(frame) => {
                if io.write_all(&frame.encode()).await.is_err() || io.flush().await.is_err() {
                    break;
                }
            }
            Command::Shutdown => break,
        }
    }

    context.terminate();
    let _ = io.close().await;
}
