//! Per-connection session: protocol state machine
//!
//! One session is spawned per accepted connection and owns that connection's
//! protocol progress: name prompt, room negotiation retry loop, history
//! replay, then the Active relay loop. The session never touches another
//! session's transport; everything it shares with the rest of the server goes
//! through the [`RoomRegistry`].
//!
//! Outgoing I/O is decoupled from the registry by an unbounded outbox
//! channel: a writer task drains queued lines into the socket, so broadcasts
//! from other sessions are non-blocking channel sends. Incoming I/O is a
//! bounded line codec, which rejects oversized lines instead of reading them
//! unbounded into memory.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::emoticons;
use crate::error::{RelayError, Result};
use crate::protocol;
use crate::server::history::Message;
use crate::server::registry::{Outbox, RoomId, RoomRegistry, SessionId};

/// Protocol progress of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection accepted, nothing sent yet
    Connecting,
    /// Name prompt sent, waiting for the pseudo line
    AwaitingName,
    /// Room prompt sent, retrying until a joinable room is chosen
    AwaitingRoom,
    /// Member of a room, relaying lines
    Active,
    /// Terminal: deregistered, transport released
    Closed,
}

/// Removes the session from its room when dropped.
///
/// Created at the moment the join succeeds and held for the rest of the task,
/// so deregistration runs exactly once on every exit path: clean EOF, read
/// error, and task cancellation alike. `leave` is idempotent, which keeps an
/// explicit early drop safe too.
struct DeregisterGuard {
    registry: Arc<RoomRegistry>,
    room_id: RoomId,
    session_id: SessionId,
}

impl Drop for DeregisterGuard {
    fn drop(&mut self) {
        self.registry.leave(self.room_id, self.session_id);
    }
}

/// One client connection's session
pub struct Session {
    id: SessionId,
    registry: Arc<RoomRegistry>,
    room_count: usize,
    max_line_len: usize,
    state: SessionState,
}

impl Session {
    /// Create a session against the shared registry, using the limits that
    /// were live when the connection was accepted
    pub fn new(registry: Arc<RoomRegistry>, config: &RelayConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            registry,
            room_count: config.room_count,
            max_line_len: config.max_line_len,
            state: SessionState::Connecting,
        }
    }

    /// Session id, unique per connection
    pub fn id(&self) -> SessionId {
        self.id
    }

    fn set_state(&mut self, state: SessionState) {
        debug!("session {}: {:?} -> {:?}", self.id, self.state, state);
        self.state = state;
    }

    /// Drive the session to completion over the given transport halves.
    ///
    /// Returns Ok on clean peer close (end of stream); per-connection errors
    /// are returned to the caller for logging but never affect other
    /// sessions.
    pub async fn run<R, W>(mut self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let outbox = Outbox::new(tx);
        let writer_task = tokio::spawn(write_loop(rx, writer));

        let mut lines = FramedRead::new(
            reader,
            LinesCodec::new_with_max_length(self.max_line_len),
        );

        let result = self.drive(&mut lines, &outbox).await;
        self.set_state(SessionState::Closed);

        // Dropping the outbox ends the writer task once queued lines drain
        drop(outbox);
        drop(lines);
        let _ = writer_task.await;

        result
    }

    async fn drive<R>(
        &mut self,
        lines: &mut FramedRead<R, LinesCodec>,
        outbox: &Outbox,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let Some(pseudo) = self.negotiate_name(lines, outbox).await? else {
            return Ok(());
        };
        let Some((room_id, _guard)) = self.negotiate_room(lines, outbox, &pseudo).await? else {
            return Ok(());
        };
        info!(
            "session {}: '{}' active in room {}",
            self.id, pseudo, room_id
        );
        self.relay_loop(lines, outbox, &pseudo, room_id).await
    }

    /// `AwaitingName`: prompt once, accept the first complete line verbatim.
    /// `Ok(None)` means the peer closed before sending one.
    async fn negotiate_name<R>(
        &mut self,
        lines: &mut FramedRead<R, LinesCodec>,
        outbox: &Outbox,
    ) -> Result<Option<String>>
    where
        R: AsyncRead + Unpin,
    {
        self.set_state(SessionState::AwaitingName);
        loop {
            self.send(outbox, protocol::PSEUDO_PROMPT.to_string())?;
            match self.read_line(lines).await? {
                ReadOutcome::Line(name) => return Ok(Some(name)),
                ReadOutcome::TooLong => {
                    self.notify_too_long(outbox)?;
                }
                ReadOutcome::Eof => return Ok(None),
            }
        }
    }

    /// `AwaitingRoom`: retry until a room in range with spare capacity is
    /// chosen. Bad input never terminates the session, only the transport
    /// failing does. On success the session is registered and holds its
    /// deregistration guard; the registry has already queued the history
    /// replay and the join confirmation on our outbox, under its lock, so no
    /// broadcast can slip in ahead of the replay.
    async fn negotiate_room<R>(
        &mut self,
        lines: &mut FramedRead<R, LinesCodec>,
        outbox: &Outbox,
        pseudo: &str,
    ) -> Result<Option<(RoomId, DeregisterGuard)>>
    where
        R: AsyncRead + Unpin,
    {
        self.set_state(SessionState::AwaitingRoom);
        loop {
            self.send(outbox, protocol::room_prompt(self.room_count))?;
            let line = match self.read_line(lines).await? {
                ReadOutcome::Line(line) => line,
                ReadOutcome::TooLong => {
                    self.notify_too_long(outbox)?;
                    continue;
                }
                ReadOutcome::Eof => return Ok(None),
            };

            let room_id = match protocol::parse_room_choice(&line, self.room_count) {
                Ok(room_id) => room_id,
                Err(RelayError::Protocol(_)) => {
                    self.send(outbox, protocol::NOTICE_NOT_A_NUMBER.to_string())?;
                    continue;
                }
                Err(_) => {
                    self.send(outbox, protocol::notice_unavailable(self.room_count))?;
                    continue;
                }
            };

            match self.registry.join(room_id, self.id, pseudo, outbox.clone()) {
                Ok(()) => {}
                Err(RelayError::RoomFull(_)) => {
                    debug!("session {}: room {} full, re-prompting", self.id, room_id);
                    self.send(outbox, protocol::notice_unavailable(self.room_count))?;
                    continue;
                }
                Err(e) => return Err(e),
            }

            // Registered: from here on every exit path must deregister
            let guard = DeregisterGuard {
                registry: Arc::clone(&self.registry),
                room_id,
                session_id: self.id,
            };

            self.set_state(SessionState::Active);
            return Ok(Some((room_id, guard)));
        }
    }

    /// `Active`: one full round per line: substitute emoticons, record to
    /// history, relay to the rest of the room
    async fn relay_loop<R>(
        &mut self,
        lines: &mut FramedRead<R, LinesCodec>,
        outbox: &Outbox,
        pseudo: &str,
        room_id: RoomId,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            match self.read_line(lines).await? {
                ReadOutcome::Line(text) => {
                    let text = emoticons::substitute(&text);
                    self.registry
                        .record_and_broadcast(room_id, Message::new(pseudo, text), self.id);
                }
                ReadOutcome::TooLong => {
                    warn!("session {}: oversized line dropped", self.id);
                    self.notify_too_long(outbox)?;
                }
                ReadOutcome::Eof => return Ok(()),
            }
        }
    }

    /// Read the next line. An oversized line is a recoverable outcome (the
    /// codec discards the rest of the offending line by itself); only a real
    /// I/O failure is an error.
    async fn read_line<R>(
        &mut self,
        lines: &mut FramedRead<R, LinesCodec>,
    ) -> Result<ReadOutcome>
    where
        R: AsyncRead + Unpin,
    {
        match lines.next().await {
            Some(Ok(line)) => Ok(ReadOutcome::Line(line)),
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => Ok(ReadOutcome::TooLong),
            Some(Err(LinesCodecError::Io(e))) => Err(e.into()),
            None => Ok(ReadOutcome::Eof),
        }
    }

    /// Queue a line on our own outbox; failure means the writer is gone and
    /// the session cannot make progress
    fn send(&self, outbox: &Outbox, line: String) -> Result<()> {
        if outbox.deliver(line) {
            Ok(())
        } else {
            Err(RelayError::connection("writer task gone"))
        }
    }

    fn notify_too_long(&self, outbox: &Outbox) -> Result<()> {
        self.send(outbox, protocol::notice_too_long(self.max_line_len))
    }
}

enum ReadOutcome {
    Line(String),
    TooLong,
    Eof,
}

/// Drain the session's outbox into its transport, in queue order. Exits when
/// the outbox closes or the peer stops accepting writes.
async fn write_loop<W>(mut rx: mpsc::UnboundedReceiver<String>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!("writer stopping: {}", e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}
