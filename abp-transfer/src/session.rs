//! Async drivers that bind a state machine to a transport.
//!
//! # Architecture
//!
//! ```text
//!  source ──▶ SenderSession ── packets ──▶ [Transport] ──▶ ReceiverSession ──▶ sink
//!              ├── Sender (bit, in-flight)                  ├── Receiver (expected, last ack)
//!              └── RetransmitTimer              ◀── acks ── ┘
//! ```
//!
//! **Sender**: one chunk at a time: transmit, then `select!` over the ack
//! socket, the retransmission deadline and the cancellation token.
//!
//! **Receiver**: two modes sharing the same per-datagram handling:
//! - [`ReceiverSession::run`]: one task; read a datagram, handle it, send the
//!   ack, repeat.
//! - [`ReceiverSession::run_pipelined`]: a reader task feeds a bounded queue,
//!   the calling task owns the [`Receiver`] and the sink, and an ack-writer
//!   task drains a second bounded queue.  A slow sink then stalls only the
//!   queue, never the socket.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::event::{EventEmitter, TransferEvent};
use crate::packet::{Ack, ACK_LEN, HEADER_LEN};
use crate::receiver::{Receiver, Rejection, Verdict};
use crate::report::{ReceiverReport, SenderReport};
use crate::sender::{AckOutcome, Sender};
use crate::socket::Transport;
use crate::timer::RetransmitTimer;

/// Room for an ack plus a few bytes, so oversized junk is recognisable.
const ACK_BUF_LEN: usize = 16;

// ---------------------------------------------------------------------------
// SenderSession
// ---------------------------------------------------------------------------

/// Sends one byte stream to `peer` and completes the end-marker handshake.
pub struct SenderSession<T> {
    transport: T,
    peer: SocketAddr,
    config: TransferConfig,
    events: EventEmitter,
    cancel: CancellationToken,
}

/// Mutable state of one running send.
struct Outbound {
    machine: Sender,
    timer: RetransmitTimer,
    report: SenderReport,
}

impl<T: Transport> SenderSession<T> {
    pub fn new(transport: T, peer: SocketAddr, config: TransferConfig) -> Self {
        Self {
            transport,
            peer,
            config,
            events: EventEmitter::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Abort every blocking wait once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Receive a copy of every protocol event this session emits.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TransferEvent> {
        self.events.subscribe()
    }

    /// Transfer all of `source`, then close the stream.
    ///
    /// Returns once the receiver acknowledged the end marker.
    pub async fn run<R>(self, mut source: R) -> Result<SenderReport, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        self.config.validate()?;
        let started = Instant::now();
        let mut st = Outbound {
            machine: Sender::new(self.config.checksum),
            timer: RetransmitTimer::new(self.config.timeout),
            report: SenderReport::default(),
        };
        log::info!(
            "[saw] sending to {} (chunk={} checksum={} timeout={:?})",
            self.peer,
            self.config.chunk_size,
            self.config.checksum,
            self.config.timeout
        );

        loop {
            let chunk = read_chunk(&mut source, self.config.chunk_size).await?;
            if chunk.is_empty() {
                break;
            }
            let len = chunk.len() as u64;
            st.machine.send_chunk(chunk);
            self.exchange(&mut st).await?;
            st.report.chunks += 1;
            st.report.bytes += len;
        }

        st.machine.finish();
        log::debug!("[saw] source exhausted; → END");
        self.exchange(&mut st).await?;

        self.events.emit(TransferEvent::SessionClosed);
        st.report.final_timeout = st.timer.timeout();
        st.report.elapsed = started.elapsed();
        log::info!(
            "[saw] transfer complete: {} chunk(s), {} byte(s), {} retransmission(s)",
            st.report.chunks,
            st.report.bytes,
            st.report.retransmissions
        );
        Ok(st.report)
    }

    /// Transmit the in-flight packet and block until it is acknowledged,
    /// retransmitting on every timer expiry.
    async fn exchange(&self, st: &mut Outbound) -> Result<(), TransferError> {
        self.transmit(st).await?;
        let mut buf = [0u8; ACK_BUF_LEN];

        loop {
            let deadline = st
                .timer
                .deadline()
                .unwrap_or_else(|| Instant::now() + st.timer.timeout());

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
                result = self.transport.recv_from(&mut buf) => {
                    let (n, addr) = result?;
                    if addr != self.peer {
                        log::trace!("[saw] ignoring {n} byte(s) from {addr}");
                        continue;
                    }
                    let ack = match Ack::decode(&buf[..n]) {
                        Ok(ack) => ack,
                        Err(e) => {
                            log::debug!("[saw] ← unreadable ack: {e}");
                            st.report.stale_acks += 1;
                            continue;
                        }
                    };
                    match st.machine.on_ack(ack) {
                        AckOutcome::Advanced { rtt } | AckOutcome::Completed { rtt } => {
                            st.timer.disarm();
                            log::debug!("[saw] ← ACK {}", ack.seq());
                            self.events.emit(TransferEvent::AckReceived { seq: ack.seq(), matched: true });
                            if let Some(timeout) = rtt.and_then(|rtt| st.timer.record_rtt_sample(rtt)) {
                                log::debug!("[saw] new timeout {timeout:?}");
                                self.events.emit(TransferEvent::TimeoutAdjusted { timeout });
                            }
                            return Ok(());
                        }
                        AckOutcome::Ignored => {
                            // Keep waiting inside the same timer window.
                            log::debug!("[saw] ← stale ACK {} (state {})", ack.seq(), st.machine.state());
                            st.report.stale_acks += 1;
                            self.events.emit(TransferEvent::AckReceived { seq: ack.seq(), matched: false });
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline.into()) => {
                    st.report.timeouts += 1;
                    self.on_timeout(st)?;
                    self.transmit(st).await?;
                }
            }
        }
    }

    /// Account for a timer expiry and stage the retransmission.
    fn on_timeout(&self, st: &mut Outbound) -> Result<(), TransferError> {
        let attempts = st.machine.transmit_count();
        let seq = st.machine.in_flight().map(|e| e.packet.seq).unwrap_or(st.machine.seq());
        self.events.emit(TransferEvent::TimedOut { seq, attempt: attempts });

        if let Some(max) = self.config.max_retries {
            if attempts > max {
                log::warn!("[saw] giving up on seq={seq} after {attempts} transmission(s)");
                return Err(TransferError::RetriesExhausted {
                    chunk: st.machine.chunks_acked(),
                    seq,
                    attempts,
                });
            }
        }
        log::warn!("[saw] timeout after {:?}; resending seq={seq}", st.timer.timeout());
        st.machine.on_timeout();
        st.report.retransmissions += 1;
        Ok(())
    }

    /// Put the in-flight bytes on the wire and (re)arm the timer.
    async fn transmit(&self, st: &mut Outbound) -> Result<(), TransferError> {
        let Some(entry) = st.machine.in_flight() else {
            return Ok(());
        };
        self.transport.send_to(&entry.wire, self.peer).await?;
        st.timer.arm();
        st.report.packets_sent += 1;

        let (seq, len, attempt) = (entry.packet.seq, entry.packet.payload.len(), entry.tx_count);
        log::debug!("[saw] → DATA seq={seq} len={len} attempt={attempt}");
        self.events.emit(TransferEvent::PacketSent { seq, len, attempt });
        Ok(())
    }
}

/// Read up to `max` bytes, continuing past short reads; empty means EOF.
async fn read_chunk<R>(source: &mut R, max: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = Vec::with_capacity(max);
    source.take(max as u64).read_to_end(&mut chunk).await?;
    Ok(chunk)
}

// ---------------------------------------------------------------------------
// ReceiverSession
// ---------------------------------------------------------------------------

/// Receives one byte stream, from whichever peer speaks first.
pub struct ReceiverSession<T> {
    transport: Arc<T>,
    config: TransferConfig,
    events: EventEmitter,
    cancel: CancellationToken,
}

/// Mutable state of one running receive; owned by a single task.
struct Inbound {
    machine: Receiver,
    report: ReceiverReport,
    /// Peer the session locked onto with its first answered datagram.
    peer: Option<SocketAddr>,
}

type Datagram = (Vec<u8>, SocketAddr);

/// Where the next datagram comes from.
enum Inbox<'a, T> {
    Socket { transport: &'a T, buf: Vec<u8> },
    Queue(&'a mut mpsc::Receiver<io::Result<Datagram>>),
}

impl<T: Transport> Inbox<'_, T> {
    /// `Ok(None)` means the reader task is gone.
    async fn next(&mut self) -> io::Result<Option<Datagram>> {
        match self {
            Inbox::Socket { transport, buf } => {
                let (n, from) = transport.recv_from(buf).await?;
                Ok(Some((buf[..n].to_vec(), from)))
            }
            Inbox::Queue(rx) => rx.recv().await.transpose(),
        }
    }
}

/// Where acknowledgments go.
enum Outbox<'a, T> {
    Socket(&'a T),
    Queue(mpsc::Sender<(Ack, SocketAddr)>),
}

impl<T: Transport> Outbox<'_, T> {
    async fn send(&self, ack: Ack, to: SocketAddr) -> Result<(), TransferError> {
        match self {
            Outbox::Socket(transport) => {
                transport.send_to(&ack.encode(), to).await?;
                Ok(())
            }
            Outbox::Queue(tx) => tx
                .send((ack, to))
                .await
                .map_err(|_| TransferError::Pipeline("ack writer stopped".into())),
        }
    }
}

impl<T: Transport> ReceiverSession<T> {
    pub fn new(transport: T, config: TransferConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            events: EventEmitter::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TransferEvent> {
        self.events.subscribe()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Largest datagram worth reading: header, full chunk, one spare byte.
    fn datagram_capacity(&self) -> usize {
        HEADER_LEN + self.config.chunk_size + 1
    }

    fn start(&self) -> Result<Inbound, TransferError> {
        self.config.validate()?;
        log::info!(
            "[saw] receiving on {} (chunk={} checksum={})",
            self.transport
                .local_addr()
                .map_or_else(|_| "?".to_string(), |a| a.to_string()),
            self.config.chunk_size,
            self.config.checksum
        );
        Ok(Inbound {
            machine: Receiver::new(self.config.checksum, self.config.chunk_size),
            report: ReceiverReport::default(),
            peer: None,
        })
    }

    /// Receive the stream on the calling task, writing it to `sink`.
    pub async fn run<W>(self, mut sink: W) -> Result<ReceiverReport, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let mut st = self.start()?;
        let mut inbox = Inbox::Socket {
            transport: &*self.transport,
            buf: vec![0u8; self.datagram_capacity()],
        };
        let outbox = Outbox::Socket(&*self.transport);

        self.serve(&mut st, &mut sink, &mut inbox, &outbox).await?;
        st.report.elapsed = started.elapsed();
        Ok(st.report)
    }

    /// Shared receive loop: until closed, then linger.
    async fn serve<W>(
        &self,
        st: &mut Inbound,
        sink: &mut W,
        inbox: &mut Inbox<'_, T>,
        outbox: &Outbox<'_, T>,
    ) -> Result<(), TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        while !st.machine.is_closed() {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
                next = inbox.next() => next?,
                _ = sleep_or_pending(self.config.idle_timeout) => {
                    log::warn!("[saw] idle for {:?}; giving up", self.config.idle_timeout);
                    return Err(TransferError::IdleTimeout);
                }
            };
            let Some((datagram, from)) = next else {
                return Err(TransferError::Pipeline("socket reader stopped".into()));
            };
            self.handle(st, sink, &datagram, from, outbox).await?;
        }
        sink.flush().await?;
        log::info!(
            "[saw] END received; {} chunk(s), {} byte(s) written",
            st.report.chunks,
            st.report.bytes
        );

        if self.config.linger.is_zero() {
            return Ok(());
        }
        let until = tokio::time::Instant::now() + self.config.linger;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep_until(until) => break,
                next = inbox.next() => next?,
            };
            let Some((datagram, from)) = next else {
                break;
            };
            self.handle(st, sink, &datagram, from, outbox).await?;
        }
        Ok(())
    }

    /// Run one datagram through the receiver machine and act on the verdict.
    async fn handle<W>(
        &self,
        st: &mut Inbound,
        sink: &mut W,
        datagram: &[u8],
        from: SocketAddr,
        outbox: &Outbox<'_, T>,
    ) -> Result<(), TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        if st.peer.is_some_and(|peer| peer != from) {
            st.report.foreign_datagrams += 1;
            log::trace!("[saw] ignoring {} byte(s) from {from}", datagram.len());
            return Ok(());
        }

        let was_closed = st.machine.is_closed();
        let verdict = st.machine.on_datagram(datagram);
        match &verdict {
            Verdict::Accepted { payload, ack } => {
                // Append before acknowledging: an acked chunk is in the sink.
                sink.write_all(payload).await?;
                st.report.chunks += 1;
                st.report.bytes += payload.len() as u64;
                log::debug!("[saw] ← DATA seq={} len={} accepted", ack.seq(), payload.len());
                self.events.emit(TransferEvent::ChunkAccepted {
                    seq: ack.seq(),
                    len: payload.len(),
                });
            }
            Verdict::Rejected { seq, reason, ack } => {
                match reason {
                    Rejection::Corrupt => {
                        st.report.corrupt_packets += 1;
                        self.events.emit(TransferEvent::CorruptionDetected { seq: *seq });
                    }
                    Rejection::Duplicate => {
                        st.report.duplicate_packets += 1;
                        self.events.emit(TransferEvent::DuplicatePacket { seq: *seq });
                    }
                }
                log::debug!("[saw] ← DATA seq={seq} rejected ({reason:?}); repeating ACK {}", ack.seq());
            }
            Verdict::Closed { .. } => {
                if !was_closed {
                    self.events.emit(TransferEvent::SessionClosed);
                }
                log::debug!("[saw] ← END");
            }
            Verdict::Malformed(e) => {
                st.report.malformed_datagrams += 1;
                log::debug!("[saw] dropping datagram from {from}: {e}");
                self.events.emit(TransferEvent::MalformedDatagram {
                    len: datagram.len(),
                });
            }
            Verdict::Ignored => {
                log::trace!("[saw] ignoring data after close");
            }
        }

        let Some(ack) = verdict.ack() else {
            return Ok(());
        };
        st.peer.get_or_insert(from);
        outbox.send(ack, from).await?;
        st.report.acks_sent += 1;
        log::debug!("[saw] → ACK {}", ack.seq());
        self.events.emit(TransferEvent::AckSent { seq: ack.seq() });
        Ok(())
    }
}

impl<T: Transport + 'static> ReceiverSession<T> {
    /// Receive the stream with socket reads and ack writes on their own tasks.
    ///
    /// The receiver machine and `sink` stay on the calling task; the three
    /// parts talk only through bounded FIFO queues of `queue_depth` entries.
    pub async fn run_pipelined<W>(self, mut sink: W) -> Result<ReceiverReport, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let mut st = self.start()?;
        let depth = self.config.queue_depth;
        let (packet_tx, mut packet_rx) = mpsc::channel(depth);
        let (ack_tx, ack_rx) = mpsc::channel(depth);
        let stop = self.cancel.child_token();

        let reader = tokio::spawn(read_datagrams(
            Arc::clone(&self.transport),
            self.datagram_capacity(),
            packet_tx,
            stop.clone(),
        ));
        let writer = tokio::spawn(write_acks(Arc::clone(&self.transport), ack_rx));

        let outcome = {
            let mut inbox = Inbox::Queue(&mut packet_rx);
            let outbox = Outbox::Queue(ack_tx);
            self.serve(&mut st, &mut sink, &mut inbox, &outbox).await
            // `outbox` drops here, letting the writer drain and exit.
        };

        stop.cancel();
        drop(packet_rx);
        let written = join_task(writer).await;
        // The reader only stops on cancellation or a failed socket read, and
        // a failed read has already surfaced through the queue.
        let _ = join_task(reader).await;

        outcome?;
        written?;
        st.report.elapsed = started.elapsed();
        Ok(st.report)
    }
}

/// Reader task: socket → bounded queue, until stopped.
async fn read_datagrams<T: Transport>(
    transport: Arc<T>,
    capacity: usize,
    tx: mpsc::Sender<io::Result<Datagram>>,
    stop: CancellationToken,
) -> Result<(), TransferError> {
    let mut buf = vec![0u8; capacity];
    loop {
        let item = tokio::select! {
            _ = stop.cancelled() => return Ok(()),
            result = transport.recv_from(&mut buf) => result.map(|(n, from)| (buf[..n].to_vec(), from)),
        };
        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            return Ok(());
        }
    }
}

/// Ack-writer task: bounded queue → socket, until the queue closes.
async fn write_acks<T: Transport>(
    transport: Arc<T>,
    mut rx: mpsc::Receiver<(Ack, SocketAddr)>,
) -> Result<(), TransferError> {
    while let Some((ack, to)) = rx.recv().await {
        let sent = transport.send_to(&ack.encode(), to).await?;
        debug_assert_eq!(sent, ACK_LEN);
    }
    Ok(())
}

async fn join_task(handle: JoinHandle<Result<(), TransferError>>) -> Result<(), TransferError> {
    handle
        .await
        .map_err(|e| TransferError::Pipeline(e.to_string()))?
}

/// Sleep for `duration`, or forever when `None`.
fn sleep_or_pending(duration: Option<Duration>) -> impl Future<Output = ()> {
    async move {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_chunk_splits_source() {
        let data = vec![7u8; 2500];
        let mut source = &data[..];
        let mut sizes = Vec::new();
        loop {
            let chunk = read_chunk(&mut source, 1024).await.unwrap();
            if chunk.is_empty() {
                break;
            }
            sizes.push(chunk.len());
        }
        assert_eq!(sizes, vec![1024, 1024, 452]);
    }

    #[tokio::test]
    async fn read_chunk_on_empty_source_is_empty() {
        let mut source: &[u8] = &[];
        assert!(read_chunk(&mut source, 16).await.unwrap().is_empty());
    }
}
