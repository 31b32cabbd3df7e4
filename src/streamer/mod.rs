//! Real-time streaming engine.
//!
//! A [`Streamer`] pulls packets from a [`PacketSource`] into a bounded queue
//! and pushes them to a [`PacketSink`] at the pace dictated by the stream's
//! PCR. Filling and sending run as two tokio tasks.

pub mod pacing;
pub mod programs;

use crate::error::{Result, TsError};
use crate::format::ts::TSPacket;
use crate::format::{PacketSink, PacketSource};
use log::{debug, error, info, trace, warn};
use pacing::{Pacing, PcrPacer, MAX_PACING_SLEEP};
use parking_lot::Mutex;
use programs::ProgramTracker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamerState {
    Idle,
    PreBuffering,
    Running,
    Stopped,
}

/// Counters reported when streaming ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub packets_sent: u64,
    pub sink_errors: u64,
    pub pcr_samples: u64,
    pub discontinuities: u64,
}

#[derive(Debug, Clone)]
pub struct StreamerOptions {
    /// Queue capacity in packets, also the pre-buffer size.
    pub buffer_capacity: usize,
    pub max_pacing_sleep: Duration,
}

impl Default for StreamerOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_pacing_sleep: MAX_PACING_SLEEP,
        }
    }
}

impl StreamerOptions {
    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }

    pub fn with_max_pacing_sleep(mut self, max_pacing_sleep: Duration) -> Self {
        self.max_pacing_sleep = max_pacing_sleep;
        self
    }
}

/// Streams packets from a source to a sink in real time.
pub struct Streamer {
    source: Option<Box<dyn PacketSource>>,
    sink: Option<Box<dyn PacketSink>>,
    options: StreamerOptions,
    state: Mutex<StreamerState>,
    end_of_source: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    fill_task: Option<JoinHandle<()>>,
    send_task: Option<JoinHandle<StreamStats>>,
}

impl Streamer {
    pub fn new(
        source: Box<dyn PacketSource>,
        sink: Box<dyn PacketSink>,
        options: StreamerOptions,
    ) -> Result<Self> {
        if options.buffer_capacity == 0 {
            return Err(TsError::Config(
                "buffer capacity must be greater than zero".into(),
            ));
        }

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            source: Some(source),
            sink: Some(sink),
            options,
            state: Mutex::new(StreamerState::Idle),
            end_of_source: Arc::new(AtomicBool::new(false)),
            shutdown,
            fill_task: None,
            send_task: None,
        })
    }

    pub fn state(&self) -> StreamerState {
        *self.state.lock()
    }

    /// True once the source reported its end or failed.
    pub fn end_of_source(&self) -> bool {
        self.end_of_source.load(Ordering::SeqCst)
    }

    /// Pre-buffers up to the queue capacity, then starts the fill and send
    /// tasks and returns.
    pub async fn start(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != StreamerState::Idle {
                return Err(TsError::InvalidState(format!(
                    "cannot start a streamer in state {:?}",
                    *state
                )));
            }
            *state = StreamerState::PreBuffering;
        }

        let (mut source, sink) = match (self.source.take(), self.sink.take()) {
            (Some(source), Some(sink)) => (source, sink),
            _ => return Err(TsError::InvalidState("streamer already used".into())),
        };

        let capacity = self.options.buffer_capacity;
        let (tx, rx) = mpsc::channel(capacity);

        let mut buffered = 0;
        while buffered < capacity {
            match source.next_packet().await {
                Ok(Some(packet)) => {
                    if tx.send(packet).await.is_err() {
                        break;
                    }
                    buffered += 1;
                }
                Ok(None) => {
                    info!("Source ended while pre-buffering");
                    self.end_of_source.store(true, Ordering::SeqCst);
                    break;
                }
                Err(e) => {
                    error!("Source failed while pre-buffering: {}", e);
                    self.end_of_source.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
        info!("Pre-buffered {} packets", buffered);

        if self.end_of_source() {
            drop(tx);
            if let Err(e) = source.close().await {
                warn!("Failed to close source: {}", e);
            }
        } else {
            self.fill_task = Some(tokio::spawn(fill_queue(
                source,
                tx,
                self.shutdown.subscribe(),
                self.end_of_source.clone(),
            )));
        }

        self.send_task = Some(tokio::spawn(send_paced(
            rx,
            sink,
            self.shutdown.subscribe(),
            self.options.max_pacing_sleep,
        )));

        *self.state.lock() = StreamerState::Running;
        Ok(())
    }

    /// Waits until the queue drained after the end of the source.
    pub async fn wait(&mut self) -> Result<StreamStats> {
        self.join().await
    }

    /// Signals both tasks to stop and waits for them.
    pub async fn stop(&mut self) -> Result<StreamStats> {
        debug!("Stopping streamer");
        self.shutdown.send_replace(true);
        self.join().await
    }

    /// Starts streaming and runs until the source is exhausted.
    pub async fn stream(&mut self) -> Result<StreamStats> {
        self.start().await?;
        self.wait().await
    }

    async fn join(&mut self) -> Result<StreamStats> {
        // handles are only cleared once joined, so a cancelled join can be retried
        if let Some(task) = self.fill_task.as_mut() {
            if let Err(e) = task.await {
                error!("Fill task failed: {}", e);
            }
            self.fill_task = None;
        }

        let stats = match self.send_task.as_mut() {
            Some(task) => {
                let joined = task.await;
                self.send_task = None;
                joined.map_err(|e| TsError::InvalidState(format!("send task failed: {}", e)))?
            }
            None => StreamStats::default(),
        };

        *self.state.lock() = StreamerState::Stopped;
        info!(
            "Streaming stopped: {} packets sent, {} sink errors",
            stats.packets_sent, stats.sink_errors
        );
        Ok(stats)
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn fill_queue(
    mut source: Box<dyn PacketSource>,
    tx: mpsc::Sender<TSPacket>,
    mut shutdown: watch::Receiver<bool>,
    end_of_source: Arc<AtomicBool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = source.next_packet() => next,
        };

        match next {
            Ok(Some(packet)) => {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    sent = tx.send(packet) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(None) => {
                info!("End of source reached");
                break;
            }
            Err(e) => {
                error!("Source failed: {}", e);
                break;
            }
        }
    }

    end_of_source.store(true, Ordering::SeqCst);
    drop(tx);
    if let Err(e) = source.close().await {
        warn!("Failed to close source: {}", e);
    }
}

async fn send_paced(
    mut rx: mpsc::Receiver<TSPacket>,
    mut sink: Box<dyn PacketSink>,
    mut shutdown: watch::Receiver<bool>,
    max_sleep: Duration,
) -> StreamStats {
    let mut programs = ProgramTracker::new();
    let mut pacer = PcrPacer::new(max_sleep);
    let mut stats = StreamStats::default();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = rx.recv() => next,
        };
        // closed and drained: the fill task is gone
        let Some(mut packet) = next else {
            break;
        };

        programs.observe(&packet);

        let mut sleep = Duration::ZERO;
        if let Some(pcr) = packet.pcr() {
            if programs.pcr_pid() == Some(packet.pid()) {
                if packet.discontinuity() {
                    debug!("Skipping PCR with discontinuity indicator on PID {}", packet.pid());
                } else {
                    stats.pcr_samples += 1;
                    match pacer.sample(pcr.ticks(), Instant::now()) {
                        Pacing::Sleep(duration) => sleep = duration,
                        Pacing::Discontinuity => {
                            stats.discontinuities += 1;
                            warn!(
                                "PCR discontinuity on PID {} at {}, resetting pacing",
                                packet.pid(),
                                pcr.ticks()
                            );
                        }
                        Pacing::Baseline => trace!("PCR baseline {}", pcr.ticks()),
                    }
                }
            }
        }

        if !sleep.is_zero() {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(sleep) => {}
            }
        }

        let sent = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            sent = sink.send(&mut packet) => sent,
        };
        match sent {
            Ok(()) => stats.packets_sent += 1,
            Err(e) => {
                stats.sink_errors += 1;
                warn!("Failed to send packet on PID {}: {}", packet.pid(), e);
            }
        }
    }

    if let Err(e) = sink.close().await {
        warn!("Failed to close sink: {}", e);
    }
    debug!(
        "Sent {} packets covering {:?} of stream time",
        stats.packets_sent,
        pacer.stream_elapsed()
    );
    stats
}
