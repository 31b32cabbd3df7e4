use crate::format::ts::TSPacket;
use crate::{Result, TsError};
use std::sync::Arc;
use tokio::sync::Mutex;

pub mod sink;
pub mod source;
pub mod ts;

/// Pull-based producer of transport stream packets.
#[async_trait::async_trait]
pub trait PacketSource: Send {
    /// Next packet, or `None` once the source is exhausted.
    async fn next_packet(&mut self) -> Result<Option<TSPacket>>;

    /// Whether [`PacketSource::reset`] can rewind this source.
    fn is_resettable(&self) -> bool {
        false
    }

    /// Rewinds to the first packet.
    async fn reset(&mut self) -> Result<()> {
        Err(TsError::NotResettable)
    }

    /// Releases underlying resources. Further reads fail.
    async fn close(&mut self) -> Result<()>;
}

/// Consumer of transport stream packets.
#[async_trait::async_trait]
pub trait PacketSink: Send {
    /// Sends one packet. The packet is serialized first if it was modified.
    async fn send(&mut self, packet: &mut TSPacket) -> Result<()>;

    /// Flushes and releases the sink.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: PacketSource + ?Sized> PacketSource for Box<S> {
    async fn next_packet(&mut self) -> Result<Option<TSPacket>> {
        (**self).next_packet().await
    }

    fn is_resettable(&self) -> bool {
        (**self).is_resettable()
    }

    async fn reset(&mut self) -> Result<()> {
        (**self).reset().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

#[async_trait::async_trait]
impl<S: PacketSink + ?Sized> PacketSink for Box<S> {
    async fn send(&mut self, packet: &mut TSPacket) -> Result<()> {
        (**self).send(packet).await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

/// A source that can be listed in a sequencer and referenced from outside it.
pub type SharedSource = Arc<Mutex<Box<dyn PacketSource>>>;

/// Wraps a source for use with a [`crate::splice::SourceSequencer`].
pub fn shared<S: PacketSource + 'static>(source: S) -> SharedSource {
    Arc::new(Mutex::new(Box::new(source)))
}

pub use sink::{udp::UdpSink, WriterSink};
pub use source::{memory::MemorySource, reader::FileSource, reader::ReaderSource};
