//! Packet sinks.

pub mod udp;

use crate::error::Result;
use crate::format::ts::TSPacket;
use crate::format::PacketSink;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub use udp::UdpSink;

/// Writes serialized packets back to back into any async writer.
pub struct WriterSink<W: AsyncWrite + Unpin + Send> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> PacketSink for WriterSink<W> {
    async fn send(&mut self, packet: &mut TSPacket) -> Result<()> {
        self.writer.write_all(packet.bytes()?).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}
