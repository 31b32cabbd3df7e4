use crate::error::{Result, TsError};
use crate::format::ts::{TSPacket, TS_PACKET_SIZE};
use crate::format::PacketSource;

/// Resettable source replaying packets held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    packets: Vec<TSPacket>,
    position: usize,
    closed: bool,
}

impl MemorySource {
    pub fn new(packets: Vec<TSPacket>) -> Self {
        Self {
            packets,
            position: 0,
            closed: false,
        }
    }

    /// Splits a buffer of back-to-back packets. The length must be a
    /// multiple of 188.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() % TS_PACKET_SIZE != 0 {
            return Err(TsError::InvalidPacketSize(data.len() % TS_PACKET_SIZE));
        }
        let packets = data
            .chunks_exact(TS_PACKET_SIZE)
            .map(TSPacket::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(packets))
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

#[async_trait::async_trait]
impl PacketSource for MemorySource {
    async fn next_packet(&mut self) -> Result<Option<TSPacket>> {
        if self.closed {
            return Err(TsError::SourceClosed);
        }
        let packet = self.packets.get(self.position).cloned();
        if packet.is_some() {
            self.position += 1;
        }
        Ok(packet)
    }

    fn is_resettable(&self) -> bool {
        true
    }

    async fn reset(&mut self) -> Result<()> {
        if self.closed {
            return Err(TsError::SourceClosed);
        }
        self.position = 0;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
