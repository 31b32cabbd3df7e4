use crate::error::Result;
use crate::format::ts::TSPacket;
use crate::format::PacketSink;
use log::debug;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

pub const DEFAULT_TTL: u32 = 1;

/// Sends each packet as its own UDP datagram to a unicast or multicast
/// destination.
pub struct UdpSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpSink {
    /// Binds an ephemeral local port and applies `ttl` to outgoing datagrams.
    pub async fn connect(target: SocketAddr, ttl: u32) -> Result<Self> {
        let bind_addr = if target.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        if target.ip().is_multicast() {
            if target.is_ipv4() {
                socket.set_multicast_ttl_v4(ttl)?;
            }
        } else {
            socket.set_ttl(ttl)?;
        }

        debug!(
            "UDP sink bound to {} sending to {} (ttl {})",
            socket.local_addr()?,
            target,
            ttl
        );
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

#[async_trait::async_trait]
impl PacketSink for UdpSink {
    async fn send(&mut self, packet: &mut TSPacket) -> Result<()> {
        let bytes = packet.bytes()?;
        self.socket.send_to(bytes, self.target).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::packet::tests::payload_packet;
    use crate::format::ts::TS_PACKET_SIZE;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_one_packet_per_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut sink = UdpSink::connect(receiver.local_addr().unwrap(), DEFAULT_TTL)
            .await
            .unwrap();

        let mut packet = payload_packet(0x100, 3);
        packet.set_continuity_counter(4);
        sink.send(&mut packet).await.unwrap();

        let mut buf = [0u8; 2048];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, TS_PACKET_SIZE);
        assert_eq!(buf[0], 0x47);
        assert_eq!(buf[3] & 0x0f, 4);
    }
}
