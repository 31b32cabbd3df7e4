#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::net::UdpSocket;
    use tokio::time::{timeout, Duration, Instant};
    use tscast::error::Result;
    use tscast::format::ts::{AdaptationField, PESHeader, TSHeader, TSPacket, PCR, PID_PAT};
    use tscast::format::{shared, FileSource, MemorySource, PacketSink, UdpSink};
    use tscast::splice::{LoopMode, SourceSequencer};
    use tscast::streamer::{Streamer, StreamerOptions};

    const PMT_PID: u16 = 0x1000;
    const VIDEO_PID: u16 = 0x100;
    const FRAME_TICKS: u64 = 40 * 27_000;
    const FRAME_PTS: u64 = 3_600;

    fn section(table_id: u8, id: u16, body: &[u8]) -> Vec<u8> {
        let section_length = 5 + body.len() + 4;
        let mut data = vec![
            0x00,
            table_id,
            0xb0 | ((section_length >> 8) as u8 & 0x0f),
            section_length as u8,
            (id >> 8) as u8,
            id as u8,
            0xc1,
            0x00,
            0x00,
        ];
        data.extend_from_slice(body);
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.resize(184, 0xff);
        data
    }

    fn psi_packet(pid: u16, payload: &[u8]) -> TSPacket {
        let mut header = TSHeader::new(pid);
        header.payload_unit_start = true;
        TSPacket::new(header, None, Some(payload)).unwrap()
    }

    fn pat() -> TSPacket {
        let mut body = vec![0x00, 0x01];
        body.extend_from_slice(&(0xe000 | PMT_PID).to_be_bytes());
        psi_packet(PID_PAT, &section(0x00, 1, &body))
    }

    fn pmt() -> TSPacket {
        let mut body = Vec::new();
        body.extend_from_slice(&(0xe000 | VIDEO_PID).to_be_bytes());
        body.extend_from_slice(&[0xf0, 0x00, 0x1b]);
        body.extend_from_slice(&(0xe000 | VIDEO_PID).to_be_bytes());
        body.extend_from_slice(&[0xf0, 0x00]);
        psi_packet(PMT_PID, &section(0x02, 1, &body))
    }

    /// Video packet starting a PES, with a PCR in the adaptation field.
    fn frame(continuity_counter: u8, pcr: u64, pts: u64) -> TSPacket {
        let mut header = TSHeader::new(VIDEO_PID);
        header.payload_unit_start = true;
        header.continuity_counter = continuity_counter;

        let mut payload = BytesMut::new();
        PESHeader::new(0xe0).with_pts(pts).write_to(&mut payload);
        payload.resize(100, 0x55);

        let field = AdaptationField {
            random_access: true,
            pcr: Some(PCR::from_ticks(pcr)),
            ..Default::default()
        };
        TSPacket::new(header, Some(field), Some(&payload[..])).unwrap()
    }

    /// PAT, PMT and `frames` paced video packets.
    fn asset(pcr_start: u64, pts_start: u64, frames: u64) -> Vec<TSPacket> {
        let mut packets = vec![pat(), pmt()];
        for i in 0..frames {
            packets.push(frame(
                (i % 16) as u8,
                pcr_start + i * FRAME_TICKS,
                pts_start + i * FRAME_PTS,
            ));
        }
        packets
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        packets: Arc<Mutex<Vec<TSPacket>>>,
    }

    #[async_trait::async_trait]
    impl PacketSink for RecordingSink {
        async fn send(&mut self, packet: &mut TSPacket) -> Result<()> {
            let reparsed = TSPacket::parse(packet.bytes()?)?;
            self.packets.lock().push(reparsed);
            Ok(())
        }
    }

    fn assert_continuous(packets: &[TSPacket]) {
        let mut last: HashMap<u16, u8> = HashMap::new();
        for packet in packets {
            if let Some(previous) = last.insert(packet.pid(), packet.continuity_counter()) {
                assert_eq!(
                    packet.continuity_counter(),
                    (previous + 1) % 16,
                    "discontinuity on PID {}",
                    packet.pid()
                );
            }
        }
    }

    fn video_clock(packets: &[TSPacket]) -> Vec<(u64, u64)> {
        packets
            .iter()
            .filter(|p| p.pid() == VIDEO_PID)
            .map(|p| (p.pcr().unwrap().ticks(), p.pts().unwrap()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_splice_two_assets_end_to_end() {
        let sequencer = SourceSequencer::builder()
            .add_source(MemorySource::new(asset(1_000_000, 90_000, 10)))
            .add_source(MemorySource::new(asset(500_000_000, 5_000_000, 10)))
            .with_splice_gap(Duration::from_millis(40))
            .build()
            .await
            .unwrap();

        let sink = RecordingSink::default();
        let mut streamer = Streamer::new(
            Box::new(sequencer),
            Box::new(sink.clone()),
            StreamerOptions::default().with_buffer_capacity(8),
        )
        .unwrap();

        let started = Instant::now();
        let stats = streamer.stream().await.unwrap();
        let elapsed = started.elapsed();

        let packets = sink.packets.lock().clone();
        assert_eq!(packets.len(), 24);
        assert_eq!(stats.packets_sent, 24);
        assert_eq!(stats.discontinuities, 0);
        assert_continuous(&packets);

        let clock = video_clock(&packets);
        assert_eq!(clock.len(), 20);
        for (i, (pcr, pts)) in clock.iter().enumerate() {
            assert_eq!(*pcr, 1_000_000 + i as u64 * FRAME_TICKS);
            assert_eq!(*pts, 90_000 + i as u64 * FRAME_PTS);
        }

        // 19 frame intervals of 40ms
        assert!(elapsed >= Duration::from_millis(760), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(800), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_splice_without_gap_repeats_boundary_clock() {
        let sequencer = SourceSequencer::builder()
            .add_source(MemorySource::new(asset(0, 0, 3)))
            .add_source(MemorySource::new(asset(9_999_999, 777, 3)))
            .build()
            .await
            .unwrap();

        let sink = RecordingSink::default();
        let mut streamer = Streamer::new(
            Box::new(sequencer),
            Box::new(sink.clone()),
            StreamerOptions::default(),
        )
        .unwrap();
        let stats = streamer.stream().await.unwrap();

        let packets = sink.packets.lock().clone();
        assert_continuous(&packets);
        let pcrs: Vec<u64> = video_clock(&packets).iter().map(|c| c.0).collect();
        assert_eq!(
            pcrs,
            vec![0, FRAME_TICKS, 2 * FRAME_TICKS, 2 * FRAME_TICKS, 3 * FRAME_TICKS, 4 * FRAME_TICKS]
        );
        // the repeated value resets pacing instead of producing a negative sleep
        assert_eq!(stats.discontinuities, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_asset_twice() {
        let sequencer = SourceSequencer::looping(
            MemorySource::new(asset(27_000_000, 0, 5)),
            LoopMode::Count(2),
        )
        .await
        .unwrap();

        let sink = RecordingSink::default();
        let mut streamer = Streamer::new(
            Box::new(sequencer),
            Box::new(sink.clone()),
            StreamerOptions::default().with_buffer_capacity(4),
        )
        .unwrap();
        streamer.stream().await.unwrap();

        let packets = sink.packets.lock().clone();
        assert_eq!(packets.len(), 14);
        assert_continuous(&packets);

        let pcrs: Vec<u64> = video_clock(&packets).iter().map(|c| c.0).collect();
        assert!(pcrs.windows(2).all(|w| w[1] >= w[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sources_added_before_start() {
        let first = shared(MemorySource::new(asset(0, 0, 2)));
        let second = shared(MemorySource::new(asset(0, 0, 3)));

        let sequencer = SourceSequencer::builder()
            .add_shared(first.clone())
            .build()
            .await
            .unwrap();
        sequencer
            .handle()
            .update_sources(vec![first, second])
            .await
            .unwrap();

        let sink = RecordingSink::default();
        let mut streamer = Streamer::new(
            Box::new(sequencer),
            Box::new(sink.clone()),
            StreamerOptions::default(),
        )
        .unwrap();
        streamer.stream().await.unwrap();

        let packets = sink.packets.lock().clone();
        assert_eq!(packets.len(), 4 + 5);
        assert_continuous(&packets);
    }

    #[tokio::test]
    async fn test_file_to_udp() {
        // no PMT, so packets are sent unpaced
        let mut data = Vec::new();
        for i in 0..5u64 {
            data.extend_from_slice(frame(i as u8, i * FRAME_TICKS, i * FRAME_PTS).bytes().unwrap());
        }
        let path = std::env::temp_dir().join(format!("tscast-it-{}.ts", std::process::id()));
        tokio::fs::write(&path, &data).await.unwrap();

        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sink = UdpSink::connect(receiver.local_addr().unwrap(), 1).await.unwrap();
        let source = FileSource::open(&path).await.unwrap();

        let mut streamer = Streamer::new(
            Box::new(source),
            Box::new(sink),
            StreamerOptions::default(),
        )
        .unwrap();
        let stats = streamer.stream().await.unwrap();
        assert_eq!(stats.packets_sent, 5);

        let mut buf = [0u8; 1500];
        for i in 0..5u8 {
            let len = timeout(Duration::from_secs(5), receiver.recv(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(len, 188);
            let packet = TSPacket::parse(&buf[..len]).unwrap();
            assert_eq!(packet.continuity_counter(), i);
        }

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
