use super::types::PTS_WRAP;
use bytes::{BufMut, BytesMut};

/// Offset of the PTS field inside a PES packet that starts a TS payload.
pub const PTS_OFFSET: usize = 9;
/// Smallest payload that can hold the PES header up to the end of the PTS.
pub const MIN_PTS_PAYLOAD: usize = PTS_OFFSET + 5;

const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];
const PTS_FLAG: u8 = 0x80;

/// True when the payload begins with the PES start code prefix.
pub fn has_start_code(payload: &[u8]) -> bool {
    payload.len() >= 3 && payload[..3] == PES_START_CODE
}

/// Reads the PTS of a PES header at the start of `payload`.
///
/// Returns `None` unless the payload starts with a PES start code, is long
/// enough to hold the timestamp and has the PTS flag set. Packets are not
/// required to carry the payload unit start flag.
pub fn read_pts(payload: &[u8]) -> Option<u64> {
    if payload.len() < MIN_PTS_PAYLOAD || !has_start_code(payload) {
        return None;
    }
    if payload[7] & PTS_FLAG == 0 {
        return None;
    }

    let ts = &payload[PTS_OFFSET..MIN_PTS_PAYLOAD];
    Some(
        (((ts[0] >> 1) & 0x07) as u64) << 30
            | (ts[1] as u64) << 22
            | ((ts[2] >> 1) as u64) << 15
            | (ts[3] as u64) << 7
            | (ts[4] >> 1) as u64,
    )
}

/// Overwrites the PTS in place, keeping the 4-bit prefix of the first byte
/// and setting all marker bits. Returns false when the payload carries no PTS.
pub fn write_pts(payload: &mut [u8], pts: u64) -> bool {
    if read_pts(payload).is_none() {
        return false;
    }

    let pts = pts % PTS_WRAP;
    let ts = &mut payload[PTS_OFFSET..MIN_PTS_PAYLOAD];
    ts[0] = (ts[0] & 0xf0) | ((pts >> 29) & 0x0e) as u8 | 0x01;
    ts[1] = (pts >> 22) as u8;
    ts[2] = ((pts >> 14) & 0xfe) as u8 | 0x01;
    ts[3] = (pts >> 7) as u8;
    ts[4] = ((pts << 1) & 0xfe) as u8 | 0x01;
    true
}

/// Minimal PES header carrying an optional PTS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PESHeader {
    pub stream_id: u8,
    /// Zero means unbounded, which is allowed for video streams.
    pub packet_length: u16,
    pub pts: Option<u64>,
}

impl PESHeader {
    pub fn new(stream_id: u8) -> Self {
        Self {
            stream_id,
            ..Default::default()
        }
    }

    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts % PTS_WRAP);
        self
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&PES_START_CODE);
        buf.put_u8(self.stream_id);
        buf.put_u16(self.packet_length);
        // '10' marker, no scrambling, original
        buf.put_u8(0x81);

        match self.pts {
            Some(pts) => {
                buf.put_u8(PTS_FLAG);
                buf.put_u8(5);
                buf.put_u8(0x20 | ((pts >> 29) & 0x0e) as u8 | 0x01);
                buf.put_u16((((pts >> 14) & 0xfffe) | 0x01) as u16);
                buf.put_u16((((pts << 1) & 0xfffe) | 0x01) as u16);
            }
            None => {
                buf.put_u8(0);
                buf.put_u8(0);
            }
        }
    }
}
