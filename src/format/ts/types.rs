use crate::error::{Result, TsError};
use bytes::{BufMut, BytesMut};
use std::time::Duration;

// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_NULL: u16 = 0x1fff;
pub const PID_MASK: u16 = 0x1fff;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;

// Constants
pub const SYNC_BYTE: u8 = 0x47;
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
/// Bytes available to the adaptation field after the header and its own length byte.
pub const MAX_ADAPTATION_FIELD_LENGTH: usize = TS_PACKET_SIZE - TS_HEADER_SIZE - 1;
pub const PTS_HZ: u64 = 90_000;
pub const PCR_HZ: u64 = 27_000_000;
pub const PCR_BASE_MAX: u64 = (1 << 33) - 1;
pub const PCR_EXTENSION_MAX: u16 = 0x1ff;
/// Number of 27 MHz ticks after which the PCR wraps around.
pub const PCR_WRAP: u64 = (PCR_BASE_MAX + 1) * 300;
/// Number of 90 kHz ticks after which a PTS wraps around.
pub const PTS_WRAP: u64 = 1 << 33;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TSHeader {
    pub sync_byte: u8, // Always 0x47
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

impl Default for TSHeader {
    fn default() -> Self {
        Self {
            sync_byte: SYNC_BYTE,
            transport_error: false,
            payload_unit_start: false,
            transport_priority: false,
            pid: PID_NULL,
            scrambling_control: 0,
            adaptation_field_exists: false,
            contains_payload: true,
            continuity_counter: 0,
        }
    }
}

impl TSHeader {
    /// Creates a payload-only header for `pid`.
    pub fn new(pid: u16) -> Self {
        Self {
            pid: pid & PID_MASK,
            ..Default::default()
        }
    }

    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(SYNC_BYTE);

        let mut b1 = 0u8;
        if self.transport_error {
            b1 |= 0x80;
        }
        if self.payload_unit_start {
            b1 |= 0x40;
        }
        if self.transport_priority {
            b1 |= 0x20;
        }
        b1 |= ((self.pid >> 8) & 0x1f) as u8;
        buf.put_u8(b1);

        buf.put_u8((self.pid & 0xff) as u8);

        let mut b3 = (self.scrambling_control & 0x03) << 6;
        if self.adaptation_field_exists {
            b3 |= 0x20;
        }
        if self.contains_payload {
            b3 |= 0x10;
        }
        b3 |= self.continuity_counter & 0x0f;
        buf.put_u8(b3);

        Ok(())
    }
}

/// Program Clock Reference: a 33-bit 90 kHz base plus a 9-bit 27 MHz extension.
///
/// The clock value in 27 MHz ticks is `base * 300 + extension`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PCR {
    base: u64,
    extension: u16,
}

impl PCR {
    /// Builds a PCR from its raw fields, rejecting out-of-range values.
    pub fn new(base: u64, extension: u16) -> Result<Self> {
        if base > PCR_BASE_MAX || extension > PCR_EXTENSION_MAX {
            return Err(TsError::InvalidPcr { base, extension });
        }
        Ok(Self { base, extension })
    }

    /// Decomposes a 27 MHz tick count into base and extension, wrapping at [`PCR_WRAP`].
    pub fn from_ticks(ticks: u64) -> Self {
        let ticks = ticks % PCR_WRAP;
        Self {
            base: ticks / 300,
            extension: (ticks % 300) as u16,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn extension(&self) -> u16 {
        self.extension
    }

    /// Clock value in 27 MHz ticks.
    pub fn ticks(&self) -> u64 {
        self.base * 300 + self.extension as u64
    }

    pub fn as_duration(&self) -> Duration {
        ticks_to_duration(self.ticks())
    }

    /// Decodes the 6-byte wire layout: 33-bit base, 6 reserved bits, 9-bit extension.
    pub fn decode(data: &[u8; 6]) -> Self {
        let bits = ((data[0] as u64) << 40)
            | ((data[1] as u64) << 32)
            | ((data[2] as u64) << 24)
            | ((data[3] as u64) << 16)
            | ((data[4] as u64) << 8)
            | (data[5] as u64);
        Self {
            base: (bits >> 15) & PCR_BASE_MAX,
            extension: (bits & 0x1ff) as u16,
        }
    }

    /// Encodes into the 6-byte wire layout with the reserved bits set.
    pub fn encode(&self) -> [u8; 6] {
        let bits = (self.base & PCR_BASE_MAX) << 15 | 0x3f << 9 | (self.extension & 0x1ff) as u64;
        let bytes = bits.to_be_bytes();
        [bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
    }
}

/// Optional header extension carrying clock references, splicing and private data.
///
/// Presence flags for PCR, OPCR, splice countdown, private data and extension
/// are derived from the corresponding `Option` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptationField {
    pub discontinuity: bool,
    pub random_access: bool,
    pub es_priority: bool,
    pub pcr: Option<PCR>,
    pub opcr: Option<PCR>,
    pub splice_countdown: Option<i8>,
    pub private_data: Option<Vec<u8>>,
    pub extension: Option<Vec<u8>>,
}

impl AdaptationField {
    pub fn with_pcr(pcr: PCR) -> Self {
        Self {
            pcr: Some(pcr),
            ..Default::default()
        }
    }

    pub fn pcr_flag(&self) -> bool {
        self.pcr.is_some()
    }

    pub fn opcr_flag(&self) -> bool {
        self.opcr.is_some()
    }

    pub fn splicing_point_flag(&self) -> bool {
        self.splice_countdown.is_some()
    }

    pub fn private_data_flag(&self) -> bool {
        self.private_data.is_some()
    }

    pub fn extension_flag(&self) -> bool {
        self.extension.is_some()
    }

    /// True when the field carries no flags and no data, i.e. it can be
    /// encoded as a single zero length byte.
    pub fn is_empty(&self) -> bool {
        self.flags() == 0
    }

    pub fn flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.discontinuity {
            flags |= 0x80;
        }
        if self.random_access {
            flags |= 0x40;
        }
        if self.es_priority {
            flags |= 0x20;
        }
        if self.pcr_flag() {
            flags |= 0x10;
        }
        if self.opcr_flag() {
            flags |= 0x08;
        }
        if self.splicing_point_flag() {
            flags |= 0x04;
        }
        if self.private_data_flag() {
            flags |= 0x02;
        }
        if self.extension_flag() {
            flags |= 0x01;
        }
        flags
    }

    /// Bytes needed for the flag byte and every present sub-field, excluding
    /// the length byte and stuffing.
    pub fn encoded_len(&self) -> usize {
        let mut n = 1;
        if self.pcr.is_some() {
            n += 6;
        }
        if self.opcr.is_some() {
            n += 6;
        }
        if self.splice_countdown.is_some() {
            n += 1;
        }
        if let Some(data) = &self.private_data {
            n += 1 + data.len();
        }
        if let Some(data) = &self.extension {
            n += 1 + data.len();
        }
        n
    }

    /// Writes the length byte followed by `length` bytes of field content,
    /// zero-padding whatever the sub-fields leave unused.
    pub fn write_to(&self, buf: &mut BytesMut, length: usize) -> Result<()> {
        if length > MAX_ADAPTATION_FIELD_LENGTH {
            return Err(TsError::AdaptationFieldOverflow {
                required: length,
                available: MAX_ADAPTATION_FIELD_LENGTH,
            });
        }

        if length == 0 {
            if !self.is_empty() {
                return Err(TsError::AdaptationFieldOverflow {
                    required: self.encoded_len(),
                    available: 0,
                });
            }
            buf.put_u8(0);
            return Ok(());
        }

        let required = self.encoded_len();
        if required > length {
            return Err(TsError::AdaptationFieldOverflow {
                required,
                available: length,
            });
        }

        buf.put_u8(length as u8);
        buf.put_u8(self.flags());

        if let Some(pcr) = &self.pcr {
            buf.put_slice(&pcr.encode());
        }
        if let Some(opcr) = &self.opcr {
            buf.put_slice(&opcr.encode());
        }
        if let Some(countdown) = self.splice_countdown {
            buf.put_i8(countdown);
        }
        if let Some(data) = &self.private_data {
            buf.put_u8(data.len() as u8);
            buf.put_slice(data);
        }
        if let Some(data) = &self.extension {
            buf.put_u8(data.len() as u8);
            buf.put_slice(data);
        }

        buf.put_bytes(0, length - required);
        Ok(())
    }
}

// Time conversion utilities
pub fn ticks_to_duration(ticks: u64) -> Duration {
    Duration::from_nanos(((ticks as u128 * 1_000) / 27) as u64)
}

pub fn duration_to_ticks(time: Duration) -> u64 {
    (time.as_nanos() * PCR_HZ as u128 / 1_000_000_000) as u64
}

pub fn pts_to_time(pts: u64) -> Duration {
    Duration::from_nanos(((pts as u128 * 1_000_000_000) / PTS_HZ as u128) as u64)
}

pub fn time_to_pts(time: Duration) -> u64 {
    (time.as_nanos() * PTS_HZ as u128 / 1_000_000_000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_header_write() {
        let header = TSHeader {
            payload_unit_start: true,
            pid: 0x1001,
            adaptation_field_exists: true,
            continuity_counter: 7,
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x47, 0x50, 0x01, 0x37]);
    }

    #[test]
    fn test_pcr_wire_layout() {
        let pcr = PCR::new(0x1_2345_6789, 0x123).unwrap();
        let bytes = pcr.encode();
        // base occupies the top 33 bits, reserved bits are all ones
        assert_eq!(bytes[4] & 0x7e, 0x7e);
        assert_eq!(PCR::decode(&bytes), pcr);
        assert_eq!(pcr.ticks(), 0x1_2345_6789 * 300 + 0x123);
    }

    #[test]
    fn test_pcr_rejects_out_of_range() {
        assert!(PCR::new(PCR_BASE_MAX + 1, 0).is_err());
        assert!(PCR::new(0, 512).is_err());
    }

    #[test]
    fn test_pcr_from_ticks_wraps() {
        let pcr = PCR::from_ticks(PCR_WRAP + 1_000);
        assert_eq!(pcr.ticks(), 1_000);
        assert_eq!(pcr.base(), 3);
        assert_eq!(pcr.extension(), 100);
    }

    #[quickcheck]
    fn prop_pcr_round_trip(base: u64, extension: u16) -> bool {
        let base = base & PCR_BASE_MAX;
        let extension = extension % (PCR_EXTENSION_MAX + 1);
        let pcr = PCR::new(base, extension).unwrap();
        let decoded = PCR::decode(&pcr.encode());
        decoded.ticks() == base * 300 + extension as u64
    }

    #[test]
    fn test_adaptation_field_overflow() {
        let field = AdaptationField {
            pcr: Some(PCR::from_ticks(1)),
            opcr: Some(PCR::from_ticks(2)),
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        match field.write_to(&mut buf, 8) {
            Err(TsError::AdaptationFieldOverflow { required, available }) => {
                assert_eq!(required, 13);
                assert_eq!(available, 8);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_adaptation_field_stuffing_is_zeroed() {
        let field = AdaptationField::with_pcr(PCR::from_ticks(27_000_000));
        let mut buf = BytesMut::new();
        field.write_to(&mut buf, 10).unwrap();
        assert_eq!(buf.len(), 11);
        assert_eq!(buf[0], 10);
        assert_eq!(buf[1], 0x10);
        assert_eq!(&buf[8..], &[0, 0, 0]);
    }

    #[test]
    fn test_time_conversions() {
        assert_eq!(ticks_to_duration(27_000), Duration::from_millis(1));
        assert_eq!(duration_to_ticks(Duration::from_millis(100)), 2_700_000);
        assert_eq!(pts_to_time(90_000), Duration::from_secs(1));
        assert_eq!(time_to_pts(Duration::from_millis(10)), 900);
    }
}
