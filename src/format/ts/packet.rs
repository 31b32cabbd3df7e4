use super::parser::TSPacketParser;
use super::pes;
use super::types::*;
use crate::error::{Result, TsError};
use bytes::{Bytes, BytesMut};
use std::ops::Range;

/// A single 188-byte transport stream packet.
///
/// Decoded fields are kept alongside the raw bytes. Structural edits mark the
/// packet dirty and the raw bytes are rebuilt lazily by [`TSPacket::bytes`].
/// Payload edits through [`TSPacket::payload_mut`] go straight into the
/// buffer.
#[derive(Debug, Clone)]
pub struct TSPacket {
    header: TSHeader,
    adaptation_field: Option<AdaptationField>,
    payload: Option<Range<usize>>,
    buffer: BytesMut,
    dirty: bool,
    serialize_count: usize,
}

impl TSPacket {
    /// Parses a packet from exactly 188 bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::from_bytes(BytesMut::from(data))
    }

    /// Parses a packet, taking ownership of the buffer.
    pub fn from_bytes(buffer: BytesMut) -> Result<Self> {
        if buffer.len() != TS_PACKET_SIZE {
            return Err(TsError::InvalidPacketSize(buffer.len()));
        }

        let parser = TSPacketParser::new();
        let header = parser.parse_header(&buffer)?;

        let mut offset = TS_HEADER_SIZE;
        let adaptation_field = if header.adaptation_field_exists {
            let (field, size) = parser.parse_adaptation_field(&buffer, offset)?;
            offset += size;
            Some(field)
        } else {
            None
        };

        let payload = if header.contains_payload {
            Some(offset..TS_PACKET_SIZE)
        } else {
            None
        };

        Ok(Self {
            header,
            adaptation_field,
            payload,
            buffer,
            dirty: false,
            serialize_count: 0,
        })
    }

    /// Builds a packet from its parts and serializes it right away, so size
    /// errors surface here.
    pub fn new(
        mut header: TSHeader,
        adaptation_field: Option<AdaptationField>,
        payload: Option<&[u8]>,
    ) -> Result<Self> {
        header.sync_byte = SYNC_BYTE;
        header.pid &= PID_MASK;
        header.continuity_counter &= 0x0f;
        header.adaptation_field_exists = adaptation_field.is_some();
        header.contains_payload = payload.is_some();

        let payload_len = payload.map_or(0, <[u8]>::len);
        if payload_len > TS_PACKET_SIZE - TS_HEADER_SIZE {
            return Err(TsError::FrameSizeInvariantViolation(
                TS_HEADER_SIZE + payload_len,
            ));
        }

        let mut buffer = BytesMut::zeroed(TS_PACKET_SIZE);
        let start = TS_PACKET_SIZE - payload_len;
        if let Some(data) = payload {
            buffer[start..].copy_from_slice(data);
        }

        let mut packet = Self {
            header,
            adaptation_field,
            payload: payload.map(|_| start..TS_PACKET_SIZE),
            buffer,
            dirty: true,
            serialize_count: 0,
        };
        packet.serialize()?;
        Ok(packet)
    }

    /// Null packet carrying 184 bytes of 0xff.
    pub fn null() -> Self {
        let mut buffer = BytesMut::from(&[0xffu8; TS_PACKET_SIZE][..]);
        buffer[0] = SYNC_BYTE;
        buffer[1] = 0x1f;
        buffer[2] = 0xff;
        buffer[3] = 0x10;
        Self {
            header: TSHeader::new(PID_NULL),
            adaptation_field: None,
            payload: Some(TS_HEADER_SIZE..TS_PACKET_SIZE),
            buffer,
            dirty: false,
            serialize_count: 0,
        }
    }

    pub fn header(&self) -> &TSHeader {
        &self.header
    }

    pub fn pid(&self) -> u16 {
        self.header.pid
    }

    pub fn continuity_counter(&self) -> u8 {
        self.header.continuity_counter
    }

    pub fn payload_unit_start(&self) -> bool {
        self.header.payload_unit_start
    }

    pub fn contains_payload(&self) -> bool {
        self.header.contains_payload
    }

    pub fn adaptation_field(&self) -> Option<&AdaptationField> {
        self.adaptation_field.as_ref()
    }

    pub fn pcr(&self) -> Option<PCR> {
        self.adaptation_field.as_ref().and_then(|field| field.pcr)
    }

    /// Discontinuity indicator of the adaptation field, false without one.
    pub fn discontinuity(&self) -> bool {
        self.adaptation_field
            .as_ref()
            .map_or(false, |field| field.discontinuity)
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.clone().map(|range| &self.buffer[range])
    }

    /// Mutable view of the payload bytes inside the packet buffer.
    pub fn payload_mut(&mut self) -> Option<&mut [u8]> {
        let range = self.payload.clone()?;
        Some(&mut self.buffer[range])
    }

    pub fn pts(&self) -> Option<u64> {
        self.payload().and_then(pes::read_pts)
    }

    /// Rewrites the PTS in place. Returns false if the payload has none.
    pub fn set_pts(&mut self, pts: u64) -> bool {
        self.payload_mut()
            .map_or(false, |payload| pes::write_pts(payload, pts))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_pid(&mut self, pid: u16) {
        self.header.pid = pid & PID_MASK;
        self.dirty = true;
    }

    pub fn set_continuity_counter(&mut self, continuity_counter: u8) {
        self.header.continuity_counter = continuity_counter & 0x0f;
        self.dirty = true;
    }

    pub fn set_payload_unit_start(&mut self, payload_unit_start: bool) {
        self.header.payload_unit_start = payload_unit_start;
        self.dirty = true;
    }

    pub fn set_transport_error(&mut self, transport_error: bool) {
        self.header.transport_error = transport_error;
        self.dirty = true;
    }

    pub fn set_transport_priority(&mut self, transport_priority: bool) {
        self.header.transport_priority = transport_priority;
        self.dirty = true;
    }

    pub fn set_scrambling_control(&mut self, scrambling_control: u8) {
        self.header.scrambling_control = scrambling_control & 0x03;
        self.dirty = true;
    }

    /// Replaces or removes the adaptation field. The header flag follows.
    pub fn set_adaptation_field(&mut self, adaptation_field: Option<AdaptationField>) {
        self.header.adaptation_field_exists = adaptation_field.is_some();
        self.adaptation_field = adaptation_field;
        self.dirty = true;
    }

    /// Mutable access to an existing adaptation field. Marks the packet dirty.
    pub fn adaptation_field_mut(&mut self) -> Option<&mut AdaptationField> {
        let field = self.adaptation_field.as_mut()?;
        self.dirty = true;
        Some(field)
    }

    /// Sets the PCR, adding an adaptation field if the packet has none.
    pub fn set_pcr(&mut self, pcr: PCR) {
        self.header.adaptation_field_exists = true;
        self.adaptation_field.get_or_insert_with(Default::default).pcr = Some(pcr);
        self.dirty = true;
    }

    /// Serialized packet bytes, re-encoding only if a field changed.
    pub fn bytes(&mut self) -> Result<&[u8]> {
        if self.dirty {
            self.serialize()?;
        }
        Ok(&self.buffer)
    }

    pub fn into_bytes(mut self) -> Result<Bytes> {
        if self.dirty {
            self.serialize()?;
        }
        Ok(self.buffer.freeze())
    }

    /// Number of times the raw bytes were rebuilt from decoded fields.
    pub fn serialize_count(&self) -> usize {
        self.serialize_count
    }

    fn serialize(&mut self) -> Result<()> {
        let payload_len = self.payload.as_ref().map_or(0, |range| range.len());
        let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);

        self.header.write_to(&mut buf)?;

        if let Some(field) = &self.adaptation_field {
            let length = MAX_ADAPTATION_FIELD_LENGTH
                .checked_sub(payload_len)
                .ok_or(TsError::AdaptationFieldOverflow {
                    required: payload_len + 1,
                    available: MAX_ADAPTATION_FIELD_LENGTH,
                })?;
            field.write_to(&mut buf, length)?;
        }

        let payload_start = buf.len();
        if let Some(range) = &self.payload {
            buf.extend_from_slice(&self.buffer[range.clone()]);
        }

        if buf.len() != TS_PACKET_SIZE {
            return Err(TsError::FrameSizeInvariantViolation(buf.len()));
        }

        self.payload = self
            .payload
            .as_ref()
            .map(|range| payload_start..payload_start + range.len());
        self.buffer = buf;
        self.dirty = false;
        self.serialize_count += 1;
        Ok(())
    }
}
