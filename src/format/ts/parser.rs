use super::types::*;
use crate::error::{Result, TsError};

/// Stateless decoder for the fixed TS header and the adaptation field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TSPacketParser;

impl TSPacketParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_header(&self, data: &[u8]) -> Result<TSHeader> {
        if data.len() < TS_HEADER_SIZE {
            return Err(TsError::InvalidPacketSize(data.len()));
        }

        if data[0] != SYNC_BYTE {
            return Err(TsError::InvalidSyncByte(data[0]));
        }

        Ok(TSHeader {
            sync_byte: data[0],
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }

    /// Parses the adaptation field starting at `offset` (the length byte).
    ///
    /// Returns the field and the number of bytes it occupies including the
    /// length byte. A zero length yields an empty field of one byte.
    pub fn parse_adaptation_field(
        &self,
        data: &[u8],
        offset: usize,
    ) -> Result<(AdaptationField, usize)> {
        let length = *data
            .get(offset)
            .ok_or_else(|| TsError::InvalidAdaptationField("length byte missing".into()))?
            as usize;

        if length > MAX_ADAPTATION_FIELD_LENGTH {
            return Err(TsError::InvalidAdaptationField(format!(
                "length {} exceeds {}",
                length, MAX_ADAPTATION_FIELD_LENGTH
            )));
        }

        if length == 0 {
            return Ok((AdaptationField::default(), 1));
        }

        let end = offset + 1 + length;
        if data.len() < end {
            return Err(TsError::InvalidAdaptationField("field too short".into()));
        }

        let flags = data[offset + 1];
        let mut field = AdaptationField {
            discontinuity: (flags & 0x80) != 0,
            random_access: (flags & 0x40) != 0,
            es_priority: (flags & 0x20) != 0,
            ..Default::default()
        };

        let mut pos = offset + 2;

        if (flags & 0x10) != 0 {
            field.pcr = Some(Self::read_clock(data, pos, end, "PCR")?);
            pos += 6;
        }

        if (flags & 0x08) != 0 {
            field.opcr = Some(Self::read_clock(data, pos, end, "OPCR")?);
            pos += 6;
        }

        if (flags & 0x04) != 0 {
            if pos + 1 > end {
                return Err(TsError::InvalidAdaptationField(
                    "splice countdown too short".into(),
                ));
            }
            field.splice_countdown = Some(data[pos] as i8);
            pos += 1;
        }

        if (flags & 0x02) != 0 {
            let (private_data, next) = Self::read_length_prefixed(data, pos, end, "private data")?;
            field.private_data = Some(private_data);
            pos = next;
        }

        if (flags & 0x01) != 0 {
            let (extension, _) = Self::read_length_prefixed(data, pos, end, "extension")?;
            field.extension = Some(extension);
        }

        Ok((field, 1 + length))
    }

    fn read_clock(data: &[u8], pos: usize, end: usize, name: &str) -> Result<PCR> {
        if pos + 6 > end {
            return Err(TsError::InvalidAdaptationField(format!(
                "{} data too short",
                name
            )));
        }
        let mut raw = [0u8; 6];
        raw.copy_from_slice(&data[pos..pos + 6]);
        Ok(PCR::decode(&raw))
    }

    fn read_length_prefixed(
        data: &[u8],
        pos: usize,
        end: usize,
        name: &str,
    ) -> Result<(Vec<u8>, usize)> {
        if pos + 1 > end {
            return Err(TsError::InvalidAdaptationField(format!(
                "{} length byte missing",
                name
            )));
        }
        let length = data[pos] as usize;
        let start = pos + 1;
        if start + length > end {
            return Err(TsError::InvalidAdaptationField(format!(
                "{} too short",
                name
            )));
        }
        Ok((data[start..start + length].to_vec(), start + length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_ts_header() {
        let parser = TSPacketParser::new();
        let data = [
            0x47, // Sync byte
            0x40, // Payload unit start indicator set
            0x00, // PID (high bits)
            0x1a, // Payload only, continuity counter 10
        ];

        let header = parser.parse_header(&data).unwrap();
        assert_eq!(header.sync_byte, 0x47);
        assert!(header.payload_unit_start);
        assert_eq!(header.pid, 0);
        assert!(header.contains_payload);
        assert!(!header.adaptation_field_exists);
        assert_eq!(header.continuity_counter, 10);
    }

    #[test]
    fn test_parse_header_rejects_bad_sync() {
        let parser = TSPacketParser::new();
        match parser.parse_header(&[0x48, 0, 0, 0]) {
            Err(TsError::InvalidSyncByte(0x48)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_adaptation_field_with_pcr() {
        let parser = TSPacketParser::new();
        let pcr = PCR::new(90_000, 12).unwrap();
        let mut data = vec![0x47, 0x01, 0x00, 0x30, 9, 0x50];
        data.extend_from_slice(&pcr.encode());
        data.extend_from_slice(&[0xff, 0xff]);

        let (field, size) = parser.parse_adaptation_field(&data, 4).unwrap();
        assert_eq!(size, 10);
        assert!(field.random_access);
        assert_eq!(field.pcr, Some(pcr));
        assert_eq!(field.opcr, None);
    }

    #[test]
    fn test_parse_zero_length_adaptation_field() {
        let parser = TSPacketParser::new();
        let (field, size) = parser.parse_adaptation_field(&[0x47, 0, 0, 0x30, 0], 4).unwrap();
        assert_eq!(size, 1);
        assert!(field.is_empty());
    }

    #[test]
    fn test_parse_truncated_private_data() {
        let parser = TSPacketParser::new();
        // flags announce private data of 10 bytes in a 3 byte field
        let data = [0x47, 0, 0, 0x30, 3, 0x02, 10, 0xaa];
        assert!(matches!(
            parser.parse_adaptation_field(&data, 4),
            Err(TsError::InvalidAdaptationField(_))
        ));
    }
}
