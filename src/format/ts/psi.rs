//! Program Specific Information: PAT and PMT section parsing.
//!
//! Sections are expected to fit in a single packet payload. CRC_32 is not
//! verified.

use super::types::*;
use crate::error::{Result, TsError};
use std::collections::BTreeMap;

const SECTION_HEADER_SIZE: usize = 3;
// transport_stream_id/program_number, version, section numbers
const SECTION_SYNTAX_SIZE: usize = 5;
const CRC_SIZE: usize = 4;

/// Program Association Table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PAT {
    pub transport_stream_id: u16,
    pub version: u8,
    /// Program number to PMT PID. Program 0 (network PID) is kept apart.
    pub programs: BTreeMap<u16, u16>,
    pub network_pid: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStreamInfo {
    pub stream_type: u8,
    pub elementary_pid: u16,
}

/// Program Map Table. Descriptors are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PMT {
    pub program_number: u16,
    pub version: u8,
    pub pcr_pid: u16,
    pub streams: Vec<ElementaryStreamInfo>,
}

struct Section<'a> {
    table_id: u8,
    id: u16,
    version: u8,
    body: &'a [u8],
}

fn read_section<'a>(
    payload: &'a [u8],
    payload_unit_start: bool,
    name: &str,
) -> Result<Section<'a>> {
    let start = if payload_unit_start {
        let pointer = *payload
            .first()
            .ok_or_else(|| TsError::IncompleteSection(format!("{}: empty payload", name)))?
            as usize;
        1 + pointer
    } else {
        0
    };

    if payload.len() < start + SECTION_HEADER_SIZE {
        return Err(TsError::IncompleteSection(format!(
            "{}: section header truncated",
            name
        )));
    }

    let table_id = payload[start];
    let section_length =
        (((payload[start + 1] & 0x0f) as usize) << 8) | payload[start + 2] as usize;
    let end = start + SECTION_HEADER_SIZE + section_length;
    if end > payload.len() {
        return Err(TsError::IncompleteSection(format!(
            "{}: section_length {} exceeds payload",
            name, section_length
        )));
    }
    if section_length < SECTION_SYNTAX_SIZE + CRC_SIZE {
        return Err(TsError::InvalidSection(format!(
            "{}: section_length {} too small",
            name, section_length
        )));
    }

    let syntax = start + SECTION_HEADER_SIZE;
    Ok(Section {
        table_id,
        id: ((payload[syntax] as u16) << 8) | payload[syntax + 1] as u16,
        version: (payload[syntax + 2] >> 1) & 0x1f,
        body: &payload[syntax + SECTION_SYNTAX_SIZE..end - CRC_SIZE],
    })
}

/// Parses a PAT from a packet payload. With `payload_unit_start` set the
/// pointer field is honoured.
pub fn parse_pat(payload: &[u8], payload_unit_start: bool) -> Result<PAT> {
    let section = read_section(payload, payload_unit_start, "PAT")?;
    if section.table_id != TABLE_ID_PAT {
        return Err(TsError::InvalidSection(format!(
            "PAT: unexpected table id 0x{:02x}",
            section.table_id
        )));
    }

    let mut pat = PAT {
        transport_stream_id: section.id,
        version: section.version,
        ..Default::default()
    };

    for entry in section.body.chunks_exact(4) {
        let program_number = ((entry[0] as u16) << 8) | entry[1] as u16;
        let pid = (((entry[2] & 0x1f) as u16) << 8) | entry[3] as u16;
        if program_number == 0 {
            pat.network_pid = Some(pid);
        } else {
            pat.programs.insert(program_number, pid);
        }
    }

    Ok(pat)
}

/// Parses a PMT from a packet payload.
pub fn parse_pmt(payload: &[u8], payload_unit_start: bool) -> Result<PMT> {
    let section = read_section(payload, payload_unit_start, "PMT")?;
    if section.table_id != TABLE_ID_PMT {
        return Err(TsError::InvalidSection(format!(
            "PMT: unexpected table id 0x{:02x}",
            section.table_id
        )));
    }

    let data = section.body;
    if data.len() < 4 {
        return Err(TsError::IncompleteSection(
            "PMT: too short for PCR PID and program info length".into(),
        ));
    }

    let mut pmt = PMT {
        program_number: section.id,
        version: section.version,
        pcr_pid: (((data[0] & 0x1f) as u16) << 8) | data[1] as u16,
        streams: Vec::new(),
    };

    let program_info_length = (((data[2] & 0x0f) as usize) << 8) | data[3] as usize;
    let mut pos = 4 + program_info_length;
    if pos > data.len() {
        return Err(TsError::IncompleteSection(
            "PMT: program info truncated".into(),
        ));
    }

    while pos < data.len() {
        if pos + 5 > data.len() {
            return Err(TsError::IncompleteSection(
                "PMT: elementary stream entry truncated".into(),
            ));
        }
        let stream_type = data[pos];
        let elementary_pid = (((data[pos + 1] & 0x1f) as u16) << 8) | data[pos + 2] as u16;
        let es_info_length = (((data[pos + 3] & 0x0f) as usize) << 8) | data[pos + 4] as usize;
        pos += 5 + es_info_length;
        if pos > data.len() {
            return Err(TsError::IncompleteSection(
                "PMT: ES info truncated".into(),
            ));
        }

        pmt.streams.push(ElementaryStreamInfo {
            stream_type,
            elementary_pid,
        });
    }

    Ok(pmt)
}
