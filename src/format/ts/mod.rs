//! # MPEG Transport Stream (TS) packet layer
//!
//! - [`TSPacket`]: 188-byte packet with decoded header, adaptation field and
//!   payload view, re-serialized lazily after edits
//! - [`PCR`]: 42-bit program clock reference
//! - [`psi`]: PAT and PMT section parsing
//! - [`pes`]: PTS access inside PES headers
//!
//! ## Example Usage
//!
//! ```rust
//! use tscast::format::ts::{TSHeader, TSPacket, AdaptationField, PCR, TS_PACKET_SIZE};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let field = AdaptationField::with_pcr(PCR::from_ticks(27_000_000));
//! let mut packet = TSPacket::new(TSHeader::new(0x100), Some(field), Some(&[0u8; 100][..]))?;
//!
//! packet.set_continuity_counter(5);
//! packet.set_pcr(PCR::from_ticks(54_000_000));
//!
//! let bytes = packet.bytes()?;
//! assert_eq!(bytes.len(), TS_PACKET_SIZE);
//! # Ok(())
//! # }
//! ```

/// Decoded packet with lazy re-serialization
pub mod packet;

/// Low-level header and adaptation field parsing
pub mod parser;

/// PES header and PTS handling
pub mod pes;

/// PAT/PMT section parsing
pub mod psi;

/// Core TS types and constants
pub mod types;

pub use packet::TSPacket;
pub use parser::TSPacketParser;
pub use pes::PESHeader;
pub use psi::{parse_pat, parse_pmt, ElementaryStreamInfo, PAT, PMT};
pub use types::{
    AdaptationField, TSHeader, PCR, PCR_HZ, PID_NULL, PID_PAT, PTS_HZ, SYNC_BYTE,
    TS_PACKET_SIZE,
};
