use crate::format::ts::types::{duration_to_ticks, time_to_pts, PCR_WRAP, PTS_WRAP};
use crate::format::ts::{TSPacket, PCR};
use log::trace;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EmittedPacket {
    continuity_counter: u8,
    contains_payload: bool,
}

/// Rewrites continuity counters, PTS and PCR so that consecutive sources form
/// one gapless stream.
///
/// Packets of the first source pass through untouched; only the last emitted
/// values per PID are recorded. After [`ContinuityFixer::next_source`], every
/// PID is rebased onto the values the previous source ended with.
#[derive(Debug)]
pub struct ContinuityFixer {
    first_source: bool,
    splice_gap: Duration,

    // last emitted values of the current source, per PID
    last_packets: HashMap<u16, EmittedPacket>,
    last_pts: HashMap<u16, u64>,
    last_pcr: HashMap<u16, u64>,

    // last emitted values of the previous source, per PID
    previous_packets: HashMap<u16, EmittedPacket>,
    previous_pts: HashMap<u16, u64>,
    previous_pcr: HashMap<u16, u64>,

    // first original values seen in the current source, per PID
    first_pts: HashMap<u16, u64>,
    first_pcr: HashMap<u16, u64>,
    continuity_offsets: HashMap<u16, i16>,
}

impl Default for ContinuityFixer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinuityFixer {
    pub fn new() -> Self {
        Self {
            first_source: true,
            splice_gap: Duration::ZERO,
            last_packets: HashMap::new(),
            last_pts: HashMap::new(),
            last_pcr: HashMap::new(),
            previous_packets: HashMap::new(),
            previous_pts: HashMap::new(),
            previous_pcr: HashMap::new(),
            first_pts: HashMap::new(),
            first_pcr: HashMap::new(),
            continuity_offsets: HashMap::new(),
        }
    }

    /// Extra time inserted at every splice point. Makes timestamps strictly
    /// increasing across the boundary.
    pub fn with_splice_gap(mut self, gap: Duration) -> Self {
        self.splice_gap = gap;
        self
    }

    pub fn is_first_source(&self) -> bool {
        self.first_source
    }

    /// Marks the start of a new source.
    pub fn next_source(&mut self) {
        self.previous_packets = std::mem::take(&mut self.last_packets);
        self.previous_pts = std::mem::take(&mut self.last_pts);
        self.previous_pcr = std::mem::take(&mut self.last_pcr);
        self.first_pts.clear();
        self.first_pcr.clear();
        self.continuity_offsets.clear();
        self.first_source = false;
    }

    /// Rewrites `packet` in place and records it as the latest emitted packet
    /// of its PID.
    pub fn fix_continuity(&mut self, packet: &mut TSPacket) {
        let pid = packet.pid();

        if !self.first_source {
            let previous = &self.previous_packets;
            let offset = *self.continuity_offsets.entry(pid).or_insert_with(|| {
                let baseline = previous
                    .get(&pid)
                    .map_or(0, |last| last.continuity_counter as i16);
                let mut offset = baseline - packet.continuity_counter() as i16;
                if packet.contains_payload() {
                    offset += 1;
                }
                offset
            });

            let continuity_counter =
                (packet.continuity_counter() as i16 + offset).rem_euclid(16) as u8;
            if continuity_counter != packet.continuity_counter() {
                packet.set_continuity_counter(continuity_counter);
            }
        }

        self.last_packets.insert(
            pid,
            EmittedPacket {
                continuity_counter: packet.continuity_counter(),
                contains_payload: packet.contains_payload(),
            },
        );

        self.fix_pts(packet, pid);
        self.fix_pcr(packet, pid);
    }

    fn fix_pts(&mut self, packet: &mut TSPacket, pid: u16) {
        let Some(pts) = packet.pts() else {
            return;
        };
        let first = *self.first_pts.entry(pid).or_insert(pts);

        let pts = if self.first_source {
            pts
        } else {
            let base = self.previous_pts.get(&pid).copied().unwrap_or(0);
            let rewritten = rebase(base, pts, first, time_to_pts(self.splice_gap), PTS_WRAP);
            packet.set_pts(rewritten);
            rewritten
        };
        self.last_pts.insert(pid, pts);
    }

    fn fix_pcr(&mut self, packet: &mut TSPacket, pid: u16) {
        let Some(pcr) = packet.pcr() else {
            return;
        };
        let ticks = pcr.ticks();
        let first = *self.first_pcr.entry(pid).or_insert(ticks);

        let ticks = if self.first_source {
            ticks
        } else {
            let base = self.previous_pcr.get(&pid).copied().unwrap_or(0);
            let rewritten = rebase(base, ticks, first, duration_to_ticks(self.splice_gap), PCR_WRAP);
            packet.set_pcr(PCR::from_ticks(rewritten));
            trace!("Rewrote PCR on PID {} from {} to {}", pid, pcr.ticks(), rewritten);
            rewritten
        };
        self.last_pcr.insert(pid, ticks);
    }
}

/// `base + value - first + gap`, wrapped into `[0, modulus)`.
fn rebase(base: u64, value: u64, first: u64, gap: u64, modulus: u64) -> u64 {
    (base as i64 + value as i64 - first as i64 + gap as i64).rem_euclid(modulus as i64) as u64
}
