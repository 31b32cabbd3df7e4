use crate::format::ts::{parse_pat, parse_pmt, TSPacket, PID_NULL, PID_PAT};
use log::{debug, info};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrackedProgram {
    pmt_pid: u16,
    pcr_pid: Option<u16>,
}

/// Follows PAT and PMT sections to learn which PID carries the clock.
///
/// With several programs, the PCR PID of the lowest program number that has
/// a parsed PMT is used.
#[derive(Debug, Default)]
pub struct ProgramTracker {
    programs: BTreeMap<u16, TrackedProgram>,
}

impl ProgramTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, packet: &TSPacket) {
        if !packet.payload_unit_start() {
            return;
        }
        let Some(payload) = packet.payload() else {
            return;
        };
        let pid = packet.pid();

        if pid == PID_PAT {
            match parse_pat(payload, true) {
                Ok(pat) => {
                    let programs = pat
                        .programs
                        .iter()
                        .map(|(&number, &pmt_pid)| {
                            let pcr_pid = self
                                .programs
                                .get(&number)
                                .filter(|known| known.pmt_pid == pmt_pid)
                                .and_then(|known| known.pcr_pid);
                            (number, TrackedProgram { pmt_pid, pcr_pid })
                        })
                        .collect::<BTreeMap<_, _>>();
                    if programs != self.programs {
                        debug!("PAT lists {} programs", programs.len());
                    }
                    self.programs = programs;
                }
                Err(e) => debug!("Ignoring PAT on PID {}: {}", pid, e),
            }
            return;
        }

        if !self.programs.values().any(|p| p.pmt_pid == pid) {
            return;
        }

        match parse_pmt(payload, true) {
            Ok(pmt) => {
                if let Some(program) = self
                    .programs
                    .get_mut(&pmt.program_number)
                    .filter(|p| p.pmt_pid == pid)
                {
                    if program.pcr_pid != Some(pmt.pcr_pid) {
                        info!(
                            "Program {} uses PCR PID {}",
                            pmt.program_number, pmt.pcr_pid
                        );
                    }
                    program.pcr_pid = Some(pmt.pcr_pid);
                }
            }
            Err(e) => debug!("Ignoring PMT on PID {}: {}", pid, e),
        }
    }

    /// PID whose PCR drives pacing, once a PMT has been seen. Programs
    /// without a PCR (PCR PID 0x1FFF) are skipped.
    pub fn pcr_pid(&self) -> Option<u16> {
        self.programs
            .values()
            .filter_map(|p| p.pcr_pid)
            .find(|&pid| pid != PID_NULL)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::format::ts::psi::tests::section;
    use crate::format::ts::types::{TABLE_ID_PAT, TABLE_ID_PMT};
    use crate::format::ts::TSHeader;

    fn psi_packet(pid: u16, mut payload: Vec<u8>) -> TSPacket {
        let mut header = TSHeader::new(pid);
        header.payload_unit_start = true;
        payload.resize(184, 0xff);
        TSPacket::new(header, None, Some(&payload[..])).unwrap()
    }

    /// PAT mapping each `(program, pmt_pid)` pair.
    pub(crate) fn pat_packet(programs: &[(u16, u16)]) -> TSPacket {
        let mut body = Vec::new();
        for &(number, pmt_pid) in programs {
            body.extend_from_slice(&number.to_be_bytes());
            body.extend_from_slice(&(0xe000 | pmt_pid).to_be_bytes());
        }
        psi_packet(PID_PAT, section(TABLE_ID_PAT, 1, &body))
    }

    pub(crate) fn pmt_packet(pmt_pid: u16, program: u16, pcr_pid: u16) -> TSPacket {
        let mut body = Vec::new();
        body.extend_from_slice(&(0xe000 | pcr_pid).to_be_bytes());
        body.extend_from_slice(&[0xf0, 0x00]);
        body.push(0x1b);
        body.extend_from_slice(&(0xe000 | pcr_pid).to_be_bytes());
        body.extend_from_slice(&[0xf0, 0x00]);
        psi_packet(pmt_pid, section(TABLE_ID_PMT, program, &body))
    }

    #[test]
    fn test_no_pcr_pid_without_pmt() {
        let mut tracker = ProgramTracker::new();
        assert_eq!(tracker.pcr_pid(), None);

        tracker.observe(&pat_packet(&[(1, 0x1000)]));
        assert_eq!(tracker.pcr_pid(), None);

        tracker.observe(&pmt_packet(0x1000, 1, 0x100));
        assert_eq!(tracker.pcr_pid(), Some(0x100));
    }

    #[test]
    fn test_lowest_program_wins() {
        let mut tracker = ProgramTracker::new();
        tracker.observe(&pat_packet(&[(2, 0x1002), (1, 0x1001)]));
        tracker.observe(&pmt_packet(0x1002, 2, 0x200));
        assert_eq!(tracker.pcr_pid(), Some(0x200));

        tracker.observe(&pmt_packet(0x1001, 1, 0x100));
        assert_eq!(tracker.pcr_pid(), Some(0x100));
    }

    #[test]
    fn test_program_without_pcr_is_skipped() {
        let mut tracker = ProgramTracker::new();
        tracker.observe(&pat_packet(&[(1, 0x1001), (2, 0x1002)]));
        tracker.observe(&pmt_packet(0x1001, 1, PID_NULL));
        assert_eq!(tracker.pcr_pid(), None);

        tracker.observe(&pmt_packet(0x1002, 2, 0x200));
        assert_eq!(tracker.pcr_pid(), Some(0x200));
    }

    #[test]
    fn test_pmt_on_unknown_pid_is_ignored() {
        let mut tracker = ProgramTracker::new();
        tracker.observe(&pat_packet(&[(1, 0x1000)]));
        tracker.observe(&pmt_packet(0x1005, 1, 0x100));
        assert_eq!(tracker.pcr_pid(), None);
    }

    #[test]
    fn test_repeated_pat_keeps_pcr_pid() {
        let mut tracker = ProgramTracker::new();
        tracker.observe(&pat_packet(&[(1, 0x1000)]));
        tracker.observe(&pmt_packet(0x1000, 1, 0x100));
        tracker.observe(&pat_packet(&[(1, 0x1000)]));
        assert_eq!(tracker.pcr_pid(), Some(0x100));
    }
}
