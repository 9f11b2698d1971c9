//! PCAP-NG block reader: Section Header Block, Interface Description
//! Blocks, and Enhanced/Simple Packet Blocks. Other block types are
//! skipped by their declared length.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{CoreError, Result};

use super::{read_exact_or_truncated, RawRecord, RecordSource};

const BLOCK_TYPE_IDB: u32 = 0x0000_0001;
const BLOCK_TYPE_SPB: u32 = 0x0000_0003;
const BLOCK_TYPE_EPB: u32 = 0x0000_0006;
const BYTE_ORDER_MAGIC: u32 = 0x1A2B_3C4D;

#[derive(Clone, Copy)]
enum Endian {
    Little,
    Big,
}

#[derive(Clone, Copy)]
struct InterfaceInfo {
    link_type: u16,
    /// Timestamp units per second; default `1_000_000` (microseconds) per
    /// the PCAP-NG spec when an `if_tsresol` option is absent.
    units_per_sec: u64,
}

pub struct PcapNgReader {
    reader: BufReader<File>,
    endian: Endian,
    interfaces: HashMap<u32, InterfaceInfo>,
    bytes_read: u64,
}

impl PcapNgReader {
    pub(crate) fn new(mut reader: BufReader<File>) -> Result<Self> {
        // The 4-byte block type (section header, 0x0A0D0D0A) was already
        // consumed by the dispatcher in `open()`.
        let mut rest = [0u8; 4];
        read_exact_or_truncated(&mut reader, &mut rest, "PCAP-NG block length")?;
        // Block length's own endianness is unknown until we read the byte
        // order magic immediately after it.
        let mut magic_bytes = [0u8; 4];
        read_exact_or_truncated(&mut reader, &mut magic_bytes, "PCAP-NG byte order magic")?;
        let (endian, block_total_length) = if LittleEndian::read_u32(&magic_bytes) == BYTE_ORDER_MAGIC {
            (Endian::Little, LittleEndian::read_u32(&rest))
        } else if BigEndian::read_u32(&magic_bytes) == BYTE_ORDER_MAGIC {
            (Endian::Big, BigEndian::read_u32(&rest))
        } else {
            return Err(CoreError::InvalidCaptureFormat(
                "PCAP-NG section header: bad byte-order magic".to_string(),
            ));
        };
        if block_total_length < 12 {
            return Err(CoreError::InvalidCaptureFormat(
                "PCAP-NG section header block too short".to_string(),
            ));
        }
        // 12 bytes already consumed (block type, by the dispatcher; length
        // and byte-order magic, just above); the remainder is
        // major/minor/section-length/options plus the trailing length
        // repeat.
        let remaining = block_total_length as usize - 12;
        let mut body = vec![0u8; remaining];
        read_exact_or_truncated(&mut reader, &mut body, "PCAP-NG section header body")?;

        Ok(PcapNgReader {
            reader,
            endian,
            interfaces: HashMap::new(),
            bytes_read: block_total_length as u64 - 4,
        })
    }

    fn read_u32(&self, buf: &[u8]) -> u32 {
        match self.endian {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }

    fn read_u16(&self, buf: &[u8]) -> u16 {
        match self.endian {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    fn handle_idb(&mut self, interface_id: u32, body: &[u8]) {
        if body.len() < 8 {
            return;
        }
        let link_type = self.read_u16(&body[0..2]);
        let mut units_per_sec = 1_000_000u64;
        // Options begin after linktype(2) + reserved(2) + snaplen(4).
        let mut options = &body[8..];
        while options.len() >= 4 {
            let code = self.read_u16(&options[0..2]);
            let len = self.read_u16(&options[2..4]) as usize;
            let padded = (len + 3) & !3;
            if options.len() < 4 + padded {
                break;
            }
            if code == 9 && len >= 1 {
                let b = options[4];
                units_per_sec = if b & 0x80 != 0 {
                    1u64.checked_shl((b & 0x7f) as u32).unwrap_or(u64::MAX)
                } else {
                    10u64.checked_pow(b as u32).unwrap_or(u64::MAX)
                };
            }
            if code == 0 {
                break; // opt_endofopt
            }
            options = &options[4 + padded..];
        }
        self.interfaces.insert(interface_id, InterfaceInfo { link_type, units_per_sec });
    }
}

impl RecordSource for PcapNgReader {
    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        loop {
            let mut header = [0u8; 4];
            let first = match std::io::Read::read(&mut self.reader, &mut header[..1]) {
                Ok(0) => return Ok(None),
                Ok(n) => n,
                Err(e) => return Err(CoreError::Truncated(format!("error reading block type: {e}"))),
            };
            match std::io::Read::read_exact(&mut self.reader, &mut header[first..]) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(CoreError::Truncated(format!("error reading block type: {e}"))),
            }
            let block_type = self.read_u32(&header);

            let mut len_buf = [0u8; 4];
            match self.read_exact_tracked(&mut len_buf) {
                Ok(true) => {}
                Ok(false) => return Ok(None),
                Err(e) => return Err(e),
            }
            let block_total_length = self.read_u32(&len_buf);
            if block_total_length < 12 {
                return Err(CoreError::Truncated("PCAP-NG block shorter than minimum 12 bytes".to_string()));
            }
            self.bytes_read += 8;
            let body_and_trailer_len = block_total_length as usize - 8;
            let mut rest = vec![0u8; body_and_trailer_len];
            match self.read_exact_tracked(&mut rest) {
                Ok(true) => {}
                Ok(false) => return Ok(None),
                Err(e) => return Err(e),
            }
            let body = &rest[..body_and_trailer_len - 4];

            match block_type {
                BLOCK_TYPE_IDB => {
                    let interface_id = self.interfaces.len() as u32;
                    self.handle_idb(interface_id, body);
                }
                BLOCK_TYPE_EPB => {
                    if body.len() < 20 {
                        continue; // malformed block; skip rather than abort the whole pass
                    }
                    let interface_id = self.read_u32(&body[0..4]);
                    let ts_high = self.read_u32(&body[4..8]) as u64;
                    let ts_low = self.read_u32(&body[8..12]) as u64;
                    let captured_len = self.read_u32(&body[12..16]) as usize;
                    let orig_len = self.read_u32(&body[16..20]);
                    if body.len() < 20 + captured_len {
                        continue;
                    }
                    let frame = body[20..20 + captured_len].to_vec();
                    let info = self.interfaces.get(&interface_id).copied().unwrap_or(InterfaceInfo {
                        link_type: 1,
                        units_per_sec: 1_000_000,
                    });
                    let ticks = (ts_high << 32) | ts_low;
                    let ts_micros = (ticks as u128 * 1_000_000 / info.units_per_sec as u128) as i64;
                    return Ok(Some(RawRecord {
                        ts_micros,
                        link_type: info.link_type,
                        frame,
                        wire_len: orig_len,
                    }));
                }
                BLOCK_TYPE_SPB => {
                    if body.len() < 4 {
                        continue;
                    }
                    let orig_len = self.read_u32(&body[0..4]);
                    let captured = body.len() - 4;
                    let frame = body[4..4 + captured.min(body.len() - 4)].to_vec();
                    let info = self.interfaces.values().next().copied().unwrap_or(InterfaceInfo {
                        link_type: 1,
                        units_per_sec: 1_000_000,
                    });
                    return Ok(Some(RawRecord {
                        ts_micros: 0,
                        link_type: info.link_type,
                        frame,
                        wire_len: orig_len,
                    }));
                }
                _ => continue, // section headers, name-resolution, stats blocks: skip
            }
        }
    }

    fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl PcapNgReader {
    /// Reads exactly `buf.len()` bytes, tracking `bytes_read`. Returns
    /// `Ok(false)` for a clean/partial EOF (discarded silently per
    /// the design) rather than erroring.
    fn read_exact_tracked(&mut self, buf: &mut [u8]) -> Result<bool> {
        match std::io::Read::read_exact(&mut self.reader, buf) {
            Ok(()) => {
                self.bytes_read += buf.len() as u64;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(CoreError::Truncated(format!("error reading PCAP-NG block: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn le_u32(v: u32) -> [u8; 4] {
        v.to_le_bytes()
    }
    fn le_u16(v: u16) -> [u8; 2] {
        v.to_le_bytes()
    }

    fn build_shb() -> Vec<u8> {
        let mut block = Vec::new();
        block.extend_from_slice(&le_u32(0x0A0D0D0A)); // block type
        let body_placeholder_idx = block.len();
        block.extend_from_slice(&le_u32(0)); // length placeholder
        block.extend_from_slice(&le_u32(BYTE_ORDER_MAGIC));
        block.extend_from_slice(&le_u16(1)); // major
        block.extend_from_slice(&le_u16(0)); // minor
        block.extend_from_slice(&(-1i64).to_le_bytes()); // section length unknown
        block.extend_from_slice(&le_u32(0)); // trailing length placeholder
        let total = block.len() as u32;
        block[body_placeholder_idx..body_placeholder_idx + 4].copy_from_slice(&le_u32(total));
        let last4 = block.len() - 4;
        block[last4..].copy_from_slice(&le_u32(total));
        block
    }

    fn build_idb(link_type: u16) -> Vec<u8> {
        let mut block = Vec::new();
        block.extend_from_slice(&le_u32(BLOCK_TYPE_IDB));
        let len_idx = block.len();
        block.extend_from_slice(&le_u32(0));
        block.extend_from_slice(&le_u16(link_type));
        block.extend_from_slice(&le_u16(0)); // reserved
        block.extend_from_slice(&le_u32(65535)); // snaplen
        block.extend_from_slice(&le_u32(0)); // trailing length placeholder
        let total = block.len() as u32;
        block[len_idx..len_idx + 4].copy_from_slice(&le_u32(total));
        let last4 = block.len() - 4;
        block[last4..].copy_from_slice(&le_u32(total));
        block
    }

    fn build_epb(interface_id: u32, ticks: u64, payload: &[u8]) -> Vec<u8> {
        let mut block = Vec::new();
        block.extend_from_slice(&le_u32(BLOCK_TYPE_EPB));
        let len_idx = block.len();
        block.extend_from_slice(&le_u32(0));
        block.extend_from_slice(&le_u32(interface_id));
        block.extend_from_slice(&le_u32((ticks >> 32) as u32));
        block.extend_from_slice(&le_u32(ticks as u32));
        block.extend_from_slice(&le_u32(payload.len() as u32));
        block.extend_from_slice(&le_u32(payload.len() as u32));
        block.extend_from_slice(payload);
        let pad = (4 - payload.len() % 4) % 4;
        block.extend(std::iter::repeat(0u8).take(pad));
        block.extend_from_slice(&le_u32(0)); // trailing length placeholder
        let total = block.len() as u32;
        block[len_idx..len_idx + 4].copy_from_slice(&le_u32(total));
        let last4 = block.len() - 4;
        block[last4..].copy_from_slice(&le_u32(total));
        block
    }

    fn write_tmp(bytes: &[u8], suffix: &str) -> BufReader<File> {
        let mut path = std::env::temp_dir();
        path.push(format!("captriage-test-{}-{}.pcapng", std::process::id(), suffix));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        drop(f);
        BufReader::new(File::open(&path).unwrap())
    }

    #[test]
    fn reads_one_packet_after_section_and_interface() {
        let mut bytes = build_shb();
        bytes.extend(build_idb(1));
        bytes.extend(build_epb(0, 1_000_000, &[9, 9, 9]));

        // `open()` consumes the first 4 bytes (block type) before
        // dispatching here, so skip them for this direct unit test.
        let reader = write_tmp(&bytes[4..], "one-packet");
        let mut ng = PcapNgReader::new(reader).unwrap();
        let rec = ng.next_record().unwrap().unwrap();
        assert_eq!(rec.frame, vec![9, 9, 9]);
        assert_eq!(rec.link_type, 1);
        assert_eq!(rec.ts_micros, 1_000_000);
        assert!(ng.next_record().unwrap().is_none());
    }
}
