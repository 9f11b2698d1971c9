//! Classic PCAP format (`libpcap` savefile) reader.

use std::io::{BufReader, ErrorKind, Read};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{CoreError, Result};
use std::fs::File;

use super::{read_exact_or_truncated, RawRecord, RecordSource};

const GLOBAL_HEADER_REMAINDER_LEN: usize = 20; // version..network, after the 4-byte magic
const RECORD_HEADER_LEN: usize = 16;

enum Endian {
    Little,
    Big,
}

pub struct PcapReader {
    reader: BufReader<File>,
    endian: Endian,
    nsec_resolution: bool,
    link_type: u16,
    bytes_read: u64,
}

impl PcapReader {
    pub(crate) fn new(mut reader: BufReader<File>, magic: [u8; 4]) -> Result<Self> {
        let (endian, nsec_resolution) = match magic {
            [0xd4, 0xc3, 0xb2, 0xa1] => (Endian::Little, false),
            [0xa1, 0xb2, 0xc3, 0xd4] => (Endian::Big, false),
            [0x4d, 0x3c, 0xb2, 0xa1] => (Endian::Little, true),
            [0xa1, 0xb2, 0x3c, 0x4d] => (Endian::Big, true),
            _ => return Err(CoreError::InvalidCaptureFormat("not a PCAP magic".to_string())),
        };
        let mut rest = [0u8; GLOBAL_HEADER_REMAINDER_LEN];
        read_exact_or_truncated(&mut reader, &mut rest, "PCAP global header")?;
        let link_type = match endian {
            Endian::Little => LittleEndian::read_u32(&rest[16..20]),
            Endian::Big => BigEndian::read_u32(&rest[16..20]),
        } as u16;
        Ok(PcapReader {
            reader,
            endian,
            nsec_resolution,
            link_type,
            bytes_read: 4 + GLOBAL_HEADER_REMAINDER_LEN as u64,
        })
    }

    fn read_u32(&self, buf: &[u8]) -> u32 {
        match self.endian {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }
}

impl RecordSource for PcapReader {
    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        let mut header = [0u8; RECORD_HEADER_LEN];
        // Distinguish a clean end-of-capture (0 bytes available) from a
        // record that starts but is cut short: the latter is discarded
        // silently rather than treated as fatal .
        let first = match self.reader.read(&mut header[..1]) {
            Ok(0) => return Ok(None),
            Ok(n) => n,
            Err(e) => return Err(CoreError::Truncated(format!("error reading record header: {e}"))),
        };
        match self.reader.read_exact(&mut header[first..]) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(CoreError::Truncated(format!("error reading record header: {e}"))),
        }
        self.bytes_read += RECORD_HEADER_LEN as u64;

        let ts_sec = self.read_u32(&header[0..4]) as i64;
        let ts_frac = self.read_u32(&header[4..8]) as i64;
        let incl_len = self.read_u32(&header[8..12]);
        let orig_len = self.read_u32(&header[12..16]);

        let ts_micros = ts_sec * 1_000_000 + if self.nsec_resolution { ts_frac / 1000 } else { ts_frac };

        let mut frame = vec![0u8; incl_len as usize];
        match self.reader.read_exact(&mut frame) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(CoreError::Truncated(format!("error reading frame body: {e}"))),
        }
        self.bytes_read += incl_len as u64;

        Ok(Some(RawRecord {
            ts_micros,
            link_type: self.link_type,
            frame,
            wire_len: orig_len,
        }))
    }

    fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_global_header(buf: &mut Vec<u8>) {
        buf.extend_from_slice(&[0xd4, 0xc3, 0xb2, 0xa1]); // LE usec magic
        buf.extend_from_slice(&2u16.to_le_bytes()); // version_major
        buf.extend_from_slice(&4u16.to_le_bytes()); // version_minor
        buf.extend_from_slice(&0i32.to_le_bytes()); // thiszone
        buf.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
        buf.extend_from_slice(&65535u32.to_le_bytes()); // snaplen
        buf.extend_from_slice(&1u32.to_le_bytes()); // network = Ethernet
    }

    fn write_record(buf: &mut Vec<u8>, payload: &[u8]) {
        buf.extend_from_slice(&0u32.to_le_bytes()); // ts_sec
        buf.extend_from_slice(&0u32.to_le_bytes()); // ts_usec
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(payload);
    }

    fn write_tmp(bytes: &[u8]) -> BufReader<File> {
        let mut path = std::env::temp_dir();
        path.push(format!("captriage-test-{}.pcap", std::process::id()));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        drop(f);
        BufReader::new(File::open(&path).unwrap())
    }

    #[test]
    fn reads_one_record() {
        let mut bytes = Vec::new();
        write_global_header(&mut bytes);
        write_record(&mut bytes, &[1, 2, 3, 4]);
        let reader = write_tmp(&bytes);
        let mut pcap = PcapReader::new(reader, [0xd4, 0xc3, 0xb2, 0xa1]).unwrap();
        let record = pcap.next_record().unwrap().unwrap();
        assert_eq!(record.frame, vec![1, 2, 3, 4]);
        assert_eq!(record.link_type, 1);
        assert!(pcap.next_record().unwrap().is_none());
    }

    #[test]
    fn truncated_record_body_ends_iteration_silently() {
        let mut bytes = Vec::new();
        write_global_header(&mut bytes);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&100u32.to_le_bytes()); // claims 100 bytes
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]); // but only 3 are present
        let reader = write_tmp(&bytes);
        let mut pcap = PcapReader::new(reader, [0xd4, 0xc3, 0xb2, 0xa1]).unwrap();
        assert!(pcap.next_record().unwrap().is_none());
    }
}
