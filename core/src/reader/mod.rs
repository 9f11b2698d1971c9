//! Capture file reading: detects PCAP vs PCAP-NG by magic and exposes a
//! single lazy, owning iterator over `(timestamp, link_type, frame, wire_len)`
//! records .
//!
//! Hand-rolled rather than built on the teacher's `pcap` dependency: that
//! crate wraps live `libpcap` capture handles, not an offline PCAP-NG file
//! reader, and this pipeline never touches a network interface
//! (the design). `byteorder`, already in the teacher's dependency
//! table, does the header/record decoding here instead.

pub mod pcap;
pub mod pcapng;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{CoreError, Result};

/// One decoded capture record, before link/transport decoding.
pub struct RawRecord {
    pub ts_micros: i64,
    pub link_type: u16,
    pub frame: Vec<u8>,
    pub wire_len: u32,
}

/// Dispatches on the capture's magic bytes and returns a boxed iterator
/// that owns the file handle; destruction closes it ("lazy
/// sequence from reader").
pub fn open<P: AsRef<Path>>(path: P) -> Result<Box<dyn RecordSource>> {
    let file = File::open(path.as_ref())
        .map_err(|e| CoreError::InvalidCaptureFormat(format!("cannot open capture: {e}")))?;
    let mut reader = BufReader::new(file);
    let mut magic = [0u8; 4];
    read_exact_or_truncated(&mut reader, &mut magic, "magic")?;

    if magic[0] == 0x0A && magic[1] == 0x0D && magic[2] == 0x0D && magic[3] == 0x0A {
        Ok(Box::new(pcapng::PcapNgReader::new(reader)?))
    } else if is_pcap_magic(&magic) {
        Ok(Box::new(pcap::PcapReader::new(reader, magic)?))
    } else {
        Err(CoreError::InvalidCaptureFormat(format!("unrecognized magic bytes {magic:02x?}")))
    }
}

fn is_pcap_magic(magic: &[u8; 4]) -> bool {
    const LE_USEC: [u8; 4] = [0xd4, 0xc3, 0xb2, 0xa1];
    const BE_USEC: [u8; 4] = [0xa1, 0xb2, 0xc3, 0xd4];
    const LE_NSEC: [u8; 4] = [0x4d, 0x3c, 0xb2, 0xa1];
    const BE_NSEC: [u8; 4] = [0xa1, 0xb2, 0x3c, 0x4d];
    matches!(*magic, LE_USEC | BE_USEC | LE_NSEC | BE_NSEC)
}

/// A lazy, finite, non-restartable sequence of capture records.
pub trait RecordSource {
    /// Returns the next record, or `None` at a clean EOF. A record that
    /// decodes only partially at EOF is discarded silently, per the design
    /// §4.1 — it also yields `None`.
    fn next_record(&mut self) -> Result<Option<RawRecord>>;

    /// Bytes consumed from the file so far, for progress reporting.
    fn bytes_read(&self) -> u64;
}

pub(crate) fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(CoreError::Truncated(format!("unexpected EOF reading {what}")))
        }
        Err(e) => Err(CoreError::Truncated(format!("error reading {what}: {e}"))),
    }
}
