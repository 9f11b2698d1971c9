//! Capture-wide and per-stream time-series (supplementary
//! on-demand outputs).

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Point {
    pub ts: i64,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureTimeseries {
    pub granularity_sec: u64,
    pub packets_per_sec: Vec<Point>,
    pub bytes_per_sec: Vec<Point>,
}

/// One direction's per-second series, plus the combined total.
#[derive(Debug, Clone, Serialize)]
pub struct DirectionalTimeseries {
    pub granularity_sec: u64,
    pub inbound: Vec<Point>,
    pub outbound: Vec<Point>,
    pub total: Vec<Point>,
}

/// Accumulates a capture-wide packets/bytes-per-second series at 1s
/// granularity. Every frame contributes, including ones the decoder
/// skipped (: "still counted in wire-bytes time-series").
#[derive(Debug, Default)]
pub struct CaptureTimeseriesBuilder {
    packets: BTreeMap<i64, u64>,
    bytes: BTreeMap<i64, u64>,
}

impl CaptureTimeseriesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, ts_micros: i64, wire_len: u32) {
        let bucket = ts_micros.div_euclid(1_000_000);
        *self.packets.entry(bucket).or_insert(0) += 1;
        *self.bytes.entry(bucket).or_insert(0) += wire_len as u64;
    }

    pub fn build(self) -> CaptureTimeseries {
        CaptureTimeseries {
            granularity_sec: 1,
            packets_per_sec: self.packets.into_iter().map(|(ts, value)| Point { ts, value }).collect(),
            bytes_per_sec: self.bytes.into_iter().map(|(ts, value)| Point { ts, value }).collect(),
        }
    }
}

/// Accumulates one flow's per-direction byte series at 1s granularity.
#[derive(Debug, Default)]
pub struct StreamTimeseriesBuilder {
    inbound: BTreeMap<i64, u64>,
    outbound: BTreeMap<i64, u64>,
}

impl StreamTimeseriesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `is_outbound` is relative to the flow's client: `true` for
    /// client-to-server bytes.
    pub fn record(&mut self, ts_micros: i64, payload_len: u32, is_outbound: bool) {
        let bucket = ts_micros.div_euclid(1_000_000);
        let map = if is_outbound { &mut self.outbound } else { &mut self.inbound };
        *map.entry(bucket).or_insert(0) += payload_len as u64;
    }

    pub fn build(self) -> DirectionalTimeseries {
        let mut totals: BTreeMap<i64, u64> = BTreeMap::new();
        for (ts, v) in self.inbound.iter().chain(self.outbound.iter()) {
            *totals.entry(*ts).or_insert(0) += v;
        }
        DirectionalTimeseries {
            granularity_sec: 1,
            inbound: self.inbound.into_iter().map(|(ts, value)| Point { ts, value }).collect(),
            outbound: self.outbound.into_iter().map(|(ts, value)| Point { ts, value }).collect(),
            total: totals.into_iter().map(|(ts, value)| Point { ts, value }).collect(),
        }
    }
}
