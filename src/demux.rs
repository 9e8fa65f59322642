//! Streaming record demultiplexer.
//!
//! Consumes opaque byte chunks (the concatenated data blocks of one data
//! group), re-synchronizes on record boundaries via the leading record-ID
//! field, and dispatches each record's bytes to the per-group decoders. A
//! small carry buffer reassembles records that straddle chunk boundaries, so
//! feeding the same stream split at any byte position yields the same rows.

use crate::decode::{Series, SeriesValues, ValueDecoder};
use crate::layout::{DataGroupLayout, GroupLayout};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Default progress reporting interval in rows.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 10_000;

/// Outcome of feeding a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// More data wanted.
    Continue,
    /// Every group reached its declared row count; stop pulling chunks.
    Done,
}

/// Output of one channel group after streaming.
#[derive(Debug, Clone)]
pub struct GroupSeries {
    /// Group name, if the file carries one.
    pub name: Option<String>,
    /// Record ID of the group.
    pub record_id: u64,
    /// Decoded rows so far.
    pub rows: u64,
    /// One series per channel, in channel order.
    pub channels: Vec<Series>,
}

struct GroupSink {
    /// Data bytes per record (fields live here).
    data_len: usize,
    /// Full body length: data plus trailing invalidation bytes.
    body_len: usize,
    target_rows: Option<u64>,
    rows: u64,
    decoders: Vec<ValueDecoder>,
    out: GroupSeries,
}

impl GroupSink {
    fn new(group: &GroupLayout) -> Result<Self> {
        let mut decoders = Vec::with_capacity(group.channels.len());
        let mut channels = Vec::with_capacity(group.channels.len());
        for channel in &group.channels {
            let decoder = ValueDecoder::new(channel)?;
            channels.push(Series {
                name: channel.name.clone(),
                role: channel.role,
                values: SeriesValues::new(decoder.sample_kind()),
            });
            decoders.push(decoder);
        }
        Ok(Self {
            data_len: group.data_len as usize,
            body_len: group.record_len(),
            target_rows: if group.cycle_count == 0 {
                None
            } else {
                Some(group.cycle_count)
            },
            rows: 0,
            decoders,
            out: GroupSeries {
                name: group.name.clone(),
                record_id: group.record_id,
                rows: 0,
                channels,
            },
        })
    }

    /// Decode one record body and append every channel's sample.
    fn decode_row(&mut self, body: &[u8]) -> Result<()> {
        let data = &body[..self.data_len.min(body.len())];
        for (decoder, series) in self.decoders.iter().zip(self.out.channels.iter_mut()) {
            series.values.push(decoder.decode(data)?);
        }
        self.rows += 1;
        self.out.rows = self.rows;
        Ok(())
    }

    fn reached_target(&self) -> bool {
        matches!(self.target_rows, Some(target) if self.rows >= target)
    }
}

/// Pull-based state machine turning a chunk sequence into per-channel series.
pub struct RecordDemux<'a> {
    id_width: usize,
    sinks: Vec<GroupSink>,
    /// record_id -> sink index; empty when `id_width` is 0.
    index: BTreeMap<u64, usize>,
    /// Partial record carried across chunk boundaries. Capacity is bounded
    /// by id width plus the largest registered record body.
    carry: Vec<u8>,
    total_rows: u64,
    progress_interval: u64,
    progress: Option<Box<dyn FnMut(u64) + 'a>>,
    done: bool,
}

impl<'a> RecordDemux<'a> {
    /// Build a demultiplexer for one data group.
    ///
    /// Fails before any rows are decoded when two groups share a record ID,
    /// when more than one group is registered without record-ID tagging, or
    /// when a channel's bit layout is unsupported.
    pub fn new(layout: &DataGroupLayout) -> Result<Self> {
        layout.validate()?;
        if layout.record_id_width == 0 && layout.groups.len() > 1 {
            return Err(Error::BlockLinkError(String::from(
                "record ID width 0 with more than one channel group",
            )));
        }

        let mut sinks = Vec::with_capacity(layout.groups.len());
        let mut index = BTreeMap::new();
        for group in &layout.groups {
            index.insert(group.record_id, sinks.len());
            sinks.push(GroupSink::new(group)?);
        }

        let id_width = layout.record_id_width as usize;
        Ok(Self {
            id_width,
            sinks,
            index,
            carry: Vec::with_capacity(id_width + layout.max_record_len()),
            total_rows: 0,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            progress: None,
            done: false,
        })
    }

    /// Install a progress callback invoked with the cumulative row count
    /// every `interval` rows.
    pub fn with_progress(
        mut self,
        interval: u64,
        callback: impl FnMut(u64) + 'a,
    ) -> Self {
        self.progress_interval = interval.max(1);
        self.progress = Some(Box::new(callback));
        self
    }

    /// Rows decoded so far across all groups.
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Feed the next chunk of the record stream.
    ///
    /// Returns [`Control::Done`] once every group with a declared cycle
    /// count has produced all its rows; the caller should stop pulling
    /// chunks at that point, even mid-stream.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Control> {
        if self.done {
            return Ok(Control::Done);
        }
        // Zero channel groups: nothing can be decoded, the stream is
        // consumed and dropped.
        if self.sinks.is_empty() {
            return Ok(Control::Continue);
        }

        let mut input = chunk;

        // Drain the carry buffer first: top it up to the record-ID width,
        // resolve the type, then top up to the full record.
        if !self.carry.is_empty() {
            while self.carry.len() < self.id_width {
                if input.is_empty() {
                    return Ok(Control::Continue);
                }
                let take = (self.id_width - self.carry.len()).min(input.len());
                self.carry.extend_from_slice(&input[..take]);
                input = &input[take..];
            }
            {
                let sink_idx = self.resolve(&self.carry[..self.id_width])?;
                let total = self.id_width + self.sinks[sink_idx].body_len;
                if self.carry.len() < total {
                    let take = (total - self.carry.len()).min(input.len());
                    self.carry.extend_from_slice(&input[..take]);
                    input = &input[take..];
                }
                if self.carry.len() < total {
                    return Ok(Control::Continue);
                }
                let body = self.carry[self.id_width..total].to_vec();
                debug_assert_eq!(self.carry.len(), total);
                self.carry.clear();
                if self.finish_row(sink_idx, &body)? {
                    return Ok(Control::Done);
                }
            }
        }

        // Process whole records in place; stash the remainder.
        let mut pos = 0usize;
        while input.len() - pos >= self.id_width {
            let sink_idx = if self.id_width == 0 {
                0
            } else {
                self.resolve(&input[pos..pos + self.id_width])?
            };
            let total = self.id_width + self.sinks[sink_idx].body_len;
            if total == 0 {
                // Defensive: a zero-length implicit record cannot advance.
                return Ok(Control::Continue);
            }
            if input.len() - pos < total {
                break;
            }
            let body = &input[pos + self.id_width..pos + total];
            pos += total;
            if self.finish_row(sink_idx, body)? {
                return Ok(Control::Done);
            }
        }
        if pos < input.len() {
            self.carry.extend_from_slice(&input[pos..]);
        }
        Ok(Control::Continue)
    }

    /// Consume the demultiplexer and return the per-group output.
    ///
    /// Trailing bytes smaller than one record (block padding) are dropped.
    pub fn into_series(self) -> Vec<GroupSeries> {
        self.sinks.into_iter().map(|sink| sink.out).collect()
    }

    /// Map a record-ID prefix to its sink. Unknown IDs abort the stream.
    fn resolve(&self, id_bytes: &[u8]) -> Result<usize> {
        if self.id_width == 0 {
            return Ok(0);
        }
        let record_id = id_bytes
            .iter()
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64);
        self.index
            .get(&record_id)
            .copied()
            .ok_or(Error::UnknownRecordId { record_id })
    }

    /// Decode one record and report whether streaming is complete.
    fn finish_row(&mut self, sink_idx: usize, body: &[u8]) -> Result<bool> {
        let sink = &mut self.sinks[sink_idx];
        if !sink.reached_target() {
            sink.decode_row(body)?;
            self.total_rows += 1;
            if self.total_rows % self.progress_interval == 0 {
                if let Some(progress) = self.progress.as_mut() {
                    progress(self.total_rows);
                }
            }
        }
        let done = !self.sinks.is_empty() && self.sinks.iter().all(GroupSink::reached_target);
        if done {
            self.done = true;
        }
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Sample;
    use crate::layout::{ByteOrder, ChannelLayout, ChannelRole, FieldKind, GroupLayout};

    fn u32_channel(name: &str, byte_offset: u32) -> ChannelLayout {
        ChannelLayout {
            name: String::from(name),
            role: ChannelRole::Signal,
            kind: FieldKind::UnsignedInt,
            endian: ByteOrder::LittleEndian,
            byte_offset,
            bit_offset: 0,
            bit_count: 32,
        }
    }

    fn u16_channel(name: &str) -> ChannelLayout {
        ChannelLayout {
            bit_count: 16,
            ..u32_channel(name, 0)
        }
    }

    fn layout_two_types() -> DataGroupLayout {
        DataGroupLayout {
            record_id_width: 1,
            groups: vec![
                GroupLayout {
                    name: Some(String::from("a")),
                    record_id: 0,
                    data_len: 4,
                    invalidation_len: 0,
                    cycle_count: 0,
                    channels: vec![u32_channel("a0", 0)],
                },
                GroupLayout {
                    name: Some(String::from("b")),
                    record_id: 1,
                    data_len: 2,
                    invalidation_len: 0,
                    cycle_count: 0,
                    channels: vec![u16_channel("b0")],
                },
            ],
        }
    }

    const STREAM: &[u8] = &[
        0x00, 0xAA, 0xAA, 0xAA, 0xAA, // type 0
        0x01, 0xBB, 0xBB, // type 1
        0x00, 0xCC, 0xCC, 0xCC, 0xCC, // type 0
    ];

    fn decoded_rows(series: &[GroupSeries]) -> (Vec<u64>, Vec<u64>) {
        let a = match &series[0].channels[0].values {
            SeriesValues::Double(v) => v.iter().map(|&x| x as u64).collect(),
            _ => panic!("expected doubles"),
        };
        let b = match &series[1].channels[0].values {
            SeriesValues::Double(v) => v.iter().map(|&x| x as u64).collect(),
            _ => panic!("expected doubles"),
        };
        (a, b)
    }

    #[test]
    fn multi_record_type_stream() {
        let layout = layout_two_types();
        let mut demux = RecordDemux::new(&layout).unwrap();
        demux.feed(STREAM).unwrap();
        let series = demux.into_series();
        let (a, b) = decoded_rows(&series);
        assert_eq!(a, vec![0xAAAAAAAA, 0xCCCCCCCC]);
        assert_eq!(b, vec![0xBBBB]);
        assert_eq!(series[0].rows, 2);
        assert_eq!(series[1].rows, 1);
    }

    #[test]
    fn every_split_point_yields_identical_rows() {
        let layout = layout_two_types();
        for split in 0..=STREAM.len() {
            let mut demux = RecordDemux::new(&layout).unwrap();
            demux.feed(&STREAM[..split]).unwrap();
            demux.feed(&STREAM[split..]).unwrap();
            let (a, b) = decoded_rows(&demux.into_series());
            assert_eq!(a, vec![0xAAAAAAAA, 0xCCCCCCCC], "split at {split}");
            assert_eq!(b, vec![0xBBBB], "split at {split}");
        }
        // Byte-at-a-time worst case.
        let mut demux = RecordDemux::new(&layout).unwrap();
        for byte in STREAM {
            demux.feed(std::slice::from_ref(byte)).unwrap();
        }
        let (a, b) = decoded_rows(&demux.into_series());
        assert_eq!(a, vec![0xAAAAAAAA, 0xCCCCCCCC]);
        assert_eq!(b, vec![0xBBBB]);
    }

    #[test]
    fn implicit_single_record_type() {
        let layout = DataGroupLayout {
            record_id_width: 0,
            groups: vec![GroupLayout {
                name: None,
                record_id: 0,
                data_len: 4,
                invalidation_len: 0,
                cycle_count: 0,
                channels: vec![u32_channel("v", 0)],
            }],
        };
        let mut demux = RecordDemux::new(&layout).unwrap();
        demux
            .feed(&[0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00])
            .unwrap();
        let series = demux.into_series();
        assert_eq!(
            series[0].channels[0].values,
            SeriesValues::Double(vec![1.0, 2.0])
        );
    }

    #[test]
    fn unknown_record_id_aborts() {
        let layout = layout_two_types();
        let mut demux = RecordDemux::new(&layout).unwrap();
        let result = demux.feed(&[0x07, 0x00, 0x00]);
        assert!(matches!(
            result,
            Err(Error::UnknownRecordId { record_id: 7 })
        ));
    }

    #[test]
    fn duplicate_record_id_rejected_before_decoding() {
        let mut layout = layout_two_types();
        layout.groups[1].record_id = 0;
        assert!(matches!(
            RecordDemux::new(&layout),
            Err(Error::DuplicateRecordId { record_id: 0 })
        ));
    }

    #[test]
    fn empty_data_group_streams_zero_rows() {
        let layout = DataGroupLayout {
            record_id_width: 1,
            groups: Vec::new(),
        };
        let mut demux = RecordDemux::new(&layout).unwrap();
        assert_eq!(demux.feed(&[1, 2, 3, 4]).unwrap(), Control::Continue);
        assert_eq!(demux.total_rows(), 0);
        assert!(demux.into_series().is_empty());
    }

    #[test]
    fn stops_at_declared_cycle_count() {
        let layout = DataGroupLayout {
            record_id_width: 0,
            groups: vec![GroupLayout {
                name: None,
                record_id: 0,
                data_len: 1,
                invalidation_len: 0,
                cycle_count: 2,
                channels: vec![ChannelLayout {
                    bit_count: 8,
                    ..u32_channel("v", 0)
                }],
            }],
        };
        let mut demux = RecordDemux::new(&layout).unwrap();
        assert_eq!(demux.feed(&[1, 2, 3, 4, 5]).unwrap(), Control::Done);
        let series = demux.into_series();
        assert_eq!(series[0].channels[0].values, SeriesValues::Double(vec![1.0, 2.0]));
    }

    #[test]
    fn progress_reports_cumulative_rows() {
        let layout = DataGroupLayout {
            record_id_width: 0,
            groups: vec![GroupLayout {
                name: None,
                record_id: 0,
                data_len: 1,
                invalidation_len: 0,
                cycle_count: 0,
                channels: vec![ChannelLayout {
                    bit_count: 8,
                    ..u32_channel("v", 0)
                }],
            }],
        };
        let mut reports = Vec::new();
        {
            let mut demux =
                RecordDemux::new(&layout).unwrap().with_progress(3, |rows| reports.push(rows));
            demux.feed(&[0; 10]).unwrap();
        }
        assert_eq!(reports, vec![3, 6, 9]);
    }

    #[test]
    fn invalidation_bytes_are_skipped() {
        let layout = DataGroupLayout {
            record_id_width: 0,
            groups: vec![GroupLayout {
                name: None,
                record_id: 0,
                data_len: 2,
                invalidation_len: 1,
                cycle_count: 0,
                channels: vec![u16_channel("v")],
            }],
        };
        let mut demux = RecordDemux::new(&layout).unwrap();
        // Two records of 3 bytes each; the third byte is invalidation.
        demux.feed(&[0x01, 0x00, 0xFF, 0x02, 0x00, 0xFF]).unwrap();
        let series = demux.into_series();
        assert_eq!(series[0].channels[0].values, SeriesValues::Double(vec![1.0, 2.0]));
        assert_eq!(series[0].channels[0].values.get(0), Some(Sample::Double(1.0)));
    }
}
