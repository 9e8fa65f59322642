//! Record decoding throughput: aligned vs bit-packed extraction, and the
//! full demultiplexer loop.
//!
//! Run with: cargo bench --bench decode_benchmark

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mdf_stream::{
    ByteOrder, ChannelLayout, ChannelRole, DataGroupLayout, FieldKind, GroupLayout, RecordDemux,
    ValueDecoder,
};

fn channel(byte_offset: u32, bit_offset: u8, bit_count: u32) -> ChannelLayout {
    ChannelLayout {
        name: String::from("bench"),
        role: ChannelRole::Signal,
        kind: FieldKind::UnsignedInt,
        endian: ByteOrder::LittleEndian,
        byte_offset,
        bit_offset,
        bit_count,
    }
}

fn bench_extraction(c: &mut Criterion) {
    let record = [0x5Au8; 16];

    let aligned = ValueDecoder::new(&channel(0, 0, 32)).unwrap();
    c.bench_function("decode_aligned_u32", |b| {
        b.iter(|| aligned.decode(black_box(&record)).unwrap())
    });

    let packed = ValueDecoder::new(&channel(1, 3, 11)).unwrap();
    c.bench_function("decode_packed_11bit", |b| {
        b.iter(|| packed.decode(black_box(&record)).unwrap())
    });
}

fn bench_demux(c: &mut Criterion) {
    let layout = DataGroupLayout {
        record_id_width: 0,
        groups: vec![GroupLayout {
            name: None,
            record_id: 0,
            data_len: 8,
            invalidation_len: 0,
            cycle_count: 0,
            channels: vec![channel(0, 0, 32), channel(4, 0, 16), channel(6, 3, 9)],
        }],
    };
    let stream = vec![0xA5u8; 8 * 10_000];

    c.bench_function("demux_10k_rows_three_channels", |b| {
        b.iter(|| {
            let mut demux = RecordDemux::new(&layout).unwrap();
            demux.feed(black_box(&stream)).unwrap();
            demux.into_series()
        })
    });
}

criterion_group!(benches, bench_extraction, bench_demux);
criterion_main!(benches);
