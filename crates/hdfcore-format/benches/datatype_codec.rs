use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hdfcore_format::datatype::{
    decode, CompoundBuilder, Datatype, DecodeOptions, EncodeOptions, EnumBuilder,
};
use hdfcore_format::checksum::lookup3;

fn wide_compound() -> Datatype {
    let mut b = CompoundBuilder::new();
    for i in 0..64 {
        let member = match i % 4 {
            0 => Datatype::native_i32(),
            1 => Datatype::native_f64(),
            2 => Datatype::array(Datatype::native_u16(), &[4, 2]).unwrap(),
            _ => EnumBuilder::new(Datatype::native_i8())
                .value_i64("OFF", 0)
                .value_i64("ON", 1)
                .build()
                .unwrap(),
        };
        b = b.member(&format!("field_{i:02}"), member);
    }
    b.build().unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let dt = wide_compound();
    c.bench_function("encode_compound_64", |b| {
        b.iter(|| black_box(&dt).encode().unwrap())
    });
    c.bench_function("encode_compound_64_v3", |b| {
        let opts = EncodeOptions::at_least(3);
        b.iter(|| black_box(&dt).encode_with(&opts).unwrap())
    });
}

fn bench_decode(c: &mut Criterion) {
    let bytes = wide_compound().encode().unwrap();
    let opts = DecodeOptions::default();
    c.bench_function("decode_compound_64", |b| {
        b.iter(|| decode(black_box(&bytes), bytes.len(), &opts).unwrap())
    });
}

fn bench_checksum(c: &mut Criterion) {
    let data = vec![0xA5u8; 4096];
    c.bench_function("lookup3_4k", |b| b.iter(|| lookup3(black_box(&data))));
}

criterion_group!(benches, bench_encode, bench_decode, bench_checksum);
criterion_main!(benches);
