//! End-to-end tests for lookup + selective decoding.
//!
//! Databases are built in memory by the support writer in `common` and
//! carry a record mirroring the classic MaxMind test-decoder contents at
//! ::1.1.1.0/120.

mod common;

use common::{build_db, decoder_db, Value};
use mmdb_sift::{Callback, Error, Reader, RecordBuilder, RecordSpec, RecordSize};
use std::fmt::Write as _;
use std::io::Write as _;
use std::net::IpAddr;

#[derive(Default)]
struct Acc {
    string1: String,
    double1: f64,
    double2: f64,
    int1: i64,
    int2: i64,
    int3: i64,
    flag: bool,
    raw: Vec<u8>,
    u64_bytes: Vec<u8>,
    u128_bytes: Vec<u8>,
    prefix_len: Option<u32>,
    network_calls: u32,
    queried: Vec<u8>,
    begins: u32,
    ends: u32,
    trace: String,
}

fn addr(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// The full areas-of-interest spec used by most tests below.
fn full_spec() -> RecordSpec<Acc> {
    let mut b = RecordBuilder::<Acc>::new();
    b.on_network(|s: &mut Acc, address, pl| {
        s.network_calls += 1;
        s.prefix_len = Some(pl);
        s.queried.clear();
        s.queried.extend_from_slice(address);
    })
    .unwrap();
    b.on_begin(|s: &mut Acc| s.begins += 1).unwrap();
    b.on_end(|s: &mut Acc| s.ends += 1).unwrap();
    b.text("utf8_string", |s, v| {
        s.string1.clear();
        s.string1.push_str(v);
    })
    .unwrap();
    b.number("double", |s, v| s.double1 = v).unwrap();
    b.number("float", |s, v| s.double2 = v).unwrap();
    b.integer("uint16", |s, v| s.int1 = v).unwrap();
    b.integer("uint32", |s, v| s.int2 = v).unwrap();
    b.integer("int32", |s, v| s.int3 = v).unwrap();
    b.boolean("boolean", |s, v| s.flag = v).unwrap();
    b.bytes("bytes", |s, v| {
        s.raw.clear();
        s.raw.extend_from_slice(v);
    })
    .unwrap();
    b.big_int("uint64", |s, v| {
        s.u64_bytes.clear();
        s.u64_bytes.extend_from_slice(v);
    })
    .unwrap();
    b.big_int("uint128", |s, v| {
        s.u128_bytes.clear();
        s.u128_bytes.extend_from_slice(v);
    })
    .unwrap();
    b.build()
}

fn assert_full_record(acc: &Acc) {
    assert_eq!(acc.string1, "unicode! ☯ - ♫");
    assert!((acc.double1 - 42.123456).abs() < 1e-9);
    assert!((acc.double2 - 1.1).abs() < 1e-6);
    assert_eq!(acc.int1, 100);
    assert_eq!(acc.int2, 268435456);
    assert_eq!(acc.int3, -268435456);
    assert!(acc.flag);
    assert_eq!(acc.raw, vec![0, 0, 0, 42]);
    assert_eq!(acc.u64_bytes, 1152921504606846976u64.to_be_bytes().to_vec());
    let mut u128_expected = vec![0u8; 16];
    u128_expected[0] = 1; // 1 << 120
    assert_eq!(acc.u128_bytes, u128_expected);
}

#[test]
fn decodes_all_value_types() {
    let reader = Reader::from_bytes(decoder_db(RecordSize::Bits24)).unwrap();
    let spec = full_spec();

    let mut acc = Acc::default();
    reader.lookup(addr("::1.1.1.0"), &spec, &mut acc).unwrap();

    assert_full_record(&acc);
    assert_eq!(acc.network_calls, 1);
    assert_eq!(acc.prefix_len, Some(120));
    assert_eq!(acc.begins, 1);
    assert_eq!(acc.ends, 1);
}

#[test]
fn same_results_across_record_sizes() {
    for record_size in [RecordSize::Bits24, RecordSize::Bits28, RecordSize::Bits32] {
        let reader = Reader::from_bytes(decoder_db(record_size)).unwrap();
        let spec = full_spec();
        let mut acc = Acc::default();
        reader.lookup(addr("::1.1.1.0"), &spec, &mut acc).unwrap();
        assert_full_record(&acc);
        assert_eq!(acc.prefix_len, Some(120), "record size {:?}", record_size);
    }
}

#[test]
fn same_results_from_mmap_and_stream() {
    let image = decoder_db(RecordSize::Bits24);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&image).unwrap();
    file.flush().unwrap();

    for reader in [
        Reader::open(file.path()).unwrap(),
        Reader::from_read(&image[..]).unwrap(),
    ] {
        let spec = full_spec();
        let mut acc = Acc::default();
        reader.lookup(addr("::1.1.1.0"), &spec, &mut acc).unwrap();
        assert_full_record(&acc);
    }
}

#[test]
fn ipv4_query_uses_the_mapped_subtree() {
    let reader = Reader::from_bytes(decoder_db(RecordSize::Bits24)).unwrap();
    let spec = full_spec();

    let mut acc = Acc::default();
    reader
        .lookup_bytes(&[1, 1, 1, 3], &spec, &mut acc)
        .unwrap();

    assert_full_record(&acc);
    // The 96 skipped bits are not part of the reported prefix.
    assert_eq!(acc.prefix_len, Some(24));
    assert_eq!(acc.queried, vec![1, 1, 1, 3]);
}

#[test]
fn miss_reports_network_but_no_record() {
    let reader = Reader::from_bytes(decoder_db(RecordSize::Bits24)).unwrap();
    let spec = full_spec();

    let mut acc = Acc::default();
    reader.lookup(addr("::9.9.9.9"), &spec, &mut acc).unwrap();

    assert_eq!(acc.network_calls, 1);
    // The walk leaves the tree at the first bit diverging from the only
    // stored network: 96 zero bits + 4 shared leading zeros + 1.
    assert_eq!(acc.prefix_len, Some(101));
    assert_eq!(acc.begins, 0, "no data record, no object_begin");
    assert_eq!(acc.string1, "");
}

#[test]
fn nested_object_path() {
    let reader = Reader::from_bytes(decoder_db(RecordSize::Bits24)).unwrap();

    let mut b = RecordBuilder::<Acc>::new();
    b.obj("map")
        .unwrap()
        .obj("mapX")
        .unwrap()
        .text("utf8_stringX", |s: &mut Acc, v| {
            s.string1.clear();
            s.string1.push_str(v);
        })
        .unwrap();
    let spec = b.build();

    let mut acc = Acc::default();
    reader.lookup(addr("::1.1.1.0"), &spec, &mut acc).unwrap();
    assert_eq!(acc.string1, "hello");
}

#[test]
fn array_per_index_dispatch() {
    let reader = Reader::from_bytes(decoder_db(RecordSize::Bits24)).unwrap();

    let mut b = RecordBuilder::<Acc>::new();
    b.array(
        "array",
        Some(Box::new(|s: &mut Acc, n| {
            write!(s.trace, "(Start:{})", n).unwrap();
        })),
        vec![
            Callback::integer(|s: &mut Acc, v| write!(s.trace, "(Even:{})", v).unwrap()),
            Callback::integer(|s: &mut Acc, v| write!(s.trace, "(Odd:{})", v).unwrap()),
        ],
        |s: &mut Acc, i, n| {
            write!(s.trace, "(Index:{}/{})", i, n).unwrap();
            Some(i % 2)
        },
        Some(Box::new(|s: &mut Acc| s.trace.push_str("(End)"))),
    )
    .unwrap();
    let spec = b.build();

    let mut acc = Acc::default();
    reader.lookup(addr("::1.1.1.0"), &spec, &mut acc).unwrap();
    assert_eq!(
        acc.trace,
        "(Start:3)(Index:0/3)(Even:1)(Index:1/3)(Odd:2)(Index:2/3)(Even:3)(End)"
    );
}

#[test]
fn array_inside_nested_object() {
    let reader = Reader::from_bytes(decoder_db(RecordSize::Bits24)).unwrap();

    let mut b = RecordBuilder::<Acc>::new();
    b.obj("map")
        .unwrap()
        .obj("mapX")
        .unwrap()
        .array(
            "arrayX",
            Some(Box::new(|s: &mut Acc, n| {
                write!(s.trace, "(Start:{})", n).unwrap();
            })),
            vec![Callback::integer(|s: &mut Acc, v| {
                write!(s.trace, "({})", v).unwrap();
            })],
            |_: &mut Acc, _, _| Some(0),
            Some(Box::new(|s: &mut Acc| s.trace.push_str("(End)"))),
        )
        .unwrap();
    let spec = b.build();

    let mut acc = Acc::default();
    reader.lookup(addr("::1.1.1.0"), &spec, &mut acc).unwrap();
    assert_eq!(acc.trace, "(Start:3)(7)(8)(9)(End)");
}

#[test]
fn empty_spec_fires_only_network() {
    let reader = Reader::from_bytes(decoder_db(RecordSize::Bits24)).unwrap();

    let mut b = RecordBuilder::<Acc>::new();
    b.on_network(|s: &mut Acc, _, pl| {
        s.network_calls += 1;
        s.prefix_len = Some(pl);
    })
    .unwrap();
    let spec = b.build();

    let mut acc = Acc::default();
    reader.lookup(addr("::1.1.1.0"), &spec, &mut acc).unwrap();

    assert_eq!(acc.network_calls, 1);
    assert_eq!(acc.prefix_len, Some(120));
    assert_eq!(acc.string1, "");
    assert_eq!(acc.int1, 0);
    assert_eq!(acc.begins, 0);
}

#[test]
fn subset_spec_matches_full_decode() {
    let reader = Reader::from_bytes(decoder_db(RecordSize::Bits24)).unwrap();

    let full = full_spec();
    let mut full_acc = Acc::default();
    reader.lookup(addr("::1.1.1.0"), &full, &mut full_acc).unwrap();

    // Interest in two late keys only; everything in between is skipped
    // and must leave the cursor aligned.
    let mut b = RecordBuilder::<Acc>::new();
    b.integer("uint32", |s, v| s.int2 = v).unwrap();
    b.text("utf8_string", |s, v| {
        s.string1.clear();
        s.string1.push_str(v);
    })
    .unwrap();
    let subset = b.build();

    let mut subset_acc = Acc::default();
    reader
        .lookup(addr("::1.1.1.0"), &subset, &mut subset_acc)
        .unwrap();

    assert_eq!(subset_acc.int2, full_acc.int2);
    assert_eq!(subset_acc.string1, full_acc.string1);
}

#[test]
fn type_mismatch_skips_instead_of_firing() {
    let reader = Reader::from_bytes(decoder_db(RecordSize::Bits24)).unwrap();

    // "utf8_string" holds a string; an integer callback must not fire,
    // and later fields must still decode.
    let mut b = RecordBuilder::<Acc>::new();
    b.integer("utf8_string", |s, v| s.int1 = v).unwrap();
    b.integer("uint32", |s, v| s.int2 = v).unwrap();
    let spec = b.build();

    let mut acc = Acc::default();
    reader.lookup(addr("::1.1.1.0"), &spec, &mut acc).unwrap();
    assert_eq!(acc.int1, 0);
    assert_eq!(acc.int2, 268435456);
}

#[test]
fn longest_prefix_match_wins() {
    let image = build_db(
        4,
        RecordSize::Bits24,
        &[
            ("10.0.0.1", Value::map(vec![("level", Value::U16(32))])),
            ("10.0.0.0/24", Value::map(vec![("level", Value::U16(24))])),
            ("10.0.0.0/8", Value::map(vec![("level", Value::U16(8))])),
        ],
    );
    let reader = Reader::from_bytes(image).unwrap();

    let mut b = RecordBuilder::<Acc>::new();
    b.on_network(|s: &mut Acc, _, pl| s.prefix_len = Some(pl))
        .unwrap();
    b.integer("level", |s, v| s.int1 = v).unwrap();
    let spec = b.build();

    // The most specific data must win regardless of insertion order. Only
    // the exact-host route keeps its original prefix length in the tree;
    // split prefixes sit at the depth the carve-out pushed them to.
    for (address, level) in [("10.0.0.1", 32i64), ("10.0.0.2", 24), ("10.1.2.3", 8)] {
        let mut acc = Acc::default();
        reader.lookup(addr(address), &spec, &mut acc).unwrap();
        assert_eq!(acc.int1, level, "level for {}", address);
    }

    let mut acc = Acc::default();
    reader.lookup(addr("10.0.0.1"), &spec, &mut acc).unwrap();
    assert_eq!(acc.prefix_len, Some(32));
}

#[test]
fn metadata_is_fully_exposed() {
    let reader = Reader::from_bytes(decoder_db(RecordSize::Bits28)).unwrap();
    let metadata = reader.metadata();

    assert_eq!(metadata.binary_format_major_version, 2);
    assert_eq!(metadata.binary_format_minor_version, 0);
    assert_eq!(metadata.build_epoch, 1700000000);
    assert_eq!(metadata.database_type, "mmdb-sift-test");
    assert_eq!(metadata.description["en"], "synthetic test database");
    assert_eq!(metadata.ip_version, 6);
    assert_eq!(metadata.languages, vec!["en".to_string()]);
    assert!(metadata.node_count > 0);
    assert_eq!(metadata.record_size, 28);
}

#[test]
fn close_is_idempotent_and_fails_lookups() {
    let reader = Reader::from_bytes(decoder_db(RecordSize::Bits24)).unwrap();
    let spec = full_spec();

    let mut acc = Acc::default();
    reader.lookup(addr("::1.1.1.0"), &spec, &mut acc).unwrap();

    reader.close();
    reader.close();

    let err = reader
        .lookup(addr("::1.1.1.0"), &spec, &mut acc)
        .unwrap_err();
    assert_eq!(err, Error::ClosedDatabase);

    // Metadata stays readable after close.
    assert_eq!(reader.metadata().database_type, "mmdb-sift-test");
}

#[test]
fn garbage_is_rejected() {
    let err = Reader::from_bytes(vec![0u8; 256]).unwrap_err();
    assert!(matches!(err, Error::InvalidDatabase(_)));
}
