//! Concurrent lookups against one shared Reader.
//!
//! The byte range and metadata are immutable after open, so threads share
//! a single `&Reader` and a single compiled spec with no synchronization
//! of their own; only the per-thread state is mutable.

mod common;

use common::decoder_db;
use mmdb_sift::{Reader, RecordBuilder, RecordSpec, RecordSize};
use std::io::Write as _;

const THREADS: usize = 256;

#[derive(Default)]
struct Acc {
    string1: String,
    uint32: i64,
    prefix_len: u32,
}

fn spec() -> RecordSpec<Acc> {
    let mut b = RecordBuilder::<Acc>::new();
    b.on_network(|s: &mut Acc, _, pl| s.prefix_len = pl).unwrap();
    b.text("utf8_string", |s, v| {
        s.string1.clear();
        s.string1.push_str(v);
    })
    .unwrap();
    b.integer("uint32", |s, v| s.uint32 = v).unwrap();
    b.build()
}

fn run_threads(reader: &Reader) {
    let spec = spec();
    let addresses: Vec<std::net::IpAddr> = vec![
        "::1.1.1.0".parse().unwrap(),
        "::1.1.1.77".parse().unwrap(),
        "::9.9.9.9".parse().unwrap(),
    ];

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(THREADS);
        for i in 0..THREADS {
            let spec = &spec;
            let addresses = &addresses;
            handles.push(scope.spawn(move || {
                let address = addresses[i % addresses.len()];
                let mut acc = Acc::default();
                for _ in 0..50 {
                    acc.string1.clear();
                    acc.uint32 = 0;
                    reader.lookup(address, spec, &mut acc).unwrap();
                }
                acc
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            let acc = handle.join().unwrap();
            if i % addresses.len() == 2 {
                // The miss: network only.
                assert_eq!(acc.string1, "");
                assert_eq!(acc.uint32, 0);
            } else {
                assert_eq!(acc.string1, "unicode! ☯ - ♫");
                assert_eq!(acc.uint32, 268435456);
                assert_eq!(acc.prefix_len, 120);
            }
        }
    });
}

#[test]
fn concurrent_lookups_owned_buffer() {
    let reader = Reader::from_bytes(decoder_db(RecordSize::Bits24)).unwrap();
    run_threads(&reader);
}

#[test]
fn concurrent_lookups_mmap() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&decoder_db(RecordSize::Bits28)).unwrap();
    file.flush().unwrap();

    let reader = Reader::open(file.path()).unwrap();
    run_threads(&reader);
}

#[test]
fn close_races_with_lookups() {
    // Lookups either complete or fail with ClosedDatabase; nothing hangs
    // or corrupts.
    let reader = Reader::from_bytes(decoder_db(RecordSize::Bits24)).unwrap();
    let spec = spec();

    std::thread::scope(|scope| {
        let spec = &spec;
        let reader_ref = &reader;

        for _ in 0..8 {
            scope.spawn(move || {
                let address = "::1.1.1.0".parse().unwrap();
                let mut acc = Acc::default();
                for _ in 0..1000 {
                    match reader_ref.lookup(address, spec, &mut acc) {
                        Ok(()) => assert_eq!(acc.string1, "unicode! ☯ - ♫"),
                        Err(mmdb_sift::Error::ClosedDatabase) => break,
                        Err(other) => panic!("unexpected error: {}", other),
                    }
                }
            });
        }
        scope.spawn(move || {
            std::thread::yield_now();
            reader_ref.close();
        });
    });
}
