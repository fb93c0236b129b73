#![no_main]
use libfuzzer_sys::fuzz_target;
use mmdb_sift::{Reader, RecordBuilder};

fuzz_target!(|data: &[u8]| {
    // If the image opens, lookups over corrupt trees and data sections
    // must surface errors instead of panicking or reading out of bounds.
    let Ok(reader) = Reader::from_bytes(data.to_vec()) else {
        return;
    };

    let mut builder = RecordBuilder::<u64>::new();
    let _ = builder.on_network(|count: &mut u64, _, _| *count += 1);
    let _ = builder.text("utf8_string", |_, _| {});
    let _ = builder.integer("uint32", |_, _| {});
    let spec = builder.build();

    let mut count = 0u64;
    let _ = reader.lookup_bytes(&[1, 1, 1, 1], &spec, &mut count);
    let _ = reader.lookup_bytes(&[0; 16], &spec, &mut count);
    let _ = reader.lookup_bytes(&[255; 16], &spec, &mut count);
});
