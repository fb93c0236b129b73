#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Opening arbitrary bytes must fail cleanly, never crash or panic
    let _ = mmdb_sift::Reader::from_bytes(data.to_vec());
});
