#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = hdfcore_format::superblock::Superblock::decode(data);
    if let Ok(offset) = hdfcore_format::signature::find_signature(data) {
        let _ = hdfcore_format::superblock::Superblock::decode(&data[offset..]);
    }
});
