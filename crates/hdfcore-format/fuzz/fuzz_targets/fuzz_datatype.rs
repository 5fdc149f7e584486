#![no_main]
use hdfcore_format::datatype::{decode, DecodeOptions, SIZE_UNBOUNDED};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let opts = DecodeOptions::default();
    if let Ok((dt, used)) = decode(data, data.len(), &opts) {
        assert!(used <= data.len());
        // Anything that decodes must re-encode and decode to the same structure.
        let bytes = dt.encode().expect("decoded type re-encodes");
        let (back, _) = decode(&bytes, SIZE_UNBOUNDED, &opts).expect("re-encoded type decodes");
        assert!(back.equivalent(&dt));
    }
    let relaxed = DecodeOptions {
        preserve_version: true,
        relaxed_integrity: true,
    };
    let _ = decode(data, SIZE_UNBOUNDED, &relaxed);
});
