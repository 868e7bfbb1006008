//! Capability map decoder.
//!
//! Arbitrary bytes must either fail to decode or decode to a map that
//! encodes and decodes back to itself.

#![no_main]

use busprobe_value::CapabilityMap;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(map) = CapabilityMap::decode(data) else {
        return;
    };
    let encoded = map.encode();
    let again = CapabilityMap::decode(&encoded).expect("re-encoded map must decode");
    assert_eq!(again, map);
});
