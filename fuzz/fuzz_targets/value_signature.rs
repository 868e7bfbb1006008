//! Signature parser and value decoder.
//!
//! The input is split at the first NUL: the head is parsed as a signature,
//! the tail decoded under it.

#![no_main]

use busprobe_value::{Signature, Value};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let split = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let Ok(text) = std::str::from_utf8(&data[..split]) else {
        return;
    };
    let Ok(signature) = Signature::parse(text) else {
        return;
    };
    assert_eq!(
        Signature::parse(&signature.to_string()).expect("printed signature must parse"),
        signature
    );

    let body = data.get(split + 1..).unwrap_or_default();
    if let Ok(value) = Value::decode_with(&signature, body) {
        let encoded = value.encode();
        assert_eq!(Value::decode_with(&signature, &encoded).ok(), Some(value));
    }
});
