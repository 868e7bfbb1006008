//! Reference capability maps.
//!
//! These are the maps a well-behaved client sends, from the bare minimum to
//! maps stuffed with typed extras and multilingual strings. They seed fuzz
//! corpora and pin the codec against known byte layouts.

use crate::capability::{
    CapabilityMap, CLIENT_SERVER_SOCKET_KEY, MESSAGE_FLAGS_KEY, META_OBJECT_CACHE_KEY,
    REMOTE_CANCELABLE_CALLS_KEY,
};
use crate::value::Value;

/// Credentials accepted by the reference test peer.
pub const DEFAULT_USER: &str = "nao";
pub const DEFAULT_TOKEN: &str = "nao";

/// `{auth_user: "nao", auth_token: "nao"}`.
pub fn credentials_only() -> CapabilityMap {
    CapabilityMap::with_credentials(DEFAULT_USER, DEFAULT_TOKEN)
}

/// Credentials plus the four feature flags.
pub fn with_features() -> CapabilityMap {
    let mut map = credentials_only();
    map.insert(CLIENT_SERVER_SOCKET_KEY, true);
    map.insert(MESSAGE_FLAGS_KEY, true);
    map.insert(META_OBJECT_CACHE_KEY, true);
    map.insert(REMOTE_CANCELABLE_CALLS_KEY, true);
    map
}

/// Feature map plus eighteen typed fields at the edges of their ranges.
pub fn with_extras() -> CapabilityMap {
    let extras: [Value; 18] = [
        Value::Bool(true),
        Value::Bool(false),
        Value::Int8(0),
        Value::Int8(-42),
        Value::Uint8(0),
        Value::Uint8(42),
        Value::Int16(0),
        Value::Int16(-42),
        Value::Uint16(0),
        Value::Uint16(42),
        Value::Int32(0),
        Value::Int32(42),
        Value::Int64(0),
        Value::Int64(42 << 42),
        Value::Float32(-1.234),
        Value::Float32(0.0),
        Value::String(String::new()),
        Value::String("keep testing".to_string()),
    ];
    let mut map = with_features();
    for (i, value) in extras.into_iter().enumerate() {
        map.insert(format!("Another field {}", i + 1), value);
    }
    map
}

/// Extras map plus one sentence per script.
pub fn with_strings() -> CapabilityMap {
    let texts = [
        ("Arabic", "أنا قادر على أكل الزجاج و هذا لا يؤلمني."),
        ("Bulgarian", "Мога да ям стъкло, то не ми вреди."),
        ("Chinese", "我能吞下玻璃而不伤身体。"),
        ("German", "Ich kann Glas essen, ohne mir zu schaden. Größe Übermaß"),
        ("Greek", "Μπορώ να φάω σπασμένα γυαλιά χωρίς να πάθω τίποτα."),
        ("Hebrew", "אני יכול לאכול זכוכית וזה לא מזיק לי."),
        ("Hindi", "मैं काँच खा सकता हूँ और मुझे उससे कोई चोट नहीं पहुंचती."),
        ("Icelandic", "Ég get etið gler án þess að meiða mig."),
        ("Japanese", "私はガラスを食べられます。それは私を傷つけません。"),
        ("Korean", "나는 유리를 먹을 수 있어요. 그래도 아프지 않아요"),
        ("Sanskrit", "काचं शक्नोम्यत्तुम् । नोपहिनस्ति माम् ॥"),
        ("Thai", "ฉันกินกระจกได้ แต่มันไม่ทำให้ฉันเจ็บ"),
    ];
    let mut map = with_extras();
    for (script, text) in texts {
        map.insert(script, text);
    }
    map
}

/// Every sample with its corpus name.
pub fn all_samples() -> Vec<(&'static str, CapabilityMap)> {
    vec![
        ("basic", credentials_only()),
        ("nao", with_features()),
        ("extra", with_extras()),
        ("strings", with_strings()),
    ]
}
