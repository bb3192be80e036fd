use rand::RngCore;
use serde_json::json;

pub fn random_bytes(size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    rand::rng().fill_bytes(&mut buf);
    buf
}

/// A JSON event whose `data` field carries `size` random bytes, hex encoded.
pub fn event_payload(kind: &str, size: usize) -> Vec<u8> {
    let data: String = random_bytes(size)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();
    let event = json!({
        "event_type": kind,
        "data": data,
    });
    serde_json::to_vec(&event).unwrap_or_default()
}

pub fn small_event() -> Vec<u8> {
    event_payload("conformance.small", 16)
}

pub fn medium_event() -> Vec<u8> {
    event_payload("conformance.medium", 1024)
}
