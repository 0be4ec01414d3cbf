//! Purpose: Generate document identifiers for the collection store.
//! Exports: `next_object_id`, `is_object_id`.
//! Role: Twelve-byte ids rendered as 24 lowercase hex characters.
//! Invariants: Layout is 4-byte seconds, 5 process-random bytes, 3-byte counter (all big-endian).
//! Invariants: The counter wraps at 2^24 and is seeded randomly per process.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use getrandom::fill as fill_random;

use crate::core::error::{Error, ErrorKind};

const COUNTER_MASK: u32 = 0x00ff_ffff;

struct ProcessState {
    unique: [u8; 5],
    counter: AtomicU32,
}

static PROCESS_STATE: OnceLock<ProcessState> = OnceLock::new();

pub fn next_object_id() -> Result<String, Error> {
    let state = process_state()?;
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("system clock is before the unix epoch")
                .with_source(err)
        })?
        .as_secs() as u32;
    let counter = state.counter.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;
    Ok(format_object_id(seconds, state.unique, counter))
}

pub fn is_object_id(value: &str) -> bool {
    value.len() == 24 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn process_state() -> Result<&'static ProcessState, Error> {
    if let Some(state) = PROCESS_STATE.get() {
        return Ok(state);
    }
    let mut bytes = [0u8; 8];
    fill_random(&mut bytes).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message(format!("failed to seed object ids: {err}"))
    })?;
    Ok(PROCESS_STATE.get_or_init(|| ProcessState {
        unique: [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]],
        counter: AtomicU32::new(u32::from_be_bytes([0, bytes[5], bytes[6], bytes[7]])),
    }))
}

fn format_object_id(seconds: u32, unique: [u8; 5], counter: u32) -> String {
    let mut raw = [0u8; 12];
    raw[0..4].copy_from_slice(&seconds.to_be_bytes());
    raw[4..9].copy_from_slice(&unique);
    raw[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
    hex_encode(&raw)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(nibble_hex(byte >> 4));
        out.push(nibble_hex(byte & 0x0f));
    }
    out
}

fn nibble_hex(nibble: u8) -> char {
    match nibble {
        0..=9 => char::from(b'0' + nibble),
        _ => char::from(b'a' + (nibble - 10)),
    }
}

#[cfg(test)]
mod tests {
    use super::{format_object_id, is_object_id, next_object_id};
    use std::collections::HashSet;

    #[test]
    fn layout_is_seconds_unique_counter() {
        let id = format_object_id(0x65a1_f0c2, [0xe4, 0xb0, 0xa1, 0xb2, 0xc3], 0x00d4_e5f6);
        assert_eq!(id, "65a1f0c2e4b0a1b2c3d4e5f6");
    }

    #[test]
    fn counter_keeps_low_three_bytes() {
        let id = format_object_id(1, [0; 5], 0xff00_0001);
        assert!(id.ends_with("000001"));
    }

    #[test]
    fn generated_ids_are_unique_hex() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = next_object_id().expect("object id");
            assert!(is_object_id(&id), "{id}");
            assert!(seen.insert(id));
        }
    }
}
