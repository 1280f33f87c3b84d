//! Opaque pagination keys handed to clients.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use pixur_tasks::UserEventKey;
use pixur_types::Status;

const EVENT_KEY_LEN: usize = 3 * 8;

pub fn encode_event_key(key: &UserEventKey) -> String {
    let mut buf = Vec::with_capacity(EVENT_KEY_LEN);
    buf.extend_from_slice(&key.user_id.to_be_bytes());
    buf.extend_from_slice(&key.created_ts.to_be_bytes());
    buf.extend_from_slice(&key.index.to_be_bytes());
    B64.encode(buf)
}

pub fn decode_event_key(raw: &str) -> Result<UserEventKey, Status> {
    let buf = B64
        .decode(raw)
        .map_err(|e| Status::invalid_argument("bad user event key").with_cause(e))?;
    if buf.len() != EVENT_KEY_LEN {
        return Err(Status::invalid_argument("bad user event key"));
    }
    let field = |i: usize| {
        let mut b = [0u8; 8];
        b.copy_from_slice(&buf[i * 8..(i + 1) * 8]);
        i64::from_be_bytes(b)
    };
    Ok(UserEventKey {
        user_id: field(0),
        created_ts: field(1),
        index: field(2),
    })
}
