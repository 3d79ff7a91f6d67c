use crate::CodecError;

// ═══════════════════════════════════════════════════════════════
//  Confluent wire format: [0x00][schema id: u32 BE][avro datum]
// ═══════════════════════════════════════════════════════════════

pub const MAGIC_BYTE: u8 = 0x00;
pub const HEADER_LEN: usize = 5;

/// Split a frame into the writer schema id and the datum.
pub fn split(frame: &[u8]) -> Result<(u32, &[u8]), CodecError> {
    if frame.len() < HEADER_LEN {
        return Err(CodecError::ShortFrame(frame.len()));
    }
    if frame[0] != MAGIC_BYTE {
        return Err(CodecError::MagicByte(frame[0]));
    }
    let id = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
    Ok((id, &frame[HEADER_LEN..]))
}

pub fn frame(schema_id: u32, datum: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + datum.len());
    buf.push(MAGIC_BYTE);
    buf.extend_from_slice(&schema_id.to_be_bytes());
    buf.extend_from_slice(datum);
    buf
}
