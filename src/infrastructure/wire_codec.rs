//! DER codec for vitals frames.
//!
//! ```text
//! VitalsFrame ::= SEQUENCE {
//!   timestamp            [0] IMPLICIT UTF8String,
//!   heartRate            [1] IMPLICIT NumericObservation OPTIONAL,
//!   meanArterialPressure [2] IMPLICIT NumericObservation OPTIONAL,
//!   spo2                 [3] IMPLICIT NumericObservation OPTIONAL,
//!   respiratoryRate      [4] IMPLICIT NumericObservation OPTIONAL,
//!   systolicBP           [5] IMPLICIT NumericObservation OPTIONAL,
//!   diastolicBP          [6] IMPLICIT NumericObservation OPTIONAL
//! }
//! NumericObservation ::= SEQUENCE { mdcCode INTEGER, unitCode INTEGER, value INTEGER }
//! ```
//!
//! Field tags come from the vital-sign table, so the codec never interprets
//! `mdcCode`/`unitCode`; it only carries them.

use bytes::{BufMut, Bytes, BytesMut};

use crate::domain::errors::DecodeError;
use crate::domain::vitals::{NumericObservation, VitalSign, VitalsFrame};

const TAG_INTEGER: u8 = 0x02;
const TAG_SEQUENCE: u8 = 0x30;
/// First byte of every frame.
pub(crate) const FRAME_TAG: u8 = TAG_SEQUENCE;
const TAG_TIMESTAMP: u8 = 0x80;
const CONTEXT_CONSTRUCTED: u8 = 0xA0;

/// Longest length field accepted, in bytes after the 0x8N marker.
const MAX_LENGTH_OCTETS: usize = 4;

struct Header {
    tag: u8,
    header_len: usize,
    content_len: usize,
}

fn read_header(buf: &[u8]) -> Result<Option<Header>, DecodeError> {
    let Some(&tag) = buf.first() else {
        return Ok(None);
    };
    if tag & 0x1F == 0x1F {
        return Err(DecodeError::malformed(format!(
            "high tag number form not supported (tag {tag:#04x})"
        )));
    }

    let Some(&first) = buf.get(1) else {
        return Ok(None);
    };
    if first < 0x80 {
        return Ok(Some(Header {
            tag,
            header_len: 2,
            content_len: first as usize,
        }));
    }

    let octets = (first & 0x7F) as usize;
    if octets == 0 {
        return Err(DecodeError::malformed("indefinite length"));
    }
    if octets > MAX_LENGTH_OCTETS {
        return Err(DecodeError::malformed(format!("length field of {octets} octets")));
    }
    let Some(length_bytes) = buf.get(2..2 + octets) else {
        return Ok(None);
    };
    if length_bytes[0] == 0 {
        return Err(DecodeError::malformed("non-minimal length"));
    }

    let content_len = length_bytes
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    if content_len < 0x80 {
        return Err(DecodeError::malformed("non-minimal length"));
    }

    Ok(Some(Header {
        tag,
        header_len: 2 + octets,
        content_len,
    }))
}

/// Splits one complete TLV off the front of `buf`, returning `(tag, content, rest)`.
fn take_tlv(buf: &[u8]) -> Result<(u8, &[u8], &[u8]), DecodeError> {
    let header = read_header(buf)?.ok_or_else(|| DecodeError::malformed("truncated header"))?;
    let end = header
        .header_len
        .checked_add(header.content_len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| {
            DecodeError::malformed(format!(
                "truncated value: declared {} bytes, {} available",
                header.content_len,
                buf.len().saturating_sub(header.header_len)
            ))
        })?;

    Ok((header.tag, &buf[header.header_len..end], &buf[end..]))
}

fn decode_integer(content: &[u8]) -> Result<i64, DecodeError> {
    match content {
        [] => return Err(DecodeError::malformed("empty integer")),
        [0x00, next, ..] if next & 0x80 == 0 => {
            return Err(DecodeError::malformed("non-minimal integer"));
        }
        [0xFF, next, ..] if next & 0x80 != 0 => {
            return Err(DecodeError::malformed("non-minimal integer"));
        }
        _ if content.len() > 8 => {
            return Err(DecodeError::malformed(format!(
                "integer of {} bytes is not representable",
                content.len()
            )));
        }
        _ => {}
    }

    let seed: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    Ok(content
        .iter()
        .fold(seed, |acc, &b| (acc << 8) | b as i64))
}

fn decode_observation(content: &[u8]) -> Result<NumericObservation, DecodeError> {
    let (tag, body, rest) = take_tlv(content)?;
    if tag != TAG_SEQUENCE || !rest.is_empty() {
        return Err(DecodeError::malformed("observation is not a single SEQUENCE"));
    }

    let mut values = [0i64; 3];
    let mut remaining = body;
    for slot in values.iter_mut() {
        let (tag, int, rest) = take_tlv(remaining)?;
        if tag != TAG_INTEGER {
            return Err(DecodeError::malformed(format!(
                "expected INTEGER in observation, found tag {tag:#04x}"
            )));
        }
        *slot = decode_integer(int)?;
        remaining = rest;
    }
    if !remaining.is_empty() {
        return Err(DecodeError::malformed("trailing data in observation"));
    }

    let [mdc_code, unit_code, value] = values;
    Ok(NumericObservation::new(mdc_code, unit_code, value))
}

/// Decodes exactly one frame; `bytes` must hold nothing else.
pub fn decode(bytes: &[u8]) -> Result<VitalsFrame, DecodeError> {
    let (tag, body, rest) = take_tlv(bytes)?;
    if tag != TAG_SEQUENCE {
        return Err(DecodeError::malformed(format!(
            "frame must be a SEQUENCE, found tag {tag:#04x}"
        )));
    }
    if !rest.is_empty() {
        return Err(DecodeError::malformed(format!(
            "{} trailing bytes after frame",
            rest.len()
        )));
    }

    let (tag, timestamp, mut remaining) = take_tlv(body)?;
    if tag != TAG_TIMESTAMP {
        return Err(DecodeError::malformed("frame must start with its timestamp"));
    }
    let timestamp = std::str::from_utf8(timestamp)
        .map_err(|e| DecodeError::malformed(format!("timestamp is not UTF-8: {e}")))?;

    let mut frame = VitalsFrame::new(timestamp);
    let mut last_tag = 0u8;
    while !remaining.is_empty() {
        let (tag, content, rest) = take_tlv(remaining)?;
        if tag & 0xE0 != CONTEXT_CONSTRUCTED {
            return Err(DecodeError::malformed(format!("unexpected tag {tag:#04x}")));
        }

        let field = tag & 0x1F;
        let sign = VitalSign::from_field_tag(field)
            .ok_or_else(|| DecodeError::malformed(format!("unknown field [{field}]")))?;
        if field <= last_tag {
            return Err(DecodeError::malformed(format!(
                "field [{field}] out of order or repeated"
            )));
        }
        last_tag = field;

        frame.observations.insert(sign, decode_observation(content)?);
        remaining = rest;
    }

    Ok(frame)
}

/// Total size of the frame at the front of `buf`, once its header has arrived.
///
/// `Ok(None)` means more bytes are needed to know. Anything that cannot start a
/// frame, or declares more than `max_len` bytes, is an error.
pub fn frame_length(buf: &[u8], max_len: usize) -> Result<Option<usize>, DecodeError> {
    if let Some(&tag) = buf.first() {
        if tag != TAG_SEQUENCE {
            return Err(DecodeError::malformed(format!(
                "frame must be a SEQUENCE, found tag {tag:#04x}"
            )));
        }
    }

    let Some(header) = read_header(buf)? else {
        return Ok(None);
    };
    let total = header.header_len + header.content_len;
    if total > max_len {
        return Err(DecodeError::malformed(format!(
            "frame of {total} bytes exceeds limit of {max_len}"
        )));
    }
    Ok(Some(total))
}

/// Size of the TLV at the front of `buf` when its header parses and all of it is buffered.
pub(crate) fn complete_tlv_len(buf: &[u8]) -> Option<usize> {
    let header = read_header(buf).ok().flatten()?;
    header
        .header_len
        .checked_add(header.content_len)
        .filter(|&len| len <= buf.len())
}

fn put_length(out: &mut BytesMut, len: usize) {
    if len < 0x80 {
        out.put_u8(len as u8);
        return;
    }
    let bytes = (len as u64).to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    out.put_u8(0x80 | (bytes.len() - skip) as u8);
    out.put_slice(&bytes[skip..]);
}

fn put_tlv(out: &mut BytesMut, tag: u8, content: &[u8]) {
    out.put_u8(tag);
    put_length(out, content.len());
    out.put_slice(content);
}

fn put_integer(out: &mut BytesMut, value: i64) {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    // strip redundant sign octets
    while start < bytes.len() - 1 {
        let (b, next) = (bytes[start], bytes[start + 1]);
        if (b == 0x00 && next & 0x80 == 0) || (b == 0xFF && next & 0x80 != 0) {
            start += 1;
        } else {
            break;
        }
    }
    put_tlv(out, TAG_INTEGER, &bytes[start..]);
}

fn encode_observation(observation: &NumericObservation) -> BytesMut {
    let mut ints = BytesMut::with_capacity(18);
    put_integer(&mut ints, observation.mdc_code);
    put_integer(&mut ints, observation.unit_code);
    put_integer(&mut ints, observation.value);

    let mut seq = BytesMut::with_capacity(ints.len() + 2);
    put_tlv(&mut seq, TAG_SEQUENCE, &ints);
    seq
}

pub fn encode(frame: &VitalsFrame) -> Bytes {
    let mut body = BytesMut::with_capacity(128);
    put_tlv(&mut body, TAG_TIMESTAMP, frame.timestamp.as_bytes());
    for (sign, observation) in &frame.observations {
        put_tlv(
            &mut body,
            CONTEXT_CONSTRUCTED | sign.field_tag(),
            &encode_observation(observation),
        );
    }

    let mut out = BytesMut::with_capacity(body.len() + 4);
    put_tlv(&mut out, TAG_SEQUENCE, &body);
    out.freeze()
}
