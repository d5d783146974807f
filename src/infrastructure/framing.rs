// Stream framing - Splits accumulated connection bytes into DER frames
use bytes::{Buf, BytesMut};

use crate::domain::errors::DecodeError;
use crate::domain::vitals::VitalsFrame;
use crate::infrastructure::wire_codec;

#[derive(Debug)]
pub struct FrameAccumulator {
    buf: BytesMut,
    max_frame_len: usize,
}

impl FrameAccumulator {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_frame_len.min(64 * 1024)),
            max_frame_len,
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete frame, or `None` until more bytes arrive.
    ///
    /// Bytes that cannot start a valid frame are dropped as one malformed unit:
    /// the whole TLV when its header parses and it is fully buffered, otherwise
    /// everything up to the next byte that could open a frame.
    pub fn next_frame(&mut self) -> Option<Result<VitalsFrame, DecodeError>> {
        match wire_codec::frame_length(&self.buf, self.max_frame_len) {
            Ok(Some(len)) if self.buf.len() >= len => {
                let frame = self.buf.split_to(len);
                Some(wire_codec::decode(&frame))
            }
            Ok(_) => None,
            Err(e) => {
                let skip = self.malformed_unit_len();
                self.buf.advance(skip);
                Some(Err(e))
            }
        }
    }

    fn malformed_unit_len(&self) -> usize {
        wire_codec::complete_tlv_len(&self.buf).unwrap_or_else(|| {
            self.buf[1..]
                .iter()
                .position(|&b| b == wire_codec::FRAME_TAG)
                .map_or(self.buf.len(), |pos| pos + 1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vitals::VitalSign;

    fn frame(hr: i64) -> VitalsFrame {
        VitalsFrame::from_readings("t", [(VitalSign::HeartRate, hr)])
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let bytes = wire_codec::encode(&frame(70));
        let mut frames = FrameAccumulator::new(4096);

        frames.extend(&bytes[..3]);
        assert!(frames.next_frame().is_none());
        frames.extend(&bytes[3..]);
        assert_eq!(frames.next_frame().unwrap().unwrap(), frame(70));
        assert!(frames.next_frame().is_none());
        assert_eq!(frames.buffered(), 0);
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let mut chunk = wire_codec::encode(&frame(70)).to_vec();
        chunk.extend_from_slice(&wire_codec::encode(&frame(71)));
        let mut frames = FrameAccumulator::new(4096);
        frames.extend(&chunk);

        assert_eq!(frames.next_frame().unwrap().unwrap(), frame(70));
        assert_eq!(frames.next_frame().unwrap().unwrap(), frame(71));
        assert!(frames.next_frame().is_none());
    }

    #[test]
    fn test_garbage_dropped_then_resync() {
        let mut frames = FrameAccumulator::new(4096);
        frames.extend(b"not a frame");
        assert!(frames.next_frame().unwrap().is_err());
        assert_eq!(frames.buffered(), 0);

        frames.extend(&wire_codec::encode(&frame(72)));
        assert_eq!(frames.next_frame().unwrap().unwrap(), frame(72));
    }

    #[test]
    fn test_noise_and_frame_in_one_chunk() {
        let mut chunk = b"\x04\x03bad".to_vec();
        chunk.extend_from_slice(&wire_codec::encode(&frame(74)));
        let mut frames = FrameAccumulator::new(4096);
        frames.extend(&chunk);

        assert!(frames.next_frame().unwrap().is_err());
        assert_eq!(frames.next_frame().unwrap().unwrap(), frame(74));
        assert!(frames.next_frame().is_none());
    }

    #[test]
    fn test_unparseable_noise_skips_to_next_sequence() {
        // high tag number form cannot be parsed as a header at all
        let mut chunk = vec![0x1F, 0xFF, 0x01];
        chunk.extend_from_slice(&wire_codec::encode(&frame(75)));
        let mut frames = FrameAccumulator::new(4096);
        frames.extend(&chunk);

        assert!(frames.next_frame().unwrap().is_err());
        assert_eq!(frames.next_frame().unwrap().unwrap(), frame(75));
    }

    #[test]
    fn test_malformed_body_consumes_only_its_frame() {
        // well-formed outer header around a body that is not a timestamp
        let mut chunk = vec![0x30, 0x02, 0x04, 0x00];
        chunk.extend_from_slice(&wire_codec::encode(&frame(73)));
        let mut frames = FrameAccumulator::new(4096);
        frames.extend(&chunk);

        assert!(frames.next_frame().unwrap().is_err());
        assert_eq!(frames.next_frame().unwrap().unwrap(), frame(73));
    }

    #[test]
    fn test_oversized_frame_dropped() {
        let bytes = wire_codec::encode(&VitalsFrame::new("x".repeat(200)));
        let mut frames = FrameAccumulator::new(64);
        frames.extend(&bytes);

        assert!(frames.next_frame().unwrap().is_err());
        assert_eq!(frames.buffered(), 0);
    }
}
