use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::core::{Error, CHECKSUM_SIZE, END_OF_MESSAGE};
use super::checksum::{Checksum, SumChecksum};
use super::message::Message;

/// Longest possible frame: type + switch payload with battery + checksum +
/// delimiter
pub const MAX_FRAME_SIZE: usize = 1 + 7 + CHECKSUM_SIZE + 1;

/// Protocol message codec for encoding/decoding framed messages
///
/// Each frame is `[type:1][payload][checksum:2][0x0D]`. The checksum covers
/// the type and payload bytes. Decoding scans for the delimiter; frames that
/// fail checksum validation or carry an unrecognized type code are discarded
/// silently, since the sender's retry policy is the sole recovery mechanism.
#[derive(Clone, Default)]
pub struct SbCodec<C: Checksum = SumChecksum> {
    checksum: C,
}

impl SbCodec {
    /// Creates a codec using the default checksum
    pub fn new() -> Self {
        SbCodec {
            checksum: SumChecksum,
        }
    }
}

impl<C: Checksum> SbCodec<C> {
    /// Creates a codec using a custom checksum implementation
    ///
    /// Both ends of the link must use the same one.
    pub fn with_checksum(checksum: C) -> Self {
        SbCodec { checksum }
    }
}

impl<C: Checksum> Decoder for SbCodec<C> {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == END_OF_MESSAGE) else {
                if src.len() > MAX_FRAME_SIZE {
                    // No delimiter within the longest possible frame: drop
                    // leading garbage so the buffer cannot grow unbounded
                    let excess = src.len() - MAX_FRAME_SIZE;
                    trace!(dropped = excess, "no frame delimiter, discarding leading bytes");
                    src.advance(excess);
                }
                return Ok(None);
            };

            // Take the frame including its delimiter, then work on the body
            let frame = src.split_to(pos + 1);
            let body = &frame[..pos];

            if body.len() < 1 + CHECKSUM_SIZE {
                trace!(len = body.len(), "frame too short, discarding");
                continue;
            }

            let (content, trailer) = body.split_at(body.len() - CHECKSUM_SIZE);
            let mut received = [0u8; CHECKSUM_SIZE];
            received.copy_from_slice(trailer);
            let computed = self.checksum.compute(content);
            if received != computed {
                // Discarded, not surfaced: the sender's retry policy is the
                // sole recovery mechanism
                warn!(
                    error = %Error::Checksum { computed, received },
                    "discarding frame"
                );
                continue;
            }

            match Message::parse(content[0], &content[1..]) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => {
                    // Unrecognized or malformed content is ignored, not fatal
                    trace!(error = %e, "discarding unparseable frame");
                    continue;
                }
            }
        }
    }
}

impl<C: Checksum> Encoder<Message> for SbCodec<C> {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();

        dst.put_u8(item.type_code());
        item.encode_payload(dst);

        let trailer = self.checksum.compute(&dst[start..]);
        dst.extend_from_slice(&trailer);
        dst.put_u8(END_OF_MESSAGE);

        Ok(())
    }
}
