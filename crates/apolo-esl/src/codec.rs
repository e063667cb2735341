//! ESL wire framing
//!
//! A frame is a header block terminated by a blank line, followed by
//! exactly `Content-Length` bytes of body when that header is present.
//! Commands go out as a line terminated by a blank line.

use crate::event::EslEvent;
use apolo_core::error::AppError;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Largest header block accepted before the stream is declared corrupt
const MAX_HEADER_BYTES: usize = 64 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct EslCodec;

fn header_end(src: &[u8]) -> Option<usize> {
    src.windows(2).position(|w| w == b"\n\n")
}

impl Decoder for EslCodec {
    type Item = EslEvent;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Stray newlines between frames
        while src.first() == Some(&b'\n') {
            let _ = src.split_to(1);
        }

        let Some(end) = header_end(src) else {
            if src.len() > MAX_HEADER_BYTES {
                return Err(AppError::EslProtocol(format!(
                    "header block exceeds {} bytes",
                    MAX_HEADER_BYTES
                )));
            }
            return Ok(None);
        };

        let envelope = EslEvent::parse(&String::from_utf8_lossy(&src[..end]));
        let body_len = envelope.content_length().unwrap_or(0);
        let frame_len = end + 2 + body_len;

        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let _ = src.split_to(end + 2);
        let body = src.split_to(body_len);
        let body = (body_len > 0).then(|| String::from_utf8_lossy(&body).into_owned());

        Ok(Some(envelope.with_body(body)))
    }
}

impl Encoder<String> for EslCodec {
    type Error = AppError;

    fn encode(&mut self, command: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let command = command.trim_end();
        if command.contains("\n\n") {
            return Err(AppError::EslProtocol(
                "command must not contain a blank line".to_string(),
            ));
        }
        dst.reserve(command.len() + 2);
        dst.put_slice(command.as_bytes());
        dst.put_slice(b"\n\n");
        Ok(())
    }
}
