use bytes::{BufMut, BytesMut};

use crate::error::TransportError;
use crate::event::ControlEvent;

/// Codec for control-event datagrams.
///
/// A datagram is one event in plain text, with no framing. Used with
/// `tokio_util::udp::UdpFramed`, so `decode` consumes the whole buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventCodec;

impl tokio_util::codec::Decoder for EventCodec {
    type Item = ControlEvent;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let datagram = src.split();
        let text = String::from_utf8_lossy(&datagram);
        // C senders sometimes include the terminator.
        Ok(Some(ControlEvent::parse(text.trim_end_matches('\0'))))
    }
}

impl tokio_util::codec::Encoder<ControlEvent> for EventCodec {
    type Error = TransportError;

    fn encode(&mut self, item: ControlEvent, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let text = item.to_string();
        dst.reserve(text.len());
        dst.put_slice(text.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::codec::{Decoder, Encoder};

    #[test]
    fn decode_consumes_whole_datagram() {
        let mut buf = BytesMut::from(&b"Button 3 pressed\0"[..]);
        let event = EventCodec.decode(&mut buf).unwrap();
        assert_eq!(event, Some(ControlEvent::ButtonPressed(3)));
        assert!(buf.is_empty());
        assert_eq!(EventCodec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn encode_writes_text_only() {
        let mut buf = BytesMut::new();
        EventCodec
            .encode(ControlEvent::Axis { axis: 1, value: -32768 }, &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"Axis 1 value: -32768");
    }

    #[test]
    fn invalid_utf8_is_kept_as_opaque_text() {
        let mut buf = BytesMut::from(&[0xFFu8, b'h', b'i'][..]);
        let event = EventCodec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(event, ControlEvent::Other(text) if text.ends_with("hi")));
    }
}
