//! RegionServer RPC frame codec.
//!
//! # Wire Format
//!
//! ```text
//! Request:
//! ┌──────────────┬──────────────┬───────────────┬──────────────┬──────────┐
//! │ Length (4B)  │ varint       │ RequestHeader │ varint       │ Payload  │
//! │  big-endian  │ header len   │ (call id, …)  │ payload len  │          │
//! └──────────────┴──────────────┴───────────────┴──────────────┴──────────┘
//!
//! Response:
//! ┌──────────────┬──────────────┬────────────────┬──────────────┬─────────┐
//! │ Length (4B)  │ varint       │ ResponseHeader │ varint       │ Body    │
//! │  big-endian  │ header len   │ (call id, exc) │ body len     │         │
//! └──────────────┴──────────────┴────────────────┴──────────────┴─────────┘
//! ```
//!
//! The leading length covers everything after itself. A request header's
//! length is a single byte, so headers above [`MAX_REQUEST_HEADER_BYTES`]
//! (in practice, very long method names) are rejected. The body section of
//! a response is absent when the header carries an exception.

use basalt_core::CallId;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::encoding::{decode_varint, encode_varint, encoded_len_varint};
use prost::Message;

use crate::error::{WireError, WireResult};
use crate::proto::{ConnectionHeader, ExceptionResponse, RequestHeader, ResponseHeader};

/// Magic, version byte, and authentication byte (`0x50` = simple auth).
pub const PREAMBLE: [u8; 6] = *b"HBas\x00\x50";

/// Size of the big-endian length prefix on every frame.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest request header whose varint length fits in one byte.
pub const MAX_REQUEST_HEADER_BYTES: usize = 127;

/// Encodes the bytes that open a connection: preamble, then the
/// length-prefixed connection header.
#[must_use]
pub fn encode_connection_preamble(header: &ConnectionHeader) -> Bytes {
    let data = header.encode_to_vec();
    let mut buf = BytesMut::with_capacity(PREAMBLE.len() + FRAME_HEADER_SIZE + data.len());
    buf.put_slice(&PREAMBLE);
    write_length(&mut buf, data.len());
    buf.put_slice(&data);
    buf.freeze()
}

/// Encodes a complete request frame, length prefix included.
///
/// # Errors
///
/// Returns `WireError::HeaderTooLarge` if the header exceeds
/// [`MAX_REQUEST_HEADER_BYTES`], or an error if it fails to encode.
pub fn encode_request(call_id: CallId, method_name: &str, payload: &[u8]) -> WireResult<Bytes> {
    let header = RequestHeader {
        call_id: Some(call_id.get()),
        method_name: Some(method_name.to_string()),
        request_param: Some(true),
        priority: None,
    };

    let header_len = header.encoded_len();
    if header_len > MAX_REQUEST_HEADER_BYTES {
        return Err(WireError::HeaderTooLarge {
            size: header_len,
            max: MAX_REQUEST_HEADER_BYTES,
        });
    }
    let body_len = encoded_len_varint(header_len as u64)
        + header_len
        + encoded_len_varint(payload.len() as u64)
        + payload.len();

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + body_len);
    write_length(&mut buf, body_len);
    header.encode_length_delimited(&mut buf)?;
    encode_varint(payload.len() as u64, &mut buf);
    buf.put_slice(payload);

    debug_assert_eq!(buf.len(), FRAME_HEADER_SIZE + body_len);
    Ok(buf.freeze())
}

/// A request frame as seen by a RegionServer.
#[derive(Debug, Clone)]
pub struct DecodedRequest {
    /// The request header.
    pub header: RequestHeader,
    /// The serialized request parameter.
    pub payload: Bytes,
}

/// Decodes a request frame payload (length prefix already stripped).
///
/// # Errors
///
/// Returns an error if a length-delimited section is truncated or the
/// header fails to decode.
pub fn decode_request(mut frame: Bytes) -> WireResult<DecodedRequest> {
    let header_len = read_delimited_len(&mut frame)?;
    let header = RequestHeader::decode(frame.split_to(header_len))?;

    let payload = if header.request_param.unwrap_or(false) {
        let payload_len = read_delimited_len(&mut frame)?;
        frame.split_to(payload_len)
    } else {
        Bytes::new()
    };

    Ok(DecodedRequest { header, payload })
}

/// A response frame as seen by the client.
#[derive(Debug, Clone)]
pub struct ResponseFrame {
    /// Call this response answers.
    pub call_id: CallId,
    /// Server-side exception, if the call failed.
    pub exception: Option<ExceptionResponse>,
    /// Serialized response body; empty when `exception` is set.
    pub body: Bytes,
}

/// Decodes a response frame payload (length prefix already stripped).
///
/// # Errors
///
/// Returns an error if the header fails to decode, carries no call ID, or a
/// length-delimited section is truncated.
pub fn decode_response(mut frame: Bytes) -> WireResult<ResponseFrame> {
    let header_len = read_delimited_len(&mut frame)?;
    let header = ResponseHeader::decode(frame.split_to(header_len))?;
    let call_id = header.call_id.map(CallId::new).ok_or(WireError::MissingCallId)?;

    let body = if header.exception.is_none() && frame.has_remaining() {
        let body_len = read_delimited_len(&mut frame)?;
        frame.split_to(body_len)
    } else {
        Bytes::new()
    };

    Ok(ResponseFrame {
        call_id,
        exception: header.exception,
        body,
    })
}

/// Encodes a complete response frame, length prefix included.
///
/// # Errors
///
/// Returns an error if the response header fails to encode.
pub fn encode_response(
    call_id: CallId,
    exception: Option<ExceptionResponse>,
    body: &[u8],
) -> WireResult<Bytes> {
    let has_body = exception.is_none();
    let header = ResponseHeader {
        call_id: Some(call_id.get()),
        exception,
    };

    let header_len = header.encoded_len();
    let mut body_len = encoded_len_varint(header_len as u64) + header_len;
    if has_body {
        body_len += encoded_len_varint(body.len() as u64) + body.len();
    }

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + body_len);
    write_length(&mut buf, body_len);
    header.encode_length_delimited(&mut buf)?;
    if has_body {
        encode_varint(body.len() as u64, &mut buf);
        buf.put_slice(body);
    }

    Ok(buf.freeze())
}

/// Parses a frame length prefix and checks it against `max`.
///
/// # Errors
///
/// Returns `WireError::FrameTooLarge` if the announced length exceeds `max`.
pub fn frame_length(prefix: [u8; FRAME_HEADER_SIZE], max: usize) -> WireResult<usize> {
    let size = u32::from_be_bytes(prefix) as usize;
    if size > max {
        return Err(WireError::FrameTooLarge { size, max });
    }
    Ok(size)
}

/// Writes a big-endian u32 length prefix.
fn write_length(buf: &mut BytesMut, len: usize) {
    // Safety: frames are bounded by MAX_FRAME_BYTES (64 MB), well under u32::MAX.
    #[allow(clippy::cast_possible_truncation)]
    let len = len as u32;
    buf.put_u32(len);
}

/// Reads a varint length and checks that many bytes remain.
fn read_delimited_len(frame: &mut Bytes) -> WireResult<usize> {
    let len = decode_varint(frame)?;
    let len = usize::try_from(len).map_err(|_| WireError::truncated(usize::MAX, frame.len()))?;
    if len > frame.len() {
        return Err(WireError::truncated(len, frame.len()));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_prefix(mut frame: Bytes) -> Bytes {
        let len = frame.get_u32() as usize;
        assert_eq!(len, frame.len(), "length prefix must cover the rest of the frame");
        frame
    }

    #[test]
    fn test_preamble_layout() {
        let header = ConnectionHeader::new("gopher", "ClientService");
        let encoded = encode_connection_preamble(&header);

        assert_eq!(&encoded[..6], b"HBas\x00\x50");
        let len = u32::from_be_bytes([encoded[6], encoded[7], encoded[8], encoded[9]]) as usize;
        assert_eq!(len, encoded.len() - 10);

        let decoded = ConnectionHeader::decode(&encoded[10..]).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_request_frame_layout() {
        let frame = encode_request(CallId::new(1), "Get", b"payload").unwrap();

        // Header is 9 bytes (see proto tests), so its length is a single byte.
        assert_eq!(frame[4], 9);
        let total = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(total, 1 + 9 + 1 + 7);
        assert_eq!(&frame[frame.len() - 7..], b"payload");
        assert_eq!(frame[4 + 1 + 9], 7);
    }

    #[test]
    fn test_request_header_length_stays_one_byte() {
        // call_id (2) + method tag and length (2) + request_param (2).
        let longest = "m".repeat(MAX_REQUEST_HEADER_BYTES - 6);
        let frame = encode_request(CallId::new(1), &longest, b"").unwrap();
        assert_eq!(frame[4] as usize, MAX_REQUEST_HEADER_BYTES);
        let decoded = decode_request(strip_prefix(frame)).unwrap();
        assert_eq!(decoded.header.method_name.as_deref(), Some(longest.as_str()));

        let too_long = "m".repeat(MAX_REQUEST_HEADER_BYTES - 5);
        assert!(matches!(
            encode_request(CallId::new(1), &too_long, b""),
            Err(WireError::HeaderTooLarge { size: 128, max: 127 })
        ));
    }

    #[test]
    fn test_request_decodes_on_server_side() {
        let frame = encode_request(CallId::new(42), "Mutate", b"\x01\x02\x03").unwrap();
        let decoded = decode_request(strip_prefix(frame)).unwrap();

        assert_eq!(decoded.header.call_id, Some(42));
        assert_eq!(decoded.header.method_name.as_deref(), Some("Mutate"));
        assert_eq!(decoded.header.request_param, Some(true));
        assert_eq!(decoded.payload, Bytes::from_static(b"\x01\x02\x03"));
    }

    #[test]
    fn test_response_with_body() {
        let frame = encode_response(CallId::new(7), None, b"result").unwrap();
        let decoded = decode_response(strip_prefix(frame)).unwrap();

        assert_eq!(decoded.call_id, CallId::new(7));
        assert!(decoded.exception.is_none());
        assert_eq!(decoded.body, Bytes::from_static(b"result"));
    }

    #[test]
    fn test_response_with_exception_has_no_body() {
        let exception = ExceptionResponse {
            exception_class_name: Some("java.io.IOException".to_string()),
            stack_trace: Some("at Foo.bar()".to_string()),
            ..Default::default()
        };
        let frame = encode_response(CallId::new(3), Some(exception.clone()), b"ignored").unwrap();
        let decoded = decode_response(strip_prefix(frame)).unwrap();

        assert_eq!(decoded.call_id, CallId::new(3));
        assert_eq!(decoded.exception, Some(exception));
        assert!(decoded.body.is_empty());
    }

    #[test]
    fn test_response_without_call_id() {
        let header = ResponseHeader {
            call_id: None,
            exception: None,
        };
        let mut buf = BytesMut::new();
        header.encode_length_delimited(&mut buf).unwrap();

        let result = decode_response(buf.freeze());
        assert!(matches!(result, Err(WireError::MissingCallId)));
    }

    #[test]
    fn test_response_truncated_body() {
        let frame = encode_response(CallId::new(1), None, b"0123456789").unwrap();
        let mut payload = strip_prefix(frame);
        payload.truncate(payload.len() - 3);

        let result = decode_response(payload);
        assert!(matches!(result, Err(WireError::Truncated { need: 10, have: 7 })));
    }

    #[test]
    fn test_response_garbage_header() {
        // Length 2, then an invalid wire type (7) for field 1.
        let result = decode_response(Bytes::from_static(&[0x02, 0x0f, 0x00]));
        assert!(matches!(result, Err(WireError::HeaderDecode(_))));
    }

    #[test]
    fn test_frame_length_limit() {
        assert_eq!(frame_length([0, 0, 0, 10], 10).unwrap(), 10);
        assert!(matches!(
            frame_length([0, 0, 0, 11], 10),
            Err(WireError::FrameTooLarge { size: 11, max: 10 })
        ));
    }
}
