//! RegionServer RPC wire protocol for Basalt.
//!
//! This crate implements the framing spoken between a client and a
//! RegionServer: the connection preamble, the connection header, and the
//! length-prefixed request/response frames whose headers are protobuf
//! messages.
//!
//! # Connection Setup
//!
//! ```text
//! ┌──────────┬─────────┬──────────┬───────────────┬────────────────────────┐
//! │ "HBas"   │ version │ auth     │ Length (4B)   │ ConnectionHeader       │
//! │ magic    │  0x00   │  0x50    │  big-endian   │ (user, service name)   │
//! └──────────┴─────────┴──────────┴───────────────┴────────────────────────┘
//! ```
//!
//! See [`codec`] for the request and response frame layouts.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod error;
pub mod proto;

pub use codec::{
    decode_request, decode_response, encode_connection_preamble, encode_request, encode_response,
    frame_length, DecodedRequest, ResponseFrame, FRAME_HEADER_SIZE, MAX_REQUEST_HEADER_BYTES,
    PREAMBLE,
};
pub use error::{WireError, WireResult};
pub use proto::{ConnectionHeader, ExceptionResponse, RequestHeader, ResponseHeader, UserInformation};
