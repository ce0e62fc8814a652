//! Basalt Region - Connection engine for a single RegionServer.
//!
//! A [`RegionClient`] multiplexes many concurrent calls over one TCP
//! connection. Producers enqueue [`Call`]s; a sender task batches them by
//! size threshold or flush interval and writes them in order; a receiver
//! task matches responses to calls by call ID, in whatever order the server
//! answers.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! let client = RegionClient::connect(RegionClientConfig::new("rs1", 16020)).await?;
//! let (call, rx) = ProtoCall::<GetRequest, GetResponse>::new("Get", request);
//! let call = Arc::new(call);
//! client.enqueue(call.clone())?;
//! let response = call.response_from(rx.await?)?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod call;
mod client;
mod config;
mod error;
mod queue;
mod registry;

pub use call::{Call, CallResult, ProtoCall, Response, ResultReceiver, ResultSink, SerializeError};
pub use client::RegionClient;
pub use config::{
    ConfigError, RegionClientConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_EFFECTIVE_USER,
    DEFAULT_FLUSH_INTERVAL, DEFAULT_QUEUE_SIZE, DEFAULT_SERVICE_NAME,
};
pub use error::{ConnectionError, RegionError, RegionResult, RemoteException};
