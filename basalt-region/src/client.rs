//! RegionServer connection engine.
//!
//! # Design
//!
//! One [`RegionClient`] owns one TCP connection and two background tasks:
//! - **Sender**: wakes when the flush interval elapses or a producer hands
//!   off a full batch, drains the pending queue, and writes each call as a
//!   length-prefixed frame under a fresh call ID.
//! - **Receiver**: reads response frames, matches them to in-flight calls by
//!   call ID, and completes each call's result sink.
//!
//! # Failure
//!
//! Any socket or protocol fault is terminal. The first fault is recorded,
//! the pending queue and the registry are closed, every call they held
//! receives [`RegionError::Unrecoverable`], and both tasks stop. Later
//! [`RegionClient::enqueue`] calls are rejected with the recorded fault.
//! Exceptions raised by the server fail only their own call.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use basalt_core::CallId;
use basalt_wire::{
    decode_response, encode_connection_preamble, encode_request, frame_length, ConnectionHeader,
    ResponseFrame, FRAME_HEADER_SIZE,
};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::call::Call;
use crate::config::RegionClientConfig;
use crate::error::{ConnectionError, RegionError, RegionResult};
use crate::queue::PendingQueue;
use crate::registry::CallRegistry;

/// State shared between the client handle and its two tasks.
struct Shared {
    addr: String,
    config: RegionClientConfig,
    queue: PendingQueue,
    registry: CallRegistry,
    /// First fatal fault; set at most once.
    terminal: OnceLock<ConnectionError>,
    shutdown: CancellationToken,
}

/// Calls left unwritten when the sender hit a fatal fault.
struct WriteFailure {
    cause: ConnectionError,
    unsent: Vec<Arc<dyn Call>>,
}

/// A multiplexed connection to one RegionServer.
///
/// Dropping the client closes the connection, failing every outstanding
/// call with `Unrecoverable(Closed)`. Share it behind an `Arc`.
pub struct RegionClient {
    shared: Arc<Shared>,
}

impl RegionClient {
    /// Connects to the RegionServer, sends the connection preamble, and
    /// starts the sender and receiver tasks.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the connection
    /// cannot be established, or the preamble cannot be written.
    pub async fn connect(config: RegionClientConfig) -> RegionResult<Self> {
        config.validate()?;

        let addr = config.addr();
        let mut stream = connect_with_timeout(&addr, config.connect_timeout).await?;

        let header = ConnectionHeader::new(
            config.effective_user.clone(),
            config.service_name.clone(),
        );
        stream
            .write_all(&encode_connection_preamble(&header))
            .await
            .map_err(|e| {
                RegionError::Unrecoverable(ConnectionError::io("writing connection preamble", e))
            })?;

        info!(
            addr = %addr,
            user = %config.effective_user,
            queue_size = config.queue_size,
            flush_interval_ms = u64::try_from(config.flush_interval.as_millis()).unwrap_or(u64::MAX),
            "Connected to RegionServer"
        );

        let (reader, writer) = stream.into_split();
        let shared = Arc::new(Shared {
            addr,
            queue: PendingQueue::new(config.queue_size),
            registry: CallRegistry::new(),
            terminal: OnceLock::new(),
            shutdown: CancellationToken::new(),
            config,
        });

        tokio::spawn(Shared::sender_loop(Arc::clone(&shared), writer));
        tokio::spawn(Shared::receiver_loop(Arc::clone(&shared), reader));

        Ok(Self { shared })
    }

    /// Queues a call to be written on the next flush.
    ///
    /// The result arrives on the call's result sink. If the call is
    /// cancelled before it is written, it is dropped without a result.
    ///
    /// # Errors
    /// Returns `RegionError::Unrecoverable` with the recorded fault if the
    /// connection has already failed. The call's sink is left untouched.
    pub fn enqueue(&self, call: Arc<dyn Call>) -> RegionResult<()> {
        self.shared
            .queue
            .push(call)
            .map_err(|_| RegionError::Unrecoverable(self.shared.terminal_error()))
    }

    /// Closes the connection, failing every pending and in-flight call.
    ///
    /// Has no effect if the connection already failed.
    pub fn close(&self) {
        self.shared.fail(ConnectionError::Closed, Vec::new());
    }

    /// Returns the `host:port` this client is connected to.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.shared.addr
    }

    /// Returns the RegionServer host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.shared.config.host
    }

    /// Returns the RegionServer port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.shared.config.port
    }

    /// Returns the configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &RegionClientConfig {
        &self.shared.config
    }

    /// Returns true once the connection has failed or been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.terminal.get().is_some()
    }

    /// Returns the fault that terminated the connection, if any.
    #[must_use]
    pub fn terminal_error(&self) -> Option<ConnectionError> {
        self.shared.terminal.get().cloned()
    }

    /// Returns the number of calls waiting to be written.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Returns the number of calls written and awaiting a response.
    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.shared.registry.len()
    }
}

impl Drop for RegionClient {
    fn drop(&mut self) {
        self.shared.fail(ConnectionError::Closed, Vec::new());
    }
}

impl std::fmt::Debug for RegionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionClient")
            .field("addr", &self.shared.addr)
            .field("terminal", &self.shared.terminal.get())
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Returns the recorded fault, or `Closed` if none was recorded.
    fn terminal_error(&self) -> ConnectionError {
        self.terminal
            .get()
            .cloned()
            .unwrap_or(ConnectionError::Closed)
    }

    /// Records `cause` (unless a fault was already recorded) and fails
    /// `unsent`, every queued call, and every in-flight call with the
    /// recorded fault. Safe to call any number of times.
    fn fail(&self, cause: ConnectionError, unsent: Vec<Arc<dyn Call>>) {
        if self.terminal.set(cause).is_ok() {
            match self.terminal.get() {
                Some(ConnectionError::Closed) => {
                    info!(addr = %self.addr, "Closing RegionServer connection");
                }
                Some(err) => {
                    error!(addr = %self.addr, error = %err, "RegionServer connection failed");
                }
                None => {}
            }
        }
        let err = RegionError::Unrecoverable(self.terminal_error());

        let pending = self.queue.close(unsent);
        let in_flight = self.registry.close();
        if !pending.is_empty() || !in_flight.is_empty() {
            warn!(
                addr = %self.addr,
                pending = pending.len(),
                in_flight = in_flight.len(),
                "Failing outstanding calls"
            );
        }
        for call in pending.iter().chain(in_flight.iter()) {
            call.result_sink().complete(Err(err.clone()));
        }

        self.shutdown.cancel();
    }

    /// Loop that writes queued calls to the RegionServer.
    async fn sender_loop(shared: Arc<Self>, mut writer: OwnedWriteHalf) {
        let mut last_id = CallId::default();

        loop {
            tokio::select! {
                biased;
                () = shared.shutdown.cancelled() => break,
                () = shared.queue.handed_off() => {}
                () = tokio::time::sleep(shared.config.flush_interval) => {}
            }

            let batch = shared.queue.drain();
            if batch.is_empty() {
                continue;
            }

            debug!(addr = %shared.addr, count = batch.len(), "Flushing calls");
            if let Err(failure) = shared.write_batch(&mut writer, &mut last_id, batch).await {
                shared.fail(failure.cause, failure.unsent);
                break;
            }
        }

        let _ = writer.shutdown().await;
        debug!(addr = %shared.addr, "Sender loop shutting down");
    }

    /// Writes a batch in order.
    ///
    /// Per-call failures complete that call and move on. A socket failure
    /// or shutdown stops the batch and returns the unwritten remainder.
    async fn write_batch(
        &self,
        writer: &mut OwnedWriteHalf,
        last_id: &mut CallId,
        batch: Vec<Arc<dyn Call>>,
    ) -> Result<(), WriteFailure> {
        let max_request = self.config.limits.max_request_bytes as usize;
        let mut calls = batch.into_iter();

        while let Some(call) = calls.next() {
            // Nothing is written once a fault has been recorded.
            if self.terminal.get().is_some() {
                let mut unsent = vec![call];
                unsent.extend(calls);
                return Err(WriteFailure {
                    cause: self.terminal_error(),
                    unsent,
                });
            }

            if call.cancellation().is_cancelled() {
                debug!(method = call.method_name(), "Skipping cancelled call");
                continue;
            }

            *last_id = last_id.next();
            let id = *last_id;

            let frame = match Self::encode_call(call.as_ref(), id, max_request) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(call_id = %id, error = %err, "Failed to encode call");
                    call.result_sink().complete(Err(err));
                    continue;
                }
            };

            // Register before writing so a fast response always finds its call.
            if let Err(call) = self.registry.register(id, Arc::clone(&call)) {
                let mut unsent = vec![call];
                unsent.extend(calls);
                return Err(WriteFailure {
                    cause: self.terminal_error(),
                    unsent,
                });
            }

            // A peer that stops reading must not hold the sender past close.
            let cause = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => Some(self.terminal_error()),
                result = writer.write_all(&frame) => {
                    result.err().map(|e| ConnectionError::io("writing request", e))
                }
            };

            if let Some(cause) = cause {
                // The receiver may already have failed this call.
                let mut unsent: Vec<_> = self.registry.take(id).into_iter().collect();
                unsent.extend(calls);
                return Err(WriteFailure { cause, unsent });
            }

            trace!(call_id = %id, method = call.method_name(), bytes = frame.len(), "Wrote call");
        }

        Ok(())
    }

    /// Serializes a call into a request frame.
    fn encode_call(call: &dyn Call, id: CallId, max_request: usize) -> RegionResult<Bytes> {
        let method = call.method_name();
        let payload = call.serialize().map_err(|e| RegionError::Serialize {
            method: method.to_string(),
            message: e.to_string(),
        })?;

        if payload.len() > max_request {
            return Err(RegionError::RequestTooLarge {
                method: method.to_string(),
                size: payload.len(),
                max: max_request,
            });
        }

        encode_request(id, method, &payload).map_err(|e| RegionError::Serialize {
            method: method.to_string(),
            message: e.to_string(),
        })
    }

    /// Loop that reads responses until the connection fails or shuts down.
    async fn receiver_loop(shared: Arc<Self>, mut reader: OwnedReadHalf) {
        let result = tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => Ok(()),
            result = shared.receive_responses(&mut reader) => result,
        };

        if let Err(err) = result {
            shared.fail(err, Vec::new());
        }
        debug!(addr = %shared.addr, "Receiver loop shutting down");
    }

    async fn receive_responses(&self, reader: &mut OwnedReadHalf) -> Result<(), ConnectionError> {
        let max_frame = self.config.limits.max_frame_bytes as usize;

        loop {
            let prefix = read_prefix(reader).await?;
            let len = frame_length(prefix, max_frame)?;

            let mut buf = vec![0u8; len];
            reader
                .read_exact(&mut buf)
                .await
                .map_err(|e| ConnectionError::io("reading response frame", e))?;

            let frame = decode_response(Bytes::from(buf))?;
            self.dispatch(frame)?;
        }
    }

    /// Completes the call a response frame answers.
    fn dispatch(&self, frame: ResponseFrame) -> Result<(), ConnectionError> {
        let Some(call) = self.registry.take(frame.call_id) else {
            error!(
                addr = %self.addr,
                call_id = %frame.call_id,
                outstanding = ?self.registry.ids(),
                "Received a response with an unexpected call ID"
            );
            return Err(ConnectionError::UnexpectedCallId(frame.call_id));
        };

        let result = match frame.exception {
            Some(exception) => {
                let err = RegionError::from_exception(exception);
                debug!(
                    call_id = %frame.call_id,
                    retryable = err.is_retryable(),
                    error = %err,
                    "Call failed on RegionServer"
                );
                Err(err)
            }
            None => {
                let mut response = call.new_response();
                response
                    .merge_from(frame.body)
                    .map(|()| response)
                    .map_err(|source| RegionError::Decode {
                        method: call.method_name().to_string(),
                        source,
                    })
            }
        };

        trace!(call_id = %frame.call_id, ok = result.is_ok(), "Completed call");
        call.result_sink().complete(result);
        Ok(())
    }
}

/// Reads a frame length prefix, treating end-of-stream before its first
/// byte as the peer closing the connection.
async fn read_prefix(
    reader: &mut OwnedReadHalf,
) -> Result<[u8; FRAME_HEADER_SIZE], ConnectionError> {
    let mut prefix = [0u8; FRAME_HEADER_SIZE];
    let n = reader
        .read(&mut prefix)
        .await
        .map_err(|e| ConnectionError::io("reading frame length", e))?;
    if n == 0 {
        return Err(ConnectionError::PeerClosed);
    }
    reader
        .read_exact(&mut prefix[n..])
        .await
        .map_err(|e| ConnectionError::io("reading frame length", e))?;
    Ok(prefix)
}

/// Connects to `addr` with a timeout.
///
/// The address is resolved at connection time to support hostnames.
async fn connect_with_timeout(addr: &str, timeout: Duration) -> RegionResult<TcpStream> {
    let connect_failed = |source: std::io::Error| RegionError::Connect {
        addr: addr.to_string(),
        source: Arc::new(source),
    };

    let connect_future = async {
        let mut addrs = tokio::net::lookup_host(addr).await?;
        let resolved = addrs.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no addresses found for {addr}"),
            )
        })?;
        TcpStream::connect(resolved).await
    };

    match tokio::time::timeout(timeout, connect_future).await {
        Ok(Ok(stream)) => {
            // Disable Nagle's algorithm; calls are already batched.
            stream.set_nodelay(true).map_err(connect_failed)?;
            Ok(stream)
        }
        Ok(Err(e)) => Err(connect_failed(e)),
        Err(_) => Err(connect_failed(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connection timed out",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop a listener to get a port nobody is listening on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = RegionClient::connect(RegionClientConfig::new("127.0.0.1", port)).await;
        assert!(matches!(result, Err(RegionError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let config = RegionClientConfig::new("127.0.0.1", 1).with_queue_size(0);
        let result = RegionClient::connect(config).await;
        assert!(matches!(result, Err(RegionError::Config(_))));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let client = RegionClient::connect(RegionClientConfig::new("127.0.0.1", port))
            .await
            .unwrap();
        let _server = accept.await.unwrap();

        assert!(!client.is_closed());
        assert_eq!(client.addr(), format!("127.0.0.1:{port}"));
        assert_eq!(client.host(), "127.0.0.1");
        assert_eq!(client.port(), port);

        client.close();
        client.close();
        assert!(client.is_closed());
        assert!(matches!(client.terminal_error(), Some(ConnectionError::Closed)));
        assert_eq!(client.pending_len(), 0);
        assert_eq!(client.in_flight_len(), 0);
    }
}
