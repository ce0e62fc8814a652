//! Calls and their results.
//!
//! A [`Call`] is produced by a higher layer (Get, Put, Scan, ...) and handed
//! to the connection engine. The engine serializes it, assigns a call ID,
//! writes it, and eventually completes its [`ResultSink`] exactly once, or
//! never, if the call was cancelled before being written.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::RegionError;

/// Error returned by [`Call::serialize`].
pub type SerializeError = Box<dyn std::error::Error + Send + Sync>;

/// What a call's caller eventually receives.
pub type CallResult = Result<Box<dyn Response>, RegionError>;

/// Receiving end of a call's result.
pub type ResultReceiver = oneshot::Receiver<CallResult>;

/// A decoded response body.
///
/// Implemented for every prost message, so call implementations normally
/// just return `Box::new(SomeResponse::default())` from
/// [`Call::new_response`].
pub trait Response: fmt::Debug + Send + Sync + 'static {
    /// Merges a serialized body into this response.
    ///
    /// # Errors
    /// Returns an error if the body is not a valid encoding.
    fn merge_from(&mut self, body: Bytes) -> Result<(), prost::DecodeError>;

    /// Borrows the response as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Converts the response into `Any` for downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<M> Response for M
where
    M: prost::Message + 'static,
{
    fn merge_from(&mut self, body: Bytes) -> Result<(), prost::DecodeError> {
        self.merge(body)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl dyn Response {
    /// Downcasts a boxed response to its concrete message type.
    ///
    /// # Errors
    /// Returns the response unchanged (as `Any`) if it is not an `M`.
    pub fn downcast<M: Response>(self: Box<Self>) -> Result<Box<M>, Box<dyn Any + Send>> {
        self.into_any().downcast::<M>()
    }

    /// Borrows the response as `M`, if it is one.
    #[must_use]
    pub fn downcast_ref<M: Response>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }
}

/// One-shot destination for a call's result.
///
/// Completing twice is impossible: the first [`ResultSink::complete`] takes
/// the sender, later attempts are no-ops.
pub struct ResultSink {
    tx: Mutex<Option<oneshot::Sender<CallResult>>>,
}

impl ResultSink {
    /// Creates a sink and the receiver its result will arrive on.
    #[must_use]
    pub fn channel() -> (Self, ResultReceiver) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Delivers `result`. Returns false if a result was already delivered.
    pub fn complete(&self, result: CallResult) -> bool {
        let tx = self.tx.lock().expect("result sink lock poisoned").take();
        match tx {
            Some(tx) => {
                // A dropped receiver means the caller stopped waiting.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Returns true once a result has been delivered.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.tx.lock().expect("result sink lock poisoned").is_none()
    }
}

impl fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSink")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// A unit of RPC work.
pub trait Call: Send + Sync + 'static {
    /// Service method to invoke (e.g. `Get`).
    fn method_name(&self) -> &str;

    /// Serializes the request parameter.
    ///
    /// # Errors
    /// A failure fails this call only.
    fn serialize(&self) -> Result<Bytes, SerializeError>;

    /// Creates an empty response for the body to be merged into.
    fn new_response(&self) -> Box<dyn Response>;

    /// Token the caller cancels to abandon the call.
    fn cancellation(&self) -> &CancellationToken;

    /// Where the call's result is delivered.
    fn result_sink(&self) -> &ResultSink;
}

impl fmt::Debug for dyn Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("method", &self.method_name())
            .field("cancelled", &self.cancellation().is_cancelled())
            .field("sink", self.result_sink())
            .finish()
    }
}

/// A call whose request and response are prost messages.
pub struct ProtoCall<Req, Resp> {
    method: String,
    request: Req,
    cancellation: CancellationToken,
    sink: ResultSink,
    _response: PhantomData<fn() -> Resp>,
}

impl<Req, Resp> ProtoCall<Req, Resp>
where
    Req: prost::Message + 'static,
    Resp: prost::Message + Default + 'static,
{
    /// Creates a call for `method` with a fresh cancellation token.
    #[must_use]
    pub fn new(method: impl Into<String>, request: Req) -> (Self, ResultReceiver) {
        Self::with_cancellation(method, request, CancellationToken::new())
    }

    /// Creates a call for `method` tied to `cancellation`.
    #[must_use]
    pub fn with_cancellation(
        method: impl Into<String>,
        request: Req,
        cancellation: CancellationToken,
    ) -> (Self, ResultReceiver) {
        let (sink, rx) = ResultSink::channel();
        let call = Self {
            method: method.into(),
            request,
            cancellation,
            sink,
            _response: PhantomData,
        };
        (call, rx)
    }

    /// Returns the request message.
    #[must_use]
    pub const fn request(&self) -> &Req {
        &self.request
    }

    /// Extracts the typed response from a call result.
    ///
    /// # Errors
    /// Returns the call's error, or `UnexpectedResponse` if the response is
    /// not a `Resp`.
    pub fn response_from(&self, result: CallResult) -> Result<Resp, RegionError> {
        let response = result?;
        response
            .downcast::<Resp>()
            .map(|boxed| *boxed)
            .map_err(|_| RegionError::UnexpectedResponse {
                method: self.method.clone(),
            })
    }
}

impl<Req, Resp> Call for ProtoCall<Req, Resp>
where
    Req: prost::Message + 'static,
    Resp: prost::Message + Default + 'static,
{
    fn method_name(&self) -> &str {
        &self.method
    }

    fn serialize(&self) -> Result<Bytes, SerializeError> {
        Ok(Bytes::from(self.request.encode_to_vec()))
    }

    fn new_response(&self) -> Box<dyn Response> {
        Box::new(Resp::default())
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    fn result_sink(&self) -> &ResultSink {
        &self.sink
    }
}

impl<Req, Resp> fmt::Debug for ProtoCall<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtoCall")
            .field("method", &self.method)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}
