//! Protobuf messages exchanged around every RPC.
//!
//! These mirror the subset of `RPC.proto` the client needs. Only the
//! headers live here; request and response bodies are opaque bytes owned by
//! the operation that issued the call.

/// Identity of the user the connection acts on behalf of.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct UserInformation {
    /// User the RegionServer authorizes requests as.
    #[prost(string, required, tag = "1")]
    pub effective_user: String,
    /// User that actually authenticated, when proxying.
    #[prost(string, optional, tag = "2")]
    pub real_user: Option<String>,
}

/// Sent once, right after the preamble, to open a connection.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct ConnectionHeader {
    /// Who is connecting.
    #[prost(message, optional, tag = "1")]
    pub user_info: Option<UserInformation>,
    /// RPC service all calls on this connection address.
    #[prost(string, optional, tag = "2")]
    pub service_name: Option<String>,
    /// Codec for cell blocks; unset means cells travel inside the protobuf body.
    #[prost(string, optional, tag = "3")]
    pub cell_block_codec_class: Option<String>,
    /// Compressor for cell blocks.
    #[prost(string, optional, tag = "4")]
    pub cell_block_compressor_class: Option<String>,
}

impl ConnectionHeader {
    /// Creates a connection header for `service_name` acting as `effective_user`.
    #[must_use]
    pub fn new(effective_user: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            user_info: Some(UserInformation {
                effective_user: effective_user.into(),
                real_user: None,
            }),
            service_name: Some(service_name.into()),
            cell_block_codec_class: None,
            cell_block_compressor_class: None,
        }
    }
}

/// Header preceding every request body.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct RequestHeader {
    /// Connection-scoped identifier echoed back in the response.
    #[prost(uint32, optional, tag = "1")]
    pub call_id: Option<u32>,
    /// Name of the service method being invoked (e.g. `Get`).
    #[prost(string, optional, tag = "3")]
    pub method_name: Option<String>,
    /// True when a request parameter follows the header.
    #[prost(bool, optional, tag = "4")]
    pub request_param: Option<bool>,
    /// Scheduling priority hint.
    #[prost(uint32, optional, tag = "6")]
    pub priority: Option<u32>,
}

/// Server-side exception attached to a response.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct ExceptionResponse {
    /// Fully-qualified class name of the exception.
    #[prost(string, optional, tag = "1")]
    pub exception_class_name: Option<String>,
    /// Server-side stack trace.
    #[prost(string, optional, tag = "2")]
    pub stack_trace: Option<String>,
    /// Host that raised the exception, when the server reports it.
    #[prost(string, optional, tag = "3")]
    pub hostname: Option<String>,
    /// Port that raised the exception, when the server reports it.
    #[prost(int32, optional, tag = "4")]
    pub port: Option<i32>,
    /// Set when the server advises against retrying.
    #[prost(bool, optional, tag = "5")]
    pub do_not_retry: Option<bool>,
}

/// Header preceding every response body.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct ResponseHeader {
    /// Call ID of the request this answers.
    #[prost(uint32, optional, tag = "1")]
    pub call_id: Option<u32>,
    /// Present when the call failed on the server.
    #[prost(message, optional, tag = "2")]
    pub exception: Option<ExceptionResponse>,
}
