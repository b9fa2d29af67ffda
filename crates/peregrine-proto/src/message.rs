//! Message types and enums

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of an agent, assigned by the first place it is transferred to.
///
/// Unassigned is represented as `Option<AgentId>::None` on the agent side;
/// the wire only ever carries assigned ids.
pub type AgentId = u64;

/// Request message types accepted by a place
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Deliver a serialized agent for restoration and resumption
    Transfer {
        /// Request ID for correlation
        id: Uuid,
        /// Code identity resolvable by the destination's code registry
        code_identity: String,
        /// Opaque code payload for that identity
        code_payload: Bytes,
        /// Serialized agent image (descriptor plus per-type state)
        state: Bytes,
    },

    /// Append a message to the destination's mailbox
    Send {
        /// Request ID for correlation
        id: Uuid,
        /// Identifier of the sending agent
        sender: AgentId,
        /// Message text to store
        message: String,
    },

    /// Drain the destination's mailbox
    Receive {
        /// Request ID for correlation
        id: Uuid,
    },
}

impl Request {
    /// Get the request ID
    pub fn id(&self) -> Uuid {
        match self {
            Self::Transfer { id, .. } => *id,
            Self::Send { id, .. } => *id,
            Self::Receive { id, .. } => *id,
        }
    }

    /// Create a transfer request
    pub fn transfer(code_identity: impl Into<String>, code_payload: Bytes, state: Bytes) -> Self {
        Self::Transfer {
            id: Uuid::new_v4(),
            code_identity: code_identity.into(),
            code_payload,
            state,
        }
    }

    /// Create a send request
    pub fn send(sender: AgentId, message: impl Into<String>) -> Self {
        Self::Send {
            id: Uuid::new_v4(),
            sender,
            message: message.into(),
        }
    }

    /// Create a receive request
    pub fn receive() -> Self {
        Self::Receive { id: Uuid::new_v4() }
    }
}

/// Response message types returned by a place
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Transfer outcome
    ///
    /// `accepted` means the migration was accepted and a task was scheduled,
    /// not that the resumed computation will succeed.
    Transferred {
        /// Request ID this responds to
        request_id: Uuid,
        /// Whether the agent was accepted and scheduled
        accepted: bool,
    },

    /// Message stored in the mailbox
    Sent {
        /// Request ID this responds to
        request_id: Uuid,
    },

    /// Drained mailbox contents
    Inbox {
        /// Request ID this responds to
        request_id: Uuid,
        /// Formatted mailbox text, empty when the mailbox was empty
        text: String,
    },

    /// Error response
    Error {
        /// Request ID this responds to
        request_id: Uuid,
        /// Error details
        error: ErrorDetails,
    },
}

impl Response {
    /// Get the request ID this response corresponds to
    pub fn request_id(&self) -> Uuid {
        match self {
            Self::Transferred { request_id, .. } => *request_id,
            Self::Sent { request_id, .. } => *request_id,
            Self::Inbox { request_id, .. } => *request_id,
            Self::Error { request_id, .. } => *request_id,
        }
    }

    /// Create an accepted transfer response
    pub fn transferred(request_id: Uuid) -> Self {
        Self::Transferred {
            request_id,
            accepted: true,
        }
    }

    /// Create an error response
    pub fn error(request_id: Uuid, error: ErrorDetails) -> Self {
        Self::Error { request_id, error }
    }
}

/// Error details for error responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
}

/// Error codes for different types of remote failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed or unexpected request
    InvalidRequest,
    /// Code identity could not be registered or resolved
    CodeRejected,
    /// Agent state did not decode against the registered identity
    BadState,
    /// The carried continuation name is not an entry point of the agent type
    UnknownContinuation,
    /// Internal server error
    Internal,
}

impl ErrorDetails {
    /// Create a new error details
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_stable() {
        let req = Request::transfer("courier", Bytes::from_static(b"code"), Bytes::from_static(b"state"));
        assert_eq!(req.id(), req.id());

        let req = Request::send(7, "hello");
        match &req {
            Request::Send { sender, message, .. } => {
                assert_eq!(*sender, 7);
                assert_eq!(message, "hello");
            }
            _ => panic!("expected Send request"),
        }
    }

    #[test]
    fn test_response_correlation() {
        let req = Request::receive();
        let resp = Response::Inbox {
            request_id: req.id(),
            text: String::new(),
        };
        assert_eq!(resp.request_id(), req.id());
    }

    #[test]
    fn test_error_response() {
        let request_id = Uuid::new_v4();
        let resp = Response::error(
            request_id,
            ErrorDetails::new(ErrorCode::CodeRejected, "no factory installed"),
        );

        match resp {
            Response::Error { request_id: resp_id, error } => {
                assert_eq!(resp_id, request_id);
                assert_eq!(error.code, ErrorCode::CodeRejected);
                assert_eq!(error.message, "no factory installed");
            }
            _ => panic!("expected Error response"),
        }
    }

    #[test]
    fn test_transfer_serialization() {
        let req = Request::transfer("courier", Bytes::from_static(b"\x00\x01"), Bytes::from_static(b"image"));
        let encoded = rmp_serde::to_vec(&req).unwrap();
        let decoded: Request = rmp_serde::from_slice(&encoded).unwrap();

        assert_eq!(req.id(), decoded.id());
        match decoded {
            Request::Transfer { code_identity, code_payload, state, .. } => {
                assert_eq!(code_identity, "courier");
                assert_eq!(code_payload, Bytes::from_static(b"\x00\x01"));
                assert_eq!(state, Bytes::from_static(b"image"));
            }
            _ => panic!("expected Transfer request"),
        }
    }
}
