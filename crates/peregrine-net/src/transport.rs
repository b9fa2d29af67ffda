//! Transport trait and TCP implementation

use crate::{AddressBook, HostAddr, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use peregrine_proto::{AgentId, MessageCodec, Request, Response};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Default per-call timeout
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Point-to-point request/response calls against a named place
///
/// `resolve` turns a logical target (an address-book name or a literal
/// `host:port`) into a concrete address; the remaining operations are the
/// RPC surface a place exposes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolve a target name to a host address
    fn resolve(&self, target: &str) -> Result<HostAddr, TransportError>;

    /// Deliver a serialized agent to the target place
    ///
    /// `true` means the migration was accepted and scheduled. Remote
    /// failures come back as errors carrying the remote diagnostic.
    async fn transfer(
        &self,
        target: &HostAddr,
        code_identity: &str,
        code_payload: Bytes,
        state: Bytes,
    ) -> Result<bool, TransportError>;

    /// Append a message to the target place's mailbox
    async fn send(
        &self,
        target: &HostAddr,
        sender: AgentId,
        message: &str,
    ) -> Result<(), TransportError>;

    /// Drain the target place's mailbox
    async fn receive(&self, target: &HostAddr) -> Result<String, TransportError>;
}

/// TCP transport: one connection per call, bounded by an explicit timeout
///
/// Timeout expiry is reported as [`TransportError::Timeout`] and leaves the
/// caller's task running, exactly like an unreachable destination.
pub struct TcpTransport {
    book: AddressBook,
    call_timeout: Duration,
}

impl TcpTransport {
    /// Create a transport with the given address book and the default timeout
    pub fn new(book: AddressBook) -> Self {
        Self {
            book,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Perform one request/response exchange against a place
    async fn call(&self, target: &HostAddr, request: Request) -> Result<Response, TransportError> {
        let request_id = request.id();
        debug!("Calling {}: request {}", target, request_id);

        let exchange = async {
            let mut stream = TcpStream::connect((target.host.as_str(), target.port))
                .await
                .map_err(|e| TransportError::Unavailable {
                    target: target.to_string(),
                    reason: e.to_string(),
                })?;

            let mut codec = MessageCodec::new();
            codec.write_message(&mut stream, &request).await?;

            let response: Response = codec
                .read_message(&mut stream)
                .await?
                .ok_or_else(|| TransportError::Unavailable {
                    target: target.to_string(),
                    reason: "connection closed before response".to_string(),
                })?;

            Ok::<_, TransportError>(response)
        };

        let response = timeout(self.call_timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout {
                duration: self.call_timeout,
            })??;

        if response.request_id() != request_id {
            return Err(TransportError::Protocol(format!(
                "response correlates to request {}, expected {}",
                response.request_id(),
                request_id
            )));
        }

        if let Response::Error { error, .. } = response {
            return Err(TransportError::Rejected(format!(
                "{:?}: {}",
                error.code, error.message
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn resolve(&self, target: &str) -> Result<HostAddr, TransportError> {
        self.book.resolve(target)
    }

    async fn transfer(
        &self,
        target: &HostAddr,
        code_identity: &str,
        code_payload: Bytes,
        state: Bytes,
    ) -> Result<bool, TransportError> {
        let request = Request::transfer(code_identity, code_payload, state);
        match self.call(target, request).await? {
            Response::Transferred { accepted, .. } => Ok(accepted),
            other => Err(TransportError::Protocol(format!(
                "unexpected response to transfer: {:?}",
                other
            ))),
        }
    }

    async fn send(
        &self,
        target: &HostAddr,
        sender: AgentId,
        message: &str,
    ) -> Result<(), TransportError> {
        let request = Request::send(sender, message);
        match self.call(target, request).await? {
            Response::Sent { .. } => Ok(()),
            other => Err(TransportError::Protocol(format!(
                "unexpected response to send: {:?}",
                other
            ))),
        }
    }

    async fn receive(&self, target: &HostAddr) -> Result<String, TransportError> {
        let request = Request::receive();
        match self.call(target, request).await? {
            Response::Inbox { text, .. } => Ok(text),
            other => Err(TransportError::Protocol(format!(
                "unexpected response to receive: {:?}",
                other
            ))),
        }
    }
}
