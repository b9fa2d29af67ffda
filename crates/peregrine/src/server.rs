//! RPC server loop exposing a place over TCP

use crate::place::Place;
use crate::{PeregrineError, Result};
use peregrine_proto::{ErrorCode, ErrorDetails, MessageCodec, Request, Response};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Serve a place on `listener` until the process exits
pub async fn serve(place: Arc<Place>, listener: TcpListener) -> Result<()> {
    let (_keep_alive, never) = oneshot::channel();
    serve_with_shutdown(place, listener, never).await
}

/// Serve a place on `listener` until `shutdown` fires
///
/// Each accepted connection is handled on its own task; a connection can
/// carry any number of request/response exchanges. Per-request failures are
/// answered with typed error responses and never stop the server.
pub async fn serve_with_shutdown(
    place: Arc<Place>,
    listener: TcpListener,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<()> {
    info!("Place {} ready", place.host());

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal, stopping place {}", place.host());
                break;
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted connection from {}", peer);
                        let place = Arc::clone(&place);
                        tokio::spawn(async move {
                            handle_connection(place, stream).await;
                        });
                    }
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Process request/response exchanges until the peer hangs up
async fn handle_connection(place: Arc<Place>, mut stream: TcpStream) {
    let mut codec = MessageCodec::new();

    loop {
        let request: Request = match codec.read_message(&mut stream).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read request: {}", e);
                break;
            }
        };

        let response = handle_request(&place, request).await;
        if let Err(e) = codec.write_message(&mut stream, &response).await {
            warn!("Failed to write response: {}", e);
            break;
        }
    }
}

/// Dispatch one request against the place
async fn handle_request(place: &Arc<Place>, request: Request) -> Response {
    match request {
        Request::Transfer {
            id,
            code_identity,
            code_payload,
            state,
        } => match place.transfer(&code_identity, code_payload, state).await {
            Ok(()) => Response::transferred(id),
            Err(e) => {
                warn!("Transfer of {:?} rejected: {}", code_identity, e);
                Response::error(id, error_details(&e))
            }
        },

        Request::Send { id, sender, message } => {
            place.send(sender, message).await;
            Response::Sent { request_id: id }
        }

        Request::Receive { id } => Response::Inbox {
            request_id: id,
            text: place.receive().await,
        },
    }
}

/// Map a core error onto the wire error taxonomy
fn error_details(err: &PeregrineError) -> ErrorDetails {
    let code = match err {
        PeregrineError::CodeUnavailable { .. } | PeregrineError::CodeRegistration { .. } => {
            ErrorCode::CodeRejected
        }
        PeregrineError::Deserialize(_) => ErrorCode::BadState,
        PeregrineError::ContinuationNotFound { .. } => ErrorCode::UnknownContinuation,
        _ => ErrorCode::Internal,
    };
    ErrorDetails::new(code, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_follow_taxonomy() {
        let err = PeregrineError::CodeRegistration {
            identity: "x".to_string(),
            reason: "no factory".to_string(),
        };
        assert_eq!(error_details(&err).code, ErrorCode::CodeRejected);

        let err = PeregrineError::Deserialize("bad bytes".to_string());
        assert_eq!(error_details(&err).code, ErrorCode::BadState);

        let err = PeregrineError::ContinuationNotFound {
            identity: "x".to_string(),
            name: "y".to_string(),
        };
        assert_eq!(error_details(&err).code, ErrorCode::UnknownContinuation);

        let err = PeregrineError::IdUnassigned;
        assert_eq!(error_details(&err).code, ErrorCode::Internal);
    }
}
