//! Per-connection proxy session.
//!
//! # Responsibilities
//! - Open the single upstream connection for an accepted client
//! - Relay client bytes upstream as they arrive, unmodified
//! - Read the request head for the negotiation header (and HEAD requests)
//! - Buffer the whole upstream response, then tamper and deliver it at once
//!
//! # Design Decisions
//! - Requests are never reconstructed; only the response is rewritten
//! - No partial output: nothing of the final response reaches the client
//!   before it is complete and the filters have run
//! - Interim 1xx responses are passed through untouched as they arrive
//! - Only the request head is held in memory; the body is counted, not kept
//! - Client EOF before delivery aborts the session; both sockets are dropped
//! - The only suspension points are socket reads and writes

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::http::{MessageParser, ParseError};
use crate::net::connection::{ConnectionId, ConnectionState};
use crate::tamper::{Directive, FilterPolicy, TamperPipeline};

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Errors that terminate a proxied connection.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("upstream {address} unavailable: {source}")]
    UpstreamUnavailable {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("connecting to upstream {address} timed out after {secs}s")]
    ConnectTimeout { address: String, secs: u64 },

    #[error("connection reset: {0}")]
    ConnectionReset(#[source] io::Error),

    #[error("upstream closed before the response was complete")]
    TruncatedResponse,

    #[error("unparseable response: {0}")]
    Parse(#[from] ParseError),
}

/// How a session ended when no error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The tampered response was written and the client side closed.
    Delivered {
        bytes: usize,
        filters: Vec<&'static str>,
    },
    /// The client went away before the response was ready.
    ClientAborted,
}

/// Open a connection to the configured destination.
pub async fn connect_upstream(address: &str, timeout: Duration) -> Result<TcpStream, HandlerError> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(HandlerError::UpstreamUnavailable {
            address: address.to_string(),
            source,
        }),
        Err(_) => Err(HandlerError::ConnectTimeout {
            address: address.to_string(),
            secs: timeout.as_secs(),
        }),
    }
}

/// Owns one client ↔ upstream session.
#[derive(Debug)]
pub struct ConnectionHandler {
    id: ConnectionId,
    policy: Arc<FilterPolicy>,
    state: ConnectionState,
}

impl ConnectionHandler {
    pub fn new(id: ConnectionId, policy: Arc<FilterPolicy>) -> Self {
        Self {
            id,
            policy,
            state: ConnectionState::Connecting,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connect to `upstream` and run the session against `client`.
    pub async fn serve<C>(
        self,
        client: C,
        upstream: &str,
        connect_timeout: Duration,
    ) -> Result<Outcome, HandlerError>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        let upstream = connect_upstream(upstream, connect_timeout).await?;
        self.run(client, upstream).await
    }

    /// Run the session over already established channels.
    pub async fn run<C, U>(mut self, client: C, upstream: U) -> Result<Outcome, HandlerError>
    where
        C: AsyncRead + AsyncWrite + Unpin,
        U: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.relay(client, upstream).await;
        self.transition(ConnectionState::Closed);
        result
    }

    async fn relay<C, U>(&mut self, client: C, upstream: U) -> Result<Outcome, HandlerError>
    where
        C: AsyncRead + AsyncWrite + Unpin,
        U: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut client_rd, mut client_wr) = tokio::io::split(client);
        let (mut upstream_rd, mut upstream_wr) = tokio::io::split(upstream);

        let mut request = RequestWatch::new();
        let mut response = MessageParser::response();
        let mut client_buf = vec![0u8; READ_BUFFER_SIZE];
        let mut upstream_buf = vec![0u8; READ_BUFFER_SIZE];

        self.transition(ConnectionState::RelayingRequest);

        'exchange: loop {
            tokio::select! {
                read = client_rd.read(&mut client_buf) => {
                    let n = read.map_err(HandlerError::ConnectionReset)?;
                    if n == 0 {
                        tracing::debug!(
                            connection_id = %self.id,
                            state = %self.state,
                            "Client disconnected before the response was sent"
                        );
                        return Ok(Outcome::ClientAborted);
                    }
                    upstream_wr
                        .write_all(&client_buf[..n])
                        .await
                        .map_err(HandlerError::ConnectionReset)?;

                    if self.state == ConnectionState::RelayingRequest
                        && request.observe(&client_buf[..n], &mut response, self.id)
                    {
                        self.transition(ConnectionState::AwaitingResponse);
                    }
                }
                read = upstream_rd.read(&mut upstream_buf) => {
                    let n = read.map_err(HandlerError::ConnectionReset)?;
                    if n == 0 {
                        response.mark_closed();
                    } else {
                        response.add_data(&upstream_buf[..n]);
                    }

                    // 1xx heads pass through untouched; the final response is framed next.
                    while response.is_complete()? {
                        let Some(interim) = response.split_interim() else {
                            break 'exchange;
                        };
                        tracing::debug!(connection_id = %self.id, bytes = interim.len(), "Relaying interim response");
                        client_wr
                            .write_all(&interim)
                            .await
                            .map_err(HandlerError::ConnectionReset)?;
                    }
                    if n == 0 {
                        return Err(HandlerError::TruncatedResponse);
                    }
                }
            }
        }

        let directive = request.directive(self.id);
        let (bytes, filters) = self.tamper(response, &directive)?;

        client_wr
            .write_all(&bytes)
            .await
            .map_err(HandlerError::ConnectionReset)?;
        client_wr.shutdown().await.map_err(HandlerError::ConnectionReset)?;
        self.transition(ConnectionState::Sent);

        Ok(Outcome::Delivered {
            bytes: bytes.len(),
            filters,
        })
    }

    fn tamper(
        &mut self,
        response: MessageParser,
        directive: &Directive,
    ) -> Result<(Vec<u8>, Vec<&'static str>), HandlerError> {
        self.transition(ConnectionState::Tampering);
        let message = response.into_message()?;

        let mut rng = rand::thread_rng();
        let pipeline = TamperPipeline::new(self.policy.pick(directive, &mut rng));
        let filters = pipeline.filter_names();
        tracing::debug!(connection_id = %self.id, filters = ?filters, "Tampering response");

        Ok((pipeline.apply(message, &mut rng).serialize(), filters))
    }

    fn transition(&mut self, next: ConnectionState) {
        tracing::trace!(connection_id = %self.id, from = %self.state, to = %next, "State transition");
        self.state = next;
    }
}

/// Reads the request head as it is relayed, then only counts body bytes.
#[derive(Debug)]
struct RequestWatch {
    head: Option<MessageParser>,
    directive: Option<Directive>,
    body_remaining: usize,
}

impl RequestWatch {
    fn new() -> Self {
        Self {
            head: Some(MessageParser::request()),
            directive: None,
            body_remaining: 0,
        }
    }

    /// Account for relayed bytes. Returns true once the whole request has passed.
    fn observe(&mut self, chunk: &[u8], response: &mut MessageParser, id: ConnectionId) -> bool {
        let Some(parser) = self.head.as_mut() else {
            self.body_remaining = self.body_remaining.saturating_sub(chunk.len());
            return self.body_remaining == 0;
        };

        parser.add_data(chunk);
        if !parser.has_header_block() {
            return false;
        }

        let Some(mut parser) = self.head.take() else {
            return false;
        };
        match read_head(&mut parser) {
            Ok((directive, is_head, content_length)) => {
                if is_head {
                    response.expect_no_body();
                }
                self.directive = Some(directive);
                self.body_remaining = content_length.saturating_sub(parser.body_len());
            }
            Err(e) => {
                // Still relayed verbatim; only negotiation is lost.
                tracing::warn!(connection_id = %id, error = %e, "Unparseable request head");
                self.directive = Some(Directive::Unrecognized);
            }
        }
        self.body_remaining == 0
    }

    /// The client's directive, failing closed if its head never arrived.
    fn directive(&self, id: ConnectionId) -> Directive {
        match &self.directive {
            Some(directive) => directive.clone(),
            None => {
                tracing::warn!(
                    connection_id = %id,
                    "Response completed before the request head, applying no filters"
                );
                Directive::Unrecognized
            }
        }
    }

    /// Request bytes currently held in memory.
    #[cfg(test)]
    fn buffered_len(&self) -> usize {
        self.head.as_ref().map_or(0, MessageParser::buffered_len)
    }
}

fn read_head(parser: &mut MessageParser) -> Result<(Directive, bool, usize), ParseError> {
    let content_length = parser.content_length()?.unwrap_or(0);
    let is_head = parser
        .start_line()?
        .is_some_and(|line| line.starts_with(b"HEAD "));
    let directive = parser
        .headers()?
        .map_or(Directive::Absent, Directive::from_headers);
    Ok((directive, is_head, content_length))
}
