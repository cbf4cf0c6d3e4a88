//! Plain-HTTP forwarding.
//!
//! One request per client connection: the head is rewritten and sent to
//! the target, the request body follows unmodified, and the response is
//! copied back until the target closes. The target is asked for
//! `Connection: close` so that happens right after the response; a client
//! that wants to reuse its connection sees it closed and reconnects.
//!
//! The request body is framed by Content-Length or chunked encoding and
//! nothing past its end is forwarded, so a follow-up request on the same
//! socket never reaches the target unrewritten.
//!
//! A failed dial closes the client connection without any HTTP response.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::http::body::copy_chunked;
use crate::http::relay::copy_half;
use crate::http::request::{BodyFraming, Header, RequestHead};
use crate::http::target::Target;
use crate::http::HandlerError;
use crate::net::connection::ConnectionContext;
use crate::observability::metrics::{self, RequestKind};
use crate::resilience::dial;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForwardStats {
    pub request_bytes: u64,
    pub response_bytes: u64,
}

/// Forward a single plain-HTTP request to `target`.
///
/// `buffered` holds body bytes that were read together with the head.
pub async fn forward(
    ctx: &ConnectionContext,
    mut client: TcpStream,
    head: RequestHead,
    target: Target,
    buffered: Vec<u8>,
) -> Result<ForwardStats, HandlerError> {
    let framing = head.body_framing()?;

    let mut upstream = match dial(&target, ctx.settings().connect_timeout).await {
        Ok(stream) => stream,
        Err(source) => {
            metrics::record_dial_failure(RequestKind::Forward);
            return Err(HandlerError::Dial { target, source });
        }
    };

    let mut headers = ctx.settings().rules.rewrite(&head.headers);
    close_after_response(&mut headers);
    let encoded = head.encode_with(&headers);
    upstream.write_all(&encoded).await?;

    let (buffered_body, remaining) = split_buffered_body(framing, &buffered);
    upstream.write_all(buffered_body).await?;
    debug!(
        connection_id = %ctx.id(),
        upstream = %target,
        method = %head.method,
        "request forwarded"
    );

    let mut request_bytes = (encoded.len() + buffered_body.len()) as u64;
    let mut response_bytes = 0u64;

    let (mut client_read, mut client_write) = client.split();
    let (mut upstream_read, mut upstream_write) = upstream.split();

    // The rest of the body streams up while the response streams down; the
    // response side decides when the exchange is over. Once the body is
    // complete the upload parks and later client bytes are never read.
    let upload = async {
        match remaining {
            Remaining::Nothing => {}
            Remaining::Bytes(limit) => {
                copy_half(
                    &mut (&mut client_read).take(limit),
                    &mut upstream_write,
                    None,
                    &mut request_bytes,
                )
                .await?
            }
            Remaining::Chunked => {
                let mut body = BufReader::new(buffered.as_slice().chain(&mut client_read));
                copy_chunked(&mut body, &mut upstream_write, &mut request_bytes).await?
            }
        }
        std::future::pending::<io::Result<()>>().await
    };
    let download = copy_half(
        &mut upstream_read,
        &mut client_write,
        Some(ctx.settings().idle_timeout),
        &mut response_bytes,
    );

    let result = tokio::select! {
        res = download => res,
        res = upload => res,
        _ = ctx.terminated() => Ok(()),
    };

    metrics::record_bytes(request_bytes, response_bytes);
    result?;
    Ok(ForwardStats {
        request_bytes,
        response_bytes,
    })
}

/// What is left of the request body after the head has been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Remaining {
    Nothing,
    Bytes(u64),
    /// The whole chunked body, buffered bytes included, still has to be
    /// decoded on its way up.
    Chunked,
}

/// Body bytes already read that can be sent straight away, and what is
/// left to pull from the client.
fn split_buffered_body(framing: BodyFraming, buffered: &[u8]) -> (&[u8], Remaining) {
    match framing {
        BodyFraming::None => (&[], Remaining::Nothing),
        BodyFraming::Length(total) => {
            let now = usize::try_from(total).map_or(buffered.len(), |t| t.min(buffered.len()));
            match total - now as u64 {
                0 => (&buffered[..now], Remaining::Nothing),
                rest => (&buffered[..now], Remaining::Bytes(rest)),
            }
        }
        BodyFraming::Chunked => (&[], Remaining::Chunked),
    }
}

/// Ask the target to close once its response is sent.
///
/// Every `Connection` header becomes `close` (one is appended if there was
/// none) and `Proxy-Connection`, which is meant for this proxy, is dropped.
fn close_after_response(headers: &mut Vec<Header>) {
    headers.retain(|h| !h.name.eq_ignore_ascii_case("proxy-connection"));
    let mut found = false;
    for header in headers.iter_mut().filter(|h| h.name.eq_ignore_ascii_case("connection")) {
        header.value = "close".to_string();
        found = true;
    }
    if !found {
        headers.push(Header::new("Connection", "close"));
    }
}
