//! Request routing: tunnel or forward.

use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::http::request::{read_head, ParseError, RequestHead};
use crate::http::target::{parse_connect_target, parse_forward_target, Target};
use crate::http::{forward, tunnel, HandlerError};
use crate::net::connection::ConnectionContext;
use crate::observability::metrics::{self, RequestKind};

/// Where a parsed request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Plain HTTP; rewrite headers and forward.
    Forward(Target),
    /// CONNECT; open an opaque tunnel.
    Tunnel(Target),
}

impl Route {
    fn kind(&self) -> RequestKind {
        match self {
            Route::Forward(_) => RequestKind::Forward,
            Route::Tunnel(_) => RequestKind::Connect,
        }
    }
}

/// Decide how to handle a request head.
pub fn route(head: &RequestHead) -> Result<Route, ParseError> {
    if head.is_connect() {
        parse_connect_target(&head.target).map(Route::Tunnel)
    } else {
        parse_forward_target(&head.target, head.header("host")).map(Route::Forward)
    }
}

async fn handle(mut client: TcpStream, ctx: &ConnectionContext) -> Result<(), HandlerError> {
    let settings = ctx.settings();
    let (head, buffered) = read_head(&mut client, settings.max_head_bytes, settings.head_timeout).await?;
    let route = route(&head)?;
    metrics::record_request(route.kind());
    debug!(
        connection_id = %ctx.id(),
        method = %head.method,
        request_target = %head.target,
        "request parsed"
    );

    match route {
        Route::Tunnel(target) => {
            let stats = tunnel::establish(ctx, client, target, buffered).await?;
            debug!(
                connection_id = %ctx.id(),
                client_to_target = stats.client_to_target,
                target_to_client = stats.target_to_client,
                end = ?stats.end,
                "tunnel closed"
            );
        }
        Route::Forward(target) => {
            let stats = forward::forward(ctx, client, head, target, buffered).await?;
            debug!(
                connection_id = %ctx.id(),
                request_bytes = stats.request_bytes,
                response_bytes = stats.response_bytes,
                "exchange complete"
            );
        }
    }
    Ok(())
}

/// Run one client connection to completion.
///
/// Errors stop here: they are logged and the sockets are dropped, and
/// nothing is reported to the caller.
pub async fn serve_connection(client: TcpStream, ctx: ConnectionContext) {
    match handle(client, &ctx).await {
        Ok(()) => {}
        Err(HandlerError::Parse(ParseError::Empty)) => {
            debug!(connection_id = %ctx.id(), peer = %ctx.peer(), "client closed without sending a request");
        }
        Err(HandlerError::Parse(err)) => {
            metrics::record_parse_failure();
            warn!(connection_id = %ctx.id(), peer = %ctx.peer(), error = %err, "malformed request, closing connection");
        }
        Err(err @ HandlerError::Dial { .. }) => {
            // Plain-HTTP clients get no response here, only a closed socket.
            warn!(connection_id = %ctx.id(), peer = %ctx.peer(), error = %err, "upstream connect failed, closing connection");
        }
        Err(HandlerError::Io(err)) => {
            debug!(connection_id = %ctx.id(), peer = %ctx.peer(), error = %err, "connection closed with error");
        }
    }
}
