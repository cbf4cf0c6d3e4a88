//! Opaque byte relaying between two sockets.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::net::connection::ConnectionContext;

const RELAY_BUFFER_SIZE: usize = 8192;

/// Copy from `reader` to `writer` until EOF.
///
/// `transferred` is updated as bytes are written so the count survives
/// cancellation. With `idle` set, a read that stalls longer than the limit
/// fails with `TimedOut`.
pub async fn copy_half<R, W>(
    reader: &mut R,
    writer: &mut W,
    idle: Option<Duration>,
    transferred: &mut u64,
) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let read = match idle {
            Some(limit) => tokio::time::timeout(limit, reader.read(&mut buffer))
                .await
                .map_err(|_| {
                    io::Error::new(io::ErrorKind::TimedOut, format!("no data for {limit:?}"))
                })??,
            None => reader.read(&mut buffer).await?,
        };
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read]).await?;
        *transferred = transferred.saturating_add(read as u64);
    }
    writer.flush().await
}

/// How a tunnel relay ended.
#[derive(Debug)]
pub enum RelayEnd {
    /// The client closed its side.
    ClientClosed,
    /// The target closed its side.
    TargetClosed,
    /// A read or write failed on either socket.
    Failed(io::Error),
    /// The controller cut the connection off during a drain.
    Terminated,
}

#[derive(Debug)]
pub struct RelayStats {
    pub client_to_target: u64,
    pub target_to_client: u64,
    pub end: RelayEnd,
}

/// Relay both directions until either side closes or errors.
///
/// Both streams are consumed and dropped before this returns, so the
/// target is closed as soon as the client goes away and vice versa.
pub async fn relay(client: TcpStream, target: TcpStream, ctx: &ConnectionContext) -> RelayStats {
    let (mut client_read, mut client_write) = client.into_split();
    let (mut target_read, mut target_write) = target.into_split();
    let mut client_to_target = 0u64;
    let mut target_to_client = 0u64;

    let end = tokio::select! {
        res = copy_half(&mut client_read, &mut target_write, None, &mut client_to_target) => match res {
            Ok(()) => RelayEnd::ClientClosed,
            Err(e) => RelayEnd::Failed(e),
        },
        res = copy_half(&mut target_read, &mut client_write, None, &mut target_to_client) => match res {
            Ok(()) => RelayEnd::TargetClosed,
            Err(e) => RelayEnd::Failed(e),
        },
        _ = ctx.terminated() => RelayEnd::Terminated,
    };

    drop((client_read, client_write, target_read, target_write));

    RelayStats {
        client_to_target,
        target_to_client,
        end,
    }
}
