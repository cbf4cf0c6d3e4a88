//! Request body framing on the way upstream.
//!
//! Chunked bodies are copied byte for byte, but the chunk-size lines are
//! decoded so copying stops right after the last chunk and its trailers.
//! Whatever the client sends after that is never forwarded.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_CHUNK_LINE: u64 = 8192;

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn early_eof(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("client closed while sending {what}"),
    )
}

/// Read one CRLF-terminated line into `line`, bounded by [`MAX_CHUNK_LINE`].
async fn read_line<R>(reader: &mut R, line: &mut String, what: &str) -> io::Result<()>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    line.clear();
    let read = (&mut *reader).take(MAX_CHUNK_LINE).read_line(line).await?;
    if read == 0 {
        return Err(early_eof(what));
    }
    if !line.ends_with('\n') {
        return Err(if read as u64 >= MAX_CHUNK_LINE {
            invalid(format!("{what} exceeds {MAX_CHUNK_LINE} bytes"))
        } else {
            early_eof(what)
        });
    }
    Ok(())
}

/// Size of the chunk announced by a chunk-size line (extensions ignored).
fn chunk_size(line: &str) -> io::Result<u64> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let size = trimmed.split_once(';').map_or(trimmed, |(size, _)| size).trim();
    if size.is_empty() || !size.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid(format!("invalid chunk size {size:?}")));
    }
    u64::from_str_radix(size, 16).map_err(|_| invalid(format!("invalid chunk size {size:?}")))
}

/// Copy one chunked body from `reader` to `writer`.
///
/// Returns once the terminating zero-size chunk and the trailer section
/// have been written. `transferred` counts every byte written.
pub async fn copy_chunked<R, W>(reader: &mut R, writer: &mut W, transferred: &mut u64) -> io::Result<()>
where
    R: AsyncBufRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut line = String::new();
    loop {
        read_line(reader, &mut line, "a chunk size").await?;
        let size = chunk_size(&line)?;
        writer.write_all(line.as_bytes()).await?;
        *transferred = transferred.saturating_add(line.len() as u64);

        if size == 0 {
            loop {
                read_line(reader, &mut line, "chunk trailers").await?;
                writer.write_all(line.as_bytes()).await?;
                *transferred = transferred.saturating_add(line.len() as u64);
                if line.trim_end_matches(['\r', '\n']).is_empty() {
                    return writer.flush().await;
                }
            }
        }

        let mut data = (&mut *reader).take(size);
        let copied = tokio::io::copy_buf(&mut data, &mut *writer).await?;
        *transferred = transferred.saturating_add(copied);
        if copied < size {
            return Err(early_eof("chunk data"));
        }

        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await?;
        if &crlf != b"\r\n" {
            return Err(invalid("chunk data not followed by CRLF".to_string()));
        }
        writer.write_all(&crlf).await?;
        *transferred = transferred.saturating_add(2);
    }
}
