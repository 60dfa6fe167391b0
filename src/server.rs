//! Minimal HTTP/1.1 listener: one task per connection, keep-alive, chunked
//! streaming for bodies of unknown length

use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::api::{Api, Body, Reply, Request};
use crate::util::{http_date, unix_seconds};

const MAX_LINE: u64 = 16 * 1024;
const MAX_HEADERS: usize = 100;
const MAX_BODY: usize = 1024 * 1024;
const CHUNK_SIZE: usize = 8192;

/// Accept connections until `shutdown` fires, then wait for open ones
pub async fn serve(listener: TcpListener, api: Arc<Api>, shutdown: CancellationToken) -> Result<()> {
    let tracker = TaskTracker::new();
    info!(addr = %listener.local_addr()?, "listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let api = Arc::clone(&api);
                    let shutdown = shutdown.clone();
                    tracker.spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, &api, &shutdown).await {
                            debug!(%peer, error = %e, "connection closed");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
    }

    tracker.close();
    info!(connections = tracker.len(), "waiting for open connections");
    tracker.wait().await;
    Ok(())
}

struct RequestHead {
    method: String,
    target: String,
    content_length: Option<usize>,
    /// Body framed by a transfer coding; only Content-Length bodies are read
    transfer_coded: bool,
    keep_alive: bool,
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    api: &Api,
    shutdown: &CancellationToken,
) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    loop {
        let head = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            head = read_head(&mut reader) => head,
        };
        let head = match head {
            Ok(Some(head)) => head,
            Ok(None) => return Ok(()),
            Err(e) => {
                write_reply(&mut write, Reply::error(400, "Bad Request"), false, false).await?;
                return Err(e);
            }
        };

        if head.transfer_coded {
            info!(%peer, method = %head.method, "411: request body without Content-Length");
            write_reply(&mut write, Reply::error(411, "Length Required"), false, false).await?;
            return Ok(());
        }

        let body = match head.content_length {
            Some(len) if len > MAX_BODY => {
                write_reply(&mut write, Reply::error(400, "Request body too large"), false, false).await?;
                return Ok(());
            }
            Some(len) => {
                let mut buf = vec![0; len];
                reader.read_exact(&mut buf).await?;
                Some(buf)
            }
            None => None,
        };

        let request = Request::new(&head.method, &head.target, body.as_deref());
        let reply = api.handle(&request).await;
        info!(%peer, method = %head.method, path = %request.path, status = reply.status, "request");

        let keep_alive = head.keep_alive && !shutdown.is_cancelled();
        write_reply(&mut write, reply, head.method == "HEAD", keep_alive).await?;
        if !keep_alive {
            return Ok(());
        }
    }
}

/// Read a request line and headers; `None` on a cleanly closed connection
async fn read_head<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<Option<RequestHead>> {
    let Some(request_line) = read_line(reader).await? else {
        return Ok(None);
    };
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        bail!("malformed request line {:?}", request_line);
    };
    let version = parts.next().unwrap_or("HTTP/1.0");

    let mut head = RequestHead {
        method: method.to_ascii_uppercase(),
        target: target.to_string(),
        content_length: None,
        transfer_coded: false,
        keep_alive: version == "HTTP/1.1",
    };

    for _ in 0..MAX_HEADERS {
        let line = read_line(reader).await?.context("connection closed in headers")?;
        if line.is_empty() {
            return Ok(Some(head));
        }
        let Some((name, value)) = line.split_once(':') else {
            bail!("malformed header {:?}", line);
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            head.content_length = Some(value.parse().context("invalid Content-Length")?);
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            head.transfer_coded = !value.eq_ignore_ascii_case("identity");
        } else if name.eq_ignore_ascii_case("connection") {
            if value.eq_ignore_ascii_case("close") {
                head.keep_alive = false;
            } else if value.eq_ignore_ascii_case("keep-alive") {
                head.keep_alive = true;
            }
        }
    }
    bail!("too many headers")
}

async fn read_line<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<Option<String>> {
    let mut line = String::new();
    let n = (&mut *reader).take(MAX_LINE).read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    if !line.ends_with('\n') {
        bail!("header line too long");
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn write_reply<W: AsyncWrite + Unpin>(
    out: &mut W,
    reply: Reply,
    head_only: bool,
    keep_alive: bool,
) -> Result<()> {
    let now = unix_seconds(SystemTime::now());
    let mut header = String::new();
    write!(header, "HTTP/1.1 {} {}\r\n", reply.status, reply.reason())?;
    write!(header, "Server: mds/{}\r\n", env!("CARGO_PKG_VERSION"))?;
    write!(header, "Date: {}\r\n", http_date(now))?;
    write!(header, "Content-Type: {}\r\n", reply.content_type)?;
    write!(header, "Last-Modified: {}\r\n", http_date(reply.mtime.unwrap_or(now)))?;
    match &reply.body {
        Body::Empty => header.push_str("Content-Length: 0\r\n"),
        Body::Bytes(bytes) => write!(header, "Content-Length: {}\r\n", bytes.len())?,
        Body::File { len, .. } => write!(header, "Content-Length: {}\r\n", len)?,
        Body::Stream(_) => header.push_str("Transfer-Encoding: chunked\r\n"),
    }
    header.push_str(if keep_alive { "Connection: keep-alive\r\n" } else { "Connection: close\r\n" });
    header.push_str("\r\n");
    out.write_all(header.as_bytes()).await?;

    if !head_only {
        match reply.body {
            Body::Empty => {}
            Body::Bytes(bytes) => out.write_all(&bytes).await?,
            Body::File { file, len } => {
                tokio::io::copy(&mut file.take(len), out).await?;
            }
            Body::Stream(mut reader) => write_chunked(&mut reader, out).await?,
        }
    }
    out.flush().await?;
    Ok(())
}

async fn write_chunked<R, W>(reader: &mut R, out: &mut W) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        out.write_all(format!("{:X}\r\n", n).as_bytes()).await?;
        out.write_all(&buf[..n]).await?;
        out.write_all(b"\r\n").await?;
    }
    out.write_all(b"0\r\n\r\n").await?;
    Ok(())
}
