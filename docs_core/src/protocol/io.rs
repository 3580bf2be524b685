use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::frame::{FrameError, REQUEST_LEN, RESPONSE_LEN, Request, Response};

pub async fn send_request<W>(writer: &mut W, request: &Request) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    write_all(writer, &request.encode()).await
}

pub async fn send_response<W>(writer: &mut W, response: &Response) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    write_all(writer, &response.encode()).await
}

pub async fn recv_request<R>(reader: &mut R) -> Result<Request, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut frame = [0u8; REQUEST_LEN];
    read_exact(reader, &mut frame).await?;
    Request::decode(&frame)
}

pub async fn recv_response<R>(reader: &mut R) -> Result<Response, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut frame = vec![0u8; RESPONSE_LEN];
    read_exact(reader, &mut frame).await?;
    Response::decode(&frame)
}

async fn write_all<W>(writer: &mut W, bytes: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < bytes.len() {
        match writer.write(&bytes[written..]).await {
            Ok(0) => return Err(std::io::Error::from(ErrorKind::WriteZero).into()),
            Ok(n) => written += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    writer.flush().await?;
    Ok(())
}

/// Fills `buf` completely. A zero-length read at any point means the peer
/// went away.
async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => return Err(FrameError::Closed),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
