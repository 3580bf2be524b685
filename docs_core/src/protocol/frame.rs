use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::codes::{Command, Status};

pub const MAGIC: u32 = 0xD0C5;

pub const USERNAME_LEN: usize = 64;
pub const ARGS_LEN: usize = 1024;
pub const DATA_LEN: usize = 4096;

/// magic + command + username + args + checksum
pub const REQUEST_LEN: usize = 4 + 4 + USERNAME_LEN + ARGS_LEN + 4;
/// magic + status + data + checksum
pub const RESPONSE_LEN: usize = 4 + 4 + DATA_LEN + 4;

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("connection closed by peer")]
    Closed,
    #[error("invalid magic: expected 0xd0c5, got {0:#x}")]
    BadMagic(u32),
    #[error("checksum mismatch: frame says {expected:#x}, computed {actual:#x}")]
    Corrupt { expected: u32, actual: u32 },
    #[error("unknown command code {0}")]
    UnknownCommand(u32),
    #[error("unknown status code {0}")]
    UnknownStatus(u32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Rotating XOR over `bytes`: each byte is folded into the accumulator,
/// which is then rotated left by one bit.
///
/// The checksum is linear, so it catches any single-byte change but lets
/// two flips of the same bit exactly 32 bytes apart cancel out.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, b| (acc ^ u32::from(*b)).rotate_left(1))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub username: String,
    pub args: String,
}

impl Request {
    pub fn new(command: Command, username: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            command,
            username: username.into(),
            args: args.into(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(REQUEST_LEN);
        buf.put_u32_le(MAGIC);
        buf.put_u32_le(self.command.code());
        put_padded(&mut buf, &self.username, USERNAME_LEN);
        put_padded(&mut buf, &self.args, ARGS_LEN);
        let sum = checksum(&buf);
        buf.put_u32_le(sum);
        buf.freeze()
    }

    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let mut body = verify(frame, REQUEST_LEN)?;
        let code = body.get_u32_le();
        let command = Command::from_u32(code).ok_or(FrameError::UnknownCommand(code))?;
        let username = take_padded(&mut body, USERNAME_LEN);
        let args = take_padded(&mut body, ARGS_LEN);
        Ok(Self {
            command,
            username,
            args,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub data: String,
}

impl Response {
    pub fn new(status: Status, data: impl Into<String>) -> Self {
        Self {
            status,
            data: data.into(),
        }
    }

    pub fn ok(data: impl Into<String>) -> Self {
        Self::new(Status::Ok, data)
    }

    /// A failure carrying the status' default message.
    pub fn error(status: Status) -> Self {
        Self::new(status, status.message())
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RESPONSE_LEN);
        buf.put_u32_le(MAGIC);
        buf.put_u32_le(self.status.code());
        put_padded(&mut buf, &self.data, DATA_LEN);
        let sum = checksum(&buf);
        buf.put_u32_le(sum);
        buf.freeze()
    }

    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let mut body = verify(frame, RESPONSE_LEN)?;
        let code = body.get_u32_le();
        let status = Status::from_u32(code).ok_or(FrameError::UnknownStatus(code))?;
        let data = take_padded(&mut body, DATA_LEN);
        Ok(Self { status, data })
    }
}

/// Checks length, magic and checksum, returning the frame body that follows
/// the magic.
fn verify(frame: &[u8], len: usize) -> Result<&[u8], FrameError> {
    if frame.len() != len {
        return Err(FrameError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame length {} (expected {len})", frame.len()),
        )));
    }
    let mut head = &frame[..4];
    let magic = head.get_u32_le();
    if magic != MAGIC {
        return Err(FrameError::BadMagic(magic));
    }
    let (covered, mut trailer) = frame.split_at(len - 4);
    let expected = trailer.get_u32_le();
    let actual = checksum(covered);
    if expected != actual {
        return Err(FrameError::Corrupt { expected, actual });
    }
    Ok(&covered[4..])
}

/// Writes `value` into a `cap`-byte field, truncated so that at least one
/// terminating zero remains.
fn put_padded(buf: &mut BytesMut, value: &str, cap: usize) {
    let mut end = value.len().min(cap - 1);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    buf.put_slice(&value.as_bytes()[..end]);
    buf.put_bytes(0, cap - end);
}

fn take_padded(body: &mut &[u8], cap: usize) -> String {
    let field = &body[..cap];
    let end = field.iter().position(|b| *b == 0).unwrap_or(cap);
    let value = String::from_utf8_lossy(&field[..end]).into_owned();
    body.advance(cap);
    value
}
