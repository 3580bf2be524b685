//! Framed request/response protocol spoken between clients, the name server
//! and storage servers.

mod codes;
mod frame;
mod io;

pub use codes::{Command, Status};
pub use frame::{
    ARGS_LEN, DATA_LEN, FrameError, MAGIC, REQUEST_LEN, RESPONSE_LEN, Request, Response,
    USERNAME_LEN, checksum,
};
pub use io::{recv_request, recv_response, send_request, send_response};

/// Maximum payload carried by one response frame. The last byte of the
/// data field is always a terminator.
pub const MAX_CHUNK: usize = DATA_LEN - 1;

/// Splits `text` into pieces no longer than `max` bytes, never cutting a
/// UTF-8 sequence in half.
pub fn chunk_text(text: &str, max: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut end = rest.len().min(max);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (head, tail) = rest.split_at(end);
        out.push(head);
        rest = tail;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_respect_char_boundaries() {
        let text = "aé".repeat(3);
        let chunks = chunk_text(&text, 2);
        assert!(chunks.iter().all(|c| c.len() <= 2));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_text("", MAX_CHUNK).is_empty());
    }
}
