//! Length-prefixed framing shared by server and client: a 5-digit
//! left-zero-padded decimal byte count followed by the UTF-8 payload. Both
//! peers assume the same header width, so it is a constant, not negotiated.

use std::io::{self, Read, Write};

/// Width of the decimal length header, in bytes.
pub const HEADER_LEN: usize = 5;

/// Largest payload the header can describe.
pub const MAX_PAYLOAD: usize = 99_999;

/// Writes one frame, looping on partial writes. A zero-byte write means the
/// peer is gone and aborts with `WriteZero`.
pub fn send_frame<W: Write>(w: &mut W, payload: &str) -> io::Result<()> {
    let bytes = payload.as_bytes();
    if bytes.len() > MAX_PAYLOAD {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes exceeds frame limit", bytes.len()),
        ));
    }
    let mut frame = format!("{:05}", bytes.len()).into_bytes();
    frame.extend_from_slice(bytes);

    let mut sent = 0;
    while sent < frame.len() {
        match w.write(&frame[sent..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "peer disconnected mid-frame",
                ))
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    w.flush()
}

/// Reads one frame. Returns `Ok(None)` on EOF, including an EOF in the middle
/// of a frame: either way the peer is gone and the caller should log out the
/// connection rather than treat it as a protocol fault.
pub fn recv_frame<R: Read>(r: &mut R) -> io::Result<Option<String>> {
    let mut header = [0u8; HEADER_LEN];
    if !read_full(r, &mut header)? {
        return Ok(None);
    }
    let header = std::str::from_utf8(&header)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-ASCII frame header"))?;
    let size: usize = header
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-numeric frame header"))?;

    let mut payload = vec![0u8; size];
    if !read_full(r, &mut payload)? {
        return Ok(None);
    }
    let payload = String::from_utf8(payload)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame payload is not UTF-8"))?;
    Ok(Some(payload))
}

/// Fills `buf` completely; `Ok(false)` if the stream ended first.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut got = 0;
    while got < buf.len() {
        match r.read(&mut buf[got..]) {
            Ok(0) => return Ok(false),
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_round_trip() {
        let mut buf = Vec::new();
        send_frame(&mut buf, r#"{"action":"time"}"#).unwrap();
        assert!(buf.starts_with(b"00017"));

        let mut cur = Cursor::new(buf);
        assert_eq!(recv_frame(&mut cur).unwrap().as_deref(), Some(r#"{"action":"time"}"#));
        // Stream drained: next read is a clean EOF.
        assert_eq!(recv_frame(&mut cur).unwrap(), None);
    }

    #[test]
    fn empty_payload_is_a_valid_frame() {
        let mut buf = Vec::new();
        send_frame(&mut buf, "").unwrap();
        assert_eq!(buf, b"00000");
        assert_eq!(recv_frame(&mut Cursor::new(buf)).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn truncated_frame_reads_as_disconnect() {
        // Header promises 10 bytes, stream carries 3.
        let mut cur = Cursor::new(b"00010abc".to_vec());
        assert_eq!(recv_frame(&mut cur).unwrap(), None);

        // EOF in the middle of the header itself.
        let mut cur = Cursor::new(b"00".to_vec());
        assert_eq!(recv_frame(&mut cur).unwrap(), None);
    }

    #[test]
    fn garbage_header_is_invalid_data() {
        let mut cur = Cursor::new(b"abcdefghij".to_vec());
        let err = recv_frame(&mut cur).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let big = "x".repeat(MAX_PAYLOAD + 1);
        let err = send_frame(&mut Vec::new(), &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn back_to_back_frames_stay_delimited() {
        let mut buf = Vec::new();
        send_frame(&mut buf, "first").unwrap();
        send_frame(&mut buf, "second one").unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(recv_frame(&mut cur).unwrap().as_deref(), Some("first"));
        assert_eq!(recv_frame(&mut cur).unwrap().as_deref(), Some("second one"));
    }
}
