//! Length-prefixed framing for wire payloads.
//!
//! Each frame is an 8-byte little-endian payload length followed by the
//! payload bytes. Framing is the transport's job: the codec in the parent
//! module never sees partial payloads, and writers must hold the stream
//! lock for a full frame so concurrent senders cannot interleave.

use std::io::{self, Read, Write};

/// Upper bound on a single frame payload.
///
/// A context snapshot for a large graph stays well under this; anything
/// bigger indicates a corrupt or hostile stream.
const MAX_FRAME_LEN: u64 = 64 * 1024 * 1024;

/// Writes one frame and flushes the stream.
///
/// # Errors
///
/// Returns the underlying I/O error when the write fails.
pub fn write_frame(writer: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let len = payload.len() as u64;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Reads one frame, returning `None` on a clean end of stream.
///
/// End of stream in the middle of a frame is an error: the peer vanished
/// mid-message.
///
/// # Errors
///
/// Returns `InvalidData` for oversized length prefixes, `UnexpectedEof` for
/// truncated frames, and the underlying I/O error otherwise.
pub fn read_frame(reader: &mut impl Read) -> io::Result<Option<Vec<u8>>> {
    let mut len_bytes = [0_u8; 8];
    match reader.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(error),
    }

    let len = u64::from_le_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds the {MAX_FRAME_LEN} byte limit"),
        ));
    }

    let mut payload = vec![0_u8; usize::try_from(len).expect("frame length fits usize")];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn round_trips_a_payload() {
        let mut stream = Vec::new();
        write_frame(&mut stream, b"hello plugin").expect("write frame");

        let mut reader = Cursor::new(stream);
        let payload = read_frame(&mut reader).expect("read frame");
        assert_eq!(payload.as_deref(), Some(&b"hello plugin"[..]));
        assert_eq!(read_frame(&mut reader).expect("eof"), None);
    }

    #[test]
    fn empty_payload_is_a_valid_frame() {
        let mut stream = Vec::new();
        write_frame(&mut stream, b"").expect("write frame");
        let payload = read_frame(&mut Cursor::new(stream)).expect("read frame");
        assert_eq!(payload.as_deref(), Some(&b""[..]));
    }

    #[test]
    fn consecutive_frames_preserve_boundaries() {
        let mut stream = Vec::new();
        write_frame(&mut stream, b"first").expect("write first");
        write_frame(&mut stream, b"second").expect("write second");

        let mut reader = Cursor::new(stream);
        assert_eq!(
            read_frame(&mut reader).expect("first").as_deref(),
            Some(&b"first"[..])
        );
        assert_eq!(
            read_frame(&mut reader).expect("second").as_deref(),
            Some(&b"second"[..])
        );
        assert_eq!(read_frame(&mut reader).expect("eof"), None);
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut stream = Vec::new();
        write_frame(&mut stream, b"complete payload").expect("write frame");
        stream.truncate(stream.len() - 4);

        let err = read_frame(&mut Cursor::new(stream)).expect_err("truncated");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&u64::MAX.to_le_bytes());
        let err = read_frame(&mut Cursor::new(stream)).expect_err("oversized");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
