//! Length-framed wire format shared by coordinator and peer.
//!
//! Every frame is a 4-byte big-endian payload length followed by a bincode
//! encoded [`Envelope`]. There is no handshake or versioning; either side
//! ends a session by closing the stream.

use crate::candidate::Candidate;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpStream};

/// Upper bound on a single frame's payload.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub candidate: Candidate,
}

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<MAX_FRAME_LEN>()
}

pub fn write_envelope<W: Write>(writer: &mut W, envelope: &Envelope) -> Result<()> {
    let payload = bincode::serde::encode_to_vec(envelope, bincode_config())?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame. `Ok(None)` means the stream closed cleanly between
/// frames; a close inside a frame is an error.
pub fn read_envelope<R: Read>(reader: &mut R) -> Result<Option<Envelope>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let (envelope, used) = bincode::serde::decode_from_slice(&payload, bincode_config())?;
    if used != payload.len() {
        return Err(Error::TrailingBytes {
            extra: payload.len() - used,
        });
    }
    Ok(Some(envelope))
}

/// One side of a session: a TCP stream with buffered framing on both halves.
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    peer: SocketAddr,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let writer = BufWriter::new(stream.try_clone()?);
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn send(&mut self, candidate: Candidate) -> Result<()> {
        write_envelope(&mut self.writer, &Envelope { candidate })
    }

    pub fn receive(&mut self) -> Result<Option<Candidate>> {
        Ok(read_envelope(&mut self.reader)?.map(|envelope| envelope.candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Color, Genome, Shape, ShapeKind};
    use std::io::Cursor;

    fn candidate() -> Candidate {
        Candidate::new(
            Genome::from(vec![
                Shape {
                    kind: ShapeKind::Circle,
                    x: 12,
                    y: -4,
                    size: 9,
                    color: Color::new(1, 2, 3, 44),
                },
                Shape {
                    kind: ShapeKind::Rectangle,
                    x: 0,
                    y: 300,
                    size: 1,
                    color: Color::new(255, 0, 128, 200),
                },
            ]),
            123_456.0,
        )
    }

    fn framed(candidate: Candidate) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_envelope(&mut bytes, &Envelope { candidate }).unwrap();
        bytes
    }

    #[test]
    fn frames_carry_genome_and_score() {
        let bytes = framed(candidate());
        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(len, bytes.len() - 4);

        let mut cursor = Cursor::new(bytes);
        let decoded = read_envelope(&mut cursor).unwrap().unwrap().candidate;
        assert_eq!(decoded.genome(), candidate().genome());
        assert_eq!(decoded.score(), candidate().score());
        assert!(read_envelope(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn consecutive_frames_decode_in_order() {
        let mut bytes = framed(candidate());
        bytes.extend(framed(Candidate::new(Genome::new(), 7.0)));
        let mut cursor = Cursor::new(bytes);
        assert_eq!(read_envelope(&mut cursor).unwrap().unwrap().candidate.score(), 123_456.0);
        assert_eq!(read_envelope(&mut cursor).unwrap().unwrap().candidate.score(), 7.0);
        assert!(read_envelope(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn truncated_frames_are_errors() {
        let bytes = framed(candidate());
        for cut in [2, 4, bytes.len() - 1] {
            let mut cursor = Cursor::new(bytes[..cut].to_vec());
            assert!(read_envelope(&mut cursor).is_err(), "cut at {}", cut);
        }
    }

    #[test]
    fn oversized_length_is_rejected_before_reading() {
        let mut cursor = Cursor::new(u32::MAX.to_be_bytes().to_vec());
        assert!(matches!(
            read_envelope(&mut cursor),
            Err(Error::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn garbage_payload_is_a_decode_error() {
        let mut bytes = 3u32.to_be_bytes().to_vec();
        bytes.extend([0xff, 0xff, 0xff]);
        assert!(matches!(
            read_envelope(&mut Cursor::new(bytes)),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn bytes_after_the_envelope_are_rejected() {
        let mut payload = bincode::serde::encode_to_vec(
            &Envelope {
                candidate: candidate(),
            },
            bincode_config(),
        )
        .unwrap();
        payload.extend([0xde, 0xad, 0xbe, 0xef]);
        let mut bytes = (payload.len() as u32).to_be_bytes().to_vec();
        bytes.extend(payload);
        assert!(matches!(
            read_envelope(&mut Cursor::new(bytes)),
            Err(Error::TrailingBytes { extra: 4 })
        ));
    }
}
