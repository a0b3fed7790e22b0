//! Length-prefixed framing of routed commands on byte streams.
//!
//! Format:
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - zero-length and oversized frames are rejected
//!   - a clean EOF between frames ends the stream
//!   - EOF inside a frame, header included, is a truncation error

use std::io::{self, BufReader, BufWriter, Read, Write};

use prost::Message;

use crate::command::RoutedCommand;
use crate::wire::ProtoRoutedCommand;

/// Largest frame accepted on read.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Write one command as a length-prefixed protobuf frame.
pub fn write_frame<W: Write>(writer: W, command: &RoutedCommand) -> io::Result<()> {
    let buf = command.to_proto().encode_to_vec();
    if buf.is_empty() || buf.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Frame length out of range: {}", buf.len()),
        ));
    }
    let len = buf.len() as u32;

    let mut writer = BufWriter::new(writer);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&buf)?;
    writer.flush()
}

/// Read the next frame. `Ok(None)` on clean end of stream.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<RoutedCommand>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Truncated frame header: {} of 4 bytes", filled),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid frame length: {}", len),
        ));
    }

    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Truncated frame: {}", e),
        )
    })?;

    let proto = ProtoRoutedCommand::decode(frame.as_slice()).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Protobuf decode error: {}", e),
        )
    })?;

    Ok(Some(RoutedCommand::from_proto(&proto)))
}

/// Read every frame until end of stream.
pub fn read_all_frames<R: Read>(reader: R) -> io::Result<Vec<RoutedCommand>> {
    let mut reader = BufReader::new(reader);
    let mut commands = Vec::new();
    while let Some(command) = read_frame(&mut reader)? {
        commands.push(command);
    }
    Ok(commands)
}
