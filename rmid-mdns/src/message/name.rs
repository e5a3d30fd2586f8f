//! DNS name codec.
//!
//! Names are dot-joined on the Rust side and length-prefixed on the wire.
//! Inbound decoding resolves RFC 1035 compression pointers into the source
//! packet; outbound encoding never emits pointers.

use shared::error::{Error, Result};

use super::buffer::{Reader, Writer};

// A pointer chain longer than this is treated as a loop.
pub(crate) const MAX_POINTER_HOPS: usize = 16;

const MAX_SEGMENT_LEN: usize = 63;

/// Decode a wire name at the reader's position.
///
/// A length byte with the top two bits set introduces a 14-bit offset
/// relative to the start of the packet; decoding continues there. After the
/// name ends the reader is left immediately past the terminating zero, or
/// past the first pointer if one was followed.
pub(crate) fn read_name(r: &mut Reader<'_>) -> Result<String> {
    let mut out: Vec<u8> = Vec::new();
    let mut resume = None;
    let mut hops = 0;
    loop {
        let len = r.read_u8()?;
        if len == 0 {
            break;
        }
        match len & 0xC0 {
            0xC0 => {
                let low = r.read_u8()?;
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(Error::ErrParseFault);
                }
                if resume.is_none() {
                    resume = Some(r.position());
                }
                r.set_position((((len & 0x3F) as usize) << 8) | low as usize)?;
            }
            0x00 => {
                if !out.is_empty() {
                    out.push(b'.');
                }
                out.extend_from_slice(r.read_slice(len as usize)?);
            }
            // 0x40 and 0x80 are reserved label types
            _ => return Err(Error::ErrParseFault),
        }
    }
    if let Some(position) = resume {
        r.set_position(position)?;
    }
    String::from_utf8(out).map_err(|_| Error::ErrParseFault)
}

/// Encode a name as length-prefixed segments plus a terminating zero.
pub(crate) fn write_name(w: &mut Writer<'_>, name: &str) -> Result<()> {
    for segment in name.split('.') {
        if segment.is_empty() {
            continue;
        }
        if segment.len() > MAX_SEGMENT_LEN {
            return Err(Error::ErrNameTooLong);
        }
        w.write_u8(segment.len() as u8)?;
        w.write_slice(segment.as_bytes())?;
    }
    w.write_u8(0)
}
