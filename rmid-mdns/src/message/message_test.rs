use super::buffer::{Reader, Writer};
use super::name::{read_name, write_name};
use super::{Header, RecordType};

use shared::error::Error;

fn encode_name(name: &str) -> Vec<u8> {
    let mut buf = [0u8; 512];
    let mut w = Writer::new(&mut buf);
    write_name(&mut w, name).unwrap();
    let end = w.position();
    buf[..end].to_vec()
}

#[test]
fn test_name_round_trip() {
    for name in [
        "local",
        "foo.local",
        "studio._apple-midi._udp.local",
        "a.b.c.d.e.f",
    ] {
        let encoded = encode_name(name);
        let mut r = Reader::new(&encoded);
        assert_eq!(read_name(&mut r).unwrap(), name);
        assert_eq!(r.position(), encoded.len());
    }
}

#[test]
fn test_name_round_trip_long_segments() {
    let segment = "x".repeat(63);
    let name = format!("{segment}.{segment}.{segment}.{}", "y".repeat(61));
    assert_eq!(name.len(), 253);
    let encoded = encode_name(&name);
    let mut r = Reader::new(&encoded);
    assert_eq!(read_name(&mut r).unwrap(), name);
}

#[test]
fn test_name_segment_too_long() {
    let name = format!("{}.local", "x".repeat(64));
    let mut buf = [0u8; 512];
    let mut w = Writer::new(&mut buf);
    assert_eq!(write_name(&mut w, &name), Err(Error::ErrNameTooLong));
}

#[test]
fn test_name_trailing_dot_is_tolerated() {
    let encoded = encode_name("foo.local.");
    let mut r = Reader::new(&encoded);
    assert_eq!(read_name(&mut r).unwrap(), "foo.local");
}

#[test]
fn test_empty_name_is_a_lone_zero() {
    let encoded = encode_name("");
    assert_eq!(encoded, vec![0]);
    let mut r = Reader::new(&encoded);
    assert_eq!(read_name(&mut r).unwrap(), "");
}

#[test]
fn test_compression_pointer_whole_name() {
    // "foo.local" at offset 0, then a bare pointer back to it
    let mut packet = encode_name("foo.local");
    let pointer_at = packet.len();
    packet.extend_from_slice(&[0xC0, 0x00]);

    let mut r = Reader::new(&packet);
    r.set_position(pointer_at).unwrap();
    assert_eq!(read_name(&mut r).unwrap(), "foo.local");
    // the reader resumes right after the 2-byte pointer
    assert_eq!(r.position(), pointer_at + 2);
}

#[test]
fn test_compression_pointer_after_prefix() {
    // "foo.local" at offset 0; "local" alone starts at offset 4
    let mut packet = encode_name("foo.local");
    let name_at = packet.len();
    packet.extend_from_slice(&[3, b'b', b'a', b'r', 0xC0, 0x04]);

    let mut r = Reader::new(&packet);
    r.set_position(name_at).unwrap();
    assert_eq!(read_name(&mut r).unwrap(), "bar.local");
    assert_eq!(r.position(), packet.len());
}

#[test]
fn test_compression_pointer_loop_is_rejected() {
    let packet = [0xC0, 0x00];
    let mut r = Reader::new(&packet);
    assert_eq!(read_name(&mut r), Err(Error::ErrParseFault));
}

#[test]
fn test_reserved_label_type_is_rejected() {
    for first in [0x40u8, 0x80] {
        let packet = [first | 3, b'f', b'o', b'o', 0];
        let mut r = Reader::new(&packet);
        assert_eq!(read_name(&mut r), Err(Error::ErrParseFault));
    }
}

#[test]
fn test_truncated_name_is_rejected() {
    let encoded = encode_name("foo.local");
    // every proper prefix must fail cleanly
    for len in 0..encoded.len() {
        let mut r = Reader::new(&encoded[..len]);
        assert_eq!(read_name(&mut r), Err(Error::ErrParseFault), "prefix {len}");
    }
}

#[test]
fn test_reader_bounds() {
    let buf = [0x12, 0x34, 0x56];
    let mut r = Reader::new(&buf);
    assert_eq!(r.read_u16().unwrap(), 0x1234);
    assert_eq!(r.read_u16(), Err(Error::ErrParseFault));
    // a failed read leaves no partial advance observable beyond the buffer
    assert!(r.set_position(4).is_err());
    r.set_position(0).unwrap();
    assert_eq!(r.read_u8().unwrap(), 0x12);
}

#[test]
fn test_reader_u32() {
    let buf = [0x00, 0x00, 0x00, 0x3C];
    let mut r = Reader::new(&buf);
    assert_eq!(r.read_u32().unwrap(), 60);
}

#[test]
fn test_writer_bounds_and_patch() {
    let mut buf = [0u8; 4];
    let mut w = Writer::new(&mut buf);
    w.write_u16(0xAABB).unwrap();
    w.write_u16(0).unwrap();
    assert_eq!(w.write_u8(0), Err(Error::ErrParseFault));
    w.patch_u16(2, 0x0102).unwrap();
    assert!(w.patch_u16(3, 0).is_err());
    assert_eq!(buf, [0xAA, 0xBB, 0x01, 0x02]);
}

#[test]
fn test_header_read() {
    let bytes = [
        0x00, 0x01, // id
        0x84, 0x00, // flags
        0x00, 0x02, // questions
        0x00, 0x03, // answers
        0x00, 0x04, // authorities
        0x00, 0x05, // additionals
    ];
    let mut r = Reader::new(&bytes);
    let header = Header::read(&mut r).unwrap();
    assert_eq!(header.id, 1);
    assert_eq!(header.flags, 0x8400);
    assert_eq!(header.questions, 2);
    assert_eq!(header.answers, 3);
    assert_eq!(header.authorities, 4);
    assert_eq!(header.additionals, 5);
    assert_eq!(r.position(), 12);

    let mut short = Reader::new(&bytes[..10]);
    assert_eq!(Header::read(&mut short), Err(Error::ErrParseFault));
}

#[test]
fn test_record_type_codes() {
    assert_eq!(RecordType::A.value(), 1);
    assert_eq!(RecordType::Ptr.value(), 12);
    assert_eq!(RecordType::Txt.value(), 16);
    assert_eq!(RecordType::Srv.value(), 33);
    assert_eq!(RecordType::from_u16(33), Some(RecordType::Srv));
    assert_eq!(RecordType::from_u16(28), None); // AAAA is out of scope
}
