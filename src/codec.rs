//! On-disk log record framing.
//!
//! ```text
//! crc32(4, LE) | type(1) | keySize(varint) | valueSize(varint) | key | value
//! ```
//!
//! The header is at most `4 + 1 + 5 + 5 = 15` bytes since both sizes are zig-zag varints capped
//! at 5 bytes (32-bit range is enough for any single key or value this engine will ever hold).

use bytes::{Bytes, BytesMut};
use integer_encoding::{VarInt, VarIntWriter};

use crate::error::{Error, Result};

/// Upper bound on the encoded header size, used to size the initial read when probing a record.
pub const MAX_HEADER_SIZE: usize = 4 + 1 + 5 + 5;

/// The "fin" key suffix appended after a transaction's sequence number to build the sentinel
/// record's key, matching `transactionFinishKey` in the original implementation.
pub const TXN_FIN_KEY: &[u8] = b"fin";

/// Tag distinguishing a live value, a tombstone, and a write-batch commit sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// A normal put.
    Normal = 0,
    /// A delete marker; the record's value is empty and must be ignored.
    Tombstone = 1,
    /// Sentinel closing a write batch; carries no user data.
    TxnCommit = 2,
}

impl RecordType {
    fn from_u8(b: u8) -> Result<Self> {
        match b {
            0 => Ok(RecordType::Normal),
            1 => Ok(RecordType::Tombstone),
            2 => Ok(RecordType::TxnCommit),
            _ => Err(Error::RecordCorrupted),
        }
    }
}

/// A single decoded log record.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub key: Bytes,
    pub value: Bytes,
    pub record_type: RecordType,
}

impl LogRecord {
    pub fn new(key: Bytes, value: Bytes, record_type: RecordType) -> Self {
        Self {
            key,
            value,
            record_type,
        }
    }

    /// Encode this record to its on-disk byte representation.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MAX_HEADER_SIZE + self.key.len() + self.value.len());
        // Reserve space for the CRC, filled in once the rest is written.
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&[self.record_type as u8]);
        buf.write_varint(self.key.len() as i64).expect("write to BytesMut cannot fail");
        buf.write_varint(self.value.len() as i64).expect("write to BytesMut cannot fail");
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let crc = crc32fast::hash(&buf[4..]);
        buf[0..4].copy_from_slice(&crc.to_le_bytes());
        buf.freeze()
    }
}

/// A decoded header plus the byte length it occupied, returned by [`decode_header`].
pub(crate) struct Header {
    pub crc: u32,
    pub record_type: RecordType,
    pub key_size: usize,
    pub value_size: usize,
    pub header_len: usize,
}

/// Decode a record header from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` is too short to contain a header, or when the header decodes
/// to an all-zero CRC/key-size/value-size triple (the zero-filled tail left by a pre-allocated
/// or truncated segment) — both are treated as end-of-file by the replay loop.
pub(crate) fn decode_header(buf: &[u8]) -> Result<Option<Header>> {
    if buf.len() < 5 {
        return Ok(None);
    }
    let crc = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let record_type = buf[4];

    let rest = &buf[5..];
    let (key_size, n1) = match i64::decode_var(rest) {
        Some(v) => v,
        None => return Ok(None),
    };
    let (value_size, n2) = match i64::decode_var(&rest[n1..]) {
        Some(v) => v,
        None => return Ok(None),
    };

    if crc == 0 && record_type == 0 && key_size == 0 && value_size == 0 {
        return Ok(None);
    }

    Ok(Some(Header {
        crc,
        record_type: RecordType::from_u8(record_type)?,
        key_size: key_size as usize,
        value_size: value_size as usize,
        header_len: 5 + n1 + n2,
    }))
}

/// Decode a full record, given the header and the bytes following it (key ++ value) and
/// validate its CRC. `header_bytes` must be exactly the `header.header_len` bytes the header
/// was decoded from.
pub(crate) fn decode_body(header: &Header, header_bytes: &[u8], body: &[u8]) -> Result<LogRecord> {
    if body.len() < header.key_size + header.value_size {
        return Err(Error::RecordCorrupted);
    }
    let key = &body[..header.key_size];
    let value = &body[header.key_size..header.key_size + header.value_size];

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header_bytes[4..]);
    hasher.update(body);
    if hasher.finalize() != header.crc {
        return Err(Error::RecordCorrupted);
    }

    Ok(LogRecord::new(
        Bytes::copy_from_slice(key),
        Bytes::copy_from_slice(value),
        header.record_type,
    ))
}

/// Prefix a user key with its write-batch sequence number: `uvarint(seq) ++ key`.
///
/// `seq == 0` means the write is not part of a transaction.
pub fn encode_key_with_seq(key: &[u8], seq: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(10 + key.len());
    buf.write_varint(seq).expect("write to BytesMut cannot fail");
    buf.extend_from_slice(key);
    buf.freeze()
}

/// Split a sequence-prefixed key back into `(seq, user_key)`.
pub fn decode_key_with_seq(buf: &[u8]) -> Result<(u64, Bytes)> {
    let (seq, n) = u64::decode_var(buf).ok_or(Error::RecordCorrupted)?;
    Ok((seq, Bytes::copy_from_slice(&buf[n..])))
}

/// Encode a key directory position for storage as a hint-file record value:
/// `varint(fid) ++ varint(offset) ++ varint(size)`.
pub fn encode_position(fid: u64, offset: u64, size: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(30);
    buf.write_varint(fid).expect("write to BytesMut cannot fail");
    buf.write_varint(offset).expect("write to BytesMut cannot fail");
    buf.write_varint(size).expect("write to BytesMut cannot fail");
    buf.freeze()
}

/// Decode a hint-file position value produced by [`encode_position`].
pub fn decode_position(buf: &[u8]) -> Result<(u64, u64, u64)> {
    let (fid, n1) = u64::decode_var(buf).ok_or(Error::RecordCorrupted)?;
    let (offset, n2) = u64::decode_var(&buf[n1..]).ok_or(Error::RecordCorrupted)?;
    let (size, _n3) = u64::decode_var(&buf[n1 + n2..]).ok_or(Error::RecordCorrupted)?;
    Ok((fid, offset, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_normal_record() {
        let rec = LogRecord::new(Bytes::from_static(b"hello"), Bytes::from_static(b"world"), RecordType::Normal);
        let encoded = rec.encode();
        let header = decode_header(&encoded).unwrap().unwrap();
        let body = decode_body(&header, &encoded[..header.header_len], &encoded[header.header_len..]).unwrap();
        assert_eq!(body.key, rec.key);
        assert_eq!(body.value, rec.value);
        assert_eq!(body.record_type, RecordType::Normal);
    }

    #[test]
    fn empty_value_round_trips() {
        let rec = LogRecord::new(Bytes::from_static(b"k"), Bytes::new(), RecordType::Tombstone);
        let encoded = rec.encode();
        let header = decode_header(&encoded).unwrap().unwrap();
        assert_eq!(header.value_size, 0);
        let body = decode_body(&header, &encoded[..header.header_len], &encoded[header.header_len..]).unwrap();
        assert_eq!(body.record_type, RecordType::Tombstone);
    }

    #[test]
    fn corrupted_crc_is_detected() {
        let rec = LogRecord::new(Bytes::from_static(b"k"), Bytes::from_static(b"v"), RecordType::Normal);
        let mut encoded = rec.encode().to_vec();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        let header = decode_header(&encoded).unwrap().unwrap();
        let result = decode_body(&header, &encoded[..header.header_len], &encoded[header.header_len..]);
        assert!(matches!(result, Err(Error::RecordCorrupted)));
    }

    #[test]
    fn all_zero_header_signals_eof() {
        let buf = [0u8; MAX_HEADER_SIZE];
        assert!(decode_header(&buf).unwrap().is_none());
    }

    #[test]
    fn short_buffer_signals_eof() {
        let buf = [0u8; 2];
        assert!(decode_header(&buf).unwrap().is_none());
    }

    #[test]
    fn seq_key_round_trips() {
        let encoded = encode_key_with_seq(b"mykey", 42);
        let (seq, key) = decode_key_with_seq(&encoded).unwrap();
        assert_eq!(seq, 42);
        assert_eq!(key, Bytes::from_static(b"mykey"));
    }

    #[test]
    fn position_round_trips() {
        let encoded = encode_position(7, 1024, 64);
        let (fid, offset, size) = decode_position(&encoded).unwrap();
        assert_eq!((fid, offset, size), (7, 1024, 64));
    }
}
