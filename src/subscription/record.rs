//! Subscription registration record
//!
//! Binary form parsed by the server when a marker is registered:
//! - Kind (u8): SINGLE_ID / FULL_TYPE
//! - Subscription id (u32 LE)
//! - Node id (u32 LE) for SINGLE_ID, type id (u16 LE) for FULL_TYPE
//! - Type count (u16 LE), then one u16 type id each
//! - Now count (u16 LE), then `{field_offset: u32, relative_ms: i64, byte_index: u32}` each
//! - Query bytes (rest of the record)
//!
//! `byte_index` points into the query bytes; `patch_now` writes the live
//! timestamp there before every poll.

use super::errors::{SubscriptionError, SubscriptionResult};

/// Record discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    SingleId = 1,
    FullType = 2,
}

impl RecordKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RecordKind::SingleId),
            2 => Some(RecordKind::FullType),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// What a record watches directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordTarget {
    Node(u32),
    Type(u16),
}

/// One time-relative slot in the cached query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NowEntry {
    pub field_offset: u32,
    pub relative_ms: i64,
    pub byte_index: u32,
}

const NOW_ENTRY_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub sub_id: u32,
    pub target: RecordTarget,
    /// Types whose changes cascade to this subscription
    pub types: Vec<u16>,
    pub now: Vec<NowEntry>,
    pub query: Vec<u8>,
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> SubscriptionResult<&'a [u8]> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + n)
            .ok_or_else(|| SubscriptionError::InvalidRecord(format!("truncated {}", what)))?;
        self.pos += n;
        Ok(bytes)
    }

    fn u8(&mut self, what: &str) -> SubscriptionResult<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> SubscriptionResult<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &str) -> SubscriptionResult<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self, what: &str) -> SubscriptionResult<i64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8, what)?);
        Ok(i64::from_le_bytes(raw))
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos.min(self.buf.len())..];
        self.pos = self.buf.len();
        rest
    }
}

impl SubscriptionRecord {
    pub fn single_id(sub_id: u32, node_id: u32, query: Vec<u8>) -> Self {
        Self {
            sub_id,
            target: RecordTarget::Node(node_id),
            types: Vec::new(),
            now: Vec::new(),
            query,
        }
    }

    pub fn full_type(sub_id: u32, type_id: u16, query: Vec<u8>) -> Self {
        Self {
            target: RecordTarget::Type(type_id),
            ..Self::single_id(sub_id, 0, query)
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self.target {
            RecordTarget::Node(_) => RecordKind::SingleId,
            RecordTarget::Type(_) => RecordKind::FullType,
        }
    }

    pub fn has_now(&self) -> bool {
        !self.now.is_empty()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            13 + self.types.len() * 2 + self.now.len() * NOW_ENTRY_LEN + self.query.len(),
        );
        buf.push(self.kind().as_u8());
        buf.extend_from_slice(&self.sub_id.to_le_bytes());
        match self.target {
            RecordTarget::Node(id) => buf.extend_from_slice(&id.to_le_bytes()),
            RecordTarget::Type(id) => buf.extend_from_slice(&id.to_le_bytes()),
        }
        buf.extend_from_slice(&(self.types.len() as u16).to_le_bytes());
        for t in &self.types {
            buf.extend_from_slice(&t.to_le_bytes());
        }
        buf.extend_from_slice(&(self.now.len() as u16).to_le_bytes());
        for entry in &self.now {
            buf.extend_from_slice(&entry.field_offset.to_le_bytes());
            buf.extend_from_slice(&entry.relative_ms.to_le_bytes());
            buf.extend_from_slice(&entry.byte_index.to_le_bytes());
        }
        buf.extend_from_slice(&self.query);
        buf
    }

    pub fn decode(buf: &[u8]) -> SubscriptionResult<Self> {
        let mut cursor = Cursor { buf, pos: 0 };
        let kind_byte = cursor.u8("kind")?;
        let kind = RecordKind::from_u8(kind_byte).ok_or_else(|| {
            SubscriptionError::InvalidRecord(format!("unknown record kind {}", kind_byte))
        })?;
        let sub_id = cursor.u32("subscription id")?;
        let target = match kind {
            RecordKind::SingleId => RecordTarget::Node(cursor.u32("node id")?),
            RecordKind::FullType => RecordTarget::Type(cursor.u16("type id")?),
        };

        let type_count = cursor.u16("type count")? as usize;
        let mut types = Vec::with_capacity(type_count);
        for _ in 0..type_count {
            types.push(cursor.u16("type list")?);
        }

        let now_count = cursor.u16("now count")? as usize;
        let mut now = Vec::with_capacity(now_count);
        for _ in 0..now_count {
            now.push(NowEntry {
                field_offset: cursor.u32("now field offset")?,
                relative_ms: cursor.i64("now offset")?,
                byte_index: cursor.u32("now byte index")?,
            });
        }

        let record = Self {
            sub_id,
            target,
            types,
            now,
            query: cursor.rest().to_vec(),
        };
        record.check_now_slots()?;
        Ok(record)
    }

    fn check_now_slots(&self) -> SubscriptionResult<()> {
        for entry in &self.now {
            let end = entry.byte_index as usize + 8;
            if end > self.query.len() {
                return Err(SubscriptionError::InvalidRecord(format!(
                    "now slot at {} outside query of {} bytes",
                    entry.byte_index,
                    self.query.len()
                )));
            }
        }
        Ok(())
    }

    /// Writes `now_ms + relative_ms` (i64 LE) into every now slot
    pub fn patch_now(&mut self, now_ms: i64) -> SubscriptionResult<()> {
        self.check_now_slots()?;
        for entry in &self.now {
            let at = entry.byte_index as usize;
            let value = now_ms.saturating_add(entry.relative_ms);
            self.query[at..at + 8].copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_now() -> SubscriptionRecord {
        let mut record = SubscriptionRecord::full_type(7, 3, vec![0u8; 20]);
        record.types = vec![4, 5];
        record.now.push(NowEntry {
            field_offset: 12,
            relative_ms: -3_600_000,
            byte_index: 4,
        });
        record
    }

    #[test]
    fn test_layout() {
        let buf = SubscriptionRecord::single_id(0x0102_0304, 9, b"q".to_vec()).encode();
        assert_eq!(buf[0], 1);
        assert_eq!(&buf[1..5], &[4, 3, 2, 1]);
        assert_eq!(&buf[5..9], &9u32.to_le_bytes());
        assert_eq!(&buf[9..11], &[0, 0]);
        assert_eq!(&buf[11..13], &[0, 0]);
        assert_eq!(&buf[13..], b"q");
    }

    #[test]
    fn test_decode_full_type_with_now() {
        let record = with_now();
        let decoded = SubscriptionRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.kind(), RecordKind::FullType);
        assert!(decoded.has_now());
    }

    #[test]
    fn test_patch_now_writes_slot() {
        let mut record = with_now();
        record.patch_now(10_000_000).unwrap();
        assert_eq!(&record.query[4..12], &6_400_000i64.to_le_bytes());
        assert!(record.query[..4].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_rejects_bad_records() {
        assert!(SubscriptionRecord::decode(&[9, 0, 0, 0, 0]).is_err());
        assert!(SubscriptionRecord::decode(&[1, 0, 0]).is_err());

        let mut record = with_now();
        record.now[0].byte_index = 18;
        assert!(SubscriptionRecord::decode(&record.encode()).is_err());
    }
}
