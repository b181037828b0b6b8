//! Record resynchronizer.
//!
//! After a failed decode at offset `L`, search forward for the next
//! plausible record. Hypotheses are tried in order at each candidate
//! offset, each one from a freshly restored position:
//!
//! 1. an address record whose payload the tolerant decoder accepts;
//! 2. a corrupt address record: skip one full record and take the next
//!    entry the strict reader accepts;
//! 3. an address comment followed by a readable record;
//! 4. a transaction comment followed by a readable record;
//! 5. a deleted record (all-zero body) followed by a readable record;
//! 6. no match: advance one byte and try again, until end of buffer.
//!
//! On acceptance the reader is left exactly at the end of the accepted
//! record; a record that was merely probed is re-read by the caller's main
//! loop rather than swallowed. On failure the position is restored to the
//! starting offset.

use tracing::debug;

use salvage_core::reader::BinaryReader;
use salvage_wallet::entry::AddressEntry;
use salvage_wallet::wallet::unpack_next_entry;
use salvage_wallet::{EntryType, ENTRY_SIZE, KEYDATA_RECORD_SIZE};

use crate::decode::decode_address_with_recovery;

/// An accepted record found past a damaged region.
#[derive(Debug)]
pub struct ResyncFind {
    pub dtype: EntryType,
    pub key: Vec<u8>,
    pub body: Vec<u8>,
    /// Absolute offset of the accepted record.
    pub offset: usize,
    /// Hypothesis 1 only: the already-decoded entry and its checksum mask.
    pub recovered: Option<(AddressEntry, u8)>,
}

/// Search forward from `start` for the next plausible record.
///
/// `None` means no further valid data exists; the reader is then restored
/// to `start`. Always terminates at or before the end of the buffer.
pub fn look_for_further_entry(reader: &mut BinaryReader, start: usize) -> Option<ResyncFind> {
    let mut loc = start;
    while loc < reader.len() {
        if let Some(find) = try_address(reader, loc) {
            debug!(offset = find.offset, "resync: address hypothesis accepted");
            return Some(find);
        }
        if let Some(find) = try_skip_one(reader, loc) {
            debug!(offset = find.offset, "resync: skip-one hypothesis accepted");
            return Some(find);
        }
        if let Some(find) = try_comment(reader, loc, EntryType::AddrComment, 20) {
            debug!(offset = find.offset, "resync: address-comment hypothesis accepted");
            return Some(find);
        }
        if let Some(find) = try_comment(reader, loc, EntryType::TxComment, 32) {
            debug!(offset = find.offset, "resync: tx-comment hypothesis accepted");
            return Some(find);
        }
        if let Some(find) = try_deleted(reader, loc) {
            debug!(offset = find.offset, "resync: deleted-entry hypothesis accepted");
            return Some(find);
        }
        loc += 1;
    }
    reader.set_position(start).ok();
    None
}

/// Hypothesis 1: tag + 20-byte key + a payload the tolerant decoder takes.
fn try_address(reader: &mut BinaryReader, loc: usize) -> Option<ResyncFind> {
    reader.set_position(loc).ok()?;
    reader.advance(1).ok()?;
    let key = reader.get_bytes(20).ok()?.to_vec();
    let body = reader.get_bytes(ENTRY_SIZE).ok()?.to_vec();
    match decode_address_with_recovery(&body) {
        Ok((entry, mask)) => Some(ResyncFind {
            dtype: EntryType::KeyData,
            key,
            body,
            offset: loc,
            recovered: Some((entry, mask)),
        }),
        Err(_) => None,
    }
}

/// Hypothesis 2: assume a wrecked address record and accept the record
/// immediately after it. The follower is consumed, so it is the accepted
/// record, not a probe.
fn try_skip_one(reader: &mut BinaryReader, loc: usize) -> Option<ResyncFind> {
    reader.set_position(loc).ok()?;
    reader.advance(KEYDATA_RECORD_SIZE).ok()?;
    let offset = reader.position();
    match unpack_next_entry(reader) {
        Ok((dtype, key, body)) => Some(ResyncFind {
            dtype,
            key,
            body,
            offset,
            recovered: None,
        }),
        Err(_) => None,
    }
}

/// Hypotheses 3 and 4: a comment record, validated by probing for a
/// readable record right after it.
fn try_comment(
    reader: &mut BinaryReader,
    loc: usize,
    dtype: EntryType,
    key_len: usize,
) -> Option<ResyncFind> {
    reader.set_position(loc).ok()?;
    reader.advance(1).ok()?;
    let key = reader.get_bytes(key_len).ok()?.to_vec();
    let len = reader.get_u16_le().ok()? as usize;
    let body = reader.get_bytes(len).ok()?.to_vec();
    let end = reader.position();

    unpack_next_entry(reader).ok()?;
    reader.set_position(end).ok()?;
    Some(ResyncFind {
        dtype,
        key,
        body,
        offset: loc,
        recovered: None,
    })
}

/// Hypothesis 5: a deleted record. The body must be all zero bytes and a
/// readable record must follow.
fn try_deleted(reader: &mut BinaryReader, loc: usize) -> Option<ResyncFind> {
    reader.set_position(loc).ok()?;
    reader.advance(1).ok()?;
    let len = reader.get_u16_le().ok()? as usize;
    let body = reader.get_bytes(len).ok()?.to_vec();
    if body.iter().any(|b| *b != 0) {
        return None;
    }
    let end = reader.position();

    unpack_next_entry(reader).ok()?;
    reader.set_position(end).ok()?;
    Some(ResyncFind {
        dtype: EntryType::Deleted,
        key: Vec::new(),
        body,
        offset: loc,
        recovered: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use salvage_core::{ChainCode, SecureBytes};
    use salvage_wallet::entry::AddressEntry;

    fn entry(index: i64) -> AddressEntry {
        AddressEntry::from_private_key(
            index,
            &SecureBytes::from_slice(&[0x61 + index as u8; 32]),
            ChainCode::from_bytes([0x2e; 32]),
        )
        .unwrap()
    }

    fn keydata_record(entry: &AddressEntry) -> Vec<u8> {
        let mut out = vec![EntryType::KeyData.tag()];
        out.extend_from_slice(entry.hash160.as_bytes());
        out.extend_from_slice(&entry.serialize());
        out
    }

    fn comment_record(tag: u8, key: &[u8], text: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(key);
        out.extend_from_slice(&(text.len() as u16).to_le_bytes());
        out.extend_from_slice(text);
        out
    }

    #[test]
    fn finds_entry_after_noise() {
        let mut data = vec![0xc7u8; 100]; // junk with no tag structure
        let good = entry(0);
        data.extend_from_slice(&keydata_record(&good));

        let mut reader = BinaryReader::new(&data);
        let find = look_for_further_entry(&mut reader, 0).unwrap();
        assert_eq!(find.dtype, EntryType::KeyData);
        assert_eq!(find.offset, 100);
        assert_eq!(find.key, good.hash160.as_bytes());
        let (decoded, mask) = find.recovered.unwrap();
        assert_eq!(mask, 0);
        assert_eq!(decoded.chain_index, 0);
        assert_eq!(reader.position(), data.len());
    }

    #[test]
    fn accepts_follower_after_wrecked_record() {
        // A full record's width of noise, then a good record. The noise is
        // dense enough that no earlier hypothesis fires.
        let mut data = vec![0xffu8; KEYDATA_RECORD_SIZE];
        let good = entry(1);
        data.extend_from_slice(&keydata_record(&good));

        let mut reader = BinaryReader::new(&data);
        let find = look_for_further_entry(&mut reader, 0).unwrap();
        assert_eq!(find.dtype, EntryType::KeyData);
        assert_eq!(find.offset, KEYDATA_RECORD_SIZE);
        assert_eq!(reader.position(), data.len());
    }

    #[test]
    fn comment_requires_following_record() {
        // Comment alone at end of buffer: hypothesis must reject it.
        let lone = comment_record(1, &[0xaa; 20], b"note to self");
        let mut reader = BinaryReader::new(&lone);
        assert!(try_comment(&mut reader, 0, EntryType::AddrComment, 20).is_none());

        // Same comment followed by a record: accepted, reader left at the
        // end of the comment so the follower is re-read by the caller.
        let mut data = lone.clone();
        data.extend_from_slice(&keydata_record(&entry(2)));
        let mut reader = BinaryReader::new(&data);
        let find = try_comment(&mut reader, 0, EntryType::AddrComment, 20).unwrap();
        assert_eq!(find.body, b"note to self");
        assert_eq!(reader.position(), lone.len());
    }

    #[test]
    fn deleted_requires_zero_body() {
        let mut zero_body = vec![4u8, 8, 0];
        zero_body.extend_from_slice(&[0u8; 8]);
        let mut data = zero_body.clone();
        data.extend_from_slice(&keydata_record(&entry(3)));
        let mut reader = BinaryReader::new(&data);
        let find = try_deleted(&mut reader, 0).unwrap();
        assert_eq!(find.dtype, EntryType::Deleted);
        assert_eq!(reader.position(), zero_body.len());

        let mut dirty = data.clone();
        dirty[5] = 0x01;
        let mut reader = BinaryReader::new(&dirty);
        assert!(try_deleted(&mut reader, 0).is_none());
    }

    #[test]
    fn pure_noise_terminates_with_none() {
        let data = vec![0xb1u8; 600];
        let mut reader = BinaryReader::new(&data);
        assert!(look_for_further_entry(&mut reader, 0).is_none());
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn empty_tail_terminates() {
        let data = keydata_record(&entry(4));
        let mut reader = BinaryReader::new(&data);
        // Start the search at the very end: nothing to find.
        assert!(look_for_further_entry(&mut reader, data.len()).is_none());
    }
}
