//! Universal properties of the codecs, decoder and resynchronizer.

use std::fs;

use proptest::prelude::*;

use salvage_core::reader::BinaryReader;
use salvage_core::{crypto, ChainCode, SecureBytes};
use salvage_recover::decode::{
    decode_address_with_recovery, MASK_CHAINCODE, MASK_HASH160, MASK_PRIV_UNREADABLE,
    MASK_PUB_UNREADABLE,
};
use salvage_recover::{
    look_for_further_entry, recover_wallet, NullSink, RecoveryMode, RecoveryOutput,
};
use salvage_tests::helpers::*;
use salvage_wallet::entry::AddressEntry;

/// (start, length) of each checksum-protected region (field + checksum)
/// inside the entry payload, with the mask bit unreadability sets.
const PROTECTED: [(usize, usize, u8); 4] = [
    (0, 24, MASK_HASH160),
    (36, 36, MASK_CHAINCODE),
    (108, 36, MASK_PRIV_UNREADABLE),
    (144, 69, MASK_PUB_UNREADABLE),
];

fn entry_from_seed(seed: [u8; 32], cc: [u8; 32], index: i64) -> Option<AddressEntry> {
    crypto::compute_public_key(&seed).ok()?;
    AddressEntry::from_private_key(index, &SecureBytes::from_slice(&seed), ChainCode::from_bytes(cc))
        .ok()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    // P1: encode/decode is the identity and the checksum mask is zero.
    #[test]
    fn p1_roundtrip(seed in any::<[u8; 32]>(), cc in any::<[u8; 32]>(), encrypted in any::<bool>()) {
        let Some(mut entry) = entry_from_seed(seed, cc, 3) else {
            return Ok(());
        };
        if encrypted {
            entry.lock(&SecureBytes::from_slice(&[0x31; 32])).unwrap();
        }
        let bytes = entry.serialize();

        let strict = AddressEntry::deserialize(&bytes).unwrap();
        prop_assert_eq!(strict.serialize(), bytes.clone());

        let (tolerant, mask) = decode_address_with_recovery(&bytes).unwrap();
        prop_assert_eq!(mask, 0);
        prop_assert_eq!(tolerant.serialize(), bytes);
    }

    // P3a: any single flipped bit inside a protected region is repaired.
    #[test]
    fn p3_single_bit_is_repaired(
        seed in any::<[u8; 32]>(),
        cc in any::<[u8; 32]>(),
        field in 0usize..PROTECTED.len(),
        bit in any::<u16>(),
    ) {
        let Some(entry) = entry_from_seed(seed, cc, 2) else {
            return Ok(());
        };
        let bytes = entry.serialize();
        let (start, len, _) = PROTECTED[field];
        let bit = bit as usize % (len * 8);
        let mut mutated = bytes.clone();
        mutated[start + bit / 8] ^= 1 << (bit % 8);

        let (decoded, mask) = decode_address_with_recovery(&mutated).unwrap();
        prop_assert_eq!(mask, 0);
        prop_assert_eq!(decoded.serialize(), bytes);
    }

    // P3b: heavier damage to one sub-field never contaminates neighbours.
    #[test]
    fn p3_byte_damage_is_isolated(
        seed in any::<[u8; 32]>(),
        cc in any::<[u8; 32]>(),
        field in 0usize..PROTECTED.len(),
        byte in any::<u16>(),
        flip in 1u8..=255,
    ) {
        let Some(entry) = entry_from_seed(seed, cc, 2) else {
            return Ok(());
        };
        let bytes = entry.serialize();
        let (start, len, field_bit) = PROTECTED[field];
        let mut mutated = bytes.clone();
        mutated[start + byte as usize % len] ^= flip;

        let (decoded, mask) = decode_address_with_recovery(&mutated).unwrap();
        // Either repaired outright, or only this field's bit is raised.
        prop_assert_eq!(mask & !field_bit, 0);
        if mask == 0 {
            prop_assert_eq!(decoded.serialize(), bytes);
            return Ok(());
        }

        // Neighbouring fields decode to the original values.
        prop_assert_eq!(decoded.chain_index, entry.chain_index);
        if field != 0 {
            prop_assert_eq!(decoded.hash160, entry.hash160);
        }
        if field != 1 {
            prop_assert_eq!(decoded.chaincode, entry.chaincode);
        }
        if field != 2 {
            prop_assert_eq!(&decoded.priv_plain, &entry.priv_plain);
        }
        // A destroyed public key is recomputed from the plaintext private
        // key, so it matches the original whichever field was hit.
        prop_assert_eq!(decoded.pub_key, entry.pub_key);
    }

    // P4: the resynchronizer terminates at or before EOF on any input.
    #[test]
    fn p4_resync_terminates(
        data in proptest::collection::vec(any::<u8>(), 0..1200),
        start in any::<u16>(),
    ) {
        let start = start as usize % (data.len() + 1);
        let mut reader = BinaryReader::new(&data);
        match look_for_further_entry(&mut reader, start) {
            Some(find) => {
                prop_assert!(find.offset >= start);
                prop_assert!(find.offset <= data.len());
                prop_assert!(reader.position() <= data.len());
            }
            None => prop_assert_eq!(reader.position(), start),
        }
    }
}

// P5: Stripped mode never reads the body. Wreck the entire body; the run
// still succeeds and reports nothing about it.
#[test]
fn p5_stripped_ignores_body() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stripped.wallet");
    build_wallet(&path, 10, None);
    let size = file_size(&path) as usize;
    let body_start = record_offset(1);
    fill_range(&path, body_start, size - body_start, 0xee);

    let output = recover_wallet(recovery_options(&path, RecoveryMode::Stripped), &NullSink)
        .expect("stripped recovery succeeds");
    match output {
        RecoveryOutput::Recovered {
            wallet_path,
            log_path,
        } => {
            assert!(wallet_path.unwrap().exists());
            let text = fs::read_to_string(log_path).unwrap();
            assert!(text.contains("stripped recovery done"));
            assert!(!text.contains("Raw binary error"));
        }
        other => panic!("unexpected output: {other:?}"),
    }
}

// P7: two runs over the same input produce identical logs, apart from the
// timestamp line.
#[test]
fn p7_log_determinism() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a").join("w.wallet");
    let second = dir.path().join("b").join("w.wallet");
    fs::create_dir_all(first.parent().unwrap()).unwrap();
    fs::create_dir_all(second.parent().unwrap()).unwrap();

    build_wallet(&first, 8, None);
    // Inject assorted damage, then run on two identical copies.
    xor_byte(&first, field_offset(4, CHAINCODE_OFF), 0xff);
    delete_record(&first, 6);
    fs::copy(&first, &second).unwrap();

    let logs: Vec<String> = [&first, &second]
        .into_iter()
        .map(|path| {
            let output =
                recover_wallet(recovery_options(path, RecoveryMode::Check), &NullSink).unwrap();
            match output {
                RecoveryOutput::Recovered { log_path, .. } => {
                    fs::read_to_string(log_path).unwrap()
                }
                other => panic!("unexpected output: {other:?}"),
            }
        })
        .collect();

    let tail = |log: &str| log.lines().skip(1).collect::<Vec<_>>().join("\n");
    assert_eq!(tail(&logs[0]), tail(&logs[1]));
    assert!(logs[0].lines().count() > 5);
}
