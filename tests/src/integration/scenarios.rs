//! # Per-Block Pipeline Scenarios
//!
//! The update pipeline end to end: account writes, deletions, raw-keyed
//! storage, ordering determinism, and read gating.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use primitive_types::U256;
    use shared_types::{SidecarError, EMPTY_CODE_HASH, EMPTY_UBT_ROOT, ZERO_HASH};
    use ubt_sidecar::{SidecarApi, StateUpdate};

    #[test]
    fn test_basic_account_update() {
        let h = Harness::new();
        let anchor = block(0);
        h.convert(anchor);
        assert_eq!(h.root(), EMPTY_UBT_ROOT);

        let address = [0xaa; 20];
        let mut update = StateUpdate {
            raw_storage_keys: true,
            ..Default::default()
        };
        update.set_account(address, Some(&slim(5, 1000)));

        let b1 = block(1);
        h.chain.set_head(b1);
        h.sidecar.apply_state_update(b1, anchor.hash, update).unwrap();

        let root = h.root();
        assert_ne!(root, EMPTY_UBT_ROOT);

        let account = h.sidecar.read_account(root, &address).unwrap().unwrap();
        assert_eq!(account.nonce, 5);
        assert_eq!(account.balance, U256::from(1000u64));
        assert_eq!(account.code_hash, EMPTY_CODE_HASH);
        assert_eq!(account.code_size, 0);

        assert_eq!(h.sidecar.ubt_root(&b1.hash).unwrap(), Some(root));
        h.sidecar.close();
    }

    #[test]
    fn test_account_deletion_removes_account_and_storage() {
        let h = Harness::new();
        let anchor = block(0);
        h.convert(anchor);

        let address = [0xaa; 20];
        let b1 = block(1);
        let mut seed = StateUpdate {
            raw_storage_keys: true,
            ..Default::default()
        };
        seed.set_account(address, Some(&slim(1, 500)));
        seed.set_storage(address, slot(1), Some(&value(0xee)));
        h.chain.set_head(b1);
        h.sidecar.apply_state_update(b1, anchor.hash, seed).unwrap();

        let seeded_root = h.root();
        assert_eq!(
            h.sidecar.read_storage(seeded_root, &address, &slot(1)).unwrap(),
            value(0xee)
        );

        let b2 = block(2);
        let mut wipe = StateUpdate {
            raw_storage_keys: true,
            ..Default::default()
        };
        wipe.set_account(address, None);
        wipe.set_storage(address, slot(1), None);
        h.chain.set_head(b2);
        h.sidecar.apply_state_update(b2, b1.hash, wipe).unwrap();

        let root = h.root();
        assert_eq!(h.sidecar.read_account(root, &address).unwrap(), None);
        assert_eq!(
            h.sidecar.read_storage(root, &address, &slot(1)).unwrap(),
            [0u8; 32]
        );
        // The deleted account was the only state, so the trie is empty.
        assert_eq!(root, EMPTY_UBT_ROOT);
        h.sidecar.close();
    }

    #[test]
    fn test_storage_update_with_raw_key() {
        let h = Harness::new();
        let anchor = block(0);
        h.convert(anchor);

        let address = [0xcc; 20];
        let mut raw_key = [0u8; 32];
        raw_key[0] = 0x01;
        raw_key[1] = 0x23;

        let mut update = StateUpdate {
            raw_storage_keys: true,
            ..Default::default()
        };
        update.set_account(address, Some(&slim(1, 1)));
        update.set_storage(address, raw_key, Some(&value(0xff)));

        let b1 = block(1);
        h.chain.set_head(b1);
        h.sidecar.apply_state_update(b1, anchor.hash, update).unwrap();

        let root = h.root();
        let mut expected = [0u8; 32];
        expected[31] = 0xff;
        assert_eq!(
            h.sidecar.read_storage(root, &address, &raw_key).unwrap(),
            expected
        );
        h.sidecar.close();
    }

    #[test]
    fn test_ordering_determinism_across_insertion_order() {
        let build = |order: &[u8]| {
            let mut update = StateUpdate {
                raw_storage_keys: true,
                ..Default::default()
            };
            for &byte in order {
                let address = [byte; 20];
                update.set_account(address, Some(&slim(byte as u64, byte as u64 * 7)));
                update.set_storage(address, slot(byte), Some(&value(byte)));
            }
            update
        };

        let run = |update: StateUpdate| {
            let h = Harness::new();
            let anchor = block(0);
            h.convert(anchor);
            let b1 = block(1);
            h.chain.set_head(b1);
            h.sidecar.apply_state_update(b1, anchor.hash, update).unwrap();
            let root = h.root();
            h.sidecar.close();
            root
        };

        let forward = run(build(&[0x11, 0x22, 0x33, 0x44]));
        let shuffled = run(build(&[0x33, 0x11, 0x44, 0x22]));
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_reads_rejected_before_conversion() {
        let h = Harness::new();
        let err = h.sidecar.read_account(ZERO_HASH, &[0u8; 20]).unwrap_err();
        assert!(matches!(err, SidecarError::NotReady));

        let err = h
            .sidecar
            .apply_state_update(block(1), ZERO_HASH, StateUpdate::default())
            .unwrap_err();
        assert!(matches!(err, SidecarError::NotReady));
        assert!(!h.sidecar.ready());
        assert!(h.sidecar.enabled());
    }

    #[test]
    fn test_flat_reads_agree_with_trie_walk() {
        let h = Harness::new();
        let code: Vec<u8> = (0u8..70).collect();
        h.chain
            .add_account([0x01; 20], U256::from(11u64), 1, None, &[]);
        h.chain.add_account(
            [0x02; 20],
            U256::from(22u64),
            2,
            Some(code),
            &[(slot(3), value(0x33)), (slot(99), value(0x99))],
        );
        h.convert(block(0));

        let root = h.root();
        let mut trie = h.sidecar.open_trie(root).unwrap();
        for address in [[0x01; 20], [0x02; 20]] {
            assert_eq!(
                h.sidecar.read_account(root, &address).unwrap(),
                trie.get_account(&address).unwrap()
            );
        }
        for key in [slot(3), slot(99), slot(7)] {
            let flat = h.sidecar.read_storage(root, &[0x02; 20], &key).unwrap();
            let walked = trie
                .get_storage(&[0x02; 20], &key)
                .unwrap()
                .unwrap_or([0u8; 32]);
            assert_eq!(flat, walked);
        }
        h.sidecar.close();
    }

    #[test]
    fn test_code_deployment_via_delta() {
        let h = Harness::new();
        let anchor = block(0);
        h.convert(anchor);

        let address = [0xde; 20];
        let code = vec![0x60, 0x80, 0x60, 0x40, 0x52]; // PUSH1 80 PUSH1 40 MSTORE
        let mut update = StateUpdate {
            raw_storage_keys: true,
            ..Default::default()
        };
        update.set_account(address, Some(&slim_contract(1, 0, &code, false)));
        update.set_code(address, code.clone());

        let b1 = block(1);
        h.chain.set_head(b1);
        h.sidecar.apply_state_update(b1, anchor.hash, update).unwrap();

        let root = h.root();
        let account = h.sidecar.read_account(root, &address).unwrap().unwrap();
        assert_eq!(account.code_hash, ubt_trie::keccak256(&code));
        assert_eq!(account.code_size, code.len() as u32);

        // The first chunk leaf carries the bytecode left-aligned after
        // the pushdata marker.
        let mut trie = h.sidecar.open_trie(root).unwrap();
        let chunk = trie
            .get(&ubt_trie::code_chunk_key(&address, 0))
            .unwrap()
            .unwrap();
        assert_eq!(chunk[0], 0);
        assert_eq!(&chunk[1..1 + code.len()], &code[..]);
        h.sidecar.close();
    }

    #[test]
    fn test_witness_extraction_through_service() {
        let h = Harness::new();
        let anchor = block(0);
        h.convert(anchor);

        let address = [0xab; 20];
        let mut update = StateUpdate {
            raw_storage_keys: true,
            ..Default::default()
        };
        update.set_account(address, Some(&slim(7, 700)));
        let b1 = block(1);
        h.chain.set_head(b1);
        h.sidecar.apply_state_update(b1, anchor.hash, update).unwrap();

        let root = h.root();
        let key = ubt_trie::basic_data_key(&address);
        let mut trie = h.sidecar.open_trie(root).unwrap();
        let leaf = trie.get(&key).unwrap().unwrap();
        let proof = trie.prove(&key).unwrap();

        // The witness verifies with nothing but the root.
        assert!(ubt_trie::verify_leaf_proof(&root, &key, Some(&leaf), &proof));
        assert!(!ubt_trie::verify_leaf_proof(&root, &key, None, &proof));
        h.sidecar.close();
    }

    #[test]
    fn test_empty_delta_keeps_root() {
        let h = Harness::new();
        let anchor = block(0);
        h.convert(anchor);

        let b1 = block(1);
        h.chain.set_head(b1);
        h.sidecar
            .apply_state_update(b1, anchor.hash, StateUpdate::default())
            .unwrap();

        assert_eq!(h.root(), EMPTY_UBT_ROOT);
        // The block still gets its root mapping.
        assert_eq!(h.sidecar.ubt_root(&b1.hash).unwrap(), Some(EMPTY_UBT_ROOT));
        h.sidecar.close();
    }
}
