//! # Conversion Scenarios
//!
//! The snapshot walk end to end: full state parity, retry on snapshot
//! faults, stop/resume across restarts, and queue replay at cutover.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use primitive_types::U256;
    use shared_types::{BlockRef, SidecarError, StorageKey, StorageValue};
    use std::sync::Arc;
    use ubt_sidecar::{SidecarApi, SidecarConfig, StateUpdate};
    use ubt_trie::keccak256;

    fn populate(h: &Harness) {
        let code: Vec<u8> = (0u8..80).collect();
        h.chain
            .add_account([0x01; 20], U256::from(10u64), 1, None, &[]);
        h.chain.add_account(
            [0x02; 20],
            U256::from(20u64),
            2,
            Some(code),
            &[(slot(1), value(0xaa)), (slot(200), value(0xbb))],
        );
        h.chain
            .add_account([0x03; 20], U256::from(30u64), 3, None, &[]);
    }

    #[test]
    fn test_conversion_builds_full_state() {
        let h = Harness::new();
        populate(&h);
        let anchor = block(10);
        h.convert(anchor);

        let root = h.root();
        let code: Vec<u8> = (0u8..80).collect();

        let plain = h.sidecar.read_account(root, &[0x01; 20]).unwrap().unwrap();
        assert_eq!(plain.balance, U256::from(10u64));
        assert_eq!(plain.nonce, 1);
        assert_eq!(plain.code_size, 0);

        let contract = h.sidecar.read_account(root, &[0x02; 20]).unwrap().unwrap();
        assert_eq!(contract.code_hash, keccak256(&code));
        assert_eq!(contract.code_size, 80);

        // Header-stem slot and main-storage slot both survive.
        assert_eq!(
            h.sidecar.read_storage(root, &[0x02; 20], &slot(1)).unwrap(),
            value(0xaa)
        );
        assert_eq!(
            h.sidecar.read_storage(root, &[0x02; 20], &slot(200)).unwrap(),
            value(0xbb)
        );
        assert_eq!(
            h.sidecar.read_storage(root, &[0x03; 20], &slot(1)).unwrap(),
            [0u8; 32]
        );

        // The progress record is gone and the anchor has its mapping.
        assert_eq!(h.sidecar.conversion_progress().unwrap(), None);
        assert_eq!(h.sidecar.ubt_root(&anchor.hash).unwrap(), Some(root));
        h.sidecar.close();
    }

    #[test]
    fn test_conversion_retries_over_snapshot_faults() {
        let faulty = Harness::new();
        populate(&faulty);
        faulty.chain.schedule_account_fault(2);
        faulty.chain.schedule_account_fault(1);
        faulty.convert(block(10));

        let clean = Harness::new();
        populate(&clean);
        clean.convert(block(10));

        assert_eq!(faulty.root(), clean.root());
        faulty.sidecar.close();
        clean.sidecar.close();
    }

    #[test]
    fn test_conversion_resumes_over_storage_faults() {
        let faulty = Harness::new();
        let slots: Vec<(StorageKey, StorageValue)> =
            (1u8..=20).map(|i| (slot(i), value(i))).collect();
        faulty
            .chain
            .add_account([0x05; 20], U256::from(5u64), 1, None, &slots);
        faulty.chain.schedule_storage_fault(7);
        faulty.convert(block(3));

        let clean = Harness::new();
        clean
            .chain
            .add_account([0x05; 20], U256::from(5u64), 1, None, &slots);
        clean.convert(block(3));

        assert_eq!(faulty.root(), clean.root());
        for (key, expected) in &slots {
            assert_eq!(
                faulty.sidecar.read_storage(faulty.root(), &[0x05; 20], key).unwrap(),
                *expected
            );
        }
        faulty.sidecar.close();
        clean.sidecar.close();
    }

    #[test]
    fn test_stop_resume_matches_single_pass() {
        let h = Harness::new();
        for i in 1u8..=10 {
            h.chain
                .add_account([i; 20], U256::from(i as u64 * 100), i as u64, None, &[]);
        }
        let anchor = block(5);
        h.chain.set_head(anchor);

        // Stop after five accounts, mid-walk with a batch size of four.
        let sidecar = h.sidecar.clone();
        let stopper = Arc::new(StopAfterAccounts::new(h.chain.clone(), 5, move || {
            sidecar.stop_conversion()
        }));
        h.sidecar
            .convert_from_mpt(h.chain.state_root(), anchor.number, anchor.hash, stopper)
            .unwrap();
        h.wait_settled();
        assert!(!h.sidecar.ready());

        let progress = h.sidecar.conversion_progress().unwrap().unwrap();
        assert!(progress.accounts_done >= 4 && progress.accounts_done < 10);

        // Simulate a restart: a fresh sidecar over the same store resumes
        // from the persisted record.
        h.sidecar.close();
        let restarted = Harness::over(h.store.clone(), h.chain.clone(), SidecarConfig::for_testing());
        assert!(!restarted.sidecar.ready());
        restarted.convert(anchor);

        let reference = Harness::new();
        for i in 1u8..=10 {
            reference
                .chain
                .add_account([i; 20], U256::from(i as u64 * 100), i as u64, None, &[]);
        }
        reference.convert(anchor);

        assert_eq!(restarted.root(), reference.root());
        restarted.sidecar.close();
        reference.sidecar.close();
    }

    #[test]
    fn test_queue_replay_after_conversion() {
        let h = Harness::new();
        for i in 1u8..=6 {
            h.chain
                .add_account([i; 20], U256::from(i as u64), i as u64, None, &[]);
        }
        let anchor = block(0);
        h.chain.set_head(anchor);

        // Hold the conversion open so deltas queue up.
        let sidecar = h.sidecar.clone();
        let stopper = Arc::new(StopAfterAccounts::new(h.chain.clone(), 3, move || {
            sidecar.stop_conversion()
        }));
        h.sidecar
            .convert_from_mpt(h.chain.state_root(), anchor.number, anchor.hash, stopper)
            .unwrap();
        h.wait_settled();
        assert!(!h.sidecar.ready());

        let deltas = |n: u64, parent: BlockRef| {
            let mut update = StateUpdate {
                raw_storage_keys: true,
                ..Default::default()
            };
            let address = [0xd0 + n as u8; 20];
            update.set_account(address, Some(&slim(n, n * 1000)));
            (block(n), parent.hash, update)
        };

        let (b1, p1, u1) = deltas(1, anchor);
        let (b2, p2, u2) = deltas(2, b1);
        let (b3, p3, u3) = deltas(3, b2);
        for b in [b1, b2, b3] {
            h.chain.set_canonical(b.number, b.hash);
        }
        h.chain.set_head(b3);

        h.sidecar.enqueue_update(b1, p1, u1.clone()).unwrap();
        h.sidecar.enqueue_update(b2, p2, u2.clone()).unwrap();
        h.sidecar.enqueue_update(b3, p3, u3.clone()).unwrap();

        // A same-height fork that never became canonical.
        let fork = BlockRef::new(2, [0xfe; 32]);
        h.sidecar.enqueue_update(fork, b1.hash, u2.clone()).unwrap();

        // Resume; the drain applies exactly the canonical three.
        h.sidecar
            .convert_from_mpt(h.chain.state_root(), anchor.number, anchor.hash, h.chain.clone())
            .unwrap();
        h.wait_ready();

        let (root, head) = h.sidecar.current_info().unwrap();
        assert_eq!(head, b3);
        assert_eq!(h.sidecar.ubt_root(&b1.hash).unwrap().is_some(), true);
        assert_eq!(h.sidecar.ubt_root(&fork.hash).unwrap(), None);

        // Equivalent to converting fully first and applying directly.
        let reference = Harness::new();
        for i in 1u8..=6 {
            reference
                .chain
                .add_account([i; 20], U256::from(i as u64), i as u64, None, &[]);
        }
        reference.convert(anchor);
        reference.chain.set_head(b3);
        reference.sidecar.apply_state_update(b1, p1, u1).unwrap();
        reference.sidecar.apply_state_update(b2, p2, u2).unwrap();
        reference.sidecar.apply_state_update(b3, p3, u3).unwrap();
        assert_eq!(root, reference.root());

        h.sidecar.close();
        reference.sidecar.close();
    }

    #[test]
    fn test_queue_overflow_marks_stale() {
        let config = SidecarConfig {
            queue_limit: 2,
            ..SidecarConfig::for_testing()
        };
        let h = Harness::with_config(config);

        let u = StateUpdate::default;
        h.sidecar.enqueue_update(block(1), block(0).hash, u()).unwrap();
        h.sidecar.enqueue_update(block(2), block(1).hash, u()).unwrap();
        let err = h
            .sidecar
            .enqueue_update(block(3), block(2).hash, u())
            .unwrap_err();
        assert!(matches!(err, SidecarError::QueueOverflow { limit: 2 }));
        assert!(h.sidecar.stale());
    }

    #[test]
    fn test_fresh_conversion_clears_stale_and_queue() {
        let config = SidecarConfig {
            queue_limit: 1,
            ..SidecarConfig::for_testing()
        };
        let h = Harness::with_config(config);
        h.sidecar
            .enqueue_update(block(1), block(0).hash, StateUpdate::default())
            .unwrap();
        let _ = h
            .sidecar
            .enqueue_update(block(2), block(1).hash, StateUpdate::default());
        assert!(h.sidecar.stale());

        // A fresh conversion resets the queue and the stale flag.
        h.convert(block(0));
        assert!(h.sidecar.ready());
        assert!(!h.sidecar.stale());
        h.sidecar.close();
    }
}
