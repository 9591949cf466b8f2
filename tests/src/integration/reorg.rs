//! # Reorg Recovery and Restart Behavior
//!
//! Rewinding to recoverable roots, staleness beyond the retention
//! window, and restart from the committed root record.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use shared_types::{BlockRef, SidecarError};
    use ubt_sidecar::{SidecarApi, SidecarConfig, StateUpdate};

    /// Apply blocks 1..=n, each bumping one account, returning the roots.
    fn advance(h: &Harness, anchor: BlockRef, n: u64) -> Vec<shared_types::Hash> {
        let address = [0xaa; 20];
        let mut parent = anchor.hash;
        let mut roots = Vec::new();
        for number in 1..=n {
            let b = block(number);
            let mut update = StateUpdate {
                raw_storage_keys: true,
                ..Default::default()
            };
            update.set_account(address, Some(&slim(number, number * 100)));
            update.set_storage(address, slot(number as u8), Some(&value(number as u8)));
            h.chain.set_head(b);
            h.sidecar.apply_state_update(b, parent, update).unwrap();
            roots.push(h.root());
            parent = b.hash;
        }
        roots
    }

    #[test]
    fn test_reorg_recovers_within_window() {
        let h = Harness::new();
        let anchor = block(0);
        h.convert(anchor);
        let roots = advance(&h, anchor, 5);

        h.sidecar.handle_reorg(block(3).hash, 3).unwrap();

        let (root, head) = h.sidecar.current_info().unwrap();
        assert_eq!(root, roots[2]);
        assert_eq!(head.number, 3);
        assert!(!h.sidecar.stale());

        // The rewound state serves reads and accepts a replacement block.
        let account = h.sidecar.read_account(root, &[0xaa; 20]).unwrap().unwrap();
        assert_eq!(account.nonce, 3);

        let replacement = BlockRef::new(4, [0xd4; 32]);
        let mut update = StateUpdate {
            raw_storage_keys: true,
            ..Default::default()
        };
        update.set_account([0xaa; 20], Some(&slim(4, 444)));
        h.chain.set_head(replacement);
        h.sidecar
            .apply_state_update(replacement, block(3).hash, update)
            .unwrap();
        assert_eq!(h.sidecar.current_info().unwrap().1, replacement);
        h.sidecar.close();
    }

    #[test]
    fn test_reorg_beyond_window_marks_stale() {
        // Committing every block flushes the layers, so an old root is
        // no longer recoverable.
        let config = SidecarConfig {
            commit_interval: Some(1),
            ..SidecarConfig::for_testing()
        };
        let h = Harness::with_config(config);
        let anchor = block(0);
        h.convert(anchor);
        advance(&h, anchor, 5);

        let err = h.sidecar.handle_reorg(block(3).hash, 3).unwrap_err();
        assert!(matches!(err, SidecarError::NotRecoverable { .. }));
        assert!(h.sidecar.stale());
    }

    #[test]
    fn test_reorg_without_mapping_marks_stale() {
        let h = Harness::new();
        let anchor = block(0);
        h.convert(anchor);
        advance(&h, anchor, 2);

        let err = h.sidecar.handle_reorg([0x99; 32], 1).unwrap_err();
        assert!(matches!(err, SidecarError::NotRecoverable { .. }));
        assert!(h.sidecar.stale());
    }

    #[test]
    fn test_parent_gap_marks_stale() {
        let h = Harness::new();
        let anchor = block(0);
        h.convert(anchor);

        let err = h
            .sidecar
            .apply_state_update(block(1), [0x99; 32], StateUpdate::default())
            .unwrap_err();
        assert!(matches!(err, SidecarError::QueueGap { .. }));
        assert!(h.sidecar.stale());

        // Further writes are rejected until a fresh conversion.
        let err = h
            .sidecar
            .apply_state_update(block(1), anchor.hash, StateUpdate::default())
            .unwrap_err();
        assert!(matches!(err, SidecarError::Stale(_)));
    }

    #[test]
    fn test_restart_recovers_committed_root() {
        let config = SidecarConfig {
            commit_interval: Some(1),
            ..SidecarConfig::for_testing()
        };
        let h = Harness::with_config(config.clone());
        let anchor = block(0);
        h.convert(anchor);
        let roots = advance(&h, anchor, 3);
        h.sidecar.close();

        let restarted = Harness::over(h.store.clone(), h.chain.clone(), config);
        assert!(restarted.sidecar.ready());
        let (root, head) = restarted.sidecar.current_info().unwrap();
        assert_eq!(root, roots[2]);
        assert_eq!(head, block(3));

        let account = restarted.sidecar.read_account(root, &[0xaa; 20]).unwrap().unwrap();
        assert_eq!(account.nonce, 3);
        restarted.sidecar.close();
    }

    #[test]
    fn test_restart_without_interval_rewinds_to_flush_on_close() {
        // With no commit interval the close-time flush persists the head.
        let h = Harness::new();
        let anchor = block(0);
        h.convert(anchor);
        let roots = advance(&h, anchor, 2);
        h.sidecar.close();

        let restarted = Harness::over(h.store.clone(), h.chain.clone(), SidecarConfig::for_testing());
        assert!(restarted.sidecar.ready());
        assert_eq!(restarted.sidecar.current_root(), Some(roots[1]));
        restarted.sidecar.close();
    }
}
