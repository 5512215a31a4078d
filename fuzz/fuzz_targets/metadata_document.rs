//! Fuzz target for signed metadata envelopes.
//!
//! Every document type must reject malformed input with an error, never a
//! panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use notary_trust::metadata::{RootDocument, SnapshotDocument, TargetsDocument, TimestampDocument};
use notary_trust::Role;

fuzz_target!(|data: &[u8]| {
    if let Ok(root) = RootDocument::from_slice(&Role::Root, data) {
        for role in [Role::Root, Role::Snapshot, Role::Timestamp, Role::Targets] {
            let _ = root.signed().role_keys(&role);
        }
    }

    if let Ok(targets) = TargetsDocument::from_slice(&Role::Targets, data) {
        for role in targets.signed().delegated_roles() {
            let _ = targets.signed().delegation_keys(role);
            let _ = role.covers("latest");
        }
        let _ = targets.signed().entry("latest");
    }

    if let Ok(snapshot) = SnapshotDocument::from_slice(&Role::Snapshot, data) {
        if let Some(meta) = snapshot.signed().meta_for(&Role::Targets) {
            let _ = meta.check(&Role::Targets, data, 1);
        }
    }

    let _ = TimestampDocument::from_slice(&Role::Timestamp, data);
});
