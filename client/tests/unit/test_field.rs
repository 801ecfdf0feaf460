//! Tracked field unit tests

use chrono::Utc;
use homeglow::models::snapshot::FieldPhase;
use homeglow::sync::field::{MutationId, Observation, TrackedField};

const THRESHOLD: u32 = 3;

fn confirmed(value: u32) -> TrackedField<u32> {
    TrackedField::with_confirmed(value, Utc::now())
}

#[test]
fn test_poll_without_pending_replaces_confirmed() {
    let mut field = confirmed(1);
    assert_eq!(field.observe(Some(2), Utc::now(), 1, THRESHOLD), Observation::Updated);
    assert_eq!(field.observe(Some(2), Utc::now(), 2, THRESHOLD), Observation::Unchanged);
    assert_eq!(field.displayed(), Some(&2));
    assert_eq!(field.phase(), FieldPhase::Confirmed);
}

#[test]
fn test_missing_value_means_not_configured() {
    let mut field = confirmed(1);
    field.observe(None, Utc::now(), 1, THRESHOLD);
    assert_eq!(field.displayed(), None);
}

#[test]
fn test_agreeing_poll_confirms_edit() {
    let mut field = confirmed(1);
    field.propose(2, MutationId(5)).unwrap();
    assert!(field.acknowledge(MutationId(5), 6));

    assert_eq!(field.observe(Some(2), Utc::now(), 7, THRESHOLD), Observation::Confirmed);
    assert!(!field.is_pending());
    assert_eq!(field.confirmed(), Some(&2));
}

#[test]
fn test_poll_started_before_edit_cannot_judge_it() {
    let mut field = confirmed(1);
    field.propose(2, MutationId(5)).unwrap();

    assert_eq!(field.observe(Some(1), Utc::now(), 4, THRESHOLD), Observation::Skipped);
    assert_eq!(field.phase(), FieldPhase::Pending);
    assert_eq!(field.displayed(), Some(&2));
}

#[test]
fn test_disagreement_goes_stale_then_force_clears() {
    let mut field = confirmed(1);
    field.propose(2, MutationId(5)).unwrap();
    field.acknowledge(MutationId(5), 6);

    assert_eq!(
        field.observe(Some(1), Utc::now(), 7, THRESHOLD),
        Observation::Disagreed { count: 1 }
    );
    assert_eq!(field.phase(), FieldPhase::StalePending);
    assert_eq!(field.displayed(), Some(&2));

    assert_eq!(
        field.observe(Some(1), Utc::now(), 8, THRESHOLD),
        Observation::Disagreed { count: 2 }
    );
    assert_eq!(field.observe(Some(1), Utc::now(), 9, THRESHOLD), Observation::ForceCleared);
    assert_eq!(field.phase(), FieldPhase::Confirmed);
    assert_eq!(field.displayed(), Some(&1));
}

#[test]
fn test_stale_edit_can_still_be_confirmed() {
    let mut field = confirmed(1);
    field.propose(2, MutationId(5)).unwrap();
    field.acknowledge(MutationId(5), 6);
    field.observe(Some(1), Utc::now(), 7, THRESHOLD);

    assert_eq!(field.observe(Some(2), Utc::now(), 8, THRESHOLD), Observation::Confirmed);
    assert_eq!(field.displayed(), Some(&2));
    assert!(!field.is_pending());
}

#[test]
fn test_edit_survives_disagreement_until_write_is_acknowledged() {
    let mut field = confirmed(1);
    field.propose(2, MutationId(5)).unwrap();

    for started in 6..9 {
        assert_eq!(field.observe(Some(1), Utc::now(), started, THRESHOLD), Observation::Skipped);
    }
    assert_eq!(field.phase(), FieldPhase::Pending);
    assert_eq!(field.displayed(), Some(&2));
    assert_eq!(field.confirmed(), Some(&1));

    assert!(field.acknowledge(MutationId(5), 10));
    assert_eq!(field.pending().and_then(|e| e.acknowledged_at), Some(10));
    assert_eq!(field.displayed(), Some(&2));

    // started before the acknowledgement, so it still cannot dispute the edit
    assert_eq!(field.observe(Some(1), Utc::now(), 9, THRESHOLD), Observation::Skipped);
    assert_eq!(
        field.observe(Some(1), Utc::now(), 11, THRESHOLD),
        Observation::Disagreed { count: 1 }
    );
}

#[test]
fn test_agreeing_poll_confirms_before_acknowledgement() {
    let mut field = confirmed(1);
    field.propose(2, MutationId(5)).unwrap();

    assert_eq!(field.observe(Some(2), Utc::now(), 6, THRESHOLD), Observation::Confirmed);
    assert!(!field.acknowledge(MutationId(5), 7));
    assert_eq!(field.displayed(), Some(&2));
}

#[test]
fn test_missing_value_keeps_pending_edit() {
    let mut field = confirmed(1);
    field.propose(2, MutationId(5)).unwrap();

    assert_eq!(field.observe(None, Utc::now(), 6, THRESHOLD), Observation::Skipped);
    assert_eq!(field.displayed(), Some(&2));
    assert_eq!(field.confirmed(), Some(&1));
}

#[test]
fn test_reject_reverts_only_matching_edit() {
    let mut field = confirmed(1);
    field.propose(2, MutationId(5)).unwrap();

    assert!(!field.reject(MutationId(4)));
    assert_eq!(field.displayed(), Some(&2));

    assert!(field.reject(MutationId(5)));
    assert_eq!(field.displayed(), Some(&1));
    assert!(!field.reject(MutationId(5)));
}

#[test]
fn test_view_reflects_both_values() {
    let mut field = confirmed(1);
    field.propose(2, MutationId(5)).unwrap();

    let view = field.view();
    assert_eq!(view.value, Some(2));
    assert_eq!(view.confirmed, Some(1));
    assert_eq!(view.pending, Some(2));
    assert!(view.is_pending());
}
