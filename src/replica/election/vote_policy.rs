use crate::replica::peers::ReplicaKey;

/// `can_grant_vote()` decides a vote request against the vote already recorded for this epoch.
///
/// - Pre-vote: the answer is `candidate_log_up_to_date`, full stop. A pre-vote is non-binding,
///   so a binding vote we already cast never blocks it.
/// - Binding vote, nothing recorded yet: grant iff the candidate's log is up to date. The caller
///   is responsible for persisting the new vote.
/// - Binding vote, already recorded: only the same replica gets it again, and log freshness is
///   not consulted.
///   - different numeric id: reject.
///   - recorded directory is UNKNOWN: grant to any directory under that id.
///   - recorded directory is concrete: grant only to that exact directory. Same id with another
///     directory is a different physical replica (e.g. restarted on a wiped volume).
pub(crate) fn can_grant_vote(
    voted_key: Option<&ReplicaKey>,
    candidate: &ReplicaKey,
    candidate_log_up_to_date: bool,
    is_pre_vote: bool,
) -> bool {
    if is_pre_vote {
        return candidate_log_up_to_date;
    }

    match voted_key {
        None => candidate_log_up_to_date,
        Some(voted) if voted.id != candidate.id => false,
        Some(voted) if voted.directory_id.is_unknown() => true,
        Some(voted) => voted.directory_id == candidate.directory_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::peers::DirectoryId;

    const VOTED_ID: u32 = 1;

    #[test]
    fn pre_vote_only_looks_at_log() {
        let dir = DirectoryId::random();
        let recorded_votes = vec![
            None,
            Some(ReplicaKey::without_directory(VOTED_ID)),
            Some(ReplicaKey::new(VOTED_ID, dir)),
        ];
        let candidates = vec![
            // exact match
            ReplicaKey::new(VOTED_ID, dir),
            // same id, different directory
            ReplicaKey::new(VOTED_ID, DirectoryId::random()),
            // same id, missing directory
            ReplicaKey::without_directory(VOTED_ID),
            // different id
            ReplicaKey::new(VOTED_ID + 1, dir),
            ReplicaKey::without_directory(VOTED_ID + 1),
        ];

        for recorded in recorded_votes.iter() {
            for candidate in candidates.iter() {
                for &log_up_to_date in &[true, false] {
                    assert_eq!(
                        can_grant_vote(recorded.as_ref(), candidate, log_up_to_date, true),
                        log_up_to_date,
                        "recorded={:?} candidate={:?}",
                        recorded,
                        candidate
                    );
                }
            }
        }
    }

    #[test]
    fn first_binding_vote_needs_up_to_date_log() {
        let candidate = ReplicaKey::new(3, DirectoryId::random());

        assert!(can_grant_vote(None, &candidate, true, false));
        assert!(!can_grant_vote(None, &candidate, false, false));
    }

    #[test]
    fn recorded_vote_without_directory() {
        let recorded = ReplicaKey::without_directory(VOTED_ID);

        for &log_up_to_date in &[true, false] {
            // Same id matches with or without a directory.
            assert!(can_grant_vote(
                Some(&recorded),
                &ReplicaKey::without_directory(VOTED_ID),
                log_up_to_date,
                false
            ));
            assert!(can_grant_vote(
                Some(&recorded),
                &ReplicaKey::new(VOTED_ID, DirectoryId::random()),
                log_up_to_date,
                false
            ));

            // Different id never matches.
            assert!(!can_grant_vote(
                Some(&recorded),
                &ReplicaKey::without_directory(VOTED_ID + 1),
                log_up_to_date,
                false
            ));
            assert!(!can_grant_vote(
                Some(&recorded),
                &ReplicaKey::new(VOTED_ID + 1, DirectoryId::random()),
                log_up_to_date,
                false
            ));
        }
    }

    #[test]
    fn recorded_vote_with_directory() {
        let dir = DirectoryId::random();
        let recorded = ReplicaKey::new(VOTED_ID, dir);

        for &log_up_to_date in &[true, false] {
            assert!(can_grant_vote(
                Some(&recorded),
                &ReplicaKey::new(VOTED_ID, dir),
                log_up_to_date,
                false
            ));
            assert!(!can_grant_vote(
                Some(&recorded),
                &ReplicaKey::new(VOTED_ID, DirectoryId::random()),
                log_up_to_date,
                false
            ));
            assert!(!can_grant_vote(
                Some(&recorded),
                &ReplicaKey::without_directory(VOTED_ID),
                log_up_to_date,
                false
            ));
            assert!(!can_grant_vote(
                Some(&recorded),
                &ReplicaKey::new(VOTED_ID + 1, dir),
                log_up_to_date,
                false
            ));
            assert!(!can_grant_vote(
                Some(&recorded),
                &ReplicaKey::without_directory(VOTED_ID + 1),
                log_up_to_date,
                false
            ));
        }
    }
}
