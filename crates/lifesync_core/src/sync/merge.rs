//! Last-write-wins merge resolver.

use crate::model::entity::SyncedEntity;
use serde::{Deserialize, Serialize};

/// Which side supplied the merge winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeSource {
    Local,
    Remote,
    BothAbsent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub winner: Option<SyncedEntity>,
    pub source: MergeSource,
}

/// Picks the winning copy of one record.
///
/// A lone side wins unconditionally. With both present the strictly later
/// `updated_at` wins in full; an exact tie goes to the server copy.
pub fn resolve(local: Option<&SyncedEntity>, remote: Option<&SyncedEntity>) -> MergeOutcome {
    let (winner, source) = match (local, remote) {
        (None, None) => (None, MergeSource::BothAbsent),
        (Some(local), None) => (Some(local), MergeSource::Local),
        (None, Some(remote)) => (Some(remote), MergeSource::Remote),
        (Some(local), Some(remote)) if local.updated_at > remote.updated_at => {
            (Some(local), MergeSource::Local)
        }
        (Some(_), Some(remote)) => (Some(remote), MergeSource::Remote),
    };
    MergeOutcome {
        winner: winner.cloned(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve, MergeSource};
    use crate::model::entity::{EntityKind, OwnerKey, SyncedEntity};
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn entity(data: &str, updated_at: &str) -> SyncedEntity {
        let at: DateTime<Utc> = updated_at.parse().expect("timestamp should parse");
        SyncedEntity::with_id(
            "p1",
            EntityKind::Profile,
            OwnerKey::device("d1"),
            json!({ "name": data }),
            at,
        )
    }

    #[test]
    fn later_remote_wins_verbatim() {
        let local = entity("local", "2026-01-01T00:00:00Z");
        let mut remote = entity("remote", "2026-01-02T00:00:00Z");
        remote.version = 7;

        let outcome = resolve(Some(&local), Some(&remote));
        assert_eq!(outcome.source, MergeSource::Remote);
        assert_eq!(outcome.winner, Some(remote));
    }

    #[test]
    fn later_local_wins() {
        let local = entity("local", "2026-01-03T00:00:00Z");
        let remote = entity("remote", "2026-01-02T00:00:00Z");

        let outcome = resolve(Some(&local), Some(&remote));
        assert_eq!(outcome.source, MergeSource::Local);
        assert_eq!(outcome.winner, Some(local));
    }

    #[test]
    fn tie_goes_to_remote() {
        let local = entity("local", "2026-01-02T00:00:00Z");
        let remote = entity("remote", "2026-01-02T00:00:00Z");

        let outcome = resolve(Some(&local), Some(&remote));
        assert_eq!(outcome.source, MergeSource::Remote);
        assert_eq!(outcome.winner, Some(remote));
    }

    #[test]
    fn sub_second_difference_is_respected() {
        let local = entity("local", "2026-01-02T00:00:00.001Z");
        let remote = entity("remote", "2026-01-02T00:00:00Z");
        assert_eq!(resolve(Some(&local), Some(&remote)).source, MergeSource::Local);
    }

    #[test]
    fn lone_sides_win_unconditionally() {
        let only = entity("x", "2020-01-01T00:00:00Z");
        assert_eq!(resolve(Some(&only), None).source, MergeSource::Local);
        assert_eq!(resolve(None, Some(&only)).source, MergeSource::Remote);

        let neither = resolve(None, None);
        assert_eq!(neither.source, MergeSource::BothAbsent);
        assert!(neither.winner.is_none());
    }
}
