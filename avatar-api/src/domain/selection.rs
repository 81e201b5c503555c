//! Primary-avatar selection and the delete-time reassignment policy.
//!
//! Everything here operates on the user's avatars in natural order (ascending
//! id, which is insertion order). The store enforces the single-primary
//! invariant on writes, but the read side stays tolerant: with multiple
//! flagged rows the earliest one wins.

use std::collections::HashSet;

use super::models::{Avatar, AvatarId};

/// The current primary avatar plus the bounded list surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub primary: Option<Avatar>,
    pub avatars: Vec<Avatar>,
}

/// Pick the primary avatar and the first `max_count` avatars.
///
/// The primary is the first flagged avatar in natural order; no flagged row
/// means no primary. With `max_count == 1` the bounded list collapses to the
/// primary singleton. Otherwise the window is taken from the front of the
/// natural order and may exclude the primary.
pub fn select(avatars: &[Avatar], max_count: usize) -> Selection {
    let primary = avatars.iter().find(|avatar| avatar.primary).cloned();

    let avatars = if max_count == 1 {
        primary.clone().into_iter().collect()
    } else {
        avatars.iter().take(max_count).cloned().collect()
    };

    Selection { primary, avatars }
}

/// Decide which avatar (if any) to promote before a bulk delete.
///
/// Promotion happens only when the current primary is being deleted and at
/// least one avatar survives: the first survivor in natural order takes over.
/// Deleting everything leaves the user with no primary.
pub fn reassignment_target(
    primary: Option<&Avatar>,
    avatars: &[Avatar],
    doomed: &HashSet<AvatarId>,
) -> Option<AvatarId> {
    let primary = primary?;
    if !doomed.contains(&primary.id) {
        return None;
    }

    avatars
        .iter()
        .find(|avatar| !doomed.contains(&avatar.id))
        .map(|avatar| avatar.id)
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::domain::models::UserId;

    fn avatar(id: i32, primary: bool) -> Avatar {
        Avatar {
            id: AvatarId::new(id),
            user_id: UserId::new(1),
            mime_type: "image/webp".to_string(),
            width: 512,
            height: 512,
            primary,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn flagged_avatar_is_primary() {
        let avatars = vec![avatar(1, false), avatar(2, true), avatar(3, false)];
        let selection = select(&avatars, 5);
        assert_eq!(selection.primary.as_ref().map(|a| a.id), Some(AvatarId::new(2)));
        assert_eq!(selection.avatars.len(), 3);
    }

    #[test]
    fn no_flag_means_no_primary() {
        let avatars = vec![avatar(1, false), avatar(2, false)];
        let selection = select(&avatars, 5);
        assert!(selection.primary.is_none());
    }

    #[test]
    fn multiple_flags_resolve_to_earliest() {
        let avatars = vec![avatar(1, false), avatar(2, true), avatar(3, true)];
        let selection = select(&avatars, 5);
        assert_eq!(selection.primary.as_ref().map(|a| a.id), Some(AvatarId::new(2)));
    }

    #[test]
    fn max_count_one_collapses_to_primary_singleton() {
        let avatars = vec![avatar(1, false), avatar(2, true)];
        let selection = select(&avatars, 1);
        assert_eq!(selection.avatars.len(), 1);
        assert_eq!(selection.avatars[0].id, AvatarId::new(2));
    }

    #[test]
    fn max_count_one_without_primary_is_empty() {
        let avatars = vec![avatar(1, false)];
        let selection = select(&avatars, 1);
        assert!(selection.primary.is_none());
        assert!(selection.avatars.is_empty());
    }

    #[test]
    fn bounded_list_is_a_front_window() {
        // The primary can fall outside the window; inherited limitation.
        let avatars = vec![avatar(1, false), avatar(2, false), avatar(3, true)];
        let selection = select(&avatars, 2);
        assert_eq!(selection.primary.as_ref().map(|a| a.id), Some(AvatarId::new(3)));
        let window: Vec<_> = selection.avatars.iter().map(|a| a.id).collect();
        assert_eq!(window, vec![AvatarId::new(1), AvatarId::new(2)]);
    }

    #[test]
    fn deleting_primary_promotes_first_survivor() {
        let avatars = vec![avatar(1, false), avatar(2, true), avatar(3, false)];
        let doomed = HashSet::from([AvatarId::new(2)]);
        let target = reassignment_target(Some(&avatars[1]), &avatars, &doomed);
        assert_eq!(target, Some(AvatarId::new(1)));
    }

    #[test]
    fn survivors_are_scanned_in_natural_order() {
        let avatars = vec![avatar(1, true), avatar(2, false), avatar(3, false)];
        let doomed = HashSet::from([AvatarId::new(1), AvatarId::new(2)]);
        let target = reassignment_target(Some(&avatars[0]), &avatars, &doomed);
        assert_eq!(target, Some(AvatarId::new(3)));
    }

    #[test]
    fn deleting_everything_promotes_nothing() {
        let avatars = vec![avatar(1, true), avatar(2, false)];
        let doomed = HashSet::from([AvatarId::new(1), AvatarId::new(2)]);
        assert_eq!(reassignment_target(Some(&avatars[0]), &avatars, &doomed), None);
    }

    #[test]
    fn surviving_primary_is_left_alone() {
        let avatars = vec![avatar(1, true), avatar(2, false)];
        let doomed = HashSet::from([AvatarId::new(2)]);
        assert_eq!(reassignment_target(Some(&avatars[0]), &avatars, &doomed), None);
    }

    #[test]
    fn no_primary_means_no_promotion() {
        let avatars = vec![avatar(1, false), avatar(2, false)];
        let doomed = HashSet::from([AvatarId::new(1)]);
        assert_eq!(reassignment_target(None, &avatars, &doomed), None);
    }
}
