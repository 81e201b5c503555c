//! Routing shim for the combined change/crop/delete form.

use super::models::AvatarId;

/// The route a combined-form submission should be forwarded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTarget {
    Change,
    Crop(AvatarId),
    Delete,
}

/// Map the mutually exclusive action flags to a target route.
///
/// `crop` carries the selected avatar id along; a `crop` flag without a
/// selection falls back to the change route, as does anything unmatched.
/// No validation happens here; the target route does its own.
pub fn dispatch(change: bool, crop: bool, delete: bool, choice: Option<AvatarId>) -> DispatchTarget {
    if change {
        DispatchTarget::Change
    } else if crop {
        match choice {
            Some(id) => DispatchTarget::Crop(id),
            None => DispatchTarget::Change,
        }
    } else if delete {
        DispatchTarget::Delete
    } else {
        DispatchTarget::Change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_flag_wins_first() {
        let target = dispatch(true, true, true, Some(AvatarId::new(5)));
        assert_eq!(target, DispatchTarget::Change);
    }

    #[test]
    fn crop_carries_the_choice() {
        let target = dispatch(false, true, false, Some(AvatarId::new(7)));
        assert_eq!(target, DispatchTarget::Crop(AvatarId::new(7)));
    }

    #[test]
    fn crop_without_choice_defaults_to_change() {
        assert_eq!(dispatch(false, true, false, None), DispatchTarget::Change);
    }

    #[test]
    fn delete_flag_routes_to_delete() {
        assert_eq!(dispatch(false, false, true, None), DispatchTarget::Delete);
    }

    #[test]
    fn nothing_matched_defaults_to_change() {
        assert_eq!(dispatch(false, false, false, None), DispatchTarget::Change);
    }
}
