//! Post-action redirect target resolution.
//!
//! Mutating endpoints answer with a redirect whose target is picked from the
//! request itself: an explicit override wins, then a `next` value in the POST
//! body, then one in the query string, then the Referer header, and finally
//! the current request path.

/// Resolve the navigation target for a finished action.
///
/// Empty strings count as absent. Never fails; the current path is the
/// unconditional fallback.
pub fn resolve_next(
    override_target: Option<&str>,
    form_next: Option<&str>,
    query_next: Option<&str>,
    referer: Option<&str>,
    current_path: &str,
) -> String {
    [override_target, form_next, query_next, referer]
        .into_iter()
        .flatten()
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(current_path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_value_wins() {
        let next = resolve_next(None, Some("/post"), Some("/query"), Some("/ref"), "/path");
        assert_eq!(next, "/post");
    }

    #[test]
    fn query_value_beats_referer() {
        let next = resolve_next(None, None, Some("/a"), Some("/b"), "/path");
        assert_eq!(next, "/a");
    }

    #[test]
    fn referer_beats_current_path() {
        let next = resolve_next(None, None, None, Some("/previous"), "/path");
        assert_eq!(next, "/previous");
    }

    #[test]
    fn falls_back_to_current_path() {
        assert_eq!(resolve_next(None, None, None, None, "/avatars/add"), "/avatars/add");
    }

    #[test]
    fn override_beats_everything() {
        let next = resolve_next(Some("/forced"), Some("/post"), Some("/query"), None, "/path");
        assert_eq!(next, "/forced");
    }

    #[test]
    fn empty_values_are_absent() {
        let next = resolve_next(None, Some(""), Some(""), Some("/ref"), "/path");
        assert_eq!(next, "/ref");
    }
}
