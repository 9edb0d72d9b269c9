use crate::core::uri::AppUri;

/// The pure duplicate-connection tiebreak comparator (`spec.md` §4.3).
///
/// A simultaneous dial between `local` and `peer` produces two outbound channels, `local → peer`
/// and `peer → local`. Exactly one survives: the peer whose URI is lexicographically larger
/// keeps its outbound channel. This returns `true` when the `local → peer` channel is the one
/// that must be dropped, i.e. when `local.uri() <= peer.uri()`.
///
/// Equal URIs (`local == peer`) are treated as a duplicate, per the open question in `spec.md`
/// §9 ("treat as 'drop' by the `≤` rule").
pub fn is_duplicate(local: &AppUri, peer: &AppUri) -> bool {
    local <= peer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smaller_local_uri_is_the_duplicate() {
        assert!(is_duplicate(&AppUri::from("a"), &AppUri::from("b")));
    }

    #[test]
    fn larger_local_uri_keeps_its_channel() {
        assert!(!is_duplicate(&AppUri::from("c"), &AppUri::from("b")));
    }

    #[test]
    fn equal_uris_are_treated_as_duplicate() {
        assert!(is_duplicate(&AppUri::from("same"), &AppUri::from("same")));
    }

    #[test]
    fn antisymmetric_across_both_sides_of_a_dial() {
        let a = AppUri::from("app://a");
        let b = AppUri::from("app://b");
        // Exactly one side drops its outbound channel.
        assert!(is_duplicate(&a, &b));
        assert!(!is_duplicate(&b, &a));
    }
}
