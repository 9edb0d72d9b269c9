use std::fmt::Display;

/// The URI of an app instance (e.g. `msgpack://127.0.0.1:8001/`).
///
/// Ordering is lexicographic byte comparison, which is exactly what
/// [`crate::remote::dedup::is_duplicate`] relies on for the duplicate-connection tiebreak.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct AppUri(String);

impl AppUri {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AppUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for AppUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for AppUri {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AppUri {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<AppUri> for String {
    fn from(value: AppUri) -> Self {
        value.0
    }
}
