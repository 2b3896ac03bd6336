use super::{CanonicalUrl, PackageUrl};
use core::hash::{Hash, Hasher};

/// A value paired with the key that identifies it.
///
/// Equality and hashing look only at the key, so a `HashSet<Keyed<T>>` keeps the
/// first value inserted for each key.
#[derive(Debug, Clone)]
pub struct Keyed<T> {
    value: T,
    key: String,
}

impl<T> Keyed<T> {
    #[must_use]
    pub const fn new(value: T, key: String) -> Self {
        Self { value, key }
    }

    #[must_use]
    pub const fn value(&self) -> &T {
        &self.value
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T> PartialEq for Keyed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Keyed<T> {}

impl<T> Hash for Keyed<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl From<CanonicalUrl> for Keyed<CanonicalUrl> {
    fn from(url: CanonicalUrl) -> Self {
        let key = url.canonical_path();
        Self::new(url, key)
    }
}

impl From<PackageUrl> for Keyed<PackageUrl> {
    fn from(url: PackageUrl) -> Self {
        let key = url.normalized();
        Self::new(url, key)
    }
}
