use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Identifier that partitions context state (e.g. `"request"`, `"tenant"`).
///
/// Cloning is a refcount bump, so names can be captured freely by providers
/// and stored as map keys.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextName(Arc<str>);

impl ContextName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ContextName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextName({:?})", &*self.0)
    }
}

impl Borrow<str> for ContextName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ContextName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContextName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ContextName {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&ContextName> for ContextName {
    fn from(value: &ContextName) -> Self {
        value.clone()
    }
}

impl PartialEq<str> for ContextName {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for ContextName {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashMap;

    #[test]
    fn test_lookup_by_str() {
        let mut map = AHashMap::new();
        map.insert(ContextName::from("request"), 1);

        assert_eq!(map.get("request"), Some(&1));
        assert_eq!(map.get("tenant"), None);
    }

    #[test]
    fn test_display_and_eq() {
        let name = ContextName::from(String::from("tenant"));
        assert_eq!(name.to_string(), "tenant");
        assert_eq!(name, "tenant");
        assert_eq!(format!("{:?}", name), "ContextName(\"tenant\")");
    }
}
