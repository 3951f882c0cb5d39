use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Debug, Display, Formatter};

/// A wrapper for sensitive data (target credentials, the hashing pepper)
/// that redacts it when formatted for logging or serialized into a view.
/// To access the inner value, use the `.expose()` method.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the sensitive value. Use only at the point the value actually
    /// leaves the process (connection options, digest input).
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Debug for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T> Display for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Serialize> Serialize for Sensitive<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("***")
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Sensitive<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Sensitive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_redacted() {
        let secret = Sensitive::new("p@ssw0rd");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn serializes_as_placeholder() {
        let secret = Sensitive::new("p@ssw0rd");
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"***\"");
    }

    #[test]
    fn deserializes_transparently() {
        let secret: Sensitive<String> = serde_json::from_str("\"p@ssw0rd\"").unwrap();
        assert_eq!(secret.expose(), "p@ssw0rd");
    }
}
