use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Customer data that must not leak through log macros.
///
/// `Debug` and `Display` mask the value; serialization keeps it, since API
/// responses need the real thing.
#[derive(Clone, Deserialize)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Keeps the first character and the domain: `a****@example.com`.
pub struct MaskedEmail<'a>(pub &'a str);

impl fmt::Display for MaskedEmail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.split_once('@') {
            Some((local, domain)) => match local.chars().next() {
                Some(first) => write!(f, "{}****@{}", first, domain),
                None => write!(f, "****@{}", domain),
            },
            None => write!(f, "********"),
        }
    }
}

impl fmt::Debug for MaskedEmail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_hides_value_in_logs_but_serializes() {
        let phone = Masked("+351 912 345 678".to_string());
        assert_eq!(format!("{:?}", phone), "********");
        assert_eq!(format!("{}", phone), "********");
        assert_eq!(serde_json::to_string(&phone).unwrap(), "\"+351 912 345 678\"");
    }

    #[test]
    fn test_masked_email_keeps_domain() {
        assert_eq!(MaskedEmail("ana@example.com").to_string(), "a****@example.com");
        assert_eq!(MaskedEmail("not-an-email").to_string(), "********");
    }
}
