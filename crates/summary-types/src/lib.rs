//! Validated primitive types shared by the summary service crates.
//!
//! Values of these types are checked once, at the boundary, so the pipeline never has to
//! re-validate user-supplied text or identifiers.

/// Errors that can occur when creating validated text types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,

    #[error("identifier exceeds maximum length of {max} characters")]
    TooLong { max: usize },

    #[error("identifier must not start with a digit")]
    LeadingDigit,

    #[error("identifier contains invalid character {0:?} (only ASCII letters, digits and '_' allowed)")]
    InvalidCharacter(char),
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A database or table name that is safe to quote into a SQL statement.
///
/// Identifiers are non-empty, at most [`Identifier::MAX_LEN`] characters, made only of ASCII
/// letters, digits and `_`, and never start with a digit. Surrounding whitespace is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    pub const MAX_LEN: usize = 128;

    /// Parses and validates an identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`TextError`] describing the first rule the input breaks.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(TextError::TooLong { max: Self::MAX_LEN });
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(TextError::InvalidCharacter(bad));
        }
        if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(TextError::LeadingDigit);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identifier wrapped in double quotes, ready for SQL.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Identifier {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for Identifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Identifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Identifier::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  patient-123 \n").expect("should accept padded text");
        assert_eq!(text.as_str(), "patient-123");
    }

    #[test]
    fn non_empty_text_rejects_whitespace() {
        let err = NonEmptyText::new(" \t ").expect_err("whitespace only should fail");
        assert_eq!(err, TextError::Empty);
    }

    #[test]
    fn identifier_accepts_table_names() {
        for name in ["observation", "condition_code", "Patient", "_staging"] {
            assert!(Identifier::parse(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn identifier_rejects_sql_fragments() {
        let err = Identifier::parse("patient; DROP TABLE patient").expect_err("should reject");
        assert_eq!(err, TextError::InvalidCharacter(';'));

        let err = Identifier::parse("obs\"ervation").expect_err("should reject quote");
        assert_eq!(err, TextError::InvalidCharacter('"'));
    }

    #[test]
    fn identifier_rejects_leading_digit_and_overlong_names() {
        assert_eq!(
            Identifier::parse("1table").expect_err("leading digit"),
            TextError::LeadingDigit
        );

        let long = "a".repeat(Identifier::MAX_LEN + 1);
        assert_eq!(
            Identifier::parse(long).expect_err("too long"),
            TextError::TooLong {
                max: Identifier::MAX_LEN
            }
        );
    }

    #[test]
    fn identifier_quotes_for_sql() {
        let id = Identifier::parse("observation").unwrap();
        assert_eq!(id.quoted(), "\"observation\"");
    }

    #[test]
    fn deserialize_validates_identifiers() {
        let ok: Identifier = serde_json::from_str("\"condition\"").expect("valid identifier");
        assert_eq!(ok.as_str(), "condition");

        let err = serde_json::from_str::<Identifier>("\"bad name\"").expect_err("space invalid");
        assert!(err.to_string().contains("invalid character"));
    }
}
