//! Small helpers shared across modules.

/// Escape text for inclusion in HTML or XML character data and attributes.
pub fn escape_markup(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Deserializers for JSON sent by browsers and REST stores, where the same
/// field may arrive as a string, a number, or not at all.
pub mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Strings and scalars become text; null, missing and blank become `None`.
    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            Some(other) => Some(other.to_string()),
        })
    }

    /// Like [`opt_string`] but the value must be present.
    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        opt_string(deserializer)?.ok_or_else(|| D::Error::custom("expected a string or number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Row {
        #[serde(deserialize_with = "lenient::string")]
        id: String,
        #[serde(default, deserialize_with = "lenient::opt_string")]
        score: Option<String>,
    }

    #[test]
    fn test_escape_markup() {
        assert_eq!(escape_markup("<b>"), "&lt;b&gt;");
        assert_eq!(escape_markup("Tom & Jerry"), "Tom &amp; Jerry");
        assert_eq!(escape_markup("\"q\" 'a'"), "&quot;q&quot; &#39;a&#39;");
    }

    #[test]
    fn test_lenient_numbers_and_blanks() {
        let row: Row = serde_json::from_str(r#"{"id": 42, "score": 7}"#).unwrap();
        assert_eq!(row.id, "42");
        assert_eq!(row.score.as_deref(), Some("7"));

        let row: Row = serde_json::from_str(r#"{"id": "abc", "score": "  "}"#).unwrap();
        assert_eq!(row.id, "abc");
        assert_eq!(row.score, None);

        let row: Row = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        assert_eq!(row.score, None);

        assert!(serde_json::from_str::<Row>(r#"{"id": null}"#).is_err());
    }
}
