use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// The identity of the signed-in user.
///
/// Built from the claims of the bearer token, optionally overlaid with the
/// user object returned by the login call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    /// The user's identifier. Numeric ids are kept in their decimal form.
    #[serde(default, deserialize_with = "deserialize_text")]
    pub id: Option<String>,
    /// The user's email address.
    #[serde(default, deserialize_with = "deserialize_text")]
    pub email: Option<String>,
    /// The user's display name.
    #[serde(default, deserialize_with = "deserialize_text")]
    pub name: Option<String>,
    /// The user's role. Numeric role codes are kept in their decimal form.
    #[serde(default, deserialize_with = "deserialize_text")]
    pub role: Option<String>,
}

impl UserClaims {
    /// Whether at least one identifying field (id, email or name) is present.
    pub fn has_identity(&self) -> bool {
        [&self.id, &self.email, &self.name]
            .iter()
            .any(|field| present(field).is_some())
    }

    /// Overlays `self` on top of `fallback`: fields set here win, the rest
    /// come from `fallback`.
    pub fn overlay(self, fallback: UserClaims) -> UserClaims {
        UserClaims {
            id: pick(self.id, fallback.id),
            email: pick(self.email, fallback.email),
            name: pick(self.name, fallback.name),
            role: pick(self.role, fallback.role),
        }
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.trim().is_empty())
}

fn pick(preferred: Option<String>, fallback: Option<String>) -> Option<String> {
    if present(&preferred).is_some() {
        preferred
    } else {
        fallback.filter(|value| !value.trim().is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawText {
    Text(String),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Other(IgnoredAny),
}

/// Reads a claim that should be text.
///
/// Strings are kept, numbers are kept in their decimal form, anything else
/// (booleans, arrays, objects) reads as absent instead of failing the
/// surrounding object.
pub(crate) fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawText>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        RawText::Text(text) => Some(text),
        RawText::Signed(n) => Some(n.to_string()),
        RawText::Unsigned(n) => Some(n.to_string()),
        RawText::Float(n) => Some(n.to_string()),
        RawText::Other(_) => None,
    }))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrIgnored<T> {
    Parsed(T),
    Ignored(IgnoredAny),
}

/// Reads an optional field as `T`, or as absent when it has another shape.
pub(crate) fn deserialize_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let raw = Option::<OrIgnored<T>>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        OrIgnored::Parsed(value) => Some(value),
        OrIgnored::Ignored(_) => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: Option<&str>, email: Option<&str>, name: Option<&str>, role: Option<&str>) -> UserClaims {
        UserClaims {
            id: id.map(String::from),
            email: email.map(String::from),
            name: name.map(String::from),
            role: role.map(String::from),
        }
    }

    #[test]
    fn overlay_prefers_explicit_values() {
        let explicit = user(None, Some("ops@fleet.io"), None, Some("dispatcher"));
        let decoded = user(Some("7"), Some("old@fleet.io"), Some("Ada"), Some("admin"));

        let merged = explicit.overlay(decoded);

        assert_eq!(merged, user(Some("7"), Some("ops@fleet.io"), Some("Ada"), Some("dispatcher")));
    }

    #[test]
    fn blank_fields_do_not_shadow_fallback() {
        let explicit = user(None, Some("  "), None, None);
        let decoded = user(None, Some("a@b.com"), None, None);

        assert!(!explicit.has_identity());
        assert_eq!(explicit.overlay(decoded).email.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn role_alone_is_not_an_identity() {
        assert!(!user(None, None, None, Some("admin")).has_identity());
        assert!(user(None, None, Some("Ada"), None).has_identity());
    }

    #[test]
    fn numeric_ids_are_normalized() {
        let parsed: UserClaims = sonic_rs::from_str(r#"{"id": 42, "email": "a@b.com"}"#).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("42"));

        let parsed: UserClaims = sonic_rs::from_str(r#"{"id": "drv-9"}"#).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("drv-9"));

        let parsed: UserClaims = sonic_rs::from_str(r#"{"id": null}"#).unwrap();
        assert_eq!(parsed.id, None);
    }

    #[test]
    fn mistyped_fields_read_as_absent() {
        let parsed: UserClaims =
            sonic_rs::from_str(r#"{"id": 1, "email": "a@b.com", "role": 0, "name": {"first": "Ada"}}"#).unwrap();

        assert_eq!(parsed.id.as_deref(), Some("1"));
        assert_eq!(parsed.email.as_deref(), Some("a@b.com"));
        assert_eq!(parsed.role.as_deref(), Some("0"));
        assert_eq!(parsed.name, None);

        let parsed: UserClaims = sonic_rs::from_str(r#"{"email": true, "role": ["admin"]}"#).unwrap();
        assert_eq!(parsed, UserClaims::default());
    }
}
