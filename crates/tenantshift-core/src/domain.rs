//! Rewriting of source-foundation domains into target-foundation domains.
//!
//! Mappings are ordered; the first mapping whose old domain occurs in a value
//! is the only one applied to it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::CredentialMap;

/// One `old -> new` domain pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainMapping {
    /// Domain suffix used on the source foundation
    pub old: String,
    /// Replacement used on the target foundation
    pub new: String,
}

impl DomainMapping {
    /// Convenience constructor.
    pub fn new(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Replaces the first matching old domain in `value`. Unmatched input is returned unchanged.
pub fn replace_domain(value: &str, domains: &[DomainMapping]) -> String {
    domains
        .iter()
        .filter(|d| !d.old.is_empty())
        .find(|d| value.contains(d.old.as_str()))
        .map(|d| value.replace(d.old.as_str(), d.new.as_str()))
        .unwrap_or_else(|| value.to_string())
}

/// Applies [`replace_domain`] to every string value in a credential map, recursively.
pub fn replace_domains_in_map(map: &mut CredentialMap, domains: &[DomainMapping]) {
    if domains.is_empty() {
        return;
    }
    for value in map.values_mut() {
        replace_in_value(value, domains);
    }
}

fn replace_in_value(value: &mut Value, domains: &[DomainMapping]) {
    match value {
        Value::String(s) => *s = replace_domain(s, domains),
        Value::Array(items) => items.iter_mut().for_each(|v| replace_in_value(v, domains)),
        Value::Object(map) => map.values_mut().for_each(|v| replace_in_value(v, domains)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mappings() -> Vec<DomainMapping> {
        vec![DomainMapping::new("cf1.example.com", "cf2.example.com")]
    }

    #[test]
    fn rewrites_matching_domain() {
        assert_eq!(
            replace_domain("https://x.cf1.example.com/path", &mappings()),
            "https://x.cf2.example.com/path"
        );
    }

    #[test]
    fn unmatched_input_is_unchanged() {
        assert_eq!(
            replace_domain("https://x.other.example.org/path", &mappings()),
            "https://x.other.example.org/path"
        );
        assert_eq!(replace_domain("", &mappings()), "");
    }

    #[test]
    fn first_matching_mapping_wins() {
        let domains = vec![
            DomainMapping::new("apps.cf1.example.com", "apps.cf2.example.com"),
            DomainMapping::new("cf1.example.com", "legacy.example.com"),
        ];
        assert_eq!(
            replace_domain("https://a.apps.cf1.example.com", &domains),
            "https://a.apps.cf2.example.com"
        );
        assert_eq!(
            replace_domain("https://sys.cf1.example.com", &domains),
            "https://sys.legacy.example.com"
        );
    }

    #[test]
    fn empty_old_domain_never_matches() {
        let domains = vec![DomainMapping::new("", "boom")];
        assert_eq!(replace_domain("abc", &domains), "abc");
    }

    #[test]
    fn rewrites_nested_credentials() {
        let mut creds = json!({
            "uri": "https://db.cf1.example.com:443",
            "port": 443,
            "hosts": ["a.cf1.example.com", "b.elsewhere.net"],
            "nested": { "dashboard": "https://dash.cf1.example.com" }
        })
        .as_object()
        .cloned()
        .unwrap();

        replace_domains_in_map(&mut creds, &mappings());

        assert_eq!(creds["uri"], json!("https://db.cf2.example.com:443"));
        assert_eq!(creds["port"], json!(443));
        assert_eq!(creds["hosts"], json!(["a.cf2.example.com", "b.elsewhere.net"]));
        assert_eq!(
            creds["nested"]["dashboard"],
            json!("https://dash.cf2.example.com")
        );
    }
}
