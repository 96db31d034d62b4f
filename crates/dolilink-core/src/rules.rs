//! Matching rules for link selection.
//!
//! A rule is a case-insensitive substring predicate over one field of a
//! link element (href, title, or rendered text). Rules travel over the wire
//! as a JSON-encoded array of `{"type": ..., "value": ...}` objects plus a
//! separate enabled flag; [`RuleSet`] carries both.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which link field a rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleKind {
    /// The link's href attribute contains the value.
    HrefContains,
    /// The link's title attribute contains the value.
    Title,
    /// The link's rendered text content contains the value.
    TextContent,
    /// Unrecognized kind; deserializes without error and never matches.
    #[serde(other)]
    Unknown,
}

impl RuleKind {
    /// Returns the kind's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::HrefContains => "hrefContains",
            RuleKind::Title => "title",
            RuleKind::TextContent => "textContent",
            RuleKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The matchable fields of a link element, captured as a snapshot.
///
/// Absent attributes are represented as empty strings so matching never has
/// to distinguish missing from empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkFields {
    /// The href attribute, or empty if absent.
    pub href: String,
    /// The title attribute, or empty if absent.
    pub title: String,
    /// The rendered text content, or empty if absent.
    pub text: String,
}

/// A single link-matching rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRule {
    /// Which field this rule matches against.
    #[serde(rename = "type")]
    pub kind: RuleKind,
    /// The substring to look for (case-insensitive).
    pub value: String,
}

impl LinkRule {
    /// Creates a new rule.
    pub fn new(kind: RuleKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Creates an href-contains rule.
    pub fn href_contains(value: impl Into<String>) -> Self {
        Self::new(RuleKind::HrefContains, value)
    }

    /// Creates a title-contains rule.
    pub fn title(value: impl Into<String>) -> Self {
        Self::new(RuleKind::Title, value)
    }

    /// Creates a text-content rule.
    pub fn text_content(value: impl Into<String>) -> Self {
        Self::new(RuleKind::TextContent, value)
    }

    /// Checks whether this rule matches the given link fields.
    ///
    /// Comparison is case-insensitive substring containment. An `Unknown`
    /// kind never matches.
    pub fn matches(&self, link: &LinkFields) -> bool {
        let haystack = match self.kind {
            RuleKind::HrefContains => &link.href,
            RuleKind::Title => &link.title,
            RuleKind::TextContent => &link.text,
            RuleKind::Unknown => return false,
        };
        haystack.to_lowercase().contains(&self.value.to_lowercase())
    }
}

/// An ordered set of link rules with a global enabled flag.
///
/// The set is replaced wholesale on load or save; individual rules are
/// never edited in place by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// The rules, in evaluation order.
    pub rules: Vec<LinkRule>,
    /// Whether matching is enabled at all.
    pub enabled: bool,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSet {
    /// Creates an empty, enabled rule set.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            enabled: true,
        }
    }

    /// Creates the built-in default rule set.
    ///
    /// Used when no settings have been saved yet and as the fallback when
    /// the settings endpoint is unreachable or returns malformed rules.
    pub fn defaults() -> Self {
        Self {
            rules: vec![
                LinkRule::href_contains("/dolibarr/"),
                LinkRule::title("Dolibarr"),
            ],
            enabled: true,
        }
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Parses a rule set from its wire form: a JSON-encoded rule array plus
    /// an enabled flag.
    pub fn from_wire(rules_json: &str, enabled: bool) -> Result<Self, serde_json::Error> {
        let rules: Vec<LinkRule> = serde_json::from_str(rules_json)?;
        Ok(Self { rules, enabled })
    }

    /// Parses a rule set from its wire form, falling back to the built-in
    /// defaults (with the given enabled flag) if the payload is malformed.
    pub fn from_wire_or_default(rules_json: &str, enabled: bool) -> Self {
        match Self::from_wire(rules_json, enabled) {
            Ok(set) => set,
            Err(e) => {
                warn!("malformed rules payload, using defaults: {}", e);
                Self::defaults().with_enabled(enabled)
            }
        }
    }

    /// Serializes the rule list to its wire form (a JSON-encoded array).
    pub fn to_wire(&self) -> String {
        serde_json::to_string(&self.rules).unwrap_or_else(|_| "[]".to_string())
    }

    /// Checks whether any rule matches the given link fields.
    ///
    /// Returns false immediately when the set is disabled; otherwise the
    /// rules are evaluated in order and the first hit short-circuits.
    pub fn matches(&self, link: &LinkFields) -> bool {
        if !self.enabled {
            return false;
        }
        self.rules.iter().any(|rule| rule.matches(link))
    }

    /// Returns the number of rules in the set.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the set contains no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(href: &str, title: &str, text: &str) -> LinkFields {
        LinkFields {
            href: href.to_string(),
            title: title.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn rule_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&RuleKind::HrefContains).unwrap(),
            "\"hrefContains\""
        );
        assert_eq!(serde_json::to_string(&RuleKind::Title).unwrap(), "\"title\"");
        assert_eq!(
            serde_json::to_string(&RuleKind::TextContent).unwrap(),
            "\"textContent\""
        );
    }

    #[test]
    fn rule_kind_display() {
        assert_eq!(format!("{}", RuleKind::HrefContains), "hrefContains");
        assert_eq!(format!("{}", RuleKind::Unknown), "unknown");
    }

    #[test]
    fn unrecognized_kind_deserializes_as_unknown() {
        let rule: LinkRule =
            serde_json::from_str(r#"{"type": "cssClass", "value": "nav"}"#).unwrap();
        assert_eq!(rule.kind, RuleKind::Unknown);
    }

    #[test]
    fn unknown_kind_never_matches() {
        let rule = LinkRule::new(RuleKind::Unknown, "dolibarr");
        assert!(!rule.matches(&link("/dolibarr/", "Dolibarr", "Dolibarr")));
    }

    #[test]
    fn href_rule_matches_case_insensitively() {
        let rule = LinkRule::href_contains("dolibarr");
        assert!(rule.matches(&link("/Dolibarr/app", "", "")));
        assert!(rule.matches(&link("/DOLIBARR/", "", "")));
        assert!(!rule.matches(&link("/nextcloud/", "", "")));
    }

    #[test]
    fn title_rule_matches_title_only() {
        let rule = LinkRule::title("erp");
        assert!(rule.matches(&link("", "Open ERP module", "")));
        assert!(!rule.matches(&link("/erp/", "", "erp")));
    }

    #[test]
    fn text_rule_matches_text_only() {
        let rule = LinkRule::text_content("invoices");
        assert!(rule.matches(&link("", "", "All Invoices")));
        assert!(!rule.matches(&link("/invoices", "Invoices", "")));
    }

    #[test]
    fn absent_fields_match_as_empty_strings() {
        let rule = LinkRule::title("anything");
        assert!(!rule.matches(&LinkFields::default()));
    }

    #[test]
    fn rule_set_defaults() {
        let set = RuleSet::defaults();
        assert_eq!(set.len(), 2);
        assert!(set.enabled);
        assert!(set.matches(&link("/dolibarr/index.php", "", "")));
        assert!(set.matches(&link("", "Dolibarr ERP", "")));
    }

    #[test]
    fn disabled_set_matches_nothing() {
        let set = RuleSet::defaults().with_enabled(false);
        assert!(!set.matches(&link("/dolibarr/", "Dolibarr", "Dolibarr")));
    }

    #[test]
    fn empty_set_matches_nothing() {
        let set = RuleSet::new();
        assert!(set.is_empty());
        assert!(!set.matches(&link("/dolibarr/", "", "")));
    }

    #[test]
    fn any_rule_suffices() {
        let set = RuleSet {
            rules: vec![
                LinkRule::href_contains("/nowhere/"),
                LinkRule::text_content("open"),
            ],
            enabled: true,
        };
        assert!(set.matches(&link("/somewhere/", "", "Open item")));
    }

    #[test]
    fn wire_round_trip() {
        let set = RuleSet::defaults();
        let wire = set.to_wire();
        let parsed = RuleSet::from_wire(&wire, true).unwrap();
        assert_eq!(set, parsed);
    }

    #[test]
    fn wire_form_uses_original_field_names() {
        let wire = RuleSet::defaults().to_wire();
        assert!(wire.contains(r#""type":"hrefContains""#));
        assert!(wire.contains(r#""value":"/dolibarr/""#));
    }

    #[test]
    fn from_wire_rejects_malformed_json() {
        assert!(RuleSet::from_wire("not json", true).is_err());
        assert!(RuleSet::from_wire(r#"{"rules": []}"#, true).is_err());
    }

    #[test]
    fn from_wire_or_default_falls_back() {
        let set = RuleSet::from_wire_or_default("not json", false);
        assert_eq!(set.rules, RuleSet::defaults().rules);
        assert!(!set.enabled);
    }

    #[test]
    fn from_wire_preserves_rule_order() {
        let wire = r#"[
            {"type": "textContent", "value": "b"},
            {"type": "hrefContains", "value": "a"}
        ]"#;
        let set = RuleSet::from_wire(wire, true).unwrap();
        assert_eq!(set.rules[0].kind, RuleKind::TextContent);
        assert_eq!(set.rules[1].kind, RuleKind::HrefContains);
    }
}
