//! Path-based freshness rules.
//!
//! Rules are evaluated in configuration order; the first pattern found
//! anywhere in the request path decides the directive and scanning stops.
//! Patterns are compiled once, when the configuration is loaded.

use std::fmt;

use regex::Regex;

use super::control::CacheControl;
use super::error::MalformedFreshnessRule;

/// Lifetimes granted by a matching rule. Absent fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Directive {
    pub shared_max_age: Option<u64>,
    pub max_age: Option<u64>,
}

impl Directive {
    pub fn new(shared_max_age: Option<u64>, max_age: Option<u64>) -> Self {
        Self {
            shared_max_age,
            max_age,
        }
    }

    pub fn shared(secs: u64) -> Self {
        Self::new(Some(secs), None)
    }

    pub fn private(secs: u64) -> Self {
        Self::new(None, Some(secs))
    }

    /// Stamp the directive onto a response's cache control.
    pub fn apply(&self, control: &mut CacheControl) {
        if let Some(secs) = self.shared_max_age {
            control.set_shared_max_age(secs);
        }
        if let Some(secs) = self.max_age {
            control.set_max_age(secs);
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.shared_max_age, self.max_age) {
            (Some(shared), Some(private)) => write!(f, "s-maxage={shared}, max-age={private}"),
            (Some(shared), None) => write!(f, "s-maxage={shared}"),
            (None, Some(private)) => write!(f, "max-age={private}"),
            (None, None) => f.write_str("-"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FreshnessRule {
    pattern: Regex,
    directive: Directive,
}

impl FreshnessRule {
    pub fn new(pattern: &str, directive: Directive) -> Result<Self, MalformedFreshnessRule> {
        let compiled = Regex::new(pattern).map_err(|source| MalformedFreshnessRule {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            pattern: compiled,
            directive,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn directive(&self) -> &Directive {
        &self.directive
    }

    /// Unanchored match anywhere in `path`.
    pub fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }
}

/// First matching rule's directive, if any.
pub fn resolve<'a>(path: &str, rules: &'a [FreshnessRule]) -> Option<&'a Directive> {
    rules
        .iter()
        .find(|rule| rule.matches(path))
        .map(FreshnessRule::directive)
}

/// Ordered, precompiled rule list.
#[derive(Debug, Clone, Default)]
pub struct FreshnessRules {
    rules: Vec<FreshnessRule>,
}

impl FreshnessRules {
    pub fn new(rules: Vec<FreshnessRule>) -> Self {
        Self { rules }
    }

    /// Compile `(pattern, directive)` pairs, failing on the first bad pattern.
    pub fn compile<I, P>(rules: I) -> Result<Self, MalformedFreshnessRule>
    where
        I: IntoIterator<Item = (P, Directive)>,
        P: AsRef<str>,
    {
        rules
            .into_iter()
            .map(|(pattern, directive)| FreshnessRule::new(pattern.as_ref(), directive))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn resolve(&self, path: &str) -> Option<&Directive> {
        resolve(path, &self.rules)
    }

    /// Like [`resolve`](Self::resolve), also reporting which rule matched.
    pub fn find(&self, path: &str) -> Option<(usize, &FreshnessRule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(path))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FreshnessRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_display_lists_present_fields() {
        assert_eq!(Directive::new(Some(600), Some(60)).to_string(), "s-maxage=600, max-age=60");
        assert_eq!(Directive::private(30).to_string(), "max-age=30");
        assert_eq!(Directive::default().to_string(), "-");
    }

    #[test]
    fn first_match_wins_over_more_specific_rule() {
        let rules = FreshnessRules::compile([
            ("/admin", Directive::shared(0)),
            ("/admin/reports", Directive::shared(300)),
        ])
        .expect("rules compile");

        assert_eq!(
            rules.resolve("/admin/reports"),
            Some(&Directive::shared(0))
        );
        assert_eq!(rules.find("/admin/reports").map(|(i, _)| i), Some(0));
    }

    #[test]
    fn patterns_match_anywhere_in_path() {
        let rules = FreshnessRules::compile([("news", Directive::shared(60))])
            .expect("rules compile");

        assert!(rules.resolve("/en/news/today").is_some());
        assert!(rules.resolve("/en/sport").is_none());
    }

    #[test]
    fn anchors_are_respected_when_written() {
        let rules =
            FreshnessRules::compile([("^/news$", Directive::shared(60))]).expect("rules compile");

        assert!(rules.resolve("/news").is_some());
        assert!(rules.resolve("/en/news").is_none());
    }

    #[test]
    fn empty_rule_list_resolves_nothing() {
        let rules = FreshnessRules::default();
        assert!(rules.is_empty());
        assert!(rules.resolve("/anything").is_none());
        assert!(resolve("/anything", &[]).is_none());
    }

    #[test]
    fn malformed_pattern_is_reported_at_compile_time() {
        let err = FreshnessRules::compile([
            ("^/ok", Directive::shared(60)),
            ("(unclosed", Directive::shared(60)),
        ])
        .expect_err("pattern should be rejected");

        assert_eq!(err.pattern, "(unclosed");
    }

    #[test]
    fn hash_characters_need_no_escaping() {
        let rules =
            FreshnessRules::compile([("#section", Directive::shared(5))]).expect("rules compile");
        assert!(rules.resolve("/docs#section").is_some());
    }

    #[test]
    fn directive_only_sets_present_fields() {
        let mut control = CacheControl::parse("max-age=30");
        Directive::shared(600).apply(&mut control);
        assert_eq!(control.max_age(), Some(30));
        assert_eq!(control.shared_max_age(), Some(600));

        let mut control = CacheControl::default();
        Directive::private(45).apply(&mut control);
        assert_eq!(control.shared_max_age(), None);
        assert_eq!(control.max_age(), Some(45));
    }
}
