//! Validation gate run before every write.
//!
//! [`Validator`] is the pass/fail contract the lifecycle calls. [`RuleSet`]
//! is the built-in implementation: rule strings such as `"required|max:255"`
//! are parsed once against a [`RuleRegistry`] that maps each tag to a check
//! constructor. Unknown tags and malformed arguments are configuration
//! errors at parse time.
//!
//! ```rust
//! use quarry_query::entity::validation::{RuleRegistry, RuleSet, Validator};
//! use quarry_query::row::Attributes;
//!
//! let rules = RuleSet::parse(
//!     &RuleRegistry::default(),
//!     &[("email", "required|email"), ("role", "in:admin,member")],
//! )
//! .unwrap();
//!
//! let mut attrs = Attributes::new();
//! attrs.insert("email".into(), "not-an-email".into());
//! attrs.insert("role".into(), "root".into());
//!
//! let errors = rules.validate(&attrs, None).unwrap_err();
//! assert!(errors.has("email"));
//! assert!(errors.has("role"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex_lite::Regex;

use crate::error::{QueryError, QueryResult, ValidationErrors};
use crate::filter::FilterValue;
use crate::row::Attributes;

/// Pass/fail check over a candidate attribute set.
pub trait Validator: Send + Sync {
    /// Validate `attributes`. `ignore_id` is the primary key of the row
    /// being updated, for checks that must not collide with itself.
    fn validate(
        &self,
        attributes: &Attributes,
        ignore_id: Option<&FilterValue>,
    ) -> Result<(), ValidationErrors>;
}

/// A resolved check: `(field, value)` to an optional failure message.
pub type RuleCheck = Arc<dyn Fn(&str, Option<&FilterValue>) -> Option<String> + Send + Sync>;

/// Builds a check from the rule's argument (`max:255` → `Some("255")`).
pub type RuleFactory = Arc<dyn Fn(Option<&str>) -> QueryResult<RuleCheck> + Send + Sync>;

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// Tag → check constructor.
#[derive(Clone)]
pub struct RuleRegistry {
    factories: HashMap<String, RuleFactory>,
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        f.debug_struct("RuleRegistry").field("tags", &tags).finish()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::empty()
            .register("required", |arg| {
                if arg.is_some() {
                    return Err(QueryError::configuration("rule 'required' takes no argument"));
                }
                Ok(Arc::new(required) as RuleCheck)
            })
            .register("string", |arg| {
                no_arg("string", arg, |field, v| {
                    (!matches!(v, FilterValue::String(_)))
                        .then(|| format!("The {} field must be a string.", field))
                })
            })
            .register("integer", |arg| {
                no_arg("integer", arg, |field, v| {
                    let ok = match v {
                        FilterValue::Int(_) => true,
                        FilterValue::String(s) => s.trim().parse::<i64>().is_ok(),
                        _ => false,
                    };
                    (!ok).then(|| format!("The {} field must be an integer.", field))
                })
            })
            .register("numeric", |arg| {
                no_arg("numeric", arg, |field, v| {
                    v.as_f64()
                        .is_none()
                        .then(|| format!("The {} field must be a number.", field))
                })
            })
            .register("boolean", |arg| {
                no_arg("boolean", arg, |field, v| {
                    let ok = match v {
                        FilterValue::Bool(_) | FilterValue::Int(0 | 1) => true,
                        FilterValue::String(s) => matches!(s.as_str(), "true" | "false" | "0" | "1"),
                        _ => false,
                    };
                    (!ok).then(|| format!("The {} field must be true or false.", field))
                })
            })
            .register("email", |arg| {
                no_arg("email", arg, |field, v| {
                    let ok = match (v.as_str(), EMAIL.as_ref()) {
                        (Some(s), Some(re)) => re.is_match(s),
                        (Some(s), None) => s.contains('@'),
                        (None, _) => false,
                    };
                    (!ok).then(|| format!("The {} field must be a valid email address.", field))
                })
            })
            .register("min", |arg| bound("min", arg, |size, limit| size >= limit))
            .register("max", |arg| bound("max", arg, |size, limit| size <= limit))
            .register("in", |arg| {
                let allowed: Vec<String> = arg
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| QueryError::configuration("rule 'in' needs a value list"))?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect();
                Ok(present(move |field, v| {
                    let text = v.to_string();
                    (!allowed.contains(&text)).then(|| format!("The selected {} is invalid.", field))
                }))
            })
    }
}

impl RuleRegistry {
    /// A registry with no rules.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register (or replace) a rule tag.
    pub fn register<F>(mut self, tag: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Option<&str>) -> QueryResult<RuleCheck> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
        self
    }

    /// Whether `tag` is known.
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Resolve one `tag[:arg]` rule.
    pub fn resolve(&self, rule: &str) -> QueryResult<RuleCheck> {
        let (tag, arg) = match rule.split_once(':') {
            Some((tag, arg)) => (tag.trim(), Some(arg.trim())),
            None => (rule.trim(), None),
        };
        let factory = self.factories.get(tag).ok_or_else(|| {
            QueryError::configuration(format!("Unknown validation rule '{}'", tag))
        })?;
        factory(arg)
    }
}

/// Wrap a check so it only runs on present, non-blank values.
fn present<F>(check: F) -> RuleCheck
where
    F: Fn(&str, &FilterValue) -> Option<String> + Send + Sync + 'static,
{
    Arc::new(move |field: &str, value: Option<&FilterValue>| match value {
        Some(v) if !v.is_blank() => check(field, v),
        _ => None,
    })
}

fn no_arg<F>(tag: &str, arg: Option<&str>, check: F) -> QueryResult<RuleCheck>
where
    F: Fn(&str, &FilterValue) -> Option<String> + Send + Sync + 'static,
{
    if arg.is_some() {
        return Err(QueryError::configuration(format!("rule '{}' takes no argument", tag)));
    }
    Ok(present(check))
}

fn required(field: &str, value: Option<&FilterValue>) -> Option<String> {
    value
        .is_none_or(FilterValue::is_blank)
        .then(|| format!("The {} field is required.", field))
}

fn bound(tag: &'static str, arg: Option<&str>, holds: fn(f64, f64) -> bool) -> QueryResult<RuleCheck> {
    let limit: f64 = arg
        .and_then(|a| a.parse().ok())
        .ok_or_else(|| QueryError::configuration(format!("rule '{}' needs a numeric argument", tag)))?;

    Ok(present(move |field, v| {
        let (size, unit) = match v {
            FilterValue::String(s) => (s.chars().count() as f64, " characters"),
            FilterValue::List(items) => (items.len() as f64, " items"),
            other => (other.as_f64()?, ""),
        };
        let word = if tag == "min" { "at least" } else { "at most" };
        (!holds(size, limit)).then(|| format!("The {} field must be {} {}{}.", field, word, limit, unit))
    }))
}

struct FieldRules {
    field: String,
    checks: Vec<RuleCheck>,
}

/// Rules for a set of fields, resolved once.
pub struct RuleSet {
    fields: Vec<FieldRules>,
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields.iter().map(|r| r.field.as_str()).collect();
        f.debug_struct("RuleSet").field("fields", &fields).finish()
    }
}

impl RuleSet {
    /// Parse `(field, "rule|rule:arg")` pairs.
    pub fn parse(registry: &RuleRegistry, rules: &[(&str, &str)]) -> QueryResult<Self> {
        let mut fields = Vec::with_capacity(rules.len());
        for (field, rule_line) in rules {
            let mut checks = Vec::new();
            for rule in rule_line.split('|').map(str::trim).filter(|r| !r.is_empty()) {
                checks.push(registry.resolve(rule).map_err(|e| e.with_field(*field))?);
            }
            fields.push(FieldRules {
                field: (*field).to_string(),
                checks,
            });
        }
        Ok(Self { fields })
    }
}

impl Validator for RuleSet {
    fn validate(
        &self,
        attributes: &Attributes,
        _ignore_id: Option<&FilterValue>,
    ) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for rules in &self.fields {
            let value = attributes.get(&rules.field);
            for check in &rules.checks {
                if let Some(message) = check(&rules.field, value) {
                    errors.add(&rules.field, message);
                }
            }
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, FilterValue)]) -> Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_required_and_optional_fields() {
        let rules = RuleSet::parse(
            &RuleRegistry::default(),
            &[("name", "required|string"), ("age", "integer|min:18")],
        )
        .unwrap();

        let errors = rules.validate(&attrs(&[]), None).unwrap_err();
        assert!(errors.has("name"));
        assert!(!errors.has("age"));

        let errors = rules
            .validate(&attrs(&[("name", "   ".into()), ("age", 12.into())]), None)
            .unwrap_err();
        assert_eq!(errors.get("name").unwrap(), ["The name field is required."]);
        assert_eq!(errors.get("age").unwrap(), ["The age field must be at least 18."]);

        assert!(rules
            .validate(&attrs(&[("name", "Ada".into()), ("age", 36.into())]), None)
            .is_ok());
    }

    #[test]
    fn test_string_bounds() {
        let rules = RuleSet::parse(&RuleRegistry::default(), &[("title", "min:3|max:5")]).unwrap();
        assert!(rules.validate(&attrs(&[("title", "ab".into())]), None).is_err());
        assert!(rules.validate(&attrs(&[("title", "abcd".into())]), None).is_ok());
        let errors = rules.validate(&attrs(&[("title", "abcdef".into())]), None).unwrap_err();
        assert_eq!(errors.get("title").unwrap(), ["The title field must be at most 5 characters."]);
    }

    #[test]
    fn test_email_and_boolean() {
        let rules =
            RuleSet::parse(&RuleRegistry::default(), &[("email", "email"), ("on", "boolean")]).unwrap();
        assert!(rules
            .validate(&attrs(&[("email", "ada@example.com".into()), ("on", 1.into())]), None)
            .is_ok());
        let errors = rules
            .validate(&attrs(&[("email", "ada@".into()), ("on", "yes".into())]), None)
            .unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_unknown_rule_is_configuration_error() {
        let err = RuleSet::parse(&RuleRegistry::default(), &[("email", "required|shiny")]).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.context.field.as_deref(), Some("email"));

        assert!(RuleSet::parse(&RuleRegistry::default(), &[("n", "max:lots")]).is_err());
        assert!(RuleSet::parse(&RuleRegistry::default(), &[("n", "email:strict")]).is_err());
    }

    #[test]
    fn test_custom_rule() {
        let registry = RuleRegistry::default().register("uppercase", |_| {
            Ok(Arc::new(|field: &str, value: Option<&FilterValue>| {
                let text = value.and_then(|v| v.as_str())?;
                (text != text.to_uppercase()).then(|| format!("The {} field must be uppercase.", field))
            }) as RuleCheck)
        });
        let rules = RuleSet::parse(&registry, &[("code", "uppercase")]).unwrap();
        assert!(rules.validate(&attrs(&[("code", "ABC".into())]), None).is_ok());
        assert!(rules.validate(&attrs(&[("code", "abc".into())]), None).is_err());
    }
}
