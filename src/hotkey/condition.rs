//! Condition Engine (spec component G)
//!
//! A property registry plus a small operator grammar, with a 50ms result
//! cache keyed by the condition string (spec.md §4.F/§4.G). The textual
//! grammar is deliberately small: `[!]property operator value`, a bare
//! property name (truthy shortcut), or `property` with no operator at
//! all evaluating the property's own boolean/string-non-empty value.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use regex::Regex;

use crate::error::ConditionError;

/// A value a registered property can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
}

impl PropertyValue {
    fn as_string(&self) -> String {
        match self {
            PropertyValue::Str(s) => s.clone(),
            PropertyValue::Int(i) => i.to_string(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::List(l) => l.join(","),
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            PropertyValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            PropertyValue::Bool(b) => *b,
            PropertyValue::Str(s) => !s.is_empty(),
            PropertyValue::Int(i) => *i != 0,
            PropertyValue::List(l) => !l.is_empty(),
        }
    }
}

type Getter = Box<dyn Fn() -> PropertyValue + Send + Sync>;

struct Property {
    getter: Getter,
}

/// A predicate attached to a hotkey binding: either the textual DSL
/// (evaluated through the Condition Engine) or an opaque function
/// (spec.md §9 "Dynamic dispatch ... collapses to a sum type").
pub enum Condition {
    Text(String),
    Func(Box<dyn Fn() -> bool + Send + Sync>),
}

impl Condition {
    pub fn text(expr: impl Into<String>) -> Self {
        Condition::Text(expr.into())
    }

    pub fn func(f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Condition::Func(Box::new(f))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Contains,
    ContainsCi,
    NotContains,
    NotContainsCi,
    Matches,
    NotMatches,
    In,
    NotIn,
    Lt,
    Gt,
    Between,
}

struct ParsedCondition {
    negate: bool,
    property: String,
    op: Option<Operator>,
    raw_value: String,
    regex: Option<Regex>,
    list_value: Vec<String>,
    between: Option<(i64, i64)>,
}

/// Registry of properties plus a cache, shared across the Conditional
/// Layer's timer thread and any script-level condition evaluation.
pub struct ConditionEngine {
    properties: RwLock<HashMap<String, Property>>,
    cache: Mutex<HashMap<String, (bool, Instant)>>,
    dynamic_vars: RwLock<HashMap<String, String>>,
    cache_ttl: Duration,
}

impl Default for ConditionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEngine {
    pub fn new() -> Self {
        ConditionEngine {
            properties: RwLock::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
            dynamic_vars: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_millis(crate::constants::timing::CONDITION_CACHE_MS),
        }
    }

    pub fn register_property(&self, name: &str, getter: impl Fn() -> PropertyValue + Send + Sync + 'static) {
        self.properties
            .write()
            .unwrap()
            .insert(name.to_string(), Property { getter: Box::new(getter) });
    }

    pub fn register_string_property(&self, name: &str, getter: impl Fn() -> String + Send + Sync + 'static) {
        self.register_property(name, move || PropertyValue::Str(getter()));
    }

    pub fn register_int_property(&self, name: &str, getter: impl Fn() -> i64 + Send + Sync + 'static) {
        self.register_property(name, move || PropertyValue::Int(getter()));
    }

    pub fn register_bool_property(&self, name: &str, getter: impl Fn() -> bool + Send + Sync + 'static) {
        self.register_property(name, move || PropertyValue::Bool(getter()));
    }

    pub fn register_list_property(&self, name: &str, getter: impl Fn() -> Vec<String> + Send + Sync + 'static) {
        self.register_property(name, move || PropertyValue::List(getter()));
    }

    /// Set a dynamic variable (e.g. a script-level global) queryable the
    /// same way as a registered property, for conditions that reference
    /// script state rather than engine state.
    pub fn set_dynamic_var(&self, name: &str, value: impl Into<String>) {
        self.dynamic_vars.write().unwrap().insert(name.to_string(), value.into());
    }

    /// Drop the whole evaluation cache; called on mode changes.
    pub fn invalidate_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    pub fn evaluate(&self, condition: &Condition) -> Result<bool, ConditionError> {
        match condition {
            Condition::Func(f) => Ok(f()),
            Condition::Text(expr) => self.evaluate_condition(expr),
        }
    }

    /// Parse (or fetch a cached parse of) and evaluate a textual
    /// condition, using the 50ms result cache keyed by the string.
    pub fn evaluate_condition(&self, condition_str: &str) -> Result<bool, ConditionError> {
        let trimmed = condition_str.trim();
        if trimmed.is_empty() {
            return Err(ConditionError::Empty);
        }

        if let Some((result, at)) = self.cache.lock().unwrap().get(trimmed).copied()
            && at.elapsed() < self.cache_ttl
        {
            return Ok(result);
        }

        let parsed = self.parse_condition(trimmed)?;
        let result = self.evaluate_parsed(&parsed)?;

        self.cache
            .lock()
            .unwrap()
            .insert(trimmed.to_string(), (result, Instant::now()));

        Ok(result)
    }

    fn property_value(&self, name: &str) -> Result<PropertyValue, ConditionError> {
        if let Some(prop) = self.properties.read().unwrap().get(name) {
            return Ok((prop.getter)());
        }
        if let Some(v) = self.dynamic_vars.read().unwrap().get(name) {
            return Ok(PropertyValue::Str(v.clone()));
        }
        Err(ConditionError::UnknownProperty(name.to_string()))
    }

    fn evaluate_parsed(&self, cond: &ParsedCondition) -> Result<bool, ConditionError> {
        let value = self.property_value(&cond.property)?;

        let result = match cond.op {
            None => value.truthy(),
            Some(Operator::Eq) => value.as_string() == cond.raw_value,
            Some(Operator::Ne) => value.as_string() != cond.raw_value,
            Some(Operator::Contains) => value.as_string().contains(&cond.raw_value),
            Some(Operator::NotContains) => !value.as_string().contains(&cond.raw_value),
            Some(Operator::ContainsCi) => value
                .as_string()
                .to_lowercase()
                .contains(&cond.raw_value.to_lowercase()),
            Some(Operator::NotContainsCi) => !value
                .as_string()
                .to_lowercase()
                .contains(&cond.raw_value.to_lowercase()),
            Some(Operator::Matches) => cond
                .regex
                .as_ref()
                .is_some_and(|re| re.is_match(&value.as_string())),
            Some(Operator::NotMatches) => !cond
                .regex
                .as_ref()
                .is_some_and(|re| re.is_match(&value.as_string())),
            Some(Operator::In) => cond.list_value.iter().any(|v| v == &value.as_string()),
            Some(Operator::NotIn) => !cond.list_value.iter().any(|v| v == &value.as_string()),
            Some(Operator::Lt) => value
                .as_int()
                .zip(cond.raw_value.parse::<i64>().ok())
                .is_some_and(|(a, b)| a < b),
            Some(Operator::Gt) => value
                .as_int()
                .zip(cond.raw_value.parse::<i64>().ok())
                .is_some_and(|(a, b)| a > b),
            Some(Operator::Between) => cond
                .between
                .zip(value.as_int())
                .is_some_and(|((lo, hi), v)| v >= lo && v <= hi),
        };

        Ok(result ^ cond.negate)
    }

    fn parse_condition(&self, expr: &str) -> Result<ParsedCondition, ConditionError> {
        let mut rest = expr.trim();
        let negate = if let Some(stripped) = rest.strip_prefix('!') {
            rest = stripped.trim_start();
            true
        } else {
            false
        };

        for (token, op) in [
            ("between", None::<Operator>),
            ("!~c", Some(Operator::NotContainsCi)),
            ("~c", Some(Operator::ContainsCi)),
            ("!~", Some(Operator::NotMatches)),
            ("~=", Some(Operator::Matches)),
            ("!=", Some(Operator::Ne)),
            ("==", Some(Operator::Eq)),
            ("not in", Some(Operator::NotIn)),
            (" in ", Some(Operator::In)),
            ("<", Some(Operator::Lt)),
            (">", Some(Operator::Gt)),
            ("contains", Some(Operator::Contains)),
        ] {
            if token == "between" {
                if let Some(start) = rest.find("between(") {
                    let property = rest[..start].trim().to_string();
                    let args = &rest[start + "between(".len()..];
                    let Some(end) = args.find(')') else {
                        return Err(ConditionError::UnknownOperator(expr.to_string()));
                    };
                    let args = &args[..end];
                    let mut parts = args.split(',').map(|s| s.trim());
                    let lo = parts
                        .next()
                        .and_then(|s| s.parse::<i64>().ok())
                        .ok_or_else(|| ConditionError::UnknownOperator(expr.to_string()))?;
                    let hi = parts
                        .next()
                        .and_then(|s| s.parse::<i64>().ok())
                        .ok_or_else(|| ConditionError::UnknownOperator(expr.to_string()))?;
                    return Ok(ParsedCondition {
                        negate,
                        property,
                        op: Some(Operator::Between),
                        raw_value: String::new(),
                        regex: None,
                        list_value: Vec::new(),
                        between: Some((lo, hi)),
                    });
                }
                continue;
            }

            if let Some(pos) = rest.find(token) {
                let property = rest[..pos].trim().to_string();
                let value = unquote(rest[pos + token.len()..].trim());
                let op = op.unwrap();

                let regex = if matches!(op, Operator::Matches | Operator::NotMatches) {
                    Some(Regex::new(&value).map_err(|source| ConditionError::BadRegex {
                        pattern: value.clone(),
                        source,
                    })?)
                } else {
                    None
                };

                let list_value = if matches!(op, Operator::In | Operator::NotIn) {
                    value.split(',').map(|s| unquote(s.trim())).collect()
                } else {
                    Vec::new()
                };

                return Ok(ParsedCondition {
                    negate,
                    property,
                    op: Some(op),
                    raw_value: value,
                    regex,
                    list_value,
                    between: None,
                });
            }
        }

        // No operator: bare property name, truthy shortcut.
        Ok(ParsedCondition {
            negate,
            property: rest.to_string(),
            op: None,
            raw_value: String::new(),
            regex: None,
            list_value: Vec::new(),
            between: None,
        })
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'')
            || (bytes[0] == b'"' && bytes[s.len() - 1] == b'"')
        {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_mode(mode: &'static str) -> ConditionEngine {
        let engine = ConditionEngine::new();
        engine.register_string_property("mode", move || mode.to_string());
        engine
    }

    #[test]
    fn equality_and_negation() {
        let engine = engine_with_mode("gaming");
        assert!(engine.evaluate_condition("mode == 'gaming'").unwrap());
        assert!(!engine.evaluate_condition("mode != 'gaming'").unwrap());
        assert!(engine.evaluate_condition("!mode == 'normal'").unwrap());
    }

    #[test]
    fn contains_and_case_insensitive() {
        let engine = ConditionEngine::new();
        engine.register_string_property("title", || "Visual Studio Code".to_string());
        assert!(engine.evaluate_condition("title contains 'Studio'").unwrap());
        assert!(engine.evaluate_condition("title ~c 'studio'").unwrap());
        assert!(!engine.evaluate_condition("title !~c 'studio'").unwrap());
    }

    #[test]
    fn in_list_operator() {
        let engine = ConditionEngine::new();
        engine.register_string_property("class", || "firefox".to_string());
        assert!(engine.evaluate_condition("class in firefox,chrome").unwrap());
        assert!(!engine.evaluate_condition("class not in firefox,chrome").unwrap());
    }

    #[test]
    fn between_operator() {
        let engine = ConditionEngine::new();
        engine.register_int_property("battery", || 42);
        assert!(engine.evaluate_condition("battery between(0, 100)").unwrap());
        assert!(!engine.evaluate_condition("battery between(50, 100)").unwrap());
    }

    #[test]
    fn bad_regex_is_a_parse_error() {
        let engine = ConditionEngine::new();
        engine.register_string_property("title", || "x".to_string());
        assert!(engine.evaluate_condition("title ~= '['").is_err());
    }

    #[test]
    fn bare_property_is_truthy_shortcut() {
        let engine = ConditionEngine::new();
        engine.register_bool_property("fullscreen", || true);
        assert!(engine.evaluate_condition("fullscreen").unwrap());
    }

    #[test]
    fn result_is_cached_within_ttl() {
        let calls = std::sync::atomic::AtomicU32::new(0);
        let engine = ConditionEngine::new();
        engine.register_property("mode", move || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            PropertyValue::Str("gaming".to_string())
        });
        engine.evaluate_condition("mode == 'gaming'").unwrap();
        engine.evaluate_condition("mode == 'gaming'").unwrap();
        // Second call is served from cache, so the getter fired once.
        assert_eq!(engine.cache.lock().unwrap().len(), 1);
    }
}
