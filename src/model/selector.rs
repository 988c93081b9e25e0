//! Label selectors
//!
//! A [`LabelSelector`] is the declarative form stored on a subscription
//! (`matchLabels` plus `matchExpressions`). It is compiled into a
//! [`Selector`] before evaluation; compilation is where malformed input
//! (unknown operators, missing or unexpected values, invalid keys) is
//! rejected.
//!
//! Semantics follow Kubernetes label selectors:
//!
//! - `matchLabels` entries require the key to be present with that value
//! - `In` requires the key to be present with one of the values
//! - `NotIn` requires the key to be absent or to hold none of the values
//! - `Exists` / `DoesNotExist` test presence only
//! - an empty selector matches every label set

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Label set attached to a pod or namespace
pub type Labels = BTreeMap<String, String>;

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// Errors raised while compiling a [`LabelSelector`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// Operator is not one of In, NotIn, Exists, DoesNotExist
    #[error("unknown operator '{operator}' for key '{key}'")]
    UnknownOperator {
        /// Requirement key
        key: String,
        /// Operator as written
        operator: String,
    },

    /// In/NotIn without values
    #[error("operator {operator} for key '{key}' requires at least one value")]
    MissingValues {
        /// Requirement key
        key: String,
        /// Operator name
        operator: &'static str,
    },

    /// Exists/DoesNotExist with values
    #[error("operator {operator} for key '{key}' does not accept values")]
    UnexpectedValues {
        /// Requirement key
        key: String,
        /// Operator name
        operator: &'static str,
    },

    /// Key is not a valid qualified label name
    #[error("invalid label key '{0}'")]
    InvalidKey(String),

    /// Value is not a valid label value
    #[error("invalid label value '{value}' for key '{key}'")]
    InvalidValue {
        /// Requirement key
        key: String,
        /// Offending value
        value: String,
    },
}

/// Declarative label selector as written in a subscription
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Exact key/value pairs that must all be present
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    /// Set-based requirements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

/// One set-based requirement of a [`LabelSelector`]
///
/// The operator is kept as written so that an unknown operator surfaces
/// as a [`SelectorError`] at compile time instead of failing the whole
/// subscription document at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelectorRequirement {
    /// Label key the requirement applies to
    pub key: String,
    /// One of In, NotIn, Exists, DoesNotExist
    pub operator: String,
    /// Values for In/NotIn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl LabelSelector {
    /// Selector requiring the given labels to be present
    ///
    /// # Examples
    ///
    /// ```
    /// use podwatch::model::selector::LabelSelector;
    ///
    /// let selector = LabelSelector::from_labels([("tier", "backend")]);
    /// assert_eq!(selector.match_labels.get("tier").map(String::as_str), Some("backend"));
    /// ```
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            match_labels: labels
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            match_expressions: Vec::new(),
        }
    }

    /// Add a set-based requirement
    pub fn with_expression(mut self, key: &str, operator: &str, values: &[&str]) -> Self {
        self.match_expressions.push(LabelSelectorRequirement {
            key: key.to_string(),
            operator: operator.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    /// Compile into an evaluable [`Selector`]
    ///
    /// # Errors
    ///
    /// Returns a [`SelectorError`] describing the first malformed entry.
    ///
    /// # Examples
    ///
    /// ```
    /// use podwatch::model::selector::{LabelSelector, Labels};
    ///
    /// let selector = LabelSelector::default()
    ///     .with_expression("env", "In", &["prod", "staging"])
    ///     .compile()
    ///     .unwrap();
    ///
    /// let mut labels = Labels::new();
    /// labels.insert("env".to_string(), "prod".to_string());
    /// assert!(selector.matches(&labels));
    /// ```
    pub fn compile(&self) -> Result<Selector, SelectorError> {
        let mut requirements = Vec::with_capacity(self.match_labels.len() + self.match_expressions.len());

        for (key, value) in &self.match_labels {
            validate_key(key)?;
            validate_value(key, value)?;
            requirements.push(Requirement {
                key: key.clone(),
                operator: Operator::In,
                values: BTreeSet::from([value.clone()]),
            });
        }

        for expr in &self.match_expressions {
            validate_key(&expr.key)?;
            let operator = Operator::parse(&expr.key, &expr.operator)?;
            match operator {
                Operator::In | Operator::NotIn if expr.values.is_empty() => {
                    return Err(SelectorError::MissingValues {
                        key: expr.key.clone(),
                        operator: operator.as_str(),
                    });
                }
                Operator::Exists | Operator::DoesNotExist if !expr.values.is_empty() => {
                    return Err(SelectorError::UnexpectedValues {
                        key: expr.key.clone(),
                        operator: operator.as_str(),
                    });
                }
                _ => {}
            }
            for value in &expr.values {
                validate_value(&expr.key, value)?;
            }
            requirements.push(Requirement {
                key: expr.key.clone(),
                operator,
                values: expr.values.iter().cloned().collect(),
            });
        }

        Ok(Selector { requirements })
    }
}

/// Set-based selector operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Key present with one of the values
    In,
    /// Key absent or holding none of the values
    NotIn,
    /// Key present
    Exists,
    /// Key absent
    DoesNotExist,
}

impl Operator {
    fn parse(key: &str, raw: &str) -> Result<Self, SelectorError> {
        match raw {
            "In" => Ok(Self::In),
            "NotIn" => Ok(Self::NotIn),
            "Exists" => Ok(Self::Exists),
            "DoesNotExist" => Ok(Self::DoesNotExist),
            other => Err(SelectorError::UnknownOperator {
                key: key.to_string(),
                operator: other.to_string(),
            }),
        }
    }

    /// Operator name as written in selectors
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "In",
            Self::NotIn => "NotIn",
            Self::Exists => "Exists",
            Self::DoesNotExist => "DoesNotExist",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Requirement {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

impl Requirement {
    fn matches(&self, labels: &Labels) -> bool {
        match self.operator {
            Operator::In => labels
                .get(&self.key)
                .map(|v| self.values.contains(v))
                .unwrap_or(false),
            Operator::NotIn => labels
                .get(&self.key)
                .map(|v| !self.values.contains(v))
                .unwrap_or(true),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = || self.values.iter().cloned().collect::<Vec<_>>().join(",");
        match self.operator {
            Operator::In if self.values.len() == 1 => write!(f, "{}={}", self.key, values()),
            Operator::In => write!(f, "{} in ({})", self.key, values()),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, values()),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// Compiled selector, evaluated with [`Selector::matches`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Check whether every requirement holds for `labels`
    pub fn matches(&self, labels: &Labels) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// True when the selector has no requirements and matches everything
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

fn name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").expect("static regex")
    })
}

fn prefix_regex() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .expect("static regex")
    })
}

/// Keys are qualified names: an optional DNS-subdomain prefix and a name
fn validate_key(key: &str) -> Result<(), SelectorError> {
    let invalid = || SelectorError::InvalidKey(key.to_string());
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN || !prefix_regex().is_match(prefix) {
            return Err(invalid());
        }
    }
    if name.is_empty() || name.len() > MAX_NAME_LEN || !name_regex().is_match(name) {
        return Err(invalid());
    }
    Ok(())
}

/// Values may be empty, otherwise they follow the name rules
fn validate_value(key: &str, value: &str) -> Result<(), SelectorError> {
    if value.is_empty() {
        return Ok(());
    }
    if value.len() > MAX_NAME_LEN || !name_regex().is_match(value) {
        return Err(SelectorError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}
