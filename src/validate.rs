//! Validation hooks run against a fully resolved [`EnvMap`] before it is
//! applied to a target environment.
//!
//! Two shapes are supported: a schema object implementing [`Validate`] for the
//! whole mapping, or [`KeyValidators`], which checks individual keys with
//! [`ValueValidator`]s and reports the first key that fails.

use regex::Regex;

use crate::error::ValidationError;
use crate::model::EnvMap;

/// Validates a whole mapping at once.
pub trait Validate {
    fn validate(&self, env: &EnvMap) -> Result<(), ValidationError>;
}

impl<F> Validate for F
where
    F: Fn(&EnvMap) -> Result<(), ValidationError>,
{
    fn validate(&self, env: &EnvMap) -> Result<(), ValidationError> {
        self(env)
    }
}

/// Validates a single value. `None` means the key is missing or was
/// declared optional without a value.
///
/// An empty list means the value is accepted.
pub trait ValueValidator {
    fn validate_safely(&self, value: Option<&str>) -> Vec<String>;
}

impl<F> ValueValidator for F
where
    F: Fn(Option<&str>) -> Vec<String>,
{
    fn validate_safely(&self, value: Option<&str>) -> Vec<String> {
        self(value)
    }
}

/// Per-key validators, checked in insertion order.
#[derive(Default)]
pub struct KeyValidators {
    rules: Vec<(String, Box<dyn ValueValidator + Send + Sync>)>,
}

impl KeyValidators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        key: impl Into<String>,
        validator: impl ValueValidator + Send + Sync + 'static,
    ) -> Self {
        self.rules.push((key.into(), Box::new(validator)));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for KeyValidators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValidators")
            .field("keys", &self.rules.iter().map(|(key, _)| key).collect::<Vec<_>>())
            .finish()
    }
}

impl Validate for KeyValidators {
    fn validate(&self, env: &EnvMap) -> Result<(), ValidationError> {
        for (key, validator) in &self.rules {
            let errors = validator.validate_safely(env.get_str(key));
            if let Some(message) = errors.into_iter().next() {
                return Err(ValidationError::Key {
                    key: key.clone(),
                    message,
                });
            }
        }
        Ok(())
    }
}

/// Built-in value validator assembled from simple checks.
///
/// ```
/// use strictenv::{KeyValidators, Rule};
///
/// let validators = KeyValidators::new()
///     .with("PORT", Rule::required().integer())
///     .with("MODE", Rule::optional().one_of(["dev", "prod"]));
/// # let _ = validators;
/// ```
#[derive(Debug, Clone)]
pub struct Rule {
    required: bool,
    checks: Vec<Check>,
}

#[derive(Debug, Clone)]
enum Check {
    Number,
    Integer,
    Boolean,
    OneOf(Vec<String>),
    MinLen(usize),
    MaxLen(usize),
    Pattern(Regex),
}

impl Rule {
    /// The key must have a value.
    pub fn required() -> Self {
        Self {
            required: true,
            checks: Vec::new(),
        }
    }

    /// A missing value passes; a present one must satisfy every check.
    pub fn optional() -> Self {
        Self {
            required: false,
            checks: Vec::new(),
        }
    }

    pub fn number(self) -> Self {
        self.check(Check::Number)
    }

    pub fn integer(self) -> Self {
        self.check(Check::Integer)
    }

    /// Accepts `true`, `false`, `1`, `0`, `yes` and `no`, ignoring case.
    pub fn boolean(self) -> Self {
        self.check(Check::Boolean)
    }

    pub fn one_of<I, S>(self, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check(Check::OneOf(allowed.into_iter().map(Into::into).collect()))
    }

    pub fn min_len(self, len: usize) -> Self {
        self.check(Check::MinLen(len))
    }

    pub fn max_len(self, len: usize) -> Self {
        self.check(Check::MaxLen(len))
    }

    pub fn pattern(self, pattern: &str) -> Result<Self, ValidationError> {
        let regex = Regex::new(pattern)
            .map_err(|err| ValidationError::InvalidValidator(err.to_string()))?;
        Ok(self.check(Check::Pattern(regex)))
    }

    fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }
}

impl ValueValidator for Rule {
    fn validate_safely(&self, value: Option<&str>) -> Vec<String> {
        let Some(value) = value else {
            return if self.required {
                vec!["value is required".to_owned()]
            } else {
                Vec::new()
            };
        };

        self.checks
            .iter()
            .filter_map(|check| check.failure(value))
            .collect()
    }
}

impl Check {
    fn failure(&self, value: &str) -> Option<String> {
        let ok = match self {
            Self::Number => value.parse::<f64>().is_ok_and(f64::is_finite),
            Self::Integer => value.parse::<i64>().is_ok(),
            Self::Boolean => matches!(
                value.to_ascii_lowercase().as_str(),
                "true" | "false" | "1" | "0" | "yes" | "no"
            ),
            Self::OneOf(allowed) => allowed.iter().any(|item| item == value),
            Self::MinLen(len) => value.chars().count() >= *len,
            Self::MaxLen(len) => value.chars().count() <= *len,
            Self::Pattern(regex) => regex.is_match(value),
        };
        if ok {
            return None;
        }

        Some(match self {
            Self::Number => "must be a number".to_owned(),
            Self::Integer => "must be an integer".to_owned(),
            Self::Boolean => "must be a boolean".to_owned(),
            Self::OneOf(allowed) => format!("must be one of: {}", allowed.join(", ")),
            Self::MinLen(len) => format!("must be at least {len} characters"),
            Self::MaxLen(len) => format!("must be at most {len} characters"),
            Self::Pattern(regex) => format!("must match pattern `{}`", regex.as_str()),
        })
    }
}
