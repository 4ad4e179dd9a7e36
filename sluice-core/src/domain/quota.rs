//! Namespace quota domain types
//!
//! Quantities are carried as integer base units: plain counts, millicores for
//! CPU dimensions and bytes (or arbitrary units) for everything else.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Dimension every job consumes exactly one unit of unless it says otherwise
pub const COUNT_DIMENSION: &str = "count";

/// Key inside a job definition that carries its resource requirements
pub const RESOURCES_KEY: &str = "resources";

/// Snapshot of quota usage for one namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceQuotaView {
    pub namespace: String,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub dimensions: BTreeMap<String, QuotaDimension>,
}

/// Limit and current usage of one tracked resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDimension {
    pub hard: u64,
    pub used: u64,
}

impl QuotaDimension {
    pub fn headroom(&self) -> u64 {
        self.hard.saturating_sub(self.used)
    }
}

impl NamespaceQuotaView {
    /// Creates an empty view, i.e. a namespace without any constraints
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            observed_at: Utc::now(),
            dimensions: BTreeMap::new(),
        }
    }

    pub fn with_dimension(mut self, name: impl Into<String>, hard: u64, used: u64) -> Self {
        self.dimensions
            .insert(name.into(), QuotaDimension { hard, used });
        self
    }

    pub fn dimension(&self, name: &str) -> Option<&QuotaDimension> {
        self.dimensions.get(name)
    }

    /// Remaining capacity of a tracked dimension, `None` if untracked
    pub fn headroom(&self, name: &str) -> Option<u64> {
        self.dimensions.get(name).map(QuotaDimension::headroom)
    }

    /// Books `requirements` against the view
    ///
    /// Used within a single reconciliation pass so that jobs admitted later in
    /// the pass see the capacity consumed by earlier ones.
    pub fn reserve(&mut self, requirements: &ResourceRequirements) {
        for (name, amount) in requirements.iter() {
            if let Some(dimension) = self.dimensions.get_mut(name) {
                dimension.used = dimension.used.saturating_add(amount);
            }
        }
    }
}

/// Resources a job needs, keyed by quota dimension name
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceRequirements {
    amounts: BTreeMap<String, u64>,
}

impl ResourceRequirements {
    /// Derives requirements from a job definition
    ///
    /// The definition must be a JSON object. Its optional `resources` member
    /// maps dimension names to quantities; `count` defaults to 1.
    pub fn from_definition(definition: &Value) -> Result<Self, RequirementsError> {
        let object = definition
            .as_object()
            .ok_or(RequirementsError::DefinitionNotAnObject)?;

        let mut amounts = BTreeMap::new();
        amounts.insert(COUNT_DIMENSION.to_string(), 1);

        match object.get(RESOURCES_KEY) {
            None | Some(Value::Null) => {}
            Some(Value::Object(resources)) => {
                for (name, value) in resources {
                    let amount = parse_quantity(name, value).map_err(|source| {
                        RequirementsError::Quantity {
                            dimension: name.clone(),
                            source,
                        }
                    })?;
                    amounts.insert(name.clone(), amount);
                }
            }
            Some(_) => return Err(RequirementsError::ResourcesNotAnObject),
        }

        Ok(Self { amounts })
    }

    pub fn get(&self, dimension: &str) -> u64 {
        self.amounts.get(dimension).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.amounts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Why requirements could not be derived from a definition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequirementsError {
    #[error("job definition must be a JSON object")]
    DefinitionNotAnObject,

    #[error("`resources` must be an object of dimension -> quantity")]
    ResourcesNotAnObject,

    #[error("invalid quantity for `{dimension}`: {source}")]
    Quantity {
        dimension: String,
        #[source]
        source: QuantityError,
    },
}

/// Quantity parse failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("expected a non-negative number or quantity string, got {0}")]
    NotAQuantity(String),

    #[error("malformed quantity '{0}'")]
    Malformed(String),

    #[error("unknown quantity suffix '{0}'")]
    UnknownSuffix(String),

    #[error("quantity '{0}' is out of range")]
    Overflow(String),
}

/// Parses a quantity into the base unit of `dimension`
///
/// Accepts non-negative JSON numbers and strings such as `"2"`, `"500m"`,
/// `"1.5Gi"` or `"10k"`. Dimensions whose name ends in `cpu` are expressed in
/// millicores, so `"2"` becomes 2000 and `"250m"` becomes 250. Fractions are
/// rounded up.
pub fn parse_quantity(dimension: &str, value: &Value) -> Result<u64, QuantityError> {
    let cpu = dimension.ends_with("cpu");

    match value {
        Value::Number(number) => match number.as_u64() {
            Some(whole) if cpu => whole
                .checked_mul(1000)
                .ok_or_else(|| QuantityError::Overflow(number.to_string())),
            Some(whole) => Ok(whole),
            None => parse_quantity_str(&number.to_string(), cpu),
        },
        Value::String(text) => parse_quantity_str(text.trim(), cpu),
        other => Err(QuantityError::NotAQuantity(other.to_string())),
    }
}

fn parse_quantity_str(text: &str, cpu: bool) -> Result<u64, QuantityError> {
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(split);

    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if (int_part.is_empty() && frac_part.is_empty()) || frac_part.contains('.') {
        return Err(QuantityError::Malformed(text.to_string()));
    }
    if frac_part.len() > 18 {
        return Err(QuantityError::Malformed(text.to_string()));
    }

    let (multiplier, divisor) = suffix_factor(suffix)?;
    let overflow = || QuantityError::Overflow(text.to_string());

    let mantissa: u128 = format!("{int_part}{frac_part}")
        .parse()
        .map_err(|_| overflow())?;
    let scale = 10u128.pow(frac_part.len() as u32);
    let unit = if cpu { 1000 } else { 1 };

    let numerator = mantissa
        .checked_mul(multiplier)
        .and_then(|v| v.checked_mul(unit))
        .ok_or_else(overflow)?;
    let value = numerator.div_ceil(scale * divisor);

    u64::try_from(value).map_err(|_| overflow())
}

/// (multiplier, divisor) for a quantity suffix
fn suffix_factor(suffix: &str) -> Result<(u128, u128), QuantityError> {
    let factor = match suffix {
        "" => (1, 1),
        "m" => (1, 1000),
        "k" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (1_000_000_000_000, 1),
        "P" => (1_000_000_000_000_000, 1),
        "E" => (1_000_000_000_000_000_000, 1),
        "Ki" => (1 << 10, 1),
        "Mi" => (1 << 20, 1),
        "Gi" => (1 << 30, 1),
        "Ti" => (1 << 40, 1),
        "Pi" => (1 << 50, 1),
        "Ei" => (1 << 60, 1),
        other => return Err(QuantityError::UnknownSuffix(other.to_string())),
    };
    Ok(factor)
}
