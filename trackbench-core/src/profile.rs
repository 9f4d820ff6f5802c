//! Profiles
//!
//! A profile is a named list of override sets. Expanding a profile against a
//! base configuration yields one concrete configuration per override set, in
//! registration order.
//!
//! Override sets may be declared as a product of candidate values; the product
//! is materialized when the profile is built (first axis varies slowest), so
//! `override_sets().len()` always equals the number of expanded runs.

use crate::config::BenchmarkConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single override value as written in a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverrideValue {
    /// Integer value (counts, shapes)
    Int(i64),
    /// String value (identity fields, mode, project)
    Str(String),
}

impl fmt::Display for OverrideValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideValue::Int(n) => write!(f, "{}", n),
            OverrideValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for OverrideValue {
    fn from(s: &str) -> Self {
        OverrideValue::Str(s.to_string())
    }
}

impl From<String> for OverrideValue {
    fn from(s: String) -> Self {
        OverrideValue::Str(s)
    }
}

impl From<i64> for OverrideValue {
    fn from(n: i64) -> Self {
        OverrideValue::Int(n)
    }
}

impl From<u32> for OverrideValue {
    fn from(n: u32) -> Self {
        OverrideValue::Int(i64::from(n))
    }
}

/// Candidate values for one field of a product declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidates {
    /// A single fixed value
    One(OverrideValue),
    /// Several values, each producing its own run
    Many(Vec<OverrideValue>),
}

impl Candidates {
    /// Fixed value
    pub fn one(value: impl Into<OverrideValue>) -> Self {
        Candidates::One(value.into())
    }

    /// Several candidate values
    pub fn many<V: Into<OverrideValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Candidates::Many(values.into_iter().map(Into::into).collect())
    }

    fn values(&self) -> &[OverrideValue] {
        match self {
            Candidates::One(value) => std::slice::from_ref(value),
            Candidates::Many(values) => values,
        }
    }
}

/// Ordered field overrides producing exactly one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideSet {
    fields: Vec<(String, OverrideValue)>,
}

impl OverrideSet {
    /// Empty override set (reproduces the base configuration)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field override
    pub fn with(mut self, field: impl Into<String>, value: impl Into<OverrideValue>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    /// Overrides in declaration order
    pub fn fields(&self) -> &[(String, OverrideValue)] {
        &self.fields
    }

    /// Value assigned to `field`, if this set overrides it (last one wins)
    pub fn get(&self, field: &str) -> Option<&OverrideValue> {
        self.fields
            .iter()
            .rev()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Apply the overrides to `config` in declaration order
    pub fn apply(&self, config: &mut BenchmarkConfig) -> Result<(), ConfigError> {
        for (field, value) in &self.fields {
            config.set_field(field, value)?;
        }
        Ok(())
    }
}

/// A named collection of override sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    name: String,
    description: String,
    sets: Vec<OverrideSet>,
}

impl Profile {
    /// Empty profile; add sets with [`Profile::with_set`] or [`Profile::with_product`]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            sets: Vec::new(),
        }
    }

    /// One run per value of `field`, labelled `test_variant = "<field>=<value>"`
    pub fn sweep<V: Into<OverrideValue>>(
        name: impl Into<String>,
        description: impl Into<String>,
        field: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let mut profile = Self::new(name, description);
        for value in values {
            let value = value.into();
            let label = match &value {
                OverrideValue::Str(s) => format!("{}={}", field, s),
                other => format!("{}={}", field, other),
            };
            profile.sets.push(
                OverrideSet::new()
                    .with("test_variant", label)
                    .with(field, value),
            );
        }
        profile
    }

    /// Append an explicit override set
    pub fn with_set(mut self, set: OverrideSet) -> Self {
        self.sets.push(set);
        self
    }

    /// Append the cartesian product of `axes` (first axis varies slowest)
    pub fn with_product<S: Into<String>>(
        mut self,
        axes: impl IntoIterator<Item = (S, Candidates)>,
    ) -> Result<Self, ConfigError> {
        let mut product = vec![OverrideSet::new()];
        for (field, candidates) in axes {
            let field = field.into();
            let values = candidates.values();
            if values.is_empty() {
                return Err(ConfigError::EmptyCandidates(field));
            }
            let mut next = Vec::with_capacity(product.len() * values.len());
            for set in &product {
                for value in values {
                    next.push(set.clone().with(field.clone(), value.clone()));
                }
            }
            product = next;
        }
        self.sets.extend(product);
        Ok(self)
    }

    /// Add `field = value` to every set already declared
    pub fn with_common(mut self, field: &str, value: impl Into<OverrideValue>) -> Self {
        let value = value.into();
        for set in &mut self.sets {
            set.fields.push((field.to_string(), value.clone()));
        }
        self
    }

    /// Profile name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// One-line description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Materialized override sets, one per expanded run
    pub fn override_sets(&self) -> &[OverrideSet] {
        &self.sets
    }

    /// Expand against `base`: one clone per override set, in order
    pub fn expand(&self, base: &BenchmarkConfig) -> Result<Vec<BenchmarkConfig>, ConfigError> {
        self.sets
            .iter()
            .map(|set| {
                let mut config = base.clone();
                set.apply(&mut config)?;
                Ok(config)
            })
            .collect()
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.sets.is_empty() {
            return Err(ConfigError::EmptyProfile(self.name.clone()));
        }
        let mut probe = BenchmarkConfig::default();
        for set in &self.sets {
            set.apply(&mut probe)?;
        }
        Ok(())
    }
}

/// Immutable profile lookup table, built once at startup
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, Profile>,
}

impl ProfileRegistry {
    /// Build a registry, rejecting duplicate names and invalid overrides
    pub fn new(profiles: impl IntoIterator<Item = Profile>) -> Result<Self, ConfigError> {
        let mut map = BTreeMap::new();
        for profile in profiles {
            profile.check()?;
            let name = profile.name.clone();
            if map.insert(name.clone(), profile).is_some() {
                return Err(ConfigError::DuplicateProfile(name));
            }
        }
        Ok(Self { profiles: map })
    }

    /// Built-in profiles followed by `extra`
    pub fn with_builtins(extra: impl IntoIterator<Item = Profile>) -> Result<Self, ConfigError> {
        Self::new(builtin_profiles().into_iter().chain(extra))
    }

    /// Look up a profile by name
    pub fn get(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                name: name.to_string(),
                available: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    /// Registered profile names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Registered profiles, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    /// Number of registered profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether no profile is registered
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Expand `base` with the named profile.
    ///
    /// An empty name yields `[base]` unchanged.
    pub fn expand(
        &self,
        base: &BenchmarkConfig,
        profile_name: &str,
    ) -> Result<Vec<BenchmarkConfig>, ConfigError> {
        if profile_name.is_empty() {
            return Ok(vec![base.clone()]);
        }
        self.get(profile_name)?.expand(base)
    }
}

/// Profiles available without any configuration file
pub fn builtin_profiles() -> Vec<Profile> {
    vec![
        Profile::sweep(
            "history-sweep",
            "Grow the number of logged steps per session",
            "num_history",
            [1u32, 10, 100, 1000],
        )
        .with_common("history_floats", 10u32),
        Profile::sweep(
            "parallel-sweep",
            "Fan the same workload out over more worker processes",
            "num_parallel",
            [1u32, 2, 4, 8],
        )
        .with_common("num_history", 100u32)
        .with_common("history_floats", 10u32),
        Profile::new("payload-mix", "One payload kind per run")
            .with_set(
                OverrideSet::new()
                    .with("test_variant", "floats")
                    .with("history_floats", 100u32),
            )
            .with_set(
                OverrideSet::new()
                    .with("test_variant", "ints")
                    .with("history_ints", 100u32),
            )
            .with_set(
                OverrideSet::new()
                    .with("test_variant", "strings")
                    .with("history_strings", 100u32),
            )
            .with_set(
                OverrideSet::new()
                    .with("test_variant", "tables")
                    .with("history_tables", 10u32),
            )
            .with_set(
                OverrideSet::new()
                    .with("test_variant", "images")
                    .with("history_images", 4u32),
            )
            .with_common("num_history", 10u32),
        Profile::sweep(
            "image-dims",
            "Grow the side length of logged images",
            "history_images_dim",
            [16u32, 64, 256],
        )
        .with_common("history_images", 1u32)
        .with_common("num_history", 10u32),
    ]
}
