use crate::error::{SimulationError, SimulationResult, SweepError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// A single candidate value for a strategy parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Int(v) => Some(*v as f64),
            ParameterValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(ParameterValue::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(ParameterValue::Int)
                .or_else(|| n.as_f64().map(ParameterValue::Float)),
            Value::String(s) => Some(ParameterValue::Text(s.trim().to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Int(value)
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Bool(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

/// Value domain a strategy declares for one of its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterKind {
    Integer { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Boolean,
    Choice(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    pub candidates: Vec<ParameterValue>,
}

impl ParameterSpec {
    pub fn integer(name: &str, min: i64, max: i64, candidates: &[i64]) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::Integer { min, max },
            candidates: candidates.iter().copied().map(ParameterValue::Int).collect(),
        }
    }

    pub fn float(name: &str, min: f64, max: f64, candidates: &[f64]) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::Float { min, max },
            candidates: candidates.iter().copied().map(ParameterValue::Float).collect(),
        }
    }

    pub fn boolean(name: &str, candidates: &[bool]) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::Boolean,
            candidates: candidates.iter().copied().map(ParameterValue::Bool).collect(),
        }
    }

    pub fn choice(name: &str, options: &[&str], candidates: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::Choice(options.iter().map(|o| o.to_string()).collect()),
            candidates: candidates
                .iter()
                .map(|c| ParameterValue::Text(c.to_string()))
                .collect(),
        }
    }

    /// Check a value against the declared domain, normalizing numeric
    /// representations (e.g. `3` for a float parameter becomes `3.0`).
    pub fn validate(&self, value: &ParameterValue) -> Result<ParameterValue, SweepError> {
        let rejected = || {
            SweepError::configuration(format!(
                "Value {} is outside the domain of parameter `{}` ({})",
                value,
                self.name,
                self.kind.describe()
            ))
        };

        match (&self.kind, value) {
            (ParameterKind::Integer { min, max }, ParameterValue::Int(v)) => {
                if v < min || v > max {
                    return Err(rejected());
                }
                Ok(ParameterValue::Int(*v))
            }
            (ParameterKind::Integer { min, max }, ParameterValue::Float(v)) => {
                if !v.is_finite() || v.fract() != 0.0 {
                    return Err(rejected());
                }
                let as_int = *v as i64;
                if as_int < *min || as_int > *max {
                    return Err(rejected());
                }
                Ok(ParameterValue::Int(as_int))
            }
            (
                ParameterKind::Float { min, max },
                numeric @ (ParameterValue::Int(_) | ParameterValue::Float(_)),
            ) => {
                let v = numeric.as_f64().ok_or_else(rejected)?;
                if !v.is_finite() || v < *min || v > *max {
                    return Err(rejected());
                }
                Ok(ParameterValue::Float(v))
            }
            (ParameterKind::Boolean, ParameterValue::Bool(v)) => Ok(ParameterValue::Bool(*v)),
            (ParameterKind::Boolean, ParameterValue::Int(v)) if *v == 0 || *v == 1 => {
                Ok(ParameterValue::Bool(*v == 1))
            }
            (ParameterKind::Choice(options), ParameterValue::Text(v)) => {
                if options.iter().any(|o| o == v) {
                    Ok(ParameterValue::Text(v.clone()))
                } else {
                    Err(rejected())
                }
            }
            _ => Err(rejected()),
        }
    }
}

impl ParameterKind {
    fn describe(&self) -> String {
        match self {
            ParameterKind::Integer { min, max } => format!("integer in [{}, {}]", min, max),
            ParameterKind::Float { min, max } => format!("number in [{}, {}]", min, max),
            ParameterKind::Boolean => "boolean".to_string(),
            ParameterKind::Choice(options) => format!("one of {:?}", options),
        }
    }
}

/// Immutable, validated assignment of a value to every declared parameter,
/// kept in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSet {
    entries: Vec<(String, ParameterValue)>,
}

impl ParameterSet {
    /// Build a parameter set, checking it against the declared domains.
    /// Every declared parameter must be given exactly once.
    pub fn new(
        specs: &[ParameterSpec],
        values: Vec<(String, ParameterValue)>,
    ) -> Result<Self, SweepError> {
        let mut seen = HashSet::new();
        for (name, _) in &values {
            if !specs.iter().any(|spec| &spec.name == name) {
                return Err(SweepError::configuration(format!(
                    "Unknown parameter `{}`",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(SweepError::configuration(format!(
                    "Parameter `{}` given more than once",
                    name
                )));
            }
        }

        let mut entries = Vec::with_capacity(specs.len());
        for spec in specs {
            let value = values
                .iter()
                .find(|(name, _)| name == &spec.name)
                .map(|(_, value)| value)
                .ok_or_else(|| {
                    SweepError::configuration(format!("Missing parameter `{}`", spec.name))
                })?;
            entries.push((spec.name.clone(), spec.validate(value)?));
        }

        Ok(Self { entries })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stable textual key used in logs and result joins.
    pub fn signature(&self) -> String {
        self.entries
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn required(&self, name: &str) -> SimulationResult<&ParameterValue> {
        self.get(name)
            .ok_or_else(|| SimulationError::MissingInput(format!("parameter `{}`", name)))
    }

    /// Extract a parameter as usize
    pub fn get_usize(&self, name: &str) -> SimulationResult<usize> {
        match self.required(name)? {
            ParameterValue::Int(v) if *v >= 0 => Ok(*v as usize),
            other => Err(SimulationError::MissingInput(format!(
                "parameter `{}` is not a non-negative integer ({})",
                name, other
            ))),
        }
    }

    /// Extract a numeric parameter as f64
    pub fn get_f64(&self, name: &str) -> SimulationResult<f64> {
        let value = self.required(name)?;
        value.as_f64().ok_or_else(|| {
            SimulationError::MissingInput(format!(
                "parameter `{}` is not numeric ({})",
                name, value
            ))
        })
    }

    pub fn get_bool(&self, name: &str) -> SimulationResult<bool> {
        match self.required(name)? {
            ParameterValue::Bool(v) => Ok(*v),
            other => Err(SimulationError::MissingInput(format!(
                "parameter `{}` is not a boolean ({})",
                name, other
            ))),
        }
    }

    pub fn get_text(&self, name: &str) -> SimulationResult<&str> {
        match self.required(name)? {
            ParameterValue::Text(v) => Ok(v.as_str()),
            other => Err(SimulationError::MissingInput(format!(
                "parameter `{}` is not text ({})",
                name, other
            ))),
        }
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.signature())
    }
}

/// Ordered mapping of parameter name to candidate values.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterGrid {
    axes: Vec<(String, Vec<ParameterValue>)>,
}

impl ParameterGrid {
    /// The grid a strategy declares through its parameter specs.
    pub fn declared(specs: &[ParameterSpec]) -> Result<Self, SweepError> {
        let mut axes = Vec::with_capacity(specs.len());
        for spec in specs {
            let values = spec
                .candidates
                .iter()
                .map(|value| spec.validate(value))
                .collect::<Result<Vec<_>, _>>()?;
            axes.push((spec.name.clone(), values));
        }
        Self { axes }.countable()
    }

    /// Apply a JSON object of `name -> [values]` on top of the declared grid.
    /// Parameters not mentioned keep their declared candidates.
    pub fn with_overrides(specs: &[ParameterSpec], json: &str) -> Result<Self, SweepError> {
        let raw: Value = serde_json::from_str(json)
            .map_err(|error| SweepError::configuration(format!("Invalid grid JSON: {}", error)))?;
        let Value::Object(map) = raw else {
            return Err(SweepError::configuration(
                "Grid must be a JSON object of parameter name to candidate list",
            ));
        };

        let mut grid = Self::declared(specs)?;
        for (name, candidates) in map {
            let spec = specs
                .iter()
                .find(|spec| spec.name == name)
                .ok_or_else(|| {
                    SweepError::configuration(format!("Grid names unknown parameter `{}`", name))
                })?;
            let Value::Array(items) = candidates else {
                return Err(SweepError::configuration(format!(
                    "Candidates for `{}` must be a list (got {})",
                    name, candidates
                )));
            };

            let mut values = Vec::with_capacity(items.len());
            for item in &items {
                let value = ParameterValue::from_json(item).ok_or_else(|| {
                    SweepError::configuration(format!(
                        "Unsupported candidate {} for `{}`",
                        item, name
                    ))
                })?;
                values.push(spec.validate(&value)?);
            }

            if let Some(axis) = grid.axes.iter_mut().find(|(axis, _)| axis == &name) {
                axis.1 = values;
            }
        }

        grid.countable()
    }

    fn checked_count(&self) -> Option<usize> {
        self.axes
            .iter()
            .try_fold(1usize, |acc, (_, values)| acc.checked_mul(values.len()))
    }

    fn countable(self) -> Result<Self, SweepError> {
        if self.checked_count().is_none() {
            let sizes: Vec<String> = self
                .axes
                .iter()
                .map(|(name, values)| format!("{}={}", name, values.len()))
                .collect();
            return Err(SweepError::configuration(format!(
                "Grid has too many combinations to enumerate ({})",
                sizes.join(" x ")
            )));
        }
        Ok(self)
    }

    pub fn axes(&self) -> &[(String, Vec<ParameterValue>)] {
        &self.axes
    }

    /// Constructors reject grids whose product overflows `usize`.
    pub fn combination_count(&self) -> usize {
        self.checked_count().unwrap_or(usize::MAX)
    }

    /// Full Cartesian product in odometer order: the last parameter varies
    /// fastest. Any empty candidate list yields no combinations; a grid
    /// without parameters yields a single empty set.
    pub fn expand(&self) -> Vec<ParameterSet> {
        let total = self.combination_count();
        let mut combinations = Vec::with_capacity(total);
        if total == 0 {
            return combinations;
        }

        let mut cursor = vec![0usize; self.axes.len()];
        loop {
            let entries = self
                .axes
                .iter()
                .zip(&cursor)
                .map(|((name, values), &idx)| (name.clone(), values[idx].clone()))
                .collect();
            combinations.push(ParameterSet { entries });

            let mut axis = self.axes.len();
            loop {
                if axis == 0 {
                    return combinations;
                }
                axis -= 1;
                cursor[axis] += 1;
                if cursor[axis] < self.axes[axis].1.len() {
                    break;
                }
                cursor[axis] = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::integer("length", 2, 100, &[10, 14]),
            ParameterSpec::choice("ma_type", &["SMA", "EMA"], &["SMA", "EMA", "SMA"]),
            ParameterSpec::float("multiplier", 0.0, 5.0, &[0.25]),
        ]
    }

    #[test]
    fn expands_full_cartesian_product_last_fastest() {
        let grid = ParameterGrid::declared(&specs()).unwrap();
        let sets = grid.expand();

        assert_eq!(grid.combination_count(), 6);
        assert_eq!(sets.len(), 6);
        let signatures: Vec<String> = sets.iter().map(|s| s.signature()).collect();
        assert_eq!(
            signatures[0],
            "length=10, ma_type=SMA, multiplier=0.25".to_string()
        );
        assert_eq!(signatures[1], "length=10, ma_type=EMA, multiplier=0.25");
        assert_eq!(signatures[3], "length=14, ma_type=SMA, multiplier=0.25");
        // repeated candidates are not deduplicated
        assert_eq!(signatures[0], signatures[2]);
    }

    #[test]
    fn product_size_matches_axis_lengths() {
        let specs = vec![
            ParameterSpec::integer("a", 0, 10, &[1, 2, 3]),
            ParameterSpec::integer("b", 0, 10, &[1, 2, 3, 4]),
            ParameterSpec::boolean("c", &[true, false]),
        ];
        let sets = ParameterGrid::declared(&specs).unwrap().expand();
        assert_eq!(sets.len(), 3 * 4 * 2);
        let unique: HashSet<String> = sets.iter().map(|s| s.signature()).collect();
        assert_eq!(unique.len(), 24);
    }

    #[test]
    fn empty_candidate_list_yields_no_combinations() {
        let specs = vec![
            ParameterSpec::integer("a", 0, 10, &[1, 2]),
            ParameterSpec::integer("b", 0, 10, &[]),
        ];
        let grid = ParameterGrid::declared(&specs).unwrap();
        assert_eq!(grid.combination_count(), 0);
        assert!(grid.expand().is_empty());
    }

    #[test]
    fn overrides_replace_declared_candidates() {
        let grid =
            ParameterGrid::with_overrides(&specs(), r#"{"length": [5, 6, 7], "multiplier": [1]}"#)
                .unwrap();
        assert_eq!(grid.combination_count(), 9);
        let first = &grid.expand()[0];
        assert_eq!(first.get("multiplier"), Some(&ParameterValue::Float(1.0)));
    }

    #[test]
    fn overrides_reject_non_list_candidates() {
        let err = ParameterGrid::with_overrides(&specs(), r#"{"length": 5}"#).unwrap_err();
        assert!(matches!(err, SweepError::Configuration(_)));
    }

    #[test]
    fn overrides_reject_unknown_names_and_out_of_domain_values() {
        assert!(ParameterGrid::with_overrides(&specs(), r#"{"nope": [1]}"#).is_err());
        assert!(ParameterGrid::with_overrides(&specs(), r#"{"length": [1]}"#).is_err());
        assert!(ParameterGrid::with_overrides(&specs(), r#"{"ma_type": ["WMA"]}"#).is_err());
        assert!(ParameterGrid::with_overrides(&specs(), r#"[1, 2]"#).is_err());
    }

    #[test]
    fn overrides_reject_grids_too_large_to_count() {
        let names = ["p0", "p1", "p2", "p3", "p4"];
        let specs: Vec<ParameterSpec> = names
            .iter()
            .map(|name| ParameterSpec::integer(name, 0, 100_000, &[1]))
            .collect();
        assert_eq!(ParameterGrid::declared(&specs).unwrap().combination_count(), 1);

        let candidates = (0..10_000)
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let json = format!(
            "{{{}}}",
            names
                .iter()
                .map(|name| format!("\"{}\": [{}]", name, candidates))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let err = ParameterGrid::with_overrides(&specs, &json).unwrap_err();
        assert!(matches!(err, SweepError::Configuration(_)));
    }

    #[test]
    fn parameter_set_validates_against_domain() {
        let specs = specs();
        let ok = ParameterSet::new(
            &specs,
            vec![
                ("multiplier".to_string(), ParameterValue::Int(2)),
                ("length".to_string(), ParameterValue::Int(20)),
                ("ma_type".to_string(), "EMA".into()),
            ],
        )
        .unwrap();
        assert_eq!(ok.signature(), "length=20, ma_type=EMA, multiplier=2");
        assert_eq!(ok.get_f64("multiplier").unwrap(), 2.0);
        assert_eq!(ok.get_usize("length").unwrap(), 20);

        let missing = ParameterSet::new(&specs, vec![("length".to_string(), 20.into())]);
        assert!(missing.is_err());
    }

    #[test]
    fn typed_accessors_report_wrong_types() {
        let set = ParameterGrid::declared(&specs()).unwrap().expand().remove(0);
        assert!(set.get_bool("length").is_err());
        assert!(set.get_usize("absent").is_err());
        assert_eq!(set.get_text("ma_type").unwrap(), "SMA");
    }
}
