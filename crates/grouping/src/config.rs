//! Solve parameters from JSON and `GROUPING__*` environment overrides.

use serde::de::DeserializeOwned;
use std::str::FromStr;
use thiserror::Error;
use types::SolveParams;

pub const ENV_PREFIX: &str = "GROUPING__";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}={value:?}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
    #[error("malformed solve parameters: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses a (possibly partial) parameter document; missing fields take their defaults.
pub fn parse_params(json: &str) -> Result<SolveParams, ConfigError> {
    Ok(serde_json::from_str(json)?)
}

/// Applies the process environment on top of `base`.
pub fn params_from_env(base: SolveParams) -> Result<SolveParams, ConfigError> {
    apply_overrides(base, |key| std::env::var(key).ok())
}

/// Applies overrides found through `lookup`, keyed by the full variable name.
pub fn apply_overrides(
    mut params: SolveParams,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SolveParams, ConfigError> {
    let get = |name: &str| {
        let key = format!("{ENV_PREFIX}{name}");
        lookup(&key).map(|value| (key, value))
    };

    if let Some((k, v)) = get("SOLVER") {
        params.solver = keyword(&k, &v)?;
    }
    if let Some((k, v)) = get("ENCODING") {
        params.encoding = keyword(&k, &v)?;
    }
    if let Some((k, v)) = get("MODE") {
        params.relaxation.mode = keyword(&k, &v)?;
    }
    if let Some((k, v)) = get("HEURISTIC_VARIANT") {
        params.heuristic.variant = keyword(&k, &v)?;
    }
    if let Some((k, v)) = get("TIME_LIMIT_SEC") {
        params.time_limit_sec = number(&k, &v)?;
    }
    if let Some((k, v)) = get("SEED") {
        params.seed = number(&k, &v)?;
    }
    if let Some((k, v)) = get("MIN_PREFS_START") {
        params.relaxation.min_prefs_start = number(&k, &v)?;
    }
    if let Some((k, v)) = get("DEVIATION") {
        let d: f64 = number(&k, &v)?;
        if !(0.0..=1.0).contains(&d) {
            return Err(invalid(&k, &v, "expected a fraction between 0 and 1"));
        }
        params.relaxation.deviation = d;
    }
    if let Some((k, v)) = get("HEURISTIC_ATTEMPTS") {
        params.heuristic.max_attempts = number(&k, &v)?;
    }
    if let Some((k, v)) = get("HEURISTIC_FALLBACK") {
        params.heuristic_fallback = number(&k, &v)?;
    }
    Ok(params)
}

fn invalid(key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, value, e.to_string()))
}

/// Enum values use their serde names, e.g. `heuristic` or `per_group`.
fn keyword<T: DeserializeOwned>(key: &str, value: &str) -> Result<T, ConfigError> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase()))
        .map_err(|e| invalid(key, value, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use types::{ConstraintMode, SolverKind, TogetherEncoding};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn no_overrides_keeps_base() {
        let p = apply_overrides(SolveParams::default(), env(&[])).unwrap();
        assert_eq!(p.seed, 42);
        assert_eq!(p.time_limit_sec, 1800);
    }

    #[test]
    fn overrides_apply() {
        let p = apply_overrides(
            SolveParams::default(),
            env(&[
                ("GROUPING__SOLVER", "Heuristic"),
                ("GROUPING__ENCODING", "per_group"),
                ("GROUPING__MODE", "soft"),
                ("GROUPING__SEED", "7"),
                ("GROUPING__DEVIATION", "0.25"),
                ("GROUPING__MIN_PREFS_START", "3"),
                ("GROUPING__HEURISTIC_ATTEMPTS", "4"),
                ("GROUPING__HEURISTIC_FALLBACK", "true"),
            ]),
        )
        .unwrap();
        assert_eq!(p.solver, SolverKind::Heuristic);
        assert_eq!(p.encoding, TogetherEncoding::PerGroup);
        assert_eq!(p.relaxation.mode, ConstraintMode::Soft);
        assert_eq!(p.seed, 7);
        assert_eq!(p.relaxation.deviation, 0.25);
        assert_eq!(p.relaxation.min_prefs_start, 3);
        assert_eq!(p.heuristic.max_attempts, 4);
        assert!(p.heuristic_fallback);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = apply_overrides(SolveParams::default(), env(&[("GROUPING__SEED", "abc")]))
            .unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r###"GROUPING__SEED="abc": invalid digit found in string"###);

        let err = apply_overrides(SolveParams::default(), env(&[("GROUPING__DEVIATION", "1.5")]))
            .unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r###"GROUPING__DEVIATION="1.5": expected a fraction between 0 and 1"###);

        assert!(apply_overrides(SolveParams::default(), env(&[("GROUPING__SOLVER", "cplex")])).is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let p = parse_params(r#"{"solver":"heuristic","relaxation":{"deviation":0.2}}"#).unwrap();
        assert_eq!(p.solver, SolverKind::Heuristic);
        assert_eq!(p.relaxation.deviation, 0.2);
        assert_eq!(p.relaxation.min_prefs_start, 5);
        assert!(matches!(parse_params("{"), Err(ConfigError::Json(_))));
    }
}
