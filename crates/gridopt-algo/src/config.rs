//! Method parameters.
//!
//! Each method owns an immutable parameter struct resolved once at
//! construction: built-in defaults, then the QP solver defaults they embed,
//! then caller overrides. Overrides can come from code or from a partial TOML
//! file where every key is optional:
//!
//! ```toml
//! quiet = true
//! tol = 1e-9
//! max_iter = 500
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid parameter file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid parameter {name} = {value}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Interior-point QP solver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QpSolverParams {
    /// Duality gap and feasibility tolerance
    pub tol: f64,
    pub max_iter: u32,
    /// Print solver iterations
    pub verbose: bool,
}

impl Default for QpSolverParams {
    fn default() -> Self {
        Self {
            tol: 1e-8,
            max_iter: 200,
            verbose: false,
        }
    }
}

/// Single-stage DC OPF parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcOpfParams {
    /// Suppress the problem summary logged before solving
    pub quiet: bool,
    pub solver: QpSolverParams,
}

impl Default for DcOpfParams {
    fn default() -> Self {
        Self {
            quiet: false,
            solver: QpSolverParams::default(),
        }
    }
}

/// Multi-stage DC OPF parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MsDcOpfParams {
    pub quiet: bool,
    /// Tolerance of the stage feasibility check (per unit)
    pub feas_tol: f64,
    /// Parameters of every per-stage DC OPF solve
    pub stage: DcOpfParams,
}

impl Default for MsDcOpfParams {
    fn default() -> Self {
        Self {
            quiet: false,
            feas_tol: 1e-4,
            stage: DcOpfParams {
                quiet: true,
                ..DcOpfParams::default()
            },
        }
    }
}

/// Caller overrides. Unset fields keep the resolved default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParamOverrides {
    pub quiet: Option<bool>,
    pub tol: Option<f64>,
    pub max_iter: Option<u32>,
    pub verbose: Option<bool>,
    pub feas_tol: Option<f64>,
}

impl ParamOverrides {
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = Some(quiet);
        self
    }

    pub fn tol(mut self, tol: f64) -> Self {
        self.tol = Some(tol);
        self
    }

    pub fn max_iter(mut self, max_iter: u32) -> Self {
        self.max_iter = Some(max_iter);
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let overrides: Self = toml::from_str(text)?;
        overrides.validate()?;
        Ok(overrides)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = |name: &'static str, value: Option<f64>| match value {
            Some(v) if !(v.is_finite() && v > 0.0) => Err(ConfigError::Invalid {
                name,
                value: v.to_string(),
                reason: "must be a positive finite number",
            }),
            _ => Ok(()),
        };
        positive("tol", self.tol)?;
        positive("feas_tol", self.feas_tol)?;
        if self.max_iter == Some(0) {
            return Err(ConfigError::Invalid {
                name: "max_iter",
                value: "0".into(),
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

impl QpSolverParams {
    pub fn resolve(overrides: &ParamOverrides) -> Self {
        let mut params = Self::default();
        params.apply(overrides);
        params
    }

    fn apply(&mut self, overrides: &ParamOverrides) {
        if let Some(tol) = overrides.tol {
            self.tol = tol;
        }
        if let Some(max_iter) = overrides.max_iter {
            self.max_iter = max_iter;
        }
        if let Some(verbose) = overrides.verbose {
            self.verbose = verbose;
        }
    }
}

impl DcOpfParams {
    pub fn resolve(overrides: &ParamOverrides) -> Self {
        let mut params = Self::default();
        params.solver.apply(overrides);
        if let Some(quiet) = overrides.quiet {
            params.quiet = quiet;
        }
        params
    }
}

impl MsDcOpfParams {
    /// Solver overrides reach the per-stage solves; `quiet` applies to the
    /// multi-stage method only.
    pub fn resolve(overrides: &ParamOverrides) -> Self {
        let mut params = Self::default();
        params.stage.solver.apply(overrides);
        if let Some(quiet) = overrides.quiet {
            params.quiet = quiet;
        }
        if let Some(feas_tol) = overrides.feas_tol {
            params.feas_tol = feas_tol;
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = DcOpfParams::default();
        assert!(!params.quiet);
        assert_eq!(params.solver.max_iter, 200);

        let ms = MsDcOpfParams::default();
        assert!(ms.stage.quiet);
        assert_eq!(ms.feas_tol, 1e-4);
    }

    #[test]
    fn test_partial_toml() {
        let overrides = ParamOverrides::from_toml_str("quiet = true\ntol = 1e-6\n").unwrap();
        let params = DcOpfParams::resolve(&overrides);
        assert!(params.quiet);
        assert_eq!(params.solver.tol, 1e-6);
        assert_eq!(params.solver.max_iter, QpSolverParams::default().max_iter);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ParamOverrides::from_toml_str("qiet = true").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ParamOverrides::from_toml_str("tol = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "tol", .. }));

        let err = ParamOverrides::from_toml_str("max_iter = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "max_iter", .. }));
    }

    #[test]
    fn test_multi_stage_resolution() {
        let overrides = ParamOverrides::default().quiet(true).max_iter(50);
        let params = MsDcOpfParams::resolve(&overrides);
        assert!(params.quiet);
        assert!(params.stage.quiet);
        assert_eq!(params.stage.solver.max_iter, 50);
    }

    #[test]
    fn test_missing_file() {
        let err = ParamOverrides::load_from(Path::new("/nonexistent/gridopt.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
