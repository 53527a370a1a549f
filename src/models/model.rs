//! Typed model specification and design rows.
//!
//! The fitter relies on two primitive operations:
//! - build the fixed-effect design row `x` for an observation's condition
//! - build the random-effect design row `z` for the same observation
//!
//! Both depend only on the condition index, because the grouping factor
//! (time offset) selects *which* random effects apply, not the row values.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Population-level terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixedTerm {
    Intercept,
    /// Treatment contrasts against condition 0 (one column per extra level).
    Condition,
}

/// Terms that vary by group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RandomTerm {
    Intercept,
    Condition,
}

/// The factor that defines random-effect groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingFactor {
    TimeOffset,
}

/// Shorthand for the random part, used by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RandomStructure {
    /// `(1 | time)`
    Intercept,
    /// `(0 + condition | time)`
    Slope,
    /// `(1 + condition | time)`
    Full,
}

/// `amplitude ~ fixed + (random | group)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub fixed: Vec<FixedTerm>,
    pub random: Vec<RandomTerm>,
    pub group: GroupingFactor,
}

impl Default for ModelSpec {
    /// `amplitude ~ 1 + condition + (1 + condition | time)`
    fn default() -> Self {
        Self::with_random(RandomStructure::Full)
    }
}

impl ModelSpec {
    pub fn with_random(structure: RandomStructure) -> Self {
        let random = match structure {
            RandomStructure::Intercept => vec![RandomTerm::Intercept],
            RandomStructure::Slope => vec![RandomTerm::Condition],
            RandomStructure::Full => vec![RandomTerm::Intercept, RandomTerm::Condition],
        };
        Self {
            fixed: vec![FixedTerm::Intercept, FixedTerm::Condition],
            random,
            group: GroupingFactor::TimeOffset,
        }
    }

    /// Check the model against the number of conditions in the data.
    pub fn validate(&self, n_conditions: usize) -> Result<(), AppError> {
        if self.fixed.is_empty() {
            return Err(AppError::config("Model needs at least one fixed term."));
        }
        if self.random.is_empty() {
            return Err(AppError::config("Model needs at least one random term."));
        }
        for (i, term) in self.fixed.iter().enumerate() {
            if self.fixed[..i].contains(term) {
                return Err(AppError::config(format!("Duplicate fixed term {term:?}.")));
            }
        }
        for (i, term) in self.random.iter().enumerate() {
            if self.random[..i].contains(term) {
                return Err(AppError::config(format!("Duplicate random term {term:?}.")));
            }
        }
        let uses_condition =
            self.fixed.contains(&FixedTerm::Condition) || self.random.contains(&RandomTerm::Condition);
        if uses_condition && n_conditions < 2 {
            return Err(AppError::config(format!(
                "Condition terms need at least two conditions (found {n_conditions})."
            )));
        }
        if n_conditions == 0 {
            return Err(AppError::config("No conditions in the observation table."));
        }
        Ok(())
    }

    /// Number of fixed-effect columns.
    pub fn fixed_len(&self, n_conditions: usize) -> usize {
        self.fixed
            .iter()
            .map(|t| match t {
                FixedTerm::Intercept => 1,
                FixedTerm::Condition => n_conditions.saturating_sub(1),
            })
            .sum()
    }

    /// Number of random effects per group.
    pub fn random_len(&self, n_conditions: usize) -> usize {
        self.random
            .iter()
            .map(|t| match t {
                RandomTerm::Intercept => 1,
                RandomTerm::Condition => n_conditions.saturating_sub(1),
            })
            .sum()
    }

    /// Fill the fixed-effect design row for an observation in `condition`.
    ///
    /// # Panics
    /// Panics if `out.len() != self.fixed_len(n_conditions)`.
    pub fn fill_fixed_row(&self, condition: usize, n_conditions: usize, out: &mut [f64]) {
        let mut j = 0;
        for term in &self.fixed {
            match term {
                FixedTerm::Intercept => {
                    out[j] = 1.0;
                    j += 1;
                }
                FixedTerm::Condition => {
                    j = fill_contrasts(condition, n_conditions, out, j);
                }
            }
        }
        assert_eq!(j, out.len(), "fixed design row length mismatch");
    }

    /// Fill the random-effect design row for an observation in `condition`.
    ///
    /// # Panics
    /// Panics if `out.len() != self.random_len(n_conditions)`.
    pub fn fill_random_row(&self, condition: usize, n_conditions: usize, out: &mut [f64]) {
        let mut j = 0;
        for term in &self.random {
            match term {
                RandomTerm::Intercept => {
                    out[j] = 1.0;
                    j += 1;
                }
                RandomTerm::Condition => {
                    j = fill_contrasts(condition, n_conditions, out, j);
                }
            }
        }
        assert_eq!(j, out.len(), "random design row length mismatch");
    }

    pub fn fixed_names(&self, conditions: &[String]) -> Vec<String> {
        term_names(
            self.fixed.iter().map(|t| *t == FixedTerm::Intercept),
            conditions,
        )
    }

    pub fn random_names(&self, conditions: &[String]) -> Vec<String> {
        term_names(
            self.random.iter().map(|t| *t == RandomTerm::Intercept),
            conditions,
        )
    }

    /// Formula string for display only.
    pub fn formula(&self) -> String {
        let fixed = render_terms(self.fixed.iter().map(|t| *t == FixedTerm::Intercept));
        let random = render_terms(self.random.iter().map(|t| *t == RandomTerm::Intercept));
        let group = match self.group {
            GroupingFactor::TimeOffset => "time",
        };
        format!("amplitude ~ {fixed} + ({random} | {group})")
    }
}

fn fill_contrasts(condition: usize, n_conditions: usize, out: &mut [f64], start: usize) -> usize {
    let mut j = start;
    for level in 1..n_conditions {
        out[j] = if condition == level { 1.0 } else { 0.0 };
        j += 1;
    }
    j
}

fn term_names(is_intercept: impl Iterator<Item = bool>, conditions: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for intercept in is_intercept {
        if intercept {
            out.push("(Intercept)".to_string());
        } else {
            for label in conditions.iter().skip(1) {
                out.push(format!("condition{label}"));
            }
        }
    }
    out
}

fn render_terms(is_intercept: impl Iterator<Item = bool>) -> String {
    let terms: Vec<&str> = is_intercept
        .map(|intercept| if intercept { "1" } else { "condition" })
        .collect();
    let has_intercept = terms.contains(&"1");
    let mut s = terms.join(" + ");
    if !has_intercept {
        s = format!("0 + {s}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_formula_matches_maximal_model() {
        let spec = ModelSpec::default();
        assert_eq!(
            spec.formula(),
            "amplitude ~ 1 + condition + (1 + condition | time)"
        );
        assert_eq!(
            ModelSpec::with_random(RandomStructure::Slope).formula(),
            "amplitude ~ 1 + condition + (0 + condition | time)"
        );
    }

    #[test]
    fn design_rows_use_treatment_contrasts() {
        let spec = ModelSpec::default();
        let mut x = vec![0.0; spec.fixed_len(3)];
        spec.fill_fixed_row(2, 3, &mut x);
        assert_eq!(x, vec![1.0, 0.0, 1.0]);

        let mut z = vec![0.0; spec.random_len(3)];
        spec.fill_random_row(0, 3, &mut z);
        assert_eq!(z, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn names_follow_condition_labels() {
        let spec = ModelSpec::default();
        let labels = vec!["aud".to_string(), "vis".to_string()];
        assert_eq!(spec.fixed_names(&labels), vec!["(Intercept)", "conditionvis"]);
    }

    #[test]
    fn condition_terms_need_two_levels() {
        let spec = ModelSpec::default();
        assert!(spec.validate(1).is_err());
        assert!(spec.validate(2).is_ok());

        let intercept_only = ModelSpec {
            fixed: vec![FixedTerm::Intercept],
            random: vec![RandomTerm::Intercept],
            group: GroupingFactor::TimeOffset,
        };
        assert!(intercept_only.validate(1).is_ok());
    }
}
