// Copyright 2026 by the examtt authors
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except in compliance with
// the License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The constraint-model abstraction consumed by the engine.
//!
//! The engine never talks to a concrete SAT/CP solver; it builds models
//! against the [`ConstraintModel`] trait and interprets the returned
//! [`SolveStatus`]. The `search` submodule provides a compact reference
//! backend so the engine runs stand-alone; a production deployment plugs a
//! CP-SAT process in behind the same trait.

use thiserror::Error;

pub mod search;

/// Handle of a boolean model variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u32);

/// A possibly negated variable, for clause constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lit {
    pub var: VarId,
    pub positive: bool,
}

impl Lit {
    pub fn pos(var: VarId) -> Lit {
        Lit {
            var,
            positive: true,
        }
    }

    pub fn neg(var: VarId) -> Lit {
        Lit {
            var,
            positive: false,
        }
    }
}

/// Backend solve status, mirroring the usual CP-SAT statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    Unknown,
}

/// Result of a backend solve: status, a (possibly empty) assignment and the
/// objective value when an objective was set.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// Value per variable, indexed by `VarId`. Empty unless status is
    /// `Optimal` or `Feasible`.
    pub assignment: Vec<bool>,
    pub objective: Option<i64>,
}

impl SolveOutcome {
    pub fn value(&self, var: VarId) -> bool {
        self.assignment[var.0 as usize]
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend rejected the model: {0}")]
    Rejected(String),
}

/// Interface of a SAT/CP backend.
///
/// All constraint forms are over boolean variables; linear terms carry `i64`
/// coefficients. Implementations must be deterministic for a fixed model and
/// hint sequence.
pub trait ConstraintModel {
    /// Create a fresh boolean variable. The name is diagnostic only.
    fn new_bool(&mut self, name: &str) -> VarId;

    fn num_vars(&self) -> usize;

    /// `sum(coef * var) <= bound`.
    fn add_linear_le(&mut self, terms: &[(i64, VarId)], bound: i64);

    /// `sum(coef * var) == rhs`.
    fn add_linear_eq(&mut self, terms: &[(i64, VarId)], rhs: i64);

    /// At least one literal is true.
    fn add_bool_or(&mut self, lits: &[Lit]);

    /// `antecedent == true` forces `consequent == true`.
    fn add_implication(&mut self, antecedent: Lit, consequent: Lit);

    /// Exactly one of the variables is true.
    fn add_exactly_one(&mut self, vars: &[VarId]);

    /// Suggest a start value for the search. Hints are advisory.
    fn set_hint(&mut self, var: VarId, value: bool);

    fn maximize(&mut self, terms: &[(i64, VarId)]);

    fn minimize(&mut self, terms: &[(i64, VarId)]);

    /// Run the search for up to `time_limit_s` seconds.
    fn solve(&mut self, time_limit_s: u32) -> Result<SolveOutcome, BackendError>;
}
