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

//! Reference implementation of [`ConstraintModel`]: a deterministic DPLL-style
//! backtracking search with unit and bound propagation, plus branch-and-bound
//! on the linear objective.
//!
//! This backend exists so the engine can run and be tested without an external
//! solver. It is adequate for the model sizes the front-filter produces in
//! tests and small sessions; large deployments should plug in CP-SAT.

use std::time::{Duration, Instant};

use log::debug;

use super::{BackendError, ConstraintModel, Lit, SolveOutcome, SolveStatus, VarId};

/// Two-sided linear constraint `lo <= sum(coef * var) <= hi`.
struct Linear {
    terms: Vec<(i64, VarId)>,
    lo: i64,
    hi: i64,
}

pub struct SearchModel {
    names: Vec<String>,
    hints: Vec<Option<bool>>,
    /// Variables in the order their hints were set; searched first.
    hint_order: Vec<VarId>,
    clauses: Vec<Vec<Lit>>,
    linears: Vec<Linear>,
    /// Objective in maximize form; `minimize` negates its terms.
    objective: Vec<(i64, VarId)>,
    has_objective: bool,
    /// Decisions explored before the search gives up. Checked alongside the
    /// wall-clock limit.
    node_limit: u64,
}

impl SearchModel {
    pub fn new() -> Self {
        SearchModel {
            names: Vec::new(),
            hints: Vec::new(),
            hint_order: Vec::new(),
            clauses: Vec::new(),
            linears: Vec::new(),
            objective: Vec::new(),
            has_objective: false,
            node_limit: 2_000_000,
        }
    }

    pub fn with_node_limit(mut self, node_limit: u64) -> Self {
        self.node_limit = node_limit;
        self
    }
}

impl Default for SearchModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintModel for SearchModel {
    fn new_bool(&mut self, name: &str) -> VarId {
        let id = VarId(self.names.len() as u32);
        self.names.push(name.to_owned());
        self.hints.push(None);
        id
    }

    fn num_vars(&self) -> usize {
        self.names.len()
    }

    fn add_linear_le(&mut self, terms: &[(i64, VarId)], bound: i64) {
        self.linears.push(Linear {
            terms: terms.to_vec(),
            lo: i64::MIN,
            hi: bound,
        });
    }

    fn add_linear_eq(&mut self, terms: &[(i64, VarId)], rhs: i64) {
        self.linears.push(Linear {
            terms: terms.to_vec(),
            lo: rhs,
            hi: rhs,
        });
    }

    fn add_bool_or(&mut self, lits: &[Lit]) {
        self.clauses.push(lits.to_vec());
    }

    fn add_implication(&mut self, antecedent: Lit, consequent: Lit) {
        // a -> b  ==  !a v b
        self.clauses.push(vec![
            Lit {
                var: antecedent.var,
                positive: !antecedent.positive,
            },
            consequent,
        ]);
    }

    fn add_exactly_one(&mut self, vars: &[VarId]) {
        let terms: Vec<(i64, VarId)> = vars.iter().map(|v| (1, *v)).collect();
        self.add_linear_eq(&terms, 1);
    }

    fn set_hint(&mut self, var: VarId, value: bool) {
        if self.hints[var.0 as usize].is_none() {
            self.hint_order.push(var);
        }
        self.hints[var.0 as usize] = Some(value);
    }

    fn maximize(&mut self, terms: &[(i64, VarId)]) {
        self.objective = terms.to_vec();
        self.has_objective = true;
    }

    fn minimize(&mut self, terms: &[(i64, VarId)]) {
        self.objective = terms.iter().map(|(c, v)| (-c, *v)).collect();
        self.has_objective = true;
    }

    fn solve(&mut self, time_limit_s: u32) -> Result<SolveOutcome, BackendError> {
        for linear in &self.linears {
            if linear.terms.is_empty() && (linear.lo > 0 || linear.hi < 0) {
                return Err(BackendError::Rejected(
                    "empty linear constraint with unsatisfiable bounds".into(),
                ));
            }
        }

        let mut searcher = Searcher::new(
            self.names.len(),
            &self.clauses,
            &self.linears,
            &self.objective,
            self.has_objective,
            &self.hints,
            &self.hint_order,
        );
        let outcome = searcher.run(Duration::from_secs(u64::from(time_limit_s)), self.node_limit);
        debug!(
            "search finished: status {:?}, {} decisions, objective {:?}",
            outcome.status, searcher.decisions, outcome.objective
        );
        Ok(outcome)
    }
}

/// Assignment state per variable.
const UNASSIGNED: i8 = -1;

struct Searcher<'a> {
    clauses: &'a [Vec<Lit>],
    linears: &'a [Linear],
    objective: &'a [(i64, VarId)],
    has_objective: bool,
    hints: &'a [Option<bool>],

    /// -1 unassigned, 0 false, 1 true.
    values: Vec<i8>,
    /// Assigned variables in assignment order, for undo.
    trail: Vec<u32>,
    /// One entry per open decision: (trail length before the decision,
    /// decided variable, whether both values were tried).
    decision_stack: Vec<DecisionFrame>,
    /// Constraint indices per variable, built once.
    var_clauses: Vec<Vec<u32>>,
    var_linears: Vec<Vec<u32>>,
    /// Static variable ordering: hinted variables first.
    order: Vec<u32>,

    best: Option<(Vec<bool>, i64)>,
    decisions: u64,
}

struct DecisionFrame {
    trail_len: usize,
    var: u32,
    first_value: bool,
    flipped: bool,
}

impl<'a> Searcher<'a> {
    fn new(
        num_vars: usize,
        clauses: &'a [Vec<Lit>],
        linears: &'a [Linear],
        objective: &'a [(i64, VarId)],
        has_objective: bool,
        hints: &'a [Option<bool>],
        hint_order: &[VarId],
    ) -> Self {
        let mut var_clauses = vec![Vec::new(); num_vars];
        for (ci, clause) in clauses.iter().enumerate() {
            for lit in clause {
                var_clauses[lit.var.0 as usize].push(ci as u32);
            }
        }
        let mut var_linears = vec![Vec::new(); num_vars];
        for (li, linear) in linears.iter().enumerate() {
            for (_, var) in &linear.terms {
                var_linears[var.0 as usize].push(li as u32);
            }
        }

        let mut in_order = vec![false; num_vars];
        let mut order = Vec::with_capacity(num_vars);
        for v in hint_order {
            if !in_order[v.0 as usize] {
                in_order[v.0 as usize] = true;
                order.push(v.0);
            }
        }
        for v in 0..num_vars as u32 {
            if !in_order[v as usize] {
                order.push(v);
            }
        }

        Searcher {
            clauses,
            linears,
            objective,
            has_objective,
            hints,
            values: vec![UNASSIGNED; num_vars],
            trail: Vec::with_capacity(num_vars),
            decision_stack: Vec::new(),
            var_clauses,
            var_linears,
            order,
            best: None,
            decisions: 0,
        }
    }

    fn run(&mut self, time_limit: Duration, node_limit: u64) -> SolveOutcome {
        let started = Instant::now();
        let mut limit_hit = false;

        // Root propagation catches constraints that are unsatisfiable outright.
        if !self.propagate_from(0) {
            return SolveOutcome {
                status: SolveStatus::Infeasible,
                assignment: Vec::new(),
                objective: None,
            };
        }

        'search: loop {
            if self.decisions > node_limit
                || (self.decisions % 1024 == 0 && started.elapsed() > time_limit)
            {
                limit_hit = true;
                break;
            }

            match self.pick_branch_var() {
                None => {
                    // Complete assignment: record it and keep searching for a
                    // better objective (or stop if there is none to improve).
                    let objective = self.objective_value();
                    let better = match &self.best {
                        None => true,
                        Some((_, best_obj)) => objective > *best_obj,
                    };
                    if better {
                        self.best = Some((
                            self.values.iter().map(|v| *v == 1).collect(),
                            objective,
                        ));
                    }
                    if !self.has_objective || !self.backtrack() {
                        break 'search;
                    }
                }
                Some(var) => {
                    self.decisions += 1;
                    let value = self.preferred_value(var);
                    let trail_len = self.trail.len();
                    self.decision_stack.push(DecisionFrame {
                        trail_len,
                        var,
                        first_value: value,
                        flipped: false,
                    });
                    self.assign(var, value);
                    while !self.propagate_from(self.trail.len().saturating_sub(1))
                        || self.bound_pruned()
                    {
                        if !self.backtrack() {
                            break 'search;
                        }
                    }
                }
            }
        }

        match (&self.best, limit_hit) {
            (Some((assignment, objective)), false) => SolveOutcome {
                status: SolveStatus::Optimal,
                assignment: assignment.clone(),
                objective: if self.has_objective {
                    Some(*objective)
                } else {
                    None
                },
            },
            (Some((assignment, objective)), true) => SolveOutcome {
                status: SolveStatus::Feasible,
                assignment: assignment.clone(),
                objective: if self.has_objective {
                    Some(*objective)
                } else {
                    None
                },
            },
            (None, false) => SolveOutcome {
                status: SolveStatus::Infeasible,
                assignment: Vec::new(),
                objective: None,
            },
            (None, true) => SolveOutcome {
                status: SolveStatus::Unknown,
                assignment: Vec::new(),
                objective: None,
            },
        }
    }

    /// Next unassigned variable in the static order.
    fn pick_branch_var(&self) -> Option<u32> {
        self.order
            .iter()
            .copied()
            .find(|v| self.values[*v as usize] == UNASSIGNED)
    }

    fn preferred_value(&self, var: u32) -> bool {
        if let Some(hint) = self.hints[var as usize] {
            return hint;
        }
        // Without a hint, prefer the value the objective rewards; sparse
        // false otherwise.
        self.objective
            .iter()
            .find(|(_, v)| v.0 == var)
            .map(|(c, _)| *c > 0)
            .unwrap_or(false)
    }

    fn assign(&mut self, var: u32, value: bool) {
        debug_assert_eq!(self.values[var as usize], UNASSIGNED);
        self.values[var as usize] = value as i8;
        self.trail.push(var);
    }

    /// Propagate to fixpoint starting at the given trail position. Returns
    /// false on conflict.
    fn propagate_from(&mut self, mut head: usize) -> bool {
        // At the root (empty trail) scan everything once.
        if self.trail.is_empty() {
            for ci in 0..self.clauses.len() {
                match self.check_clause(ci) {
                    ClauseState::Conflict => return false,
                    ClauseState::Unit(lit) => self.assign(lit.var.0, lit.positive),
                    ClauseState::Open => {}
                }
            }
            for li in 0..self.linears.len() {
                match self.check_linear(li) {
                    LinearState::Conflict => return false,
                    LinearState::Forced(forced) => {
                        for (var, value) in forced {
                            if self.values[var as usize] == UNASSIGNED {
                                self.assign(var, value);
                            }
                        }
                    }
                    LinearState::Open => {}
                }
            }
            head = 0;
        }

        while head < self.trail.len() {
            let var = self.trail[head];
            head += 1;

            for i in 0..self.var_clauses[var as usize].len() {
                let ci = self.var_clauses[var as usize][i] as usize;
                match self.check_clause(ci) {
                    ClauseState::Conflict => return false,
                    ClauseState::Unit(lit) => {
                        if self.values[lit.var.0 as usize] == UNASSIGNED {
                            self.assign(lit.var.0, lit.positive);
                        }
                    }
                    ClauseState::Open => {}
                }
            }
            for i in 0..self.var_linears[var as usize].len() {
                let li = self.var_linears[var as usize][i] as usize;
                match self.check_linear(li) {
                    LinearState::Conflict => return false,
                    LinearState::Forced(forced) => {
                        for (fvar, value) in forced {
                            if self.values[fvar as usize] == UNASSIGNED {
                                self.assign(fvar, value);
                            }
                        }
                    }
                    LinearState::Open => {}
                }
            }
        }
        true
    }

    fn check_clause(&self, ci: usize) -> ClauseState {
        let mut unassigned = None;
        let mut open = 0;
        for lit in &self.clauses[ci] {
            match self.values[lit.var.0 as usize] {
                UNASSIGNED => {
                    open += 1;
                    unassigned = Some(*lit);
                }
                v => {
                    if (v == 1) == lit.positive {
                        return ClauseState::Open; // satisfied
                    }
                }
            }
        }
        match (open, unassigned) {
            (0, _) => ClauseState::Conflict,
            (1, Some(lit)) => ClauseState::Unit(lit),
            _ => ClauseState::Open,
        }
    }

    fn check_linear(&self, li: usize) -> LinearState {
        let linear = &self.linears[li];
        let mut fixed = 0i64;
        let mut slack_up = 0i64; // sum of coefficient gains from unassigned vars
        let mut slack_down = 0i64;
        for (coef, var) in &linear.terms {
            match self.values[var.0 as usize] {
                UNASSIGNED => {
                    if *coef > 0 {
                        slack_up += coef;
                    } else {
                        slack_down += coef;
                    }
                }
                1 => fixed += coef,
                _ => {}
            }
        }
        let min_sum = fixed + slack_down;
        let max_sum = fixed + slack_up;
        if min_sum > linear.hi || max_sum < linear.lo {
            return LinearState::Conflict;
        }

        let mut forced = Vec::new();
        for (coef, var) in &linear.terms {
            if self.values[var.0 as usize] != UNASSIGNED {
                continue;
            }
            if *coef > 0 {
                // Setting the variable true raises the minimum sum.
                if min_sum + coef > linear.hi {
                    forced.push((var.0, false));
                }
                // Leaving it false caps the maximum sum.
                else if max_sum - coef < linear.lo {
                    forced.push((var.0, true));
                }
            } else {
                if min_sum - coef > linear.hi {
                    // -coef is positive: forcing false here means the var must
                    // be true to keep the sum low enough.
                    forced.push((var.0, true));
                } else if max_sum + coef < linear.lo {
                    forced.push((var.0, false));
                }
            }
        }
        if forced.is_empty() {
            LinearState::Open
        } else {
            LinearState::Forced(forced)
        }
    }

    /// Whether the optimistic objective bound of the current partial
    /// assignment cannot beat the incumbent.
    fn bound_pruned(&self) -> bool {
        if !self.has_objective {
            return false;
        }
        let best_obj = match &self.best {
            Some((_, obj)) => *obj,
            None => return false,
        };
        let mut bound = 0i64;
        for (coef, var) in self.objective {
            match self.values[var.0 as usize] {
                UNASSIGNED => {
                    if *coef > 0 {
                        bound += coef;
                    }
                }
                1 => bound += coef,
                _ => {}
            }
        }
        bound <= best_obj
    }

    fn objective_value(&self) -> i64 {
        self.objective
            .iter()
            .filter(|(_, var)| self.values[var.0 as usize] == 1)
            .map(|(coef, _)| coef)
            .sum()
    }

    /// Undo to the most recent decision with an untried value; returns false
    /// when the tree is exhausted.
    fn backtrack(&mut self) -> bool {
        loop {
            let frame = match self.decision_stack.pop() {
                None => return false,
                Some(frame) => frame,
            };
            while self.trail.len() > frame.trail_len {
                let var = self.trail.pop().unwrap();
                self.values[var as usize] = UNASSIGNED;
            }
            if !frame.flipped {
                let flipped_value = !frame.first_value;
                self.decision_stack.push(DecisionFrame {
                    trail_len: frame.trail_len,
                    var: frame.var,
                    first_value: frame.first_value,
                    flipped: true,
                });
                self.assign(frame.var, flipped_value);
                if self.propagate_from(self.trail.len() - 1) && !self.bound_pruned() {
                    return true;
                }
                // Conflict on the flipped value as well: unwind this frame too.
                continue;
            }
        }
    }
}

enum ClauseState {
    Open,
    Unit(Lit),
    Conflict,
}

enum LinearState {
    Open,
    Forced(Vec<(u32, bool)>),
    Conflict,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_picks_a_single_variable() {
        let mut model = SearchModel::new();
        let vars: Vec<VarId> = (0..4).map(|i| model.new_bool(&format!("v{}", i))).collect();
        model.add_exactly_one(&vars);
        let outcome = model.solve(10).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        let set: usize = vars.iter().filter(|v| outcome.value(**v)).count();
        assert_eq!(set, 1);
    }

    #[test]
    fn implication_chain_propagates() {
        let mut model = SearchModel::new();
        let a = model.new_bool("a");
        let b = model.new_bool("b");
        let c = model.new_bool("c");
        model.add_implication(Lit::pos(a), Lit::pos(b));
        model.add_implication(Lit::pos(b), Lit::pos(c));
        model.add_bool_or(&[Lit::pos(a)]);
        let outcome = model.solve(10).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert!(outcome.value(a) && outcome.value(b) && outcome.value(c));
    }

    #[test]
    fn contradictory_units_are_infeasible() {
        let mut model = SearchModel::new();
        let a = model.new_bool("a");
        model.add_bool_or(&[Lit::pos(a)]);
        model.add_bool_or(&[Lit::neg(a)]);
        let outcome = model.solve(10).unwrap();
        assert_eq!(outcome.status, SolveStatus::Infeasible);
    }

    #[test]
    fn capacity_style_linear_is_respected() {
        // Three items of sizes 3, 4, 5 into a budget of 7: at most 3+4.
        let mut model = SearchModel::new();
        let items: Vec<VarId> = (0..3).map(|i| model.new_bool(&format!("it{}", i))).collect();
        model.add_linear_le(&[(3, items[0]), (4, items[1]), (5, items[2])], 7);
        model.maximize(&[(3, items[0]), (4, items[1]), (5, items[2])]);
        let outcome = model.solve(10).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_eq!(outcome.objective, Some(7));
        assert!(outcome.value(items[0]) && outcome.value(items[1]));
        assert!(!outcome.value(items[2]));
    }

    #[test]
    fn minimize_negates_the_objective() {
        let mut model = SearchModel::new();
        let a = model.new_bool("a");
        let b = model.new_bool("b");
        model.add_bool_or(&[Lit::pos(a), Lit::pos(b)]);
        model.minimize(&[(1, a), (1, b)]);
        let outcome = model.solve(10).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        // Exactly one of the two should be set.
        assert_eq!(outcome.value(a) as u32 + outcome.value(b) as u32, 1);
    }

    #[test]
    fn hints_steer_the_first_solution() {
        let mut model = SearchModel::new();
        let vars: Vec<VarId> = (0..3).map(|i| model.new_bool(&format!("v{}", i))).collect();
        model.add_exactly_one(&vars);
        model.set_hint(vars[2], true);
        let outcome = model.solve(10).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert!(outcome.value(vars[2]));
    }

    #[test]
    fn identical_models_solve_identically() {
        let build = || {
            let mut model = SearchModel::new();
            let vars: Vec<VarId> = (0..6).map(|i| model.new_bool(&format!("v{}", i))).collect();
            model.add_exactly_one(&vars[0..3]);
            model.add_exactly_one(&vars[3..6]);
            model.add_linear_le(&[(1, vars[0]), (1, vars[3])], 1);
            model
        };
        let a = build().solve(10).unwrap();
        let b = build().solve(10).unwrap();
        assert_eq!(a.assignment, b.assignment);
    }
}
