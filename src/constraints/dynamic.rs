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

//! The configurable constraint modules. All of them are soft: they add
//! auxiliary penalty/reward structure and contribute weighted terms to the
//! objective, never hard clauses that could make a model infeasible.

use std::collections::BTreeMap;
use std::time::Instant;

use super::{
    BuildContext, Constraint, ConstraintBuildError, ConstraintDefinition, ConstraintStats,
    Violation,
};
use crate::conflicts::Severity;
use crate::problem::Problem;
use crate::sat::{Lit, VarId};
use crate::solution::Solution;
use crate::vars::occupancy_window;

/// Objective coefficient for a module weight: two decimal digits of
/// precision on an integer scale.
fn weight_coef(weight: f64) -> i64 {
    (weight * 100.0).round() as i64
}

/// Penalizes slots where exams sharing carryover-only students overlap.
/// Overlap stays feasible; it just costs.
pub struct CarryoverPriority {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl CarryoverPriority {
    pub fn new(definition: ConstraintDefinition) -> Self {
        CarryoverPriority {
            definition,
            stats: ConstraintStats::default(),
        }
    }
}

impl Constraint for CarryoverPriority {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let coef = weight_coef(self.definition.weight);
        let mut count = 0;
        for (e1, e2) in &ctx.problem.indices().carryover_pairs {
            for s in 0..ctx.problem.timeslots().len() {
                let (z1, z2) = match (ctx.vars.z.get(&(*e1, s)), ctx.vars.z.get(&(*e2, s))) {
                    (Some(z1), Some(z2)) => (*z1, *z2),
                    _ => continue,
                };
                let overlap = ctx.model.new_bool(&format!("co[{},{},{}]", e1, e2, s));
                // Both occupying the slot switches the penalty variable on.
                ctx.model
                    .add_bool_or(&[Lit::neg(z1), Lit::neg(z2), Lit::pos(overlap)]);
                ctx.objective.push((-coef, overlap));
                count += 1;
            }
        }
        self.stats = ConstraintStats {
            constraint_count: count,
            build_time: tic.elapsed(),
        };
        Ok(count)
    }

    fn evaluate(&self, problem: &Problem, solution: &Solution) -> Vec<Violation> {
        let indices = problem.indices();
        let mut occupied: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for assignment in &solution.assignments {
            if let (Some(e), Some(s)) = (
                problem.exam_idx(assignment.exam_id),
                assignment.slot_id.and_then(|id| problem.slot_idx(id)),
            ) {
                occupied.insert(e, occupancy_window(problem, e, s).unwrap_or_else(|| vec![s]));
            }
        }
        let mut violations = Vec::new();
        for (e1, e2) in &indices.carryover_pairs {
            if let (Some(w1), Some(w2)) = (occupied.get(e1), occupied.get(e2)) {
                if w1.iter().any(|s| w2.contains(s)) {
                    violations.push(Violation {
                        constraint: self.definition.id,
                        severity: Severity::Medium,
                        affected_exams: vec![
                            problem.exams()[*e1].id,
                            problem.exams()[*e2].id,
                        ],
                        penalty: self.definition.weight,
                        description: format!(
                            "{} and {} overlap for carryover students",
                            problem.exams()[*e1].course_code,
                            problem.exams()[*e2].course_code
                        ),
                    });
                }
            }
        }
        violations
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}

/// Spreads exams over the session: slots holding more than their share of
/// exams incur a penalty.
pub struct ExamDistribution {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
    cap: i64,
}

impl ExamDistribution {
    pub fn new(definition: ConstraintDefinition) -> Self {
        ExamDistribution {
            definition,
            stats: ConstraintStats::default(),
            cap: 0,
        }
    }

    fn slot_cap(&self, problem: &Problem) -> i64 {
        let n_exams = problem.exams().len() as i64;
        let n_slots = (problem.timeslots().len() as i64).max(1);
        let fair_share = ((n_exams + n_slots - 1) / n_slots).max(1);
        self.definition.param_i64("slot_cap", fair_share)
    }
}

impl Constraint for ExamDistribution {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn initialize_variables(
        &mut self,
        problem: &Problem,
        _vars: &crate::vars::SharedVariables,
    ) -> Result<(), ConstraintBuildError> {
        self.cap = self.slot_cap(problem);
        Ok(())
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let coef = weight_coef(self.definition.weight);
        let n_exams = ctx.problem.exams().len() as i64;
        let mut count = 0;
        for s in 0..ctx.problem.timeslots().len() {
            let zs: Vec<VarId> = ctx
                .vars
                .z
                .iter()
                .filter(|((_, zs), _)| *zs == s)
                .map(|(_, var)| *var)
                .collect();
            if zs.len() as i64 <= self.cap {
                continue;
            }
            let overload = ctx.model.new_bool(&format!("dist[{}]", s));
            let mut terms: Vec<(i64, VarId)> = zs.iter().map(|z| (1, *z)).collect();
            terms.push((-n_exams, overload));
            ctx.model.add_linear_le(&terms, self.cap);
            ctx.objective.push((-coef, overload));
            count += 1;
        }
        self.stats = ConstraintStats {
            constraint_count: count,
            build_time: tic.elapsed(),
        };
        Ok(count)
    }

    fn evaluate(&self, problem: &Problem, solution: &Solution) -> Vec<Violation> {
        let cap = self.slot_cap(problem);
        let mut per_slot: BTreeMap<usize, usize> = BTreeMap::new();
        for assignment in &solution.assignments {
            if let Some(s) = assignment.slot_id.and_then(|id| problem.slot_idx(id)) {
                *per_slot.entry(s).or_insert(0) += 1;
            }
        }
        per_slot
            .into_iter()
            .filter(|(_, exams)| *exams as i64 > cap)
            .map(|(s, exams)| Violation {
                constraint: self.definition.id,
                severity: Severity::Low,
                affected_exams: Vec::new(),
                penalty: self.definition.weight,
                description: format!("slot {} hosts {} exams (cap {})", s, exams, cap),
            })
            .collect()
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}

/// Penalizes poorly fitting room picks, steering packing toward fewer,
/// fuller rooms.
pub struct RoomUtilization {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl RoomUtilization {
    pub fn new(definition: ConstraintDefinition) -> Self {
        RoomUtilization {
            definition,
            stats: ConstraintStats::default(),
        }
    }
}

impl Constraint for RoomUtilization {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let weight = self.definition.weight;
        let mut count = 0;
        for ((e, r, _s), var) in &ctx.vars.y {
            let allocation = f64::from(ctx.problem.allocation(*e, *r));
            let capacity = f64::from(ctx.problem.rooms()[*r].exam_capacity().max(1));
            let waste = 1.0 - (allocation / capacity).min(1.0);
            let coef = (weight * 20.0 * waste).round() as i64;
            if coef > 0 {
                ctx.objective.push((-coef, *var));
                count += 1;
            }
        }
        self.stats = ConstraintStats {
            constraint_count: count,
            build_time: tic.elapsed(),
        };
        Ok(count)
    }

    fn evaluate(&self, problem: &Problem, solution: &Solution) -> Vec<Violation> {
        let mut violations = Vec::new();
        for assignment in &solution.assignments {
            for (room_id, seats) in assignment.room_ids.iter().zip(&assignment.room_allocations)
            {
                if let Some(r) = problem.room_idx(*room_id) {
                    let capacity = problem.rooms()[r].exam_capacity().max(1);
                    if f64::from(*seats) / f64::from(capacity) < 0.5 {
                        violations.push(Violation {
                            constraint: self.definition.id,
                            severity: Severity::Low,
                            affected_exams: vec![assignment.exam_id],
                            penalty: self.definition.weight,
                            description: format!(
                                "room {} under half full ({}/{})",
                                problem.rooms()[r].code,
                                seats,
                                capacity
                            ),
                        });
                    }
                }
            }
        }
        violations
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}

/// Penalizes invigilators loaded beyond their fair share of duties.
pub struct StaffLoadBalance {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl StaffLoadBalance {
    pub fn new(definition: ConstraintDefinition) -> Self {
        StaffLoadBalance {
            definition,
            stats: ConstraintStats::default(),
        }
    }

    fn duty_target(&self, problem: &Problem) -> i64 {
        let eligible = problem
            .invigilators()
            .iter()
            .filter(|i| i.can_invigilate)
            .count() as i64;
        let n_exams = problem.exams().len() as i64;
        let fair = if eligible == 0 {
            0
        } else {
            (2 * n_exams + eligible - 1) / eligible
        };
        self.definition.param_i64("max_duties", fair.max(2))
    }
}

impl Constraint for StaffLoadBalance {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let coef = weight_coef(self.definition.weight);
        let target = self.duty_target(ctx.problem);
        let mut per_invigilator: BTreeMap<usize, Vec<VarId>> = BTreeMap::new();
        for ((i, _e, _r, _s), var) in &ctx.vars.u {
            per_invigilator.entry(*i).or_default().push(*var);
        }
        let mut count = 0;
        for (i, duties) in per_invigilator {
            if duties.len() as i64 <= target {
                continue;
            }
            let overload = ctx.model.new_bool(&format!("load[{}]", i));
            let mut terms: Vec<(i64, VarId)> = duties.iter().map(|u| (1, *u)).collect();
            terms.push((-(duties.len() as i64), overload));
            ctx.model.add_linear_le(&terms, target);
            ctx.objective.push((-coef, overload));
            count += 1;
        }
        self.stats = ConstraintStats {
            constraint_count: count,
            build_time: tic.elapsed(),
        };
        Ok(count)
    }

    fn evaluate(&self, problem: &Problem, solution: &Solution) -> Vec<Violation> {
        let target = self.duty_target(problem);
        let mut load: BTreeMap<usize, i64> = BTreeMap::new();
        for assignment in &solution.assignments {
            for inv_id in &assignment.invigilator_ids {
                if let Some(i) = problem.invigilator_idx(*inv_id) {
                    *load.entry(i).or_insert(0) += 1;
                }
            }
        }
        load.into_iter()
            .filter(|(_, duties)| *duties > target)
            .map(|(i, duties)| Violation {
                constraint: self.definition.id,
                severity: Severity::Low,
                affected_exams: Vec::new(),
                penalty: self.definition.weight,
                description: format!(
                    "invigilator {} has {} duties (target {})",
                    problem.invigilators()[i].id,
                    duties,
                    target
                ),
            })
            .collect()
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}

/// Rewards starts in the preferred slot of the day (morning by default).
pub struct PreferenceSlots {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl PreferenceSlots {
    pub fn new(definition: ConstraintDefinition) -> Self {
        PreferenceSlots {
            definition,
            stats: ConstraintStats::default(),
        }
    }

    fn preferred_slot(&self) -> u8 {
        self.definition.param_i64("preferred_slot", 0) as u8
    }
}

impl Constraint for PreferenceSlots {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let coef = weight_coef(self.definition.weight);
        let preferred = self.preferred_slot();
        let mut count = 0;
        for ((_e, s), var) in &ctx.vars.x {
            if ctx.problem.timeslots()[*s].slot_index == preferred {
                ctx.objective.push((coef, *var));
                count += 1;
            }
        }
        self.stats = ConstraintStats {
            constraint_count: count,
            build_time: tic.elapsed(),
        };
        Ok(count)
    }

    fn evaluate(&self, problem: &Problem, solution: &Solution) -> Vec<Violation> {
        let mut violations = Vec::new();
        for assignment in &solution.assignments {
            if let Some(s) = assignment.slot_id.and_then(|id| problem.slot_idx(id)) {
                if problem.timeslots()[s].slot_index == 2 {
                    violations.push(Violation {
                        constraint: self.definition.id,
                        severity: Severity::Low,
                        affected_exams: vec![assignment.exam_id],
                        penalty: self.definition.weight,
                        description: "evening slot".to_owned(),
                    });
                }
            }
        }
        violations
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{compile, ConstraintRegistry};
    use crate::io::DatasetBuilder;
    use crate::sat::search::SearchModel;
    use crate::sat::ConstraintModel;
    use crate::vars::{CandidateSpace, RetainedVars, VariableFactory};
    use crate::CourseId;
    use chrono::NaiveDate;

    fn problem_with_carryover_pair() -> crate::problem::Problem {
        let mut builder = DatasetBuilder::new(1, NaiveDate::from_ymd_opt(2026, 4, 13).unwrap());
        let c1 = CourseId::new();
        let c2 = CourseId::new();
        builder.exam("AAA101", c1, 10, 120);
        builder.exam("BBB102", c2, 10, 120);
        let s = builder.student();
        builder.register(s, c1, crate::RegistrationKind::Carryover);
        builder.register(s, c2, crate::RegistrationKind::Carryover);
        builder.room("HALL-A", 40, false);
        builder.invigilator(2);
        let mut problem = crate::problem::Problem::from_dataset(builder.build());
        problem.populate_exam_students().unwrap();
        problem.seal();
        problem
    }

    #[test]
    fn carryover_pairs_stay_soft() {
        let problem = problem_with_carryover_pair();
        assert_eq!(problem.indices().carryover_pairs.len(), 1);
        assert!(problem.indices().conflict_pairs.is_empty());

        let space = CandidateSpace::build(&problem);
        let retained = RetainedVars::full(&problem, &space);
        let factory = VariableFactory::new(&problem, &space);
        let mut model = SearchModel::new();
        let vars = factory.encode(&mut model, &retained, true, 500_000).unwrap();
        let outcome = compile(&mut model, &problem, &vars, true).unwrap();
        assert!(outcome.disabled_modules.is_empty());

        // The model stays satisfiable even though the pair can only avoid
        // overlap by separating; with three slots it will separate.
        let solve = model.solve(10).unwrap();
        assert!(matches!(
            solve.status,
            crate::sat::SolveStatus::Optimal | crate::sat::SolveStatus::Feasible
        ));
    }

    #[test]
    fn registry_weights_flow_into_the_objective() {
        let problem = problem_with_carryover_pair();
        let registry = ConstraintRegistry::with_defaults();
        let definition = registry.get(crate::constraints::CARRYOVER_PRIORITY).unwrap();
        assert_eq!(weight_coef(definition.weight), 100);
    }
}
