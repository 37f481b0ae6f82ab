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

//! The non-configurable core constraints.
//!
//! Phase 1 (timetabling): start uniqueness, start feasibility, occupancy
//! definition, aggregate capacity, unified student conflict. Phase 2
//! (packing): room assignment consistency, hard room capacity, room
//! continuity, and the three invigilator constraints.

use std::collections::BTreeMap;
use std::time::Instant;

use log::warn;

use super::{
    BuildContext, Constraint, ConstraintBuildError, ConstraintDefinition, ConstraintStats,
    Violation,
};
use crate::conflicts::Severity;
use crate::problem::Problem;
use crate::required_invigilators;
use crate::sat::Lit;
use crate::solution::Solution;
use crate::vars::occupancy_window;

/// Every exam starts exactly once.
pub struct StartUniqueness {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl StartUniqueness {
    pub fn new(definition: ConstraintDefinition) -> Self {
        StartUniqueness {
            definition,
            stats: ConstraintStats::default(),
        }
    }
}

impl Constraint for StartUniqueness {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let mut count = 0;
        for e in 0..ctx.problem.exams().len() {
            let starts: Vec<_> = ctx.vars.x_of_exam(e).iter().map(|(_, v)| *v).collect();
            if starts.is_empty() {
                // An exam without a single viable start makes the whole model
                // infeasible; the empty clause states that directly.
                ctx.model.add_bool_or(&[]);
            } else {
                ctx.model.add_exactly_one(&starts);
            }
            count += 1;
        }
        self.stats = ConstraintStats {
            constraint_count: count,
            build_time: tic.elapsed(),
        };
        Ok(count)
    }

    fn evaluate(&self, problem: &Problem, solution: &Solution) -> Vec<Violation> {
        let mut violations = Vec::new();
        for exam in problem.exams() {
            let assigned = solution
                .assignment_for(exam.id)
                .map(|a| a.is_assigned())
                .unwrap_or(false);
            if !assigned {
                violations.push(Violation {
                    constraint: self.definition.id,
                    severity: Severity::Critical,
                    affected_exams: vec![exam.id],
                    penalty: 1.0,
                    description: format!("exam {} has no start slot", exam.course_code),
                });
            }
        }
        violations
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}

/// No exam starts where its occupancy window cannot fit or where its
/// restrictions forbid it, and prerequisite exams start no later than their
/// dependents. The variable factory prunes invalid starts already; this
/// module blocks any stray start variable that slipped through and encodes
/// the precedence ordering between start pairs.
pub struct StartFeasibility {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl StartFeasibility {
    pub fn new(definition: ConstraintDefinition) -> Self {
        StartFeasibility {
            definition,
            stats: ConstraintStats::default(),
        }
    }
}

impl Constraint for StartFeasibility {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let mut count = 0;
        for ((e, s), var) in &ctx.vars.x {
            let exam = &ctx.problem.exams()[*e];
            let morning_violation =
                exam.morning_only && ctx.problem.timeslots()[*s].slot_index != 0;
            let window_violation = occupancy_window(ctx.problem, *e, *s).is_none();
            if morning_violation || window_violation {
                ctx.model.add_bool_or(&[Lit::neg(*var)]);
                count += 1;
            }
        }

        // Prerequisites start no later than their dependents: forbid every
        // start pair that would invert the chronological order.
        let indices = ctx.problem.indices();
        for e in 0..ctx.problem.exams().len() {
            for p in &indices.prerequisites[e] {
                for (s_dep, x_dep) in ctx.vars.x_of_exam(e) {
                    for (s_pre, x_pre) in ctx.vars.x_of_exam(*p) {
                        if indices.slot_order[s_pre] > indices.slot_order[s_dep] {
                            ctx.model.add_bool_or(&[Lit::neg(x_dep), Lit::neg(x_pre)]);
                            count += 1;
                        }
                    }
                }
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
            let e = match problem.exam_idx(assignment.exam_id) {
                Some(e) => e,
                None => continue,
            };
            let s = match assignment.slot_id.and_then(|id| problem.slot_idx(id)) {
                Some(s) => s,
                None => continue,
            };
            let exam = &problem.exams()[e];
            if exam.morning_only && problem.timeslots()[s].slot_index != 0 {
                violations.push(Violation {
                    constraint: self.definition.id,
                    severity: Severity::Critical,
                    affected_exams: vec![exam.id],
                    penalty: 1.0,
                    description: format!(
                        "morning-only exam {} starts in slot {}",
                        exam.course_code, problem.timeslots()[s].slot_index
                    ),
                });
            }
            if occupancy_window(problem, e, s).is_none() {
                violations.push(Violation {
                    constraint: self.definition.id,
                    severity: Severity::Critical,
                    affected_exams: vec![exam.id],
                    penalty: 1.0,
                    description: format!(
                        "exam {} spills past the end of its day",
                        exam.course_code
                    ),
                });
            }
        }

        let indices = problem.indices();
        let mut starts: BTreeMap<usize, u32> = BTreeMap::new();
        for assignment in &solution.assignments {
            if let (Some(e), Some(s)) = (
                problem.exam_idx(assignment.exam_id),
                assignment.slot_id.and_then(|id| problem.slot_idx(id)),
            ) {
                starts.insert(e, indices.slot_order[s]);
            }
        }
        for e in 0..problem.exams().len() {
            for p in &indices.prerequisites[e] {
                if let (Some(dep), Some(pre)) = (starts.get(&e), starts.get(p)) {
                    if pre > dep {
                        violations.push(Violation {
                            constraint: self.definition.id,
                            severity: Severity::Critical,
                            affected_exams: vec![
                                problem.exams()[*p].id,
                                problem.exams()[e].id,
                            ],
                            penalty: 1.0,
                            description: format!(
                                "prerequisite {} starts after {}",
                                problem.exams()[*p].course_code,
                                problem.exams()[e].course_code
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

/// Links starts to occupancy: a start implies occupancy of every slot in the
/// window, and occupancy requires a covering start.
pub struct OccupancyDefinition {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl OccupancyDefinition {
    pub fn new(definition: ConstraintDefinition) -> Self {
        OccupancyDefinition {
            definition,
            stats: ConstraintStats::default(),
        }
    }
}

impl Constraint for OccupancyDefinition {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let mut count = 0;
        for e in 0..ctx.problem.exams().len() {
            if ctx.problem.slots_needed(e) == 1 {
                // z and x are the same variables.
                continue;
            }
            // Start implies occupancy over the whole window.
            let mut covering: BTreeMap<usize, Vec<Lit>> = BTreeMap::new();
            for (s, x_var) in ctx.vars.x_of_exam(e) {
                let window = occupancy_window(ctx.problem, e, s)
                    .expect("start candidates always have a window");
                for s_prime in window {
                    let z_var = ctx.vars.z[&(e, s_prime)];
                    ctx.model.add_implication(Lit::pos(x_var), Lit::pos(z_var));
                    count += 1;
                    covering.entry(s_prime).or_default().push(Lit::pos(x_var));
                }
            }
            // Occupancy requires a covering start.
            for ((ze, zs), z_var) in &ctx.vars.z {
                if *ze != e {
                    continue;
                }
                let mut clause = vec![Lit::neg(*z_var)];
                clause.extend(covering.get(zs).cloned().unwrap_or_default());
                ctx.model.add_bool_or(&clause);
                count += 1;
            }
        }
        self.stats = ConstraintStats {
            constraint_count: count,
            build_time: tic.elapsed(),
        };
        Ok(count)
    }

    fn evaluate(&self, _problem: &Problem, _solution: &Solution) -> Vec<Violation> {
        // Occupancy is definitional; its violations surface through the
        // student-conflict and capacity checks.
        Vec::new()
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}

/// Per slot, the expected headcount of all occupying exams must fit the
/// total exam capacity of the room stock. A coarse relaxation that prunes
/// hopeless timetables before packing.
pub struct AggregateCapacity {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl AggregateCapacity {
    pub fn new(definition: ConstraintDefinition) -> Self {
        AggregateCapacity {
            definition,
            stats: ConstraintStats::default(),
        }
    }
}

impl Constraint for AggregateCapacity {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let total_capacity: i64 = ctx
            .problem
            .rooms()
            .iter()
            .map(|r| i64::from(r.exam_capacity()))
            .sum();
        let mut count = 0;
        for s in 0..ctx.problem.timeslots().len() {
            let terms: Vec<_> = ctx
                .vars
                .z
                .iter()
                .filter(|((_, zs), _)| *zs == s)
                .map(|((e, _), var)| {
                    (i64::from(ctx.problem.exams()[*e].expected_students), *var)
                })
                .collect();
            if terms.is_empty() {
                continue;
            }
            ctx.model.add_linear_le(&terms, total_capacity);
            count += 1;
        }
        self.stats = ConstraintStats {
            constraint_count: count,
            build_time: tic.elapsed(),
        };
        Ok(count)
    }

    fn evaluate(&self, _problem: &Problem, _solution: &Solution) -> Vec<Violation> {
        // The hard per-room check supersedes this relaxation on finished
        // solutions.
        Vec::new()
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}

/// Exams sharing a normally-registered student never overlap.
pub struct UnifiedStudentConflict {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl UnifiedStudentConflict {
    pub fn new(definition: ConstraintDefinition) -> Self {
        UnifiedStudentConflict {
            definition,
            stats: ConstraintStats::default(),
        }
    }
}

impl Constraint for UnifiedStudentConflict {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let mut count = 0;
        for (e1, e2) in &ctx.problem.indices().conflict_pairs {
            for s in 0..ctx.problem.timeslots().len() {
                if let (Some(z1), Some(z2)) =
                    (ctx.vars.z.get(&(*e1, s)), ctx.vars.z.get(&(*e2, s)))
                {
                    ctx.model.add_bool_or(&[Lit::neg(*z1), Lit::neg(*z2)]);
                    count += 1;
                }
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
                let window = occupancy_window(problem, e, s).unwrap_or_else(|| vec![s]);
                occupied.insert(e, window);
            }
        }
        let mut violations = Vec::new();
        for (e1, e2) in &indices.conflict_pairs {
            if let (Some(w1), Some(w2)) = (occupied.get(e1), occupied.get(e2)) {
                if w1.iter().any(|s| w2.contains(s)) {
                    violations.push(Violation {
                        constraint: self.definition.id,
                        severity: Severity::Critical,
                        affected_exams: vec![
                            problem.exams()[*e1].id,
                            problem.exams()[*e2].id,
                        ],
                        penalty: 1.0,
                        description: format!(
                            "{} and {} overlap with shared normal registrations",
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

/// Room usage implies occupancy, every occupied slot has at least one room,
/// and allocated seats cover the expected headcount.
pub struct RoomAssignmentConsistency {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl RoomAssignmentConsistency {
    pub fn new(definition: ConstraintDefinition) -> Self {
        RoomAssignmentConsistency {
            definition,
            stats: ConstraintStats::default(),
        }
    }
}

impl Constraint for RoomAssignmentConsistency {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let mut count = 0;

        for ((e, _r, s), y_var) in &ctx.vars.y {
            let z_var = ctx.vars.z[&(*e, *s)];
            ctx.model.add_implication(Lit::pos(*y_var), Lit::pos(z_var));
            count += 1;
        }

        for ((e, s), z_var) in &ctx.vars.z {
            let ys: Vec<_> = ctx
                .vars
                .y
                .range((*e, 0, 0)..(*e + 1, 0, 0))
                .filter(|((_, _, ys), _)| ys == s)
                .map(|((_, r, _), var)| (*r, *var))
                .collect();
            // At least one room when the slot is occupied.
            let mut clause = vec![Lit::neg(*z_var)];
            clause.extend(ys.iter().map(|(_, var)| Lit::pos(*var)));
            ctx.model.add_bool_or(&clause);
            count += 1;

            // Allocated seats cover the expected students.
            let expected = i64::from(ctx.problem.exams()[*e].expected_students);
            if expected > 0 && !ys.is_empty() {
                let mut terms: Vec<(i64, crate::sat::VarId)> = vec![(expected, *z_var)];
                for (r, var) in &ys {
                    terms.push((-i64::from(ctx.problem.allocation(*e, *r)), *var));
                }
                ctx.model.add_linear_le(&terms, 0);
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
            if !assignment.is_assigned() {
                continue;
            }
            let e = match problem.exam_idx(assignment.exam_id) {
                Some(e) => e,
                None => continue,
            };
            let exam = &problem.exams()[e];
            let seats: u32 = assignment.room_allocations.iter().sum();
            if seats < exam.expected_students {
                violations.push(Violation {
                    constraint: self.definition.id,
                    severity: Severity::High,
                    affected_exams: vec![exam.id],
                    penalty: 1.0,
                    description: format!(
                        "exam {} has {} seats for {} students",
                        exam.course_code, seats, exam.expected_students
                    ),
                });
            }
        }
        violations
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}

/// Per room and slot, allocated seats stay within the exam capacity.
pub struct RoomCapacityHard {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl RoomCapacityHard {
    pub fn new(definition: ConstraintDefinition) -> Self {
        RoomCapacityHard {
            definition,
            stats: ConstraintStats::default(),
        }
    }
}

impl Constraint for RoomCapacityHard {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let mut per_room_slot: BTreeMap<(usize, usize), Vec<(i64, crate::sat::VarId)>> =
            BTreeMap::new();
        for ((e, r, s), var) in &ctx.vars.y {
            per_room_slot
                .entry((*r, *s))
                .or_default()
                .push((i64::from(ctx.problem.allocation(*e, *r)), *var));
        }
        let mut count = 0;
        for ((r, _s), terms) in &per_room_slot {
            ctx.model
                .add_linear_le(terms, i64::from(ctx.problem.rooms()[*r].exam_capacity()));
            count += 1;
        }
        self.stats = ConstraintStats {
            constraint_count: count,
            build_time: tic.elapsed(),
        };
        Ok(count)
    }

    fn evaluate(&self, problem: &Problem, solution: &Solution) -> Vec<Violation> {
        let mut usage: BTreeMap<(usize, usize), u32> = BTreeMap::new();
        for assignment in &solution.assignments {
            let s = match assignment.slot_id.and_then(|id| problem.slot_idx(id)) {
                Some(s) => s,
                None => continue,
            };
            for (room_id, seats) in assignment.room_ids.iter().zip(&assignment.room_allocations)
            {
                if let Some(r) = problem.room_idx(*room_id) {
                    *usage.entry((r, s)).or_insert(0) += seats;
                }
            }
        }
        let mut violations = Vec::new();
        for ((r, _s), seats) in usage {
            let room = &problem.rooms()[r];
            if seats > room.exam_capacity() {
                violations.push(Violation {
                    constraint: self.definition.id,
                    severity: Severity::High,
                    affected_exams: Vec::new(),
                    penalty: 1.0,
                    description: format!(
                        "room {} overloaded: {} > {}",
                        room.code,
                        seats,
                        room.exam_capacity()
                    ),
                });
            }
        }
        violations
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}

/// Multi-slot exams keep the same rooms across their whole window.
pub struct RoomContinuity {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl RoomContinuity {
    pub fn new(definition: ConstraintDefinition) -> Self {
        RoomContinuity {
            definition,
            stats: ConstraintStats::default(),
        }
    }
}

impl Constraint for RoomContinuity {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let mut count = 0;
        for e in 0..ctx.problem.exams().len() {
            if ctx.problem.slots_needed(e) == 1 {
                continue;
            }
            for (s0, x_var) in ctx.vars.x_of_exam(e) {
                let window = occupancy_window(ctx.problem, e, s0)
                    .expect("start candidates always have a window");
                for r in 0..ctx.problem.rooms().len() {
                    let head = match ctx.vars.y.get(&(e, r, s0)) {
                        Some(var) => *var,
                        None => continue,
                    };
                    for s_prime in window.iter().skip(1) {
                        match ctx.vars.y.get(&(e, r, *s_prime)) {
                            Some(tail) => {
                                // Starting here with this room carries the
                                // room through the window.
                                ctx.model.add_bool_or(&[
                                    Lit::neg(x_var),
                                    Lit::neg(head),
                                    Lit::pos(*tail),
                                ]);
                            }
                            None => {
                                // The room is unavailable later in the
                                // window, so it cannot be used at the start.
                                ctx.model
                                    .add_bool_or(&[Lit::neg(x_var), Lit::neg(head)]);
                            }
                        }
                        count += 1;
                    }
                }
            }
        }
        self.stats = ConstraintStats {
            constraint_count: count,
            build_time: tic.elapsed(),
        };
        Ok(count)
    }

    fn evaluate(&self, _problem: &Problem, _solution: &Solution) -> Vec<Violation> {
        // The extraction path reads rooms from the start slot, so a finished
        // solution cannot express a discontinuity.
        Vec::new()
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}

/// Every used room is supervised, and every exam meets its invigilator
/// requirement at the start slot.
pub struct InvigilatorRequirement {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl InvigilatorRequirement {
    pub fn new(definition: ConstraintDefinition) -> Self {
        InvigilatorRequirement {
            definition,
            stats: ConstraintStats::default(),
        }
    }
}

impl Constraint for InvigilatorRequirement {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        if !ctx.problem.has_invigilators() {
            warn!("no eligible invigilators; supervision constraints skipped");
            self.stats = ConstraintStats {
                constraint_count: 0,
                build_time: tic.elapsed(),
            };
            return Ok(0);
        }
        let eligible = ctx
            .problem
            .invigilators()
            .iter()
            .filter(|i| i.can_invigilate)
            .count();

        let mut count = 0;
        // At least one supervisor per used room-slot.
        for ((e, r, s), y_var) in &ctx.vars.y {
            let us: Vec<_> = ctx
                .vars
                .u
                .iter()
                .filter(|((_, ue, ur, us), _)| ue == e && ur == r && us == s)
                .map(|(_, var)| *var)
                .collect();
            let mut terms: Vec<(i64, crate::sat::VarId)> = vec![(1, *y_var)];
            for u_var in &us {
                terms.push((-1, *u_var));
            }
            ctx.model.add_linear_le(&terms, 0);
            count += 1;
        }

        // Total supervisors at the chosen start meet the exam's requirement.
        for e in 0..ctx.problem.exams().len() {
            let exam = &ctx.problem.exams()[e];
            let required = i64::from(required_invigilators(exam)).min(eligible as i64);
            for (s0, x_var) in ctx.vars.x_of_exam(e) {
                let us: Vec<_> = ctx
                    .vars
                    .u
                    .iter()
                    .filter(|((_, ue, _, us), _)| *ue == e && *us == s0)
                    .map(|(_, var)| *var)
                    .collect();
                if us.is_empty() {
                    continue;
                }
                let mut terms: Vec<(i64, crate::sat::VarId)> = vec![(required, x_var)];
                for u_var in &us {
                    terms.push((-1, *u_var));
                }
                ctx.model.add_linear_le(&terms, 0);
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
        if !problem.has_invigilators() {
            return Vec::new();
        }
        let eligible = problem
            .invigilators()
            .iter()
            .filter(|i| i.can_invigilate)
            .count();
        let mut violations = Vec::new();
        for assignment in &solution.assignments {
            if !assignment.is_assigned() {
                continue;
            }
            let e = match problem.exam_idx(assignment.exam_id) {
                Some(e) => e,
                None => continue,
            };
            let exam = &problem.exams()[e];
            let required = (required_invigilators(exam) as usize).min(eligible);
            if assignment.invigilator_ids.len() < required {
                violations.push(Violation {
                    constraint: self.definition.id,
                    severity: Severity::High,
                    affected_exams: vec![exam.id],
                    penalty: 1.0,
                    description: format!(
                        "exam {} has {} invigilators, needs {}",
                        exam.course_code,
                        assignment.invigilator_ids.len(),
                        required
                    ),
                });
            }
        }
        violations
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}

/// An invigilator covers at most their concurrent-exam limit per slot.
pub struct InvigilatorSinglePresence {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl InvigilatorSinglePresence {
    pub fn new(definition: ConstraintDefinition) -> Self {
        InvigilatorSinglePresence {
            definition,
            stats: ConstraintStats::default(),
        }
    }
}

impl Constraint for InvigilatorSinglePresence {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let mut per_inv_slot: BTreeMap<(usize, usize), Vec<(i64, crate::sat::VarId)>> =
            BTreeMap::new();
        for ((i, _e, _r, s), var) in &ctx.vars.u {
            per_inv_slot.entry((*i, *s)).or_default().push((1, *var));
        }
        let mut count = 0;
        for ((i, _s), terms) in &per_inv_slot {
            let limit = i64::from(ctx.problem.invigilators()[*i].max_concurrent_exams);
            ctx.model.add_linear_le(terms, limit);
            count += 1;
        }
        self.stats = ConstraintStats {
            constraint_count: count,
            build_time: tic.elapsed(),
        };
        Ok(count)
    }

    fn evaluate(&self, problem: &Problem, solution: &Solution) -> Vec<Violation> {
        let mut duty: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        for assignment in &solution.assignments {
            let s = match assignment.slot_id.and_then(|id| problem.slot_idx(id)) {
                Some(s) => s,
                None => continue,
            };
            for inv_id in &assignment.invigilator_ids {
                if let Some(i) = problem.invigilator_idx(*inv_id) {
                    *duty.entry((i, s)).or_insert(0) += 1;
                }
            }
        }
        let mut violations = Vec::new();
        for ((i, _s), exams) in duty {
            let invigilator = &problem.invigilators()[i];
            if exams as u32 > invigilator.max_concurrent_exams {
                violations.push(Violation {
                    constraint: self.definition.id,
                    severity: Severity::High,
                    affected_exams: Vec::new(),
                    penalty: 1.0,
                    description: format!(
                        "invigilator {} covers {} exams in one slot",
                        invigilator.id, exams
                    ),
                });
            }
        }
        violations
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}

/// Multi-slot exams keep the same invigilators across their window.
pub struct InvigilatorContinuity {
    definition: ConstraintDefinition,
    stats: ConstraintStats,
}

impl InvigilatorContinuity {
    pub fn new(definition: ConstraintDefinition) -> Self {
        InvigilatorContinuity {
            definition,
            stats: ConstraintStats::default(),
        }
    }
}

impl Constraint for InvigilatorContinuity {
    fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError> {
        let tic = Instant::now();
        let mut count = 0;
        for e in 0..ctx.problem.exams().len() {
            if ctx.problem.slots_needed(e) == 1 {
                continue;
            }
            for (s0, x_var) in ctx.vars.x_of_exam(e) {
                let window = occupancy_window(ctx.problem, e, s0)
                    .expect("start candidates always have a window");
                let heads: Vec<((usize, usize), crate::sat::VarId)> = ctx
                    .vars
                    .u
                    .iter()
                    .filter(|((_, ue, _, us), _)| *ue == e && *us == s0)
                    .map(|((i, _, r, _), var)| ((*i, *r), *var))
                    .collect();
                for ((i, r), head) in heads {
                    for s_prime in window.iter().skip(1) {
                        match ctx.vars.u.get(&(i, e, r, *s_prime)) {
                            Some(tail) => {
                                ctx.model.add_bool_or(&[
                                    Lit::neg(x_var),
                                    Lit::neg(head),
                                    Lit::pos(*tail),
                                ]);
                            }
                            None => {
                                ctx.model
                                    .add_bool_or(&[Lit::neg(x_var), Lit::neg(head)]);
                            }
                        }
                        count += 1;
                    }
                }
            }
        }
        self.stats = ConstraintStats {
            constraint_count: count,
            build_time: tic.elapsed(),
        };
        Ok(count)
    }

    fn evaluate(&self, _problem: &Problem, _solution: &Solution) -> Vec<Violation> {
        Vec::new()
    }

    fn statistics(&self) -> ConstraintStats {
        self.stats
    }
}
