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

//! Quality metrics over a validated solution.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::WeightConfig;
use crate::problem::Problem;
use crate::solution::Solution;

/// Score components surfaced with every solution. All values are percentages
/// or ratios in `[0, 1]`; `total_score` is the weighted headline number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub total_score: f64,
    pub feasibility_score: f64,
    pub completion_percentage: f64,
    pub room_utilization: f64,
    pub student_satisfaction: f64,
}

/// Compute the quality metrics of a solution against its problem.
pub fn compute(problem: &Problem, solution: &Solution, weights: &WeightConfig) -> QualityMetrics {
    let total_exams = problem.exams().len();

    let completion_percentage = if total_exams == 0 {
        0.0
    } else {
        solution.assigned_count() as f64 / total_exams as f64 * 100.0
    };

    // Violations weighted by severity, capped by the exam count.
    let max_violations = total_exams.max(1) as f64;
    let violations_weighted: f64 = solution
        .conflicts
        .iter()
        .map(|c| c.severity.weight())
        .sum();
    let feasibility_score = 100.0 * (1.0 - (violations_weighted / max_violations).min(1.0));

    let room_utilization = room_utilization(problem, solution);
    let student_satisfaction = student_satisfaction(problem, solution);

    let total_score =
        weights.completion * completion_percentage + weights.feasibility * feasibility_score;

    QualityMetrics {
        total_score,
        feasibility_score,
        completion_percentage,
        room_utilization,
        student_satisfaction,
    }
}

/// Seats in use divided by seats offered, over the room-slots that host at
/// least one exam. 0.0 when nothing is placed.
fn room_utilization(problem: &Problem, solution: &Solution) -> f64 {
    let mut used: HashMap<(usize, usize), u32> = HashMap::new();
    for assignment in &solution.assignments {
        let slot = match assignment.slot_id.and_then(|s| problem.slot_idx(s)) {
            Some(s) => s,
            None => continue,
        };
        for (room_id, seats) in assignment.room_ids.iter().zip(&assignment.room_allocations) {
            if let Some(room) = problem.room_idx(*room_id) {
                *used.entry((room, slot)).or_insert(0) += seats;
            }
        }
    }
    if used.is_empty() {
        return 0.0;
    }
    let mut taken = 0u64;
    let mut offered = 0u64;
    for ((room, _), seats) in &used {
        taken += u64::from(*seats);
        offered += u64::from(problem.rooms()[*room].exam_capacity());
    }
    if offered == 0 {
        0.0
    } else {
        taken as f64 / offered as f64
    }
}

/// Average per-student comfort: same-day exam pairs and evening placements
/// pull the score down. Students without exams are not counted.
fn student_satisfaction(problem: &Problem, solution: &Solution) -> f64 {
    // Student index -> (day index, slot_index) of each scheduled exam.
    let mut per_student: HashMap<usize, Vec<(usize, u8)>> = HashMap::new();
    for assignment in &solution.assignments {
        let exam = match problem.exam_idx(assignment.exam_id) {
            Some(e) => e,
            None => continue,
        };
        let slot = match assignment.slot_id.and_then(|s| problem.slot_idx(s)) {
            Some(s) => s,
            None => continue,
        };
        let day = problem.day_of_slot(slot).index;
        let slot_index = problem.timeslots()[slot].slot_index;
        for student in &problem.indices().students_per_exam[exam] {
            per_student.entry(*student).or_default().push((day, slot_index));
        }
    }
    if per_student.is_empty() {
        return 1.0;
    }

    let mut sum = 0.0;
    for placements in per_student.values() {
        let mut same_day_pairs = 0u32;
        for (i, (d1, _)) in placements.iter().enumerate() {
            for (d2, _) in placements.iter().skip(i + 1) {
                if d1 == d2 {
                    same_day_pairs += 1;
                }
            }
        }
        // Morning and afternoon count as preferred; evenings do not.
        let preferred = placements.iter().filter(|(_, si)| *si < 2).count();
        let preferred_fraction = preferred as f64 / placements.len() as f64;
        let score: f64 =
            1.0 - 0.5 * f64::from(same_day_pairs) - 0.2 * (1.0 - preferred_fraction);
        sum += score.max(0.0);
    }
    sum / per_student.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflicts::{ConflictKind, ConflictReport, Severity};
    use crate::solution::{ExamAssignment, SolutionStatus};
    use assert_float_eq::assert_float_absolute_eq;
    use uuid::Uuid;

    fn empty_problem() -> Problem {
        let mut problem = Problem::new();
        problem.seal();
        problem
    }

    #[test]
    fn empty_solution_scores_zero_completion() {
        let problem = empty_problem();
        let solution = Solution::new(SolutionStatus::Infeasible, Vec::new());
        let metrics = compute(&problem, &solution, &WeightConfig::default());
        assert_float_absolute_eq!(metrics.completion_percentage, 0.0);
        assert_float_absolute_eq!(metrics.room_utilization, 0.0);
    }

    #[test]
    fn violations_reduce_feasibility() {
        let problem = empty_problem();
        let mut solution = Solution::new(
            SolutionStatus::Feasible,
            vec![ExamAssignment::unassigned(crate::ExamId::new())],
        );
        solution.conflicts.push(ConflictReport {
            conflict_id: Uuid::new_v4(),
            kind: ConflictKind::StudentTemporal,
            severity: Severity::Critical,
            affected_exams: Vec::new(),
            affected_resources: Vec::new(),
            description: String::new(),
        });
        let metrics = compute(&problem, &solution, &WeightConfig::default());
        assert!(metrics.feasibility_score < 100.0);
    }

    #[test]
    fn total_score_uses_configured_weights() {
        let problem = empty_problem();
        let solution = Solution::new(SolutionStatus::Feasible, Vec::new());
        let mut weights = WeightConfig::default();
        weights.completion = 1.0;
        weights.feasibility = 0.0;
        let metrics = compute(&problem, &solution, &weights);
        assert_float_absolute_eq!(metrics.total_score, metrics.completion_percentage);
    }
}
