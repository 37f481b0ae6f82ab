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

//! Conflict detection over extracted solutions.
//!
//! The detector re-checks a timetable independently of the model: student
//! collisions, room overloads, invigilator double-bookings and precedence
//! violations. Findings are classified by severity and fed back into GA
//! fitness; affected assignments are flagged.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::problem::Problem;
use crate::solution::{AssignmentStatus, Solution};
use crate::vars::occupancy_window;
use crate::{ExamId, RegistrationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used when folding violations into the feasibility score.
    pub fn weight(self) -> f64 {
        match self {
            Severity::Critical => 1.0,
            Severity::High => 0.7,
            Severity::Medium => 0.4,
            Severity::Low => 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    StudentTemporal,
    RoomCapacity,
    InvigilatorCollision,
    PrecedenceViolation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflict_id: Uuid,
    pub kind: ConflictKind,
    pub severity: Severity,
    pub affected_exams: Vec<ExamId>,
    /// Ids of the rooms, invigilators or students involved.
    pub affected_resources: Vec<Uuid>,
    pub description: String,
}

impl ConflictReport {
    fn new(
        kind: ConflictKind,
        severity: Severity,
        affected_exams: Vec<ExamId>,
        affected_resources: Vec<Uuid>,
        description: String,
    ) -> Self {
        ConflictReport {
            conflict_id: Uuid::new_v4(),
            kind,
            severity,
            affected_exams,
            affected_resources,
            description,
        }
    }
}

pub struct ConflictDetector<'a> {
    problem: &'a Problem,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(problem: &'a Problem) -> Self {
        ConflictDetector { problem }
    }

    /// Detect all conflicts, record them on the solution and flag the
    /// affected assignments.
    pub fn detect(&self, solution: &mut Solution) -> usize {
        let mut reports = Vec::new();
        reports.extend(self.student_conflicts(solution));
        reports.extend(self.room_capacity_conflicts(solution));
        reports.extend(self.invigilator_collisions(solution));
        reports.extend(self.precedence_violations(solution));

        for report in &reports {
            for exam_id in &report.affected_exams {
                if let Some(assignment) = solution
                    .assignments
                    .iter_mut()
                    .find(|a| a.exam_id == *exam_id)
                {
                    assignment.status = AssignmentStatus::Conflict;
                }
            }
        }
        debug!("Conflict detection found {} conflicts", reports.len());
        let count = reports.len();
        solution.conflicts = reports;
        count
    }

    /// Slots occupied by each assigned exam, as slot indices.
    fn occupied_slots(&self, solution: &Solution) -> Vec<(usize, Vec<usize>)> {
        let mut result = Vec::new();
        for assignment in &solution.assignments {
            let exam = match self.problem.exam_idx(assignment.exam_id) {
                Some(e) => e,
                None => continue,
            };
            let start = match assignment.slot_id.and_then(|s| self.problem.slot_idx(s)) {
                Some(s) => s,
                None => continue,
            };
            let window = occupancy_window(self.problem, exam, start)
                .unwrap_or_else(|| vec![start]);
            result.push((exam, window));
        }
        result
    }

    fn student_conflicts(&self, solution: &Solution) -> Vec<ConflictReport> {
        let occupied = self.occupied_slots(solution);
        let mut reports = Vec::new();

        for (i, (e1, slots1)) in occupied.iter().enumerate() {
            for (e2, slots2) in occupied.iter().skip(i + 1) {
                if !slots1.iter().any(|s| slots2.contains(s)) {
                    continue;
                }
                let shared = shared_students(self.problem, *e1, *e2);
                if shared.is_empty() {
                    continue;
                }
                // Critical when any shared student sits either exam as a
                // normal attempt; medium when every involved registration is
                // a carryover.
                let any_normal = shared.iter().any(|(_, k1, k2)| {
                    *k1 == RegistrationKind::Normal || *k2 == RegistrationKind::Normal
                });
                let severity = if any_normal {
                    Severity::Critical
                } else {
                    Severity::Medium
                };
                let exams = self.problem.exams();
                reports.push(ConflictReport::new(
                    ConflictKind::StudentTemporal,
                    severity,
                    vec![exams[*e1].id, exams[*e2].id],
                    shared.iter().map(|(sid, _, _)| sid.0).collect(),
                    format!(
                        "{} and {} overlap with {} shared student(s)",
                        exams[*e1].course_code,
                        exams[*e2].course_code,
                        shared.len()
                    ),
                ));
            }
        }
        reports
    }

    fn room_capacity_conflicts(&self, solution: &Solution) -> Vec<ConflictReport> {
        // (room index, slot index) -> total seats taken and exams involved.
        let mut usage: HashMap<(usize, usize), (u32, Vec<ExamId>)> = HashMap::new();
        for assignment in &solution.assignments {
            let exam = match self.problem.exam_idx(assignment.exam_id) {
                Some(e) => e,
                None => continue,
            };
            let start = match assignment.slot_id.and_then(|s| self.problem.slot_idx(s)) {
                Some(s) => s,
                None => continue,
            };
            let window =
                occupancy_window(self.problem, exam, start).unwrap_or_else(|| vec![start]);
            for (room_id, seats) in assignment
                .room_ids
                .iter()
                .zip(&assignment.room_allocations)
            {
                if let Some(room) = self.problem.room_idx(*room_id) {
                    for slot in &window {
                        let entry = usage.entry((room, *slot)).or_default();
                        entry.0 += seats;
                        entry.1.push(assignment.exam_id);
                    }
                }
            }
        }

        let mut reports = Vec::new();
        let mut keys: Vec<&(usize, usize)> = usage.keys().collect();
        keys.sort();
        for key in keys {
            let (seats, exam_ids) = &usage[key];
            let room = &self.problem.rooms()[key.0];
            if *seats > room.exam_capacity() {
                reports.push(ConflictReport::new(
                    ConflictKind::RoomCapacity,
                    Severity::High,
                    exam_ids.clone(),
                    vec![room.id.0],
                    format!(
                        "room {} holds {} seats in one slot, exam capacity is {}",
                        room.code,
                        seats,
                        room.exam_capacity()
                    ),
                ));
            }
        }
        reports
    }

    fn invigilator_collisions(&self, solution: &Solution) -> Vec<ConflictReport> {
        // (invigilator index, slot index) -> (exam, room) cells supervised.
        let mut duty: HashMap<(usize, usize), Vec<ExamId>> = HashMap::new();
        for assignment in &solution.assignments {
            let exam = match self.problem.exam_idx(assignment.exam_id) {
                Some(e) => e,
                None => continue,
            };
            let start = match assignment.slot_id.and_then(|s| self.problem.slot_idx(s)) {
                Some(s) => s,
                None => continue,
            };
            let window =
                occupancy_window(self.problem, exam, start).unwrap_or_else(|| vec![start]);
            for inv_id in &assignment.invigilator_ids {
                let inv = match self.problem.invigilator_idx(*inv_id) {
                    Some(i) => i,
                    None => continue,
                };
                for slot in &window {
                    duty.entry((inv, *slot)).or_default().push(assignment.exam_id);
                }
            }
        }

        let mut reports = Vec::new();
        let mut keys: Vec<&(usize, usize)> = duty.keys().collect();
        keys.sort();
        for key in keys {
            let exam_ids = &duty[key];
            let invigilator = &self.problem.invigilators()[key.0];
            if exam_ids.len() as u32 > invigilator.max_concurrent_exams {
                reports.push(ConflictReport::new(
                    ConflictKind::InvigilatorCollision,
                    Severity::High,
                    exam_ids.clone(),
                    vec![invigilator.id.0],
                    format!(
                        "invigilator {} covers {} exams in one slot (limit {})",
                        invigilator.id,
                        exam_ids.len(),
                        invigilator.max_concurrent_exams
                    ),
                ));
            }
        }
        reports
    }

    fn precedence_violations(&self, solution: &Solution) -> Vec<ConflictReport> {
        let indices = self.problem.indices();
        let exams = self.problem.exams();
        let mut start_order: HashMap<usize, u32> = HashMap::new();
        for assignment in &solution.assignments {
            if let (Some(e), Some(s)) = (
                self.problem.exam_idx(assignment.exam_id),
                assignment.slot_id.and_then(|s| self.problem.slot_idx(s)),
            ) {
                start_order.insert(e, indices.slot_order[s]);
            }
        }

        let mut reports = Vec::new();
        for (e, prereqs) in indices.prerequisites.iter().enumerate() {
            let dependent_start = match start_order.get(&e) {
                Some(order) => *order,
                None => continue,
            };
            for prereq in prereqs {
                if let Some(prereq_start) = start_order.get(prereq) {
                    if *prereq_start > dependent_start {
                        reports.push(ConflictReport::new(
                            ConflictKind::PrecedenceViolation,
                            Severity::Critical,
                            vec![exams[*prereq].id, exams[e].id],
                            Vec::new(),
                            format!(
                                "{} must start no later than {}",
                                exams[*prereq].course_code, exams[e].course_code
                            ),
                        ));
                    }
                }
            }
        }
        reports
    }
}

/// Students registered in both exams, with their registration kind in each.
fn shared_students(
    problem: &Problem,
    e1: usize,
    e2: usize,
) -> Vec<(crate::StudentId, RegistrationKind, RegistrationKind)> {
    let exam1 = &problem.exams()[e1];
    let exam2 = &problem.exams()[e2];
    let mut shared: Vec<(crate::StudentId, RegistrationKind, RegistrationKind)> = exam1
        .students
        .iter()
        .filter_map(|(sid, k1)| exam2.students.get(sid).map(|k2| (*sid, *k1, *k2)))
        .collect();
    shared.sort_by_key(|(sid, _, _)| *sid);
    shared
}
