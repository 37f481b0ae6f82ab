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

//! The solution produced at the system boundary: per-exam assignments,
//! detected conflicts and quality metrics, in a JSON-compatible shape.
//! Non-finite floats serialize as `null`; enumerations serialize as their
//! string names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::conflicts::ConflictReport;
use crate::metrics::QualityMetrics;
use crate::problem::Problem;
use crate::{DayId, ExamId, InvigilatorId, RoomId, SlotId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolutionStatus {
    Optimal,
    Feasible,
    Infeasible,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentStatus {
    Assigned,
    Conflict,
    Unassigned,
}

/// Placement of a single exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamAssignment {
    pub exam_id: ExamId,
    pub day_id: Option<DayId>,
    /// Starting slot; multi-slot exams occupy the following slots of the day.
    pub slot_id: Option<SlotId>,
    pub room_ids: Vec<RoomId>,
    /// Seats taken in each room, parallel to `room_ids`.
    pub room_allocations: Vec<u32>,
    pub invigilator_ids: Vec<InvigilatorId>,
    pub status: AssignmentStatus,
}

impl ExamAssignment {
    pub fn unassigned(exam_id: ExamId) -> Self {
        ExamAssignment {
            exam_id,
            day_id: None,
            slot_id: None,
            room_ids: Vec::new(),
            room_allocations: Vec::new(),
            invigilator_ids: Vec::new(),
            status: AssignmentStatus::Unassigned,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.slot_id.is_some()
    }
}

/// A timetable as handed to the result sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub solution_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: SolutionStatus,
    pub objective_value: Option<f64>,
    pub assignments: Vec<ExamAssignment>,
    pub conflicts: Vec<ConflictReport>,
    pub quality: Option<QualityMetrics>,
    /// Which phase produced the final assignment ("phase1" or "phase2").
    pub solver_phase: Option<String>,
}

impl Solution {
    pub fn new(status: SolutionStatus, assignments: Vec<ExamAssignment>) -> Self {
        Solution {
            solution_id: Uuid::new_v4(),
            created_at: Utc::now(),
            status,
            objective_value: None,
            assignments,
            conflicts: Vec::new(),
            quality: None,
            solver_phase: None,
        }
    }

    /// The diagnostic solution persisted when phase 1 proves infeasibility.
    pub fn infeasible() -> Self {
        Solution::new(SolutionStatus::Infeasible, Vec::new())
    }

    pub fn assignment_for(&self, exam_id: ExamId) -> Option<&ExamAssignment> {
        self.assignments.iter().find(|a| a.exam_id == exam_id)
    }

    pub fn assigned_count(&self) -> usize {
        self.assignments.iter().filter(|a| a.is_assigned()).count()
    }

    /// Post-extraction invariant check: every reference must resolve against
    /// the problem tables, and room allocation lists must be consistent.
    pub fn validate_against(&self, problem: &Problem) -> Result<(), ValidationError> {
        for assignment in &self.assignments {
            problem
                .exam_idx(assignment.exam_id)
                .ok_or(ValidationError::UnknownExam {
                    exam_id: assignment.exam_id,
                })?;
            if let Some(slot_id) = assignment.slot_id {
                problem
                    .slot_idx(slot_id)
                    .ok_or(ValidationError::UnknownSlot {
                        exam_id: assignment.exam_id,
                    })?;
            }
            for room_id in &assignment.room_ids {
                problem
                    .room_idx(*room_id)
                    .ok_or(ValidationError::UnknownRoom {
                        exam_id: assignment.exam_id,
                    })?;
            }
            if assignment.room_ids.len() != assignment.room_allocations.len() {
                return Err(ValidationError::AllocationMismatch {
                    exam_id: assignment.exam_id,
                });
            }
            if assignment.is_assigned() && assignment.day_id.is_none() {
                return Err(ValidationError::MissingDay {
                    exam_id: assignment.exam_id,
                });
            }
        }
        Ok(())
    }
}

/// Metadata persisted alongside the solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionMetadata {
    pub session_id: Uuid,
    pub template: String,
    pub seed: u64,
    pub solver_runtime_s: f64,
    pub engine_version: String,
}

/// Solution fails the post-extraction invariants; it must not be persisted.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("assignment references unknown exam {exam_id}")]
    UnknownExam { exam_id: ExamId },
    #[error("assignment of exam {exam_id} references an unknown slot")]
    UnknownSlot { exam_id: ExamId },
    #[error("assignment of exam {exam_id} references an unknown room")]
    UnknownRoom { exam_id: ExamId },
    #[error("assignment of exam {exam_id} has mismatched room allocation list")]
    AllocationMismatch { exam_id: ExamId },
    #[error("assignment of exam {exam_id} has a slot but no day")]
    MissingDay { exam_id: ExamId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_serialize_as_string_names() {
        let json = serde_json::to_string(&SolutionStatus::Feasible).unwrap();
        assert_eq!(json, "\"Feasible\"");
        let json = serde_json::to_string(&AssignmentStatus::Conflict).unwrap();
        assert_eq!(json, "\"Conflict\"");
    }

    #[test]
    fn infeasible_solution_has_empty_assignments() {
        let solution = Solution::infeasible();
        assert_eq!(solution.status, SolutionStatus::Infeasible);
        assert!(solution.assignments.is_empty());
        assert_eq!(solution.assigned_count(), 0);
    }

    #[test]
    fn solution_roundtrips_through_json() {
        let mut solution = Solution::new(
            SolutionStatus::Feasible,
            vec![ExamAssignment::unassigned(ExamId::new())],
        );
        solution.objective_value = Some(42.5);
        let json = serde_json::to_string(&solution).unwrap();
        let back: Solution = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, SolutionStatus::Feasible);
        assert_eq!(back.assignments.len(), 1);
        assert_eq!(back.objective_value, Some(42.5));
    }
}
