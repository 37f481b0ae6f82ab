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

pub mod simple;

use std::collections::HashSet;
use std::fmt::Write;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::problem::{standard_slots, Problem};
use crate::solution::{Solution, SolutionMetadata};
use crate::{
    CourseId, Day, DayId, Exam, ExamId, Invigilator, InvigilatorId, RegistrationKind, Room,
    RoomId, Student, StudentId, TimeSlot,
};

/// One student-course registration, as delivered by the data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub kind: RegistrationKind,
}

/// A complete scheduling session as handed over by a `DataSource`. Records
/// carry values only; all cross references are identifier-valued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub exams: Vec<Exam>,
    pub rooms: Vec<Room>,
    pub students: Vec<Student>,
    pub invigilators: Vec<Invigilator>,
    pub registrations: Vec<RegistrationRecord>,
    pub days: Vec<Day>,
    pub timeslots: Vec<TimeSlot>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no dataset for session {session_id}")]
    NotFound { session_id: Uuid },
    #[error("dataset unreadable: {reason}")]
    Unreadable { reason: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("result sink rejected the solution: {reason}")]
    Rejected { reason: String },
}

/// Provider of datasets. Blocking by design: any asynchronous retrieval is
/// the outer runtime's business, the engine receives a finished dataset.
pub trait DataSource {
    fn get_dataset(&self, session_id: Uuid) -> Result<Dataset, SourceError>;
}

/// Consumer of finished solutions.
pub trait ResultSink {
    fn persist(
        &mut self,
        solution: &Solution,
        metadata: &SolutionMetadata,
    ) -> Result<(), SinkError>;
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn persist(
        &mut self,
        solution: &Solution,
        metadata: &SolutionMetadata,
    ) -> Result<(), SinkError> {
        (**self).persist(solution, metadata)
    }
}

/// In-memory source, mainly for tests and embedding.
pub struct MemoryDataSource {
    pub session_id: Uuid,
    pub dataset: Dataset,
}

impl DataSource for MemoryDataSource {
    fn get_dataset(&self, session_id: Uuid) -> Result<Dataset, SourceError> {
        if session_id == self.session_id {
            Ok(self.dataset.clone())
        } else {
            Err(SourceError::NotFound { session_id })
        }
    }
}

/// In-memory sink collecting everything persisted to it.
#[derive(Default)]
pub struct MemorySink {
    pub persisted: Vec<(Solution, SolutionMetadata)>,
}

impl ResultSink for MemorySink {
    fn persist(
        &mut self,
        solution: &Solution,
        metadata: &SolutionMetadata,
    ) -> Result<(), SinkError> {
        self.persisted.push((solution.clone(), metadata.clone()));
        Ok(())
    }
}

/// Format a timetable into a human readable string (e.g. to print it to
/// stdout).
///
/// The output format will look like
/// ```text
/// ===== 2026-04-13, slot 0 (09:00) =====
/// - MTH101 in HALL-A (30 seats), 1 invigilator(s)
/// - PHY102 in HALL-A, HALL-B (120 seats), 2 invigilator(s)
/// ```
pub fn format_timetable(solution: &Solution, problem: &Problem) -> String {
    let mut result = String::new();
    for day in problem.days() {
        for slot_id in &day.timeslots {
            let slot_idx = match problem.slot_idx(*slot_id) {
                Some(s) => s,
                None => continue,
            };
            let slot = &problem.timeslots()[slot_idx];
            let mut lines = Vec::new();
            for assignment in &solution.assignments {
                if assignment.slot_id != Some(*slot_id) {
                    continue;
                }
                let code = problem
                    .exam_idx(assignment.exam_id)
                    .map(|e| problem.exams()[e].course_code.clone())
                    .unwrap_or_else(|| assignment.exam_id.to_string());
                let rooms: Vec<String> = assignment
                    .room_ids
                    .iter()
                    .filter_map(|rid| problem.room_idx(*rid))
                    .map(|r| problem.rooms()[r].code.clone())
                    .collect();
                let seats: u32 = assignment.room_allocations.iter().sum();
                lines.push(format!(
                    "- {} in {} ({} seats), {} invigilator(s)",
                    code,
                    rooms.join(", "),
                    seats,
                    assignment.invigilator_ids.len()
                ));
            }
            if !lines.is_empty() {
                write!(
                    result,
                    "\n===== {}, slot {} ({}) =====\n",
                    day.date, slot.slot_index, slot.start_time
                )
                .unwrap();
                for line in lines {
                    result.push_str(&line);
                    result.push('\n');
                }
            }
        }
    }
    result
}

/// Assert that a dataset is internally consistent (in terms of identifier
/// cross references). Run in debug builds after ingestion.
pub fn assert_data_consistency(dataset: &Dataset) {
    let exam_ids: HashSet<ExamId> = dataset.exams.iter().map(|e| e.id).collect();
    assert_eq!(
        exam_ids.len(),
        dataset.exams.len(),
        "duplicate exam identifiers in dataset"
    );
    let student_ids: HashSet<StudentId> = dataset.students.iter().map(|s| s.id).collect();
    for registration in &dataset.registrations {
        assert!(
            student_ids.contains(&registration.student_id),
            "registration references unknown student {}",
            registration.student_id
        );
    }
    let slot_ids: HashSet<crate::SlotId> = dataset.timeslots.iter().map(|s| s.id).collect();
    for day in &dataset.days {
        for slot_id in &day.timeslots {
            assert!(
                slot_ids.contains(slot_id),
                "day {} references unknown slot",
                day.date
            );
        }
    }
}

/// Convenience builder for datasets, used by tests and the demo data path.
pub struct DatasetBuilder {
    dataset: Dataset,
}

impl DatasetBuilder {
    /// Start a dataset with `n_days` synthesized days (three standard slots
    /// each) beginning at `start`.
    pub fn new(n_days: u32, start: NaiveDate) -> Self {
        let mut days = Vec::new();
        let mut timeslots = Vec::new();
        for offset in 0..n_days {
            let date = start + chrono::Duration::days(i64::from(offset));
            let day_id = DayId::new();
            let slots = standard_slots(day_id);
            days.push(Day {
                id: day_id,
                index: 0,
                date,
                timeslots: slots.iter().map(|s| s.id).collect(),
            });
            timeslots.extend(slots);
        }
        DatasetBuilder {
            dataset: Dataset {
                exams: Vec::new(),
                rooms: Vec::new(),
                students: Vec::new(),
                invigilators: Vec::new(),
                registrations: Vec::new(),
                days,
                timeslots,
            },
        }
    }

    pub fn exam(
        &mut self,
        code: &str,
        course_id: CourseId,
        expected_students: u32,
        duration_minutes: u32,
    ) -> ExamId {
        let id = ExamId::new();
        self.dataset.exams.push(Exam {
            id,
            index: 0,
            course_id,
            course_code: code.to_owned(),
            expected_students,
            duration_minutes,
            is_practical: false,
            morning_only: false,
            department_id: None,
            allowed_rooms: None,
            prerequisite_exams: Default::default(),
            students: Default::default(),
            weight: 1.0,
        });
        id
    }

    /// Mutable access to an exam added earlier, to set the optional fields.
    pub fn exam_mut(&mut self, id: ExamId) -> &mut Exam {
        self.dataset
            .exams
            .iter_mut()
            .find(|e| e.id == id)
            .expect("unknown exam id in DatasetBuilder")
    }

    pub fn room(&mut self, code: &str, capacity: u32, has_computers: bool) -> RoomId {
        let id = RoomId::new();
        self.dataset.rooms.push(Room {
            id,
            index: 0,
            code: code.to_owned(),
            capacity,
            exam_capacity: None,
            has_computers,
            adjacent_seat_pairs: Vec::new(),
        });
        id
    }

    /// Set an explicit exam capacity on a room added earlier.
    pub fn room_exam_capacity(&mut self, id: RoomId, exam_capacity: u32) {
        let room = self
            .dataset
            .rooms
            .iter_mut()
            .find(|r| r.id == id)
            .expect("unknown room id in DatasetBuilder");
        room.exam_capacity = Some(exam_capacity);
    }

    pub fn student(&mut self) -> StudentId {
        let id = StudentId::new();
        self.dataset.students.push(Student {
            id,
            index: 0,
            programme_id: None,
            current_level: 100,
            registered_courses: Default::default(),
        });
        id
    }

    /// Register `count` fresh students for the course.
    pub fn cohort(&mut self, course_id: CourseId, count: u32, kind: RegistrationKind) {
        for _ in 0..count {
            let student = self.student();
            self.register(student, course_id, kind);
        }
    }

    pub fn register(&mut self, student_id: StudentId, course_id: CourseId, kind: RegistrationKind) {
        self.dataset.registrations.push(RegistrationRecord {
            student_id,
            course_id,
            kind,
        });
    }

    pub fn invigilator(&mut self, count: u32) -> Vec<InvigilatorId> {
        (0..count)
            .map(|_| {
                let id = InvigilatorId::new();
                self.dataset.invigilators.push(Invigilator {
                    id,
                    index: 0,
                    department: None,
                    can_invigilate: true,
                    max_concurrent_exams: 2,
                    max_students_per_exam: 50,
                    availability: Default::default(),
                });
                id
            })
            .collect()
    }

    pub fn build(self) -> Dataset {
        self.dataset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_three_slots_per_day() {
        let dataset = DatasetBuilder::new(3, NaiveDate::from_ymd_opt(2026, 4, 13).unwrap()).build();
        assert_eq!(dataset.days.len(), 3);
        assert_eq!(dataset.timeslots.len(), 9);
        for day in &dataset.days {
            assert_eq!(day.timeslots.len(), 3);
        }
        assert_data_consistency(&dataset);
    }

    #[test]
    fn memory_source_checks_the_session_id() {
        let session_id = Uuid::new_v4();
        let source = MemoryDataSource {
            session_id,
            dataset: DatasetBuilder::new(1, NaiveDate::from_ymd_opt(2026, 4, 13).unwrap()).build(),
        };
        assert!(source.get_dataset(session_id).is_ok());
        assert!(matches!(
            source.get_dataset(Uuid::new_v4()),
            Err(SourceError::NotFound { .. })
        ));
    }
}
