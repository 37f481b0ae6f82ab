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

//! Hybrid exam timetabling engine.
//!
//! The engine assigns exams to (day, time slot, room, invigilator) tuples in two
//! phases: a constraint-programming phase that prunes the decision-variable
//! lattice with a genetic front-filter and solves for feasibility, and an
//! optimization phase that evolves variable-ordering heuristics to guide the
//! backend toward high-quality timetables.

use std::collections::{BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod config;
pub mod conflicts;
pub mod constraints;
pub mod ga;
pub mod io;
pub mod metrics;
pub mod problem;
pub mod sat;
pub mod solution;
pub mod solver;
pub mod vars;

/// Defines an opaque 128-bit identifier newtype. Identity equality only; the
/// engine never inspects the contained value.
macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(ExamId);
id_type!(CourseId);
id_type!(RoomId);
id_type!(DayId);
id_type!(SlotId);
id_type!(StudentId);
id_type!(InvigilatorId);
id_type!(DepartmentId);

/// How a student is registered for a course. A `Carryover` registration is a
/// second-or-later attempt; conflicts involving only carryover registrations
/// are soft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationKind {
    Normal,
    Carryover,
}

/// A scheduled assessment associated with one course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exam {
    pub id: ExamId,
    /// Index of the exam in the problem's exam table. Assigned at ingestion.
    #[serde(default)]
    pub index: usize,
    pub course_id: CourseId,
    /// Course code used for deterministic ordering and display.
    pub course_code: String,
    pub expected_students: u32,
    pub duration_minutes: u32,
    /// Practical exams may only use rooms with computers.
    #[serde(default)]
    pub is_practical: bool,
    /// Restricts the exam to slot index 0 of any day.
    #[serde(default)]
    pub morning_only: bool,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    /// When set, the exam may only be placed in one of these rooms.
    #[serde(default)]
    pub allowed_rooms: Option<BTreeSet<RoomId>>,
    /// Exams that must start no later than this one.
    #[serde(default)]
    pub prerequisite_exams: BTreeSet<ExamId>,
    /// Registered students with their registration kind. Populated by
    /// `Problem::populate_exam_students` from the dataset registrations.
    #[serde(default)]
    pub students: HashMap<StudentId, RegistrationKind>,
    /// Relative importance for soft objectives.
    #[serde(default = "default_exam_weight")]
    pub weight: f32,
}

fn default_exam_weight() -> f32 {
    1.0
}

/// An examination room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    #[serde(default)]
    pub index: usize,
    pub code: String,
    pub capacity: u32,
    /// Seats usable under exam conditions. Defaults to `floor(0.9 * capacity)`
    /// when the dataset leaves it unset.
    #[serde(default)]
    pub exam_capacity: Option<u32>,
    #[serde(default)]
    pub has_computers: bool,
    /// Pairs of directly adjacent seats, used by seating-related soft rules.
    #[serde(default)]
    pub adjacent_seat_pairs: Vec<(u32, u32)>,
}

impl Room {
    /// Effective capacity under exam conditions.
    pub fn exam_capacity(&self) -> u32 {
        self.exam_capacity
            .unwrap_or((self.capacity as f64 * 0.9).floor() as u32)
    }
}

/// A calendar day containing exactly three time slots (morning, afternoon,
/// evening, in that order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Day {
    pub id: DayId,
    #[serde(default)]
    pub index: usize,
    pub date: NaiveDate,
    pub timeslots: Vec<SlotId>,
}

/// One of the three time intervals of a day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: SlotId,
    #[serde(default)]
    pub index: usize,
    pub parent_day_id: DayId,
    /// Position within the day: 0 = morning, 1 = afternoon, 2 = evening.
    pub slot_index: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub programme_id: Option<Uuid>,
    #[serde(default)]
    pub current_level: u32,
    #[serde(default)]
    pub registered_courses: BTreeSet<CourseId>,
}

/// Availability of an invigilator. `Unrestricted` is equivalent to being
/// available in every slot of every day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Availability {
    Unrestricted,
    /// Blocked `(day, slot)` pairs. A `None` slot blocks the whole day.
    Blocklist(Vec<(DayId, Option<SlotId>)>),
}

impl Default for Availability {
    fn default() -> Self {
        Availability::Unrestricted
    }
}

/// A staff member eligible to supervise exams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invigilator {
    pub id: InvigilatorId,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub department: Option<DepartmentId>,
    #[serde(default = "default_true")]
    pub can_invigilate: bool,
    #[serde(default = "default_one")]
    pub max_concurrent_exams: u32,
    #[serde(default = "default_max_students")]
    pub max_students_per_exam: u32,
    #[serde(default)]
    pub availability: Availability,
}

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

fn default_max_students() -> u32 {
    50
}

impl Invigilator {
    /// Whether this invigilator may supervise during the given slot.
    pub fn is_available(&self, day: DayId, slot: SlotId) -> bool {
        match &self.availability {
            Availability::Unrestricted => true,
            Availability::Blocklist(blocked) => !blocked
                .iter()
                .any(|(d, s)| *d == day && (s.is_none() || *s == Some(slot))),
        }
    }
}

/// Number of invigilators an exam requires in total, across all of its rooms.
pub fn required_invigilators(exam: &Exam) -> u32 {
    std::cmp::max(1, (exam.expected_students + 49) / 50)
}
