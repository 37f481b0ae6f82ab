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

//! The problem model: entity tables, derived indices and the constraint
//! registry.
//!
//! A `Problem` is built from a `Dataset`, mutated through the pre-seal
//! mutators, then sealed. Sealing locks all mutation and computes the derived
//! indices (student sets per exam, conflict pairs, chronological slot order).
//! Everything downstream of the seal reads the problem through immutable
//! references.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{Duration, NaiveDate, NaiveTime};
use log::{debug, info, warn};
use ndarray::Array2;
use thiserror::Error;

use crate::constraints::ConstraintRegistry;
use crate::io::{Dataset, RegistrationRecord};
use crate::{
    Day, DayId, Exam, ExamId, Invigilator, RegistrationKind, Room, SlotId, Student, TimeSlot,
};

/// Fatal ingestion failure. All detected violations are reported at once.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset invalid: {}", reasons.join("; "))]
    Invalid { reasons: Vec<String> },
}

/// Mutation attempted on a sealed problem. This is a programmer bug in the
/// calling code, surfaced as an error so the orchestrator can abort with a
/// diagnostic instead of corrupting state.
#[derive(Debug, Error)]
#[error("problem is sealed; `{operation}` is only allowed before seal()")]
pub struct SealError {
    pub operation: &'static str,
}

/// Read-only index structures computed once at seal time.
pub struct DerivedIndices {
    /// Exam index -> sorted indices of registered students.
    pub students_per_exam: Vec<Vec<usize>>,
    /// Unordered pairs (i < j) of exams sharing at least one student with a
    /// `Normal` registration in both. These are hard conflicts.
    pub conflict_pairs: BTreeSet<(usize, usize)>,
    /// Unordered pairs (i < j) of exams sharing students, none of them with
    /// `Normal` registrations in both exams. Overlap is allowed but penalized.
    pub carryover_pairs: BTreeSet<(usize, usize)>,
    /// Symmetric adjacency over `conflict_pairs`.
    pub conflict_matrix: Array2<bool>,
    /// Exam index -> exams it hard-conflicts with.
    pub exam_neighbors: Vec<Vec<usize>>,
    /// Slot index -> global chronological index (`day_ordinal * 3 + slot_index`).
    pub slot_order: Vec<u32>,
    /// Day index -> slot indices in chronological order.
    pub day_slots: Vec<Vec<usize>>,
    /// Exam index -> indices of its prerequisite exams.
    pub prerequisites: Vec<Vec<usize>>,
    /// Exam index -> exams that list it as a prerequisite.
    pub dependents: Vec<Vec<usize>>,
}

/// The exam timetabling problem: entity tables keyed by dense indices, with
/// identifier maps for the outside world.
pub struct Problem {
    exams: Vec<Exam>,
    rooms: Vec<Room>,
    days: Vec<Day>,
    timeslots: Vec<TimeSlot>,
    students: Vec<Student>,
    invigilators: Vec<Invigilator>,
    registrations: Vec<RegistrationRecord>,

    exam_index: HashMap<ExamId, usize>,
    room_index: HashMap<crate::RoomId, usize>,
    day_index: HashMap<DayId, usize>,
    slot_index: HashMap<SlotId, usize>,
    student_index: HashMap<crate::StudentId, usize>,
    invigilator_index: HashMap<crate::InvigilatorId, usize>,

    registry: ConstraintRegistry,
    sealed: bool,
    indices: Option<DerivedIndices>,
}

impl Problem {
    pub fn new() -> Self {
        Problem {
            exams: Vec::new(),
            rooms: Vec::new(),
            days: Vec::new(),
            timeslots: Vec::new(),
            students: Vec::new(),
            invigilators: Vec::new(),
            registrations: Vec::new(),
            exam_index: HashMap::new(),
            room_index: HashMap::new(),
            day_index: HashMap::new(),
            slot_index: HashMap::new(),
            student_index: HashMap::new(),
            invigilator_index: HashMap::new(),
            registry: ConstraintRegistry::with_defaults(),
            sealed: false,
            indices: None,
        }
    }

    /// Build a problem from an ingested dataset. Tables are sorted
    /// deterministically (exams by course code then id, rooms by code then
    /// id, days by date, slots chronologically) so variable creation order is
    /// reproducible for a fixed dataset.
    pub fn from_dataset(dataset: Dataset) -> Self {
        let mut problem = Problem::new();

        let mut exams = dataset.exams;
        exams.sort_by(|a, b| (a.course_code.as_str(), a.id).cmp(&(b.course_code.as_str(), b.id)));
        let mut rooms = dataset.rooms;
        rooms.sort_by(|a, b| (a.code.as_str(), a.id).cmp(&(b.code.as_str(), b.id)));
        let mut days = dataset.days;
        days.sort_by_key(|d| d.date);
        let mut students = dataset.students;
        students.sort_by_key(|s| s.id);
        let mut invigilators = dataset.invigilators;
        invigilators.sort_by_key(|i| i.id);

        for exam in exams {
            problem.push_exam(exam);
        }
        for room in rooms {
            problem.push_room(room);
        }
        // Slots are attached day by day so their indices follow the
        // chronological day order.
        let slot_table: HashMap<SlotId, TimeSlot> = dataset
            .timeslots
            .into_iter()
            .map(|slot| (slot.id, slot))
            .collect();
        for day in days {
            let slots: Vec<TimeSlot> = day
                .timeslots
                .iter()
                .filter_map(|sid| slot_table.get(sid).cloned())
                .collect();
            problem.push_day(day, slots);
        }
        for student in students {
            problem.push_student(student);
        }
        for invigilator in invigilators {
            problem.push_invigilator(invigilator);
        }
        problem.registrations = dataset.registrations;

        debug!(
            "Problem built from dataset: {} exams, {} rooms, {} days, {} students, {} invigilators",
            problem.exams.len(),
            problem.rooms.len(),
            problem.days.len(),
            problem.students.len(),
            problem.invigilators.len()
        );
        problem
    }

    fn push_exam(&mut self, mut exam: Exam) {
        exam.index = self.exams.len();
        self.exam_index.insert(exam.id, exam.index);
        self.exams.push(exam);
    }

    fn push_room(&mut self, mut room: Room) {
        room.index = self.rooms.len();
        self.room_index.insert(room.id, room.index);
        self.rooms.push(room);
    }

    fn push_day(&mut self, mut day: Day, slots: Vec<TimeSlot>) {
        day.index = self.days.len();
        day.timeslots = slots.iter().map(|s| s.id).collect();
        self.day_index.insert(day.id, day.index);
        for mut slot in slots {
            slot.index = self.timeslots.len();
            slot.parent_day_id = day.id;
            self.slot_index.insert(slot.id, slot.index);
            self.timeslots.push(slot);
        }
        self.days.push(day);
    }

    fn push_student(&mut self, mut student: Student) {
        student.index = self.students.len();
        self.student_index.insert(student.id, student.index);
        self.students.push(student);
    }

    fn push_invigilator(&mut self, mut invigilator: Invigilator) {
        invigilator.index = self.invigilators.len();
        self.invigilator_index
            .insert(invigilator.id, invigilator.index);
        self.invigilators.push(invigilator);
    }

    fn check_unsealed(&self, operation: &'static str) -> Result<(), SealError> {
        if self.sealed {
            Err(SealError { operation })
        } else {
            Ok(())
        }
    }

    pub fn add_exam(&mut self, exam: Exam) -> Result<(), SealError> {
        self.check_unsealed("add_exam")?;
        self.push_exam(exam);
        Ok(())
    }

    pub fn add_room(&mut self, room: Room) -> Result<(), SealError> {
        self.check_unsealed("add_room")?;
        self.push_room(room);
        Ok(())
    }

    /// Add a day together with its (exactly three) slots.
    pub fn add_day(&mut self, day: Day, slots: Vec<TimeSlot>) -> Result<(), SealError> {
        self.check_unsealed("add_day")?;
        self.push_day(day, slots);
        Ok(())
    }

    pub fn add_student(&mut self, student: Student) -> Result<(), SealError> {
        self.check_unsealed("add_student")?;
        self.push_student(student);
        Ok(())
    }

    pub fn add_invigilator(&mut self, invigilator: Invigilator) -> Result<(), SealError> {
        self.check_unsealed("add_invigilator")?;
        self.push_invigilator(invigilator);
        Ok(())
    }

    pub fn add_registration(&mut self, registration: RegistrationRecord) -> Result<(), SealError> {
        self.check_unsealed("add_registration")?;
        self.registrations.push(registration);
        Ok(())
    }

    /// Fill every exam's student map from the registration records, via the
    /// exam's course.
    pub fn populate_exam_students(&mut self) -> Result<(), SealError> {
        self.check_unsealed("populate_exam_students")?;

        let mut by_course: BTreeMap<crate::CourseId, Vec<&RegistrationRecord>> = BTreeMap::new();
        for registration in &self.registrations {
            by_course
                .entry(registration.course_id)
                .or_default()
                .push(registration);
        }
        for exam in &mut self.exams {
            exam.students.clear();
            if let Some(records) = by_course.get(&exam.course_id) {
                for record in records {
                    // A carryover record never overrides a normal one for the
                    // same student.
                    let entry = exam
                        .students
                        .entry(record.student_id)
                        .or_insert(record.kind);
                    if record.kind == RegistrationKind::Normal {
                        *entry = RegistrationKind::Normal;
                    }
                }
            }
        }
        for student in &mut self.students {
            student.registered_courses.clear();
        }
        for registration in &self.registrations {
            if let Some(idx) = self.student_index.get(&registration.student_id) {
                self.students[*idx]
                    .registered_courses
                    .insert(registration.course_id);
            }
        }
        Ok(())
    }

    /// If no days were ingested, synthesize `n` contiguous days starting at
    /// `start`, each with the standard three slots (09-12, 14-17, 18-21).
    pub fn configure_exam_days(&mut self, n: u32, start: NaiveDate) -> Result<(), SealError> {
        self.check_unsealed("configure_exam_days")?;
        if !self.days.is_empty() {
            debug!("configure_exam_days: {} days already present", self.days.len());
            return Ok(());
        }
        for offset in 0..n {
            let date = start + Duration::days(i64::from(offset));
            let day = Day {
                id: DayId::new(),
                index: 0,
                date,
                timeslots: Vec::new(),
            };
            let slots = standard_slots(day.id);
            self.push_day(day, slots);
        }
        info!("Synthesized {} exam days starting {}", n, start);
        Ok(())
    }

    /// Check the dataset-level invariants. All violations are collected into
    /// a single `DatasetError::Invalid`.
    pub fn validate(&self) -> Result<(), DatasetError> {
        let mut reasons = Vec::new();

        if self.exams.is_empty() {
            reasons.push("no exams".to_owned());
        }
        if self.rooms.is_empty() {
            reasons.push("no rooms".to_owned());
        }
        if self.timeslots.is_empty() {
            reasons.push("no time slots".to_owned());
        }

        for day in &self.days {
            if day.timeslots.len() != 3 {
                reasons.push(format!(
                    "day {} has {} slots, expected exactly 3",
                    day.date,
                    day.timeslots.len()
                ));
            }
            for (position, slot_id) in day.timeslots.iter().enumerate() {
                match self.slot_index.get(slot_id) {
                    None => reasons.push(format!("day {} references unknown slot", day.date)),
                    Some(idx) => {
                        let slot = &self.timeslots[*idx];
                        if slot.parent_day_id != day.id {
                            reasons.push(format!(
                                "slot {} of day {} has inconsistent parent day",
                                position, day.date
                            ));
                        }
                        if slot.slot_index as usize != position {
                            reasons.push(format!(
                                "slot {} of day {} has slot_index {}",
                                position, day.date, slot.slot_index
                            ));
                        }
                    }
                }
            }
        }

        for exam in &self.exams {
            if let Some(allowed) = &exam.allowed_rooms {
                for room_id in allowed {
                    if !self.room_index.contains_key(room_id) {
                        reasons.push(format!(
                            "exam {} allows unknown room {}",
                            exam.course_code, room_id
                        ));
                    }
                }
            }
            for prereq in &exam.prerequisite_exams {
                if !self.exam_index.contains_key(prereq) {
                    reasons.push(format!(
                        "exam {} lists unknown prerequisite {}",
                        exam.course_code, prereq
                    ));
                }
            }
        }

        for registration in &self.registrations {
            if !self.student_index.contains_key(&registration.student_id) {
                reasons.push(format!(
                    "registration references unknown student {}",
                    registration.student_id
                ));
            }
        }

        for invigilator in &self.invigilators {
            if let crate::Availability::Blocklist(blocked) = &invigilator.availability {
                for (day_id, slot_id) in blocked {
                    if !self.day_index.contains_key(day_id) {
                        reasons.push(format!(
                            "invigilator {} blocklist references unknown day",
                            invigilator.id
                        ));
                    }
                    if let Some(slot_id) = slot_id {
                        if !self.slot_index.contains_key(slot_id) {
                            reasons.push(format!(
                                "invigilator {} blocklist references unknown slot",
                                invigilator.id
                            ));
                        }
                    }
                }
            }
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            warn!("Dataset validation failed with {} reasons", reasons.len());
            Err(DatasetError::Invalid { reasons })
        }
    }

    /// Lock all mutation and compute the derived indices. Calling `seal` on
    /// an already sealed problem is a no-op.
    pub fn seal(&mut self) {
        if self.sealed {
            return;
        }
        self.indices = Some(self.compute_indices());
        self.sealed = true;
        debug!(
            "Problem sealed: {} hard conflict pairs, {} carryover pairs",
            self.indices().conflict_pairs.len(),
            self.indices().carryover_pairs.len()
        );
    }

    fn compute_indices(&self) -> DerivedIndices {
        let n_exams = self.exams.len();

        let mut students_per_exam: Vec<Vec<usize>> = vec![Vec::new(); n_exams];
        for (e, exam) in self.exams.iter().enumerate() {
            let mut indices: Vec<usize> = exam
                .students
                .keys()
                .filter_map(|sid| self.student_index.get(sid).copied())
                .collect();
            indices.sort_unstable();
            indices.dedup();
            students_per_exam[e] = indices;
        }

        // Exams per student, with the registration kind per exam.
        let mut exams_per_student: Vec<Vec<(usize, RegistrationKind)>> =
            vec![Vec::new(); self.students.len()];
        for (e, exam) in self.exams.iter().enumerate() {
            for (sid, kind) in &exam.students {
                if let Some(s) = self.student_index.get(sid) {
                    exams_per_student[*s].push((e, *kind));
                }
            }
        }

        let mut conflict_pairs = BTreeSet::new();
        let mut shared_pairs = BTreeSet::new();
        for exam_list in &exams_per_student {
            for (i, (e1, k1)) in exam_list.iter().enumerate() {
                for (e2, k2) in exam_list.iter().skip(i + 1) {
                    if e1 == e2 {
                        continue;
                    }
                    let pair = (e1.min(e2).to_owned(), e1.max(e2).to_owned());
                    shared_pairs.insert(pair);
                    if *k1 == RegistrationKind::Normal && *k2 == RegistrationKind::Normal {
                        conflict_pairs.insert(pair);
                    }
                }
            }
        }
        let carryover_pairs: BTreeSet<(usize, usize)> = shared_pairs
            .difference(&conflict_pairs)
            .copied()
            .collect();

        let mut conflict_matrix = Array2::from_elem((n_exams, n_exams), false);
        let mut exam_neighbors: Vec<Vec<usize>> = vec![Vec::new(); n_exams];
        for (e1, e2) in &conflict_pairs {
            conflict_matrix[[*e1, *e2]] = true;
            conflict_matrix[[*e2, *e1]] = true;
            exam_neighbors[*e1].push(*e2);
            exam_neighbors[*e2].push(*e1);
        }

        let mut slot_order = vec![0u32; self.timeslots.len()];
        let mut day_slots: Vec<Vec<usize>> = vec![Vec::new(); self.days.len()];
        for (day_ordinal, day) in self.days.iter().enumerate() {
            for slot_id in &day.timeslots {
                if let Some(s) = self.slot_index.get(slot_id) {
                    let slot = &self.timeslots[*s];
                    slot_order[*s] = day_ordinal as u32 * 3 + u32::from(slot.slot_index);
                    day_slots[day_ordinal].push(*s);
                }
            }
            day_slots[day_ordinal].sort_by_key(|s| slot_order[*s]);
        }

        let mut prerequisites: Vec<Vec<usize>> = vec![Vec::new(); n_exams];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n_exams];
        for (e, exam) in self.exams.iter().enumerate() {
            for prereq_id in &exam.prerequisite_exams {
                if let Some(p) = self.exam_index.get(prereq_id) {
                    prerequisites[e].push(*p);
                    dependents[*p].push(e);
                }
            }
        }

        DerivedIndices {
            students_per_exam,
            conflict_pairs,
            carryover_pairs,
            conflict_matrix,
            exam_neighbors,
            slot_order,
            day_slots,
            prerequisites,
            dependents,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Derived indices. Panics if the problem has not been sealed; reading
    /// indices before seal is a programmer bug.
    pub fn indices(&self) -> &DerivedIndices {
        self.indices
            .as_ref()
            .expect("Problem::indices() called before seal()")
    }

    pub fn exams(&self) -> &[Exam] {
        &self.exams
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn days(&self) -> &[Day] {
        &self.days
    }

    pub fn timeslots(&self) -> &[TimeSlot] {
        &self.timeslots
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn invigilators(&self) -> &[Invigilator] {
        &self.invigilators
    }

    pub fn registrations(&self) -> &[RegistrationRecord] {
        &self.registrations
    }

    pub fn exam_idx(&self, id: ExamId) -> Option<usize> {
        self.exam_index.get(&id).copied()
    }

    pub fn room_idx(&self, id: crate::RoomId) -> Option<usize> {
        self.room_index.get(&id).copied()
    }

    pub fn slot_idx(&self, id: SlotId) -> Option<usize> {
        self.slot_index.get(&id).copied()
    }

    pub fn invigilator_idx(&self, id: crate::InvigilatorId) -> Option<usize> {
        self.invigilator_index.get(&id).copied()
    }

    pub fn day_of_slot(&self, slot: usize) -> &Day {
        let day_id = self.timeslots[slot].parent_day_id;
        &self.days[self.day_index[&day_id]]
    }

    /// Number of consecutive slots the exam occupies, at the nominal
    /// three-hour slot granularity.
    pub fn slots_needed(&self, exam: usize) -> usize {
        let duration = self.exams[exam].duration_minutes;
        std::cmp::max(1, ((duration + 179) / 180) as usize)
    }

    /// Room/exam compatibility: enough exam seats to be useful, computers for
    /// practical exams, and membership in the exam's allowed set when given.
    pub fn room_compatible(&self, exam: usize, room: usize) -> bool {
        let exam = &self.exams[exam];
        let room = &self.rooms[room];
        if room.exam_capacity() == 0 {
            return false;
        }
        if exam.is_practical && !room.has_computers {
            return false;
        }
        if let Some(allowed) = &exam.allowed_rooms {
            if !allowed.contains(&room.id) {
                return false;
            }
        }
        true
    }

    /// Seats granted to an exam in a room: the room's full exam capacity or
    /// the exam's headcount, whichever is smaller.
    pub fn allocation(&self, exam: usize, room: usize) -> u32 {
        std::cmp::min(
            self.exams[exam].expected_students,
            self.rooms[room].exam_capacity(),
        )
    }

    pub fn registry(&self) -> &ConstraintRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> Result<&mut ConstraintRegistry, SealError> {
        self.check_unsealed("registry_mut")?;
        Ok(&mut self.registry)
    }

    /// Predicates used by external recovery policies.
    pub fn has_days(&self) -> bool {
        !self.days.is_empty()
    }

    pub fn has_invigilators(&self) -> bool {
        self.invigilators.iter().any(|i| i.can_invigilate)
    }
}

impl Default for Problem {
    fn default() -> Self {
        Self::new()
    }
}

/// The standard three slots of a synthesized day: 09-12, 14-17, 18-21.
pub fn standard_slots(day: DayId) -> Vec<TimeSlot> {
    let windows = [(9, 12), (14, 17), (18, 21)];
    windows
        .iter()
        .enumerate()
        .map(|(i, (from, to))| TimeSlot {
            id: SlotId::new(),
            index: 0,
            parent_day_id: day,
            slot_index: i as u8,
            start_time: NaiveTime::from_hms_opt(*from, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(*to, 0, 0).unwrap(),
            duration_minutes: 180,
        })
        .collect()
}

/// Debug-build consistency check over a sealed problem, analogous to the
/// dataset assertions run after ingestion.
pub fn assert_problem_consistency(problem: &Problem) {
    for (i, exam) in problem.exams().iter().enumerate() {
        assert_eq!(i, exam.index, "index of {}. exam is {}", i, exam.index);
    }
    for (i, room) in problem.rooms().iter().enumerate() {
        assert_eq!(i, room.index, "index of {}. room is {}", i, room.index);
    }
    for (i, slot) in problem.timeslots().iter().enumerate() {
        assert_eq!(i, slot.index, "index of {}. slot is {}", i, slot.index);
        assert!(
            slot.slot_index < 3,
            "slot {} has slot_index {}",
            i,
            slot.slot_index
        );
    }
    let indices = problem.indices();
    for (e1, e2) in &indices.conflict_pairs {
        assert!(e1 < e2, "conflict pair ({}, {}) is not normalized", e1, e2);
        assert!(
            indices.conflict_matrix[[*e1, *e2]] && indices.conflict_matrix[[*e2, *e1]],
            "conflict matrix is not symmetric for ({}, {})",
            e1,
            e2
        );
    }
    let mut seen = HashSet::new();
    for day in problem.days() {
        for slot_id in &day.timeslots {
            assert!(seen.insert(*slot_id), "slot listed under two days");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::DatasetBuilder;
    use crate::CourseId;

    fn two_exam_dataset() -> Dataset {
        let mut builder = DatasetBuilder::new(2, NaiveDate::from_ymd_opt(2026, 4, 13).unwrap());
        let c1 = CourseId::new();
        let c2 = CourseId::new();
        builder.exam("MTH101", c1, 30, 120);
        builder.exam("PHY102", c2, 25, 120);
        builder.room("HALL-A", 100, false);
        let s1 = builder.student();
        let s2 = builder.student();
        builder.register(s1, c1, RegistrationKind::Normal);
        builder.register(s1, c2, RegistrationKind::Normal);
        builder.register(s2, c2, RegistrationKind::Carryover);
        builder.invigilator(2);
        builder.build()
    }

    #[test]
    fn ingestion_is_deterministic_and_idempotent() {
        let dataset = two_exam_dataset();
        let build = |d: Dataset| {
            let mut p = Problem::from_dataset(d);
            p.populate_exam_students().unwrap();
            p.validate().unwrap();
            p.seal();
            p
        };
        let p1 = build(dataset.clone());
        let p2 = build(dataset);
        let codes1: Vec<&str> = p1.exams().iter().map(|e| e.course_code.as_str()).collect();
        let codes2: Vec<&str> = p2.exams().iter().map(|e| e.course_code.as_str()).collect();
        assert_eq!(codes1, codes2);
        assert_eq!(
            p1.indices().conflict_pairs,
            p2.indices().conflict_pairs
        );
    }

    #[test]
    fn seal_is_idempotent_and_blocks_mutation() {
        let mut problem = Problem::from_dataset(two_exam_dataset());
        problem.populate_exam_students().unwrap();
        problem.seal();
        let pairs_before = problem.indices().conflict_pairs.clone();
        problem.seal();
        assert_eq!(problem.indices().conflict_pairs, pairs_before);

        let result = problem.add_room(Room {
            id: crate::RoomId::new(),
            index: 0,
            code: "LATE".into(),
            capacity: 10,
            exam_capacity: None,
            has_computers: false,
            adjacent_seat_pairs: Vec::new(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn conflict_pairs_require_normal_in_both_exams() {
        let mut problem = Problem::from_dataset(two_exam_dataset());
        problem.populate_exam_students().unwrap();
        problem.seal();
        // Student s1 is Normal in both courses, so the two exams conflict.
        assert_eq!(problem.indices().conflict_pairs.len(), 1);
        assert!(problem.indices().conflict_pairs.contains(&(0, 1)));
        assert!(problem.indices().carryover_pairs.is_empty());
        assert_eq!(problem.indices().exam_neighbors[0], vec![1]);
        assert_eq!(problem.indices().exam_neighbors[1], vec![0]);
    }

    #[test]
    fn synthesized_days_have_three_ordered_slots() {
        let mut problem = Problem::new();
        problem
            .configure_exam_days(4, NaiveDate::from_ymd_opt(2026, 4, 13).unwrap())
            .unwrap();
        assert_eq!(problem.days().len(), 4);
        assert_eq!(problem.timeslots().len(), 12);
        for day in problem.days() {
            assert_eq!(day.timeslots.len(), 3);
        }
        problem.seal();
        let order = &problem.indices().slot_order;
        let mut sorted = order.clone();
        sorted.sort_unstable();
        let expected: Vec<u32> = (0..12).collect();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn validate_collects_all_reasons() {
        let problem = Problem::new();
        match problem.validate() {
            Err(DatasetError::Invalid { reasons }) => {
                assert!(reasons.len() >= 3, "expected several reasons: {:?}", reasons);
            }
            Ok(()) => panic!("empty problem should not validate"),
        }
    }

    #[test]
    fn allocation_is_clamped_to_room_and_exam() {
        let mut problem = Problem::from_dataset(two_exam_dataset());
        problem.populate_exam_students().unwrap();
        problem.seal();
        // HALL-A has capacity 100 -> exam capacity 90; exam 0 expects 30.
        assert_eq!(problem.allocation(0, 0), 30);
    }
}
