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

use std::collections::HashMap;

use chrono::NaiveDate;
use uuid::Uuid;

use super::*;
use crate::conflicts::{ConflictKind, Severity};
use crate::io::{Dataset, DatasetBuilder, MemoryDataSource, MemorySink};
use crate::sat::search::SearchModel;
use crate::solution::SolutionStatus;
use crate::{CourseId, RegistrationKind};

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 4, 13).unwrap()
}

fn test_config(seed: u64) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.cp_sat.phase1_time_limit_s = 5;
    config.cp_sat.phase2_time_limit_s = 2;
    config.ga.population_size = 8;
    config.ga.max_generations = 4;
    config.ga.seed = seed;
    config.ga.evolve_orderings = false;
    config
}

fn backend() -> SearchModel {
    SearchModel::new().with_node_limit(300_000)
}

/// Build, validate and solve a dataset directly, without the session layer.
fn solve_dataset(dataset: Dataset, config: EngineConfig) -> (Problem, OptimizationResults) {
    let mut problem = Problem::from_dataset(dataset);
    problem.populate_exam_students().unwrap();
    problem.validate().unwrap();
    let weights = config.weights.clone();
    problem.registry_mut().unwrap().apply_weights(&weights);
    problem.seal();
    let results = HybridOrchestrator::new(&problem, config, backend).run();
    (problem, results)
}

fn slot_of(problem: &Problem, results: &OptimizationResults, course_code: &str) -> usize {
    let exam = problem
        .exams()
        .iter()
        .find(|e| e.course_code == course_code)
        .expect("unknown course code");
    let assignment = results
        .solution
        .assignment_for(exam.id)
        .expect("exam missing from solution");
    problem
        .slot_idx(assignment.slot_id.expect("exam not assigned"))
        .unwrap()
}

#[test]
fn minimal_feasible_session_is_optimal() {
    // Two independent exams, one large room, one day.
    let mut builder = DatasetBuilder::new(1, start_date());
    let r1 = {
        let id = builder.room("HALL-A", 120, false);
        builder.room_exam_capacity(id, 100);
        id
    };
    builder.exam("MTH101", CourseId::new(), 30, 120);
    builder.exam("PHY102", CourseId::new(), 30, 120);
    builder.invigilator(2);

    let (problem, results) = solve_dataset(builder.build(), test_config(1));

    assert_eq!(results.solution.status, SolutionStatus::Optimal);
    assert_eq!(results.termination, TerminationReason::OptimalFound);
    assert!(results.solution.conflicts.is_empty());

    let quality = results.solution.quality.as_ref().unwrap();
    assert_eq!(quality.completion_percentage, 100.0);
    assert_eq!(quality.feasibility_score, 100.0);

    let s1 = slot_of(&problem, &results, "MTH101");
    let s2 = slot_of(&problem, &results, "PHY102");
    assert_ne!(s1, s2, "distribution should separate the two exams");
    assert_eq!(
        problem.day_of_slot(s1).index,
        problem.day_of_slot(s2).index,
        "one day available, both exams must sit on it"
    );
    for assignment in &results.solution.assignments {
        assert_eq!(assignment.room_ids, vec![r1]);
    }
}

#[test]
fn shared_students_force_separate_slots() {
    let mut builder = DatasetBuilder::new(1, start_date());
    let c1 = CourseId::new();
    let c2 = CourseId::new();
    builder.exam("MTH101", c1, 30, 120);
    builder.exam("PHY102", c2, 30, 120);
    builder.room("HALL-A", 120, false);
    builder.invigilator(2);
    for _ in 0..10 {
        let student = builder.student();
        builder.register(student, c1, RegistrationKind::Normal);
        builder.register(student, c2, RegistrationKind::Normal);
    }

    let (problem, results) = solve_dataset(builder.build(), test_config(2));

    assert_eq!(results.solution.status, SolutionStatus::Optimal);
    let s1 = slot_of(&problem, &results, "MTH101");
    let s2 = slot_of(&problem, &results, "PHY102");
    assert_ne!(s1, s2, "normal student conflict must separate the exams");
    assert!(results
        .solution
        .conflicts
        .iter()
        .all(|c| c.kind != ConflictKind::StudentTemporal));
}

#[test]
fn oversized_exam_splits_across_rooms() {
    let mut builder = DatasetBuilder::new(1, start_date());
    builder.exam("CHM201", CourseId::new(), 120, 120);
    let r1 = builder.room("ROOM-1", 55, false);
    builder.room_exam_capacity(r1, 50);
    let r2 = builder.room("ROOM-2", 90, false);
    builder.room_exam_capacity(r2, 80);
    builder.invigilator(4);

    let (problem, results) = solve_dataset(builder.build(), test_config(3));

    assert!(matches!(
        results.solution.status,
        SolutionStatus::Optimal | SolutionStatus::Feasible
    ));
    let exam = &problem.exams()[0];
    let assignment = results.solution.assignment_for(exam.id).unwrap();
    let mut rooms = assignment.room_ids.clone();
    rooms.sort();
    let mut expected = vec![r1, r2];
    expected.sort();
    assert_eq!(rooms, expected, "both rooms are needed for 120 students");

    let total: u32 = assignment.room_allocations.iter().sum();
    assert!(total >= 120, "allocations must cover the headcount");
    for (room_id, seats) in assignment.room_ids.iter().zip(&assignment.room_allocations) {
        let room = &problem.rooms()[problem.room_idx(*room_id).unwrap()];
        assert!(*seats <= room.exam_capacity());
    }
    assert!(
        results
            .solution
            .conflicts
            .iter()
            .all(|c| c.kind != ConflictKind::RoomCapacity),
        "no room may be overfilled"
    );
}

#[test]
fn carryover_only_overlap_is_downgraded_to_medium() {
    // Three exams with pairwise normal conflicts fill all three slots of the
    // single day; a fourth exam shares only carryover students with them, so
    // it must overlap one of them.
    let mut builder = DatasetBuilder::new(1, start_date());
    let courses: Vec<CourseId> = (0..4).map(|_| CourseId::new()).collect();
    builder.exam("CRS100", courses[0], 20, 120);
    builder.exam("CRS200", courses[1], 20, 120);
    builder.exam("CRS300", courses[2], 20, 120);
    builder.exam("CRS400", courses[3], 20, 120);
    builder.room("HALL-A", 80, false);
    builder.room("HALL-B", 80, false);
    builder.invigilator(4);

    for (a, b) in [(0, 1), (0, 2), (1, 2)] {
        let student = builder.student();
        builder.register(student, courses[a], RegistrationKind::Normal);
        builder.register(student, courses[b], RegistrationKind::Normal);
    }
    for other in 0..3 {
        let student = builder.student();
        builder.register(student, courses[3], RegistrationKind::Carryover);
        builder.register(student, courses[other], RegistrationKind::Carryover);
    }

    let (_problem, results) = solve_dataset(builder.build(), test_config(4));

    assert!(
        matches!(
            results.solution.status,
            SolutionStatus::Optimal | SolutionStatus::Feasible
        ),
        "carryover overlap must not make the session infeasible"
    );
    let medium: Vec<_> = results
        .solution
        .conflicts
        .iter()
        .filter(|c| c.kind == ConflictKind::StudentTemporal)
        .collect();
    assert!(!medium.is_empty(), "the forced overlap must be reported");
    for conflict in &medium {
        assert_eq!(
            conflict.severity,
            Severity::Medium,
            "carryover-only conflicts are medium, not critical"
        );
    }
}

#[test]
fn morning_only_overload_is_infeasible() {
    // Four large morning-only exams, one room, one day: the single morning
    // slot cannot hold them.
    let mut builder = DatasetBuilder::new(1, start_date());
    for i in 0..4 {
        let course = CourseId::new();
        let exam = builder.exam(&format!("MRN{:03}", 100 + i), course, 60, 120);
        builder.exam_mut(exam).morning_only = true;
    }
    builder.room("HALL-A", 100, false);
    builder.invigilator(4);

    let (_problem, results) = solve_dataset(builder.build(), test_config(5));

    assert_eq!(results.solution.status, SolutionStatus::Infeasible);
    assert!(results.solution.assignments.is_empty());
    assert!(matches!(
        results.termination,
        TerminationReason::Infeasible { .. }
    ));
}

#[test]
fn pruned_variable_space_still_solves() {
    // 15 exams, 8 rooms, 10 days; retention 0.3 with the reference seed.
    let mut builder = DatasetBuilder::new(10, start_date());
    for i in 0..15 {
        let course = CourseId::new();
        builder.exam(&format!("CRS{:03}", 100 + i), course, 25 + i * 3, 120);
        builder.cohort(course, 2, RegistrationKind::Normal);
    }
    for i in 0..8 {
        builder.room(&format!("ROOM-{}", i), 60 + i * 10, false);
    }
    builder.invigilator(10);

    let mut config = test_config(12345);
    config.ga.retention_threshold = 0.3;
    let (problem, results) = solve_dataset(builder.build(), config);

    assert!(
        results.statistics.retained_ratio <= 0.31,
        "retained ratio {} exceeds the threshold",
        results.statistics.retained_ratio
    );
    assert!(matches!(
        results.solution.status,
        SolutionStatus::Optimal | SolutionStatus::Feasible
    ));
    // Every exam ended up placed with a room.
    for exam in problem.exams() {
        let assignment = results.solution.assignment_for(exam.id).unwrap();
        assert!(assignment.is_assigned(), "{} unplaced", exam.course_code);
        assert!(
            !assignment.room_ids.is_empty(),
            "{} has no room",
            exam.course_code
        );
    }
}

#[test]
fn zero_exams_never_invokes_the_backend() {
    let mut builder = DatasetBuilder::new(1, start_date());
    builder.room("HALL-A", 100, false);
    let dataset = builder.build();

    let mut problem = Problem::from_dataset(dataset);
    problem.populate_exam_students().unwrap();
    problem.seal();

    let factory = || -> SearchModel { panic!("backend must not be invoked for zero exams") };
    let results = HybridOrchestrator::new(&problem, test_config(6), factory).run();
    assert_eq!(
        results.termination,
        TerminationReason::Infeasible {
            reason: "NoExams".to_owned()
        }
    );
    assert_eq!(results.solution.status, SolutionStatus::Infeasible);
}

#[test]
fn problem_without_days_never_invokes_the_backend() {
    let mut builder = DatasetBuilder::new(0, start_date());
    builder.exam("DAY000", CourseId::new(), 10, 120);
    builder.room("HALL-A", 50, false);

    let mut problem = Problem::from_dataset(builder.build());
    problem.populate_exam_students().unwrap();
    problem.seal();

    let factory = || -> SearchModel { panic!("backend must not be invoked without days") };
    let results = HybridOrchestrator::new(&problem, test_config(13), factory).run();
    assert_eq!(
        results.termination,
        TerminationReason::Infeasible {
            reason: "NoDays".to_owned()
        }
    );
    assert_eq!(results.solution.status, SolutionStatus::Infeasible);
}

#[test]
fn schedule_is_deterministic_for_a_fixed_seed() {
    let build = || {
        let mut builder = DatasetBuilder::new(3, start_date());
        let mut course_ids = Vec::new();
        for i in 0..6 {
            let course = CourseId::new();
            builder.exam(&format!("DET{:03}", 100 + i), course, 20 + i * 5, 120);
            course_ids.push(course);
        }
        builder.room("HALL-A", 90, false);
        builder.room("HALL-B", 70, false);
        builder.invigilator(4);
        builder.build()
    };

    // The datasets carry different uuids, so compare by course code.
    let placements = |dataset: Dataset| -> HashMap<String, u32> {
        let (problem, results) = solve_dataset(dataset, test_config(77));
        problem
            .exams()
            .iter()
            .map(|exam| {
                let assignment = results.solution.assignment_for(exam.id).unwrap();
                let slot = problem
                    .slot_idx(assignment.slot_id.expect("unassigned exam"))
                    .unwrap();
                (
                    exam.course_code.clone(),
                    problem.indices().slot_order[slot],
                )
            })
            .collect()
    };

    assert_eq!(placements(build()), placements(build()));
}

#[test]
fn cancellation_stops_after_phase_one() {
    let mut builder = DatasetBuilder::new(2, start_date());
    for i in 0..4 {
        builder.exam(&format!("CAN{:03}", 100 + i), CourseId::new(), 20, 120);
    }
    builder.room("HALL-A", 90, false);
    builder.invigilator(2);

    let mut problem = Problem::from_dataset(builder.build());
    problem.populate_exam_students().unwrap();
    problem.seal();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let results = HybridOrchestrator::new(&problem, test_config(8), backend)
        .with_cancellation(cancel)
        .run();

    assert_eq!(results.termination, TerminationReason::BudgetExhausted);
    // The phase-1 timetable is still surfaced for diagnostics.
    assert!(results
        .solution
        .assignments
        .iter()
        .all(|a| a.is_assigned()));
}

#[test]
fn ordering_evolution_keeps_the_best_solution() {
    let mut builder = DatasetBuilder::new(2, start_date());
    for i in 0..4 {
        let course = CourseId::new();
        builder.exam(&format!("EVO{:03}", 100 + i), course, 25, 120);
        builder.cohort(course, 2, RegistrationKind::Normal);
    }
    builder.room("HALL-A", 90, false);
    builder.room("HALL-B", 70, false);
    builder.invigilator(4);

    let mut config = test_config(21);
    config.ga.evolve_orderings = true;
    config.ga.max_generations = 2;
    config.ga.orderings_per_generation = 2;
    let (_problem, results) = solve_dataset(builder.build(), config);

    assert!(matches!(
        results.solution.status,
        SolutionStatus::Optimal | SolutionStatus::Feasible
    ));
    assert!(results.statistics.backend_solves >= 2);
}

#[test]
fn session_pipeline_persists_the_solution() {
    let mut builder = DatasetBuilder::new(1, start_date());
    builder.exam("SES101", CourseId::new(), 30, 120);
    builder.room("HALL-A", 100, false);
    builder.invigilator(2);

    let session_id = Uuid::new_v4();
    let source = MemoryDataSource {
        session_id,
        dataset: builder.build(),
    };
    let mut sink = MemorySink::default();
    let results = schedule_session(
        &source,
        &mut sink,
        session_id,
        test_config(9),
        "standard",
        backend,
        CancellationToken::new(),
    )
    .unwrap();

    assert!(matches!(
        results.solution.status,
        SolutionStatus::Optimal | SolutionStatus::Feasible
    ));
    assert_eq!(sink.persisted.len(), 1);
    let (solution, metadata) = &sink.persisted[0];
    assert_eq!(solution.status, results.solution.status);
    assert_eq!(metadata.template, "standard");
    assert_eq!(metadata.session_id, session_id);
}

#[test]
fn infeasible_session_persists_a_diagnostic_solution() {
    let mut builder = DatasetBuilder::new(1, start_date());
    for i in 0..3 {
        let exam = builder.exam(&format!("INF{:03}", 100 + i), CourseId::new(), 80, 120);
        builder.exam_mut(exam).morning_only = true;
    }
    builder.room("HALL-A", 100, false);
    builder.invigilator(2);

    let session_id = Uuid::new_v4();
    let source = MemoryDataSource {
        session_id,
        dataset: builder.build(),
    };
    let mut sink = MemorySink::default();
    let results = schedule_session(
        &source,
        &mut sink,
        session_id,
        test_config(10),
        "standard",
        backend,
        CancellationToken::new(),
    )
    .unwrap();

    assert!(matches!(
        results.termination,
        TerminationReason::Infeasible { .. }
    ));
    assert_eq!(sink.persisted.len(), 1);
    assert_eq!(sink.persisted[0].0.status, SolutionStatus::Infeasible);
    assert!(sink.persisted[0].0.assignments.is_empty());
}

#[test]
fn unknown_session_id_is_not_found() {
    let mut builder = DatasetBuilder::new(1, start_date());
    builder.exam("ANY101", CourseId::new(), 10, 120);
    builder.room("HALL-A", 50, false);
    let source = MemoryDataSource {
        session_id: Uuid::new_v4(),
        dataset: builder.build(),
    };
    let mut sink = MemorySink::default();
    let result = schedule_session(
        &source,
        &mut sink,
        Uuid::new_v4(),
        test_config(11),
        "standard",
        backend,
        CancellationToken::new(),
    );
    assert!(matches!(
        result,
        Err(ScheduleError::Source(SourceError::NotFound { .. }))
    ));
    assert!(sink.persisted.is_empty());
}

#[test]
fn invalid_dataset_fails_before_solving() {
    // A dataset with exams but no rooms fails validation with exit-worthy
    // reasons collected in one error.
    let mut builder = DatasetBuilder::new(1, start_date());
    builder.exam("VAL101", CourseId::new(), 10, 120);
    let session_id = Uuid::new_v4();
    let source = MemoryDataSource {
        session_id,
        dataset: builder.build(),
    };
    let mut sink = MemorySink::default();
    let result = schedule_session(
        &source,
        &mut sink,
        session_id,
        test_config(12),
        "standard",
        backend,
        CancellationToken::new(),
    );
    match result {
        Err(ScheduleError::Dataset(DatasetError::Invalid { reasons })) => {
            assert!(reasons.iter().any(|r| r.contains("room")));
        }
        other => panic!("expected a dataset error, got {:?}", other.map(|r| r.termination)),
    }
    assert!(sink.persisted.is_empty());
}
