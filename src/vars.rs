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

//! Enumeration and materialization of the x/y/z/u decision-variable lattice.
//!
//! `CandidateSpace` enumerates the tuples that are compatible at all (used by
//! the GA front-filter without touching a model); `VariableFactory` turns the
//! retained subset into model variables with bidirectional key maps. After
//! `encode()` the variable set is frozen.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, warn};
use thiserror::Error;

use crate::problem::Problem;
use crate::sat::{ConstraintModel, VarId};

/// Slots occupied by an exam starting at `start`: `slots_needed` consecutive
/// slots of the same day. `None` when the window would spill past the end of
/// the day.
pub fn occupancy_window(problem: &Problem, exam: usize, start: usize) -> Option<Vec<usize>> {
    let needed = problem.slots_needed(exam);
    let day = problem.day_of_slot(start);
    let day_slots = &problem.indices().day_slots[day.index];
    let position = day_slots.iter().position(|s| *s == start)?;
    if position + needed > day_slots.len() {
        return None;
    }
    Some(day_slots[position..position + needed].to_vec())
}

/// The compatible decision-variable lattice, before GA pruning.
pub struct CandidateSpace {
    /// `(exam, slot)` start candidates.
    pub x: Vec<(usize, usize)>,
    /// Exam -> candidate start slots.
    pub x_per_exam: Vec<Vec<usize>>,
    /// Exam -> slots it may occupy under any candidate start.
    pub occupancy_per_exam: Vec<Vec<usize>>,
    /// `(exam, room, slot)` candidates.
    pub y: Vec<(usize, usize, usize)>,
    /// Exam -> compatible room indices.
    pub compatible_rooms: Vec<Vec<usize>>,
}

impl CandidateSpace {
    pub fn build(problem: &Problem) -> Self {
        let n_exams = problem.exams().len();
        let n_rooms = problem.rooms().len();

        let mut compatible_rooms: Vec<Vec<usize>> = vec![Vec::new(); n_exams];
        for e in 0..n_exams {
            for r in 0..n_rooms {
                if problem.room_compatible(e, r) {
                    compatible_rooms[e].push(r);
                }
            }
        }

        let mut x = Vec::new();
        let mut x_per_exam: Vec<Vec<usize>> = vec![Vec::new(); n_exams];
        let mut occupancy_per_exam: Vec<Vec<usize>> = vec![Vec::new(); n_exams];
        for e in 0..n_exams {
            if compatible_rooms[e].is_empty() {
                warn!(
                    "exam {} has no compatible room; no start candidates",
                    problem.exams()[e].course_code
                );
                continue;
            }
            let mut occupied = BTreeSet::new();
            for s in 0..problem.timeslots().len() {
                if problem.exams()[e].morning_only && problem.timeslots()[s].slot_index != 0 {
                    continue;
                }
                let window = match occupancy_window(problem, e, s) {
                    Some(window) => window,
                    None => continue,
                };
                x.push((e, s));
                x_per_exam[e].push(s);
                occupied.extend(window);
            }
            occupancy_per_exam[e] = occupied.into_iter().collect();
        }

        let mut y = Vec::new();
        for e in 0..n_exams {
            for r in &compatible_rooms[e] {
                for s in &occupancy_per_exam[e] {
                    y.push((e, *r, *s));
                }
            }
        }

        debug!(
            "Candidate space: {} x candidates, {} y candidates",
            x.len(),
            y.len()
        );
        CandidateSpace {
            x,
            x_per_exam,
            occupancy_per_exam,
            y,
            compatible_rooms,
        }
    }
}

/// The y/u tuples surviving the GA front-filter.
#[derive(Debug, Clone, Default)]
pub struct RetainedVars {
    pub y: BTreeSet<(usize, usize, usize)>,
    pub u: BTreeSet<(usize, usize, usize, usize)>,
}

impl RetainedVars {
    /// Retain everything: the full compatible lattice. Used when the filter
    /// is disabled (retention threshold 1.0).
    pub fn full(problem: &Problem, space: &CandidateSpace) -> Self {
        let y: BTreeSet<_> = space.y.iter().copied().collect();
        let mut u = BTreeSet::new();
        for (e, r, s) in &y {
            for (i, invigilator) in problem.invigilators().iter().enumerate() {
                if !invigilator.can_invigilate {
                    continue;
                }
                let day = problem.day_of_slot(*s);
                if invigilator.is_available(day.id, problem.timeslots()[*s].id) {
                    u.insert((i, *e, *r, *s));
                }
            }
        }
        RetainedVars { y, u }
    }
}

/// Identity of a model variable in engine terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKey {
    /// Exam starts at slot.
    X(usize, usize),
    /// Exam occupies slot.
    Z(usize, usize),
    /// Exam uses room during slot.
    Y(usize, usize, usize),
    /// Invigilator supervises exam in room at slot.
    U(usize, usize, usize, usize),
}

/// Variable count would exceed the configured ceiling. Recoverable once by
/// re-running the GA filter under tighter retention.
#[derive(Debug, Error)]
#[error("variable ceiling exceeded: {requested} requested, ceiling {ceiling}")]
pub struct VariableExplosion {
    pub requested: usize,
    pub ceiling: usize,
}

/// The frozen, indexed variable families of one model build.
pub struct SharedVariables {
    pub x: BTreeMap<(usize, usize), VarId>,
    pub z: BTreeMap<(usize, usize), VarId>,
    pub y: BTreeMap<(usize, usize, usize), VarId>,
    pub u: BTreeMap<(usize, usize, usize, usize), VarId>,
    key_of: HashMap<VarId, VarKey>,
}

impl SharedVariables {
    pub fn key_of(&self, var: VarId) -> Option<VarKey> {
        self.key_of.get(&var).copied()
    }

    pub fn count(&self) -> usize {
        self.key_of.len()
    }

    /// Start variables of one exam, in slot order.
    pub fn x_of_exam(&self, exam: usize) -> Vec<(usize, VarId)> {
        self.x
            .range((exam, 0)..(exam + 1, 0))
            .map(|((_, s), v)| (*s, *v))
            .collect()
    }

    /// Room variables of one exam, in (room, slot) order.
    pub fn y_of_exam(&self, exam: usize) -> Vec<(usize, usize, VarId)> {
        self.y
            .range((exam, 0, 0)..(exam + 1, 0, 0))
            .map(|((_, r, s), v)| (*r, *s, *v))
            .collect()
    }
}

/// Builds `SharedVariables` from a sealed problem and the retained tuples.
pub struct VariableFactory<'a> {
    problem: &'a Problem,
    space: &'a CandidateSpace,
}

impl<'a> VariableFactory<'a> {
    pub fn new(problem: &'a Problem, space: &'a CandidateSpace) -> Self {
        assert!(
            problem.is_sealed(),
            "VariableFactory requires a sealed problem"
        );
        VariableFactory { problem, space }
    }

    /// Create the variable families in the model. Creation order is
    /// deterministic; the returned maps are frozen.
    ///
    /// `include_packing` controls whether the y/u families are materialized;
    /// the phase-1 timetabling model runs without them.
    pub fn encode(
        &self,
        model: &mut dyn ConstraintModel,
        retained: &RetainedVars,
        include_packing: bool,
        ceiling: usize,
    ) -> Result<SharedVariables, VariableExplosion> {
        let retained_y: Vec<(usize, usize, usize)> = if include_packing {
            retained
                .y
                .iter()
                .filter(|(e, r, s)| {
                    self.space.compatible_rooms[*e].contains(r)
                        && self.space.occupancy_per_exam[*e].contains(s)
                })
                .copied()
                .collect()
        } else {
            Vec::new()
        };

        // Count before creating anything so an explosion leaves the model
        // untouched.
        let n_x = self.space.x.len();
        let n_z_extra: usize = (0..self.problem.exams().len())
            .filter(|e| self.problem.slots_needed(*e) > 1)
            .map(|e| self.space.occupancy_per_exam[e].len())
            .sum();
        let retained_u: Vec<(usize, usize, usize, usize)> = if include_packing {
            let y_set: BTreeSet<_> = retained_y.iter().copied().collect();
            retained
                .u
                .iter()
                .filter(|(i, e, r, s)| {
                    if !y_set.contains(&(*e, *r, *s)) {
                        return false;
                    }
                    let invigilator = &self.problem.invigilators()[*i];
                    if !invigilator.can_invigilate {
                        return false;
                    }
                    let day = self.problem.day_of_slot(*s);
                    invigilator.is_available(day.id, self.problem.timeslots()[*s].id)
                })
                .copied()
                .collect()
        } else {
            Vec::new()
        };

        let requested = n_x + n_z_extra + retained_y.len() + retained_u.len();
        if requested > ceiling {
            return Err(VariableExplosion {
                requested,
                ceiling,
            });
        }

        let mut vars = SharedVariables {
            x: BTreeMap::new(),
            z: BTreeMap::new(),
            y: BTreeMap::new(),
            u: BTreeMap::new(),
            key_of: HashMap::new(),
        };

        for (e, s) in &self.space.x {
            let code = &self.problem.exams()[*e].course_code;
            let var = model.new_bool(&format!("x[{},{}]", code, s));
            vars.x.insert((*e, *s), var);
            vars.key_of.insert(var, VarKey::X(*e, *s));
        }
        for e in 0..self.problem.exams().len() {
            let code = &self.problem.exams()[e].course_code;
            if self.problem.slots_needed(e) == 1 {
                // Single-slot exams occupy exactly their start slot.
                for s in &self.space.x_per_exam[e] {
                    let var = vars.x[&(e, *s)];
                    vars.z.insert((e, *s), var);
                }
            } else {
                for s in &self.space.occupancy_per_exam[e] {
                    let var = model.new_bool(&format!("z[{},{}]", code, s));
                    vars.z.insert((e, *s), var);
                    vars.key_of.insert(var, VarKey::Z(e, *s));
                }
            }
        }
        for (e, r, s) in &retained_y {
            let code = &self.problem.exams()[*e].course_code;
            let room = &self.problem.rooms()[*r].code;
            let var = model.new_bool(&format!("y[{},{},{}]", code, room, s));
            vars.y.insert((*e, *r, *s), var);
            vars.key_of.insert(var, VarKey::Y(*e, *r, *s));
        }
        for (i, e, r, s) in &retained_u {
            let code = &self.problem.exams()[*e].course_code;
            let var = model.new_bool(&format!("u[{},{},{},{}]", i, code, r, s));
            vars.u.insert((*i, *e, *r, *s), var);
            vars.key_of.insert(var, VarKey::U(*i, *e, *r, *s));
        }

        // Existence dependencies: every y has its z (and x family), every u
        // its y. Constraint modules rely on this to link without checks.
        debug_assert!(vars
            .y
            .keys()
            .all(|(e, _, s)| vars.z.contains_key(&(*e, *s))));
        debug_assert!(vars
            .u
            .keys()
            .all(|(i, e, r, s)| {
                let _ = i;
                vars.y.contains_key(&(*e, *r, *s))
            }));

        debug!(
            "Variable factory: {} x, {} z, {} y, {} u ({} total, ceiling {})",
            vars.x.len(),
            vars.z.len(),
            vars.y.len(),
            vars.u.len(),
            vars.count(),
            ceiling
        );
        Ok(vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::DatasetBuilder;
    use crate::sat::search::SearchModel;
    use crate::CourseId;
    use chrono::NaiveDate;

    fn small_problem() -> Problem {
        let mut builder = DatasetBuilder::new(2, NaiveDate::from_ymd_opt(2026, 4, 13).unwrap());
        builder.exam("CSC111", CourseId::new(), 40, 120);
        builder.exam("CSC112", CourseId::new(), 40, 240);
        builder.room("LAB-1", 60, true);
        builder.room("HALL-B", 120, false);
        builder.invigilator(2);
        let mut problem = Problem::from_dataset(builder.build());
        problem.populate_exam_students().unwrap();
        problem.seal();
        problem
    }

    #[test]
    fn occupancy_window_respects_day_boundary() {
        let problem = small_problem();
        // Exam 1 (CSC112) needs two slots; starting at the evening slot of a
        // day must be rejected.
        let evening = problem.indices().day_slots[0][2];
        assert!(occupancy_window(&problem, 1, evening).is_none());
        let morning = problem.indices().day_slots[0][0];
        let window = occupancy_window(&problem, 1, morning).unwrap();
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn multi_slot_exams_get_fewer_start_candidates() {
        let problem = small_problem();
        let space = CandidateSpace::build(&problem);
        // 2 days x 3 slots: single-slot exam starts anywhere, the two-slot
        // exam only in the first two slots of each day.
        assert_eq!(space.x_per_exam[0].len(), 6);
        assert_eq!(space.x_per_exam[1].len(), 4);
    }

    #[test]
    fn encode_creates_linked_families() {
        let problem = small_problem();
        let space = CandidateSpace::build(&problem);
        let retained = RetainedVars::full(&problem, &space);
        let factory = VariableFactory::new(&problem, &space);
        let mut model = SearchModel::new();
        let vars = factory
            .encode(&mut model, &retained, true, 500_000)
            .unwrap();
        assert!(!vars.y.is_empty());
        for (e, _r, s) in vars.y.keys() {
            assert!(vars.z.contains_key(&(*e, *s)));
        }
        for (_i, e, r, s) in vars.u.keys() {
            assert!(vars.y.contains_key(&(*e, *r, *s)));
        }
        // Single-slot exam shares variables between x and z.
        let x0 = vars.x[&(0, space.x_per_exam[0][0])];
        assert_eq!(vars.z[&(0, space.x_per_exam[0][0])], x0);
    }

    #[test]
    fn ceiling_overflow_is_reported() {
        let problem = small_problem();
        let space = CandidateSpace::build(&problem);
        let retained = RetainedVars::full(&problem, &space);
        let factory = VariableFactory::new(&problem, &space);
        let mut model = SearchModel::new();
        let result = factory.encode(&mut model, &retained, true, 4);
        match result {
            Err(VariableExplosion { requested, ceiling }) => {
                assert!(requested > 4);
                assert_eq!(ceiling, 4);
                assert_eq!(model.num_vars(), 0, "model must stay untouched");
            }
            Ok(_) => panic!("expected a variable explosion"),
        }
    }
}
