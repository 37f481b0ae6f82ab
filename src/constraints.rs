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

//! The constraint registry and compiler.
//!
//! Constraints come in two classes. CORE constraints are always applied and a
//! failure in one aborts the build. DYNAMIC constraints are configurable
//! (enabled flag, weight, typed parameters); a failing dynamic module is
//! downgraded to disabled with a warning and the build continues. Soft
//! modules contribute weighted linear terms which the compiler sums into the
//! model's objective.

pub mod core;
pub mod dynamic;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use thiserror::Error;

use crate::config::WeightConfig;
use crate::conflicts::Severity;
use crate::problem::Problem;
use crate::sat::{ConstraintModel, VarId};
use crate::solution::Solution;
use crate::vars::SharedVariables;
use crate::ExamId;

/// Stable string identifier of a constraint module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintId(pub &'static str);

impl std::fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Hard,
    Soft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintCategory {
    Core,
    Dynamic,
}

/// Which model build a constraint participates in. Packing builds include the
/// timetabling constraints as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolvePhase {
    Timetabling,
    Packing,
}

/// Typed parameter value for configurable constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// A configurable constraint as loaded from the admin configuration.
#[derive(Debug, Clone)]
pub struct ConstraintDefinition {
    pub id: ConstraintId,
    pub name: String,
    pub kind: ConstraintKind,
    pub category: ConstraintCategory,
    pub phase: SolvePhase,
    pub enabled: bool,
    pub weight: f64,
    pub parameters: BTreeMap<String, ParamValue>,
}

impl ConstraintDefinition {
    pub fn param_i64(&self, key: &str, default: i64) -> i64 {
        match self.parameters.get(key) {
            Some(ParamValue::Int(v)) => *v,
            _ => default,
        }
    }

    pub fn param_f64(&self, key: &str, default: f64) -> f64 {
        match self.parameters.get(key) {
            Some(ParamValue::Float(v)) => *v,
            Some(ParamValue::Int(v)) => *v as f64,
            _ => default,
        }
    }
}

/// A violation detected when evaluating a solution against one module.
#[derive(Debug, Clone)]
pub struct Violation {
    pub constraint: ConstraintId,
    pub severity: Severity,
    pub affected_exams: Vec<ExamId>,
    pub penalty: f64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintStats {
    pub constraint_count: usize,
    pub build_time: Duration,
}

#[derive(Debug, Error)]
#[error("constraint module {id} failed: {reason}")]
pub struct ConstraintBuildError {
    pub id: ConstraintId,
    pub reason: String,
}

/// Everything a module sees while contributing to the model. Soft modules
/// push `(coefficient, var)` terms into `objective`; the compiler installs
/// the summed objective once at the end.
pub struct BuildContext<'a> {
    pub model: &'a mut dyn ConstraintModel,
    pub problem: &'a Problem,
    pub vars: &'a SharedVariables,
    pub objective: &'a mut Vec<(i64, VarId)>,
}

/// A constraint module. Modules never mutate the problem; they read the
/// shared variables, add clauses/inequalities, and can re-check a finished
/// solution.
pub trait Constraint {
    fn definition(&self) -> &ConstraintDefinition;

    /// Cache any index structures needed by `add_constraints`. Default: none.
    fn initialize_variables(
        &mut self,
        _problem: &Problem,
        _vars: &SharedVariables,
    ) -> Result<(), ConstraintBuildError> {
        Ok(())
    }

    /// Contribute to the model; returns the number of constraints added.
    fn add_constraints(&mut self, ctx: &mut BuildContext) -> Result<usize, ConstraintBuildError>;

    /// Re-check a finished solution; used for GA fitness feedback and
    /// diagnostics.
    fn evaluate(&self, problem: &Problem, solution: &Solution) -> Vec<Violation>;

    fn statistics(&self) -> ConstraintStats;
}

pub const START_UNIQUENESS: ConstraintId = ConstraintId("start-uniqueness");
pub const START_FEASIBILITY: ConstraintId = ConstraintId("start-feasibility");
pub const OCCUPANCY_DEFINITION: ConstraintId = ConstraintId("occupancy-definition");
pub const AGGREGATE_CAPACITY: ConstraintId = ConstraintId("aggregate-capacity");
pub const UNIFIED_STUDENT_CONFLICT: ConstraintId = ConstraintId("unified-student-conflict");
pub const ROOM_ASSIGNMENT_CONSISTENCY: ConstraintId = ConstraintId("room-assignment-consistency");
pub const ROOM_CAPACITY_HARD: ConstraintId = ConstraintId("room-capacity-hard");
pub const ROOM_CONTINUITY: ConstraintId = ConstraintId("room-continuity");
pub const INVIGILATOR_REQUIREMENT: ConstraintId = ConstraintId("invigilator-requirement");
pub const INVIGILATOR_SINGLE_PRESENCE: ConstraintId = ConstraintId("invigilator-single-presence");
pub const INVIGILATOR_CONTINUITY: ConstraintId = ConstraintId("invigilator-continuity");

pub const CARRYOVER_PRIORITY: ConstraintId = ConstraintId("carryover-priority");
pub const EXAM_DISTRIBUTION: ConstraintId = ConstraintId("exam-distribution");
pub const ROOM_UTILIZATION: ConstraintId = ConstraintId("room-utilization");
pub const STAFF_LOAD_BALANCE: ConstraintId = ConstraintId("staff-load-balance");
pub const PREFERENCE_SLOTS: ConstraintId = ConstraintId("preference-slots");

/// Ordered collection of constraint definitions. The core entries cannot be
/// disabled; dynamic entries carry the admin configuration.
#[derive(Debug, Clone)]
pub struct ConstraintRegistry {
    definitions: Vec<ConstraintDefinition>,
}

impl ConstraintRegistry {
    /// The standard registry: all core constraints plus the built-in dynamic
    /// modules with their default weights.
    pub fn with_defaults() -> Self {
        let core = |id: ConstraintId, name: &str, phase: SolvePhase| ConstraintDefinition {
            id,
            name: name.to_owned(),
            kind: ConstraintKind::Hard,
            category: ConstraintCategory::Core,
            phase,
            enabled: true,
            weight: 1.0,
            parameters: BTreeMap::new(),
        };
        let soft = |id: ConstraintId, name: &str, phase: SolvePhase, weight: f64| {
            ConstraintDefinition {
                id,
                name: name.to_owned(),
                kind: ConstraintKind::Soft,
                category: ConstraintCategory::Dynamic,
                phase,
                enabled: true,
                weight,
                parameters: BTreeMap::new(),
            }
        };

        ConstraintRegistry {
            definitions: vec![
                core(START_UNIQUENESS, "Start uniqueness", SolvePhase::Timetabling),
                core(START_FEASIBILITY, "Start feasibility", SolvePhase::Timetabling),
                core(
                    OCCUPANCY_DEFINITION,
                    "Occupancy definition",
                    SolvePhase::Timetabling,
                ),
                core(
                    AGGREGATE_CAPACITY,
                    "Aggregate capacity",
                    SolvePhase::Timetabling,
                ),
                core(
                    UNIFIED_STUDENT_CONFLICT,
                    "Unified student conflict",
                    SolvePhase::Timetabling,
                ),
                core(
                    ROOM_ASSIGNMENT_CONSISTENCY,
                    "Room assignment consistency",
                    SolvePhase::Packing,
                ),
                core(ROOM_CAPACITY_HARD, "Room capacity", SolvePhase::Packing),
                core(ROOM_CONTINUITY, "Room continuity", SolvePhase::Packing),
                core(
                    INVIGILATOR_REQUIREMENT,
                    "Invigilator requirement",
                    SolvePhase::Packing,
                ),
                core(
                    INVIGILATOR_SINGLE_PRESENCE,
                    "Invigilator single presence",
                    SolvePhase::Packing,
                ),
                core(
                    INVIGILATOR_CONTINUITY,
                    "Invigilator continuity",
                    SolvePhase::Packing,
                ),
                soft(
                    CARRYOVER_PRIORITY,
                    "Carryover priority",
                    SolvePhase::Timetabling,
                    1.0,
                ),
                soft(
                    EXAM_DISTRIBUTION,
                    "Exam distribution",
                    SolvePhase::Timetabling,
                    0.4,
                ),
                soft(ROOM_UTILIZATION, "Room utilization", SolvePhase::Packing, 0.7),
                soft(
                    STAFF_LOAD_BALANCE,
                    "Staff load balance",
                    SolvePhase::Packing,
                    0.6,
                ),
                soft(
                    PREFERENCE_SLOTS,
                    "Preferred slots",
                    SolvePhase::Timetabling,
                    0.3,
                ),
            ],
        }
    }

    pub fn definitions(&self) -> &[ConstraintDefinition] {
        &self.definitions
    }

    pub fn get(&self, id: ConstraintId) -> Option<&ConstraintDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    /// Enable or disable a dynamic constraint. Core constraints refuse.
    pub fn set_enabled(&mut self, id: ConstraintId, enabled: bool) -> Result<(), String> {
        let definition = self
            .definitions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| format!("unknown constraint {}", id))?;
        if definition.category == ConstraintCategory::Core {
            return Err(format!("core constraint {} cannot be toggled", id));
        }
        definition.enabled = enabled;
        Ok(())
    }

    pub fn set_weight(&mut self, id: ConstraintId, weight: f64) -> Result<(), String> {
        let definition = self
            .definitions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| format!("unknown constraint {}", id))?;
        definition.weight = weight;
        Ok(())
    }

    pub fn set_param(
        &mut self,
        id: ConstraintId,
        key: &str,
        value: ParamValue,
    ) -> Result<(), String> {
        let definition = self
            .definitions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| format!("unknown constraint {}", id))?;
        definition.parameters.insert(key.to_owned(), value);
        Ok(())
    }

    /// Register an admin-defined rule. The rule must target one of the
    /// parameterizable implementations; anything else is rejected at load.
    pub fn register_custom(&mut self, definition: ConstraintDefinition) -> Result<(), String> {
        let implemented = [
            CARRYOVER_PRIORITY,
            EXAM_DISTRIBUTION,
            ROOM_UTILIZATION,
            STAFF_LOAD_BALANCE,
            PREFERENCE_SLOTS,
        ];
        if !implemented.contains(&definition.id) {
            return Err(format!(
                "admin rule targets unknown constraint implementation {}",
                definition.id
            ));
        }
        if definition.category == ConstraintCategory::Core {
            return Err("admin rules cannot be core".to_owned());
        }
        // Replace an existing definition with the same id.
        self.definitions.retain(|d| d.id != definition.id);
        self.definitions.push(definition);
        Ok(())
    }

    /// Push the configured soft weights into the matching definitions.
    pub fn apply_weights(&mut self, weights: &WeightConfig) {
        for definition in &mut self.definitions {
            let weight = match definition.id {
                CARRYOVER_PRIORITY => weights.carryover_priority,
                EXAM_DISTRIBUTION => weights.exam_distribution,
                ROOM_UTILIZATION => weights.room_utilization,
                STAFF_LOAD_BALANCE => weights.staff_load_balance,
                PREFERENCE_SLOTS => weights.preference_slots,
                _ => continue,
            };
            definition.weight = weight;
        }
    }

    /// Definitions participating in a build: timetabling entries always,
    /// packing entries only when `packing` is set. Dynamic entries must be
    /// enabled; core entries always participate.
    fn for_build(&self, packing: bool) -> Vec<&ConstraintDefinition> {
        self.definitions
            .iter()
            .filter(|d| packing || d.phase == SolvePhase::Timetabling)
            .filter(|d| d.category == ConstraintCategory::Core || d.enabled)
            .collect()
    }
}

/// Instantiate the module implementing a definition.
fn instantiate(definition: &ConstraintDefinition) -> Option<Box<dyn Constraint>> {
    let definition = definition.clone();
    let module: Box<dyn Constraint> = match definition.id {
        START_UNIQUENESS => Box::new(core::StartUniqueness::new(definition)),
        START_FEASIBILITY => Box::new(core::StartFeasibility::new(definition)),
        OCCUPANCY_DEFINITION => Box::new(core::OccupancyDefinition::new(definition)),
        AGGREGATE_CAPACITY => Box::new(core::AggregateCapacity::new(definition)),
        UNIFIED_STUDENT_CONFLICT => Box::new(core::UnifiedStudentConflict::new(definition)),
        ROOM_ASSIGNMENT_CONSISTENCY => {
            Box::new(core::RoomAssignmentConsistency::new(definition))
        }
        ROOM_CAPACITY_HARD => Box::new(core::RoomCapacityHard::new(definition)),
        ROOM_CONTINUITY => Box::new(core::RoomContinuity::new(definition)),
        INVIGILATOR_REQUIREMENT => Box::new(core::InvigilatorRequirement::new(definition)),
        INVIGILATOR_SINGLE_PRESENCE => {
            Box::new(core::InvigilatorSinglePresence::new(definition))
        }
        INVIGILATOR_CONTINUITY => Box::new(core::InvigilatorContinuity::new(definition)),
        CARRYOVER_PRIORITY => Box::new(dynamic::CarryoverPriority::new(definition)),
        EXAM_DISTRIBUTION => Box::new(dynamic::ExamDistribution::new(definition)),
        ROOM_UTILIZATION => Box::new(dynamic::RoomUtilization::new(definition)),
        STAFF_LOAD_BALANCE => Box::new(dynamic::StaffLoadBalance::new(definition)),
        PREFERENCE_SLOTS => Box::new(dynamic::PreferenceSlots::new(definition)),
        _ => return None,
    };
    Some(module)
}

/// Result of one compiler run.
pub struct CompileOutcome {
    pub constraints_added: usize,
    pub module_stats: Vec<(ConstraintId, ConstraintStats)>,
    /// Dynamic modules downgraded to disabled during this build.
    pub disabled_modules: Vec<ConstraintId>,
    pub build_time: Duration,
    /// The instantiated modules, for solution evaluation.
    pub modules: Vec<Box<dyn Constraint>>,
}

/// Assemble the active constraints into the model.
///
/// Core modules are applied first; a failing core module aborts the build.
/// Dynamic module failures are logged and the module is skipped. The summed
/// soft objective is installed into the model at the end.
pub fn compile(
    model: &mut dyn ConstraintModel,
    problem: &Problem,
    vars: &SharedVariables,
    packing: bool,
) -> Result<CompileOutcome, ConstraintBuildError> {
    let build_start = Instant::now();
    let definitions: Vec<ConstraintDefinition> = problem
        .registry()
        .for_build(packing)
        .into_iter()
        .cloned()
        .collect();

    let mut objective: Vec<(i64, VarId)> = Vec::new();
    let mut modules: Vec<Box<dyn Constraint>> = Vec::new();
    let mut module_stats = Vec::new();
    let mut disabled_modules = Vec::new();
    let mut constraints_added = 0usize;

    // Core first, in registry order, then dynamic.
    let ordered = definitions
        .iter()
        .filter(|d| d.category == ConstraintCategory::Core)
        .chain(
            definitions
                .iter()
                .filter(|d| d.category == ConstraintCategory::Dynamic),
        );

    for definition in ordered {
        let mut module = match instantiate(definition) {
            Some(module) => module,
            None => {
                warn!("no implementation for constraint {}; skipped", definition.id);
                continue;
            }
        };
        let is_core = definition.category == ConstraintCategory::Core;
        let result = module.initialize_variables(problem, vars).and_then(|()| {
            let mut ctx = BuildContext {
                model: &mut *model,
                problem,
                vars,
                objective: &mut objective,
            };
            module.add_constraints(&mut ctx)
        });
        match result {
            Ok(count) => {
                constraints_added += count;
                module_stats.push((definition.id, module.statistics()));
                modules.push(module);
            }
            Err(e) if is_core => {
                error!("CORE module {} failed, aborting build: {}", definition.id, e);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "dynamic module {} failed and was disabled: {}",
                    definition.id, e
                );
                disabled_modules.push(definition.id);
            }
        }
    }

    if !objective.is_empty() {
        model.maximize(&objective);
    }

    let build_time = build_start.elapsed();
    info!(
        "constraint build complete: {} constraints from {} modules in {:.3}s{}",
        constraints_added,
        modules.len(),
        build_time.as_secs_f64(),
        if disabled_modules.is_empty() {
            String::new()
        } else {
            format!(" ({} dynamic modules disabled)", disabled_modules.len())
        }
    );

    Ok(CompileOutcome {
        constraints_added,
        module_stats,
        disabled_modules,
        build_time,
        modules,
    })
}

/// Evaluate a solution against every module of a finished build.
pub fn evaluate_all(
    modules: &[Box<dyn Constraint>],
    problem: &Problem,
    solution: &Solution,
) -> Vec<Violation> {
    modules
        .iter()
        .flat_map(|m| m.evaluate(problem, solution))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_defaults_cover_all_core_constraints() {
        let registry = ConstraintRegistry::with_defaults();
        for id in [
            START_UNIQUENESS,
            OCCUPANCY_DEFINITION,
            AGGREGATE_CAPACITY,
            UNIFIED_STUDENT_CONFLICT,
            ROOM_CAPACITY_HARD,
            INVIGILATOR_SINGLE_PRESENCE,
        ] {
            let definition = registry.get(id).expect("core constraint missing");
            assert_eq!(definition.category, ConstraintCategory::Core);
        }
    }

    #[test]
    fn core_constraints_cannot_be_disabled() {
        let mut registry = ConstraintRegistry::with_defaults();
        assert!(registry.set_enabled(START_UNIQUENESS, false).is_err());
        assert!(registry.set_enabled(EXAM_DISTRIBUTION, false).is_ok());
    }

    #[test]
    fn custom_rules_must_target_known_implementations() {
        let mut registry = ConstraintRegistry::with_defaults();
        let mut definition = registry.get(PREFERENCE_SLOTS).unwrap().clone();
        definition.weight = 0.9;
        definition
            .parameters
            .insert("preferred_slot".into(), ParamValue::Int(1));
        assert!(registry.register_custom(definition).is_ok());
        assert_eq!(
            registry.get(PREFERENCE_SLOTS).unwrap().param_i64("preferred_slot", 0),
            1
        );

        let bogus = ConstraintDefinition {
            id: ConstraintId("no-such-module"),
            name: "bogus".into(),
            kind: ConstraintKind::Soft,
            category: ConstraintCategory::Dynamic,
            phase: SolvePhase::Timetabling,
            enabled: true,
            weight: 1.0,
            parameters: BTreeMap::new(),
        };
        assert!(registry.register_custom(bogus).is_err());
    }

    #[test]
    fn timetabling_build_excludes_packing_modules() {
        let registry = ConstraintRegistry::with_defaults();
        let phase1 = registry.for_build(false);
        assert!(phase1.iter().all(|d| d.phase == SolvePhase::Timetabling));
        let phase2 = registry.for_build(true);
        assert!(phase2.len() > phase1.len());
    }
}
