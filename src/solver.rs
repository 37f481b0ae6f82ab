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

//! The two-phase orchestrator.
//!
//! Phase 1 solves the timetabling model (starts and occupancy) for
//! feasibility. Phase 2 builds the full packing model (rooms and
//! invigilators), seeds it with the phase-1 incumbent and the front-filter
//! hints, and optionally evolves variable orderings to steer repeated
//! backend runs toward better timetables. The orchestrator is the only place
//! where component errors become user-visible termination reasons.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::conflicts::ConflictDetector;
use crate::constraints::{compile, CompileOutcome};
use crate::ga::chromosome::{sort_population, terminal_matrix, Chromosome, FitnessBreakdown};
use crate::ga::filter::{FilterOutcome, GaFilter, SearchHint};
use crate::ga::operators::EvolutionManager;
use crate::io::{DataSource, ResultSink, SinkError, SourceError};
use crate::metrics;
use crate::problem::{assert_problem_consistency, DatasetError, Problem, SealError};
use crate::sat::{ConstraintModel, SolveOutcome, SolveStatus};
use crate::solution::{
    AssignmentStatus, ExamAssignment, Solution, SolutionMetadata, SolutionStatus, ValidationError,
};
use crate::vars::{CandidateSpace, SharedVariables, VarKey, VariableFactory};
use ordered_float::NotNan;

/// Cooperative cancellation flag, checked between GA generations, between
/// phases, and after each backend solve.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn flag(&self) -> &AtomicBool {
        &self.flag
    }
}

/// Why the orchestrator stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationReason {
    OptimalFound,
    FeasibleTimeout,
    Infeasible { reason: String },
    BudgetExhausted,
    Error(String),
}

/// Counters and timings surfaced with the results.
#[derive(Default)]
pub struct SolveStatistics {
    pub phase1_time: Duration,
    pub phase2_time: Duration,
    pub filter_generations: usize,
    pub retained_ratio: f64,
    pub variables_created: usize,
    pub constraints_added: usize,
    pub backend_solves: u32,
    pub explosion_retries: u32,
}

impl fmt::Display for SolveStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Solving statistics:
Filter generations:    {: >6}
Retained y ratio:      {: >9.2}
Variables created:     {: >6}
Constraints added:     {: >6}
Backend solves:        {: >6}
Explosion retries:     {: >6}

Phase 1 time: {:.3}s
Phase 2 time: {:.3}s\n",
            self.filter_generations,
            self.retained_ratio,
            self.variables_created,
            self.constraints_added,
            self.backend_solves,
            self.explosion_retries,
            self.phase1_time.as_millis() as f32 / 1000f32,
            self.phase2_time.as_millis() as f32 / 1000f32,
        )
    }
}

/// The outcome handed to the caller (and, serialized, to the result sink).
pub struct OptimizationResults {
    pub solution: Solution,
    pub termination: TerminationReason,
    pub statistics: SolveStatistics,
}

/// Error surface of the full scheduling pipeline.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Seal(#[from] SealError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("solution failed validation: {0}")]
    Validation(#[from] ValidationError),
}

/// Drives the hybrid solve over a sealed problem. The model factory creates
/// one fresh backend model per solve.
pub struct HybridOrchestrator<'a, M, F>
where
    M: ConstraintModel,
    F: Fn() -> M,
{
    problem: &'a Problem,
    config: EngineConfig,
    model_factory: F,
    cancel: CancellationToken,
}

impl<'a, M, F> HybridOrchestrator<'a, M, F>
where
    M: ConstraintModel,
    F: Fn() -> M,
{
    pub fn new(problem: &'a Problem, config: EngineConfig, model_factory: F) -> Self {
        assert!(
            problem.is_sealed(),
            "HybridOrchestrator requires a sealed problem"
        );
        HybridOrchestrator {
            problem,
            config,
            model_factory,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(&self) -> OptimizationResults {
        let mut statistics = SolveStatistics::default();

        if self.problem.exams().is_empty() {
            // Nothing to schedule; the backend is never invoked.
            return OptimizationResults {
                solution: Solution::infeasible(),
                termination: TerminationReason::Infeasible {
                    reason: "NoExams".to_owned(),
                },
                statistics,
            };
        }
        if !self.problem.has_days() {
            return OptimizationResults {
                solution: Solution::infeasible(),
                termination: TerminationReason::Infeasible {
                    reason: "NoDays".to_owned(),
                },
                statistics,
            };
        }

        let space = CandidateSpace::build(self.problem);
        let filter = GaFilter::new(self.problem, &space, self.config.ga.clone());
        let mut filter_outcome = filter.run(None, Some(self.cancel.flag()));
        statistics.filter_generations = filter_outcome.generations_run;
        statistics.retained_ratio = if filter_outcome.candidate_y_count == 0 {
            0.0
        } else {
            filter_outcome.retained.y.len() as f64 / filter_outcome.candidate_y_count as f64
        };

        // ---- Phase 1: timetabling feasibility ----
        let phase1_started = Instant::now();
        let phase1 = match self.build_and_solve(
            &space,
            &mut filter_outcome,
            &filter,
            false,
            &[],
            self.config.cp_sat.phase1_time_limit_s,
            &mut statistics,
        ) {
            Ok(result) => result,
            Err(reason) => {
                statistics.phase1_time = phase1_started.elapsed();
                return self.finish(Solution::infeasible(), reason, statistics);
            }
        };
        statistics.phase1_time = phase1_started.elapsed();

        let (phase1_outcome, phase1_vars, _) = phase1;
        let incumbent_starts = match phase1_outcome.status {
            SolveStatus::Optimal | SolveStatus::Feasible => {
                extract_starts(&phase1_vars, &phase1_outcome)
            }
            SolveStatus::Infeasible | SolveStatus::Unknown => {
                // Unknown without an incumbent collapses to infeasibility.
                let mut solution = Solution::infeasible();
                solution.solver_phase = Some("phase1".to_owned());
                return self.finish(
                    solution,
                    TerminationReason::Infeasible {
                        reason: "phase 1 found no feasible timetable".to_owned(),
                    },
                    statistics,
                );
            }
        };
        info!(
            "phase 1 {}: {} exams placed",
            if phase1_outcome.status == SolveStatus::Optimal {
                "optimal"
            } else {
                "feasible"
            },
            incumbent_starts.len()
        );

        if self.cancel.is_cancelled() {
            let solution = self.phase1_only_solution(&incumbent_starts);
            return self.finish(solution, TerminationReason::BudgetExhausted, statistics);
        }

        // ---- Phase 2: packing and optimization ----
        let phase2_started = Instant::now();
        let start_hints: Vec<SearchHint> = incumbent_starts
            .iter()
            .map(|(e, s)| SearchHint {
                key: VarKey::X(*e, *s),
                value: true,
                confidence: 1.0,
            })
            .collect();

        let phase2 = self.build_and_solve(
            &space,
            &mut filter_outcome,
            &filter,
            true,
            &start_hints,
            self.config.cp_sat.phase2_time_limit_s,
            &mut statistics,
        );
        let (phase2_outcome, phase2_vars, _) = match phase2 {
            Ok(result) => result,
            Err(reason) => {
                statistics.phase2_time = phase2_started.elapsed();
                return self.finish(Solution::infeasible(), reason, statistics);
            }
        };

        let mut best: Option<(Solution, f64, bool)> = None;
        match phase2_outcome.status {
            SolveStatus::Optimal | SolveStatus::Feasible => {
                let solution = self.extract_full(&phase2_vars, &phase2_outcome, "phase2");
                let score = self.score(&solution);
                best = Some((solution, score, phase2_outcome.status == SolveStatus::Optimal));
            }
            SolveStatus::Infeasible | SolveStatus::Unknown => {
                warn!(
                    "packing solve returned {:?}; falling back to the phase-1 timetable",
                    phase2_outcome.status
                );
            }
        }

        // Evolve variable orderings only while optimality is unproven.
        let proven_optimal = best.as_ref().map(|(_, _, optimal)| *optimal).unwrap_or(false);
        let mut budget_exhausted = false;
        if self.config.ga.evolve_orderings && !proven_optimal && best.is_some() {
            budget_exhausted = self.evolve_orderings(
                &space,
                &filter_outcome,
                &start_hints,
                &mut best,
                &mut statistics,
            );
        }
        statistics.phase2_time = phase2_started.elapsed();

        match best {
            Some((mut solution, _, optimal)) => {
                let termination = if optimal {
                    solution.status = SolutionStatus::Optimal;
                    TerminationReason::OptimalFound
                } else if budget_exhausted {
                    solution.status = SolutionStatus::Feasible;
                    TerminationReason::BudgetExhausted
                } else {
                    solution.status = SolutionStatus::Feasible;
                    TerminationReason::FeasibleTimeout
                };
                self.finish(solution, termination, statistics)
            }
            None => {
                // A phase-1 incumbent exists, so surface it room-less rather
                // than reporting infeasibility.
                let solution = self.phase1_only_solution(&incumbent_starts);
                self.finish(solution, TerminationReason::FeasibleTimeout, statistics)
            }
        }
    }

    /// Build a model (with an explosion retry under tightened retention),
    /// apply hints, and run the backend once.
    #[allow(clippy::too_many_arguments)]
    fn build_and_solve(
        &self,
        space: &CandidateSpace,
        filter_outcome: &mut FilterOutcome,
        filter: &GaFilter,
        packing: bool,
        extra_hints: &[SearchHint],
        time_limit_s: u32,
        statistics: &mut SolveStatistics,
    ) -> Result<(SolveOutcome, SharedVariables, CompileOutcome), TerminationReason> {
        let factory = VariableFactory::new(self.problem, space);
        let ceiling = self.config.cp_sat.variable_ceiling;

        let mut model = (self.model_factory)();
        let vars = match factory.encode(&mut model, &filter_outcome.retained, packing, ceiling) {
            Ok(vars) => vars,
            Err(explosion) => {
                // Recoverable once: rerun the filter under double pruning
                // pressure and try again.
                warn!("{}; tightening retention and retrying", explosion);
                statistics.explosion_retries += 1;
                let tightened = self.config.ga.retention_threshold * 0.5;
                *filter_outcome = filter.run(Some(tightened), Some(self.cancel.flag()));
                model = (self.model_factory)();
                factory
                    .encode(&mut model, &filter_outcome.retained, packing, ceiling)
                    .map_err(|second| {
                        TerminationReason::Error(format!(
                            "variable ceiling still exceeded after retry: {}",
                            second
                        ))
                    })?
            }
        };
        statistics.variables_created = vars.count();

        let compiled = compile(&mut model, self.problem, &vars, packing)
            .map_err(|e| TerminationReason::Error(e.to_string()))?;
        statistics.constraints_added += compiled.constraints_added;

        apply_hints(&mut model, &vars, &filter_outcome.hints);
        apply_hints(&mut model, &vars, extra_hints);

        statistics.backend_solves += 1;
        let outcome = model
            .solve(time_limit_s)
            .map_err(|e| TerminationReason::Error(e.to_string()))?;
        debug!(
            "backend solve ({}) finished: {:?}",
            if packing { "packing" } else { "timetabling" },
            outcome.status
        );
        Ok((outcome, vars, compiled))
    }

    /// Phase-2 ordering evolution. Each individual ranks the exams; the
    /// ranking is replayed as hint order on a fresh model, giving the search
    /// a different variable ordering. Returns true when the generation
    /// budget was used up.
    fn evolve_orderings(
        &self,
        space: &CandidateSpace,
        filter_outcome: &FilterOutcome,
        start_hints: &[SearchHint],
        best: &mut Option<(Solution, f64, bool)>,
        statistics: &mut SolveStatistics,
    ) -> bool {
        let features = terminal_matrix(self.problem, space);
        let mut manager = EvolutionManager::new(self.config.ga.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.ga.seed.wrapping_add(1));
        let mut population = manager.seed_population(self.problem.exams().len(), &mut rng);
        let generations = self.config.ga.max_generations;

        for generation in 0..generations {
            if self.cancel.is_cancelled() {
                info!("ordering evolution cancelled in generation {}", generation);
                return false;
            }

            // Score every individual cheaply by its ordering quality proxy,
            // then evaluate the most promising ones against the backend.
            for chromosome in &mut population {
                let spread = ordering_spread(chromosome, &features);
                chromosome.fitness = Some(FitnessBreakdown {
                    total: NotNan::new(spread).unwrap_or_else(|_| NotNan::new(0.0).unwrap()),
                    feasibility: 0.0,
                    coverage: 0.0,
                    diversity_penalty: 0.0,
                });
            }
            sort_population(&mut population);

            let evaluations = self
                .config
                .ga
                .orderings_per_generation
                .min(population.len());
            for chromosome in population.iter().take(evaluations) {
                if self.cancel.is_cancelled() {
                    return false;
                }
                let ordering = exam_ordering(chromosome, &features);
                match self.solve_with_ordering(
                    space,
                    filter_outcome,
                    start_hints,
                    &ordering,
                    statistics,
                ) {
                    Some((solution, score, optimal)) => {
                        let improves = match best {
                            None => true,
                            Some((_, best_score, _)) => score > *best_score,
                        };
                        if improves {
                            debug!(
                                "ordering of chromosome {} improved the score to {:.2}",
                                chromosome.id, score
                            );
                            *best = Some((solution, score, optimal));
                        }
                        if optimal {
                            return false;
                        }
                    }
                    None => continue,
                }
            }

            if generation + 1 < generations {
                population = manager.next_generation(&population, &mut rng);
            }
        }
        true
    }

    fn solve_with_ordering(
        &self,
        space: &CandidateSpace,
        filter_outcome: &FilterOutcome,
        start_hints: &[SearchHint],
        ordering: &[usize],
        statistics: &mut SolveStatistics,
    ) -> Option<(Solution, f64, bool)> {
        let factory = VariableFactory::new(self.problem, space);
        let mut model = (self.model_factory)();
        let vars = factory
            .encode(
                &mut model,
                &filter_outcome.retained,
                true,
                self.config.cp_sat.variable_ceiling,
            )
            .ok()?;
        compile(&mut model, self.problem, &vars, true).ok()?;

        // The ordering is expressed through hint insertion order: the start
        // hint of the highest-priority exam goes in first.
        let start_by_exam: std::collections::HashMap<usize, &SearchHint> = start_hints
            .iter()
            .filter_map(|h| match h.key {
                VarKey::X(e, _) => Some((e, h)),
                _ => None,
            })
            .collect();
        for e in ordering {
            if let Some(hint) = start_by_exam.get(e) {
                apply_hints(&mut model, &vars, std::slice::from_ref(*hint));
            }
        }
        apply_hints(&mut model, &vars, &filter_outcome.hints);

        statistics.backend_solves += 1;
        let outcome = model.solve(self.config.cp_sat.phase2_time_limit_s).ok()?;
        match outcome.status {
            SolveStatus::Optimal | SolveStatus::Feasible => {
                let solution = self.extract_full(&vars, &outcome, "phase2");
                let score = self.score(&solution);
                Some((solution, score, outcome.status == SolveStatus::Optimal))
            }
            _ => None,
        }
    }

    /// Quality score used to compare candidate solutions during phase 2.
    fn score(&self, solution: &Solution) -> f64 {
        let mut probe = solution.clone();
        ConflictDetector::new(self.problem).detect(&mut probe);
        metrics::compute(self.problem, &probe, &self.config.weights).total_score
    }

    /// Turn a backend assignment over the full model into a solution.
    fn extract_full(
        &self,
        vars: &SharedVariables,
        outcome: &SolveOutcome,
        phase: &str,
    ) -> Solution {
        let mut assignments = Vec::new();
        for (e, exam) in self.problem.exams().iter().enumerate() {
            let start = vars
                .x_of_exam(e)
                .into_iter()
                .find(|(_, var)| outcome.value(*var));
            let mut assignment = ExamAssignment::unassigned(exam.id);
            if let Some((s, _)) = start {
                let slot = &self.problem.timeslots()[s];
                assignment.day_id = Some(slot.parent_day_id);
                assignment.slot_id = Some(slot.id);
                assignment.status = AssignmentStatus::Assigned;
                for (r, ys, var) in vars.y_of_exam(e) {
                    if ys == s && outcome.value(var) {
                        assignment.room_ids.push(self.problem.rooms()[r].id);
                        assignment
                            .room_allocations
                            .push(self.problem.allocation(e, r));
                    }
                }
                let mut invigilators: Vec<crate::InvigilatorId> = vars
                    .u
                    .iter()
                    .filter(|((_, ue, _, us), var)| {
                        *ue == e && *us == s && outcome.value(**var)
                    })
                    .map(|((i, _, _, _), _)| self.problem.invigilators()[*i].id)
                    .collect();
                invigilators.sort();
                invigilators.dedup();
                assignment.invigilator_ids = invigilators;
            }
            assignments.push(assignment);
        }
        let mut solution = Solution::new(SolutionStatus::Feasible, assignments);
        solution.objective_value = outcome.objective.map(|o| o as f64);
        solution.solver_phase = Some(phase.to_owned());
        solution
    }

    /// A solution carrying only the phase-1 slot placement (no rooms or
    /// invigilators), used when packing never produced anything.
    fn phase1_only_solution(&self, starts: &[(usize, usize)]) -> Solution {
        let mut assignments = Vec::new();
        for (e, exam) in self.problem.exams().iter().enumerate() {
            let mut assignment = ExamAssignment::unassigned(exam.id);
            if let Some((_, s)) = starts.iter().find(|(se, _)| *se == e) {
                let slot = &self.problem.timeslots()[*s];
                assignment.day_id = Some(slot.parent_day_id);
                assignment.slot_id = Some(slot.id);
                assignment.status = AssignmentStatus::Assigned;
            }
            assignments.push(assignment);
        }
        let mut solution = Solution::new(SolutionStatus::Feasible, assignments);
        solution.solver_phase = Some("phase1".to_owned());
        solution
    }

    /// Final bookkeeping shared by all exits: conflicts, metrics, validation.
    fn finish(
        &self,
        mut solution: Solution,
        termination: TerminationReason,
        statistics: SolveStatistics,
    ) -> OptimizationResults {
        ConflictDetector::new(self.problem).detect(&mut solution);
        solution.quality = Some(metrics::compute(
            self.problem,
            &solution,
            &self.config.weights,
        ));
        let termination = match solution.validate_against(self.problem) {
            Ok(()) => termination,
            Err(e) => {
                solution.status = SolutionStatus::Invalid;
                TerminationReason::Error(e.to_string())
            }
        };
        OptimizationResults {
            solution,
            termination,
            statistics,
        }
    }
}

/// The starts chosen by a timetabling solve, as (exam, slot) pairs.
fn extract_starts(vars: &SharedVariables, outcome: &SolveOutcome) -> Vec<(usize, usize)> {
    vars.x
        .iter()
        .filter(|(_, var)| outcome.value(**var))
        .map(|((e, s), _)| (*e, *s))
        .collect()
}

/// Resolve hint keys against the variable maps and push them into the model.
/// Hints for variables that were never created are dropped silently.
fn apply_hints(model: &mut dyn ConstraintModel, vars: &SharedVariables, hints: &[SearchHint]) {
    for hint in hints {
        let var = match hint.key {
            VarKey::X(e, s) => vars.x.get(&(e, s)),
            VarKey::Z(e, s) => vars.z.get(&(e, s)),
            VarKey::Y(e, r, s) => vars.y.get(&(e, r, s)),
            VarKey::U(i, e, r, s) => vars.u.get(&(i, e, r, s)),
        };
        if let Some(var) = var {
            model.set_hint(*var, hint.value);
        }
    }
}

/// Exams ranked by descending priority under the chromosome, ties by index.
fn exam_ordering(chromosome: &Chromosome, features: &ndarray::Array2<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..chromosome.genes.len()).collect();
    let priorities: Vec<f64> = order
        .iter()
        .map(|e| chromosome.priority(*e, features))
        .collect();
    order.sort_by(|a, b| {
        priorities[*b]
            .partial_cmp(&priorities[*a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(b))
    });
    order
}

/// Cheap ordering-quality proxy: how much the chromosome's priorities spread
/// the exams apart. Orderings that rank everything equal carry no signal for
/// the search.
fn ordering_spread(chromosome: &Chromosome, features: &ndarray::Array2<f64>) -> f64 {
    let n = chromosome.genes.len();
    if n == 0 {
        return 0.0;
    }
    let priorities: Vec<f64> = (0..n).map(|e| chromosome.priority(e, features)).collect();
    let mut distinct = priorities.clone();
    distinct.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    distinct.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    distinct.len() as f64 / n as f64
}

/// Full pipeline: dataset retrieval, ingestion, hybrid solve, persistence.
///
/// Infeasibility is not an error: a diagnostic solution is persisted and the
/// results carry the `Infeasible` termination reason. Only dataset problems,
/// IO failures and validation failures surface as `Err`.
pub fn schedule_session<D, S, M, F>(
    source: &D,
    sink: &mut S,
    session_id: Uuid,
    config: EngineConfig,
    template_name: &str,
    model_factory: F,
    cancel: CancellationToken,
) -> Result<OptimizationResults, ScheduleError>
where
    D: DataSource,
    S: ResultSink,
    M: ConstraintModel,
    F: Fn() -> M,
{
    let solve_started = Instant::now();
    let dataset = source.get_dataset(session_id)?;
    if cfg!(debug_assertions) {
        crate::io::assert_data_consistency(&dataset);
    }

    let mut problem = Problem::from_dataset(dataset);
    problem.populate_exam_students()?;
    problem.validate()?;
    let weights = config.weights.clone();
    problem.registry_mut()?.apply_weights(&weights);
    problem.seal();
    if cfg!(debug_assertions) {
        assert_problem_consistency(&problem);
    }

    let orchestrator =
        HybridOrchestrator::new(&problem, config.clone(), model_factory).with_cancellation(cancel);
    let results = orchestrator.run();
    info!(
        "solve finished: {:?}. {}",
        results.termination, results.statistics
    );

    if results.solution.status == SolutionStatus::Invalid {
        // Never persist a solution that failed the post-extraction checks.
        if let TerminationReason::Error(message) = &results.termination {
            warn!("solution not persisted: {}", message);
        }
        return Ok(results);
    }

    let metadata = SolutionMetadata {
        session_id,
        template: template_name.to_owned(),
        seed: config.ga.seed,
        solver_runtime_s: solve_started.elapsed().as_secs_f64(),
        engine_version: option_env!("CARGO_PKG_VERSION").unwrap_or("unknown").to_owned(),
    };
    sink.persist(&results.solution, &metadata)?;
    Ok(results)
}

#[cfg(test)]
mod tests;
