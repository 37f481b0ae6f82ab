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

//! The GA front-filter: shrinks the y/u variable lattice to a retained subset
//! and derives search hints from cross-population usage.
//!
//! Retention is monotone: each generation selects its top-k from the
//! previously retained set, so `retained(g+1) ⊆ retained(g)`. The only
//! exception is the cover floor: an exam that no individual covers gets its
//! full candidate set back, with a warning, so the filter never removes an
//! exam's last viable room/slot pair.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use ordered_float::NotNan;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::GaConfig;
use crate::ga::chromosome::{terminal_matrix, Chromosome, FitnessBreakdown};
use crate::ga::operators::EvolutionManager;
use crate::problem::Problem;
use crate::required_invigilators;
use crate::vars::{CandidateSpace, RetainedVars, VarKey};

/// A start-value suggestion for the backend search.
#[derive(Debug, Clone, Copy)]
pub struct SearchHint {
    pub key: VarKey,
    pub value: bool,
    /// Cross-population usage frequency in `[0, 1]`.
    pub confidence: f64,
}

/// Aggregated per-tuple usage counts across all evaluated individuals.
#[derive(Debug, Default)]
pub struct VariableRelevanceStats {
    pub usage: BTreeMap<(usize, usize, usize), u64>,
    /// Number of individual evaluations folded in.
    pub samples: u64,
}

/// Everything the filter hands to the orchestrator.
pub struct FilterOutcome {
    pub retained: RetainedVars,
    pub hints: Vec<SearchHint>,
    pub stats: VariableRelevanceStats,
    pub generations_run: usize,
    pub best_fitness_history: Vec<f64>,
    /// Population-average fitness per generation; read together with the
    /// best-fitness history to judge convergence pressure.
    pub mean_fitness_history: Vec<f64>,
    /// Retained y count after each generation; non-increasing apart from
    /// cover-floor bypasses.
    pub retained_history: Vec<usize>,
    /// Exams whose full candidate set was restored by the cover floor.
    pub bypassed_exams: Vec<usize>,
    pub candidate_y_count: usize,
}

pub struct GaFilter<'a> {
    problem: &'a Problem,
    space: &'a CandidateSpace,
    config: GaConfig,
}

impl<'a> GaFilter<'a> {
    pub fn new(problem: &'a Problem, space: &'a CandidateSpace, config: GaConfig) -> Self {
        GaFilter {
            problem,
            space,
            config,
        }
    }

    /// Run the exploration loop. `retention_override` replaces the configured
    /// threshold (used by the explosion retry); `cancel` is checked between
    /// generations.
    pub fn run(
        &self,
        retention_override: Option<f64>,
        cancel: Option<&AtomicBool>,
    ) -> FilterOutcome {
        let threshold = retention_override
            .unwrap_or(self.config.retention_threshold)
            .clamp(0.0, 1.0);
        let candidates = &self.space.y;

        if candidates.is_empty() || threshold >= 1.0 {
            // Pruning disabled (or nothing to prune): the retained sets equal
            // the full compatible lattice.
            debug!("front-filter bypass: threshold {}", threshold);
            return FilterOutcome {
                retained: RetainedVars::full(self.problem, self.space),
                hints: Vec::new(),
                stats: VariableRelevanceStats::default(),
                generations_run: 0,
                best_fitness_history: Vec::new(),
                mean_fitness_history: Vec::new(),
                retained_history: Vec::new(),
                bypassed_exams: Vec::new(),
                candidate_y_count: candidates.len(),
            };
        }

        let exams_with_candidates: Vec<usize> = (0..self.problem.exams().len())
            .filter(|e| !self.space.x_per_exam[*e].is_empty())
            .collect();
        let k = ((threshold * candidates.len() as f64).ceil() as usize)
            .max(exams_with_candidates.len())
            .min(candidates.len());

        let features = terminal_matrix(self.problem, self.space);
        let tuple_fit: Vec<f64> = candidates
            .iter()
            .map(|(e, r, s)| self.room_fit(*e, *r) * self.slot_fit(*e, *s))
            .collect();

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut manager = EvolutionManager::new(self.config.clone());
        let mut population =
            manager.seed_population(self.problem.exams().len(), &mut rng);

        let mut retained_idx: BTreeSet<usize> = (0..candidates.len()).collect();
        let mut stats = VariableRelevanceStats::default();
        let mut best_fitness_history = Vec::new();
        let mut mean_fitness_history = Vec::new();
        let mut retained_history = Vec::new();
        let mut bypassed_exams: BTreeSet<usize> = BTreeSet::new();
        let mut generations_run = 0;

        for generation in 0..self.config.max_generations {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    info!("front-filter cancelled after {} generations", generation);
                    break;
                }
            }
            generations_run = generation + 1;

            // Score and rank tuples per individual, fold usage into the
            // aggregate, and evaluate fitness.
            let mut usage_this_gen: HashMap<usize, u32> = HashMap::new();
            for chromosome in &mut population {
                let priorities: Vec<f64> = (0..self.problem.exams().len())
                    .map(|e| chromosome.priority(e, &features))
                    .collect();
                let top = top_k_for_individual(
                    candidates,
                    &retained_idx,
                    &tuple_fit,
                    &priorities,
                    k,
                );
                for idx in &top {
                    *usage_this_gen.entry(*idx).or_insert(0) += 1;
                    *stats.usage.entry(candidates[*idx]).or_insert(0) += 1;
                }
                stats.samples += 1;

                chromosome.fitness = Some(self.evaluate(
                    chromosome,
                    &top,
                    candidates,
                    &tuple_fit,
                    &priorities,
                    &exams_with_candidates,
                ));
            }

            let best = population
                .iter()
                .map(|c| c.total_fitness())
                .max()
                .unwrap_or_else(|| NotNan::new(0.0).unwrap());
            best_fitness_history.push(best.into_inner());
            let mean = population
                .iter()
                .map(|c| c.total_fitness().into_inner())
                .sum::<f64>()
                / population.len() as f64;
            mean_fitness_history.push(mean);

            // Monotone pruning: the next retained set is the top-k of the
            // current one, ranked by aggregated usage. The per-generation k
            // descends linearly toward the retention target so pruning is
            // gradual rather than a single cliff.
            let generations = self.config.max_generations.max(1);
            let remaining = generations - (generation + 1);
            let k_generation = k + (candidates.len() - k) * remaining / generations;
            retained_idx = self.shrink_retained(
                candidates,
                retained_idx,
                &stats,
                &tuple_fit,
                k_generation,
                &mut bypassed_exams,
            );
            retained_history.push(retained_idx.len());

            if converged(&best_fitness_history, self.config.convergence_epsilon) {
                debug!(
                    "front-filter converged after {} generations (best fitness {:.4})",
                    generation + 1,
                    best
                );
                break;
            }
            if generation + 1 < self.config.max_generations {
                population = manager.next_generation(&population, &mut rng);
            }
        }

        // Convergence or cancellation may break out before the descent
        // reaches the target; one last shrink enforces the threshold.
        if retained_idx.len() > k {
            retained_idx = self.shrink_retained(
                candidates,
                retained_idx,
                &stats,
                &tuple_fit,
                k,
                &mut bypassed_exams,
            );
            retained_history.push(retained_idx.len());
        }

        let retained_y: BTreeSet<(usize, usize, usize)> = retained_idx
            .iter()
            .map(|idx| candidates[*idx])
            .collect();
        let retained_u = self.rank_invigilators(&retained_y);
        let hints = self.derive_hints(&retained_y, &stats);

        info!(
            "front-filter retained {}/{} y tuples ({} u tuples, {} hints, {} generations)",
            retained_y.len(),
            candidates.len(),
            retained_u.len(),
            hints.len(),
            generations_run
        );

        FilterOutcome {
            retained: RetainedVars {
                y: retained_y,
                u: retained_u,
            },
            hints,
            stats,
            generations_run,
            best_fitness_history,
            mean_fitness_history,
            retained_history,
            bypassed_exams: bypassed_exams.into_iter().collect(),
            candidate_y_count: candidates.len(),
        }
    }

    /// Room fit: 1.0 when the room matches the exam size, shrinking linearly
    /// with mismatch in either direction. Incompatible pairs never reach the
    /// candidate list.
    fn room_fit(&self, exam: usize, room: usize) -> f64 {
        let expected = self.problem.exams()[exam].expected_students.max(1) as f64;
        let capacity = self.problem.rooms()[room].exam_capacity().max(1) as f64;
        (expected.min(capacity) / expected.max(capacity)).max(0.05)
    }

    /// Slot fit: early slots rank slightly higher and evenings carry a small
    /// penalty, so ties between otherwise equal tuples break chronologically.
    fn slot_fit(&self, _exam: usize, slot: usize) -> f64 {
        let order = self.problem.indices().slot_order[slot] as f64;
        let max_order = (self.problem.timeslots().len() as f64 - 1.0).max(1.0);
        let evening = self.problem.timeslots()[slot].slot_index == 2;
        let fit = 1.0 - 0.3 * (order / max_order) - if evening { 0.1 } else { 0.0 };
        fit.max(0.1)
    }

    /// Fitness: cheap feasibility estimate over the individual's retained
    /// set, coverage of exams, and a bloat penalty.
    fn evaluate(
        &self,
        chromosome: &Chromosome,
        top: &[usize],
        candidates: &[(usize, usize, usize)],
        tuple_fit: &[f64],
        priorities: &[f64],
        exams_with_candidates: &[usize],
    ) -> FitnessBreakdown {
        let mut covered: BTreeSet<usize> = BTreeSet::new();
        for idx in top {
            covered.insert(candidates[*idx].0);
        }
        let coverage = if exams_with_candidates.is_empty() {
            1.0
        } else {
            exams_with_candidates
                .iter()
                .filter(|e| covered.contains(e))
                .count() as f64
                / exams_with_candidates.len() as f64
        };

        let feasibility = self.greedy_feasibility(top, candidates, tuple_fit, priorities);

        // Bloat penalty, normalized against a 64-node-per-gene budget.
        let genes = chromosome.genes.len().max(1);
        let diversity_penalty =
            0.05 * ((chromosome.total_nodes() as f64 / (genes as f64 * 64.0)).min(1.0));

        let total = 0.55 * feasibility + 0.40 * coverage - diversity_penalty;
        FitnessBreakdown {
            total: NotNan::new(total).unwrap_or_else(|_| NotNan::new(0.0).unwrap()),
            feasibility,
            coverage,
            diversity_penalty,
        }
    }

    /// Greedy placement over the individual's retained tuples: exams in
    /// descending size order take their best tuple whose room still has
    /// seats and whose slot holds no hard-conflicting neighbor. Returns the
    /// fraction of exams placed.
    fn greedy_feasibility(
        &self,
        top: &[usize],
        candidates: &[(usize, usize, usize)],
        tuple_fit: &[f64],
        priorities: &[f64],
    ) -> f64 {
        let indices = self.problem.indices();
        let mut per_exam: HashMap<usize, Vec<usize>> = HashMap::new();
        for idx in top {
            per_exam.entry(candidates[*idx].0).or_default().push(*idx);
        }
        if per_exam.is_empty() {
            return 0.0;
        }

        let mut exam_order: Vec<usize> = per_exam.keys().copied().collect();
        exam_order.sort_by_key(|e| {
            std::cmp::Reverse(self.problem.exams()[*e].expected_students)
        });

        let mut remaining: HashMap<(usize, usize), i64> = HashMap::new();
        let mut slot_of_exam: HashMap<usize, usize> = HashMap::new();
        let mut placed = 0usize;

        for e in &exam_order {
            let mut options = per_exam[e].clone();
            options.sort_by(|a, b| {
                let score_a = priorities[candidates[*a].0] * tuple_fit[*a];
                let score_b = priorities[candidates[*b].0] * tuple_fit[*b];
                score_b
                    .partial_cmp(&score_a)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(b))
            });
            for idx in options {
                let (exam, room, slot) = candidates[idx];
                let conflict = indices.exam_neighbors[exam]
                    .iter()
                    .any(|n| slot_of_exam.get(n) == Some(&slot));
                if conflict {
                    continue;
                }
                let capacity = remaining
                    .entry((room, slot))
                    .or_insert_with(|| i64::from(self.problem.rooms()[room].exam_capacity()));
                let needed = i64::from(self.problem.allocation(exam, room));
                if *capacity >= needed {
                    *capacity -= needed;
                    slot_of_exam.insert(exam, slot);
                    placed += 1;
                    break;
                }
            }
        }
        placed as f64 / per_exam.len() as f64
    }

    /// Select the next retained set: top-k of the current set by aggregated
    /// usage, with the per-exam cover floor applied afterwards.
    fn shrink_retained(
        &self,
        candidates: &[(usize, usize, usize)],
        current: BTreeSet<usize>,
        stats: &VariableRelevanceStats,
        tuple_fit: &[f64],
        k: usize,
        bypassed_exams: &mut BTreeSet<usize>,
    ) -> BTreeSet<usize> {
        let mut ranked: Vec<usize> = current.iter().copied().collect();
        ranked.sort_by(|a, b| {
            let usage_a = stats.usage.get(&candidates[*a]).copied().unwrap_or(0);
            let usage_b = stats.usage.get(&candidates[*b]).copied().unwrap_or(0);
            usage_b.cmp(&usage_a).then(a.cmp(b))
        });
        let mut next: BTreeSet<usize> = ranked.into_iter().take(k).collect();

        // Cover floor. An exam whose tuples were never used by any individual
        // keeps its full candidate set; an exam merely crowded out of the
        // top-k keeps its best tuple.
        for e in 0..self.problem.exams().len() {
            if self.space.x_per_exam[e].is_empty() {
                continue;
            }
            if next.iter().any(|idx| candidates[*idx].0 == e) {
                continue;
            }
            let exam_tuples: Vec<usize> = (0..candidates.len())
                .filter(|idx| candidates[*idx].0 == e)
                .collect();
            let ever_used = exam_tuples
                .iter()
                .any(|idx| stats.usage.contains_key(&candidates[*idx]));
            if !ever_used {
                warn!(
                    "no individual covers exam {}; keeping its full candidate set",
                    self.problem.exams()[e].course_code
                );
                bypassed_exams.insert(e);
                next.extend(exam_tuples);
            } else {
                let best = exam_tuples.into_iter().max_by(|a, b| {
                    let usage_a = stats.usage.get(&candidates[*a]).copied().unwrap_or(0);
                    let usage_b = stats.usage.get(&candidates[*b]).copied().unwrap_or(0);
                    usage_a
                        .cmp(&usage_b)
                        .then(
                            tuple_fit[*a]
                                .partial_cmp(&tuple_fit[*b])
                                .unwrap_or(std::cmp::Ordering::Equal),
                        )
                        .then(b.cmp(a))
                });
                if let Some(best) = best {
                    next.insert(best);
                }
            }
        }
        next
    }

    /// Pair each retained room-slot with invigilators ranked by availability,
    /// department match and tentative load.
    fn rank_invigilators(
        &self,
        retained_y: &BTreeSet<(usize, usize, usize)>,
    ) -> BTreeSet<(usize, usize, usize, usize)> {
        let invigilators = self.problem.invigilators();
        let mut load: Vec<u32> = vec![0; invigilators.len()];
        let mut retained_u = BTreeSet::new();

        for (e, r, s) in retained_y {
            let exam = &self.problem.exams()[*e];
            let day = self.problem.day_of_slot(*s);
            let slot_id = self.problem.timeslots()[*s].id;
            let mut eligible: Vec<usize> = (0..invigilators.len())
                .filter(|i| {
                    invigilators[*i].can_invigilate
                        && invigilators[*i].is_available(day.id, slot_id)
                })
                .collect();
            eligible.sort_by_key(|i| {
                let dept_match = exam.department_id.is_some()
                    && invigilators[*i].department == exam.department_id;
                (!dept_match, load[*i], *i)
            });
            let take = (required_invigilators(exam) as usize + 1).min(eligible.len());
            for i in eligible.into_iter().take(take) {
                load[i] += 1;
                retained_u.insert((i, *e, *r, *s));
            }
        }
        retained_u
    }

    /// Hints: per exam, the most-used tuple becomes a positive start hint for
    /// its x and y variables, with the usage frequency as confidence.
    fn derive_hints(
        &self,
        retained_y: &BTreeSet<(usize, usize, usize)>,
        stats: &VariableRelevanceStats,
    ) -> Vec<SearchHint> {
        if stats.samples == 0 {
            return Vec::new();
        }
        let mut best_per_exam: BTreeMap<usize, ((usize, usize, usize), u64)> = BTreeMap::new();
        for tuple in retained_y {
            let usage = stats.usage.get(tuple).copied().unwrap_or(0);
            let entry = best_per_exam.entry(tuple.0).or_insert((*tuple, usage));
            if usage > entry.1 {
                *entry = (*tuple, usage);
            }
        }

        let mut hints = Vec::new();
        for (exam, ((e, r, s), usage)) in best_per_exam {
            let confidence = usage as f64 / stats.samples as f64;
            if confidence < 0.2 {
                continue;
            }
            debug_assert_eq!(exam, e);
            hints.push(SearchHint {
                key: VarKey::X(e, s),
                value: true,
                confidence,
            });
            hints.push(SearchHint {
                key: VarKey::Y(e, r, s),
                value: true,
                confidence,
            });
        }
        hints
    }
}

/// Top-k tuples for one individual, by score descending with index
/// tie-breaks, restricted to the currently retained set. Each exam's
/// best-scoring tuple is always included, so an individual never drops an
/// exam entirely; the remaining slots fill in global score order.
fn top_k_for_individual(
    candidates: &[(usize, usize, usize)],
    retained: &BTreeSet<usize>,
    tuple_fit: &[f64],
    priorities: &[f64],
    k: usize,
) -> Vec<usize> {
    let mut scored: Vec<usize> = retained.iter().copied().collect();
    scored.sort_by(|a, b| {
        let score_a = priorities[candidates[*a].0] * tuple_fit[*a];
        let score_b = priorities[candidates[*b].0] * tuple_fit[*b];
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(b))
    });

    let mut chosen = Vec::with_capacity(k);
    let mut in_chosen = vec![false; candidates.len()];
    let mut covered: BTreeSet<usize> = BTreeSet::new();
    for idx in &scored {
        if covered.insert(candidates[*idx].0) {
            chosen.push(*idx);
            in_chosen[*idx] = true;
        }
    }
    for idx in &scored {
        if chosen.len() >= k {
            break;
        }
        if !in_chosen[*idx] {
            chosen.push(*idx);
            in_chosen[*idx] = true;
        }
    }
    chosen
}

/// Variance of the trailing five best-fitness samples below epsilon.
fn converged(history: &[f64], epsilon: f64) -> bool {
    if history.len() < 5 {
        return false;
    }
    let window = &history[history.len() - 5..];
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let variance =
        window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / window.len() as f64;
    variance < epsilon
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::DatasetBuilder;
    use crate::CourseId;
    use chrono::NaiveDate;

    fn medium_problem() -> Problem {
        let mut builder = DatasetBuilder::new(5, NaiveDate::from_ymd_opt(2026, 4, 13).unwrap());
        for i in 0..8 {
            let course = CourseId::new();
            builder.exam(&format!("CRS{:03}", 100 + i), course, 30 + i * 5, 120);
            builder.cohort(course, 3, crate::RegistrationKind::Normal);
        }
        builder.room("HALL-A", 80, false);
        builder.room("HALL-B", 60, false);
        builder.room("HALL-C", 50, false);
        builder.invigilator(6);
        let mut problem = Problem::from_dataset(builder.build());
        problem.populate_exam_students().unwrap();
        problem.seal();
        problem
    }

    fn config(seed: u64) -> GaConfig {
        GaConfig {
            population_size: 12,
            max_generations: 6,
            retention_threshold: 0.3,
            seed,
            ..GaConfig::default()
        }
    }

    #[test]
    fn retention_respects_the_threshold() {
        let problem = medium_problem();
        let space = CandidateSpace::build(&problem);
        let filter = GaFilter::new(&problem, &space, config(12345));
        let outcome = filter.run(None, None);
        let ratio = outcome.retained.y.len() as f64 / outcome.candidate_y_count as f64;
        assert!(
            ratio <= 0.31 || !outcome.bypassed_exams.is_empty(),
            "retention ratio {} exceeds the threshold",
            ratio
        );
    }

    #[test]
    fn every_exam_keeps_a_viable_tuple() {
        let problem = medium_problem();
        let space = CandidateSpace::build(&problem);
        let filter = GaFilter::new(&problem, &space, config(7));
        let outcome = filter.run(None, None);
        for e in 0..problem.exams().len() {
            assert!(
                outcome.retained.y.iter().any(|(exam, _, _)| *exam == e),
                "exam {} lost its last room/slot",
                e
            );
        }
    }

    #[test]
    fn pruning_is_monotone() {
        let problem = medium_problem();
        let space = CandidateSpace::build(&problem);
        let filter = GaFilter::new(&problem, &space, config(99));
        let outcome = filter.run(None, None);
        for window in outcome.retained_history.windows(2) {
            assert!(
                window[1] <= window[0],
                "retained count grew: {:?}",
                outcome.retained_history
            );
        }
    }

    #[test]
    fn threshold_one_disables_pruning() {
        let problem = medium_problem();
        let space = CandidateSpace::build(&problem);
        let mut cfg = config(1);
        cfg.retention_threshold = 1.0;
        let filter = GaFilter::new(&problem, &space, cfg);
        let outcome = filter.run(None, None);
        assert_eq!(outcome.retained.y.len(), space.y.len());
    }

    #[test]
    fn fitness_history_tracks_best_and_mean() {
        let problem = medium_problem();
        let space = CandidateSpace::build(&problem);
        let filter = GaFilter::new(&problem, &space, config(17));
        let outcome = filter.run(None, None);

        assert_eq!(outcome.best_fitness_history.len(), outcome.generations_run);
        assert_eq!(outcome.mean_fitness_history.len(), outcome.generations_run);
        for (best, mean) in outcome
            .best_fitness_history
            .iter()
            .zip(&outcome.mean_fitness_history)
        {
            assert!(
                *best >= *mean - 1e-9,
                "best fitness {} below population mean {}",
                best,
                mean
            );
        }

        let again = filter.run(None, None);
        assert_eq!(outcome.mean_fitness_history, again.mean_fitness_history);
    }

    #[test]
    fn runs_are_deterministic_for_a_seed() {
        let problem = medium_problem();
        let space = CandidateSpace::build(&problem);
        let run = |seed| {
            GaFilter::new(&problem, &space, config(seed))
                .run(None, None)
                .retained
                .y
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn tight_override_prunes_harder() {
        let problem = medium_problem();
        let space = CandidateSpace::build(&problem);
        let filter = GaFilter::new(&problem, &space, config(5));
        let normal = filter.run(None, None);
        let tight = filter.run(Some(0.1), None);
        assert!(tight.retained.y.len() <= normal.retained.y.len());
    }

    #[test]
    fn hints_reference_retained_tuples() {
        let problem = medium_problem();
        let space = CandidateSpace::build(&problem);
        let filter = GaFilter::new(&problem, &space, config(3));
        let outcome = filter.run(None, None);
        for hint in &outcome.hints {
            match hint.key {
                VarKey::Y(e, r, s) => {
                    assert!(outcome.retained.y.contains(&(e, r, s)));
                    assert!(hint.value);
                    assert!(hint.confidence > 0.0 && hint.confidence <= 1.0);
                }
                VarKey::X(e, s) => {
                    assert!(outcome
                        .retained
                        .y
                        .iter()
                        .any(|(ye, _, ys)| *ye == e && *ys == s));
                }
                _ => panic!("unexpected hint key"),
            }
        }
    }
}
