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

//! Engine configuration: backend solve parameters, genetic-algorithm
//! parameters, objective weights, and the named templates selectable from the
//! command line.

use std::str::FromStr;

/// Parameters for the constraint-programming backend.
#[derive(Debug, Clone)]
pub struct CpSatConfig {
    /// Wall-clock budget of the phase-1 feasibility solve.
    pub phase1_time_limit_s: u32,
    /// Wall-clock budget per phase-2 solve (one per evaluated ordering).
    pub phase2_time_limit_s: u32,
    /// Worker count forwarded to the backend. The reference backend ignores it.
    pub num_workers: u32,
    /// Upper bound on the number of materialized decision variables.
    pub variable_ceiling: usize,
}

impl Default for CpSatConfig {
    fn default() -> Self {
        CpSatConfig {
            phase1_time_limit_s: 300,
            phase2_time_limit_s: 30,
            num_workers: 4,
            variable_ceiling: 500_000,
        }
    }
}

/// Parameters shared by the GA front-filter and the phase-2 evolution manager.
#[derive(Debug, Clone)]
pub struct GaConfig {
    pub population_size: usize,
    pub max_generations: usize,
    pub tournament_size: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    /// Fraction of the population preserved unchanged each generation.
    pub elite_ratio: f64,
    pub max_tree_depth: usize,
    /// Global upper bound on `|retained_y| / |candidate_y|` after pruning.
    pub retention_threshold: f64,
    /// Best-fitness variance over the trailing window below which the loop
    /// terminates early.
    pub convergence_epsilon: f64,
    /// Whether phase 2 evolves variable orderings at all. With this off,
    /// phase 2 is a single re-solve with the phase-1 solution as hint.
    pub evolve_orderings: bool,
    /// Orderings evaluated per phase-2 generation.
    pub orderings_per_generation: usize,
    pub seed: u64,
}

impl Default for GaConfig {
    fn default() -> Self {
        GaConfig {
            population_size: 32,
            max_generations: 12,
            tournament_size: 4,
            crossover_rate: 0.85,
            mutation_rate: 0.15,
            elite_ratio: 0.12,
            max_tree_depth: 6,
            retention_threshold: 0.4,
            convergence_epsilon: 1e-6,
            evolve_orderings: true,
            orderings_per_generation: 4,
            seed: 0,
        }
    }
}

/// Weights of the solution score components and the soft-constraint modules.
#[derive(Debug, Clone)]
pub struct WeightConfig {
    pub completion: f64,
    pub feasibility: f64,
    pub carryover_priority: f64,
    pub exam_distribution: f64,
    pub room_utilization: f64,
    pub staff_load_balance: f64,
    pub preference_slots: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        WeightConfig {
            completion: 0.7,
            feasibility: 0.3,
            carryover_priority: 1.0,
            exam_distribution: 0.4,
            room_utilization: 0.7,
            staff_load_balance: 0.6,
            preference_slots: 0.3,
        }
    }
}

/// Named parameter presets. Templates only change numbers; they never change
/// which core constraints apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverTemplate {
    Standard,
    Emergency,
    ExamWeek,
    Flexible,
    Strict,
}

impl FromStr for SolverTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(SolverTemplate::Standard),
            "emergency" => Ok(SolverTemplate::Emergency),
            "exam_week" => Ok(SolverTemplate::ExamWeek),
            "flexible" => Ok(SolverTemplate::Flexible),
            "strict" => Ok(SolverTemplate::Strict),
            other => Err(format!("unknown solver template: {}", other)),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub cp_sat: CpSatConfig,
    pub ga: GaConfig,
    pub weights: WeightConfig,
}

impl EngineConfig {
    /// Build a configuration from a template preset.
    pub fn from_template(template: SolverTemplate) -> Self {
        let mut cfg = EngineConfig::default();
        match template {
            SolverTemplate::Standard => {}
            SolverTemplate::Emergency => {
                // Fast turnaround: small GA, short solves.
                cfg.cp_sat.phase1_time_limit_s = 60;
                cfg.cp_sat.phase2_time_limit_s = 10;
                cfg.ga.population_size = 16;
                cfg.ga.max_generations = 6;
                cfg.ga.evolve_orderings = false;
            }
            SolverTemplate::ExamWeek => {
                cfg.weights.exam_distribution = 0.8;
                cfg.weights.preference_slots = 0.5;
                cfg.ga.retention_threshold = 0.5;
            }
            SolverTemplate::Flexible => {
                cfg.weights.carryover_priority = 0.5;
                cfg.weights.exam_distribution = 0.2;
                cfg.weights.staff_load_balance = 0.3;
            }
            SolverTemplate::Strict => {
                cfg.cp_sat.phase1_time_limit_s = 600;
                cfg.ga.population_size = 48;
                cfg.ga.max_generations = 20;
                cfg.ga.retention_threshold = 0.3;
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parsing() {
        assert_eq!(
            "exam_week".parse::<SolverTemplate>().unwrap(),
            SolverTemplate::ExamWeek
        );
        assert!("no_such_template".parse::<SolverTemplate>().is_err());
    }

    #[test]
    fn emergency_template_shortens_budgets() {
        let standard = EngineConfig::from_template(SolverTemplate::Standard);
        let emergency = EngineConfig::from_template(SolverTemplate::Emergency);
        assert!(emergency.cp_sat.phase1_time_limit_s < standard.cp_sat.phase1_time_limit_s);
        assert!(emergency.ga.max_generations < standard.ga.max_generations);
        assert!(!emergency.ga.evolve_orderings);
    }
}
