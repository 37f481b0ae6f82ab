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

//! Chromosomes: one priority tree per exam, plus the precomputed terminal
//! features the trees evaluate against.

use ndarray::Array2;
use ordered_float::NotNan;

use crate::ga::tree::{Tree, NUM_TERMINALS};
use crate::problem::Problem;
use crate::vars::CandidateSpace;

/// Fitness with its components, kept for logging and tests. Ordering is by
/// `total`, ties broken by chromosome id (lower id wins) so float ties stay
/// deterministic.
#[derive(Debug, Clone, Copy)]
pub struct FitnessBreakdown {
    pub total: NotNan<f64>,
    pub feasibility: f64,
    pub coverage: f64,
    pub diversity_penalty: f64,
}

/// A variable-selector individual: a vector of priority trees, one per exam.
#[derive(Debug, Clone)]
pub struct Chromosome {
    /// Monotonically increasing creation id, the deterministic tie-break.
    pub id: u64,
    pub genes: Vec<Tree>,
    pub fitness: Option<FitnessBreakdown>,
}

impl Chromosome {
    pub fn new(id: u64, genes: Vec<Tree>) -> Self {
        Chromosome {
            id,
            genes,
            fitness: None,
        }
    }

    /// Priority of one exam under this chromosome.
    pub fn priority(&self, exam: usize, features: &Array2<f64>) -> f64 {
        let row: Vec<f64> = features.row(exam).to_vec();
        self.genes[exam].eval(&row)
    }

    pub fn total_fitness(&self) -> NotNan<f64> {
        self.fitness
            .map(|f| f.total)
            .unwrap_or_else(|| NotNan::new(f64::MIN).unwrap())
    }

    /// Strict "is better" ordering with the id tie-break.
    pub fn beats(&self, other: &Chromosome) -> bool {
        match self.total_fitness().cmp(&other.total_fitness()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.id < other.id,
        }
    }

    pub fn total_nodes(&self) -> usize {
        self.genes.iter().map(Tree::len).sum()
    }
}

/// Sort a population best-first, deterministically.
pub fn sort_population(population: &mut [Chromosome]) {
    population.sort_by(|a, b| {
        b.total_fitness()
            .cmp(&a.total_fitness())
            .then(a.id.cmp(&b.id))
    });
}

/// Per-exam terminal features: one row per exam, one column per terminal
/// symbol.
pub fn terminal_matrix(problem: &Problem, space: &CandidateSpace) -> Array2<f64> {
    let n_exams = problem.exams().len();
    let indices = problem.indices();
    let mut features = Array2::zeros((n_exams, NUM_TERMINALS));

    let max_workload = problem
        .exams()
        .iter()
        .map(|e| e.expected_students)
        .max()
        .unwrap_or(0) as f64;

    for (e, exam) in problem.exams().iter().enumerate() {
        let starts = &space.x_per_exam[e];
        let earliest = starts
            .iter()
            .map(|s| indices.slot_order[*s])
            .min()
            .unwrap_or(0) as f64;
        let latest = starts
            .iter()
            .map(|s| indices.slot_order[*s])
            .max()
            .unwrap_or(0) as f64;
        let workload_of = |exams: &[usize]| -> f64 {
            exams
                .iter()
                .map(|p| problem.exams()[*p].expected_students as f64)
                .sum()
        };

        features[[e, 0]] = earliest;
        features[[e, 1]] = f64::from(exam.duration_minutes);
        features[[e, 2]] = f64::from(exam.weight);
        features[[e, 3]] = latest;
        features[[e, 4]] = f64::from(exam.expected_students);
        features[[e, 5]] = max_workload;
        features[[e, 6]] = indices.prerequisites[e].len() as f64;
        features[[e, 7]] = indices.dependents[e].len() as f64;
        features[[e, 8]] = workload_of(&indices.prerequisites[e]);
        features[[e, 9]] = workload_of(&indices.dependents[e]);
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ga::tree::Terminal;
    use crate::io::DatasetBuilder;
    use crate::CourseId;
    use chrono::NaiveDate;

    #[test]
    fn tie_break_prefers_the_older_chromosome() {
        let mut a = Chromosome::new(3, vec![Tree::terminal(Terminal::W)]);
        let mut b = Chromosome::new(7, vec![Tree::terminal(Terminal::W)]);
        let fitness = FitnessBreakdown {
            total: NotNan::new(0.5).unwrap(),
            feasibility: 0.5,
            coverage: 1.0,
            diversity_penalty: 0.0,
        };
        a.fitness = Some(fitness);
        b.fitness = Some(fitness);
        assert!(a.beats(&b));
        assert!(!b.beats(&a));
    }

    #[test]
    fn terminal_matrix_reflects_prerequisites() {
        let mut builder = DatasetBuilder::new(2, NaiveDate::from_ymd_opt(2026, 4, 13).unwrap());
        let e1 = builder.exam("AAA100", CourseId::new(), 60, 120);
        let e2 = builder.exam("BBB200", CourseId::new(), 20, 120);
        builder.exam_mut(e2).prerequisite_exams.insert(e1);
        builder.room("HALL-A", 100, false);
        let mut problem = crate::problem::Problem::from_dataset(builder.build());
        problem.populate_exam_students().unwrap();
        problem.seal();
        let space = CandidateSpace::build(&problem);
        let features = terminal_matrix(&problem, &space);

        // Exams are sorted by course code: AAA100 first.
        assert_eq!(features[[1, Terminal::Nprec.feature_index()]], 1.0);
        assert_eq!(features[[0, Terminal::Nsuc.feature_index()]], 1.0);
        assert_eq!(features[[0, Terminal::Wl.feature_index()]], 60.0);
        assert_eq!(features[[0, Terminal::MaxWl.feature_index()]], 60.0);
        assert_eq!(features[[1, Terminal::WlPrec.feature_index()]], 60.0);
    }
}
