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

//! Evolution operators: ramped half-and-half initialization, tournament
//! selection, per-gene subtree crossover and mutation, elitism.

use rand::Rng;

use crate::config::GaConfig;
use crate::ga::chromosome::{sort_population, Chromosome};
use crate::ga::tree::Tree;

/// Owns chromosome id allocation and produces generations. Shared between the
/// front-filter and the phase-2 ordering evolution.
pub struct EvolutionManager {
    config: GaConfig,
    next_id: u64,
}

impl EvolutionManager {
    pub fn new(config: GaConfig) -> Self {
        EvolutionManager { config, next_id: 0 }
    }

    fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Ramped half-and-half: depths cycle from 2 to the maximum, alternating
    /// grow and full trees.
    pub fn seed_population<R: Rng>(&mut self, n_genes: usize, rng: &mut R) -> Vec<Chromosome> {
        let min_depth = 2;
        let max_depth = self.config.max_tree_depth.max(min_depth);
        (0..self.config.population_size)
            .map(|i| {
                let depth = min_depth + i % (max_depth - min_depth + 1);
                let genes = (0..n_genes)
                    .map(|_| {
                        if i % 2 == 0 {
                            Tree::grow(rng, depth)
                        } else {
                            Tree::full(rng, depth)
                        }
                    })
                    .collect();
                Chromosome::new(self.fresh_id(), genes)
            })
            .collect()
    }

    /// Deterministic tournament over already-evaluated chromosomes.
    fn tournament<'p, R: Rng>(
        &self,
        population: &'p [Chromosome],
        rng: &mut R,
    ) -> &'p Chromosome {
        let mut best: Option<&Chromosome> = None;
        for _ in 0..self.config.tournament_size {
            let candidate = &population[rng.gen_range(0..population.len())];
            best = match best {
                None => Some(candidate),
                Some(current) => {
                    if candidate.beats(current) {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best.expect("tournament over empty population")
    }

    /// Produce the next generation: elites survive unchanged, the rest come
    /// from tournament-selected parents with subtree crossover and mutation.
    pub fn next_generation<R: Rng>(
        &mut self,
        population: &[Chromosome],
        rng: &mut R,
    ) -> Vec<Chromosome> {
        let mut ranked: Vec<Chromosome> = population.to_vec();
        sort_population(&mut ranked);

        let elite_count = ((self.config.population_size as f64 * self.config.elite_ratio).ceil()
            as usize)
            .max(1)
            .min(ranked.len());
        let mut next: Vec<Chromosome> = ranked[..elite_count].to_vec();

        while next.len() < self.config.population_size {
            let parent_a = self.tournament(&ranked, rng);
            let parent_b = self.tournament(&ranked, rng);
            let (mut genes_a, mut genes_b) = if rng.gen_bool(self.config.crossover_rate) {
                self.crossover_genes(parent_a, parent_b, rng)
            } else {
                (parent_a.genes.clone(), parent_b.genes.clone())
            };
            if rng.gen_bool(self.config.mutation_rate) {
                self.mutate_genes(&mut genes_a, rng);
            }
            if rng.gen_bool(self.config.mutation_rate) {
                self.mutate_genes(&mut genes_b, rng);
            }
            next.push(Chromosome::new(self.fresh_id(), genes_a));
            if next.len() < self.config.population_size {
                next.push(Chromosome::new(self.fresh_id(), genes_b));
            }
        }
        next
    }

    /// Subtree crossover at one randomly chosen gene position; the remaining
    /// genes are inherited from the respective parent.
    fn crossover_genes<R: Rng>(
        &self,
        parent_a: &Chromosome,
        parent_b: &Chromosome,
        rng: &mut R,
    ) -> (Vec<Tree>, Vec<Tree>) {
        let mut genes_a = parent_a.genes.clone();
        let mut genes_b = parent_b.genes.clone();
        if !genes_a.is_empty() {
            let gene = rng.gen_range(0..genes_a.len());
            let (child_a, child_b) =
                genes_a[gene].crossover(&genes_b[gene], rng, self.config.max_tree_depth);
            genes_a[gene] = child_a;
            genes_b[gene] = child_b;
        }
        (genes_a, genes_b)
    }

    fn mutate_genes<R: Rng>(&self, genes: &mut [Tree], rng: &mut R) {
        if genes.is_empty() {
            return;
        }
        let gene = rng.gen_range(0..genes.len());
        genes[gene] = genes[gene].mutate(rng, self.config.max_tree_depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ga::chromosome::FitnessBreakdown;
    use ordered_float::NotNan;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn evaluated(mut population: Vec<Chromosome>) -> Vec<Chromosome> {
        for (i, chromosome) in population.iter_mut().enumerate() {
            chromosome.fitness = Some(FitnessBreakdown {
                total: NotNan::new(i as f64).unwrap(),
                feasibility: 0.0,
                coverage: 0.0,
                diversity_penalty: 0.0,
            });
        }
        population
    }

    #[test]
    fn seeding_fills_the_population_deterministically() {
        let config = GaConfig::default();
        let seed = |s: u64| {
            let mut manager = EvolutionManager::new(config.clone());
            manager.seed_population(3, &mut ChaCha8Rng::seed_from_u64(s))
        };
        let p1 = seed(5);
        let p2 = seed(5);
        assert_eq!(p1.len(), config.population_size);
        for (a, b) in p1.iter().zip(&p2) {
            assert_eq!(a.genes, b.genes);
        }
    }

    #[test]
    fn elites_survive_into_the_next_generation() {
        let config = GaConfig {
            population_size: 10,
            ..GaConfig::default()
        };
        let mut manager = EvolutionManager::new(config.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let population = evaluated(manager.seed_population(2, &mut rng));
        // Highest fitness was assigned to the last chromosome.
        let best_genes = population.last().unwrap().genes.clone();
        let next = manager.next_generation(&population, &mut rng);
        assert_eq!(next.len(), 10);
        assert_eq!(next[0].genes, best_genes);
    }

    #[test]
    fn offspring_get_fresh_ids() {
        let config = GaConfig {
            population_size: 8,
            ..GaConfig::default()
        };
        let mut manager = EvolutionManager::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let population = evaluated(manager.seed_population(2, &mut rng));
        let max_id = population.iter().map(|c| c.id).max().unwrap();
        let next = manager.next_generation(&population, &mut rng);
        assert!(next.iter().skip(1).any(|c| c.id > max_id));
    }
}
