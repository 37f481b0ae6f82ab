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

//! Priority-expression trees.
//!
//! A tree is stored as a flat node vector in prefix order: a function node is
//! immediately followed by its two operand subtrees. Subtrees are contiguous
//! slices, which makes crossover a splice of two ranges and deep copies a
//! plain `Vec` clone.

use std::fmt;

use rand::Rng;

/// Arity-2 function set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    /// Protected division: a denominator near zero evaluates to 1.0.
    ProtectedDiv,
    Max,
    Min,
}

pub const FUNCTION_SET: [Op; 6] = [Op::Add, Op::Sub, Op::Mul, Op::ProtectedDiv, Op::Max, Op::Min];

impl Op {
    fn symbol(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::ProtectedDiv => "%",
            Op::Max => "max",
            Op::Min => "min",
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            Op::ProtectedDiv => {
                if b.abs() < 1e-10 {
                    1.0
                } else {
                    a / b
                }
            }
            Op::Max => a.max(b),
            Op::Min => a.min(b),
        }
    }
}

/// Terminal symbols over the precomputed per-exam features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// Earliest candidate start (chronological slot index).
    Es,
    /// Processing time: exam duration in minutes.
    Pt,
    /// Exam weight.
    W,
    /// Latest candidate start.
    Dd,
    /// Workload: expected student count.
    Wl,
    /// Maximum workload over all exams.
    MaxWl,
    /// Number of prerequisite exams.
    Nprec,
    /// Number of dependent exams.
    Nsuc,
    /// Total workload of the prerequisites.
    WlPrec,
    /// Total workload of the dependents.
    WlSuc,
}

pub const TERMINAL_SET: [Terminal; 10] = [
    Terminal::Es,
    Terminal::Pt,
    Terminal::W,
    Terminal::Dd,
    Terminal::Wl,
    Terminal::MaxWl,
    Terminal::Nprec,
    Terminal::Nsuc,
    Terminal::WlPrec,
    Terminal::WlSuc,
];

pub const NUM_TERMINALS: usize = 10;

impl Terminal {
    pub fn feature_index(self) -> usize {
        match self {
            Terminal::Es => 0,
            Terminal::Pt => 1,
            Terminal::W => 2,
            Terminal::Dd => 3,
            Terminal::Wl => 4,
            Terminal::MaxWl => 5,
            Terminal::Nprec => 6,
            Terminal::Nsuc => 7,
            Terminal::WlPrec => 8,
            Terminal::WlSuc => 9,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Terminal::Es => "ES",
            Terminal::Pt => "PT",
            Terminal::W => "W",
            Terminal::Dd => "DD",
            Terminal::Wl => "WL",
            Terminal::MaxWl => "maxWL",
            Terminal::Nprec => "NPREC",
            Terminal::Nsuc => "NSUC",
            Terminal::WlPrec => "WLPREC",
            Terminal::WlSuc => "WLSUC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Func(Op),
    Term(Terminal),
}

/// A priority expression in prefix order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// A single-terminal tree.
    pub fn terminal(terminal: Terminal) -> Self {
        Tree {
            nodes: vec![Node::Term(terminal)],
        }
    }

    /// Random tree by the "grow" method: each position may become a terminal
    /// early.
    pub fn grow<R: Rng>(rng: &mut R, max_depth: usize) -> Self {
        let mut nodes = Vec::new();
        grow_into(&mut nodes, rng, max_depth, false);
        Tree { nodes }
    }

    /// Random tree by the "full" method: functions all the way to the depth
    /// bound.
    pub fn full<R: Rng>(rng: &mut R, depth: usize) -> Self {
        let mut nodes = Vec::new();
        grow_into(&mut nodes, rng, depth, true);
        Tree { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Evaluate against a feature row (indexed by `Terminal::feature_index`).
    /// A non-finite result collapses to 0.0 so priorities stay comparable.
    pub fn eval(&self, features: &[f64]) -> f64 {
        let (value, consumed) = self.eval_at(0, features);
        debug_assert_eq!(consumed, self.nodes.len(), "malformed tree");
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }

    fn eval_at(&self, pos: usize, features: &[f64]) -> (f64, usize) {
        match self.nodes[pos] {
            Node::Term(terminal) => (features[terminal.feature_index()], pos + 1),
            Node::Func(op) => {
                let (a, after_a) = self.eval_at(pos + 1, features);
                let (b, after_b) = self.eval_at(after_a, features);
                (op.apply(a, b), after_b)
            }
        }
    }

    /// Exclusive end of the subtree starting at `pos`.
    pub fn subtree_end(&self, pos: usize) -> usize {
        let mut open = 1usize;
        let mut i = pos;
        while open > 0 {
            match self.nodes[i] {
                Node::Func(_) => open += 1, // consumes itself, opens two
                Node::Term(_) => open -= 1,
            }
            i += 1;
        }
        i
    }

    pub fn depth(&self) -> usize {
        self.depth_at(0).0
    }

    fn depth_at(&self, pos: usize) -> (usize, usize) {
        match self.nodes[pos] {
            Node::Term(_) => (1, pos + 1),
            Node::Func(_) => {
                let (d1, after_a) = self.depth_at(pos + 1);
                let (d2, after_b) = self.depth_at(after_a);
                (1 + d1.max(d2), after_b)
            }
        }
    }

    /// Swap a random subtree of `self` with a random subtree of `other`.
    /// Offspring exceeding `max_depth` are discarded in favour of the parent.
    pub fn crossover<R: Rng>(&self, other: &Tree, rng: &mut R, max_depth: usize) -> (Tree, Tree) {
        let a_start = rng.gen_range(0..self.nodes.len());
        let a_end = self.subtree_end(a_start);
        let b_start = rng.gen_range(0..other.nodes.len());
        let b_end = other.subtree_end(b_start);

        let mut child_a = Vec::with_capacity(self.nodes.len());
        child_a.extend_from_slice(&self.nodes[..a_start]);
        child_a.extend_from_slice(&other.nodes[b_start..b_end]);
        child_a.extend_from_slice(&self.nodes[a_end..]);

        let mut child_b = Vec::with_capacity(other.nodes.len());
        child_b.extend_from_slice(&other.nodes[..b_start]);
        child_b.extend_from_slice(&self.nodes[a_start..a_end]);
        child_b.extend_from_slice(&other.nodes[b_end..]);

        let child_a = Tree { nodes: child_a };
        let child_b = Tree { nodes: child_b };
        let child_a = if child_a.depth() <= max_depth {
            child_a
        } else {
            self.clone()
        };
        let child_b = if child_b.depth() <= max_depth {
            child_b
        } else {
            other.clone()
        };
        (child_a, child_b)
    }

    /// Replace a random subtree with a freshly grown one.
    pub fn mutate<R: Rng>(&self, rng: &mut R, max_depth: usize) -> Tree {
        let start = rng.gen_range(0..self.nodes.len());
        let end = self.subtree_end(start);
        let replacement = Tree::grow(rng, 3);

        let mut nodes = Vec::with_capacity(self.nodes.len());
        nodes.extend_from_slice(&self.nodes[..start]);
        nodes.extend_from_slice(&replacement.nodes);
        nodes.extend_from_slice(&self.nodes[end..]);
        let mutated = Tree { nodes };
        if mutated.depth() <= max_depth {
            mutated
        } else {
            self.clone()
        }
    }
}

fn grow_into<R: Rng>(nodes: &mut Vec<Node>, rng: &mut R, depth: usize, full: bool) {
    let make_terminal = depth <= 1 || (!full && rng.gen_bool(0.3));
    if make_terminal {
        let terminal = TERMINAL_SET[rng.gen_range(0..TERMINAL_SET.len())];
        nodes.push(Node::Term(terminal));
    } else {
        let op = FUNCTION_SET[rng.gen_range(0..FUNCTION_SET.len())];
        nodes.push(Node::Func(op));
        grow_into(nodes, rng, depth - 1, full);
        grow_into(nodes, rng, depth - 1, full);
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_at(tree: &Tree, pos: usize, f: &mut fmt::Formatter<'_>) -> Result<usize, fmt::Error> {
            match tree.nodes[pos] {
                Node::Term(terminal) => {
                    write!(f, "{}", terminal.symbol())?;
                    Ok(pos + 1)
                }
                Node::Func(op) => {
                    write!(f, "({} ", op.symbol())?;
                    let after_a = write_at(tree, pos + 1, f)?;
                    write!(f, " ")?;
                    let after_b = write_at(tree, after_a, f)?;
                    write!(f, ")")?;
                    Ok(after_b)
                }
            }
        }
        write_at(self, 0, f).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn features() -> Vec<f64> {
        (0..NUM_TERMINALS as u32).map(f64::from).collect()
    }

    #[test]
    fn terminal_tree_evaluates_to_its_feature() {
        let tree = Tree::terminal(Terminal::Wl);
        assert_eq!(tree.eval(&features()), 4.0);
    }

    #[test]
    fn protected_division_survives_zero() {
        // (% W ES) with ES = 0: protected division yields 1.0.
        let tree = Tree {
            nodes: vec![
                Node::Func(Op::ProtectedDiv),
                Node::Term(Terminal::W),
                Node::Term(Terminal::Es),
            ],
        };
        let mut row = features();
        row[0] = 0.0;
        assert_eq!(tree.eval(&row), 1.0);
    }

    #[test]
    fn subtree_end_spans_whole_operands() {
        // (+ (* PT W) ES)
        let tree = Tree {
            nodes: vec![
                Node::Func(Op::Add),
                Node::Func(Op::Mul),
                Node::Term(Terminal::Pt),
                Node::Term(Terminal::W),
                Node::Term(Terminal::Es),
            ],
        };
        assert_eq!(tree.subtree_end(0), 5);
        assert_eq!(tree.subtree_end(1), 4);
        assert_eq!(tree.subtree_end(4), 5);
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn full_trees_reach_the_depth_bound() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for depth in 2..6 {
            let tree = Tree::full(&mut rng, depth);
            assert_eq!(tree.depth(), depth);
            assert!(tree.eval(&features()).is_finite());
        }
    }

    #[test]
    fn crossover_preserves_well_formedness() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let a = Tree::grow(&mut rng, 5);
        let b = Tree::grow(&mut rng, 5);
        for _ in 0..50 {
            let (c, d) = a.crossover(&b, &mut rng, 8);
            // eval walks the whole vector; a malformed tree would trip its
            // internal assertion or index out of bounds.
            c.eval(&features());
            d.eval(&features());
            assert!(c.depth() <= 8 && d.depth() <= 8);
        }
    }

    #[test]
    fn mutation_respects_the_depth_bound() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let tree = Tree::full(&mut rng, 5);
        for _ in 0..50 {
            let mutated = tree.mutate(&mut rng, 6);
            mutated.eval(&features());
            assert!(mutated.depth() <= 6);
        }
    }

    #[test]
    fn generation_is_deterministic_for_a_seed() {
        let t1 = Tree::grow(&mut ChaCha8Rng::seed_from_u64(42), 5);
        let t2 = Tree::grow(&mut ChaCha8Rng::seed_from_u64(42), 5);
        assert_eq!(t1, t2);
    }
}
