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

//! Genetic-programming machinery: priority trees, chromosomes, evolution
//! operators and the variable front-filter.
//!
//! The same evolution manager drives two consumers: the front-filter that
//! shrinks the y/u variable lattice before the model is built, and the
//! phase-2 loop that evolves variable orderings for the backend search.

pub mod chromosome;
pub mod filter;
pub mod operators;
pub mod tree;
