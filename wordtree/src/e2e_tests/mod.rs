//! End-to-end tests against file-backed trees.
//!
//! Each test file covers a specific scenario, using deterministic inputs
//! and checking every range count against a leaf chain scan.

#![cfg(test)]

mod helpers;

mod test_duplicates;
mod test_key_limits;
mod test_persistence;
mod test_random_inserts;
mod test_range_boundaries;
mod test_sequential_keys;
mod test_split_scenario;
