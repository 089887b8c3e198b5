//! Property-based tests for tower-batching.
//!
//! Run with: cargo test --test property_tests
//!
//! These tests use proptest to generate random inputs and verify that
//! the engine's invariants hold.
