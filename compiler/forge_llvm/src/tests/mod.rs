//! Scenario suites over the textual IR output.
//!
//! Each suite builds a small typed program through the arena, runs the
//! generator, and asserts on the shape of the emitted IR text.


mod arithmetic_tests;
mod call_tests;
mod generic_tests;
mod module_tests;
