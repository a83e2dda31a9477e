//! Test suites for the bridge application shell.

mod serve_behaviour;
mod support;
