//! Behavioural suites for the dispatch pipeline.
