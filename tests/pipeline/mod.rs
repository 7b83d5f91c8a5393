//! Pipeline tests: watch sources through the dispatch loop to both consumers

mod change_flow_tests;
mod watch_tests;
