//! End-to-end tests against a real SQLite ledger and git replica.

mod fixture;
mod replica_tests;
mod scenario_tests;
