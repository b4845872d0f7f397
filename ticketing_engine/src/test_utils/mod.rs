//! Helpers for integration tests: throwaway databases and catalog seed data.
pub mod prepare_env;
pub mod seed;
