//! Distribution integration tests against a real Postgres
//!
//! Run with `TEST_DATABASE_URL` set and `--ignored`.

mod catalog;
mod common;
mod publish;
mod records;
