//! Shared helpers for WeTask integration tests.
//!
//! The crate itself is empty; each file under `tests/` is an independent
//! test binary exercising the broker and gateway crates together.
