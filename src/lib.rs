//! Purpose: Shared library crate used by the `notekeep` CLI, server, and tests.
//! Exports: `core` (note model, stores, errors), `api` (public surface + HTTP client), `demo`.
//! Role: Everything except argument parsing and the HTTP server lives here.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod demo;
