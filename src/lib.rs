//! Purpose: Request validation and decoding pipeline shared by exporters and the `paramflow` CLI.
//! Exports: `core` (pipeline layers, endpoint model, errors), `api` (stable surface),
//! `notice` (structured stderr notices).
//! Role: Sits between protocol exporters and handlers; exporter-agnostic.
//! Invariants: No ambient state; every stream owns its pipeline instance.
//! Invariants: Prefer `api` paths; `core` may change between minor releases.
pub mod api;
pub mod core;
pub mod notice;
