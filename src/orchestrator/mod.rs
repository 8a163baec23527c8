//! Orchestrator (§4.K): drives a single module from its first workflow step
//! to `Complete`, one iteration at a time.
//!
//! ## Persistence ownership
//!
//! | Layer                    | What it persists                                    |
//! |--------------------------|------------------------------------------------------|
//! | `session::SessionStore`  | Workflow step, task tree, section hashes, metrics   |
//! | `audit::AuditLogger`     | Run-level iteration history, tool calls, usage       |
//!
//! `SessionStore` is the canonical source of truth for resuming a crashed or
//! interrupted run: `initialize` re-derives the current step from the stored
//! session plus the task tree and spec file on disk, rather than trusting a
//! cached value. The audit logger is an append-only observation layer; it
//! does not drive control flow.

pub mod runner;

pub use runner::Orchestrator;
