//! Pipeline stages for datasheet extraction.
//!
//! Each submodule implements one step, so each can be tested without the
//! others and the model-facing parts can be swapped out in tests.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ load ──▶ hints ──▶ gateway ──▶ recover ──▶ merge
//! (path/URL) (text)  (filename)  (LLM)      (JSON)    (policy)
//!                                   │
//!                                   └──▶ fallback (nothing recovered)
//! ```
//!
//! 1. [`input`]    — turn a path or URL into bytes and a filename
//! 2. [`load`]     — spool the bytes and split them into page texts;
//!    runs in `spawn_blocking` because decoding is CPU-bound
//! 3. [`hints`]    — model and sensor-type guesses from the filename, and
//!    identity backfill
//! 4. [`gateway`]  — one model call per eligible page; the only stage with
//!    network I/O
//! 5. [`recover`]  — pull a JSON object out of free-form model text
//! 6. [`merge`]    — fold page records into one under a [`crate::MergePolicy`]
//! 7. [`fallback`] — reduced three-field pass when no page yielded data

pub mod fallback;
pub mod gateway;
pub mod hints;
pub mod input;
pub mod load;
pub mod merge;
pub mod recover;
