// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backoff for establishing the SQL pool.
//!
//! Store operations themselves are never retried: a cache writer is
//! single-use, so a blind retry of `apply` would only produce an invalid
//! writer error. Callers retry at the cycle level instead.

pub mod retry;
