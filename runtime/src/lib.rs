// Copyright 2026 PQC Timeline Contributors
// SPDX-License-Identifier: Apache-2.0

//! PQC compliance runtime: source scrapers, fetch layer and the publish pipeline.
//!
//! This library crate exposes the modules for the `pqc-scrape` binary and for
//! integration testing.

#![allow(clippy::new_without_default)]

pub mod acquisition;
pub mod cache;
pub mod cli;
pub mod config;
pub mod ledger;
pub mod pipeline;
pub mod sources;
