//! folio-rebalancer: quote resolution, rebalance execution, and the `folio` CLI.
//!
//! Values a group-weighted portfolio file with live brokerage quotes (cached
//! per day), computes the rebalance plan, submits floored whole-share orders
//! sells first, and records every attempt in a JSONL audit trail.

pub mod audit;
pub mod broker;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod execution;
pub mod portfolio;
pub mod reconcile;
pub mod resolver;
pub mod sync;
pub mod valuation;
