//! Core library for the roomplan-tools command line application.
//!
//! The library reconciles a heating and a ventilation room schedule into one
//! room-indexed dataset and estimates the heating and cooling power of every
//! room. Each pipeline stage has its own module: header detection in
//! [`detect`], row loading in [`load`], schema mapping in [`reconcile`], the
//! join in [`merge`], room typing in [`classify`], density lookup in
//! [`estimate`], and portfolio figures in [`report`]. [`pipeline`] wires them
//! together; workbook adapters live under [`io`] and analysis persistence in
//! [`session`].

pub mod classify;
pub mod config;
pub mod detect;
pub mod error;
pub mod estimate;
pub mod io;
pub mod load;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod session;

pub use error::{Result, ToolError};
