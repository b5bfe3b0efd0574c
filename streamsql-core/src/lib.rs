//! # streamsql core
//!
//! Execution core of a streaming SQL engine.
//!
//! - [`exec`]: The [`FlowElement`](exec::FlowElement) lifecycle, the
//!   contexts elements emit through, transport-fed sources, and the
//!   [`LocalEnvironment`](exec::LocalEnvironment) that runs flows.
//! - [`window`]: Time and count windows, per-pane
//!   [`Bucket`](window::Bucket)s and the
//!   [`AggregateFunc`](window::AggregateFunc) contract.
//! - [`builtins`]: `count`, `sum`, `min`, `max` and `avg`.
//! - [`io`]: The lazy, caching [`DelimitedEventParser`](io::DelimitedEventParser).
//! - [`lang`]: Runtime [`Value`](lang::Value)s and plan-time
//!   [`Type`](lang::Type)s with type variables.
//! - [`graph`]: The logical [`FlowGraph`](graph::FlowGraph) of a query.
//! - [`time`]: Watermark generation.
//! - [`config`]: [`EngineConfig`](config::EngineConfig), loadable from TOML.

pub mod builtins;
pub mod config;
pub mod error;
pub mod event;
pub mod exec;
pub mod graph;
pub mod io;
pub mod lang;
pub mod time;
pub mod types;
pub mod window;
