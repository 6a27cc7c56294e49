#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Observability: Prometheus metrics container.

pub mod metrics;
