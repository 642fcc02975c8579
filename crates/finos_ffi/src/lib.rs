//! Host bindings for FinOS core.

pub mod api;
