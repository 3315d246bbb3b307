//! flowguard: a server-side flow engine
//!
//! Enforces the correct, ordered execution of multi-step business processes
//! (onboarding wizards, money transfers, multi-page forms). Each running
//! process is a flow instance identified by a [`flow::FlowKey`] and driven
//! step-by-step through the [`flow::FlowEngine`]'s two-phase
//! preview/persist protocol. Committed states are stored as
//! [`store::FlowAggregate`] records behind the [`store::FlowStore`]
//! abstraction, with in-memory and Redis-backed implementations providing
//! sliding TTLs, absolute lifetime caps, and partition-scoped bulk
//! invalidation.

pub mod config;
pub mod flow;
pub mod session;
pub mod store;
