//! Noteboard bulk operations — multi-select delete and restore for memos and tasks.
//!
//! A [`orchestrator::BulkOrchestrator`] ties together the selection store,
//! the batch planner, the animation choreographer, the dispatch engine and
//! the cache reconciler for one host context (personal, team or board).
//! Rendering layers observe per-scope state through a `watch` channel and
//! one-shot signals through the [`events::EventBus`].

pub mod backend;
pub mod cache;
pub mod choreographer;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod item;
pub mod orchestrator;
pub mod planner;
pub mod reconcile;
pub mod selection;
