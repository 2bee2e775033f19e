//! Terminal dashboard for BullMQ queues.
//!
//! The [`engine::Engine`] owns the view state and drives a
//! [`bullscope_queue::QueueStore`]; [`app::App`] maps keys onto it and
//! [`render`] draws snapshots of it.

pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod logging;
pub mod render;
pub mod runtime;
pub mod setup;
pub mod state;
pub mod terminal;
pub mod viewport;

pub use app::App;
pub use config::{AppConfig, Cli, EngineConfig};
pub use engine::{Engine, EngineMsg};
pub use error::{TuiError, TuiResult};
pub use state::{Action, DetailTab, Screen, StateStore, ViewState};
pub use viewport::Viewport;
