//! Application-level orchestration.
//!
//! This module owns the single-active-job lifecycle: artifact staging, engine
//! runs, undo, save, and log refreshes. Presentation layers drive it with
//! [`UiCommand`]s and observe [`crate::model::JobEvent`]s; run state is never
//! touched from anywhere else.

mod controller;

pub(crate) use controller::{run_controller, UiCommand};
