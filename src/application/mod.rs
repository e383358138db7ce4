pub mod bootstrap;
pub mod calendar_store;
pub mod commands;
pub mod task_store;
pub mod undo_ledger;

use chrono::{DateTime, Utc};
use std::sync::Arc;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Final state of an optimistic operation once its network leg resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Confirmed,
    RolledBack,
}
