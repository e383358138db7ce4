use crate::application::calendar_store::CalendarStore;
use crate::application::task_store::TaskStore;
use crate::domain::models::{CalendarEvent, DeletedEntity, Task};
use crate::infrastructure::error::InfraError;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const DEFAULT_UNDO_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restored {
    Task(Task),
    Event(CalendarEvent),
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: Vec<DeletedEntity>,
    generation: u64,
    expiry: Option<JoinHandle<()>>,
}

impl LedgerState {
    fn cancel_expiry(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.expiry.take() {
            handle.abort();
        }
    }
}

/// Stack of deleted entities. The whole stack is dropped once the window
/// passes without a new deletion or undo.
pub struct UndoLedger {
    state: Arc<Mutex<LedgerState>>,
    window: Duration,
}

impl UndoLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            window,
        }
    }

    /// Pushes a snapshot and restarts the expiry window. Returns the number of
    /// entries now pending.
    pub fn record_deletion(&self, entry: DeletedEntity) -> Result<usize, InfraError> {
        let mut state = self.lock_state()?;
        state.entries.push(entry);
        self.restart_expiry(&mut state);
        debug!(pending = state.entries.len(), "recorded deletion");
        Ok(state.entries.len())
    }

    /// Restores the most recent deletion. `Ok(None)` when nothing is pending.
    /// A failed task restore puts the entry back on the stack.
    pub async fn undo_last(
        &self,
        tasks: &TaskStore,
        calendar: &CalendarStore,
    ) -> Result<Option<Restored>, InfraError> {
        let entry = {
            let mut state = self.lock_state()?;
            let Some(entry) = state.entries.pop() else {
                return Ok(None);
            };
            if state.entries.is_empty() {
                state.cancel_expiry();
            } else {
                self.restart_expiry(&mut state);
            }
            entry
        };

        match entry {
            DeletedEntity::Task(snapshot) => match tasks.restore(&snapshot).await {
                Ok(task) => Ok(Some(Restored::Task(task))),
                Err(error) => {
                    let mut state = self.lock_state()?;
                    state.entries.push(DeletedEntity::Task(snapshot));
                    self.restart_expiry(&mut state);
                    Err(error)
                }
            },
            DeletedEntity::Event(snapshot) => calendar
                .restore(&snapshot)
                .map(|event| Some(Restored::Event(event))),
        }
    }

    /// Drops every pending entry without restoring anything.
    pub fn dismiss(&self) -> Result<usize, InfraError> {
        let mut state = self.lock_state()?;
        let dropped = state.entries.len();
        state.entries.clear();
        state.cancel_expiry();
        Ok(dropped)
    }

    /// Removes the newest entry equal to `entry`, for deletions that did not
    /// go through.
    pub fn retract(&self, entry: &DeletedEntity) -> Result<bool, InfraError> {
        let mut state = self.lock_state()?;
        let Some(index) = state.entries.iter().rposition(|pending| pending == entry) else {
            return Ok(false);
        };
        state.entries.remove(index);
        if state.entries.is_empty() {
            state.cancel_expiry();
        }
        Ok(true)
    }

    pub fn len(&self) -> Result<usize, InfraError> {
        Ok(self.lock_state()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, InfraError> {
        Ok(self.lock_state()?.entries.is_empty())
    }

    pub fn entries(&self) -> Result<Vec<DeletedEntity>, InfraError> {
        Ok(self.lock_state()?.entries.clone())
    }

    fn restart_expiry(&self, state: &mut LedgerState) {
        state.cancel_expiry();
        let generation = state.generation;
        let shared: Weak<Mutex<LedgerState>> = Arc::downgrade(&self.state);
        let window = self.window;
        state.expiry = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let Ok(mut state) = shared.lock() else {
                return;
            };
            if state.generation == generation {
                let expired = state.entries.len();
                state.entries.clear();
                state.expiry = None;
                info!(expired, "undo window elapsed");
            }
        }));
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, LedgerState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::State(format!("undo ledger lock poisoned: {error}")))
    }
}

impl Default for UndoLedger {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_WINDOW)
    }
}

impl Drop for UndoLedger {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.cancel_expiry();
        }
    }
}
