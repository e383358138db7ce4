use crate::application::Settlement;
use crate::domain::models::{end_after, is_temporary_id, CalendarEvent, EventPatch};
use crate::infrastructure::data_service::PlannerDataService;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Revisions come from one counter shared by all ids, so a forgotten id never
/// reuses a number an in-flight response still holds.
#[derive(Debug, Default)]
struct CalendarState {
    events: Vec<CalendarEvent>,
    revisions: HashMap<String, u64>,
    clock: u64,
}

impl CalendarState {
    fn bump(&mut self, event_id: &str) -> u64 {
        self.clock += 1;
        self.revisions.insert(event_id.to_string(), self.clock);
        self.clock
    }

    fn forget(&mut self, event_id: &str) {
        self.revisions.remove(event_id);
    }

    fn is_current(&self, event_id: &str, revision: u64) -> bool {
        self.revisions.get(event_id).copied() == Some(revision)
    }

    fn upsert(&mut self, event: CalendarEvent) {
        match self.events.iter_mut().find(|existing| existing.id == event.id) {
            Some(existing) => *existing = event,
            None => self.events.push(event),
        }
    }

    fn take(&mut self, event_id: &str) -> Option<CalendarEvent> {
        let index = self.events.iter().position(|event| event.id == event_id)?;
        Some(self.events.remove(index))
    }
}

/// Visible calendar events. Membership matters, order does not.
#[derive(Clone)]
pub struct CalendarStore {
    data_service: Arc<dyn PlannerDataService>,
    state: Arc<Mutex<CalendarState>>,
}

impl CalendarStore {
    pub fn new(data_service: Arc<dyn PlannerDataService>) -> Self {
        Self {
            data_service,
            state: Arc::new(Mutex::new(CalendarState::default())),
        }
    }

    /// Replaces the collection with the provider's view of the window.
    /// Overlapping loads are not coalesced; the last to finish wins.
    pub async fn load(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        if time_max <= time_min {
            return Err(InfraError::InvalidInput(
                "calendar window end must be after its start".to_string(),
            ));
        }

        let loaded = self
            .data_service
            .list_events(time_min, time_max)
            .await?
            .into_iter()
            .filter(|event| match event.validate() {
                Ok(()) => true,
                Err(reason) => {
                    warn!(event_id = %event.id, %reason, "skipping malformed event");
                    false
                }
            })
            .collect::<Vec<_>>();
        let mut state = self.lock_state()?;
        state
            .revisions
            .retain(|event_id, _| loaded.iter().any(|event| &event.id == event_id));
        for event in &loaded {
            state.bump(&event.id);
        }
        state.events = loaded.clone();
        debug!(count = loaded.len(), %time_min, %time_max, "loaded calendar window");
        Ok(loaded)
    }

    pub fn snapshot(&self) -> Result<Vec<CalendarEvent>, InfraError> {
        Ok(self.lock_state()?.events.clone())
    }

    pub fn get(&self, event_id: &str) -> Result<Option<CalendarEvent>, InfraError> {
        Ok(self
            .lock_state()?
            .events
            .iter()
            .find(|event| event.id == event_id)
            .cloned())
    }

    pub fn add(&self, event: CalendarEvent) -> Result<(), InfraError> {
        let mut state = self.lock_state()?;
        state.bump(&event.id);
        state.upsert(event);
        Ok(())
    }

    /// Swaps a temporary event for its confirmed counterpart. Returns `false`
    /// when the temporary event is no longer present.
    pub fn replace(&self, temp_id: &str, real: CalendarEvent) -> Result<bool, InfraError> {
        let mut state = self.lock_state()?;
        if state.take(temp_id).is_none() {
            debug!(temp_id, event_id = %real.id, "temporary event already gone");
            return Ok(false);
        }
        state.forget(temp_id);
        state.bump(&real.id);
        state.upsert(real);
        Ok(true)
    }

    pub fn remove_local(&self, event_id: &str) -> Result<Option<CalendarEvent>, InfraError> {
        let mut state = self.lock_state()?;
        let removed = state.take(event_id);
        state.forget(event_id);
        Ok(removed)
    }

    /// Moves or resizes an event locally and persists it in the background.
    /// The previous timing comes back if the provider rejects the change.
    pub fn update_optimistic(
        &self,
        event_id: &str,
        start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<JoinHandle<Settlement>, InfraError> {
        if duration_minutes == 0 {
            return Err(InfraError::InvalidInput(
                "duration must be > 0 minutes".to_string(),
            ));
        }
        Self::ensure_confirmed(event_id)?;

        let end = end_after(start, duration_minutes);
        let (previous, revision) = {
            let mut state = self.lock_state()?;
            let event = state
                .events
                .iter_mut()
                .find(|event| event.id == event_id)
                .ok_or_else(|| InfraError::NotFound(format!("event {event_id}")))?;
            let previous = event.clone();
            event.start = start;
            event.end = end;
            (previous, state.bump(event_id))
        };

        let store = self.clone();
        let event_id = event_id.to_string();
        let patch = EventPatch::timing(start, end);
        Ok(tokio::spawn(async move {
            let result = store.data_service.update_event(&event_id, &patch).await;
            let Ok(mut state) = store.lock_state() else {
                warn!(event_id = %event_id, "calendar state unavailable; update left unsettled");
                return Settlement::RolledBack;
            };
            let current = state.is_current(&event_id, revision);
            match result {
                Ok(updated) => {
                    if current {
                        state.upsert(updated);
                    } else {
                        debug!(event_id = %event_id, revision, "discarding stale update response");
                    }
                    Settlement::Confirmed
                }
                Err(error) => {
                    warn!(event_id = %event_id, %error, "event update failed; restoring previous timing");
                    if current {
                        state.upsert(previous);
                    } else {
                        debug!(event_id = %event_id, revision, "newer edit present; skipping rollback");
                    }
                    Settlement::RolledBack
                }
            }
        }))
    }

    /// Menu-driven edit. Waits for the provider and merges what it returns.
    pub async fn update(
        &self,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, InfraError> {
        Self::ensure_confirmed(event_id)?;
        let revision = {
            let state = self.lock_state()?;
            let event = state
                .events
                .iter()
                .find(|event| event.id == event_id)
                .ok_or_else(|| InfraError::NotFound(format!("event {event_id}")))?;
            let mut preview = event.clone();
            patch.apply_to(&mut preview);
            if preview.end <= preview.start {
                return Err(InfraError::InvalidInput(
                    "event end must be after its start".to_string(),
                ));
            }
            state.revisions.get(event_id).copied().unwrap_or(0)
        };

        let updated = self.data_service.update_event(event_id, patch).await?;
        let mut state = self.lock_state()?;
        if state.revisions.get(event_id).copied().unwrap_or(0) == revision {
            state.upsert(updated.clone());
        } else {
            debug!(event_id, revision, "local edit superseded menu update response");
        }
        Ok(updated)
    }

    /// Removes the event locally and deletes it in the background. The event is
    /// put back if the delete fails.
    pub fn remove_optimistic(&self, event_id: &str) -> Result<JoinHandle<Settlement>, InfraError> {
        Self::ensure_confirmed(event_id)?;
        let removed = {
            let mut state = self.lock_state()?;
            let removed = state
                .take(event_id)
                .ok_or_else(|| InfraError::NotFound(format!("event {event_id}")))?;
            state.forget(event_id);
            removed
        };

        let store = self.clone();
        Ok(tokio::spawn(async move {
            let result = store.data_service.delete_event(&removed.id).await;
            match result {
                Ok(()) => {
                    debug!(event_id = %removed.id, "event delete confirmed");
                    Settlement::Confirmed
                }
                Err(error) => {
                    warn!(event_id = %removed.id, %error, "event delete failed; re-adding");
                    if let Ok(mut state) = store.lock_state() {
                        if !state.events.iter().any(|event| event.id == removed.id) {
                            state.bump(&removed.id);
                            state.events.push(removed);
                        }
                    }
                    Settlement::RolledBack
                }
            }
        }))
    }

    /// Deletes the event at the provider first and drops it from view only once
    /// that succeeded. An event the provider no longer knows counts as deleted.
    pub async fn remove(&self, event_id: &str) -> Result<Option<CalendarEvent>, InfraError> {
        Self::ensure_confirmed(event_id)?;
        match self.data_service.delete_event(event_id).await {
            Ok(()) => {}
            Err(InfraError::NotFound(_)) => {
                debug!(event_id, "event already gone at the provider");
            }
            Err(error) => return Err(error),
        }
        let mut state = self.lock_state()?;
        let removed = state.take(event_id);
        state.forget(event_id);
        Ok(removed)
    }

    /// Puts a deleted event back into view. The provider is not asked to
    /// recreate it.
    pub fn restore(&self, snapshot: &CalendarEvent) -> Result<CalendarEvent, InfraError> {
        self.add(snapshot.clone())?;
        info!(event_id = %snapshot.id, "restored event locally only");
        Ok(snapshot.clone())
    }

    fn ensure_confirmed(event_id: &str) -> Result<(), InfraError> {
        if is_temporary_id(event_id) {
            return Err(InfraError::PendingConfirmation(format!(
                "event {event_id} has not been confirmed by the provider"
            )));
        }
        Ok(())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, CalendarState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::State(format!("calendar store lock poisoned: {error}")))
    }
}
