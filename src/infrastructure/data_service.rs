use crate::domain::models::{CalendarEvent, EventPatch, NewTask, Task, TaskPatch, TaskPosition};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

/// Remote store for tasks plus the calendar provider behind it.
///
/// Every call succeeds or fails as a unit. Clearing `linked_event_id` through
/// [`PlannerDataService::update_task`] releases the provider event on the
/// service side.
#[async_trait]
pub trait PlannerDataService: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<Task>, InfraError>;

    async fn create_task(&self, fields: &NewTask) -> Result<Task, InfraError>;

    async fn update_task(&self, task_id: &str, fields: &TaskPatch) -> Result<Task, InfraError>;

    async fn delete_task(&self, task_id: &str) -> Result<(), InfraError>;

    async fn reorder_tasks(&self, positions: &[TaskPosition]) -> Result<(), InfraError>;

    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError>;

    async fn create_event(
        &self,
        task_id: &str,
        start: DateTime<Utc>,
    ) -> Result<CalendarEvent, InfraError>;

    async fn update_event(
        &self,
        event_id: &str,
        fields: &EventPatch,
    ) -> Result<CalendarEvent, InfraError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct HttpPlannerDataService {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct ReorderRequest<'a> {
    positions: &'a [TaskPosition],
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateEventRequest<'a> {
    task_id: &'a str,
    start: DateTime<Utc>,
}

impl HttpPlannerDataService {
    pub fn new(base_url: &str, access_token: Option<String>) -> Result<Self, InfraError> {
        let trimmed = base_url.trim();
        // Relative joins drop the last segment unless the base ends with '/'.
        let normalized = if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };
        let base_url = Url::parse(&normalized).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid data service url '{trimmed}': {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "data service url '{trimmed}' cannot be a base"
            )));
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            access_token: access_token
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
        })
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidInput(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn http_error(status: StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("http {}", status.as_u16())
        } else {
            format!("http {}; body={body}", status.as_u16())
        };
        InfraError::Http(message)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("data service URL cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.access_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<String, InfraError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|error| InfraError::Http(format!("network error while {action}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Http(format!("failed reading response while {action}: {error}")))?;

        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        action: &str,
    ) -> Result<T, InfraError> {
        let body = self.send(request, action).await?;
        serde_json::from_str(&body).map_err(|error| {
            InfraError::Http(format!("invalid payload while {action}: {error}; body={body}"))
        })
    }
}

#[async_trait]
impl PlannerDataService for HttpPlannerDataService {
    async fn list_tasks(&self) -> Result<Vec<Task>, InfraError> {
        let endpoint = self.endpoint(&["tasks"])?;
        self.send_json(self.client.get(endpoint), "listing tasks").await
    }

    async fn create_task(&self, fields: &NewTask) -> Result<Task, InfraError> {
        Self::ensure_non_empty(&fields.title, "task title")?;
        let endpoint = self.endpoint(&["tasks"])?;
        self.send_json(self.client.post(endpoint).json(fields), "creating task")
            .await
    }

    async fn update_task(&self, task_id: &str, fields: &TaskPatch) -> Result<Task, InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;
        let endpoint = self.endpoint(&["tasks", task_id])?;
        self.send_json(self.client.patch(endpoint).json(fields), "updating task")
            .await
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;
        let endpoint = self.endpoint(&["tasks", task_id])?;
        self.send(self.client.delete(endpoint), "deleting task").await?;
        Ok(())
    }

    async fn reorder_tasks(&self, positions: &[TaskPosition]) -> Result<(), InfraError> {
        if positions.is_empty() {
            return Ok(());
        }
        let endpoint = self.endpoint(&["tasks", "reorder"])?;
        let request = self
            .client
            .post(endpoint)
            .json(&ReorderRequest { positions });
        self.send(request, "reordering tasks").await?;
        Ok(())
    }

    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        let endpoint = self.endpoint(&["events"])?;
        let request = self.client.get(endpoint).query(&[
            ("timeMin", time_min.to_rfc3339()),
            ("timeMax", time_max.to_rfc3339()),
        ]);
        self.send_json(request, "listing events").await
    }

    async fn create_event(
        &self,
        task_id: &str,
        start: DateTime<Utc>,
    ) -> Result<CalendarEvent, InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;
        let endpoint = self.endpoint(&["events"])?;
        let request = self
            .client
            .post(endpoint)
            .json(&CreateEventRequest { task_id, start });
        let created: CalendarEvent = self.send_json(request, "creating event").await?;
        if created.id.trim().is_empty() {
            return Err(InfraError::Http(
                "event create response did not include id".to_string(),
            ));
        }
        Ok(created)
    }

    async fn update_event(
        &self,
        event_id: &str,
        fields: &EventPatch,
    ) -> Result<CalendarEvent, InfraError> {
        Self::ensure_non_empty(event_id, "event id")?;
        let endpoint = self.endpoint(&["events", event_id])?;
        self.send_json(self.client.patch(endpoint).json(fields), "updating event")
            .await
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(event_id, "event id")?;
        let endpoint = self.endpoint(&["events", event_id])?;
        self.send(self.client.delete(endpoint), "deleting event").await?;
        Ok(())
    }
}
