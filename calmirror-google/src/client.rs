//! Calendar v3 access through the `google-calendar` client, implementing
//! `CalendarBackend`.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::future::Future;

use async_trait::async_trait;
use calmirror_core::backend::{CalendarBackend, Destination, EventPayload, InstancePatch};
use calmirror_core::destination::DestinationEvent;
use calmirror_core::event::InstanceKey;
use calmirror_core::window::SyncWindow;
use calmirror_core::{SyncError, SyncResult};
use google_calendar::Client;
use google_calendar::types::{Calendar, Event, MinAccessRole, OrderBy, SendUpdates};
use tracing::{debug, info};

use crate::auth::{AccessTokens, redirect_uri};
use crate::convert;
use crate::wire::{CANCELLED, CONFIRMED};

/// Whether a client error carries one of these HTTP statuses.
fn has_status(error: &impl Display, statuses: &[&str]) -> bool {
    let text = error.to_string();
    statuses.iter().any(|s| text.contains(s))
}

fn is_unauthorized(error: &impl Display) -> bool {
    has_status(error, &["401", "Unauthorized"])
}

fn is_gone(error: &impl Display) -> bool {
    has_status(error, &["404", "Not Found", "410", "Gone"])
}

pub struct GoogleCalendar<T> {
    tokens: T,
    /// Replaces the Calendar v3 endpoint, for tests
    host: Option<String>,
}

impl<T: AccessTokens> GoogleCalendar<T> {
    pub fn new(tokens: T) -> Self {
        GoogleCalendar { tokens, host: None }
    }

    pub fn with_host(tokens: T, host: impl Into<String>) -> Self {
        GoogleCalendar {
            tokens,
            host: Some(host.into()),
        }
    }

    /// A client carrying the current access token. Refreshing is left to
    /// `AccessTokens`, so the client gets no OAuth secrets.
    fn client(&self, access_token: String) -> Client {
        let mut client = Client::new(
            String::new(),
            String::new(),
            redirect_uri(),
            access_token,
            String::new(),
        );
        if let Some(host) = &self.host {
            client.with_host_override(host);
        }
        client
    }

    /// Run one API call, refreshing the token once if it is rejected.
    async fn call<R, E, F, Fut>(&self, action: &str, op: F) -> SyncResult<R>
    where
        F: Fn(Client) -> Fut + Send + Sync,
        Fut: Future<Output = Result<R, E>> + Send,
        E: Display + Send,
        R: Send,
    {
        let token = self.tokens.access_token().await?;
        let error = match op(self.client(token)).await {
            Ok(result) => return Ok(result),
            Err(e) if is_unauthorized(&e) => e,
            Err(e) => return Err(remote_error(action, &e)),
        };

        debug!("Access token rejected ({}), refreshing", error);
        self.tokens.refresh().await?;

        let token = self.tokens.access_token().await?;
        match op(self.client(token)).await {
            Ok(result) => Ok(result),
            Err(e) if is_unauthorized(&e) => Err(SyncError::Auth(format!(
                "Google rejected the refreshed token: {}",
                e
            ))),
            Err(e) => Err(remote_error(action, &e)),
        }
    }

    async fn patch_event(
        &self,
        destination: &Destination,
        event_id: &str,
        body: &Event,
    ) -> SyncResult<()> {
        let calendar_id = destination.calendar_id.as_str();
        self.call("patch event", |client| async move {
            client
                .events()
                .patch(calendar_id, event_id, 0, 0, false, SendUpdates::None, false, body)
                .await
                .map(|_| ())
        })
        .await
    }
}

fn remote_error(action: &str, error: &impl Display) -> SyncError {
    if is_gone(error) {
        SyncError::NotFound(format!("Failed to {}: {}", action, error))
    } else {
        SyncError::Remote(format!("Failed to {}: {}", action, error))
    }
}

#[async_trait]
impl<T: AccessTokens> CalendarBackend for GoogleCalendar<T> {
    async fn find_calendar(&self, name: &str) -> SyncResult<Option<String>> {
        let calendars = self
            .call("list calendars", |client| async move {
                client
                    .calendar_list()
                    .list_all(MinAccessRole::Owner, false, false)
                    .await
                    .map(|response| response.body)
            })
            .await?;

        Ok(calendars
            .into_iter()
            .find(|c| !c.id.is_empty() && c.summary == name)
            .map(|c| c.id))
    }

    async fn create_calendar(&self, name: &str) -> SyncResult<String> {
        let body = Calendar {
            summary: name.to_string(),
            time_zone: "UTC".to_string(),
            conference_properties: None,
            description: String::new(),
            etag: String::new(),
            id: String::new(),
            kind: String::new(),
            location: String::new(),
        };
        let body = &body;

        let created = self
            .call("create calendar", |client| async move {
                client
                    .calendars()
                    .insert(body)
                    .await
                    .map(|response| response.body)
            })
            .await?;

        if created.id.is_empty() {
            return Err(SyncError::Remote("Created calendar has no id".into()));
        }

        info!("Created calendar {} ({})", name, created.id);
        Ok(created.id)
    }

    /// Lists the whole window without a property filter: exceptions are not
    /// tagged, so they are joined to their series afterwards.
    async fn list_events(
        &self,
        destination: &Destination,
        window: &SyncWindow,
    ) -> SyncResult<Vec<DestinationEvent>> {
        let calendar_id = destination.calendar_id.as_str();
        let time_min = window.rfc3339_start();
        let time_max = window.rfc3339_end();
        let (time_min, time_max) = (time_min.as_str(), time_max.as_str());

        let items = self
            .call("list events", |client| async move {
                client
                    .events()
                    .list_all(
                        calendar_id,
                        "",                 // i_cal_uid
                        0,                  // max_attendees
                        OrderBy::default(), // order_by
                        &[],                // private_extended_property
                        "",                 // q
                        &[],                // shared_extended_property
                        true,               // show_deleted
                        false,              // show_hidden_invitations
                        false,              // single_events
                        time_max,
                        time_min,
                        "", // time_zone
                        "", // updated_min
                    )
                    .await
                    .map(|response| response.body)
            })
            .await?;

        let listed = items.len();
        let events = convert::destination_events(items, &destination.source_url);
        debug!(
            "Listed {} items in {}, {} mirrored from this feed",
            listed,
            destination.calendar_id,
            events.len()
        );
        Ok(events)
    }

    async fn create_event(
        &self,
        destination: &Destination,
        payload: &EventPayload,
    ) -> SyncResult<String> {
        let calendar_id = destination.calendar_id.as_str();
        let body = convert::event_body(destination, payload)?;
        let body = &body;

        let created = self
            .call("create event", |client| async move {
                client
                    .events()
                    .insert(calendar_id, 0, 0, false, SendUpdates::None, false, body)
                    .await
                    .map(|response| response.body)
            })
            .await?;

        if created.id.is_empty() {
            return Err(SyncError::Remote("Created event has no id".into()));
        }
        Ok(created.id)
    }

    async fn update_event(
        &self,
        destination: &Destination,
        event_id: &str,
        payload: &EventPayload,
    ) -> SyncResult<()> {
        let calendar_id = destination.calendar_id.as_str();
        let body = convert::event_body(destination, payload)?;
        let body = &body;

        self.call("update event", |client| async move {
            client
                .events()
                .update(calendar_id, event_id, 0, 0, false, SendUpdates::None, false, body)
                .await
                .map(|_| ())
        })
        .await
    }

    async fn tag_event(
        &self,
        destination: &Destination,
        event_id: &str,
        uid: &str,
        source_declined: &BTreeSet<InstanceKey>,
    ) -> SyncResult<()> {
        let body = convert::tag_body(destination, uid, source_declined)?;
        self.patch_event(destination, event_id, &body).await
    }

    async fn cancel_event(&self, destination: &Destination, event_id: &str) -> SyncResult<()> {
        let calendar_id = destination.calendar_id.as_str();
        let result = self
            .call("delete event", |client| async move {
                client
                    .events()
                    .delete(calendar_id, event_id, false, SendUpdates::None)
                    .await
                    .map(|_| ())
            })
            .await;

        match result {
            Err(SyncError::NotFound(_)) => {
                debug!("Event {} already gone", event_id);
                Ok(())
            }
            other => other,
        }
    }

    async fn cancel_instance(
        &self,
        destination: &Destination,
        series_id: &str,
        key: &InstanceKey,
    ) -> SyncResult<()> {
        let id = convert::instance_id(series_id, key);
        self.patch_event(destination, &id, &convert::status_body(CANCELLED))
            .await
    }

    async fn restore_instance(
        &self,
        destination: &Destination,
        series_id: &str,
        key: &InstanceKey,
    ) -> SyncResult<()> {
        let id = convert::instance_id(series_id, key);
        self.patch_event(destination, &id, &convert::status_body(CONFIRMED))
            .await
    }

    async fn override_instance(
        &self,
        destination: &Destination,
        series_id: &str,
        key: &InstanceKey,
        patch: &InstancePatch,
    ) -> SyncResult<()> {
        let id = convert::instance_id(series_id, key);
        self.patch_event(destination, &id, &convert::instance_body(patch))
            .await
    }
}
