//! The portal's calendar-entry protocol, replayed over plain HTTP.
//!
//! One submission walks: [`Portal::locate`] → [`Portal::fetch_calendar`] →
//! [`reconcile`] → [`Portal::submit`] (which re-fetches) → [`classify`].
//! Every step that talks to the portal needs a
//! [`SessionLease`](crate::session::SessionLease).

mod calendar;
mod classify;
mod client;
mod locator;
mod reconcile;
mod schema;
mod script;
mod submit;
mod table;

pub use calendar::parse_calendar;
pub use classify::classify;
pub use client::{Page, PortalClient};
pub use reconcile::reconcile;
pub use schema::CalendarSchema;

use crate::config::{EndpointConfig, ResolvedConfig};

/// Endpoint layout and page schema of one portal deployment.
#[derive(Debug, Clone)]
pub struct Portal {
    endpoints: EndpointConfig,
    schema: CalendarSchema,
}

impl Portal {
    pub fn new(endpoints: EndpointConfig, schema: CalendarSchema) -> Self {
        Self { endpoints, schema }
    }

    pub fn from_config(config: &ResolvedConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            config.endpoints.clone(),
            CalendarSchema::from_config(&config.calendar)?,
        ))
    }

    pub fn schema(&self) -> &CalendarSchema {
        &self.schema
    }
}
