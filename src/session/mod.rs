//! Portal sessions and exclusive access to them.
//!
//! The portal binds the "current invoice" to the server-side session, so
//! two sequences interleaving on one session would corrupt each other. A
//! [`PortalSession`] therefore hands out one [`SessionLease`] at a time, and
//! every portal operation requires a lease.

mod cache;

pub use cache::{parse_exported_session, SessionCache, SessionData};

use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::config::ResolvedConfig;
use crate::portal::PortalClient;

/// One authenticated portal session.
pub struct PortalSession {
    name: String,
    client: PortalClient,
    lock: Mutex<()>,
}

impl PortalSession {
    pub fn new(
        name: impl Into<String>,
        config: &ResolvedConfig,
        session: &SessionData,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            name: name.into(),
            client: PortalClient::new(config, session)?,
            lock: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for exclusive use of the session.
    pub async fn lease(&self) -> SessionLease<'_> {
        let guard = self.lock.lock().await;
        SessionLease::new(self, guard)
    }
}

/// Exclusive hold on a [`PortalSession`] for one full submission sequence.
pub struct SessionLease<'a> {
    session: &'a PortalSession,
    sequence_id: Uuid,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> SessionLease<'a> {
    fn new(session: &'a PortalSession, guard: MutexGuard<'a, ()>) -> Self {
        Self {
            session,
            sequence_id: Uuid::new_v4(),
            _guard: guard,
        }
    }

    pub fn client(&self) -> &PortalClient {
        &self.session.client
    }

    pub fn session_name(&self) -> &str {
        &self.session.name
    }

    /// Correlation id for log lines of this sequence.
    pub fn sequence_id(&self) -> Uuid {
        self.sequence_id
    }
}
