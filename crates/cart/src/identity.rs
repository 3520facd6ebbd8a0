//! Identity provider seam.
//!
//! Authentication lives outside this crate. The synchronizer only needs to
//! know who is signed in right now and to hear about sign-in/sign-out
//! transitions so it can reconcile with the remote store.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use storehouse_core::UserId;

/// The signed-in user, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Identity-provider user ID; the remote cart key.
    pub id: UserId,
}

impl CurrentUser {
    /// Create a user identity.
    #[must_use]
    pub fn new(id: impl Into<UserId>) -> Self {
        Self { id: id.into() }
    }
}

/// Source of the current user and of identity transitions.
pub trait IdentityProvider: Send + Sync {
    /// The user signed in right now, if any.
    fn current_user(&self) -> Option<CurrentUser>;

    /// Receiver notified on every sign-in and sign-out.
    fn subscribe(&self) -> watch::Receiver<Option<CurrentUser>>;
}

/// Identity provider driven by explicit `sign_in` / `sign_out` calls.
///
/// Stands in for the external auth session: the host application calls
/// [`sign_in`](Self::sign_in) when its auth callback fires.
#[derive(Clone)]
pub struct SessionIdentity {
    tx: watch::Sender<Option<CurrentUser>>,
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl SessionIdentity {
    /// Start with no user signed in.
    #[must_use]
    pub fn anonymous() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Start with `user` already signed in.
    #[must_use]
    pub fn signed_in(user: CurrentUser) -> Self {
        let (tx, _) = watch::channel(Some(user));
        Self { tx }
    }

    /// Record a sign-in.
    pub fn sign_in(&self, user: CurrentUser) {
        self.tx.send_replace(Some(user));
    }

    /// Record a sign-out.
    pub fn sign_out(&self) {
        self.tx.send_replace(None);
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user(&self) -> Option<CurrentUser> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<CurrentUser>> {
        self.tx.subscribe()
    }
}
