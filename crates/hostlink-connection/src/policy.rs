//! Reconnect policy configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

/// Produces the user id to reconnect with.
pub type UserIdResolver = Arc<dyn Fn() -> String + Send + Sync>;

/// When and how the connection manager reconnects after a drop.
///
/// ```
/// use std::time::Duration;
/// use hostlink_connection::ReconnectPolicy;
///
/// let policy = ReconnectPolicy {
///     delay: Duration::from_secs(5),
///     ..ReconnectPolicy::with_user_id("alice")
/// };
/// assert!(policy.enabled);
/// assert_eq!(policy.user_id().as_deref(), Some("alice"));
///
/// // Without a resolver the manager reuses the id it last connected with.
/// assert_eq!(ReconnectPolicy::default().user_id(), None);
/// ```
#[derive(Clone)]
pub struct ReconnectPolicy {
    /// Master switch. Disabled policies never schedule anything.
    pub enabled: bool,
    /// Base wait before a reconnect attempt.
    pub delay: Duration,
    /// Upper bound of a random extra wait added to `delay`, so that peers
    /// dropped by the same outage do not all hit the relay at once.
    pub jitter: Duration,
    /// Called at attempt time, not at schedule time. `None` reconnects
    /// under the id passed to the last explicit connect.
    pub resolve_user_id: Option<UserIdResolver>,
}

impl ReconnectPolicy {
    /// Default timings, reconnecting under a fixed user id.
    pub fn with_user_id(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            resolve_user_id: Some(Arc::new(move || user_id.clone())),
            ..Self::default()
        }
    }

    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// The id the resolver picks, if one is configured.
    pub fn user_id(&self) -> Option<String> {
        self.resolve_user_id.as_ref().map(|resolve| resolve())
    }

    /// `delay` plus a uniformly random share of `jitter`.
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.delay;
        }
        let extra = rand::rng().random_range(0..=jitter_ms);
        self.delay + Duration::from_millis(extra)
    }
}

impl Default for ReconnectPolicy {
    /// Enabled, 2 s delay, up to 500 ms jitter, no resolver.
    fn default() -> Self {
        Self {
            enabled: true,
            delay: Duration::from_secs(2),
            jitter: Duration::from_millis(500),
            resolve_user_id: None,
        }
    }
}

/// A random `guest-xxxx` id, for reconnects that have no earlier id to reuse.
pub(crate) fn guest_id() -> String {
    format!("guest-{:04x}", rand::rng().random::<u16>())
}

impl fmt::Debug for ReconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectPolicy")
            .field("enabled", &self.enabled)
            .field("delay", &self.delay)
            .field("jitter", &self.jitter)
            .field("resolve_user_id", &self.resolve_user_id.is_some())
            .finish()
    }
}
