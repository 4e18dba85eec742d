//! Per-request context.
//!
//! The transport layer authenticates each inbound call and hands the core a
//! [`RequestContext`] describing who is calling, on behalf of which user and
//! tenant. The context also carries the request's cancellation signal so long
//! waits (device approval) stop when the client goes away.

use tokio_util::sync::CancellationToken;

/// Authenticated identity and cancellation signal of one inbound request.
///
/// # Example
///
/// ```rust
/// use trustline_core::RequestContext;
///
/// let ctx = RequestContext::new("tenant-1")
///     .with_app_id("app-a")
///     .with_user_id("user-1");
///
/// assert_eq!(ctx.tenant_id(), "tenant-1");
/// assert_eq!(ctx.app_id(), Some("app-a"));
/// assert!(!ctx.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    tenant_id: String,
    app_id: Option<String>,
    user_id: Option<String>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Create a context scoped to a tenant, with no authenticated app or user.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Self::default()
        }
    }

    /// Set the application authenticated on this request.
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Set the end user on whose behalf the request is made.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach the cancellation token of the underlying request.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Tenant that scopes credential and key lookups.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Authenticated application id, if present and non-empty.
    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref().filter(|id| !id.is_empty())
    }

    /// End user id, if present and non-empty.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.is_empty())
    }

    /// The request's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
