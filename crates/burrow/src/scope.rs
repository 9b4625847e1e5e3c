//! Scope resolution: mapping caller identity onto storage partitions.
//!
//! Every workspace lives in exactly one scope. The scope together with the
//! caller's identity yields an [`OwnerKey`], and `(scope, owner, workspace id)`
//! yields the durable grid path:
//!
//! ```text
//! session/sess-{session_id}/{workspace_id}
//! user/user-{user_id}/{workspace_id}
//! sandbox/shared/{workspace_id}
//! ```
//!
//! The grid path format is part of the persisted-state contract.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::registry::WorkspaceId;

/// Isolation tier for a workspace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Ephemeral, one conversation.
    #[default]
    Session,
    /// Persistent, one identity.
    User,
    /// Shared by every identity.
    Sandbox,
}

impl ScopeKind {
    /// All scopes, in search order.
    pub const ALL: [ScopeKind; 3] = [ScopeKind::Session, ScopeKind::User, ScopeKind::Sandbox];

    /// The lowercase name of this scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Session => "session",
            ScopeKind::User => "user",
            ScopeKind::Sandbox => "sandbox",
        }
    }

    /// Fixed leading segment of grid paths in this scope.
    pub fn grid_prefix(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "session" => Ok(ScopeKind::Session),
            "user" => Ok(ScopeKind::User),
            "sandbox" => Ok(ScopeKind::Sandbox),
            other => Err(Error::InvalidArgument(format!("unknown scope: {other}"))),
        }
    }
}

/// Already-authenticated identity supplied by the transport for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    /// Stable user identity, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Conversation identity, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl CallerContext {
    /// Context with both identities.
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            session_id: Some(session_id.into()),
        }
    }

    /// Context carrying only a session identity.
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            user_id: None,
            session_id: Some(session_id.into()),
        }
    }

    /// Context carrying only a user identity.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            session_id: None,
        }
    }

    /// True when neither identity is present.
    pub fn is_empty(&self) -> bool {
        self.user_ref().is_none() && self.session_ref().is_none()
    }

    fn user_ref(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|s| !s.is_empty())
    }

    fn session_ref(&self) -> Option<&str> {
        self.session_id.as_deref().filter(|s| !s.is_empty())
    }

    /// Key identifying this caller for per-caller navigation state.
    ///
    /// The session wins when present; a user-only caller is keyed by user.
    pub fn caller_key(&self) -> CallerKey {
        match (self.session_ref(), self.user_ref()) {
            (Some(session), _) => CallerKey(format!("sess-{session}")),
            (None, Some(user)) => CallerKey(format!("user-{user}")),
            (None, None) => CallerKey("anonymous".to_string()),
        }
    }
}

/// Identity of one caller session, used to key working directories and the
/// active-workspace pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallerKey(String);

impl CallerKey {
    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier partitioning storage by scope and caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerKey(String);

impl OwnerKey {
    /// The key as a string; doubles as the grid path owner segment.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pure mapping from `(scope, caller)` to owner keys.
#[derive(Debug, Clone)]
pub struct ScopeResolver {
    sandbox_segment: String,
}

impl Default for ScopeResolver {
    fn default() -> Self {
        Self {
            sandbox_segment: "shared".to_string(),
        }
    }
}

impl ScopeResolver {
    /// Create a resolver, optionally naming the sandbox this deployment serves.
    pub fn new(sandbox_id: Option<&str>) -> Result<Self> {
        match sandbox_id.filter(|s| !s.is_empty()) {
            None => Ok(Self::default()),
            Some(id) => {
                validate_identifier("sandbox id", id)?;
                Ok(Self {
                    sandbox_segment: format!("shared-{id}"),
                })
            }
        }
    }

    /// Derive the owner key for a scope.
    ///
    /// SESSION needs a session id, USER needs a user id, SANDBOX needs
    /// nothing and ignores both.
    pub fn derive_owner_key(&self, scope: ScopeKind, ctx: &CallerContext) -> Result<OwnerKey> {
        match scope {
            ScopeKind::Session => {
                let session = ctx.session_ref().ok_or_else(|| {
                    Error::MissingContext("session scope requires a session id".to_string())
                })?;
                validate_identifier("session id", session)?;
                Ok(OwnerKey(format!("sess-{session}")))
            }
            ScopeKind::User => {
                let user = ctx.user_ref().ok_or_else(|| {
                    Error::MissingContext("user scope requires a user id".to_string())
                })?;
                validate_identifier("user id", user)?;
                Ok(OwnerKey(format!("user-{user}")))
            }
            ScopeKind::Sandbox => Ok(OwnerKey(self.sandbox_segment.clone())),
        }
    }

    /// Every `(scope, owner)` partition the caller can see.
    pub fn visible_partitions(&self, ctx: &CallerContext) -> Vec<(ScopeKind, OwnerKey)> {
        ScopeKind::ALL
            .iter()
            .filter_map(|scope| {
                self.derive_owner_key(*scope, ctx)
                    .ok()
                    .map(|owner| (*scope, owner))
            })
            .collect()
    }

    /// Whether the caller may act on a workspace owned by `owner` in `scope`.
    pub fn authorize(&self, scope: ScopeKind, owner: &OwnerKey, ctx: &CallerContext) -> Result<()> {
        if scope == ScopeKind::Sandbox {
            return Ok(());
        }
        match self.derive_owner_key(scope, ctx) {
            Ok(derived) if &derived == owner => Ok(()),
            _ => Err(Error::PermissionDenied(format!(
                "{scope} workspace belongs to another owner"
            ))),
        }
    }
}

/// Canonical durable address of a workspace.
pub fn grid_path(scope: ScopeKind, owner: &OwnerKey, id: &WorkspaceId) -> String {
    format!("{}/{}/{}", scope.grid_prefix(), owner, id)
}

fn validate_identifier(what: &str, value: &str) -> Result<()> {
    if value.contains('/') || value.contains('\0') || value == "." || value == ".." {
        return Err(Error::InvalidArgument(format!(
            "{what} contains reserved characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_scope_requires_session() {
        let resolver = ScopeResolver::default();
        let err = resolver
            .derive_owner_key(ScopeKind::Session, &CallerContext::user("alice"))
            .unwrap_err();
        assert!(matches!(err, Error::MissingContext(_)));

        let empty = CallerContext {
            user_id: None,
            session_id: Some(String::new()),
        };
        assert!(matches!(
            resolver.derive_owner_key(ScopeKind::Session, &empty),
            Err(Error::MissingContext(_))
        ));
    }

    #[test]
    fn test_sessions_never_collide() {
        let resolver = ScopeResolver::default();
        let a = resolver
            .derive_owner_key(ScopeKind::Session, &CallerContext::new("alice", "s1"))
            .unwrap();
        let b = resolver
            .derive_owner_key(ScopeKind::Session, &CallerContext::new("alice", "s2"))
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "sess-s1");
    }

    #[test]
    fn test_user_scope_ignores_session() {
        let resolver = ScopeResolver::default();
        let a = resolver
            .derive_owner_key(ScopeKind::User, &CallerContext::new("alice", "s1"))
            .unwrap();
        let b = resolver
            .derive_owner_key(ScopeKind::User, &CallerContext::new("alice", "s2"))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "user-alice");
        assert!(matches!(
            resolver.derive_owner_key(ScopeKind::User, &CallerContext::session("s1")),
            Err(Error::MissingContext(_))
        ));
    }

    #[test]
    fn test_sandbox_scope_is_shared() {
        let resolver = ScopeResolver::default();
        let a = resolver
            .derive_owner_key(ScopeKind::Sandbox, &CallerContext::user("alice"))
            .unwrap();
        let b = resolver
            .derive_owner_key(ScopeKind::Sandbox, &CallerContext::default())
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "shared");

        let named = ScopeResolver::new(Some("lab")).unwrap();
        let c = named
            .derive_owner_key(ScopeKind::Sandbox, &CallerContext::default())
            .unwrap();
        assert_eq!(c.as_str(), "shared-lab");
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let resolver = ScopeResolver::default();
        let ctx = CallerContext::new("bob", "conv-9");
        for scope in ScopeKind::ALL {
            let first = resolver.derive_owner_key(scope, &ctx).unwrap();
            let second = resolver.derive_owner_key(scope, &ctx).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_identifiers_with_separators_rejected() {
        let resolver = ScopeResolver::default();
        let err = resolver
            .derive_owner_key(ScopeKind::User, &CallerContext::user("a/b"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(ScopeResolver::new(Some("../x")).is_err());
    }

    #[test]
    fn test_grid_path_format() {
        let owner = OwnerKey("user-alice".to_string());
        let id = WorkspaceId::from("01HZX".to_string());
        assert_eq!(grid_path(ScopeKind::User, &owner, &id), "user/user-alice/01HZX");

        let shared = ScopeResolver::default()
            .derive_owner_key(ScopeKind::Sandbox, &CallerContext::default())
            .unwrap();
        assert_eq!(
            grid_path(ScopeKind::Sandbox, &shared, &id),
            "sandbox/shared/01HZX"
        );
    }

    #[test]
    fn test_authorize() {
        let resolver = ScopeResolver::default();
        let alice = CallerContext::user("alice");
        let bob = CallerContext::user("bob");
        let owner = resolver.derive_owner_key(ScopeKind::User, &alice).unwrap();

        assert!(resolver.authorize(ScopeKind::User, &owner, &alice).is_ok());
        assert!(matches!(
            resolver.authorize(ScopeKind::User, &owner, &bob),
            Err(Error::PermissionDenied(_))
        ));

        let shared = resolver
            .derive_owner_key(ScopeKind::Sandbox, &alice)
            .unwrap();
        assert!(resolver.authorize(ScopeKind::Sandbox, &shared, &bob).is_ok());
    }

    #[test]
    fn test_visible_partitions() {
        let resolver = ScopeResolver::default();
        let parts = resolver.visible_partitions(&CallerContext::user("alice"));
        let scopes: Vec<_> = parts.iter().map(|(s, _)| *s).collect();
        assert_eq!(scopes, vec![ScopeKind::User, ScopeKind::Sandbox]);
    }

    #[test]
    fn test_caller_key() {
        assert_eq!(CallerContext::new("u", "s").caller_key().as_str(), "sess-s");
        assert_eq!(CallerContext::user("u").caller_key().as_str(), "user-u");
        assert_eq!(CallerContext::default().caller_key().as_str(), "anonymous");
    }
}
