//! Workspace lifecycle handlers.

use std::collections::BTreeMap;

use super::{Call, Payload};
use crate::error::Result;
use crate::registry::Workspace;
use crate::runtime::Burrow;
use crate::storage::ProviderKind;

impl Burrow {
    async fn describe(&self, call: Call<'_>, workspace: &Workspace) -> Payload {
        let caller = call.ctx.caller_key();
        let active = self
            .registry
            .get_active(call.ctx)
            .await
            .is_some_and(|ws| ws.id() == workspace.id());
        Payload::Workspace {
            workspace: workspace.handle(),
            active,
            cwd: self.directories.pwd(workspace.id(), &caller).await,
        }
    }

    pub(crate) async fn workspace_create(
        &self,
        call: Call<'_>,
        name: &str,
        provider: Option<ProviderKind>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Payload> {
        let workspace = self
            .registry
            .create(
                name,
                self.scope_or_default(call.scope),
                provider.unwrap_or(self.config.default_provider),
                call.ctx,
                metadata,
            )
            .await?;
        Ok(self.describe(call, &workspace).await)
    }

    pub(crate) async fn workspace_destroy(&self, call: Call<'_>, name: &str) -> Result<Payload> {
        let handle = self
            .registry
            .destroy(name, self.scope_or_default(call.scope), call.ctx)
            .await?;
        self.directories.forget_workspace(&handle.id);
        Ok(Payload::WorkspaceDestroyed { workspace: handle })
    }

    pub(crate) async fn workspace_list(&self, call: Call<'_>) -> Result<Payload> {
        let workspaces = self.registry.list(call.ctx, call.scope).await?;
        let active = self
            .registry
            .get_active(call.ctx)
            .await
            .map(|ws| ws.name().to_string());
        Ok(Payload::Workspaces { workspaces, active })
    }

    pub(crate) async fn workspace_switch(&self, call: Call<'_>, name: &str) -> Result<Payload> {
        let workspace = self
            .registry
            .switch_active(name, self.scope_or_default(call.scope), call.ctx)
            .await?;
        Ok(self.describe(call, &workspace).await)
    }

    pub(crate) async fn workspace_info(&self, call: Call<'_>) -> Result<Payload> {
        let workspace = self.target(call).await?;
        Ok(self.describe(call, &workspace).await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::error::ErrorKind;
    use crate::scope::{CallerContext, ScopeKind};
    use crate::tools::{Operation, Payload, ToolRequest};
    use crate::Burrow;

    fn op(ctx: &CallerContext, operation: Operation) -> ToolRequest {
        ToolRequest::new(ctx.clone(), operation)
    }

    fn create(name: &str) -> Operation {
        Operation::WorkspaceCreate {
            name: name.to_string(),
            provider: None,
            metadata: [("purpose".to_string(), "test".to_string())].into(),
        }
    }

    #[tokio::test]
    async fn test_list_marks_active_and_orders_by_creation() {
        let burrow = Burrow::in_memory();
        let ctx = CallerContext::session("s");
        for name in ["one", "two", "three"] {
            burrow.execute(op(&ctx, create(name))).await.unwrap();
        }
        burrow
            .execute(op(
                &ctx,
                Operation::WorkspaceSwitch {
                    name: "two".to_string(),
                },
            ))
            .await
            .unwrap();

        match burrow.execute(op(&ctx, Operation::WorkspaceList {})).await.unwrap() {
            Payload::Workspaces { workspaces, active } => {
                let names: Vec<_> = workspaces.iter().map(|w| w.name.as_str()).collect();
                assert_eq!(names, ["one", "two", "three"]);
                assert_eq!(active.as_deref(), Some("two"));
                assert_eq!(workspaces[0].metadata["purpose"], "test");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_destroy_resets_navigation() {
        let burrow = Burrow::in_memory();
        let ctx = CallerContext::session("s");
        burrow.execute(op(&ctx, create("w"))).await.unwrap();
        burrow
            .execute(op(&ctx, Operation::Mkdir { path: "/d".to_string() }))
            .await
            .unwrap();
        burrow
            .execute(op(&ctx, Operation::Cd { path: "/d".to_string() }))
            .await
            .unwrap();

        burrow
            .execute(op(
                &ctx,
                Operation::WorkspaceDestroy {
                    name: "w".to_string(),
                },
            ))
            .await
            .unwrap();
        let err = burrow
            .execute(op(&ctx, Operation::Pwd {}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // Same name again starts fresh at the root.
        burrow.execute(op(&ctx, create("w"))).await.unwrap();
        match burrow.execute(op(&ctx, Operation::Pwd {})).await.unwrap() {
            Payload::Cwd { cwd } => assert_eq!(cwd, "/"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scope_selects_partition() {
        let burrow = Burrow::in_memory();
        let ctx = CallerContext::new("alice", "s");
        burrow
            .execute(op(&ctx, create("shared-name")).with_scope(ScopeKind::User))
            .await
            .unwrap();
        burrow
            .execute(op(&ctx, create("shared-name")))
            .await
            .unwrap();

        let err = burrow
            .execute(op(&ctx, create("shared-name")).with_scope(ScopeKind::User))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        // Another session of the same user sees only the user-scope one.
        let other = CallerContext::new("alice", "s2");
        match burrow
            .execute(op(&other, Operation::WorkspaceList {}))
            .await
            .unwrap()
        {
            Payload::Workspaces { workspaces, .. } => {
                let scopes: Vec<_> = workspaces.iter().map(|w| w.scope).collect();
                assert!(scopes.contains(&ScopeKind::User));
                assert!(!scopes.contains(&ScopeKind::Session));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
