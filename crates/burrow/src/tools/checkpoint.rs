//! Checkpoint handlers.

use super::{Call, Payload};
use crate::error::Result;
use crate::runtime::Burrow;

impl Burrow {
    pub(crate) async fn checkpoint_create(
        &self,
        call: Call<'_>,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let checkpoint = self
            .checkpoints
            .create(&workspace, name, description)
            .await?;
        Ok(Payload::Checkpoint { checkpoint })
    }

    pub(crate) async fn checkpoint_restore(&self, call: Call<'_>, key: &str) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let checkpoint = self.checkpoints.restore(&workspace, key).await?;
        Ok(Payload::Restored { checkpoint })
    }

    pub(crate) async fn checkpoint_list(&self, call: Call<'_>) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let checkpoints = self.checkpoints.list(&workspace)?;
        Ok(Payload::Checkpoints { checkpoints })
    }

    pub(crate) async fn checkpoint_delete(&self, call: Call<'_>, id: &str) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let checkpoint = self.checkpoints.delete(&workspace, id).await?;
        Ok(Payload::CheckpointDeleted { checkpoint })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::scope::CallerContext;
    use crate::tools::{Operation, Payload, ToolRequest};
    use crate::Burrow;

    #[tokio::test]
    async fn test_checkpoint_lifecycle_through_facade() {
        let burrow = Burrow::in_memory();
        let ctx = CallerContext::session("cp");
        let run = |operation| burrow.execute(ToolRequest::new(ctx.clone(), operation));

        run(Operation::WorkspaceCreate {
            name: "ws".to_string(),
            provider: None,
            metadata: Default::default(),
        })
        .await
        .unwrap();
        run(Operation::Write {
            path: "/state".to_string(),
            content: "v1".to_string(),
        })
        .await
        .unwrap();

        let id = match run(Operation::CheckpointCreate {
            name: Some("before".to_string()),
            description: Some("first version".to_string()),
        })
        .await
        .unwrap()
        {
            Payload::Checkpoint { checkpoint } => {
                assert_eq!(checkpoint.stats.files, 1);
                checkpoint.id
            }
            other => panic!("unexpected payload {other:?}"),
        };

        run(Operation::Write {
            path: "/state".to_string(),
            content: "v2".to_string(),
        })
        .await
        .unwrap();
        run(Operation::CheckpointRestore {
            checkpoint: "before".to_string(),
        })
        .await
        .unwrap();
        match run(Operation::Read {
            path: "/state".to_string(),
        })
        .await
        .unwrap()
        {
            Payload::File { content, .. } => assert_eq!(content, "v1"),
            other => panic!("unexpected payload {other:?}"),
        }

        run(Operation::CheckpointDelete {
            checkpoint_id: id.to_string(),
        })
        .await
        .unwrap();
        match run(Operation::CheckpointList {}).await.unwrap() {
            Payload::Checkpoints { checkpoints } => assert!(checkpoints.is_empty()),
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
