//! `find` and `grep`.
//!
//! Both walk the tree depth-first in name order, so results are stable
//! across calls and providers.

use glob::Pattern;

use super::{Call, GrepMatch, Payload};
use crate::error::{Error, Result};
use crate::navigation::path;
use crate::runtime::Burrow;
use crate::storage::{Metadata, StorageEngine};

/// Lazy pre-order walk. Directories are listed only when the walk reaches
/// them, so a caller that stops early never lists the rest of the tree.
struct Walk<'a> {
    engine: &'a dyn StorageEngine,
    stack: Vec<(String, Metadata)>,
}

impl<'a> Walk<'a> {
    /// Everything below `root`, excluding `root` itself.
    async fn below(engine: &'a dyn StorageEngine, root: &str) -> Result<Self> {
        let mut walk = Self {
            engine,
            stack: Vec::new(),
        };
        walk.descend(root).await?;
        Ok(walk)
    }

    /// Just `path`.
    fn single(engine: &'a dyn StorageEngine, path: String, meta: Metadata) -> Self {
        Self {
            engine,
            stack: vec![(path, meta)],
        }
    }

    async fn descend(&mut self, dir: &str) -> Result<()> {
        let entries = self.engine.list(dir).await?;
        self.stack.extend(
            entries
                .into_iter()
                .rev()
                .map(|entry| (path::child(dir, &entry.name), entry.metadata)),
        );
        Ok(())
    }

    async fn next(&mut self) -> Result<Option<(String, Metadata)>> {
        let Some((found, meta)) = self.stack.pop() else {
            return Ok(None);
        };
        if meta.is_dir() {
            self.descend(&found).await?;
        }
        Ok(Some((found, meta)))
    }
}

impl Burrow {
    pub(crate) async fn find(
        &self,
        call: Call<'_>,
        pattern: &str,
        raw: &str,
        max_results: Option<usize>,
    ) -> Result<Payload> {
        let limit = self.config.search.max_results(max_results)?;
        let glob = Pattern::new(pattern)
            .map_err(|e| Error::InvalidArgument(format!("invalid glob {pattern:?}: {e}")))?;

        let workspace = self.target(call).await?;
        let _shared = workspace.enter_shared().await?;
        let root = self.resolve(call, &workspace, raw).await?;
        let engine = workspace.engine().as_ref();

        let mut matches = Vec::new();
        let mut truncated = false;
        let mut walk = Walk::below(engine, &root).await?;
        while let Some((found, _)) = walk.next().await? {
            if !glob.matches(path::file_name(&found)) {
                continue;
            }
            if matches.len() == limit {
                truncated = true;
                break;
            }
            matches.push(found);
        }
        Ok(Payload::Found {
            pattern: pattern.to_string(),
            matches,
            truncated,
        })
    }

    /// Lines are split on `\n`; files that are not valid UTF-8 are skipped.
    pub(crate) async fn grep(
        &self,
        call: Call<'_>,
        pattern: &str,
        raw: &str,
        max_results: Option<usize>,
    ) -> Result<Payload> {
        if pattern.is_empty() {
            return Err(Error::InvalidArgument("pattern must not be empty".to_string()));
        }
        let limit = self.config.search.max_results(max_results)?;

        let workspace = self.target(call).await?;
        let _shared = workspace.enter_shared().await?;
        let root = self.resolve(call, &workspace, raw).await?;
        let engine = workspace.engine().as_ref();

        let meta = engine.stat(&root).await?;
        let mut walk = if meta.is_file() {
            Walk::single(engine, root, meta)
        } else {
            Walk::below(engine, &root).await?
        };

        let mut matches = Vec::new();
        let mut truncated = false;
        'files: while let Some((file, meta)) = walk.next().await? {
            if !meta.is_file() {
                continue;
            }
            let data = engine.read(&file).await?;
            let Ok(text) = std::str::from_utf8(&data) else {
                continue;
            };
            for (index, line) in text.lines().enumerate() {
                if !line.contains(pattern) {
                    continue;
                }
                if matches.len() == limit {
                    truncated = true;
                    break 'files;
                }
                matches.push(GrepMatch {
                    path: file.clone(),
                    line: index + 1,
                    text: line.to_string(),
                });
            }
        }
        Ok(Payload::GrepMatches {
            pattern: pattern.to_string(),
            matches,
            truncated,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::Walk;
    use crate::error::ErrorKind;
    use crate::storage::{MemoryEngine, StorageEngine};
    use crate::scope::CallerContext;
    use crate::tools::{Operation, Payload, ToolRequest};
    use crate::Burrow;

    async fn seeded() -> (Burrow, CallerContext) {
        let burrow = Burrow::in_memory();
        let ctx = CallerContext::session("search");
        burrow
            .execute(ToolRequest::new(
                ctx.clone(),
                Operation::WorkspaceCreate {
                    name: "ws".to_string(),
                    provider: None,
                    metadata: Default::default(),
                },
            ))
            .await
            .unwrap();
        for (path, content) in [
            ("/README.md", "hello\nworld\n"),
            ("/src/main.rs", "fn main() {\n    println!(\"hello\");\n}\n"),
            ("/src/lib.rs", "pub fn hello() {}\n"),
            ("/docs/guide.md", "say hello\nsay hello again\n"),
        ] {
            burrow
                .execute(ToolRequest::new(
                    ctx.clone(),
                    Operation::Write {
                        path: path.to_string(),
                        content: content.to_string(),
                    },
                ))
                .await
                .unwrap();
        }
        (burrow, ctx)
    }

    #[tokio::test]
    async fn test_find_by_glob() {
        let (burrow, ctx) = seeded().await;
        let payload = burrow
            .execute(ToolRequest::new(
                ctx,
                Operation::Find {
                    pattern: "*.rs".to_string(),
                    path: ".".to_string(),
                    max_results: None,
                },
            ))
            .await
            .unwrap();
        match payload {
            Payload::Found {
                matches, truncated, ..
            } => {
                assert_eq!(matches, ["/src/lib.rs", "/src/main.rs"]);
                assert!(!truncated);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_find_truncates() {
        let (burrow, ctx) = seeded().await;
        let payload = burrow
            .execute(ToolRequest::new(
                ctx,
                Operation::Find {
                    pattern: "*".to_string(),
                    path: "/".to_string(),
                    max_results: Some(2),
                },
            ))
            .await
            .unwrap();
        match payload {
            Payload::Found {
                matches, truncated, ..
            } => {
                assert_eq!(matches.len(), 2);
                assert!(truncated);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_grep_reports_line_numbers() {
        let (burrow, ctx) = seeded().await;
        let payload = burrow
            .execute(ToolRequest::new(
                ctx,
                Operation::Grep {
                    pattern: "hello".to_string(),
                    path: "/docs".to_string(),
                    max_results: None,
                },
            ))
            .await
            .unwrap();
        match payload {
            Payload::GrepMatches { matches, .. } => {
                let lines: Vec<_> = matches.iter().map(|m| (m.path.as_str(), m.line)).collect();
                assert_eq!(lines, [("/docs/guide.md", 1), ("/docs/guide.md", 2)]);
                assert_eq!(matches[1].text, "say hello again");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_grep_single_file_and_limit() {
        let (burrow, ctx) = seeded().await;
        let payload = burrow
            .execute(ToolRequest::new(
                ctx.clone(),
                Operation::Grep {
                    pattern: "hello".to_string(),
                    path: "/".to_string(),
                    max_results: Some(1),
                },
            ))
            .await
            .unwrap();
        match payload {
            Payload::GrepMatches {
                matches, truncated, ..
            } => {
                assert_eq!(matches.len(), 1);
                assert!(truncated);
            }
            other => panic!("unexpected payload {other:?}"),
        }

        let payload = burrow
            .execute(ToolRequest::new(
                ctx,
                Operation::Grep {
                    pattern: "main".to_string(),
                    path: "/src/main.rs".to_string(),
                    max_results: None,
                },
            ))
            .await
            .unwrap();
        match payload {
            Payload::GrepMatches { matches, .. } => assert_eq!(matches.len(), 1),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bad_inputs_rejected() {
        let (burrow, ctx) = seeded().await;
        for operation in [
            Operation::Find {
                pattern: "[".to_string(),
                path: "/".to_string(),
                max_results: None,
            },
            Operation::Grep {
                pattern: String::new(),
                path: "/".to_string(),
                max_results: None,
            },
            Operation::Grep {
                pattern: "x".to_string(),
                path: "/".to_string(),
                max_results: Some(0),
            },
        ] {
            let err = burrow
                .execute(ToolRequest::new(ctx.clone(), operation))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn test_walk_is_pre_order_and_lazy() {
        let engine = MemoryEngine::new();
        for dir in ["/a", "/b", "/b/deep", "/b/deep/er"] {
            engine.mkdir(dir).await.unwrap();
        }
        engine.write("/a/x", b"x").await.unwrap();
        engine.write("/b/deep/er/y", b"y").await.unwrap();

        let mut walk = Walk::below(&engine, "/").await.unwrap();
        let first: Vec<_> = [
            walk.next().await.unwrap().unwrap().0,
            walk.next().await.unwrap().unwrap().0,
        ]
        .into();
        assert_eq!(first, ["/a", "/a/x"]);
        // Nothing under /b has been listed yet.
        let pending: Vec<_> = walk.stack.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(pending, ["/b"]);

        let mut rest = Vec::new();
        while let Some((found, _)) = walk.next().await.unwrap() {
            rest.push(found);
        }
        assert_eq!(rest, ["/b", "/b/deep", "/b/deep/er", "/b/deep/er/y"]);
    }
}
