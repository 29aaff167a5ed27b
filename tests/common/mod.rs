//! Shared fixtures for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// Seed a workspace covering both dialects, an embedded block, and a
/// headerless document:
///
/// - `index.md`: key-value header with a cross-document reference
/// - `projects/alpha.md`: key-value header with typed scalars and tags
/// - `projects/beta.md`: native-triple header stating facts about two
///   subjects
/// - `journal.md`: key-value header plus a named ```graphdown block
/// - `plain.md`: no header at all
///
/// Fact count for the whole tree: 17.
#[allow(dead_code)]
pub fn seed_workspace(dir: &TempDir) {
    write(
        dir.path(),
        "index.md",
        r#"---
title: Workspace Index
summary: Entry point for the fixture tree
relates-to: urn:doc:projects/alpha
tags:
  - home
---
# Index

Start here.
"#,
    );
    write(
        dir.path(),
        "projects/alpha.md",
        r#"---
title: Project Alpha
status: active
priority: 2
created: 2025-03-01
tags:
  - planning
  - finance
---
Alpha planning notes.
"#,
    );
    write(
        dir.path(),
        "projects/beta.md",
        r#"---
@prefix gd: <https://graphdown.dev/schema/> .
@prefix ex: <https://example.org/> .

<urn:doc:projects/beta> a gd:Document ;
    gd:title "Project Beta" ;
    gd:relatesTo ex:budget .

ex:budget gd:status "draft" .
---
Beta body.
"#,
    );
    write(
        dir.path(),
        "journal.md",
        r#"---
title: Journal
---
Morning entry.

```graphdown habits
status: active
streak: 4
```

Evening entry.
"#,
    );
    write(dir.path(), "plain.md", "Just prose, no header anywhere.\n");
}

/// Write `content` at `rel` under `root`, creating parent directories.
#[allow(dead_code)]
pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}
