//! Code chunk records: the unit of indexed source code.
//!
//! A chunk is typically a class, method, constructor, or other meaningful
//! unit of code that can be semantically searched. Chunks are immutable;
//! the only "modification" is [`CodeChunk::with_artifact`], which returns a
//! new chunk with the provenance slot filled in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Kinds of code chunks that can be indexed.
///
/// Serialized as the lowercased tag (`"class"`, `"method"`, ...), which is
/// also the on-disk JSON representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Class,
    Interface,
    Enum,
    Record,
    Method,
    Constructor,
    Field,
    Annotation,
}

impl ChunkKind {
    /// The lowercased tag used on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Class => "class",
            ChunkKind::Interface => "interface",
            ChunkKind::Enum => "enum",
            ChunkKind::Record => "record",
            ChunkKind::Method => "method",
            ChunkKind::Constructor => "constructor",
            ChunkKind::Field => "field",
            ChunkKind::Annotation => "annotation",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record describing a unit of code and its origin.
///
/// The serde field renames pin the on-disk JSON keys; they are part of the
/// binary format and must not change without a format version bump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChunk {
    /// Unique identifier for this chunk (stable across save/load)
    pub id: String,

    /// Human-readable name (e.g., "UserService.findById(Long)")
    pub name: String,

    /// Kind of code chunk
    #[serde(rename = "type")]
    pub kind: ChunkKind,

    /// Verbatim source code content
    pub code: String,

    /// Source file path
    pub file: String,

    /// Starting line number (1-indexed)
    #[serde(rename = "lineStart")]
    pub line_start: u32,

    /// Ending line number (1-indexed, >= line_start)
    #[serde(rename = "lineEnd")]
    pub line_end: u32,

    /// Enclosing container name, for methods, constructors and fields
    #[serde(rename = "parentClass")]
    pub parent: Option<String>,

    /// Additional metadata (annotations, modifiers, etc.)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// Source artifact coordinates, stamped by the merger; None otherwise
    #[serde(default)]
    pub artifact: Option<String>,
}

impl CodeChunk {
    /// Creates a chunk with every field spelled out, validating the line
    /// invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ChunkKind,
        code: impl Into<String>,
        file: impl Into<String>,
        line_start: u32,
        line_end: u32,
        parent: Option<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Self> {
        if line_start < 1 {
            return Err(IndexError::InvalidChunk {
                reason: "line_start must be >= 1".to_string(),
            });
        }
        if line_end < line_start {
            return Err(IndexError::InvalidChunk {
                reason: format!("line_end {line_end} must be >= line_start {line_start}"),
            });
        }
        Ok(Self {
            id: id.into(),
            name: name.into(),
            kind,
            code: code.into(),
            file: file.into(),
            line_start,
            line_end,
            parent,
            metadata,
            artifact: None,
        })
    }

    /// Creates a chunk with the minimal required fields, deriving the id
    /// as `"{file}:{name}:{line_start}"`.
    pub fn of(
        name: impl Into<String>,
        kind: ChunkKind,
        code: impl Into<String>,
        file: impl Into<String>,
        line_start: u32,
        line_end: u32,
    ) -> Result<Self> {
        let name = name.into();
        let file = file.into();
        let id = Self::derive_id(&file, &name, line_start);
        Self::new(
            id,
            name,
            kind,
            code,
            file,
            line_start,
            line_end,
            None,
            BTreeMap::new(),
        )
    }

    /// Creates a method chunk carrying its enclosing container.
    pub fn of_method(
        name: impl Into<String>,
        code: impl Into<String>,
        file: impl Into<String>,
        line_start: u32,
        line_end: u32,
        parent: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let file = file.into();
        let id = Self::derive_id(&file, &name, line_start);
        Self::new(
            id,
            name,
            ChunkKind::Method,
            code,
            file,
            line_start,
            line_end,
            Some(parent.into()),
            BTreeMap::new(),
        )
    }

    fn derive_id(file: &str, name: &str, line_start: u32) -> String {
        format!("{file}:{name}:{line_start}")
    }

    /// Returns a new chunk identical to this one with the provenance slot
    /// set to `coords`. The receiver is left untouched.
    #[must_use]
    pub fn with_artifact(&self, coords: impl Into<String>) -> Self {
        Self {
            artifact: Some(coords.into()),
            ..self.clone()
        }
    }

    /// Returns the fully qualified name including the parent container.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.parent {
            Some(parent) if !parent.is_empty() => format!("{parent}.{}", self.name),
            _ => self.name.clone(),
        }
    }

    /// Returns a truncated version of the code for display purposes.
    #[must_use]
    pub fn truncated_code(&self, max_len: usize) -> String {
        if self.code.len() <= max_len {
            return self.code.clone();
        }
        let cut = max_len.saturating_sub(3);
        let mut end = cut;
        while end > 0 && !self.code.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &self.code[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> CodeChunk {
        CodeChunk::of(
            "UserService.findById",
            ChunkKind::Method,
            "public User findById(Long id) { return repo.get(id); }",
            "src/UserService.java",
            10,
            12,
        )
        .unwrap()
    }

    #[test]
    fn derived_id_shape() {
        let c = chunk();
        assert_eq!(c.id, "src/UserService.java:UserService.findById:10");
    }

    #[test]
    fn line_invariants_enforced() {
        assert!(CodeChunk::of("a", ChunkKind::Class, "", "f", 0, 5).is_err());
        assert!(CodeChunk::of("a", ChunkKind::Class, "", "f", 5, 4).is_err());
        assert!(CodeChunk::of("a", ChunkKind::Class, "", "f", 5, 5).is_ok());
    }

    #[test]
    fn with_artifact_is_pure() {
        let original = chunk();
        let stamped = original.with_artifact("com.example:lib:1.0");
        assert_eq!(original.artifact, None);
        assert_eq!(stamped.artifact.as_deref(), Some("com.example:lib:1.0"));
        assert_eq!(stamped.id, original.id);
        assert_eq!(stamped.code, original.code);
    }

    #[test]
    fn qualified_name_uses_parent() {
        let method =
            CodeChunk::of_method("findById", "...", "src/U.java", 3, 4, "UserService").unwrap();
        assert_eq!(method.qualified_name(), "UserService.findById");

        let class = CodeChunk::of("UserService", ChunkKind::Class, "...", "src/U.java", 1, 50)
            .unwrap();
        assert_eq!(class.qualified_name(), "UserService");
    }

    #[test]
    fn truncated_code_appends_ellipsis() {
        let c = chunk();
        let t = c.truncated_code(10);
        assert_eq!(t.len(), 10);
        assert!(t.ends_with("..."));
        assert_eq!(c.truncated_code(10_000), c.code);
    }

    #[test]
    fn json_keys_match_wire_format() {
        let mut c = chunk();
        c.metadata.insert("visibility".to_string(), "public".to_string());
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "method");
        assert_eq!(json["lineStart"], 10);
        assert_eq!(json["lineEnd"], 12);
        assert!(json["parentClass"].is_null());
        assert_eq!(json["metadata"]["visibility"], "public");
        assert!(json["artifact"].is_null());

        let back: CodeChunk = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }
}
