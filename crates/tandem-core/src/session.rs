//! Editing sessions

use crate::types::SessionId;
use std::fmt;

/// Type tag of a session
///
/// Session types form a hierarchy: a derived kind carries the names of all
/// its ancestors, so a plugin filtering on `text` also sees sessions of any
/// kind derived from `text`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKind {
    name: String,
    ancestors: Vec<String>,
}

impl SessionKind {
    /// A root session kind
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ancestors: Vec::new(),
        }
    }

    /// A kind derived from `parent`
    pub fn derived(name: impl Into<String>, parent: &SessionKind) -> Self {
        let mut ancestors = Vec::with_capacity(parent.ancestors.len() + 1);
        ancestors.push(parent.name.clone());
        ancestors.extend(parent.ancestors.iter().cloned());

        Self {
            name: name.into(),
            ancestors,
        }
    }

    /// Name of the kind
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this kind is `type_name` or derives from it
    pub fn is_a(&self, type_name: &str) -> bool {
        self.name == type_name || self.ancestors.iter().any(|a| a == type_name)
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An editing session on a document
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    path: String,
    kind: SessionKind,
}

impl Session {
    /// Create a session on the document at `path`
    pub fn new(id: SessionId, path: impl Into<String>, kind: SessionKind) -> Self {
        Self {
            id,
            path: path.into(),
            kind,
        }
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Document path of the session
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Session type
    pub fn kind(&self) -> &SessionKind {
        &self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_hierarchy() {
        let text = SessionKind::new("text");
        let chat = SessionKind::derived("chat-text", &text);
        let rich = SessionKind::derived("rich-chat-text", &chat);

        assert!(text.is_a("text"));
        assert!(chat.is_a("text"));
        assert!(rich.is_a("text"));
        assert!(rich.is_a("chat-text"));
        assert!(!text.is_a("chat-text"));
        assert!(!SessionKind::new("chat").is_a("text"));
    }
}
