//! Sources of auxiliary text resources.

use indexmap::IndexMap;

/// Resolves resource paths to text.
pub trait Importer: Send + Sync {
    fn load(&self, path: &str) -> Option<String>;
}

/// Importer that knows no resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImports;

impl Importer for NoImports {
    fn load(&self, _path: &str) -> Option<String> {
        None
    }
}

/// Importer over a fixed set of in-memory resources.
#[derive(Debug, Clone, Default)]
pub struct InMemoryImporter {
    resources: IndexMap<String, String>,
}

impl InMemoryImporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.resources.insert(path.into(), text.into());
    }
}

impl Importer for InMemoryImporter {
    fn load(&self, path: &str) -> Option<String> {
        self.resources.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_lookup() {
        let importer = InMemoryImporter::new().with("greeting.txt", "hello");
        assert_eq!(importer.load("greeting.txt").as_deref(), Some("hello"));
        assert_eq!(importer.load("missing.txt"), None);
        assert_eq!(NoImports.load("greeting.txt"), None);
    }
}
