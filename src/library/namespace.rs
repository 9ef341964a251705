//! The merged set of native functions visible to a script.

use super::{
    FunctionError, Importer, Library, LibraryResolutionError, MorphLibrary, NativeFunction,
    BUILTIN_NAMESPACE,
};
use crate::formats::FormatRegistry;
use crate::header::{is_identifier, Header};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Native functions keyed `namespace.function`.
#[derive(Clone, Default)]
pub struct Namespace {
    functions: IndexMap<String, Arc<dyn NativeFunction>>,
    namespaces: Vec<String>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    fn qualify(namespace: &str, function: &str) -> String {
        format!("{}.{}", namespace, function)
    }

    pub fn get(&self, namespace: &str, function: &str) -> Option<&Arc<dyn NativeFunction>> {
        self.functions.get(&Self::qualify(namespace, function))
    }

    pub fn contains(&self, namespace: &str, function: &str) -> bool {
        self.get(namespace, function).is_some()
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|bound| bound == namespace)
    }

    /// Bound namespaces in resolution order.
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Qualified names of every bound function.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Call `namespace.function`.
    pub fn call(
        &self,
        namespace: &str,
        function: &str,
        args: &[Value],
    ) -> Result<Value, FunctionError> {
        let native = self.get(namespace, function).ok_or_else(|| {
            FunctionError::failed(format!(
                "function '{}' is not defined",
                Self::qualify(namespace, function)
            ))
        })?;
        native.call(args)
    }

    fn bind(
        &mut self,
        library: &dyn Library,
        formats: &FormatRegistry,
        header: &Header,
        importer: &Arc<dyn Importer>,
    ) -> Result<(), LibraryResolutionError> {
        let namespace = library.namespace().to_string();
        if !is_identifier(&namespace) {
            return Err(LibraryResolutionError::InvalidNamespace { namespace });
        }
        if self.has_namespace(&namespace) {
            return Err(LibraryResolutionError::Duplicate { namespace });
        }

        let table = library
            .functions(formats, header, importer)
            .map_err(|source| LibraryResolutionError::Failed {
                namespace: namespace.clone(),
                source,
            })?;

        tracing::debug!(namespace = %namespace, functions = table.len(), "bound library");

        for (name, function) in table.into_entries() {
            self.functions.insert(Self::qualify(&namespace, &name), function);
        }
        self.namespaces.push(namespace);
        Ok(())
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("namespaces", &self.namespaces)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Assemble the namespace for one transformer.
///
/// The built-in library is bound first, then `supplied` in order, then every
/// header `import` not already bound, looked up in `importable`.
///
/// # Returns
///
/// * `Err(Reserved)` - a supplied or importable library claims the built-in namespace
/// * `Err(Duplicate)` - two supplied libraries share a namespace
/// * `Err(Unresolved)` - an import matches no supplied or importable library
/// * `Err(Failed)` - a library could not build its function table
pub fn resolve(
    supplied: &[Arc<dyn Library>],
    importable: &[Arc<dyn Library>],
    formats: &FormatRegistry,
    header: &Header,
    importer: &Arc<dyn Importer>,
) -> Result<Namespace, LibraryResolutionError> {
    if supplied
        .iter()
        .chain(importable)
        .any(|library| library.namespace() == BUILTIN_NAMESPACE)
    {
        return Err(LibraryResolutionError::Reserved {
            namespace: BUILTIN_NAMESPACE.to_string(),
        });
    }

    let mut namespace = Namespace::new();
    namespace.bind(&MorphLibrary, formats, header, importer)?;

    for library in supplied {
        namespace.bind(library.as_ref(), formats, header, importer)?;
    }

    for import in header.imports() {
        if namespace.has_namespace(import) {
            continue;
        }
        let library = importable
            .iter()
            .find(|library| library.namespace() == import)
            .ok_or_else(|| LibraryResolutionError::Unresolved {
                namespace: import.clone(),
            })?;
        namespace.bind(library.as_ref(), formats, header, importer)?;
    }

    Ok(namespace)
}
