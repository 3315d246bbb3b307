//! Definition resolution and caching
//!
//! The engine resolves definitions by name through a [`DefinitionProvider`].
//! Both implementations cache `Arc`s in a concurrent, read-mostly map;
//! writes happen only on the first load of a name.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use parking_lot::RwLock;

use super::{
    definition::FlowDefinition,
    parser,
    types::{FlowError, FlowResult},
};

/// Resolver from definition name to [`FlowDefinition`].
///
/// Must be safe for concurrent readers. A missing name resolves to
/// `Ok(None)`; a failed load surfaces the underlying parse or definition
/// error.
pub trait DefinitionProvider: Send + Sync {
    fn definition(&self, name: &str) -> FlowResult<Option<Arc<FlowDefinition>>>;
}

/// Provider over programmatically registered definitions
#[derive(Default)]
pub struct RegistryProvider {
    definitions: RwLock<HashMap<String, Arc<FlowDefinition>>>,
}

impl RegistryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition under `name`. The first registration wins;
    /// re-registering an existing name is a no-op.
    pub fn register(&self, name: impl Into<String>, definition: FlowDefinition) {
        self.definitions
            .write()
            .entry(name.into())
            .or_insert_with(|| Arc::new(definition));
    }
}

impl DefinitionProvider for RegistryProvider {
    fn definition(&self, name: &str) -> FlowResult<Option<Arc<FlowDefinition>>> {
        Ok(self.definitions.read().get(name).cloned())
    }
}

/// Provider loading `<root>/<name>.json` files, parsed once and cached
pub struct DirectoryProvider {
    root: PathBuf,
    cache: RwLock<HashMap<String, Arc<FlowDefinition>>>,
}

impl DirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl DefinitionProvider for DirectoryProvider {
    fn definition(&self, name: &str) -> FlowResult<Option<Arc<FlowDefinition>>> {
        if name.trim().is_empty() {
            return Err(FlowError::InvalidArgument(
                "definition name cannot be blank".to_string(),
            ));
        }
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(FlowError::InvalidArgument(format!(
                "definition name cannot traverse directories: {name}"
            )));
        }

        if let Some(cached) = self.cache.read().get(name) {
            return Ok(Some(Arc::clone(cached)));
        }

        let path = self.root.join(format!("{name}.json"));
        if !path.is_file() {
            tracing::debug!(name, path = %path.display(), "no definition file");
            return Ok(None);
        }

        let definition = Arc::new(parser::parse_file(&path)?);
        let mut cache = self.cache.write();
        // first load wins if another reader raced us here
        let entry = cache
            .entry(name.to_string())
            .or_insert_with(|| Arc::clone(&definition));
        Ok(Some(Arc::clone(entry)))
    }
}
