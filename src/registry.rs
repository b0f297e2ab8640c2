use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{UnitOfWorkError, UnitOfWorkResult};

/// Builds a repository bound to the given transaction handle.
///
/// The produced value is type-erased; callers recover the concrete type by
/// downcasting.
pub type RepositoryFactory<H> = Arc<dyn Fn(H) -> Box<dyn Any + Send> + Send + Sync>;

/// Name-keyed set of repository factories.
///
/// The registry knows nothing about transactions: it only maps names to
/// factories over some handle type `H`.
pub struct Registry<H> {
    factories: HashMap<String, RepositoryFactory<H>>,
}

impl<H> Registry<H> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Stores `factory` under `name`, replacing any previous factory with that name.
    pub fn register<R, F>(&mut self, name: impl Into<String>, factory: F)
    where
        H: 'static,
        F: Fn(H) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        let factory: RepositoryFactory<H> =
            Arc::new(move |handle| Box::new(factory(handle)) as Box<dyn Any + Send>);
        self.factories.insert(name.into(), factory);
    }

    /// Removes the factory registered under `name`. Unknown names are ignored.
    pub fn unregister(&mut self, name: &str) {
        self.factories.remove(name);
    }

    pub fn lookup(&self, name: &str) -> UnitOfWorkResult<&RepositoryFactory<H>> {
        self.factories
            .get(name)
            .ok_or_else(|| UnitOfWorkError::RepositoryNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for Registry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
