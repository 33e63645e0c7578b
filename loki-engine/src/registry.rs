//! Dispatch registry: the per-layer chains of active modules' hooks
//!
//! Chains are published as an immutable [`Chains`] snapshot behind an `Arc`.
//! `register`/`unregister` build a modified copy and swap it in under the
//! write lock, so a dispatcher holding a snapshot sees either all of a
//! module's hooks or none of them.

use loki_core::{Error, Layer, LayerHook, ModuleHooks, ModuleId, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One predicate/handler pair in a layer chain
#[derive(Clone)]
pub struct CheckEntry {
    /// Module instance that owns this entry
    pub owner: ModuleId,
    /// Module short name, for logs
    pub module: &'static str,
    pub hook: Arc<dyn LayerHook>,
}

impl std::fmt::Debug for CheckEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckEntry")
            .field("owner", &self.owner)
            .field("module", &self.module)
            .finish()
    }
}

/// Immutable snapshot of every layer chain, in registration order
#[derive(Debug, Clone, Default)]
pub struct Chains {
    ethernet: Vec<CheckEntry>,
    ip: Vec<CheckEntry>,
    tcp: Vec<CheckEntry>,
    udp: Vec<CheckEntry>,
}

impl Chains {
    pub fn layer(&self, layer: Layer) -> &[CheckEntry] {
        match layer {
            Layer::Ethernet => &self.ethernet,
            Layer::Ip => &self.ip,
            Layer::Tcp => &self.tcp,
            Layer::Udp => &self.udp,
        }
    }

    fn layer_mut(&mut self, layer: Layer) -> &mut Vec<CheckEntry> {
        match layer {
            Layer::Ethernet => &mut self.ethernet,
            Layer::Ip => &mut self.ip,
            Layer::Tcp => &mut self.tcp,
            Layer::Udp => &mut self.udp,
        }
    }

    /// Total number of entries across all layers
    pub fn len(&self) -> usize {
        Layer::ALL.iter().map(|l| self.layer(*l).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Inner {
    chains: Arc<Chains>,
    owners: HashMap<ModuleId, &'static str>,
}

/// Registry of the hooks of running modules
pub struct DispatchRegistry {
    inner: RwLock<Inner>,
}

impl DispatchRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                chains: Arc::new(Chains::default()),
                owners: HashMap::new(),
            }),
        }
    }

    /// Register every hook a module contributes, in one atomic swap
    ///
    /// Returns an error if the module instance is already registered.
    pub fn register(&self, owner: ModuleId, module: &'static str, hooks: &ModuleHooks) -> Result<()> {
        let mut inner = self.inner.write();

        if inner.owners.contains_key(&owner) {
            warn!(id = %owner, module, "Module already registered");
            return Err(Error::AlreadyExists(format!(
                "Module '{}' ({}) already registered",
                module, owner
            )));
        }

        let mut chains = Chains::clone(&inner.chains);
        for layer in Layer::ALL {
            if let Some(hook) = hooks.get(layer) {
                chains.layer_mut(layer).push(CheckEntry {
                    owner,
                    module,
                    hook: Arc::clone(hook),
                });
                debug!(id = %owner, module, layer = %layer, "Hook added");
            }
        }

        inner.chains = Arc::new(chains);
        inner.owners.insert(owner, module);

        info!(id = %owner, module, hooks = ?hooks, "Module registered");
        Ok(())
    }

    /// Remove every entry owned by `owner`, in one atomic swap
    ///
    /// Returns the number of entries removed.
    pub fn unregister(&self, owner: ModuleId) -> Result<usize> {
        let mut inner = self.inner.write();

        let Some(module) = inner.owners.remove(&owner) else {
            warn!(id = %owner, "Module not found");
            return Err(Error::NotFound(format!("Module {} not registered", owner)));
        };

        let mut chains = Chains::clone(&inner.chains);
        let before = chains.len();
        for layer in Layer::ALL {
            chains.layer_mut(layer).retain(|entry| entry.owner != owner);
        }
        let removed = before - chains.len();
        inner.chains = Arc::new(chains);

        info!(id = %owner, module, removed, "Module unregistered");
        Ok(removed)
    }

    /// Current chains; stays valid and unchanged while held
    pub fn snapshot(&self) -> Arc<Chains> {
        Arc::clone(&self.inner.read().chains)
    }

    pub fn is_registered(&self, owner: ModuleId) -> bool {
        self.inner.read().owners.contains_key(&owner)
    }

    /// Number of registered module instances
    pub fn count(&self) -> usize {
        self.inner.read().owners.len()
    }
}

impl Default for DispatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}
