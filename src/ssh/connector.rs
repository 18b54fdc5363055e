//! Connection entrypoint registry
//!
//! `SshClient::connect` resolves every target through this process-wide
//! registry before opening a socket. The registry holds a base resolver and
//! a stack of layers; layers are consulted newest first, then the base.
//! Layers are removed by id, so scopes may exit in any order.

use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::error::Result;
use crate::ports::{ConnectTarget, DirectResolver, TargetResolver};

/// Handle to an installed resolver layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(u64);

struct Layer {
    id: LayerId,
    resolver: Arc<dyn TargetResolver>,
}

struct Registry {
    base: Arc<dyn TargetResolver>,
    layers: Vec<Layer>,
    next_id: u64,
}

impl Registry {
    fn new() -> Self {
        Self {
            base: Arc::new(DirectResolver),
            layers: Vec::new(),
            next_id: 1,
        }
    }
}

static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();

fn read_registry() -> RwLockReadGuard<'static, Registry> {
    REGISTRY
        .get_or_init(|| RwLock::new(Registry::new()))
        .read()
        .unwrap_or_else(PoisonError::into_inner)
}

fn write_registry() -> RwLockWriteGuard<'static, Registry> {
    REGISTRY
        .get_or_init(|| RwLock::new(Registry::new()))
        .write()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Resolve `target` through every installed layer, then the base.
///
/// Resolvers run without the registry lock held.
///
/// # Errors
///
/// Returns the first error any resolver reports.
pub fn resolve_target(target: ConnectTarget) -> Result<ConnectTarget> {
    let (layers, base) = {
        let registry = read_registry();
        let layers: Vec<Arc<dyn TargetResolver>> = registry
            .layers
            .iter()
            .rev()
            .map(|layer| Arc::clone(&layer.resolver))
            .collect();
        (layers, Arc::clone(&registry.base))
    };

    let mut target = target;
    for layer in layers {
        target = layer.resolve(target)?;
    }
    let resolved = base.resolve(target)?;
    trace!(target = %resolved, "Connection target resolved");
    Ok(resolved)
}

/// Push a resolver layer on top of the stack.
#[must_use = "the layer id is needed to remove the layer"]
pub fn install_layer(resolver: Arc<dyn TargetResolver>) -> LayerId {
    let mut registry = write_registry();
    let id = LayerId(registry.next_id);
    registry.next_id += 1;
    registry.layers.push(Layer { id, resolver });
    debug!(layer = id.0, depth = registry.layers.len(), "Resolver layer installed");
    id
}

/// Remove the layer with `id`. Returns false if it was not installed.
pub fn remove_layer(id: LayerId) -> bool {
    let mut registry = write_registry();
    let before = registry.layers.len();
    registry.layers.retain(|layer| layer.id != id);
    let removed = registry.layers.len() != before;
    if removed {
        debug!(layer = id.0, depth = registry.layers.len(), "Resolver layer removed");
    }
    removed
}

/// The resolver consulted after every layer.
#[must_use]
pub fn base_resolver() -> Arc<dyn TargetResolver> {
    Arc::clone(&read_registry().base)
}

/// Replace the base resolver, returning the previous one.
pub fn set_base_resolver(resolver: Arc<dyn TargetResolver>) -> Arc<dyn TargetResolver> {
    std::mem::replace(&mut write_registry().base, resolver)
}

#[must_use]
pub fn layer_count() -> usize {
    read_registry().layers.len()
}

/// Port the innermost layer publishes for `host`, if any.
#[must_use]
pub fn lookup_port(host: &str) -> Option<u16> {
    let registry = read_registry();
    registry
        .layers
        .iter()
        .rev()
        .find_map(|layer| layer.resolver.published_ports()?.get(host).copied())
}

/// All published redirects; inner layers win on duplicate hostnames.
#[must_use]
pub fn published_ports() -> IndexMap<String, u16> {
    let registry = read_registry();
    let mut ports = IndexMap::new();
    for layer in &registry.layers {
        if let Some(table) = layer.resolver.published_ports() {
            for (host, port) in table {
                ports.insert(host.clone(), *port);
            }
        }
    }
    ports
}
