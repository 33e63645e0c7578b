//! Session: module lifecycle around one capture/injection context
//!
//! Starting a module pushes the session configuration through its setters,
//! runs `start`, then registers its hooks. Stopping reverses that: hooks are
//! unregistered before `stop` runs, so no handler fires against a torn-down
//! module.

use dashmap::DashMap;
use loki_capture::{CaptureRunner, FrameSource};
use loki_core::{Error, Firewall, InjectorHandle, Interface, ModuleId, ProtocolModule, Result};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::dispatcher::FrameDispatcher;
use crate::injector::InjectionQueue;
use crate::registry::DispatchRegistry;

/// Settings pushed into every module before it starts
#[derive(Clone, Default)]
pub struct SessionConfig {
    pub interface: Option<Interface>,
    /// Local address and mask; falls back to the interface's IPv4 network
    pub address: Option<(Ipv4Addr, Ipv4Addr)>,
    pub firewall: Option<Arc<dyn Firewall>>,
}

impl SessionConfig {
    fn effective_address(&self) -> Option<(Ipv4Addr, Ipv4Addr)> {
        self.address.or_else(|| {
            let iface = self.interface.as_ref()?;
            Some((iface.ipv4_addr()?, iface.ipv4_mask()?))
        })
    }
}

/// Information about a running module
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub id: ModuleId,
    pub name: &'static str,
}

struct RunningModule {
    id: ModuleId,
    module: Arc<dyn ProtocolModule>,
}

pub struct Session {
    config: SessionConfig,
    registry: Arc<DispatchRegistry>,
    dispatcher: Arc<FrameDispatcher>,
    injection: Option<InjectionQueue>,
    modules: DashMap<&'static str, RunningModule>,
    shutting_down: AtomicBool,
}

impl Session {
    /// Create a session; without an injection queue, modules get handles
    /// that nothing drains (offline analysis)
    pub fn new(config: SessionConfig, injection: Option<InjectionQueue>) -> Self {
        let registry = Arc::new(DispatchRegistry::new());
        let dispatcher = Arc::new(FrameDispatcher::new(Arc::clone(&registry)));
        info!(
            interface = config.interface.as_ref().map(|i| i.name.as_str()).unwrap_or("-"),
            injection = injection.is_some(),
            "Creating new Session"
        );
        Self {
            config,
            registry,
            dispatcher,
            injection,
            modules: DashMap::new(),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn dispatcher(&self) -> Arc<FrameDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn registry(&self) -> &Arc<DispatchRegistry> {
        &self.registry
    }

    pub fn injection(&self) -> Option<&InjectionQueue> {
        self.injection.as_ref()
    }

    /// Configure, start and register a module
    ///
    /// A module that fails to start is not registered and not tracked.
    pub async fn start_module(&self, module: Arc<dyn ProtocolModule>) -> Result<ModuleId> {
        if self.shutting_down.load(Ordering::Relaxed) {
            return Err(Error::module_state(module.name(), "session is shutting down"));
        }

        let name = module.name();
        if self.modules.contains_key(name) {
            return Err(Error::AlreadyExists(format!("Module '{}' already running", name)));
        }

        self.configure(module.as_ref());

        info!(module = name, "Starting module");
        module.start().await?;

        let id = ModuleId::new();
        let hooks = module.hooks();
        if let Err(e) = self.registry.register(id, name, &hooks) {
            self.stop_quietly(module.as_ref()).await;
            return Err(e);
        }

        if self.modules.contains_key(name) {
            // lost a race with a concurrent start of the same module
            let _ = self.registry.unregister(id);
            self.stop_quietly(module.as_ref()).await;
            return Err(Error::AlreadyExists(format!("Module '{}' already running", name)));
        }
        self.modules.insert(name, RunningModule { id, module });

        info!(module = name, id = %id, "Module started");
        Ok(id)
    }

    fn configure(&self, module: &dyn ProtocolModule) {
        let name = module.name();
        if let Some(interface) = &self.config.interface {
            module.set_interface(interface);
        }
        if let Some((address, mask)) = self.config.effective_address() {
            module.set_address(address, mask);
        }
        let injector = match &self.injection {
            Some(queue) => queue.handle(name),
            None => {
                debug!(module = name, "No injection queue, forged frames are discarded");
                InjectorHandle::new(name)
            }
        };
        module.set_injector(injector);
        if let Some(firewall) = &self.config.firewall {
            module.set_firewall(Arc::clone(firewall));
        }
    }

    async fn stop_quietly(&self, module: &dyn ProtocolModule) {
        if let Err(e) = module.stop().await {
            warn!(module = module.name(), error = %e, "Module failed to stop");
        }
    }

    /// Unregister and stop a module
    pub async fn stop_module(&self, name: &str) -> Result<()> {
        let Some((_, running)) = self.modules.remove(name) else {
            warn!(module = name, "Module not running");
            return Err(Error::NotFound(format!("Module '{}' not running", name)));
        };

        info!(module = name, id = %running.id, "Stopping module");
        if let Err(e) = self.registry.unregister(running.id) {
            warn!(module = name, error = %e, "Module had no dispatch entries");
        }
        running.module.stop().await?;
        info!(module = name, "Module stopped");
        Ok(())
    }

    /// Running modules, sorted by name
    pub fn running(&self) -> Vec<ModuleInfo> {
        let mut modules: Vec<ModuleInfo> = self
            .modules
            .iter()
            .map(|entry| ModuleInfo {
                id: entry.value().id,
                name: *entry.key(),
            })
            .collect();
        modules.sort_by_key(|info| info.name);
        modules
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Feed a frame source into the dispatcher on the capture thread
    pub fn spawn_capture(
        &self,
        source: Box<dyn FrameSource>,
        poll_interval: Duration,
    ) -> Result<CaptureRunner> {
        let dispatcher = self.dispatcher();
        CaptureRunner::spawn(source, poll_interval, move |frame| {
            dispatcher.dispatch(&frame);
        })
    }

    /// Stop every module, then the injection writer
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::Relaxed) {
            return;
        }
        info!(modules = self.modules.len(), "Shutting down Session");

        let names: Vec<&'static str> = self.modules.iter().map(|entry| *entry.key()).collect();
        for name in names {
            if let Err(e) = self.stop_module(name).await {
                warn!(module = name, error = %e, "Error while stopping module");
            }
        }

        if let Some(queue) = &self.injection {
            queue.stop();
        }
        info!("Session shutdown complete");
    }
}
