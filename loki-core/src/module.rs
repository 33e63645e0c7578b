//! Protocol module capability surface
//!
//! A module contributes optional per-layer hooks to the dispatch pipeline, has
//! an async start/stop lifecycle, and receives session configuration through
//! setters the engine calls before `start`. Every setter has a no-op default,
//! so a module implements only what it uses.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::firewall::Firewall;
use crate::frame::{Layer, PacketView};
use crate::inject::InjectorHandle;
use crate::{Interface, Result};

/// Outcome of a hook predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Verdict {
    /// Run this hook's handler
    pub matched: bool,
    /// End processing of the frame after this entry
    pub stop: bool,
}

impl Verdict {
    /// Not interested
    pub const SKIP: Verdict = Verdict {
        matched: false,
        stop: false,
    };
    /// Handle and let later entries and layers see the frame too
    pub const MATCH: Verdict = Verdict {
        matched: true,
        stop: false,
    };
    /// Handle and end processing of this frame
    pub const CLAIM: Verdict = Verdict {
        matched: true,
        stop: true,
    };
}

/// Predicate + handler pair contributed to one dispatch layer
pub trait LayerHook: Send + Sync {
    fn check(&self, packet: &PacketView<'_>) -> Verdict;

    fn handle(&self, packet: &PacketView<'_>) -> Result<()>;
}

/// The hooks a module contributes, fixed at registration time
#[derive(Clone, Default)]
pub struct ModuleHooks {
    pub ethernet: Option<Arc<dyn LayerHook>>,
    pub ip: Option<Arc<dyn LayerHook>>,
    pub tcp: Option<Arc<dyn LayerHook>>,
    pub udp: Option<Arc<dyn LayerHook>>,
}

impl ModuleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, layer: Layer, hook: Arc<dyn LayerHook>) -> Self {
        *self.slot_mut(layer) = Some(hook);
        self
    }

    pub fn get(&self, layer: Layer) -> Option<&Arc<dyn LayerHook>> {
        match layer {
            Layer::Ethernet => self.ethernet.as_ref(),
            Layer::Ip => self.ip.as_ref(),
            Layer::Tcp => self.tcp.as_ref(),
            Layer::Udp => self.udp.as_ref(),
        }
    }

    fn slot_mut(&mut self, layer: Layer) -> &mut Option<Arc<dyn LayerHook>> {
        match layer {
            Layer::Ethernet => &mut self.ethernet,
            Layer::Ip => &mut self.ip,
            Layer::Tcp => &mut self.tcp,
            Layer::Udp => &mut self.udp,
        }
    }

    pub fn is_empty(&self) -> bool {
        Layer::ALL.iter().all(|layer| self.get(*layer).is_none())
    }
}

impl std::fmt::Debug for ModuleHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let present: Vec<Layer> = Layer::ALL
            .iter()
            .copied()
            .filter(|layer| self.get(*layer).is_some())
            .collect();
        f.debug_struct("ModuleHooks").field("layers", &present).finish()
    }
}

/// Main trait that all protocol modules implement
#[async_trait]
pub trait ProtocolModule: Send + Sync {
    /// Short name used in logs and on the command line (e.g. "ospf")
    fn name(&self) -> &'static str;

    /// Hooks to register; queried once, after a successful `start`
    fn hooks(&self) -> ModuleHooks {
        ModuleHooks::default()
    }

    /// Spawn the module's tasks
    async fn start(&self) -> Result<()>;

    /// Halt and join every task the module spawned
    async fn stop(&self) -> Result<()>;

    /// Local address and mask of the capture interface
    fn set_address(&self, _address: Ipv4Addr, _mask: Ipv4Addr) {}

    fn set_interface(&self, _interface: &Interface) {}

    fn set_injector(&self, _injector: InjectorHandle) {}

    fn set_firewall(&self, _firewall: Arc<dyn Firewall>) {}
}
