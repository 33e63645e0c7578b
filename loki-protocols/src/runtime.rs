//! Owning-task plumbing shared by the stateful modules
//!
//! Each running module has one task that owns its tables. Hooks on the
//! capture thread and operator calls reach it through a [`Mailbox`]; the task
//! is stopped and joined through its [`TaskHandle`].

use loki_core::{Error, Firewall, InjectorHandle, Interface, MacAddr, ModuleContext, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub enum Envelope<C> {
    Command(C),
    Shutdown,
}

/// Sending side of a module task's queue
pub struct Mailbox<C> {
    module: &'static str,
    tx: mpsc::UnboundedSender<Envelope<C>>,
}

impl<C> Clone for Mailbox<C> {
    fn clone(&self) -> Self {
        Self {
            module: self.module,
            tx: self.tx.clone(),
        }
    }
}

impl<C> Mailbox<C> {
    /// Queue a command; false once the task has exited
    pub fn send(&self, command: C) -> bool {
        if self.tx.send(Envelope::Command(command)).is_err() {
            trace!(module = self.module, "task gone, command dropped");
            return false;
        }
        true
    }

    /// Queue a command carrying a reply channel and wait for the answer
    pub async fn request<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> C) -> Result<R> {
        let (reply, answer) = oneshot::channel();
        if !self.send(make(reply)) {
            return Err(Error::module_state(self.module, "not running"));
        }
        answer
            .await
            .map_err(|_| Error::module_state(self.module, "task exited before replying"))
    }
}

pub type Inbox<C> = mpsc::UnboundedReceiver<Envelope<C>>;

/// Join handle of a module task
pub struct TaskHandle<C> {
    mailbox: Mailbox<C>,
    join: JoinHandle<()>,
}

impl<C: Send + 'static> TaskHandle<C> {
    pub fn spawn<F, Fut>(module: &'static str, body: F) -> Self
    where
        F: FnOnce(Inbox<C>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let join = tokio::spawn(body(rx));
        debug!(module, "task spawned");
        Self {
            mailbox: Mailbox { module, tx },
            join,
        }
    }

    pub fn mailbox(&self) -> Mailbox<C> {
        self.mailbox.clone()
    }

    /// Ask the task to exit and wait for it
    pub async fn shutdown(self) -> Result<()> {
        let module = self.mailbox.module;
        let _ = self.mailbox.tx.send(Envelope::Shutdown);
        self.join.await.map_err(|e| {
            warn!(module, error = %e, "task ended abnormally");
            Error::module_state(module, "task panicked")
        })?;
        debug!(module, "task joined");
        Ok(())
    }
}

/// Configuration the engine pushes in through the module setters
#[derive(Clone, Default)]
pub struct Settings {
    pub address: Option<(Ipv4Addr, Ipv4Addr)>,
    pub interface: Option<Interface>,
    pub injector: Option<InjectorHandle>,
    pub firewall: Option<Arc<dyn Firewall>>,
}

impl Settings {
    pub fn mac(&self) -> MacAddr {
        self.interface
            .as_ref()
            .map(|i| i.mac_address)
            .unwrap_or_else(MacAddr::zero)
    }

    /// Local address and mask, required by the routing modules
    pub fn require_address(&self, module: &'static str) -> Result<(Ipv4Addr, Ipv4Addr)> {
        self.address
            .ok_or_else(|| Error::module_state(module, "no local address configured"))
    }

    /// Injector, or a detached one when the session has none
    pub fn injector(&self, module: &'static str) -> InjectorHandle {
        self.injector
            .clone()
            .unwrap_or_else(|| InjectorHandle::new(module))
    }
}

/// Settings cell shared between the setters and `start`
#[derive(Clone, Default)]
pub struct SharedSettings(Arc<Mutex<Settings>>);

impl SharedSettings {
    pub fn snapshot(&self) -> Settings {
        self.0.lock().clone()
    }

    pub fn update(&self, apply: impl FnOnce(&mut Settings)) {
        apply(&mut self.0.lock());
    }
}

/// Local drop rule for one IP protocol on the capture interface, so the
/// host stack does not answer the routers the module is talking to
pub struct InboundFilter {
    module: &'static str,
    protocol: u8,
    firewall: Arc<dyn Firewall>,
    interface: String,
    active: bool,
}

impl InboundFilter {
    /// None unless both a firewall and an interface were configured
    pub fn from_settings(module: &'static str, protocol: u8, settings: &Settings) -> Option<Self> {
        let firewall = settings.firewall.as_ref()?;
        let interface = settings.interface.as_ref()?;
        Some(Self {
            module,
            protocol,
            firewall: Arc::clone(firewall),
            interface: interface.name.clone(),
            active: false,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set(&mut self, wanted: bool, context: &ModuleContext) {
        if wanted == self.active {
            return;
        }
        let name = self.module.to_uppercase();
        let result = if wanted {
            context
                .log
                .log(&format!("Setting local packet filter for {}", name), self.module);
            self.firewall.drop_inbound(&self.interface, self.protocol)
        } else {
            context
                .log
                .log(&format!("Removing local packet filter for {}", name), self.module);
            self.firewall.restore_inbound(&self.interface, self.protocol)
        };
        match result {
            Ok(()) => self.active = wanted,
            Err(e) => warn!(module = self.module, error = %e, "Firewall rule change failed"),
        }
    }
}
