//! The device registry and the declarative load path.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::definition::{Definition, DefinitionSource};
use crate::error::{Error, Result};
use crate::kind::{CreateMode, Kind};
use crate::mac::{self, MachineId};
use crate::message::RTM_NEWLINK;
use crate::netdev::NetDev;
use crate::rtnl::{LinkEvent, Rtnl};

/// Owns every configured device, keyed by interface name.
pub struct Manager {
    rtnl: Rc<dyn Rtnl>,
    source: Box<dyn DefinitionSource>,
    machine_id: MachineId,
    netdevs: RefCell<HashMap<String, NetDev>>,
}

impl Manager {
    pub fn new(
        rtnl: Rc<dyn Rtnl>,
        source: Box<dyn DefinitionSource>,
        machine_id: MachineId,
    ) -> Self {
        Self {
            rtnl,
            source,
            machine_id,
            netdevs: RefCell::new(HashMap::new()),
        }
    }

    /// Route link notifications from the transport to this manager.
    pub fn attach(self: &Rc<Self>) {
        let manager = Rc::downgrade(self);
        self.rtnl.subscribe(Box::new(move |event| {
            if let Some(manager) = manager.upgrade() {
                manager.process_link_event(event);
            }
        }));
    }

    /// Exact lookup by interface name.
    pub fn get(&self, name: &str) -> Result<NetDev> {
        self.netdevs
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                name: name.to_string(),
            })
    }

    /// Snapshot of every registered device.
    pub fn netdevs(&self) -> Vec<NetDev> {
        self.netdevs.borrow().values().cloned().collect()
    }

    /// Insert a record under its name.
    pub fn register(&self, netdev: NetDev) -> Result<()> {
        let mut map = self.netdevs.borrow_mut();
        if map.contains_key(netdev.name()) {
            return Err(Error::AlreadyExists {
                name: netdev.name().to_string(),
            });
        }
        map.insert(netdev.name().to_string(), netdev);
        Ok(())
    }

    /// Remove a record from the registry without touching its state.
    pub fn unregister(&self, name: &str) -> Option<NetDev> {
        self.netdevs.borrow_mut().remove(name)
    }

    /// Remove a device: it lingers until every holder releases its
    /// handle, and all of its pending joins are cancelled.
    pub fn remove(&self, name: &str) -> Result<()> {
        let netdev = self.get(name)?;
        netdev.retire();
        self.unregister(name);
        Ok(())
    }

    /// Reload every definition from scratch.
    ///
    /// The current registry is released first. Definitions load in
    /// reverse enumeration order: the last one found for a name loads
    /// first, and earlier duplicates are rejected on registration, so
    /// precedence is deterministic.
    pub fn load_all(&self) -> Result<()> {
        let old: Vec<NetDev> = self.netdevs.borrow_mut().drain().map(|(_, d)| d).collect();
        for netdev in old {
            netdev.retire();
        }

        let definitions = self.source.definitions()?;
        for definition in definitions.iter().rev() {
            self.load_one(definition.as_ref())?;
        }
        Ok(())
    }

    fn load_one(&self, definition: &dyn Definition) -> Result<()> {
        let probe = definition.probe()?;
        if !probe.matches {
            debug!(origin = definition.origin(), "conditions did not match, skipping");
            return Ok(());
        }
        let Some(kind) = probe.kind else {
            warn!(origin = definition.origin(), "netdev has no kind configured, ignoring");
            return Ok(());
        };
        let Some(name) = probe.name else {
            warn!(origin = definition.origin(), "netdev has no name configured, ignoring");
            return Ok(());
        };

        let settings = definition.load(kind)?;
        if settings.config.kind() != kind {
            return Err(Error::InvalidConfig(format!(
                "{} probed as {kind} but parsed as {}",
                definition.origin(),
                settings.config.kind()
            )));
        }

        if let Err(err) = settings.config.ops().verify(&name) {
            warn!(
                origin = definition.origin(),
                dev = %name,
                %err,
                "invalid netdev, ignoring"
            );
            return Ok(());
        }

        let mac = match settings.mac {
            Some(mac) => Some(mac),
            // VLAN devices inherit the parent's address.
            None if kind != Kind::Vlan => Some(mac::persistent_mac(&self.machine_id, &name)),
            None => None,
        };

        let netdev = NetDev::new(
            self.rtnl.clone(),
            name.clone(),
            kind,
            settings.description,
            mac,
            settings.mtu,
            settings.config,
        );

        if let Err(err) = self.register(netdev.clone()) {
            warn!(
                origin = definition.origin(),
                dev = %name,
                %err,
                "netdev already configured, ignoring"
            );
            return Ok(());
        }
        debug!(dev = %name, kind = %kind, "loaded");

        // Masters and independent kinds exist up front; stacked kinds
        // wait for a backing link, unless a tunnel opted out of needing
        // one.
        let create_now = matches!(
            kind.create_mode(),
            CreateMode::Master | CreateMode::Independent
        ) || netdev.config().is_independent_tunnel();

        if create_now {
            if let Err(err) = netdev.create(None, None) {
                warn!(dev = %name, kind = %kind, %err, "netdev could not be created");
            }
        }
        Ok(())
    }

    /// Route an RTM_NEWLINK notification to the record it concerns.
    /// Interfaces this manager does not own are ignored.
    pub fn process_link_event(&self, event: &LinkEvent) {
        if event.msg_type != RTM_NEWLINK {
            return;
        }
        let Some(name) = event.ifname() else {
            return;
        };
        let Ok(netdev) = self.get(&name) else {
            return;
        };
        if let Err(err) = netdev.set_ifindex(event) {
            debug!(dev = %name, %err, "dropped link notification");
        }
    }
}
