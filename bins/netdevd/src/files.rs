//! File-backed definition source: ini-style `*.netdev` files.
//!
//! This is the configuration collaborator the core library only knows as
//! a trait. Files are discovered in lexical order; the manager applies
//! its reverse-order precedence on top, so of two files configuring the
//! same name the lexically later one wins.
//!
//! Structural problems (unterminated headers, assignments outside a
//! section) fail the definition and with it the whole reload. Unknown
//! keys and unparsable values are logged and skipped, like every other
//! relaxed ini dialect on the system.

use std::fs;
use std::path::{Path, PathBuf};

use netdev::definition::{Definition, DefinitionSource, DeviceSettings, Probe};
use netdev::error::{Error, Result};
use netdev::kind::{Kind, KindConfig};
use netdev::mac;
use tracing::warn;

pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }
}

impl DefinitionSource for FileSource {
    fn definitions(&self) -> Result<Vec<Box<dyn Definition>>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "netdev") {
                paths.push(path);
            }
        }
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| Box::new(FileDefinition::new(path)) as Box<dyn Definition>)
            .collect())
    }
}

struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

fn parse_sections(text: &str, origin: &str) -> Result<Vec<Section>> {
    let mut sections: Vec<Section> = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[') {
            let Some(name) = header.strip_suffix(']') else {
                return Err(Error::InvalidConfig(format!(
                    "{origin}:{}: unterminated section header",
                    number + 1
                )));
            };
            sections.push(Section {
                name: name.to_string(),
                entries: Vec::new(),
            });
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(Error::InvalidConfig(format!(
                "{origin}:{}: expected key=value",
                number + 1
            )));
        };
        let Some(section) = sections.last_mut() else {
            return Err(Error::InvalidConfig(format!(
                "{origin}:{}: assignment outside of a section",
                number + 1
            )));
        };
        section
            .entries
            .push((key.trim().to_string(), value.trim().to_string()));
    }
    Ok(sections)
}

struct FileDefinition {
    path: PathBuf,
    origin: String,
}

impl FileDefinition {
    fn new(path: PathBuf) -> Self {
        let origin = path.display().to_string();
        Self { path, origin }
    }

    fn sections(&self) -> Result<Vec<Section>> {
        parse_sections(&fs::read_to_string(&self.path)?, &self.origin)
    }
}

impl Definition for FileDefinition {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn probe(&self) -> Result<Probe> {
        let mut matches = true;
        let mut kind = None;
        let mut name = None;

        for section in self.sections()? {
            match section.name.as_str() {
                "Match" => {
                    for (key, value) in &section.entries {
                        match key.as_str() {
                            "Host" => {
                                matches &= hostname().as_deref() == Some(value.as_str());
                            }
                            "Architecture" => {
                                matches &= value == std::env::consts::ARCH;
                            }
                            other => {
                                warn!(
                                    origin = %self.origin,
                                    key = other,
                                    "unsupported match condition, ignoring"
                                );
                            }
                        }
                    }
                }
                "NetDev" => {
                    for (key, value) in &section.entries {
                        match key.as_str() {
                            "Kind" => match value.parse::<Kind>() {
                                Ok(parsed) => kind = Some(parsed),
                                Err(err) => {
                                    warn!(origin = %self.origin, %err, "failed to parse kind");
                                }
                            },
                            "Name" => name = Some(value.clone()),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(Probe {
            matches,
            kind,
            name,
        })
    }

    fn load(&self, kind: Kind) -> Result<DeviceSettings> {
        let mut settings = DeviceSettings::new(KindConfig::new(kind));

        for section in self.sections()? {
            match section.name.as_str() {
                "Match" => {}
                "NetDev" => {
                    for (key, value) in &section.entries {
                        match key.as_str() {
                            "Kind" | "Name" => {}
                            "Description" => settings.description = Some(value.clone()),
                            "MTUBytes" => settings.mtu = parse_or_warn(&self.origin, key, value),
                            "MACAddress" => match mac::parse(value) {
                                Ok(parsed) => settings.mac = Some(parsed),
                                Err(err) => {
                                    warn!(origin = %self.origin, %err, "ignoring MACAddress");
                                }
                            },
                            other => {
                                warn!(origin = %self.origin, key = other, "unknown key, ignoring");
                            }
                        }
                    }
                }
                other if kind_section(kind) == Some(other) => {
                    for (key, value) in &section.entries {
                        apply_kind_entry(&mut settings.config, &self.origin, key, value);
                    }
                }
                other => {
                    warn!(origin = %self.origin, section = other, "unknown section, ignoring");
                }
            }
        }

        Ok(settings)
    }
}

/// The per-kind section a kind reads its settings from.
fn kind_section(kind: Kind) -> Option<&'static str> {
    match kind {
        Kind::Bridge => Some("Bridge"),
        Kind::Bond => Some("Bond"),
        Kind::Vrf => Some("VRF"),
        Kind::Vlan => Some("VLAN"),
        Kind::Macvlan => Some("MACVLAN"),
        Kind::Macvtap => Some("MACVTAP"),
        Kind::Vxlan => Some("VXLAN"),
        Kind::Veth => Some("Peer"),
        Kind::Dummy => None,
        Kind::Tun => Some("Tun"),
        Kind::Tap => Some("Tap"),
        Kind::Ipip | Kind::Gre | Kind::Gretap | Kind::Sit | Kind::Vti => Some("Tunnel"),
    }
}

fn apply_kind_entry(config: &mut KindConfig, origin: &str, key: &str, value: &str) {
    match config {
        KindConfig::Bridge(bridge) => match key {
            "STP" => bridge.stp = parse_bool_or_warn(origin, key, value),
            "Priority" => bridge.priority = parse_or_warn(origin, key, value),
            "ForwardDelaySec" => bridge.forward_delay = parse_ticks(origin, key, value),
            "HelloTimeSec" => bridge.hello_time = parse_ticks(origin, key, value),
            "MaxAgeSec" => bridge.max_age = parse_ticks(origin, key, value),
            "AgeingTimeSec" => bridge.ageing_time = parse_ticks(origin, key, value),
            "VLANFiltering" => bridge.vlan_filtering = parse_bool_or_warn(origin, key, value),
            "DefaultPVID" => bridge.default_pvid = parse_or_warn(origin, key, value),
            _ => unknown_key(origin, key),
        },
        KindConfig::Bond(bond) => match key {
            "Mode" => bond.mode = parse_or_warn(origin, key, value),
            "MIIMonitorSec" => bond.miimon = parse_millis(origin, key, value),
            "UpDelaySec" => bond.updelay = parse_millis(origin, key, value),
            "DownDelaySec" => bond.downdelay = parse_millis(origin, key, value),
            _ => unknown_key(origin, key),
        },
        KindConfig::Vrf(vrf) => match key {
            "Table" => vrf.table = parse_or_warn(origin, key, value),
            _ => unknown_key(origin, key),
        },
        KindConfig::Vlan(vlan) => match key {
            "Id" => vlan.id = parse_or_warn(origin, key, value),
            _ => unknown_key(origin, key),
        },
        KindConfig::Macvlan(macvlan) | KindConfig::Macvtap(macvlan) => match key {
            "Mode" => macvlan.mode = parse_or_warn(origin, key, value),
            _ => unknown_key(origin, key),
        },
        KindConfig::Vxlan(vxlan) => match key {
            "Id" | "VNI" => vxlan.vni = parse_or_warn(origin, key, value),
            "Remote" => vxlan.remote = parse_or_warn(origin, key, value),
            "Local" => vxlan.local = parse_or_warn(origin, key, value),
            "TTL" => vxlan.ttl = parse_or_warn(origin, key, value),
            "TOS" => vxlan.tos = parse_or_warn(origin, key, value),
            "DestinationPort" => vxlan.port = parse_or_warn(origin, key, value),
            "MacLearning" => vxlan.learning = parse_bool_or_warn(origin, key, value),
            _ => unknown_key(origin, key),
        },
        KindConfig::Veth(veth) => match key {
            "Name" => veth.peer_name = Some(value.to_string()),
            "MACAddress" => match mac::parse(value) {
                Ok(parsed) => veth.peer_mac = Some(parsed),
                Err(err) => warn!(origin, %err, "ignoring peer MACAddress"),
            },
            _ => unknown_key(origin, key),
        },
        KindConfig::Dummy(_) => unknown_key(origin, key),
        KindConfig::Tun(tun) | KindConfig::Tap(tun) => match key {
            "MultiQueue" => {
                if let Some(parsed) = parse_bool_or_warn(origin, key, value) {
                    tun.multi_queue = parsed;
                }
            }
            "PacketInfo" => {
                if let Some(parsed) = parse_bool_or_warn(origin, key, value) {
                    tun.packet_info = parsed;
                }
            }
            "VNetHeader" => {
                if let Some(parsed) = parse_bool_or_warn(origin, key, value) {
                    tun.vnet_hdr = parsed;
                }
            }
            _ => unknown_key(origin, key),
        },
        KindConfig::Ipip(tunnel)
        | KindConfig::Gre(tunnel)
        | KindConfig::Gretap(tunnel)
        | KindConfig::Sit(tunnel)
        | KindConfig::Vti(tunnel) => match key {
            "Local" => tunnel.local = parse_or_warn(origin, key, value),
            "Remote" => tunnel.remote = parse_or_warn(origin, key, value),
            "TTL" => tunnel.ttl = parse_or_warn(origin, key, value),
            "TOS" => tunnel.tos = parse_or_warn(origin, key, value),
            "DiscoverPathMTU" => tunnel.pmtudisc = parse_bool_or_warn(origin, key, value),
            "Independent" => {
                if let Some(parsed) = parse_bool_or_warn(origin, key, value) {
                    tunnel.independent = parsed;
                }
            }
            _ => unknown_key(origin, key),
        },
    }
}

fn unknown_key(origin: &str, key: &str) {
    warn!(origin, key, "unknown key, ignoring");
}

fn parse_or_warn<T: std::str::FromStr>(origin: &str, key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(origin, key, value, "failed to parse value, ignoring");
            None
        }
    }
}

fn parse_bool_or_warn(origin: &str, key: &str, value: &str) -> Option<bool> {
    match value {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => {
            warn!(origin, key, value, "failed to parse boolean, ignoring");
            None
        }
    }
}

/// Seconds in the file, kernel clock ticks (1/100 s) on the wire.
fn parse_ticks(origin: &str, key: &str, value: &str) -> Option<u32> {
    parse_or_warn::<u32>(origin, key, value).map(|seconds| seconds.saturating_mul(100))
}

/// Seconds in the file, milliseconds on the wire.
fn parse_millis(origin: &str, key: &str, value: &str) -> Option<u32> {
    parse_or_warn::<u32>(origin, key, value).map(|seconds| seconds.saturating_mul(1000))
}

fn hostname() -> Option<String> {
    fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|name| name.trim().to_string())
}
