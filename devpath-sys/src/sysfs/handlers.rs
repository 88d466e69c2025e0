// SPDX-License-Identifier: GPL-3.0-only

//! Per-bus handlers for topology components

use std::fs;
use std::io;

use devpath_types::{
    AcpiNode, NvmeNamespaceNode, PCI_ROOT_HID, PCIE_ROOT_HID, PciNode,
    SATA_NO_PORT_MULTIPLIER, SataNode, parse_eisa_id,
};

use super::{TopologyNode, WalkState};

/// Result of offering the next components to a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Not this handler's bus; try the next one.
    Skip,
    /// Components were claimed.
    Handled,
}

#[derive(Debug)]
pub enum HandlerError {
    /// The components belong to this handler but cannot be expressed.
    Unsupported(String),
    Io { context: String, source: io::Error },
}

impl HandlerError {
    fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported(reason.into())
    }

    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Recognizes one bus naming convention in the topology chain
pub trait BusHandler: Send + Sync {
    /// Short class name used in error messages
    fn name(&self) -> &'static str;

    /// Claim components at the front of `state`, or return
    /// [`HandlerOutcome::Skip`] without touching it.
    fn handle(&self, state: &mut WalkState<'_>) -> Result<HandlerOutcome, HandlerError>;
}

/// Ordered list of handlers, most specific first
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn BusHandler>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: vec![
                Box::new(VirtualHandler),
                Box::new(AcpiHandler),
                Box::new(PciRootHandler),
                Box::new(PciHandler),
                Box::new(NvmeHandler),
                Box::new(AtaHandler),
                Box::new(BlockHandler),
                Box::new(GenericHandler),
            ],
        }
    }
}

impl HandlerRegistry {
    /// Add a handler ahead of the generic fallback, after all others.
    pub fn register(&mut self, handler: impl BusHandler + 'static) {
        let at = self
            .handlers
            .iter()
            .position(|h| h.name() == GenericHandler.name())
            .unwrap_or(self.handlers.len());
        self.handlers.insert(at, Box::new(handler));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &dyn BusHandler> {
        self.handlers.iter().map(|h| h.as_ref())
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn parse_hex<T: TryFrom<u32>>(s: &str) -> Option<T> {
    u32::from_str_radix(s, 16).ok().and_then(|v| T::try_from(v).ok())
}

/// Devices under `virtual` have no physical path (loop, device-mapper, ...).
pub struct VirtualHandler;

impl BusHandler for VirtualHandler {
    fn name(&self) -> &'static str {
        "virtual"
    }

    fn handle(&self, state: &mut WalkState<'_>) -> Result<HandlerOutcome, HandlerError> {
        if state.peek(0) != Some("virtual") {
            return Ok(HandlerOutcome::Skip);
        }
        Err(HandlerError::unsupported("virtual devices are not supported"))
    }
}

/// ACPI namespace: `LNX*` containers are skipped, EISA IDs become nodes.
pub struct AcpiHandler;

impl BusHandler for AcpiHandler {
    fn name(&self) -> &'static str {
        "acpi"
    }

    fn handle(&self, state: &mut WalkState<'_>) -> Result<HandlerOutcome, HandlerError> {
        let Some(component) = state.peek(0) else {
            return Ok(HandlerOutcome::Skip);
        };
        let Some((id, instance)) = component.split_once(':') else {
            return Ok(HandlerOutcome::Skip);
        };

        if id.starts_with("LNX") {
            state.advance(1);
            return Ok(HandlerOutcome::Handled);
        }

        let Some(hid) = parse_eisa_id(id) else {
            return Ok(HandlerOutcome::Skip);
        };
        let uid = match state.read_attr(0, "uid") {
            Ok(raw) => raw
                .parse::<u32>()
                .map_err(|_| HandlerError::unsupported(format!("invalid ACPI _UID {raw:?}")))?,
            Err(_) => parse_hex(instance).unwrap_or(0),
        };

        state.push(TopologyNode::Acpi(AcpiNode { hid, uid }));
        state.advance(1);
        Ok(HandlerOutcome::Handled)
    }
}

/// PCI root bus `pciDDDD:BB`, described by its ACPI firmware node.
pub struct PciRootHandler;

impl PciRootHandler {
    fn matches(component: &str) -> bool {
        component
            .strip_prefix("pci")
            .and_then(|rest| rest.split_once(':'))
            .is_some_and(|(domain, bus)| {
                domain.len() == 4
                    && bus.len() == 2
                    && domain.bytes().chain(bus.bytes()).all(|b| b.is_ascii_hexdigit())
            })
    }
}

impl BusHandler for PciRootHandler {
    fn name(&self) -> &'static str {
        "pci-root"
    }

    fn handle(&self, state: &mut WalkState<'_>) -> Result<HandlerOutcome, HandlerError> {
        if !state.peek(0).is_some_and(Self::matches) {
            return Ok(HandlerOutcome::Skip);
        }

        let firmware_node = state.dir(0).join("firmware_node");
        let target = fs::read_link(&firmware_node).map_err(|_| {
            HandlerError::unsupported("PCI root bus has no ACPI firmware node")
        })?;

        let hid_text = match fs::read_to_string(firmware_node.join("hid")) {
            Ok(raw) => raw.trim().to_string(),
            Err(_) => target
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.split(':').next())
                .unwrap_or_default()
                .to_string(),
        };
        let hid = parse_eisa_id(&hid_text).ok_or_else(|| {
            HandlerError::unsupported(format!("unrecognized root bridge HID {hid_text:?}"))
        })?;
        if hid != PCI_ROOT_HID && hid != PCIE_ROOT_HID {
            return Err(HandlerError::unsupported(format!(
                "root bridge {hid_text} is not a PCI host bridge"
            )));
        }

        let uid = match fs::read_to_string(firmware_node.join("uid")) {
            Ok(raw) => raw.trim().parse::<u32>().map_err(|_| {
                HandlerError::unsupported(format!("invalid root bridge _UID {:?}", raw.trim()))
            })?,
            Err(_) => 0,
        };

        // PCIe host bridges are reported with the PCI compatible ID firmware uses.
        state.push(TopologyNode::Acpi(AcpiNode {
            hid: PCI_ROOT_HID,
            uid,
        }));
        state.advance(1);
        Ok(HandlerOutcome::Handled)
    }
}

/// PCI function `DDDD:BB:DD.F`.
pub struct PciHandler;

impl PciHandler {
    fn parse(component: &str) -> Option<PciNode> {
        let mut parts = component.split(':');
        let domain = parts.next()?;
        let bus = parts.next()?;
        let slot = parts.next()?;
        if parts.next().is_some() || domain.len() != 4 || bus.len() != 2 {
            return None;
        }
        parse_hex::<u16>(domain)?;
        parse_hex::<u8>(bus)?;

        let (device, function) = slot.split_once('.')?;
        if device.len() != 2 || function.len() != 1 {
            return None;
        }
        let device = parse_hex::<u8>(device).filter(|d| *d < 32)?;
        let function = parse_hex::<u8>(function).filter(|f| *f < 8)?;
        Some(PciNode { device, function })
    }
}

impl BusHandler for PciHandler {
    fn name(&self) -> &'static str {
        "pci"
    }

    fn handle(&self, state: &mut WalkState<'_>) -> Result<HandlerOutcome, HandlerError> {
        let Some(node) = state.peek(0).and_then(Self::parse) else {
            return Ok(HandlerOutcome::Skip);
        };

        if state.nodes().is_empty() {
            return Err(HandlerError::unsupported("PCI device without a root bridge"));
        }

        state.push(TopologyNode::Pci(node));
        state.advance(1);
        Ok(HandlerOutcome::Handled)
    }
}

/// NVMe controller class directory followed by `nvmeN/nvmeNnM`.
pub struct NvmeHandler;

impl NvmeHandler {
    fn namespace_from_name(name: &str) -> Option<u32> {
        let (_, nsid) = name.strip_prefix("nvme")?.rsplit_once('n')?;
        nsid.parse().ok()
    }

    fn parse_eui64(raw: &str) -> Option<[u8; 8]> {
        let bytes: Vec<u8> = raw
            .split(|c: char| c.is_whitespace() || c == '-' || c == ':')
            .filter(|part| !part.is_empty())
            .map(|part| u8::from_str_radix(part, 16).ok())
            .collect::<Option<_>>()?;
        bytes.try_into().ok()
    }
}

impl BusHandler for NvmeHandler {
    fn name(&self) -> &'static str {
        "nvme"
    }

    fn handle(&self, state: &mut WalkState<'_>) -> Result<HandlerOutcome, HandlerError> {
        if state.peek(0) != Some("nvme") {
            return Ok(HandlerOutcome::Skip);
        }

        if !matches!(state.nodes().last(), Some(TopologyNode::Pci(_))) {
            return Err(HandlerError::unsupported(
                "NVMe controller is not attached to a PCI function",
            ));
        }

        let controller = state
            .peek(1)
            .filter(|name| name.starts_with("nvme"))
            .ok_or_else(|| HandlerError::unsupported("missing NVMe controller"))?;
        let namespace = state
            .peek(2)
            .filter(|name| name.starts_with(controller))
            .ok_or_else(|| HandlerError::unsupported("missing NVMe namespace"))?;

        let namespace_id = match state.read_attr(2, "nsid") {
            Ok(raw) => raw.parse::<u32>().map_err(|_| {
                HandlerError::unsupported(format!("invalid namespace ID {raw:?}"))
            })?,
            Err(_) => Self::namespace_from_name(namespace).ok_or_else(|| {
                HandlerError::unsupported(format!("cannot determine namespace ID of {namespace}"))
            })?,
        };

        let eui64 = state
            .read_attr(2, "eui")
            .ok()
            .and_then(|raw| Self::parse_eui64(&raw))
            .unwrap_or([0; 8]);

        state.push(TopologyNode::NvmeNamespace(NvmeNamespaceNode {
            namespace_id,
            eui64,
        }));
        state.advance(3);
        Ok(HandlerOutcome::Handled)
    }
}

/// libata chain `ataN/hostH/targetH:C:T/H:C:T:L`.
pub struct AtaHandler;

impl AtaHandler {
    fn scsi_address(component: &str, fields: usize) -> Option<Vec<u32>> {
        let values: Vec<u32> = component
            .split(':')
            .map(|part| part.parse().ok())
            .collect::<Option<_>>()?;
        (values.len() == fields).then_some(values)
    }

    fn has_port_multiplier(state: &WalkState<'_>, port: &str) -> io::Result<bool> {
        let prefix = format!("link{port}.");
        for entry in fs::read_dir(state.dir(0))? {
            if entry?.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl BusHandler for AtaHandler {
    fn name(&self) -> &'static str {
        "ata"
    }

    fn handle(&self, state: &mut WalkState<'_>) -> Result<HandlerOutcome, HandlerError> {
        let Some(port) = state
            .peek(0)
            .and_then(|c| c.strip_prefix("ata"))
            .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        else {
            return Ok(HandlerOutcome::Skip);
        };

        if !matches!(state.nodes().last(), Some(TopologyNode::Pci(_))) {
            return Err(HandlerError::unsupported(
                "ATA port is not attached to a PCI function",
            ));
        }

        let malformed = || HandlerError::unsupported("unexpected ATA topology");
        let host = state
            .peek(1)
            .and_then(|c| c.strip_prefix("host"))
            .and_then(|h| h.parse::<u32>().ok())
            .ok_or_else(malformed)?;
        let target = state
            .peek(2)
            .and_then(|c| c.strip_prefix("target"))
            .and_then(|t| Self::scsi_address(t, 3))
            .ok_or_else(malformed)?;
        let device = state
            .peek(3)
            .and_then(|c| Self::scsi_address(c, 4))
            .ok_or_else(malformed)?;
        if target[0] != host || device[0] != host || device[1..3] != target[1..3] {
            return Err(malformed());
        }

        let port_attr = format!("ata_port/ata{port}/port_no");
        let port_no = state
            .read_attr(0, &port_attr)
            .map_err(|e| HandlerError::io(format!("cannot read {port_attr}"), e))?;
        let hba_port = port_no
            .parse::<u16>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .ok_or_else(|| HandlerError::unsupported(format!("invalid ATA port number {port_no:?}")))?;

        let port_multiplier_port = if Self::has_port_multiplier(state, port)
            .map_err(|e| HandlerError::io(format!("cannot list ata{port}"), e))?
        {
            u16::try_from(target[1]).map_err(|_| malformed())?
        } else {
            SATA_NO_PORT_MULTIPLIER
        };
        let lun = u16::try_from(device[3]).map_err(|_| malformed())?;

        state.push(TopologyNode::Sata(SataNode {
            hba_port,
            port_multiplier_port,
            lun,
        }));
        state.advance(4);
        Ok(HandlerOutcome::Handled)
    }
}

/// Trailing `block/<disk>` of SCSI-attached disks.
pub struct BlockHandler;

impl BusHandler for BlockHandler {
    fn name(&self) -> &'static str {
        "block"
    }

    fn handle(&self, state: &mut WalkState<'_>) -> Result<HandlerOutcome, HandlerError> {
        if state.peek(0) != Some("block") || state.remaining().len() != 2 {
            return Ok(HandlerOutcome::Skip);
        }
        if state.nodes().is_empty() {
            return Err(HandlerError::unsupported("block device without a hardware path"));
        }
        state.advance(2);
        Ok(HandlerOutcome::Handled)
    }
}

/// Fallback that rejects whatever no other handler recognized.
pub struct GenericHandler;

impl BusHandler for GenericHandler {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn handle(&self, _state: &mut WalkState<'_>) -> Result<HandlerOutcome, HandlerError> {
        Err(HandlerError::unsupported("unhandled device"))
    }
}
