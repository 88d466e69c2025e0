// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::DevicePathNode;

/// Ordered sequence of device path nodes, hardware root first
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevicePath(Vec<DevicePathNode>);

impl DevicePath {
    pub fn new(nodes: Vec<DevicePathNode>) -> Self {
        Self(nodes)
    }

    pub fn nodes(&self) -> &[DevicePathNode] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DevicePathNode> {
        self.0.iter()
    }

    pub fn into_nodes(self) -> Vec<DevicePathNode> {
        self.0
    }
}

impl From<Vec<DevicePathNode>> for DevicePath {
    fn from(nodes: Vec<DevicePathNode>) -> Self {
        Self(nodes)
    }
}

impl FromIterator<DevicePathNode> for DevicePath {
    fn from_iter<I: IntoIterator<Item = DevicePathNode>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a DevicePath {
    type Item = &'a DevicePathNode;
    type IntoIter = std::slice::Iter<'a, DevicePathNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for DevicePath {
    type Item = DevicePathNode;
    type IntoIter = std::vec::IntoIter<DevicePathNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, node) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            node.fmt(f)?;
        }
        Ok(())
    }
}
