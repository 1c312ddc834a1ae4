//! Production [`Bus`] adapter, backed by XenStore via `xenstore-rs`.

use xenstore_rs::{XBTransaction, Xs, XsOpenFlags};

use crate::bus::{Bus, BusError, Event};

/// A [`Bus`] talking to the hypervisor's XenStore daemon.
pub struct XenStoreBus {
    xs: Xs,
}

impl XenStoreBus {
    /// Opens a XenStore connection and registers a watch on `root`.
    pub fn connect(root: &str) -> Result<Self, BusError> {
        let xs = Xs::new(XsOpenFlags::ReadOnly).map_err(|e| BusError::Connect(e.to_string()))?;
        xs.watch(root, root).map_err(|e| BusError::Connect(e.to_string()))?;
        Ok(XenStoreBus { xs })
    }
}

impl Bus for XenStoreBus {
    fn read(&self, path: &str) -> Result<Option<String>, BusError> {
        match self.xs.read(XBTransaction::Null, path) {
            Ok(value) => Ok(Some(value)),
            Err(_) => Ok(None),
        }
    }

    fn write(&self, path: &str, value: &str) -> Result<(), BusError> {
        self.xs
            .write(XBTransaction::Null, path, value)
            .map_err(|source| BusError::Operation {
                path: path.to_string(),
                source: source.to_string(),
            })
    }

    fn next_event(&self, root: &str) -> Result<Event, BusError> {
        let (path, _token) = self.xs.read_watch().map_err(|source| BusError::Operation {
            path: root.to_string(),
            source: source.to_string(),
        })?;
        let value = self.read(&path)?;
        Ok(Event { path, value })
    }
}
