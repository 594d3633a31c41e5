use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::model::{WindowEntry, WindowHandle};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("window enumeration is not supported on this platform")]
    Unsupported,
    #[error("window enumeration failed: {message}")]
    Enumeration { message: String },
    #[error("window registry state is poisoned")]
    Poisoned,
}

impl RegistryError {
    pub fn enumeration(message: impl Into<String>) -> Self {
        Self::Enumeration {
            message: message.into(),
        }
    }
}

/// Called whenever the window set may have changed. Carries no payload;
/// listeners re-read the snapshot.
pub type WindowsChangedListener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`WindowRegistry::subscribe`], used to detach the
/// listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Source of the open-window list consumed by the search controller.
pub trait WindowRegistry: Send + Sync {
    fn registry_name(&self) -> &'static str;

    /// Owned copy of the current window list, in the registry's order.
    fn snapshot(&self) -> Result<Vec<WindowEntry>, RegistryError>;

    /// Re-enumerates the underlying window source.
    fn refresh(&self) -> Result<(), RegistryError>;

    fn subscribe(&self, listener: WindowsChangedListener) -> ListenerId;

    /// Detaches a listener. Returns false if `id` is not registered.
    fn unsubscribe(&self, id: ListenerId) -> bool;
}

#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: Mutex<Vec<(ListenerId, WindowsChangedListener)>>,
    next_id: AtomicU64,
}

impl ListenerSet {
    pub(crate) fn push(&self, listener: WindowsChangedListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push((id, listener));
        }
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let Ok(mut listeners) = self.listeners.lock() else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(known, _)| *known != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().map(|listeners| listeners.len()).unwrap_or(0)
    }

    pub(crate) fn notify(&self) {
        // Clone out so a listener may (un)subscribe without deadlocking.
        let listeners: Vec<WindowsChangedListener> = match self.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => return,
        };
        for listener in listeners {
            listener();
        }
    }
}

/// Registry backed by a plain list. Embedders that already track windows
/// push their list here; tests use it as a deterministic window source.
#[derive(Default)]
pub struct InMemoryRegistry {
    windows: Mutex<Vec<WindowEntry>>,
    refreshes: Mutex<u64>,
    listeners: ListenerSet,
}

impl InMemoryRegistry {
    pub fn new(windows: Vec<WindowEntry>) -> Self {
        Self {
            windows: Mutex::new(windows),
            ..Default::default()
        }
    }

    pub fn deterministic_fixture() -> Self {
        Self::new(vec![
            WindowEntry::new(WindowHandle(0x1001), "Visual Studio Code", "Code"),
            WindowEntry::new(WindowHandle(0x1002), "Windows Terminal", "WindowsTerminal"),
            WindowEntry::new(WindowHandle(0x1003), "Untitled - Notepad", "notepad"),
            WindowEntry::new(WindowHandle(0x1004), "", "explorer"),
            WindowEntry::new(WindowHandle(0x1005), "Inbox - Outlook", "OUTLOOK"),
        ])
    }

    pub fn set_windows(&self, windows: Vec<WindowEntry>) -> Result<(), RegistryError> {
        {
            let mut current = self.windows.lock().map_err(|_| RegistryError::Poisoned)?;
            *current = windows;
        }
        self.listeners.notify();
        Ok(())
    }

    /// Replaces the entry with the same handle in place, or appends it.
    pub fn upsert(&self, entry: WindowEntry) -> Result<(), RegistryError> {
        {
            let mut current = self.windows.lock().map_err(|_| RegistryError::Poisoned)?;
            match current.iter_mut().find(|known| known.handle == entry.handle) {
                Some(known) => *known = entry,
                None => current.push(entry),
            }
        }
        self.listeners.notify();
        Ok(())
    }

    pub fn remove(&self, handle: WindowHandle) -> Result<bool, RegistryError> {
        let removed = {
            let mut current = self.windows.lock().map_err(|_| RegistryError::Poisoned)?;
            let before = current.len();
            current.retain(|entry| entry.handle != handle);
            current.len() != before
        };
        if removed {
            self.listeners.notify();
        }
        Ok(removed)
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes.lock().map(|count| *count).unwrap_or(0)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl WindowRegistry for InMemoryRegistry {
    fn registry_name(&self) -> &'static str {
        "in-memory"
    }

    fn snapshot(&self) -> Result<Vec<WindowEntry>, RegistryError> {
        let current = self.windows.lock().map_err(|_| RegistryError::Poisoned)?;
        Ok(current.clone())
    }

    fn refresh(&self) -> Result<(), RegistryError> {
        let mut refreshes = self.refreshes.lock().map_err(|_| RegistryError::Poisoned)?;
        *refreshes += 1;
        Ok(())
    }

    fn subscribe(&self, listener: WindowsChangedListener) -> ListenerId {
        self.listeners.push(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}
