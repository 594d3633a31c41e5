use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::model::WindowEntry;
use crate::registry::{
    ListenerId, ListenerSet, RegistryError, WindowRegistry, WindowsChangedListener,
};

/// Registry over the live desktop. `refresh` re-enumerates top-level windows
/// and notifies listeners only when the enumerated list actually differs.
#[derive(Default)]
pub struct DesktopRegistry {
    windows: Mutex<Vec<WindowEntry>>,
    listeners: ListenerSet,
}

impl DesktopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshes every `interval` on a background thread. The thread exits
    /// once the registry is dropped or enumeration turns out unsupported.
    pub fn spawn_poller(self: &Arc<Self>, interval: Duration) -> std::io::Result<JoinHandle<()>> {
        let registry = Arc::downgrade(self);
        std::thread::Builder::new()
            .name("windowwalker-poller".to_string())
            .spawn(move || loop {
                std::thread::sleep(interval);
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                match registry.refresh() {
                    Ok(()) => {}
                    Err(RegistryError::Unsupported) => break,
                    Err(error) => tracing::warn!(%error, "periodic window refresh failed"),
                }
            })
    }

    fn replace_if_changed(&self, enumerated: Vec<WindowEntry>) -> Result<bool, RegistryError> {
        let mut current = self.windows.lock().map_err(|_| RegistryError::Poisoned)?;
        if *current == enumerated {
            return Ok(false);
        }
        tracing::debug!(
            previous = current.len(),
            current = enumerated.len(),
            "desktop window list changed"
        );
        *current = enumerated;
        Ok(true)
    }
}

impl WindowRegistry for DesktopRegistry {
    fn registry_name(&self) -> &'static str {
        "desktop"
    }

    fn snapshot(&self) -> Result<Vec<WindowEntry>, RegistryError> {
        if !platform::SUPPORTED {
            return Err(RegistryError::Unsupported);
        }
        let current = self.windows.lock().map_err(|_| RegistryError::Poisoned)?;
        Ok(current.clone())
    }

    fn refresh(&self) -> Result<(), RegistryError> {
        let enumerated = platform::enumerate_windows()?;
        if self.replace_if_changed(enumerated)? {
            self.listeners.notify();
        }
        Ok(())
    }

    fn subscribe(&self, listener: WindowsChangedListener) -> ListenerId {
        self.listeners.push(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

/// Short process name from an image path: `C:\Windows\notepad.exe` -> `notepad`.
pub fn short_process_name(image_path: &str) -> Option<String> {
    let file_name = image_path
        .rsplit(['\\', '/'])
        .next()
        .filter(|name| !name.is_empty())?;
    let stem = match file_name.rfind('.') {
        Some(0) | None => file_name,
        Some(dot) => &file_name[..dot],
    };
    Some(stem.to_string())
}

#[cfg(target_os = "windows")]
mod platform {
    use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, BOOL, HWND, LPARAM};
    use windows_sys::Win32::System::Threading::{
        OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
        PROCESS_QUERY_LIMITED_INFORMATION,
    };
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindow, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId,
        IsWindowVisible, GW_OWNER,
    };

    use super::short_process_name;
    use crate::model::{WindowEntry, WindowHandle};
    use crate::registry::RegistryError;

    pub(super) const SUPPORTED: bool = true;

    const MAX_IMAGE_PATH: usize = 1024;

    pub(super) fn enumerate_windows() -> Result<Vec<WindowEntry>, RegistryError> {
        let mut handles: Vec<HWND> = Vec::new();
        let ok = unsafe {
            EnumWindows(
                Some(collect_handle),
                &mut handles as *mut Vec<HWND> as LPARAM,
            )
        };
        if ok == 0 {
            let error = unsafe { GetLastError() };
            return Err(RegistryError::enumeration(format!(
                "EnumWindows failed with error {error}"
            )));
        }

        Ok(handles.into_iter().filter_map(describe_window).collect())
    }

    unsafe extern "system" fn collect_handle(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let handles = &mut *(lparam as *mut Vec<HWND>);
        handles.push(hwnd);
        1
    }

    fn describe_window(hwnd: HWND) -> Option<WindowEntry> {
        // Owned windows (dialogs, tool palettes) are reached through their owner.
        let switchable = unsafe { IsWindowVisible(hwnd) != 0 && GetWindow(hwnd, GW_OWNER).is_null() };
        if !switchable {
            return None;
        }

        let title = window_title(hwnd);
        let process_name = process_name(hwnd).unwrap_or_default();
        Some(WindowEntry::from_owned(
            WindowHandle(hwnd as isize),
            title,
            process_name,
        ))
    }

    fn window_title(hwnd: HWND) -> String {
        let length = unsafe { GetWindowTextLengthW(hwnd) };
        if length <= 0 {
            return String::new();
        }

        let mut buffer = vec![0_u16; length as usize + 1];
        let copied = unsafe { GetWindowTextW(hwnd, buffer.as_mut_ptr(), buffer.len() as i32) };
        let copied = (copied.max(0) as usize).min(buffer.len());
        String::from_utf16_lossy(&buffer[..copied])
    }

    fn process_name(hwnd: HWND) -> Option<String> {
        let mut pid = 0_u32;
        unsafe { GetWindowThreadProcessId(hwnd, &mut pid) };
        if pid == 0 {
            return None;
        }

        let process = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
        if process.is_null() {
            return None;
        }

        let mut buffer = vec![0_u16; MAX_IMAGE_PATH];
        let mut size = buffer.len() as u32;
        let ok = unsafe {
            QueryFullProcessImageNameW(process, PROCESS_NAME_WIN32, buffer.as_mut_ptr(), &mut size)
        };
        unsafe {
            CloseHandle(process);
        }
        if ok == 0 {
            return None;
        }

        let image_path = String::from_utf16_lossy(&buffer[..(size as usize).min(buffer.len())]);
        short_process_name(&image_path)
    }
}

#[cfg(not(target_os = "windows"))]
mod platform {
    use crate::model::WindowEntry;
    use crate::registry::RegistryError;

    pub(super) const SUPPORTED: bool = false;

    pub(super) fn enumerate_windows() -> Result<Vec<WindowEntry>, RegistryError> {
        Err(RegistryError::Unsupported)
    }
}
