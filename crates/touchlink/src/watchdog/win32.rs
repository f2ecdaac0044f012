//! Win32 window automation and registry lookup
#![allow(unsafe_code)]

use std::ffi::c_void;
use std::path::PathBuf;

use windows::core::{HSTRING, PCWSTR};
use windows::Win32::Foundation::{BOOL, ERROR_SUCCESS, HWND, LPARAM, WPARAM};
use windows::Win32::System::Registry::{RegGetValueW, HKEY_LOCAL_MACHINE, RRF_RT_REG_SZ};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    keybd_event, KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, VIRTUAL_KEY, VK_DOWN, VK_UP,
};
use windows::Win32::UI::WindowsAndMessaging::{
    FindWindowExW, FindWindowW, SendMessageW, ShowWindow, SwitchToThisWindow, SW_MINIMIZE,
    WM_CLOSE, WM_KEYDOWN, WM_KEYUP,
};

use super::controller::{Key, WindowAutomation, WindowHandle};
use super::locator::{ToolLocator, DIAGNOSTICS_SUBDIR, RUNTIME_REGISTRY_KEY, RUNTIME_REGISTRY_VALUE};

fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as *mut c_void)
}

fn handle(window: HWND) -> Option<WindowHandle> {
    (!window.is_invalid()).then(|| WindowHandle(window.0 as isize))
}

fn virtual_key(key: Key) -> VIRTUAL_KEY {
    match key {
        Key::Up => VK_UP,
        Key::Down => VK_DOWN,
    }
}

/// [`WindowAutomation`] through user32
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Automation;

impl WindowAutomation for Win32Automation {
    fn find_window(&self, title: &str) -> Option<WindowHandle> {
        let title = HSTRING::from(title);
        // SAFETY: `title` outlives the call and is NUL terminated
        let window = unsafe { FindWindowW(PCWSTR::null(), PCWSTR(title.as_ptr())) }.ok()?;
        handle(window)
    }

    fn find_child(&self, parent: WindowHandle, class: &str) -> Option<WindowHandle> {
        let class = HSTRING::from(class);
        // SAFETY: as above; a stale parent handle makes the call fail, not fault
        let window = unsafe {
            FindWindowExW(
                hwnd(parent),
                HWND::default(),
                PCWSTR(class.as_ptr()),
                PCWSTR::null(),
            )
        }
        .ok()?;
        handle(window)
    }

    fn close(&self, window: WindowHandle) {
        // SAFETY: message carries no pointers
        let _ = unsafe { SendMessageW(hwnd(window), WM_CLOSE, WPARAM(0), LPARAM(0)) };
    }

    fn focus(&self, window: WindowHandle) {
        // SAFETY: plain handle argument
        unsafe { SwitchToThisWindow(hwnd(window), BOOL::from(true)) };
    }

    fn minimize(&self, window: WindowHandle) {
        // SAFETY: plain handle argument
        let _ = unsafe { ShowWindow(hwnd(window), SW_MINIMIZE) };
    }

    fn press_key(&self, key: Key) {
        let vk = virtual_key(key).0 as u8;
        // SAFETY: synthesizes input only, no memory is passed
        unsafe {
            keybd_event(vk, 0xE0, KEYEVENTF_EXTENDEDKEY, 0);
            keybd_event(vk, 0xE0, KEYEVENTF_EXTENDEDKEY | KEYEVENTF_KEYUP, 0);
        }
    }

    fn send_key(&self, window: WindowHandle, key: Key) {
        let vk = WPARAM(usize::from(virtual_key(key).0));
        // SAFETY: key messages carry no pointers
        unsafe {
            let _ = SendMessageW(hwnd(window), WM_KEYDOWN, vk, LPARAM(0));
            let _ = SendMessageW(hwnd(window), WM_KEYUP, vk, LPARAM(0));
        }
    }
}

/// Runtime install base from `HKLM`, plus the diagnostics subdirectory
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryLocator;

impl RegistryLocator {
    fn read_base() -> Option<String> {
        let key = HSTRING::from(RUNTIME_REGISTRY_KEY);
        let value = HSTRING::from(RUNTIME_REGISTRY_VALUE);
        let mut size: u32 = 0;

        // SAFETY: size query; no data buffer is passed
        let status = unsafe {
            RegGetValueW(
                HKEY_LOCAL_MACHINE,
                PCWSTR(key.as_ptr()),
                PCWSTR(value.as_ptr()),
                RRF_RT_REG_SZ,
                None,
                None,
                Some(std::ptr::addr_of_mut!(size)),
            )
        };
        if status != ERROR_SUCCESS || size == 0 {
            return None;
        }

        let mut buffer = vec![0u16; size as usize / 2 + 1];
        // SAFETY: `buffer` holds at least `size` bytes and outlives the call
        let status = unsafe {
            RegGetValueW(
                HKEY_LOCAL_MACHINE,
                PCWSTR(key.as_ptr()),
                PCWSTR(value.as_ptr()),
                RRF_RT_REG_SZ,
                None,
                Some(buffer.as_mut_ptr().cast()),
                Some(std::ptr::addr_of_mut!(size)),
            )
        };
        if status != ERROR_SUCCESS {
            return None;
        }

        let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
        Some(String::from_utf16_lossy(&buffer[..len]))
    }
}

impl ToolLocator for RegistryLocator {
    fn locate(&self) -> Option<PathBuf> {
        let base = Self::read_base()?;
        Some(PathBuf::from(base + DIAGNOSTICS_SUBDIR))
    }

    fn name(&self) -> &str {
        "registry"
    }
}
