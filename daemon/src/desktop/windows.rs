use common::{MonitorDescriptor, SpanwallError};
use std::ffi::c_void;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use windows_sys::Win32::Foundation::{BOOL, ERROR_SUCCESS, LPARAM, RECT, TRUE};
use windows_sys::Win32::Graphics::Gdi::{
    EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFO, MONITORINFOEXW,
};
use windows_sys::Win32::System::Registry::{HKEY_CURRENT_USER, REG_SZ, RegSetKeyValueW};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    SPI_SETDESKWALLPAPER, SPIF_SENDCHANGE, SPIF_UPDATEINIFILE, SystemParametersInfoW,
};

use super::Desktop;

const DESKTOP_KEY: &str = r"Control Panel\Desktop";

pub struct WindowsDesktop;

/// NUL-terminated UTF-16 for the wide Win32 entry points
fn wide(s: impl AsRef<std::ffi::OsStr>) -> Vec<u16> {
    s.as_ref().encode_wide().chain(std::iter::once(0)).collect()
}

/// Write a `REG_SZ` value under `HKCU\Control Panel\Desktop`
fn set_desktop_value(name: &str, value: &str) -> Result<(), SpanwallError> {
    let key = wide(DESKTOP_KEY);
    let name_w = wide(name);
    let data = wide(value);
    let byte_len = u32::try_from(data.len() * std::mem::size_of::<u16>()).unwrap_or(u32::MAX);

    let status = unsafe {
        RegSetKeyValueW(
            HKEY_CURRENT_USER,
            key.as_ptr(),
            name_w.as_ptr(),
            REG_SZ,
            data.as_ptr() as *const c_void,
            byte_len,
        )
    };

    if status != ERROR_SUCCESS {
        return Err(SpanwallError::OsApply(format!(
            "HKCU\\{}\\{}: {}",
            DESKTOP_KEY,
            name,
            std::io::Error::from_raw_os_error(status as i32)
        )));
    }

    Ok(())
}

unsafe extern "system" fn collect_monitor(
    hmonitor: HMONITOR,
    _hdc: HDC,
    _rect: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    // SAFETY: lparam is the &mut Vec passed to EnumDisplayMonitors below,
    // which outlives the enumeration.
    let monitors = unsafe { &mut *(lparam as *mut Vec<MonitorDescriptor>) };

    let mut info: MONITORINFOEXW = unsafe { std::mem::zeroed() };
    info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;

    let ok = unsafe {
        GetMonitorInfoW(
            hmonitor,
            &mut info as *mut MONITORINFOEXW as *mut MONITORINFO,
        )
    };
    if ok == 0 {
        log::warn!("GetMonitorInfoW failed, skipping monitor");
        return TRUE;
    }

    let device = &info.szDevice;
    let len = device.iter().position(|&c| c == 0).unwrap_or(device.len());
    let name = String::from_utf16_lossy(&device[..len]);
    let r = info.monitorInfo.rcMonitor;

    match MonitorDescriptor::from_rect(name, r.left, r.top, r.right, r.bottom) {
        Some(monitor) => monitors.push(monitor),
        None => log::warn!("Ignoring monitor with empty rectangle"),
    }

    TRUE
}

impl Desktop for WindowsDesktop {
    fn enumerate_monitors(&self) -> Result<Vec<MonitorDescriptor>, SpanwallError> {
        let mut monitors: Vec<MonitorDescriptor> = Vec::new();

        let ok = unsafe {
            EnumDisplayMonitors(
                std::ptr::null_mut(),
                std::ptr::null(),
                Some(collect_monitor),
                &mut monitors as *mut Vec<MonitorDescriptor> as LPARAM,
            )
        };

        if ok == 0 {
            return Err(SpanwallError::MonitorEnumeration(
                std::io::Error::last_os_error().to_string(),
            ));
        }

        Ok(monitors)
    }

    fn set_tile_mode(&self) -> Result<(), SpanwallError> {
        set_desktop_value("WallpaperStyle", "0")?;
        set_desktop_value("TileWallpaper", "1")
    }

    fn set_wallpaper(&self, path: &Path) -> Result<(), SpanwallError> {
        let mut path_w = wide(path);

        let ok = unsafe {
            SystemParametersInfoW(
                SPI_SETDESKWALLPAPER,
                0,
                path_w.as_mut_ptr() as *mut c_void,
                SPIF_UPDATEINIFILE | SPIF_SENDCHANGE,
            )
        };

        if ok == 0 {
            return Err(SpanwallError::OsApply(format!(
                "SystemParametersInfoW({}): {}",
                path.display(),
                std::io::Error::last_os_error()
            )));
        }

        Ok(())
    }
}
