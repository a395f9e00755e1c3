//! File-owner lookup.
//!
//! Windows asks the security API for the owning SID and resolves it to
//! `DOMAIN\name`; everywhere else ownership is not reported. Failures are
//! silent — the owner column is optional.

use std::path::Path;

#[cfg(windows)]
pub fn file_owner(path: &Path) -> Option<String> {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{LocalFree, HLOCAL, PSID};
    use windows::Win32::Security::Authorization::{GetNamedSecurityInfoW, SE_FILE_OBJECT};
    use windows::Win32::Security::{LookupAccountSidW, OWNER_SECURITY_INFORMATION, SID_NAME_USE};

    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    let mut owner_sid = PSID::default();
    let mut descriptor = windows::Win32::Security::PSECURITY_DESCRIPTOR::default();
    let status = unsafe {
        GetNamedSecurityInfoW(
            PCWSTR(wide.as_ptr()),
            SE_FILE_OBJECT,
            OWNER_SECURITY_INFORMATION,
            Some(&mut owner_sid),
            None,
            None,
            None,
            &mut descriptor,
        )
    };
    if status.is_err() {
        return None;
    }

    let mut name = [0u16; 256];
    let mut domain = [0u16; 256];
    let mut name_len = name.len() as u32;
    let mut domain_len = domain.len() as u32;
    let mut sid_use = SID_NAME_USE::default();
    let looked_up = unsafe {
        LookupAccountSidW(
            PCWSTR::null(),
            owner_sid,
            Some(windows::core::PWSTR(name.as_mut_ptr())),
            &mut name_len,
            Some(windows::core::PWSTR(domain.as_mut_ptr())),
            &mut domain_len,
            &mut sid_use,
        )
    };
    unsafe {
        let _ = LocalFree(Some(HLOCAL(descriptor.0)));
    }
    if looked_up.is_err() {
        return None;
    }
    let name = String::from_utf16_lossy(&name[..name_len as usize]);
    let domain = String::from_utf16_lossy(&domain[..domain_len as usize]);
    if domain.is_empty() {
        Some(name)
    } else {
        Some(format!("{domain}\\{name}"))
    }
}

#[cfg(windows)]
use std::os::windows::ffi::OsStrExt;

#[cfg(not(windows))]
pub fn file_owner(_path: &Path) -> Option<String> {
    None
}
