//! Interface name → index and MAC address resolution, going straight to
//! libc rather than pulling in a netlink crate.

use libc::{c_int, ifreq, AF_INET, SOCK_DGRAM};
use macaddr::MacAddr6;
use std::ffi::CString;
use std::io::Error;
use std::mem::zeroed;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

/// Resolves `name` to its kernel interface index (for `sll_ifindex`).
pub fn index_of(name: &str) -> Result<c_int, Error> {
    let cname = CString::new(name).map_err(|_| Error::from_raw_os_error(libc::EINVAL))?;
    let index = unsafe { libc::if_nametoindex(cname.as_ptr()) };

    if index == 0 {
        return Err(Error::last_os_error());
    }

    Ok(index as c_int)
}

/// Reads the interface's MAC address via `SIOCGIFHWADDR` on a scratch
/// `AF_INET`/`SOCK_DGRAM` socket, the same ioctl rp-pppoe-style servers use.
pub fn hardware_address(name: &str) -> Result<MacAddr6, Error> {
    if name.len() >= libc::IFNAMSIZ {
        return Err(Error::from_raw_os_error(libc::ENAMETOOLONG));
    }

    let fd = unsafe { libc::socket(AF_INET, SOCK_DGRAM, 0) };

    if fd < 0 {
        return Err(Error::last_os_error());
    }

    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    let mut req: ifreq = unsafe { zeroed() };

    for (dst, src) in req.ifr_name.iter_mut().zip(name.as_bytes()) {
        *dst = *src as libc::c_char;
    }

    if unsafe { libc::ioctl(fd.as_raw_fd(), libc::SIOCGIFHWADDR, &mut req) } < 0 {
        return Err(Error::last_os_error());
    }

    let sa_data = unsafe { req.ifr_ifru.ifr_hwaddr.sa_data };

    let mut octets = [0u8; 6];
    for (dst, src) in octets.iter_mut().zip(sa_data.iter()) {
        *dst = *src as u8;
    }

    Ok(MacAddr6::from(octets))
}
