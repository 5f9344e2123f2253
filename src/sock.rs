//! A non-blocking `AF_PACKET`/`SOCK_DGRAM` socket registered with Tokio.
//! Both the discovery and session sockets in [`crate::ac`] are one of these,
//! bound to their respective ethertype.

use libc::{
    fcntl, recvfrom, sendto, sockaddr, sockaddr_ll, socket, socklen_t, AF_PACKET, F_GETFL, F_SETFL,
    O_NONBLOCK, SOCK_DGRAM,
};
use pretty_hex::{hex_write, HexConfig};
use std::fmt::Write;
use std::io::Error;
use std::mem::{size_of_val, zeroed};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

/// Encapsulates an `AF_PACKET` socket, cooked (`SOCK_DGRAM`) so the kernel
/// handles the 14-byte Ethernet header on both directions.
pub struct PacketSocket(AsyncFd<OwnedFd>);

impl PacketSocket {
    pub fn new() -> Result<Self, Error> {
        let s = unsafe { socket(AF_PACKET, SOCK_DGRAM, 0) };

        if s < 0 {
            return Err(Error::last_os_error());
        }

        let s = unsafe { OwnedFd::from_raw_fd(s) };
        let f = unsafe { fcntl(s.as_raw_fd(), F_GETFL) };

        if f < 0 || unsafe { fcntl(s.as_raw_fd(), F_SETFL, f | O_NONBLOCK) } < 0 {
            return Err(Error::last_os_error());
        }

        Ok(Self(AsyncFd::with_interest(s, Interest::READABLE)?))
    }

    pub fn bind(&self, addr: &sockaddr_ll) -> Result<(), Error> {
        let fd = self.0.as_raw_fd();
        let len = size_of_val(addr).try_into().unwrap();
        let addr = addr as *const sockaddr_ll as *const sockaddr;

        if unsafe { libc::bind(fd, addr, len) < 0 } {
            Err(Error::last_os_error())
        } else {
            Ok(())
        }
    }

    pub async fn recv(&self, buf: &mut [u8]) -> Result<(usize, sockaddr_ll), Error> {
        let mut addr: sockaddr_ll = unsafe { zeroed() };
        let received = loop {
            if let Ok(v) = self.0.readable().await?.try_io(|s| {
                let mut alen: socklen_t = size_of_val(&addr).try_into().unwrap();
                let received = unsafe {
                    recvfrom(
                        s.as_raw_fd(),
                        buf.as_mut_ptr().cast(),
                        buf.len(),
                        0,
                        &mut addr as *mut sockaddr_ll as _,
                        &mut alen,
                    )
                };

                if received < 0 {
                    return Err(Error::last_os_error());
                }

                assert_eq!(alen, size_of_val(&addr).try_into().unwrap());

                Ok(received as usize)
            }) {
                break v?;
            }
        };

        if tracing::enabled!(tracing::Level::TRACE) {
            tracing::trace!("{}", dump("R", &addr, &buf[..received]));
        }

        Ok((received, addr))
    }

    pub fn send(&self, addr: sockaddr_ll, buf: impl AsRef<[u8]>) -> Result<(), Error> {
        let buf = buf.as_ref();
        let sent = unsafe {
            sendto(
                self.0.as_raw_fd(),
                buf.as_ptr().cast(),
                buf.len(),
                0,
                &addr as *const sockaddr_ll as _,
                size_of_val(&addr).try_into().unwrap(),
            )
        };

        if sent < 0 {
            return Err(Error::last_os_error());
        }

        assert_eq!(sent as usize, buf.len());

        if tracing::enabled!(tracing::Level::TRACE) {
            tracing::trace!("{}", dump("S", &addr, buf));
        }

        Ok(())
    }
}

fn dump(direction: &str, addr: &sockaddr_ll, data: &[u8]) -> String {
    let mut log = format!("{direction}: ");

    for i in 0..addr.sll_halen {
        let i: usize = i.into();

        if i != 0 {
            write!(log, ":").unwrap();
        }

        write!(log, "{:x}", addr.sll_addr[i]).unwrap();
    }

    writeln!(log, " (Type = {}, Length = {})", addr.sll_pkttype, data.len()).unwrap();

    let mut conf = HexConfig::default();
    conf.title = false;
    hex_write(&mut log, data, conf).unwrap();

    log
}
