//! The serial-modem `Service` implementation: owns one serial file
//! descriptor, runs the optional chat-script pre-flight, and drives the
//! HDLC framer/deframer for its session.

use crate::error::ServiceError;
use crate::hdlc::{self, Deframer};
use crate::session::{Service, ServiceState};
use libc::{c_int, O_NOCTTY, O_NONBLOCK, O_RDWR};
use macaddr::MacAddr6;
use std::io::Error;
use std::mem::zeroed;
use std::num::NonZeroU16;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

/// Largest payload the deframer will assemble before abandoning a frame as
/// oversized. Generous relative to typical LCP/IPCP/IP MRU.
const MAX_FRAME: usize = 4096;

pub struct SerialService {
    name: String,
    device: PathBuf,
    chatscript: Option<PathBuf>,
    state: ServiceState,
    binding: Option<(MacAddr6, NonZeroU16)>,
    fd: Option<AsyncFd<OwnedFd>>,
    deframer: Deframer,
}

impl SerialService {
    pub fn new(name: String, device: PathBuf, chatscript: Option<PathBuf>) -> Self {
        Self {
            name,
            device,
            chatscript,
            state: ServiceState::Idle,
            binding: None,
            fd: None,
            deframer: Deframer::new(MAX_FRAME),
        }
    }

    fn raw_fd(&self) -> RawFd {
        self.fd.as_ref().expect("serial fd not open").as_raw_fd()
    }

    fn run_chat_script(&self, path: &std::path::Path) -> Result<(), ServiceError> {
        set_blocking(self.raw_fd(), true).map_err(ServiceError::Io)?;

        let stdin = dup_stdio(self.raw_fd()).map_err(ServiceError::Io)?;
        let stdout = dup_stdio(self.raw_fd()).map_err(ServiceError::Io)?;

        tracing::info!(service = %self.name, script = %path.display(), "running chat script");

        let status = Command::new("chat")
            .arg("-f")
            .arg(path)
            .stdin(stdin)
            .stdout(stdout)
            .status()
            .map_err(ServiceError::ChatSpawn)?;

        set_blocking(self.raw_fd(), false).map_err(ServiceError::Io)?;

        if !status.success() {
            return Err(ServiceError::ChatFailed(status));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Service for SerialService {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ServiceState {
        self.state
    }

    fn binding(&self) -> Option<(MacAddr6, NonZeroU16)> {
        self.binding
    }

    fn connect(&mut self, peer: MacAddr6, session_id: NonZeroU16) -> Result<(), ServiceError> {
        self.disconnect();
        self.state = ServiceState::Dialing;

        let raw = open_serial(&self.device).map_err(ServiceError::Io)?;
        let raw = unsafe { OwnedFd::from_raw_fd(raw) };

        if let Err(e) = configure_raw_mode(raw.as_raw_fd()) {
            self.state = ServiceState::Idle;
            return Err(ServiceError::Io(e));
        }

        self.fd = Some(
            AsyncFd::with_interest(raw, Interest::READABLE).map_err(|e| {
                self.state = ServiceState::Idle;
                ServiceError::Io(e)
            })?,
        );

        if let Some(script) = self.chatscript.clone() {
            if let Err(e) = self.run_chat_script(&script) {
                self.fd = None;
                self.state = ServiceState::Idle;
                return Err(e);
            }
        }

        self.deframer = Deframer::new(MAX_FRAME);
        self.binding = Some((peer, session_id));
        self.state = ServiceState::Connected;

        Ok(())
    }

    fn disconnect(&mut self) {
        self.fd = None;
        self.binding = None;
        self.state = ServiceState::Idle;
    }

    fn process_session_payload(&mut self, payload: &[u8]) {
        let fd = match &self.fd {
            Some(fd) => fd,
            None => return,
        };

        let mut out = vec![0u8; hdlc::worst_case_len(payload.len())];
        let n = match hdlc::frame_into(payload, &mut out) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(service = %self.name, error = %e, "failed to frame payload");
                return;
            }
        };

        let written = unsafe {
            libc::write(fd.as_raw_fd(), out.as_ptr().cast(), n)
        };

        if written < 0 {
            let err = Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                tracing::warn!(service = %self.name, "serial write would block, dropping frame");
            } else {
                tracing::warn!(service = %self.name, error = %err, "serial write failed, dropping frame");
            }
        } else if (written as usize) < n {
            tracing::warn!(
                service = %self.name,
                wrote = written,
                total = n,
                "short write to serial device, dropping remainder"
            );
        }
    }

    /// Waits for the modem to have data ready, reads it once non-blocking,
    /// and feeds whatever arrived into the deframer. Pends forever while no
    /// session is bound, so it never wins a `select!` race when idle.
    /// Resolves to `Ok(None)` on EOF (the modem line dropped).
    async fn read_modem(&mut self) -> Result<Option<Vec<Vec<u8>>>, Error> {
        if self.fd.is_none() {
            std::future::pending::<()>().await;
            unreachable!("serial fd never becomes Some without re-polling read_modem");
        }

        let fd = self.fd.as_ref().unwrap();
        let mut buf = [0u8; 1500];

        let n = loop {
            let mut guard = fd.readable().await?;

            match guard.try_io(|inner| {
                let n = unsafe { libc::read(inner.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };

                if n < 0 {
                    Err(Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(res) => break res?,
                Err(_would_block) => continue,
            }
        };

        if n == 0 {
            return Ok(None);
        }

        let mut frames = Vec::new();
        self.deframer
            .feed(&buf[..n], &mut |payload| frames.push(payload.to_vec()));

        Ok(Some(frames))
    }
}

fn open_serial(path: &std::path::Path) -> Result<c_int, Error> {
    let cpath = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| Error::from_raw_os_error(libc::EINVAL))?;

    let fd = unsafe { libc::open(cpath.as_ptr(), O_RDWR | O_NOCTTY | O_NONBLOCK) };

    if fd < 0 {
        Err(Error::last_os_error())
    } else {
        Ok(fd)
    }
}

fn configure_raw_mode(fd: RawFd) -> Result<(), Error> {
    let mut tio: libc::termios = unsafe { zeroed() };

    if unsafe { libc::tcgetattr(fd, &mut tio) } < 0 {
        return Err(Error::last_os_error());
    }

    unsafe { libc::cfmakeraw(&mut tio) };

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } < 0 {
        return Err(Error::last_os_error());
    }

    Ok(())
}

fn set_blocking(fd: RawFd, blocking: bool) -> Result<(), Error> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };

    if flags < 0 {
        return Err(Error::last_os_error());
    }

    let flags = if blocking {
        flags & !O_NONBLOCK
    } else {
        flags | O_NONBLOCK
    };

    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } < 0 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}

fn dup_stdio(fd: RawFd) -> Result<Stdio, Error> {
    let dup = unsafe { libc::dup(fd) };

    if dup < 0 {
        return Err(Error::last_os_error());
    }

    Ok(unsafe { Stdio::from_raw_fd(dup) })
}
