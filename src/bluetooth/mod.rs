//! Host-side Bluetooth plumbing: the L2CAP sessions toward the paired
//! PS3 and the command task serving disconnect/wake requests coming from
//! the system state machine.
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use crate::config;
use crate::constants::{DISCONNECT_BUDGET_MS, WAKE_BUDGET_MS};
use crate::state::system::{LinkError, Ps3Link};

/// L2CAP PSMs carrying HID toward the console.
pub const PSM_HID_CONTROL: u16 = 0x11;
pub const PSM_HID_INTERRUPT: u16 = 0x13;

const BTPROTO_L2CAP: libc::c_int = 0;

/// HID SET_REPORT(Feature 0xF4) transaction that starts a sleeping
/// console, the same exchange the console itself uses over USB.
const WAKE_TRANSACTION: [u8; 6] = [0x53, 0xF4, 0x42, 0x0C, 0x00, 0x00];

#[derive(Debug)]
pub enum LinkCommand {
    Disconnect,
    Wake {
        resp: oneshot::Sender<Result<(), LinkError>>,
    },
}

/// Cloneable handle implementing the injected link interface by
/// forwarding requests onto the task's command channel.
#[derive(Clone)]
pub struct BtLinkClient {
    tx: mpsc::Sender<LinkCommand>,
}

impl Ps3Link for BtLinkClient {
    fn disconnect(&self) {
        if self.tx.try_send(LinkCommand::Disconnect).is_err() {
            log::warn!("Bluetooth link task is not accepting commands");
        }
    }

    fn wake(&self) -> Result<(), LinkError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .blocking_send(LinkCommand::Wake { resp: resp_tx })
            .map_err(|_| LinkError::Closed)?;
        resp_rx.blocking_recv().map_err(|_| LinkError::Closed)?
    }
}

/// The two L2CAP sessions of an established HID link.
#[derive(Debug)]
pub struct LinkSessions {
    pub control: OwnedFd,
    pub interrupt: OwnedFd,
}

/// Returns the client handle and the task to spawn. `sessions` carries
/// any already-established link toward the console.
pub fn channel(sessions: Option<LinkSessions>) -> (BtLinkClient, BtLinkTask) {
    let (tx, rx) = mpsc::channel(8);
    (BtLinkClient { tx }, BtLinkTask { rx, sessions })
}

pub struct BtLinkTask {
    rx: mpsc::Receiver<LinkCommand>,
    sessions: Option<LinkSessions>,
}

impl BtLinkTask {
    pub async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                LinkCommand::Disconnect => self.disconnect(),
                LinkCommand::Wake { resp } => {
                    let result = tokio::task::spawn_blocking(wake_paired_host)
                        .await
                        .unwrap_or_else(|e| Err(LinkError::Wake(e.to_string())));
                    let _ = resp.send(result);
                }
            }
        }
        log::debug!("Bluetooth link task stopped");
    }

    /// Dissolve the HID sessions gracefully; after the budget the
    /// descriptors are closed regardless of what the peer has flushed.
    fn disconnect(&mut self) {
        let Some(sessions) = self.sessions.take() else {
            log::debug!("No host-side sessions to dissolve");
            return;
        };
        let deadline = Instant::now() + Duration::from_millis(DISCONNECT_BUDGET_MS);
        // Interrupt first, control last, mirroring how the link came up.
        graceful_close("interrupt", sessions.interrupt, deadline);
        graceful_close("control", sessions.control, deadline);
        log::info!("Dissolved host-side Bluetooth sessions");
    }
}

fn graceful_close(name: &str, fd: OwnedFd, deadline: Instant) {
    unsafe { libc::shutdown(fd.as_raw_fd(), libc::SHUT_RDWR) };
    // Drain until the peer acknowledges the close or the budget runs out.
    let mut buf = [0u8; 64];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            log::debug!("Forcing {name} session closed");
            break;
        }
        match poll_fd(fd.as_raw_fd(), libc::POLLIN, remaining) {
            Ok(true) => {
                let n = unsafe {
                    libc::read(fd.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len())
                };
                if n <= 0 {
                    break;
                }
            }
            _ => break,
        }
    }
    drop(fd);
}

/// Open an L2CAP connection to the paired console and issue the wake
/// transaction, all within the wake budget.
fn wake_paired_host() -> Result<(), LinkError> {
    let Some(target) = config::paired_host() else {
        return Err(LinkError::NoTarget);
    };
    let deadline = Instant::now() + Duration::from_millis(WAKE_BUDGET_MS);
    log::info!(
        "Waking PS3 at {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        target[0],
        target[1],
        target[2],
        target[3],
        target[4],
        target[5]
    );

    let fd = l2cap_socket().map_err(|e| LinkError::Wake(e.to_string()))?;
    connect_with_deadline(&fd, &target, PSM_HID_CONTROL, deadline)
        .map_err(|e| LinkError::Wake(e.to_string()))?;

    let sent = unsafe {
        libc::send(
            fd.as_raw_fd(),
            WAKE_TRANSACTION.as_ptr() as *const libc::c_void,
            WAKE_TRANSACTION.len(),
            libc::MSG_NOSIGNAL,
        )
    };
    if sent != WAKE_TRANSACTION.len() as isize {
        return Err(LinkError::Wake(io::Error::last_os_error().to_string()));
    }

    // A controller receives a one-byte handshake result; losing it is
    // not a failed wake, the console is already starting up.
    let remaining = deadline.saturating_duration_since(Instant::now());
    if let Ok(true) = poll_fd(fd.as_raw_fd(), libc::POLLIN, remaining) {
        let mut ack = [0u8; 1];
        unsafe {
            libc::read(fd.as_raw_fd(), ack.as_mut_ptr() as *mut libc::c_void, 1);
        }
    }
    Ok(())
}

/// sockaddr_l2 from the kernel's Bluetooth headers.
#[repr(C)]
struct SockAddrL2 {
    l2_family: libc::sa_family_t,
    l2_psm: u16,
    l2_bdaddr: [u8; 6],
    l2_cid: u16,
    l2_bdaddr_type: u8,
}

fn l2cap_socket() -> io::Result<OwnedFd> {
    let fd = unsafe {
        libc::socket(
            libc::AF_BLUETOOTH,
            libc::SOCK_SEQPACKET | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            BTPROTO_L2CAP,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn connect_with_deadline(
    fd: &OwnedFd,
    mac: &[u8; 6],
    psm: u16,
    deadline: Instant,
) -> io::Result<()> {
    // bdaddr_t is stored least-significant octet first.
    let mut bdaddr = *mac;
    bdaddr.reverse();
    let addr = SockAddrL2 {
        l2_family: libc::AF_BLUETOOTH as libc::sa_family_t,
        l2_psm: psm.to_le(),
        l2_bdaddr: bdaddr,
        l2_cid: 0,
        l2_bdaddr_type: 0,
    };

    let rc = unsafe {
        libc::connect(
            fd.as_raw_fd(),
            &addr as *const SockAddrL2 as *const libc::sockaddr,
            mem::size_of::<SockAddrL2>() as libc::socklen_t,
        )
    };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() != Some(libc::EINPROGRESS) && err.raw_os_error() != Some(libc::EAGAIN) {
        return Err(err);
    }

    // Connection in progress: wait for writability, then check SO_ERROR.
    let remaining = deadline.saturating_duration_since(Instant::now());
    if !poll_fd(fd.as_raw_fd(), libc::POLLOUT, remaining)? {
        return Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"));
    }

    let mut so_error: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut so_error as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    if so_error != 0 {
        return Err(io::Error::from_raw_os_error(so_error));
    }
    Ok(())
}

/// Poll a single descriptor for the given events. Returns whether the
/// descriptor became ready before the timeout.
fn poll_fd(fd: RawFd, events: libc::c_short, timeout: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc > 0)
}

#[cfg(test)]
mod bluetooth_test;
