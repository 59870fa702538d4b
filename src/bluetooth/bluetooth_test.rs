use std::io::Read;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;

use super::{channel, LinkSessions};
use crate::state::system::Ps3Link;

fn fake_sessions() -> (LinkSessions, UnixStream, UnixStream) {
    let (control_ours, control_peer) = UnixStream::pair().unwrap();
    let (interrupt_ours, interrupt_peer) = UnixStream::pair().unwrap();
    let sessions = LinkSessions {
        control: OwnedFd::from(control_ours),
        interrupt: OwnedFd::from(interrupt_ours),
    };
    (sessions, control_peer, interrupt_peer)
}

#[tokio::test(flavor = "multi_thread")]
async fn disconnect_dissolves_both_sessions() {
    let (sessions, mut control_peer, mut interrupt_peer) = fake_sessions();
    let (client, task) = channel(Some(sessions));
    let handle = tokio::spawn(task.run());

    client.disconnect();

    // The peers observe EOF once the sessions are dissolved.
    let mut buf = [0u8; 8];
    control_peer.set_read_timeout(Some(std::time::Duration::from_secs(2))).unwrap();
    interrupt_peer.set_read_timeout(Some(std::time::Duration::from_secs(2))).unwrap();
    assert_eq!(control_peer.read(&mut buf).unwrap(), 0);
    assert_eq!(interrupt_peer.read(&mut buf).unwrap(), 0);

    // A second disconnect with nothing held is a quiet no-op.
    client.disconnect();

    drop(client);
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn wake_without_target_reports_failure() {
    // No env override and no pairing file in the test environment.
    std::env::remove_var(crate::constants::PS3_MAC_ENV);
    let (client, task) = channel(None);
    let handle = tokio::spawn(task.run());

    let client_for_wake = client.clone();
    let result = tokio::task::spawn_blocking(move || client_for_wake.wake())
        .await
        .unwrap();
    assert!(result.is_err());

    drop(client);
    handle.await.unwrap();
}
