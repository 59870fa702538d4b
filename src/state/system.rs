//! Bridge lifecycle state machine and the PS button filter that drives it.
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::bus::StateBus;
use super::{Buttons, ControllerState, SystemState};
use crate::constants::{
    ACTIVE_LIGHTBAR, PS_HOLD_STANDBY_MS, STANDBY_DEBOUNCE_MS, STANDBY_LIGHTBAR,
};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no wake target is configured")]
    NoTarget,
    #[error("link endpoint is gone")]
    Closed,
    #[error("wake attempt failed: {0}")]
    Wake(String),
}

/// One-way command interface into the protocol emulator's Bluetooth side.
/// Injected so the state machine is testable without a Bluetooth stack.
pub trait Ps3Link: Send + Sync {
    /// Request a graceful teardown of the host-side link sessions.
    fn disconnect(&self);
    /// Attempt to wake the paired host. Blocks for at most the wake budget.
    fn wake(&self) -> Result<(), LinkError>;
}

#[derive(Debug)]
struct Inner {
    state: SystemState,
    last_transition: Option<Instant>,
}

/// ACTIVE/STANDBY/WAKING machine with a debounce window on transitions.
///
/// Lock discipline: the state lock is leaf-level and is never held across
/// the link calls or bus writes that a transition performs.
pub struct SystemStateMachine {
    inner: Mutex<Inner>,
    link: Box<dyn Ps3Link>,
    bus: Arc<StateBus>,
}

impl SystemStateMachine {
    pub fn new(bus: Arc<StateBus>, link: Box<dyn Ps3Link>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SystemState::Active,
                last_transition: None,
            }),
            link,
            bus,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn debounced(inner: &Inner) -> bool {
        inner
            .last_transition
            .is_some_and(|t| t.elapsed() < Duration::from_millis(STANDBY_DEBOUNCE_MS))
    }

    pub fn get_state(&self) -> SystemState {
        self.lock().state
    }

    pub fn is_standby(&self) -> bool {
        self.get_state() == SystemState::Standby
    }

    /// Enter standby from the active state. Rejected calls (wrong state or
    /// inside the debounce window) return silently.
    pub fn enter_standby(&self) {
        {
            let mut inner = self.lock();
            if inner.state != SystemState::Active || Self::debounced(&inner) {
                return;
            }
            inner.state = SystemState::Standby;
            inner.last_transition = Some(Instant::now());
            log::info!("Entering standby");
        }

        self.link.disconnect();
        self.bus.modify_output(|out| {
            out.rumble_left = 0;
            out.rumble_right = 0;
            (out.led_r, out.led_g, out.led_b) = STANDBY_LIGHTBAR;
        });
    }

    /// Leave standby. The machine passes through WAKING for the duration of
    /// the wake attempt and lands in ACTIVE whether or not it succeeded.
    pub fn exit_standby(&self) {
        {
            let mut inner = self.lock();
            if inner.state != SystemState::Standby || Self::debounced(&inner) {
                return;
            }
            inner.state = SystemState::Waking;
            inner.last_transition = Some(Instant::now());
            log::info!("Waking from standby");
        }

        self.bus.modify_output(|out| {
            (out.led_r, out.led_g, out.led_b) = ACTIVE_LIGHTBAR;
        });

        if let Err(e) = self.link.wake() {
            log::warn!("Wake attempt failed: {e}");
        }

        let mut inner = self.lock();
        inner.state = SystemState::Active;
        inner.last_transition = Some(Instant::now());
    }

    /// Rewind the debounce window, so tests don't have to sleep through it.
    #[cfg(test)]
    pub(crate) fn expire_debounce(&self) {
        let mut inner = self.lock();
        inner.last_transition = inner
            .last_transition
            .map(|t| t - Duration::from_millis(STANDBY_DEBOUNCE_MS));
    }

    /// Park the machine in an arbitrary state without side effects.
    #[cfg(test)]
    pub(crate) fn force_state(&self, state: SystemState) {
        self.lock().state = state;
    }
}

/// Stateful filter over the input bus that turns PS button activity into
/// standby/wake requests. Lives outside the state machine and uses only
/// its public API.
#[derive(Debug, Default)]
pub struct PsButtonMonitor {
    pressed_at: Option<Instant>,
    hold_fired: bool,
}

impl PsButtonMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, state: &ControllerState, machine: &SystemStateMachine) {
        self.observe_at(state, machine, Instant::now());
    }

    pub(crate) fn observe_at(
        &mut self,
        state: &ControllerState,
        machine: &SystemStateMachine,
        now: Instant,
    ) {
        let pressed = state.buttons.contains(Buttons::PS);
        let was_pressed = self.pressed_at.is_some();

        if pressed && !was_pressed {
            self.pressed_at = Some(now);
            // Any press while in standby wakes; the hold timer only
            // matters while active.
            if machine.get_state() == SystemState::Standby {
                machine.exit_standby();
            }
        }

        if pressed {
            if let Some(since) = self.pressed_at {
                let held = now.duration_since(since);
                if !self.hold_fired
                    && held >= Duration::from_millis(PS_HOLD_STANDBY_MS)
                    && machine.get_state() == SystemState::Active
                {
                    self.hold_fired = true;
                    machine.enter_standby();
                }
            }
        } else {
            self.pressed_at = None;
            self.hold_fired = false;
        }
    }
}
