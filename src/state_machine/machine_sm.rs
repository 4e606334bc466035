//! VM lifecycle state machine.
//!
//! Hierarchy:
//! ```text
//! Absent ←→ Exists (superstate)
//!              ├── Created { endpoint }                  raw address, no TLS
//!              ├── TlsPending { endpoint, certs_fresh }  running
//!              ├── TlsReady { endpoint }                 running, tcp://<ip>:2376 usable
//!              └── Stopped { endpoint }
//! ```
//!
//! The host endpoint lives in the state itself so it can never disagree
//! with the phase the VM is in.

use statig::prelude::*;
use tracing::info;

use crate::machine::MachineStatus;
use crate::machine::env::HostEndpoint;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events dispatched to the lifecycle state machine.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A status query reported the VM's actual state.
    Observed(MachineStatus),
    /// `docker-machine create` ran.
    Created,
    /// `docker-machine start` ran.
    Started,
    /// `docker-machine stop` ran.
    Halted,
    /// `docker-machine regenerate-certs` ran.
    CertsRegenerated,
    /// The engine endpoint was looked up again.
    Resolved(HostEndpoint),
    /// `docker-machine rm` ran.
    Deleted,
}

// ---------------------------------------------------------------------------
// Shared storage
// ---------------------------------------------------------------------------

pub struct MachineLifecycle {
    pub machine_name: String,
}

impl MachineLifecycle {
    pub fn new(machine_name: impl Into<String>) -> Self {
        Self {
            machine_name: machine_name.into(),
        }
    }

    /// The engine endpoint recorded in `state`.
    pub fn endpoint(state: &State) -> HostEndpoint {
        match state {
            State::Absent {} => HostEndpoint::Unresolved,
            State::Created { endpoint }
            | State::TlsPending { endpoint, .. }
            | State::TlsReady { endpoint }
            | State::Stopped { endpoint } => endpoint.clone(),
        }
    }

    pub fn is_tls_ready(state: &State) -> bool {
        matches!(state, State::TlsReady { .. })
    }
}

fn running(endpoint: &HostEndpoint, certs_fresh: bool) -> State {
    if certs_fresh && endpoint.is_tls() {
        State::tls_ready(endpoint.clone())
    } else {
        State::tls_pending(endpoint.clone(), certs_fresh)
    }
}

// ---------------------------------------------------------------------------
// State machine implementation
// ---------------------------------------------------------------------------

#[state_machine(
    initial = "State::absent()",
    state(derive(Debug, Clone, PartialEq))
)]
impl MachineLifecycle {
    /// No VM with this name is known to docker-machine.
    #[state]
    fn absent(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Created => Transition(State::created(HostEndpoint::Unresolved)),
            LifecycleEvent::Observed(MachineStatus::Running) => {
                Transition(State::tls_pending(HostEndpoint::Unresolved, false))
            }
            LifecycleEvent::Observed(MachineStatus::Stopped) | LifecycleEvent::Halted => {
                Transition(State::stopped(HostEndpoint::Unresolved))
            }
            // Both only succeed against a running VM.
            LifecycleEvent::Started => Transition(State::tls_pending(HostEndpoint::Unresolved, false)),
            LifecycleEvent::CertsRegenerated => {
                Transition(State::tls_pending(HostEndpoint::Unresolved, true))
            }
            _ => Handled,
        }
    }

    #[superstate]
    fn exists(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Deleted | LifecycleEvent::Observed(MachineStatus::Absent) => {
                Transition(State::absent())
            }
            _ => Handled,
        }
    }

    /// Created but not yet started by us. The endpoint is at most the raw
    /// address.
    #[state(superstate = "exists")]
    fn created(&mut self, event: &LifecycleEvent, endpoint: &HostEndpoint) -> Outcome<State> {
        match event {
            LifecycleEvent::Resolved(next) => Transition(State::created(next.clone())),
            LifecycleEvent::Started | LifecycleEvent::Observed(MachineStatus::Running) => {
                Transition(State::tls_pending(endpoint.clone(), false))
            }
            LifecycleEvent::Halted | LifecycleEvent::Observed(MachineStatus::Stopped) => {
                Transition(State::stopped(endpoint.clone()))
            }
            _ => Super,
        }
    }

    /// Running, waiting for both a TLS endpoint and fresh certificates.
    #[state(superstate = "exists")]
    fn tls_pending(
        &mut self,
        event: &LifecycleEvent,
        endpoint: &HostEndpoint,
        certs_fresh: &bool,
    ) -> Outcome<State> {
        match event {
            LifecycleEvent::Resolved(next) => Transition(running(next, *certs_fresh)),
            LifecycleEvent::CertsRegenerated => Transition(running(endpoint, true)),
            LifecycleEvent::Halted | LifecycleEvent::Observed(MachineStatus::Stopped) => {
                Transition(State::stopped(endpoint.clone()))
            }
            _ => Super,
        }
    }

    /// Running with a usable TLS endpoint.
    #[state(superstate = "exists", entry_action = "enter_tls_ready")]
    fn tls_ready(&mut self, event: &LifecycleEvent, endpoint: &HostEndpoint) -> Outcome<State> {
        match event {
            LifecycleEvent::Resolved(next) if next != endpoint => Transition(running(next, true)),
            LifecycleEvent::Halted | LifecycleEvent::Observed(MachineStatus::Stopped) => {
                Transition(State::stopped(endpoint.clone()))
            }
            _ => Super,
        }
    }

    #[state(superstate = "exists")]
    fn stopped(&mut self, event: &LifecycleEvent, endpoint: &HostEndpoint) -> Outcome<State> {
        match event {
            LifecycleEvent::Resolved(next) => Transition(State::stopped(next.clone())),
            LifecycleEvent::Started | LifecycleEvent::Observed(MachineStatus::Running) => {
                Transition(State::tls_pending(endpoint.clone(), false))
            }
            _ => Super,
        }
    }

    #[action]
    fn enter_tls_ready(&mut self) {
        info!(machine = %self.machine_name, "engine endpoint ready");
    }
}
