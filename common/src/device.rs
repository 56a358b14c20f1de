use crate::protocol::RegistrationResult;
use crate::types::DeviceState;

/// Who this device is, locally and to the backend. `mac_address` is the
/// immutable hardware identifier; `remote_id` appears once registration
/// succeeds and is only ever cleared by a device reset. `school_code` is the
/// provisioned assignment code, `school_id` the backend-granted assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub mac_address: String,
    pub remote_id: Option<String>,
    pub school_code: String,
    pub school_id: String,
}

impl DeviceIdentity {
    pub fn new(mac_address: impl Into<String>, school_code: impl Into<String>) -> Self {
        Self {
            mac_address: mac_address.into(),
            remote_id: None,
            school_code: school_code.into(),
            school_id: String::new(),
        }
    }
}

/// What one registration result did to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: DeviceState,
    pub to: DeviceState,
    pub code_cleared: bool,
}

impl Transition {
    /// The device just gained its assignment; callers force an immediate
    /// schedule sync on this edge.
    pub fn became_active(&self) -> bool {
        self.to == DeviceState::Active && self.from != DeviceState::Active
    }
}

/// Owns the provisioning state and remote identity. All state guards live in
/// the transition function here; other components query `state()` but never
/// infer provisioning status from side data. The transition function is pure
/// given a decoded result — network and parse failures are never applied, so
/// an outage of any length leaves the current state untouched.
#[derive(Debug)]
pub struct DeviceStateMachine {
    identity: DeviceIdentity,
    state: DeviceState,
}

impl DeviceStateMachine {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            state: DeviceState::Boot,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn is_active(&self) -> bool {
        self.state == DeviceState::Active
    }

    pub fn apply_registration(&mut self, result: &RegistrationResult) -> Transition {
        let from = self.state;
        self.identity.remote_id = Some(result.remote_id.clone());

        let mut code_cleared = false;
        if result.clears_assignment() {
            // Backend rejected the provisioned code outright; drop it so the
            // next registration doesn't resubmit a known-bad code.
            self.identity.school_code.clear();
            self.identity.school_id.clear();
            code_cleared = true;
            self.state = DeviceState::Unassigned;
        } else if result.assigned() {
            self.identity.school_id = result
                .school_id
                .clone()
                .unwrap_or_default();
            self.state = DeviceState::Active;
        } else if self.state != DeviceState::Active {
            // Registered but not yet claimed by a school. An Active device
            // keeps its assignment unless the backend clears it explicitly.
            self.state = DeviceState::Unassigned;
        }

        Transition {
            from,
            to: self.state,
            code_cleared,
        }
    }
}
