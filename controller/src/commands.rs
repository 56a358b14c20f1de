//! Maps queued remote commands onto local actions and decides when the
//! acknowledgement happens relative to execution.

use autobell_common::{Command, CommandKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    Ring,
    TestRing,
    SyncTime,
    Reconfigure,
    Restart,
    UpdateFirmware(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    /// Disruptive actions acknowledge before executing: once the device
    /// restarts there is no later chance to mark the command done.
    pub ack_first: bool,
    pub action: CommandAction,
}

/// Returns `None` for commands that cannot be executed. Those are left
/// pending on the backend rather than acknowledged as done.
pub fn plan(command: &Command) -> Option<CommandPlan> {
    let (ack_first, action) = match command.kind {
        CommandKind::Ring => (false, CommandAction::Ring),
        CommandKind::TestBuzzer => (false, CommandAction::TestRing),
        CommandKind::SyncTime => (false, CommandAction::SyncTime),
        CommandKind::Reconfigure => (false, CommandAction::Reconfigure),
        CommandKind::Reboot => (true, CommandAction::Restart),
        CommandKind::UpdateFirmware => {
            let url = command.firmware_url.clone()?;
            (true, CommandAction::UpdateFirmware(url))
        }
        CommandKind::Unrecognized => return None,
    };
    Some(CommandPlan { ack_first, action })
}
