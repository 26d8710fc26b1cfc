//! Executing a command plan against a chroot's apk.

use super::plan::{ApkCommand, CommandPlan};
use super::progress;
use crate::chroot::Chroot;
use crate::error::{ApkError, ApkResult};
use crate::process::{Cmd, CommandResult, Privilege};

/// Runs single apk invocations inside a chroot.
pub trait PackageManager {
    fn run(&self, chroot: &Chroot, command: &ApkCommand) -> ApkResult<()>;
}

/// Run every command in order, stopping at the first failure.
///
/// A failed plan is not resumed; installing again starts over from the
/// installed database on disk.
pub fn execute(plan: &CommandPlan, chroot: &Chroot, apk: &dyn PackageManager) -> ApkResult<()> {
    for (i, command) in plan.commands.iter().enumerate() {
        tracing::debug!(
            "({}) apk step {}/{}: {}",
            chroot.suffix,
            i + 1,
            plan.len(),
            command.args.join(" ")
        );
        apk.run(chroot, command)?;
    }
    Ok(())
}

/// Run `cmd`, turning a non-zero exit into `ExternalToolFailure`.
pub(crate) fn run_checked(cmd: Cmd) -> ApkResult<CommandResult> {
    let cmd = cmd.allow_fail();
    let result = cmd.run()?;
    if !result.success() {
        return Err(ApkError::ExternalToolFailure {
            command: cmd.display(),
            exit_code: result.code(),
            stderr: result.stderr.trim().to_string(),
        });
    }
    Ok(result)
}

/// The real thing: `apk` inside the chroot, as root.
pub struct ChrootApk {
    privilege: Privilege,
}

impl ChrootApk {
    pub fn new(privilege: Privilege) -> Self {
        Self { privilege }
    }
}

impl PackageManager for ChrootApk {
    fn run(&self, chroot: &Chroot, command: &ApkCommand) -> ApkResult<()> {
        if command.progress {
            return progress::run_with_progress(chroot, &self.privilege, &command.args);
        }

        run_checked(
            chroot
                .root_cmd(&self.privilege, ["apk", "--no-progress"])
                .args(&command.args),
        )?;
        Ok(())
    }
}
