//! Turning a resolved install into apk invocations.
//!
//! apk marks every package named in `add` as explicitly installed. Passing
//! the whole closure would mark every dependency too, so they would never be
//! cleaned up as orphans later. When the closure is larger than the request
//! the plan goes through a virtual package instead:
//!
//! 1. `add -u --virtual .pmbootstrap <closure>` installs everything as a
//!    dependency of the throwaway group
//! 2. `add <requested>` marks the requested names explicitly
//! 3. `del .pmbootstrap` drops the group, leaving the rest as dependencies

use super::request::requested_additions;
use super::rewrite::ResolvedPackageRef;

/// Name of the throwaway virtual package.
pub const VIRTUAL_GROUP: &str = ".pmbootstrap";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApkCommand {
    /// Arguments after `apk`.
    pub args: Vec<String>,
    /// Render a progress bar while this command runs.
    pub progress: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandPlan {
    pub commands: Vec<ApkCommand>,
}

impl CommandPlan {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }
}

fn command(verb: &[&str], packages: impl IntoIterator<Item = String>) -> Vec<String> {
    verb.iter()
        .map(|s| s.to_string())
        .chain(packages)
        .collect()
}

pub fn plan(
    requested: &[String],
    resolved_to_add: &[ResolvedPackageRef],
    to_del: &[String],
    offline: bool,
) -> CommandPlan {
    let requested_add = requested_additions(requested);
    let to_add: Vec<String> = resolved_to_add.iter().map(|r| r.to_string()).collect();

    let mut commands = Vec::new();
    if !to_add.is_empty() && to_add != requested_add {
        commands.push(command(&["add", "-u", "--virtual", VIRTUAL_GROUP], to_add));
        commands.push(command(&["add"], requested_add));
        commands.push(command(&["del"], [VIRTUAL_GROUP.to_string()]));
    } else if !requested_add.is_empty() {
        commands.push(command(&["add"], requested_add));
    }
    if !to_del.is_empty() {
        commands.push(command(&["del"], to_del.iter().cloned()));
    }

    let commands = commands
        .into_iter()
        .enumerate()
        .map(|(i, mut args)| {
            if offline {
                args.insert(0, "--no-network".to_string());
            }
            // Only the first command does real work, the virtual group
            // bookkeeping finishes instantly.
            ApkCommand {
                args,
                progress: i == 0,
            }
        })
        .collect();

    CommandPlan { commands }
}
