//! Deciding which packages get built locally before installing.

use crate::arch::Arch;
use crate::error::{ApkError, ApkResult};
use crate::index::BinaryIndex;

/// Whether packages may be compiled while installing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildPolicy {
    #[default]
    Enabled,
    /// Only binary packages may be used, e.g. during device installation
    /// with building turned off in the config.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildDecision {
    UseBinary,
    BuildLocal,
    Fail(String),
}

/// What the build subsystem did for one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built,
    Skipped,
}

/// Builds packages from aports when their binary is missing or outdated.
pub trait BuildSubsystem {
    fn build_if_necessary(&mut self, pkgname: &str, arch: Arch) -> ApkResult<BuildOutcome>;
}

/// Decide, and with `Enabled` perform, the build step for every package in
/// `to_add`, strictly in order.
///
/// With `Disabled` nothing is built and missing binaries are reported as
/// `Fail`; see [`ensure_buildable`].
pub fn decide(
    to_add: &[String],
    arch: Arch,
    policy: BuildPolicy,
    index: &dyn BinaryIndex,
    builder: &mut dyn BuildSubsystem,
) -> ApkResult<Vec<(String, BuildDecision)>> {
    let mut decisions = Vec::with_capacity(to_add.len());

    for pkgname in to_add {
        let decision = match policy {
            BuildPolicy::Disabled => {
                if index.lookup(pkgname, arch)?.is_some() {
                    BuildDecision::UseBinary
                } else {
                    BuildDecision::Fail(format!(
                        "no binary package found for {}, and compiling packages has been disabled",
                        arch
                    ))
                }
            }
            BuildPolicy::Enabled => match builder.build_if_necessary(pkgname, arch)? {
                BuildOutcome::Built => BuildDecision::BuildLocal,
                BuildOutcome::Skipped => BuildDecision::UseBinary,
            },
        };
        tracing::debug!("{}: {:?}", pkgname, decision);
        decisions.push((pkgname.clone(), decision));
    }

    Ok(decisions)
}

/// Turn every `Fail` into a single error naming all affected packages.
pub fn ensure_buildable(decisions: &[(String, BuildDecision)], arch: Arch) -> ApkResult<()> {
    let failed: Vec<String> = decisions
        .iter()
        .filter(|(_, d)| matches!(d, BuildDecision::Fail(_)))
        .map(|(name, _)| name.clone())
        .collect();

    if failed.is_empty() {
        return Ok(());
    }
    Err(ApkError::NoBinaryAvailable {
        packages: failed,
        arch: arch.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apk::fakes::{FakeBuilder, FakeIndex};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_disabled_without_binary_fails() {
        let index = FakeIndex::default();
        let mut builder = FakeBuilder::default();

        let decisions = decide(
            &names(&["hello-world"]),
            Arch::X86_64,
            BuildPolicy::Disabled,
            &index,
            &mut builder,
        )
        .unwrap();
        assert!(matches!(decisions[0].1, BuildDecision::Fail(ref r) if r.contains("x86_64")));

        let err = ensure_buildable(&decisions, Arch::X86_64).unwrap_err();
        assert!(matches!(
            err,
            ApkError::NoBinaryAvailable { ref packages, ref arch }
                if packages == &["hello-world"] && arch == "x86_64"
        ));
        assert!(err.to_string().contains("no binary package found"));
        assert!(builder.calls.is_empty());
    }

    #[test]
    fn test_disabled_with_binary_uses_it_without_building() {
        let index = FakeIndex::default().with("P:hello-world\nV:1-r8\n\n");
        let mut builder = FakeBuilder::default();

        let decisions = decide(
            &names(&["hello-world"]),
            Arch::X86_64,
            BuildPolicy::Disabled,
            &index,
            &mut builder,
        )
        .unwrap();
        assert_eq!(
            decisions,
            vec![("hello-world".to_string(), BuildDecision::UseBinary)]
        );
        assert!(ensure_buildable(&decisions, Arch::X86_64).is_ok());
        assert!(builder.calls.is_empty());
    }

    #[test]
    fn test_enabled_delegates_in_order() {
        let index = FakeIndex::default();
        let mut builder = FakeBuilder::default().building(&["b"]);

        let decisions = decide(
            &names(&["a", "b", "c"]),
            Arch::Aarch64,
            BuildPolicy::Enabled,
            &index,
            &mut builder,
        )
        .unwrap();
        assert_eq!(builder.calls, vec!["a", "b", "c"]);
        assert_eq!(
            decisions.iter().map(|(_, d)| d.clone()).collect::<Vec<_>>(),
            vec![
                BuildDecision::UseBinary,
                BuildDecision::BuildLocal,
                BuildDecision::UseBinary
            ]
        );
    }

    #[test]
    fn test_enabled_build_failure_stops() {
        let index = FakeIndex::default();
        let mut builder = FakeBuilder::default().failing(&["b"]);

        let err = decide(
            &names(&["a", "b", "c"]),
            Arch::Aarch64,
            BuildPolicy::Enabled,
            &index,
            &mut builder,
        )
        .unwrap_err();
        assert!(matches!(err, ApkError::ExternalToolFailure { .. }));
        assert_eq!(builder.calls, vec!["a", "b"]);
    }
}
