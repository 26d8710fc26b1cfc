//! Per-session chroot checks done before the first apk call.

use std::cmp::Ordering;
use std::fs;

use super::driver::run_checked;
use crate::chroot::Chroot;
use crate::error::{ApkError, ApkResult};
use crate::parse::version;
use crate::process::Privilege;
use crate::session::Session;

/// Make `/etc/apk/repositories` in the chroot list exactly `urls`.
///
/// Done once per chroot and session. After rewriting, the file is read back
/// and must match, otherwise `RepositoryListUpdateFailure` is returned.
pub fn ensure_repository_list_current(
    session: &mut Session,
    chroot: &Chroot,
    privilege: &Privilege,
    urls: &[String],
) -> ApkResult<()> {
    update(session, chroot, privilege, urls, false)
}

fn update(
    session: &mut Session,
    chroot: &Chroot,
    privilege: &Privilege,
    urls: &[String],
    check: bool,
) -> ApkResult<()> {
    if session.repository_list_updated(&chroot.suffix) {
        return Ok(());
    }

    let path = chroot.repositories_file();
    let lines_old: Vec<String> = if path.exists() {
        fs::read_to_string(&path)
            .map_err(|e| ApkError::io(format!("reading {}", path.display()), e))?
            .lines()
            .map(str::to_string)
            .collect()
    } else {
        if let Some(parent) = path.parent() {
            run_checked(privilege.cmd("mkdir").arg("-p").arg_path(parent))?;
        }
        Vec::new()
    };

    if lines_old == urls {
        session.mark_repository_list_updated(&chroot.suffix);
        return Ok(());
    }

    if check {
        return Err(ApkError::RepositoryListUpdateFailure { path });
    }

    tracing::debug!("({}) update /etc/apk/repositories", chroot.suffix);
    run_checked(
        privilege
            .cmd("sh")
            .args(["-c", r#"printf '%s\n' "$@" > "$0""#])
            .arg_path(&path)
            .args(urls),
    )?;

    update(session, chroot, privilege, urls, true)
}

/// Refuse to work with an apk-tools older than `min_version`.
///
/// Checked once per chroot and session. Chroots without apk yet are
/// skipped and checked again next time.
pub fn check_min_version(session: &mut Session, chroot: &Chroot, min_version: &str) -> ApkResult<()> {
    if session.apk_version_checked(&chroot.suffix) {
        return Ok(());
    }

    if !chroot.has_apk() {
        tracing::debug!(
            "NOTE: Skipped apk version check for chroot '{}', because it is not installed yet!",
            chroot.suffix
        );
        return Ok(());
    }

    let installed = super::installed(chroot)?;
    let Some(apk_tools) = installed.get("apk-tools") else {
        return Err(anyhow::anyhow!(
            "apk-tools is missing from the installed database of chroot '{}'",
            chroot.suffix
        )
        .into());
    };

    if version::compare(&apk_tools.version, min_version)? == Ordering::Less {
        return Err(ApkError::OutdatedApkTools {
            suffix: chroot.suffix.to_string(),
            installed: apk_tools.version.clone(),
            required: min_version.to_string(),
        });
    }

    session.mark_apk_version_checked(&chroot.suffix);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Arch;
    use crate::chroot::Suffix;
    use tempfile::TempDir;

    fn urls() -> Vec<String> {
        vec![
            "/mnt/pmbootstrap-packages".to_string(),
            "http://dl-cdn.alpinelinux.org/alpine/edge/main".to_string(),
        ]
    }

    #[test]
    fn test_writes_missing_list_and_caches() {
        let temp = TempDir::new().unwrap();
        let chroot = Chroot::with_arch(temp.path(), Suffix::Native, Arch::X86_64);
        let mut session = Session::new();

        ensure_repository_list_current(&mut session, &chroot, &Privilege::Direct, &urls()).unwrap();
        assert_eq!(
            fs::read_to_string(chroot.repositories_file()).unwrap(),
            "/mnt/pmbootstrap-packages\nhttp://dl-cdn.alpinelinux.org/alpine/edge/main\n"
        );
        assert!(session.repository_list_updated(&Suffix::Native));

        // Cached: a changed URL list is not written again in this session
        let other = vec!["http://example.org/repo".to_string()];
        ensure_repository_list_current(&mut session, &chroot, &Privilege::Direct, &other).unwrap();
        assert!(fs::read_to_string(chroot.repositories_file())
            .unwrap()
            .starts_with("/mnt/pmbootstrap-packages"));
    }

    #[test]
    fn test_replaces_outdated_list() {
        let temp = TempDir::new().unwrap();
        let chroot = Chroot::with_arch(temp.path(), Suffix::Native, Arch::X86_64);
        fs::create_dir_all(chroot.repositories_file().parent().unwrap()).unwrap();
        fs::write(chroot.repositories_file(), "http://old.mirror/alpine/v3.18/main\n").unwrap();

        let mut session = Session::new();
        ensure_repository_list_current(&mut session, &chroot, &Privilege::Direct, &urls()).unwrap();
        let lines: Vec<String> = fs::read_to_string(chroot.repositories_file())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(lines, urls());
    }

    #[test]
    fn test_unverifiable_write_fails() {
        let temp = TempDir::new().unwrap();
        let chroot = Chroot::with_arch(temp.path(), Suffix::Native, Arch::X86_64);
        let mut session = Session::new();

        // The embedded newline reads back as two lines and never matches
        let urls = vec!["http://a\nhttp://b".to_string()];
        let err = ensure_repository_list_current(&mut session, &chroot, &Privilege::Direct, &urls)
            .unwrap_err();
        assert!(matches!(err, ApkError::RepositoryListUpdateFailure { .. }));
        assert!(!session.repository_list_updated(&Suffix::Native));
    }

    #[test]
    fn test_failing_helper_is_external_tool_failure() {
        let temp = TempDir::new().unwrap();
        let chroot = Chroot::with_arch(temp.path(), Suffix::Native, Arch::X86_64);
        let mut session = Session::new();

        let err = ensure_repository_list_current(
            &mut session,
            &chroot,
            &Privilege::Sudo("false".into()),
            &urls(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ApkError::ExternalToolFailure { exit_code: 1, ref command, .. } if command.starts_with("false mkdir -p")
        ));
        assert!(!session.repository_list_updated(&Suffix::Native));

        // Existing directory: the write itself fails
        fs::create_dir_all(chroot.repositories_file().parent().unwrap()).unwrap();
        fs::write(chroot.repositories_file(), "http://old.mirror/alpine/v3.18/main\n").unwrap();
        let err = ensure_repository_list_current(
            &mut session,
            &chroot,
            &Privilege::Sudo("false".into()),
            &urls(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ApkError::ExternalToolFailure { ref command, .. } if command.starts_with("false sh -c")
        ));
    }

    fn chroot_with_apk(temp: &TempDir, apk_version: &str) -> Chroot {
        let chroot = Chroot::with_arch(temp.path(), Suffix::Native, Arch::X86_64);
        fs::create_dir_all(chroot.installed_db().parent().unwrap()).unwrap();
        fs::create_dir_all(chroot.host_path("sbin")).unwrap();
        fs::write(chroot.host_path("sbin/apk"), b"").unwrap();
        fs::write(
            chroot.installed_db(),
            format!("P:apk-tools\nV:{}\n\nP:musl\nV:1.2.4-r2\n\n", apk_version),
        )
        .unwrap();
        chroot
    }

    #[test]
    fn test_min_version_outdated() {
        let temp = TempDir::new().unwrap();
        let chroot = chroot_with_apk(&temp, "2.12.9-r3");
        let mut session = Session::new();

        let err = check_min_version(&mut session, &chroot, "2.14.0-r5").unwrap_err();
        assert!(matches!(
            err,
            ApkError::OutdatedApkTools { ref installed, .. } if installed == "2.12.9-r3"
        ));
        assert!(!session.apk_version_checked(&Suffix::Native));
    }

    #[test]
    fn test_min_version_current_is_cached() {
        let temp = TempDir::new().unwrap();
        let chroot = chroot_with_apk(&temp, "2.14.4-r0");
        let mut session = Session::new();

        check_min_version(&mut session, &chroot, "2.14.0-r5").unwrap();
        assert!(session.apk_version_checked(&Suffix::Native));
    }

    #[test]
    fn test_min_version_skipped_without_apk() {
        let temp = TempDir::new().unwrap();
        let chroot = Chroot::with_arch(temp.path(), Suffix::Native, Arch::X86_64);
        let mut session = Session::new();

        check_min_version(&mut session, &chroot, "2.14.0-r5").unwrap();
        assert!(!session.apk_version_checked(&Suffix::Native));
    }
}
