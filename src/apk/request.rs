//! Package request tokens.
//!
//! A token is a package name, or `!name` to request removal. Tokens starting
//! with `-` are rejected so nothing can be smuggled into apk as an option
//! (e.g. `--allow-untrusted`).

use crate::error::{ApkError, ApkResult};

/// Reject tokens apk would read as options.
pub fn validate_tokens<S: AsRef<str>>(tokens: &[S]) -> ApkResult<()> {
    for token in tokens {
        let token = token.as_ref();
        let name = token.trim_start_matches('!');
        if name.is_empty() || name.starts_with('-') {
            return Err(ApkError::InvalidPackageToken {
                token: token.to_string(),
            });
        }
    }
    Ok(())
}

/// Sort tokens into `(to_add, to_del)` by their `!` prefix, keeping order.
///
/// `["hello-world", "!some-conflict-pkg"]` becomes
/// `(["hello-world"], ["some-conflict-pkg"])`.
pub fn split_to_add_del<S: AsRef<str>>(packages: &[S]) -> (Vec<String>, Vec<String>) {
    let mut to_add = Vec::new();
    let mut to_del = Vec::new();

    for package in packages {
        let package = package.as_ref();
        if package.starts_with('!') {
            to_del.push(package.trim_start_matches('!').to_string());
        } else {
            to_add.push(package.to_string());
        }
    }

    (to_add, to_del)
}

/// Requested names without removal tokens.
pub fn requested_additions<S: AsRef<str>>(packages: &[S]) -> Vec<String> {
    split_to_add_del(packages).0
}
