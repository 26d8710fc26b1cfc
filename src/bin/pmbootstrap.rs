use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fs2::FileExt;

use pmbootstrap::apk::{self, BuildPolicy, ChrootApk, IndexResolver, InstallOptions, Installer};
use pmbootstrap::build::ExternalBuilder;
use pmbootstrap::index::RepositoryIndex;
use pmbootstrap::pmaports::Pmaports;
use pmbootstrap::process::Privilege;
use pmbootstrap::{Config, Session, Suffix};

const LOCK_FILENAME: &str = ".pmbootstrap.lock";

fn usage() -> &'static str {
    "Usage:\n  pmbootstrap [--config <file>] install [--no-network] [--no-build] [--chroot <suffix>] <pkg>...\n  pmbootstrap [--config <file>] installed [--chroot <suffix>]"
}

#[derive(Default)]
struct Flags {
    config: Option<PathBuf>,
    chroot: Option<String>,
    no_network: bool,
    no_build: bool,
    packages: Vec<String>,
}

fn parse_flags(args: &[String]) -> Result<Flags> {
    let mut flags = Flags::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter.next().context("--config needs a file")?;
                flags.config = Some(PathBuf::from(value));
            }
            "--chroot" => {
                let value = iter.next().context("--chroot needs a suffix")?;
                flags.chroot = Some(value.clone());
            }
            "--no-network" => flags.no_network = true,
            "--no-build" => flags.no_build = true,
            // Anything else is a package token and gets validated later
            _ => flags.packages.push(arg.clone()),
        }
    }
    Ok(flags)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .without_time()
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [config_flag, path, rest @ ..] if config_flag == "--config" => {
            dispatch(rest, Some(PathBuf::from(path)))
        }
        rest => dispatch(rest, None),
    }
}

fn dispatch(args: &[String], config_path: Option<PathBuf>) -> Result<()> {
    match args {
        [command, rest @ ..] if command == "install" => {
            let mut flags = parse_flags(rest)?;
            flags.config = flags.config.or(config_path);
            install(flags)
        }
        [command, rest @ ..] if command == "installed" => {
            let mut flags = parse_flags(rest)?;
            if !flags.packages.is_empty() {
                bail!(usage());
            }
            flags.config = flags.config.or(config_path);
            list_installed(flags)
        }
        _ => bail!(usage()),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    }
}

fn parse_suffix(value: Option<&str>) -> Result<Suffix> {
    match value {
        Some(raw) => raw.parse(),
        None => Ok(Suffix::Native),
    }
}

/// Hold an exclusive lock on the work directory until the returned file is
/// dropped.
fn lock_work_dir(work: &Path) -> Result<File> {
    fs::create_dir_all(work)
        .with_context(|| format!("creating work directory '{}'", work.display()))?;
    let path = work.join(LOCK_FILENAME);
    let file = File::create(&path)
        .with_context(|| format!("creating lock file '{}'", path.display()))?;
    if file.try_lock_exclusive().is_err() {
        bail!(
            "another pmbootstrap process is using '{}'; wait for it to finish",
            work.display()
        );
    }
    Ok(file)
}

fn install(flags: Flags) -> Result<()> {
    if flags.packages.is_empty() {
        bail!(usage());
    }

    let config = load_config(flags.config.as_deref())?;
    let suffix = parse_suffix(flags.chroot.as_deref())?;
    let chroot = config.chroot(suffix.clone())?;
    let _lock = lock_work_dir(&config.work)?;

    let privilege = Privilege::detect()?;
    let aports = Pmaports::new(&config.aports_dir());
    let index = RepositoryIndex::new(&config);
    let resolver = IndexResolver::new(&aports, &index);
    let mut builder = ExternalBuilder::new(config.build_command.clone(), &aports, &index);
    let apk = ChrootApk::new(privilege.clone());

    let mut options = InstallOptions::from_config(&config, &suffix);
    if flags.no_network {
        options.offline = true;
    }
    if flags.no_build {
        options.policy = BuildPolicy::Disabled;
    }

    let mut installer = Installer {
        config: &config,
        privilege: &privilege,
        resolver: &resolver,
        aports: &aports,
        index: &index,
        builder: &mut builder,
        apk: &apk,
    };
    let mut session = Session::new();
    installer
        .install(&mut session, &chroot, &flags.packages, &options)
        .with_context(|| format!("installing packages in chroot '{}'", chroot.suffix))?;

    println!("({}) done", chroot.suffix);
    Ok(())
}

fn list_installed(flags: Flags) -> Result<()> {
    let config = load_config(flags.config.as_deref())?;
    let suffix = parse_suffix(flags.chroot.as_deref())?;
    let chroot = config.chroot(suffix)?;

    if !chroot.path.is_dir() {
        bail!("chroot '{}' does not exist at {}", chroot.suffix, chroot.path.display());
    }

    for (pkgname, record) in apk::installed(&chroot)? {
        println!("{} {}", pkgname, record.version);
    }
    Ok(())
}
