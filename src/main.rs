mod apt;
mod archive;
mod assemble;
mod common;
mod config;
mod ledger;
mod manifest;
mod metadata;
mod pipeline;
mod remote;
mod resolve;
mod ui;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::{Config, OrphanPolicy};
use crate::manifest::ManifestFilter;
use crate::pipeline::ArtifactNames;
use crate::ui::prelude::*;

/// Build a local APT repository from packages resolved on a remote machine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode (also journals every remote command)
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format for diagnostics
    #[arg(long, value_enum, global = true, default_value = "text")]
    output: OutputFormat,

    /// Disable coloured output
    #[arg(long, global = true)]
    no_color: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug, Default)]
struct TreeFilterArgs {
    /// Only descend into module directories matching this glob
    #[arg(long)]
    module: Option<String>,
    /// Only descend into OS directories matching this glob
    #[arg(long = "os")]
    os_name: Option<String>,
    /// Only descend into release directories matching this glob
    #[arg(long = "release")]
    release_name: Option<String>,
}

#[derive(Args, Debug, Default)]
struct RemoteArgs {
    /// Build machine host name
    #[arg(long)]
    host: Option<String>,
    /// Login user on the build machine
    #[arg(long)]
    username: Option<String>,
    /// SSH port
    #[arg(long)]
    port: Option<u16>,
    /// Password (requires sshpass; key authentication is preferred)
    #[arg(long)]
    password: Option<String>,
    /// SSH identity file
    #[arg(long)]
    identity: Option<PathBuf>,
    /// Largest simulation stderr line count still treated as clean
    #[arg(long)]
    stderr_threshold: Option<usize>,
    /// Delete downloaded artifacts that were rejected
    #[arg(long)]
    remove_orphans: bool,
}

impl RemoteArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.remote.host = Some(host.clone());
        }
        if let Some(user) = &self.username {
            config.remote.user = Some(user.clone());
        }
        if let Some(port) = self.port {
            config.remote.port = port;
        }
        if let Some(password) = &self.password {
            config.remote.password = Some(password.clone());
        }
        if let Some(identity) = &self.identity {
            config.remote.identity_file = Some(identity.clone());
        }
        if let Some(threshold) = self.stderr_threshold {
            config.resolve.stderr_threshold = threshold;
        }
        if self.remove_orphans {
            config.resolve.orphans = OrphanPolicy::Remove;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the merged package names of a metadata tree
    Scan {
        /// Root of the manifest tree
        root: PathBuf,
        #[command(flatten)]
        filter: TreeFilterArgs,
    },

    /// Resolve packages on the build machine and write the ledger
    Resolve {
        /// Root of a manifest tree to read names from
        #[arg(long)]
        root: Option<PathBuf>,
        /// Package to resolve (repeatable, merged with the tree)
        #[arg(short, long = "package")]
        packages: Vec<String>,
        #[command(flatten)]
        filter: TreeFilterArgs,
        #[command(flatten)]
        remote: RemoteArgs,
        /// Where to write the ledger
        #[arg(long, default_value = "depends.txt")]
        ledger: PathBuf,
        /// Keep whatever is already in the remote working directory
        #[arg(long)]
        keep_workspace: bool,
    },

    /// Run the whole pipeline: clone, scan, resolve, fetch, assemble
    Build {
        /// OS to collect dependencies for (also filters the metadata tree)
        #[arg(long)]
        os_name: String,
        /// Release to collect for (e.g. bionic)
        #[arg(long)]
        release_name: Option<String>,
        /// Suffix for produced file names (e.g. 18 gives depends_ubuntu18.tar.gz)
        #[arg(long)]
        note: Option<String>,
        /// Only use module directories matching this glob
        #[arg(long)]
        module: Option<String>,
        /// Metadata repository to clone
        #[arg(long)]
        git_link: Option<String>,
        /// Directory to work in (defaults to the current directory)
        #[arg(long)]
        work_dir: Option<PathBuf>,
        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Install reprepro on this machine
    PrepareRepo,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn filter_from(args: &TreeFilterArgs) -> Result<ManifestFilter> {
    Ok(ManifestFilter::new(
        args.module.as_deref(),
        args.os_name.as_deref(),
        args.release_name.as_deref(),
    )?)
}

fn run_scan(root: &Path, filter: &TreeFilterArgs) -> Result<()> {
    let scan = manifest::scan(root, &filter_from(filter)?)?;
    match get_output_format() {
        OutputFormat::Json => emit(
            Level::Info,
            "manifest.scan.names",
            &format!("{} packages", scan.names.len()),
            Some(serde_json::json!({
                "names": scan.names,
                "manifests": scan.manifests,
            })),
        ),
        OutputFormat::Text => {
            for name in &scan.names {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

fn run_resolve(
    config: &Config,
    root: Option<&Path>,
    packages: &[String],
    filter: &TreeFilterArgs,
    ledger: &Path,
    keep_workspace: bool,
) -> Result<()> {
    let mut names: BTreeSet<String> = packages.iter().cloned().collect();
    if let Some(root) = root {
        names.extend(manifest::scan(root, &filter_from(filter)?)?.names);
    }
    if names.is_empty() {
        anyhow::bail!("Nothing to resolve: pass --package or --root");
    }

    let mut channel = pipeline::connect(config)?;
    if !keep_workspace {
        pipeline::reset_workspace(&mut channel, &config.remote.workdir, None);
    }
    let resolution = pipeline::resolve_on_remote(&mut channel, config, &names);
    channel.close();

    pipeline::report_gaps(&resolution);
    pipeline::write_ledger(&resolution, ledger)
}

fn main() {
    let cli = Cli::parse();

    ui::set_debug_mode(cli.debug);
    ui::init(cli.output, !cli.no_color);
    emit(Level::Debug, "debug.enabled", "Debug mode is on", None);

    if let Err(e) = run(cli) {
        emit(
            Level::Error,
            "error",
            &format!("Error: {:#}", e),
            None,
        );
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Scan { root, filter }) => run_scan(root, filter),
        Some(Commands::Resolve {
            root,
            packages,
            filter,
            remote,
            ledger,
            keep_workspace,
        }) => {
            let mut config = load_config(cli.config.as_deref())?;
            remote.apply(&mut config);
            run_resolve(
                &config,
                root.as_deref(),
                packages,
                filter,
                ledger,
                *keep_workspace,
            )
        }
        Some(Commands::Build {
            os_name,
            release_name,
            note,
            module,
            git_link,
            work_dir,
            remote,
        }) => {
            let mut config = load_config(cli.config.as_deref())?;
            remote.apply(&mut config);
            if let Some(url) = git_link {
                config.metadata.git_url = url.clone();
            }
            let work_dir = match work_dir {
                Some(dir) => dir.clone(),
                None => std::env::current_dir().context("Failed to get current directory")?,
            };

            let names = ArtifactNames::new(os_name, note.as_deref());
            emit(
                Level::Info,
                "build.start",
                &format!(
                    "Building {} from {}",
                    names.repo_archive,
                    config.metadata.git_url
                ),
                None,
            );
            pipeline::build(
                &config,
                &pipeline::BuildOptions {
                    os_name: os_name.clone(),
                    release: release_name.clone(),
                    module: module.clone(),
                    note: note.clone(),
                    work_dir,
                },
            )
        }
        Some(Commands::PrepareRepo) => assemble::install_reprepro(),
        None => {
            println!("aptpack: run with --help for usage");
            Ok(())
        }
    }
}
