//! anchorfs - symlink-safe file operations from the command line.
//!
//! Usage:
//!   anchorfs stat PATH             Show metadata of an entry
//!   anchorfs ls PATH               List a directory
//!   anchorfs cp SRC DST            Copy a file or directory tree
//!   anchorfs du PATH...            Recursive directory statistics
//!   anchorfs task OP JSON          Submit a raw bulk task
//!   anchorfs --help                Show help

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anchorfs_core::{BackendKind, FileStat, FileType, FsConfig, InternalPath, WriteConflictPolicy};
use anchorfs_io::{FileSystem, WriteOptions, copy_stream};
use anchorfs_ops::{
    AccessPolicy, AllowAll, RootedAccess, TaskComplete, TaskOutcome, TaskRunner,
};
use anchorfs_stats::{DirectoryStats, DirectorySummary, FallbackDirectoryStats, WalkingDirectoryStats};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use serde_json::json;

#[derive(Parser)]
#[command(
    name = "anchorfs",
    version,
    about = "Symlink-safe, descriptor-anchored file operations",
    long_about = "anchorfs resolves every path one component at a time and never follows \
                  a symbolic link, so a path always means what it says.\n\n\
                  Relative paths are taken from the current directory."
)]
struct Cli {
    /// Backend servicing filesystem calls
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,

    /// Never change ownership of created entries
    #[arg(long, global = true)]
    no_chown: bool,

    /// Owner applied to created entries
    #[arg(long, global = true)]
    owner: Option<u32>,

    /// JSON configuration file; flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show metadata of an entry
    Stat {
        path: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
    /// List the entries of a directory
    Ls {
        path: String,

        /// Show size and type of every entry
        #[arg(short, long)]
        long: bool,
    },
    /// Create a directory and its missing parents
    Mkdir { path: String },
    /// Delete an entry
    Rm {
        path: String,

        /// Remove non-empty directories
        #[arg(short, long)]
        recursive: bool,
    },
    /// Move an entry
    Mv {
        source: String,
        destination: String,

        /// What to do when the destination exists
        #[arg(short, long, default_value = "reject")]
        policy: PolicyArg,
    },
    /// Copy a file or directory tree
    Cp {
        source: String,
        destination: String,

        /// What to do when the destination exists
        #[arg(short, long, default_value = "reject")]
        policy: PolicyArg,
    },
    /// Move entries into the trash directory
    Trash {
        paths: Vec<String>,

        /// Trash directory
        #[arg(long)]
        trash_root: String,

        /// Remove everything in the trash instead
        #[arg(long, conflicts_with = "paths")]
        empty: bool,
    },
    /// Print a file to stdout
    Cat {
        path: String,

        /// Skip this many bytes first
        #[arg(long, default_value = "0")]
        skip: u64,
    },
    /// Write stdin to a file
    Put {
        path: String,

        /// What to do when the file exists
        #[arg(short, long, default_value = "rename")]
        policy: PolicyArg,

        /// Append instead of truncating
        #[arg(long, conflicts_with = "offset")]
        append: bool,

        /// Start writing at this offset
        #[arg(long)]
        offset: Option<u64>,
    },
    /// Read or change extended attributes
    Xattr {
        #[command(subcommand)]
        action: XattrAction,
    },
    /// Recursive size and counts of directories
    Du {
        #[arg(required = true)]
        paths: Vec<String>,

        /// Always walk, ignoring filesystem aggregates
        #[arg(long)]
        walk: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
    /// Submit a bulk task by operation name with a JSON request
    Task {
        /// copy, move, delete, create_folder, trash or empty_trash
        operation: String,

        /// The request, e.g. '{"paths": ["/srv/old"]}'
        request: String,

        /// Trash directory for trash and empty_trash
        #[arg(long)]
        trash_root: Option<String>,

        /// Restrict writes to these directories
        #[arg(long = "write-root")]
        write_roots: Vec<String>,

        /// Restrict reads to these directories (write roots are readable)
        #[arg(long = "read-root")]
        read_roots: Vec<String>,
    },
}

#[derive(Subcommand)]
enum XattrAction {
    /// Print an attribute
    Get { path: String, name: String },
    /// Set an attribute
    Set {
        path: String,
        name: String,
        value: String,

        /// Fail if the attribute already exists
        #[arg(long)]
        no_overwrite: bool,
    },
    /// Remove an attribute
    Rm { path: String, name: String },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Auto,
    Native,
    Portable,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => Self::Auto,
            BackendArg::Native => Self::Native,
            BackendArg::Portable => Self::Portable,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Rename,
    Reject,
    Replace,
    MergeRename,
}

impl From<PolicyArg> for WriteConflictPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Rename => Self::Rename,
            PolicyArg::Reject => Self::Reject,
            PolicyArg::Replace => Self::Replace,
            PolicyArg::MergeRename => Self::MergeRename,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let fs = FileSystem::new(load_config(&cli)?).context("Failed to open the filesystem")?;
    tracing::debug!(backend = fs.backend_name(), "Filesystem ready");

    match cli.command {
        Command::Stat { path, format } => run_stat(&fs, &path, format)?,
        Command::Ls { path, long } => run_ls(&fs, &path, long)?,
        Command::Mkdir { path } => {
            fs.create_directories(&internal_path(&path)?)?;
        }
        Command::Rm { path, recursive } => {
            let path = internal_path(&path)?;
            if recursive {
                let runner = TaskRunner::new(fs, Arc::new(AllowAll));
                run_task(&runner, "delete", &json!({ "paths": [path] })).await?;
            } else {
                fs.delete(&path)?;
            }
        }
        Command::Mv {
            source,
            destination,
            policy,
        } => {
            let request = json!({
                "items": [{ "source": internal_path(&source)?, "destination": internal_path(&destination)? }],
                "policy": WriteConflictPolicy::from(policy),
            });
            let runner = TaskRunner::new(fs, Arc::new(AllowAll));
            run_task(&runner, "move", &request).await?;
        }
        Command::Cp {
            source,
            destination,
            policy,
        } => {
            let request = json!({
                "items": [{ "source": internal_path(&source)?, "destination": internal_path(&destination)? }],
                "policy": WriteConflictPolicy::from(policy),
            });
            let runner = TaskRunner::new(fs, Arc::new(AllowAll));
            run_task(&runner, "copy", &request).await?;
        }
        Command::Trash {
            paths,
            trash_root,
            empty,
        } => {
            let runner =
                TaskRunner::new(fs, Arc::new(AllowAll)).with_trash_root(internal_path(&trash_root)?);
            if empty {
                run_task(&runner, "empty_trash", &json!({})).await?;
            } else {
                let paths = paths
                    .iter()
                    .map(|p| internal_path(p))
                    .collect::<Result<Vec<_>>>()?;
                run_task(&runner, "trash", &json!({ "paths": paths })).await?;
            }
        }
        Command::Cat { path, skip } => run_cat(&fs, &path, skip)?,
        Command::Put {
            path,
            policy,
            append,
            offset,
        } => run_put(&fs, &path, policy.into(), append, offset)?,
        Command::Xattr { action } => run_xattr(&fs, action)?,
        Command::Du {
            paths,
            walk,
            format,
        } => run_du(fs, &paths, walk, format)?,
        Command::Task {
            operation,
            request,
            trash_root,
            write_roots,
            read_roots,
        } => {
            let request: serde_json::Value =
                serde_json::from_str(&request).context("Request is not valid JSON")?;
            let access = access_policy(&write_roots, &read_roots)?;
            let mut runner = TaskRunner::new(fs, access);
            if let Some(trash_root) = trash_root {
                runner = runner.with_trash_root(internal_path(&trash_root)?);
            }
            run_task(&runner, &operation, &request).await?;
        }
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();

    Ok(())
}

/// Build the filesystem config from the optional file and the flags.
fn load_config(cli: &Cli) -> Result<FsConfig> {
    let mut config = match &cli.config {
        Some(file) => {
            let raw = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            serde_json::from_str(&raw).context("Invalid configuration")?
        }
        None => FsConfig::default(),
    };

    if let Some(backend) = cli.backend {
        config.backend = backend.into();
    }
    if cli.no_chown {
        config.disable_chown = true;
    }
    if let Some(owner) = cli.owner {
        config.default_owner = Some(owner);
    }

    FsConfig::builder()
        .backend(config.backend)
        .disable_chown(config.disable_chown)
        .default_owner(config.default_owner)
        .directory_mode(config.directory_mode)
        .file_mode(config.file_mode)
        .pool_buffer_size(config.pool_buffer_size)
        .pool_capacity(config.pool_capacity)
        .sensitivity_attribute(config.sensitivity_attribute)
        .build()
        .map_err(|e| eyre!("Invalid configuration: {e}"))
}

/// Resolve a command line path without touching the filesystem.
fn internal_path(raw: &str) -> Result<InternalPath> {
    let path = PathBuf::from(raw);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()?.join(path)
    };
    InternalPath::try_from(absolute.as_path()).with_context(|| format!("Invalid path: {raw}"))
}

fn access_policy(write_roots: &[String], read_roots: &[String]) -> Result<Arc<dyn AccessPolicy>> {
    if write_roots.is_empty() && read_roots.is_empty() {
        return Ok(Arc::new(AllowAll));
    }

    let mut access = RootedAccess::new();
    for root in write_roots {
        access = access.with_write_root(internal_path(root)?);
    }
    for root in read_roots {
        access = access.with_read_root(internal_path(root)?);
    }
    Ok(Arc::new(access))
}

/// Submit a task and wait for it, reporting background progress on stderr.
async fn run_task(runner: &TaskRunner, operation: &str, request: &serde_json::Value) -> Result<()> {
    let complete = match runner.submit(operation, request).await? {
        TaskOutcome::Completed(complete) => complete,
        TaskOutcome::Background(mut task) => {
            eprintln!(
                "Running in the background: ~{}{} items on {} workers",
                task.requirements.estimated_items,
                if task.requirements.limit_reached { "+" } else { "" },
                task.requirements.workers
            );
            while let Some(progress) = task.progress.recv().await {
                eprint!(
                    "\r {} processed, {} failed, {} pending   ",
                    progress.processed(),
                    progress.failed,
                    progress.pending
                );
            }
            eprintln!();
            task.wait().await?
        }
    };

    report(&complete)
}

fn report(complete: &TaskComplete) -> Result<()> {
    println!("{} in {:.2}s", complete.summary(), complete.elapsed.as_secs_f64());
    if complete.failed > 0 {
        bail!(
            "{} of {} items failed (run with RUST_LOG=debug for details)",
            complete.failed,
            complete.succeeded + complete.failed
        );
    }
    Ok(())
}

fn run_stat(fs: &FileSystem, path: &str, format: OutputFormat) -> Result<()> {
    let path = internal_path(path)?;
    let stat = fs.stat(&path)?;

    match format {
        OutputFormat::Text => {
            println!("{}", "─".repeat(60));
            println!(" {path}");
            println!("{}", "─".repeat(60));
            println!("   Type:        {}", type_label(&stat));
            println!("   Size:        {} ({} bytes)", format_size(stat.size), stat.size);
            println!("   Mode:        {:04o}", stat.permissions());
            println!("   Owner:       {}:{}", stat.owner_uid, stat.owner_gid);
            if let Some(modified) = stat.modified() {
                println!("   Modified:    {}", modified.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            if let Some(sensitivity) = &stat.sensitivity {
                println!("   Sensitivity: {sensitivity}");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stat)?);
        }
    }
    Ok(())
}

fn run_ls(fs: &FileSystem, path: &str, long: bool) -> Result<()> {
    let path = internal_path(path)?;
    let mut names = fs.list_files(&path)?;
    names.sort();

    for name in names {
        if !long {
            println!("{name}");
            continue;
        }
        let child = path.join(&name)?;
        match fs.stat(&child) {
            Ok(stat) => println!(
                "{:<10} {:>10}  {}",
                type_label(&stat),
                format_size(stat.size),
                name
            ),
            // Symlinks and entries that vanished cannot be resolved.
            Err(_) => println!("{:<10} {:>10}  {}", "?", "-", name),
        }
    }
    Ok(())
}

fn run_cat(fs: &FileSystem, path: &str, skip: u64) -> Result<()> {
    let path = internal_path(path)?;
    let mut input = fs.open_for_reading(&path)?;
    if skip > 0 {
        input.skip(skip)?;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    copy_stream(fs.pool(), &mut input, &mut out)?;
    out.flush()?;
    input.close()?;
    Ok(())
}

fn run_put(
    fs: &FileSystem,
    path: &str,
    policy: WriteConflictPolicy,
    append: bool,
    offset: Option<u64>,
) -> Result<()> {
    let path = internal_path(path)?;
    let mut options = WriteOptions::from_config(fs.config());
    if append {
        options = options.appending();
    }
    if let Some(offset) = offset {
        options = options.at_offset(offset);
    }

    let (name, mut output) = fs.open_for_writing_with(&path, policy, &options)?;
    let written = copy_stream(fs.pool(), &mut io::stdin().lock(), &mut output)?;
    output.close()?;

    eprintln!("Wrote {} to {name}", format_size(written));
    Ok(())
}

fn run_xattr(fs: &FileSystem, action: XattrAction) -> Result<()> {
    match action {
        XattrAction::Get { path, name } => {
            println!("{}", fs.get_extended_attribute(&internal_path(&path)?, &name)?);
        }
        XattrAction::Set {
            path,
            name,
            value,
            no_overwrite,
        } => {
            fs.set_extended_attribute(&internal_path(&path)?, &name, &value, !no_overwrite)?;
        }
        XattrAction::Rm { path, name } => {
            fs.remove_extended_attribute(&internal_path(&path)?, &name)?;
        }
    }
    Ok(())
}

fn run_du(fs: FileSystem, paths: &[String], walk: bool, format: OutputFormat) -> Result<()> {
    let paths = paths
        .iter()
        .map(|p| internal_path(p))
        .collect::<Result<Vec<_>>>()?;

    let summaries: Vec<DirectorySummary> = if walk {
        WalkingDirectoryStats::new(fs).summaries(&paths)
    } else {
        let stats = FallbackDirectoryStats::new(fs);
        paths.iter().map(|p| stats.summary(p)).collect()
    };

    match format {
        OutputFormat::Text => {
            for (path, summary) in paths.iter().zip(&summaries) {
                if !summary.is_complete() {
                    println!("{:>10}  {path} (unavailable)", "-");
                    continue;
                }
                println!(
                    "{:>10}  {path} ({} files, {} directories)",
                    format_size(summary.size as u64),
                    summary.files,
                    summary.directories
                );
            }
        }
        OutputFormat::Json => {
            let report: Vec<_> = paths
                .iter()
                .zip(&summaries)
                .map(|(path, summary)| json!({ "path": path, "summary": summary }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn type_label(stat: &FileStat) -> &'static str {
    match stat.file_type {
        FileType::File => "file",
        FileType::Directory => "directory",
    }
}

/// Format a byte size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

