use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use nosd_patcher::backup::{restore_backup, RestoreOutcome};
use nosd_patcher::config::{load_from_path, KindSpec, TargetSetConfig};
use nosd_patcher::hook::{check_library, patch_library, BackupStatus, FileOutcome, PatchReport};
use nosd_patcher::locate::BuildEnv;
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "nosd-patcher")]
#[command(about = "Build-time SD-card exclusion for a vendored Audio library", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Patch the installed library files (pre-build hook)
    Patch {
        /// PlatformIO project directory (defaults to the current directory)
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// Explicit library directory, bypassing libdeps discovery
        #[arg(short, long)]
        lib_dir: Option<PathBuf>,

        /// Target-set TOML file (defaults to the built-in SD set)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Report patch state per file without modifying anything
    Status {
        #[arg(short, long)]
        project: Option<PathBuf>,

        #[arg(short, long)]
        lib_dir: Option<PathBuf>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Filter a source list the way the build hook would
    Filter {
        /// Library name as the build system reports it
        library: String,

        /// Source files to filter
        sources: Vec<PathBuf>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Restore patched files from their .original backups
    Restore {
        #[arg(short, long)]
        project: Option<PathBuf>,

        #[arg(short, long)]
        lib_dir: Option<PathBuf>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List the active target set
    List {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Patch {
            project,
            lib_dir,
            config,
            dry_run,
            diff,
        } => cmd_patch(project, lib_dir, config, dry_run, diff),

        Commands::Status {
            project,
            lib_dir,
            config,
        } => cmd_status(project, lib_dir, config),

        Commands::Filter {
            library,
            sources,
            config,
        } => cmd_filter(&library, sources, config),

        Commands::Restore {
            project,
            lib_dir,
            config,
        } => cmd_restore(project, lib_dir, config),

        Commands::List { config } => cmd_list(config),
    }
}

fn load_target_set(config: Option<PathBuf>) -> Result<TargetSetConfig> {
    match config {
        Some(path) => Ok(load_from_path(&path)?),
        None => Ok(TargetSetConfig::sd_default()),
    }
}

/// Build the search environment from an explicit library directory or a
/// PlatformIO project's `.pio/libdeps` tree.
fn resolve_env(
    set: &TargetSetConfig,
    project: Option<PathBuf>,
    lib_dir: Option<PathBuf>,
) -> Result<BuildEnv> {
    if let Some(dir) = lib_dir {
        return Ok(BuildEnv::for_directory(dir.canonicalize()?));
    }

    let project = match project {
        Some(p) => p,
        None => env::current_dir()?,
    };
    let scanned = BuildEnv::from_project_dir(&project);
    Ok(set.build_env(scanned.include_paths))
}

/// Helper: Show unified diff between original and patched content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn print_report(report: &PatchReport, dry_run: bool) {
    match &report.library_dir {
        Some(dir) => println!("Library: {}", dir.display()),
        None => {
            // Not an error: the library may not be installed yet.
            println!(
                "{}",
                "Library not found, nothing to patch (is the dependency installed?)".yellow()
            );
            return;
        }
    }
    println!();

    for file in &report.files {
        match &file.outcome {
            FileOutcome::Patched { backup } => {
                let verb = if dry_run { "Would patch" } else { "Patched" };
                println!("{} {}: {}", "✓".green(), file.filename, verb);
                if let BackupStatus::Failed(reason) = backup {
                    eprintln!(
                        "  {}",
                        format!("Warning: backup failed: {reason}").yellow()
                    );
                }
            }
            FileOutcome::WouldPatch => {
                println!("{} {}: Would patch", "✓".green(), file.filename);
            }
            FileOutcome::AlreadyPatched => {
                println!("{} {}: Already patched", "⊙".yellow(), file.filename);
            }
            FileOutcome::NotFound => {
                println!("{} {}: Skipped (not found)", "⊘".cyan(), file.filename);
            }
            FileOutcome::Unchanged => {
                println!("{} {}: No matching region", "⊘".cyan(), file.filename);
            }
            FileOutcome::Failed { reason } => {
                eprintln!("{} {}: Failed - {}", "✗".red(), file.filename, reason);
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} patched",
        format!("{}", report.patched_count()).green()
    );
    println!(
        "  {} already patched",
        format!("{}", report.already_patched_count()).yellow()
    );
    println!("  {} failed", format!("{}", report.failed_count()).red());
}

fn cmd_patch(
    project: Option<PathBuf>,
    lib_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let set = load_target_set(config)?;
    let env = resolve_env(&set, project, lib_dir)?;
    let guard = set.guard();
    let targets = set.patch_targets();

    // Capture contents before patching for diff output.
    let mut before: HashMap<String, String> = HashMap::new();
    if show_diff && !dry_run {
        if let Some(dir) = env.locate_library() {
            for target in &targets {
                let path = dir.join(&target.filename);
                if let Ok(content) = fs::read_to_string(&path) {
                    before.insert(target.filename.clone(), content);
                }
            }
        }
    }

    let report = if dry_run {
        println!("{}", "[DRY RUN - no files will be modified]".cyan());
        check_library(&env, &guard, &targets)
    } else {
        patch_library(&env, &guard, &targets)
    };

    print_report(&report, dry_run);

    if show_diff && !dry_run {
        if let Some(dir) = &report.library_dir {
            for file in &report.files {
                if !matches!(file.outcome, FileOutcome::Patched { .. }) {
                    continue;
                }
                let path = dir.join(&file.filename);
                if let (Some(old), Ok(new)) =
                    (before.get(&file.filename), fs::read_to_string(&path))
                {
                    if old != &new {
                        display_diff(&path, old, &new);
                    }
                }
            }
        }
    }

    if report.failed_count() > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_status(
    project: Option<PathBuf>,
    lib_dir: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<()> {
    let set = load_target_set(config)?;
    let env = resolve_env(&set, project, lib_dir)?;

    println!("{}", "Patch Status Report".bold());
    let report = check_library(&env, &set.guard(), &set.patch_targets());
    print_report(&report, true);

    Ok(())
}

fn cmd_filter(library: &str, sources: Vec<PathBuf>, config: Option<PathBuf>) -> Result<()> {
    let set = load_target_set(config)?;
    let filter = set.source_filter();

    let outcome = filter.filter(library, sources);
    for name in outcome.excluded_names() {
        println!("{} excluding {}", "⊘".cyan(), name);
    }
    match outcome.counts() {
        Some((original, kept)) => {
            println!("Filtered {library} sources ({original}, {kept})");
        }
        None => println!("{library}: not a target library, sources unchanged"),
    }

    if let Some(sources) = outcome.into_sources() {
        for source in sources {
            println!("{}", source.display());
        }
    }

    Ok(())
}

fn cmd_restore(
    project: Option<PathBuf>,
    lib_dir: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<()> {
    let set = load_target_set(config)?;
    let env = resolve_env(&set, project, lib_dir)?;

    let Some(dir) = env.locate_library() else {
        println!("{}", "Library not found, nothing to restore".yellow());
        return Ok(());
    };
    println!("Library: {}", dir.display());

    let mut failed = 0;
    for target in set.patch_targets() {
        let path = dir.join(&target.filename);
        match restore_backup(&path) {
            Ok(RestoreOutcome::Restored(_)) => {
                println!("{} {}: Restored from backup", "✓".green(), target.filename);
            }
            Ok(RestoreOutcome::NoBackup(_)) => {
                println!("{} {}: No backup", "⊘".cyan(), target.filename);
            }
            Err(e) => {
                eprintln!("{} {}: Failed - {}", "✗".red(), target.filename, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(config: Option<PathBuf>) -> Result<()> {
    let set = load_target_set(config)?;

    println!("{} {}", "Target set:".bold(), set.meta.name);
    if let Some(desc) = &set.meta.description {
        println!("{}", desc.dimmed());
    }
    println!("Library fragment: {}", set.library.name_fragment);
    println!("Guard macro: {}", set.library.guard_macro);

    println!("\n{}", "Exclude fragments:".bold());
    for fragment in &set.library.exclude_fragments {
        println!("  - {fragment}");
    }

    println!("\n{}", "Patch targets:".bold());
    for target in &set.targets {
        let kind = match &target.kind {
            KindSpec::WrapFile => "wrap-file".to_string(),
            KindSpec::Anchored { end_anchor, .. } => {
                if end_anchor.is_some() {
                    "anchored (start/end)".to_string()
                } else {
                    "anchored (start only)".to_string()
                }
            }
            KindSpec::IncludeBlock { .. } => "include-block".to_string(),
        };
        println!("  - {} ({kind})", target.file);
    }

    Ok(())
}
