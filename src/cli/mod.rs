use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::capture::SaveOptions;
use crate::diff::DiffOptions;
use crate::fsx::CreationFallback;
use crate::reader::{ReaderOptions, TimeFormat};
use crate::restore::RestoreOptions;
use crate::walker::WalkOptions;
use crate::writer::WriteOptions;

/// Save and restore file attributes in a directory tree.
///
/// Exit codes: 0 success, 1 interrupted, 2 generic error,
/// 3 path related error, 10 attribute file related error.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Log debug details to stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Save the attributes of everything below the working path.
    Save(SaveArgs),
    /// Restore attributes from a previously saved file.
    Restore(RestoreArgs),
}

/// Exclusion options shared by both modes.
#[derive(ClapArgs, Clone, Debug, Default)]
pub struct ExclusionArgs {
    /// Gitignore style pattern to exclude (repeatable).
    #[arg(short, long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// File with one exclusion pattern per line (repeatable).
    #[arg(long = "ignore-file", value_name = "FILE")]
    pub ignore_file: Vec<PathBuf>,

    /// Match exclusion patterns without regard to case.
    #[arg(long, alias = "exclusions-ignore-case")]
    pub ignore_case: bool,

    /// Print nothing for excluded paths.
    #[arg(long)]
    pub no_print_excluded: bool,

    /// Leave symbolic links out.
    #[arg(long)]
    pub skip_links: bool,

    /// Record 0 instead of the inode change time when the filesystem has no birth time.
    #[arg(long)]
    pub no_ctime_fallback: bool,
}

impl ExclusionArgs {
    pub fn creation_fallback(&self) -> CreationFallback {
        if self.no_ctime_fallback {
            CreationFallback::None
        } else {
            CreationFallback::ChangeTime
        }
    }
}

#[derive(ClapArgs, Clone, Debug)]
pub struct SaveArgs {
    /// Output file [default: $ATTRSNAP_FILE or ".saved-file-attrs"].
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory whose contents are saved.
    #[arg(short, long, default_value = ".")]
    pub working_path: PathBuf,

    /// Store paths relative to the working path.
    #[arg(short, long)]
    pub relative: bool,

    /// Timestamp unit in the saved file.
    #[arg(long, value_enum, default_value_t = TimeFormatArg::Ns)]
    pub time_format: TimeFormatArg,

    #[command(flatten)]
    pub exclusions: ExclusionArgs,
}

impl SaveArgs {
    pub fn save_options(&self) -> SaveOptions {
        SaveOptions {
            relative: self.relative,
            walk: WalkOptions {
                skip_links: self.exclusions.skip_links,
                print_excluded: !self.exclusions.no_print_excluded,
            },
            reader: ReaderOptions {
                time_format: self.time_format.into(),
                creation_fallback: self.exclusions.creation_fallback(),
            },
        }
    }
}

#[derive(ClapArgs, Clone, Debug)]
pub struct RestoreArgs {
    /// Attribute file to read [default: $ATTRSNAP_FILE or ".saved-file-attrs"].
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory relative paths in the file are resolved against.
    #[arg(short, long, default_value = ".")]
    pub working_path: PathBuf,

    /// Print nothing for modified paths.
    #[arg(long)]
    pub no_print_modified: bool,

    /// Print nothing for missing or skipped paths.
    #[arg(long)]
    pub no_print_skipped: bool,

    /// Copy the creation time to the accessed time.
    #[arg(long, alias = "copy-creation-to-accessed")]
    pub copy_to_access: bool,

    /// Leave uid and gid alone.
    #[arg(long)]
    pub skip_owner: bool,

    /// Leave permission bits alone.
    #[arg(long, alias = "ignore-permissions")]
    pub skip_permissions: bool,

    /// Leave creation times alone.
    #[arg(long, alias = "ignore-filesystem")]
    pub skip_creation: bool,

    /// Leave modification times alone.
    #[arg(long)]
    pub skip_modified: bool,

    /// Leave accessed times alone.
    #[arg(long)]
    pub skip_accessed: bool,

    /// Leave the ARCHIVE attribute alone.
    #[arg(long)]
    pub skip_archive: bool,

    /// Leave the HIDDEN attribute alone.
    #[arg(long)]
    pub skip_hidden: bool,

    /// Leave the READONLY attribute alone.
    #[arg(long)]
    pub skip_readonly: bool,

    /// Leave the SYSTEM attribute alone.
    #[arg(long)]
    pub skip_system: bool,

    #[command(flatten)]
    pub exclusions: ExclusionArgs,
}

impl RestoreArgs {
    pub fn restore_options(&self) -> RestoreOptions {
        RestoreOptions {
            diff: DiffOptions {
                skip_owner: self.skip_owner,
                skip_permissions: self.skip_permissions,
                skip_creation: self.skip_creation,
                skip_modified: self.skip_modified,
                skip_accessed: self.skip_accessed,
                skip_archive: self.skip_archive,
                skip_hidden: self.skip_hidden,
                skip_readonly: self.skip_readonly,
                skip_system: self.skip_system,
            },
            write: WriteOptions {
                copy_creation_to_accessed: self.copy_to_access,
                print_modified: !self.no_print_modified,
            },
            skip_links: self.exclusions.skip_links,
            print_skipped: !self.no_print_skipped,
            print_excluded: !self.exclusions.no_print_excluded,
        }
    }
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimeFormatArg {
    /// Integer nanoseconds.
    Ns,
    /// Float seconds, readable by older versions.
    Seconds,
}

impl From<TimeFormatArg> for TimeFormat {
    fn from(value: TimeFormatArg) -> Self {
        match value {
            TimeFormatArg::Ns => TimeFormat::Nanoseconds,
            TimeFormatArg::Seconds => TimeFormat::Seconds,
        }
    }
}

/// Parses the process arguments.
pub fn run() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn restore_aliases_map_to_options() {
        let args = Args::try_parse_from([
            "attrsnap",
            "restore",
            "--ignore-permissions",
            "--ignore-filesystem",
            "--copy-creation-to-accessed",
            "--exclusions-ignore-case",
            "-e",
            "target/",
            "--no-print-modified",
        ])
        .unwrap();
        let Commands::Restore(restore) = args.command else {
            panic!("expected restore");
        };
        let options = restore.restore_options();
        assert!(options.diff.skip_permissions && options.diff.skip_creation);
        assert!(options.write.copy_creation_to_accessed && !options.write.print_modified);
        assert!(restore.exclusions.ignore_case);
        assert_eq!(restore.exclusions.exclude, ["target/"]);
    }

    #[test]
    fn save_defaults() {
        let args = Args::try_parse_from(["attrsnap", "-v", "save", "--time-format", "seconds", "-r"]).unwrap();
        assert!(args.verbose);
        let Commands::Save(save) = args.command else {
            panic!("expected save");
        };
        let options = save.save_options();
        assert!(options.relative);
        assert_eq!(options.reader.time_format, TimeFormat::Seconds);
        assert!(options.walk.print_excluded);
        assert_eq!(save.working_path, PathBuf::from("."));
        assert!(save.output.is_none());
    }
}
