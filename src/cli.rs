use crate::config::{parse_dialect, parse_fourcc, parse_fourcc_list, parse_window, Options};
use crate::logging::LogLevel;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// Inspect and rearrange IFF, RIFF and RF64 chunk containers in place
#[derive(Parser, Debug, Default)]
#[command(name = "iffkit")]
#[command(version)]
#[command(about = "Print the chunk tree of an IFF/RIFF/RF64 file and relocate chunks in place", long_about = None)]
pub struct Cli {
    /// Container file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Container dialect (iff, riff, rf64, iff64, riff64); detected from the root id if omitted
    #[arg(short, long, value_name = "DIALECT")]
    pub dialect: Option<String>,

    /// Comma-separated chunk ids to parse as nested groups (default: RIFF,RF64,FORM,LIST,CAT,PROP)
    #[arg(short, long, value_name = "IDS")]
    pub groups: Option<String>,

    /// Move the first root child with this id behind its siblings
    #[arg(short, long, value_name = "ID")]
    pub move_to_end: Option<String>,

    /// Write changes back to the file
    #[arg(short, long)]
    pub write: bool,

    /// Relocation buffer size in bytes (accepts k/m suffixes)
    #[arg(long, value_name = "BYTES")]
    pub window: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Merge CLI arguments into the options struct
    pub fn merge_into_options(&self, mut opts: Options) -> Result<Options> {
        if let Some(ref dialect) = self.dialect {
            opts.dialect = Some(parse_dialect(dialect)?);
        }

        if let Some(ref groups) = self.groups {
            opts.group_ids = parse_fourcc_list(groups).context("Invalid group id list")?;
        }

        if let Some(ref id) = self.move_to_end {
            opts.move_to_end = Some(parse_fourcc(id).context("Invalid --move-to-end id")?);
        }

        if let Some(ref window) = self.window {
            opts.copy_window = parse_window(window)?;
        }

        if self.write {
            opts.write = true;
        }

        if self.verbose > 0 {
            opts.log_level = LogLevel::from_verbosity(self.verbose);
        }

        if opts.move_to_end.is_some() && !opts.write {
            anyhow::bail!("--move-to-end rewrites the file in place and requires --write");
        }

        Ok(opts)
    }
}
