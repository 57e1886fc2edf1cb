use anyhow::{Context, Result};

use crate::chunk::rotate::DEFAULT_WINDOW;
use crate::chunk::{ChunkId, Dialect, STANDARD_GROUP_IDS};
use crate::logging::LogLevel;

/// Smallest relocation buffer accepted from the command line
pub const MIN_WINDOW: usize = 16;
/// Largest relocation buffer accepted from the command line
pub const MAX_WINDOW: usize = 256 * 1024 * 1024;

/// Options for inspecting and editing one container
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Container dialect; detected from the root chunk id when unset
    pub dialect: Option<Dialect>,
    /// Chunk ids parsed as nested groups
    pub group_ids: Vec<ChunkId>,
    /// Buffer size for in-place relocation
    pub copy_window: usize,
    pub log_level: LogLevel,
    /// Root child to move behind its siblings
    pub move_to_end: Option<ChunkId>,
    /// Write changes back to the file
    pub write: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dialect: None,
            group_ids: STANDARD_GROUP_IDS.to_vec(),
            copy_window: DEFAULT_WINDOW,
            log_level: LogLevel::Warning,
            move_to_end: None,
            write: false,
        }
    }
}

/// Load the base configuration.
/// There is no configuration file yet, so these are the built-in defaults.
pub fn load_config() -> Result<Options> {
    Ok(Options::default())
}

/// Parse a dialect name (iff, riff, rf64, iff64, riff64)
pub fn parse_dialect(s: &str) -> Result<Dialect> {
    match s.to_lowercase().as_str() {
        "iff" => Ok(Dialect::IFF),
        "riff" => Ok(Dialect::RIFF),
        "rf64" => Ok(Dialect::RF64),
        "iff64" => Ok(Dialect::IFF64),
        "riff64" => Ok(Dialect::RIFF64),
        _ => anyhow::bail!(
            "Invalid dialect: {}. Valid options: iff, riff, rf64, iff64, riff64",
            s
        ),
    }
}

/// Parse a chunk id of one to four ASCII characters.
/// Short ids are padded with spaces, so "fmt" becomes "fmt ".
pub fn parse_fourcc(s: &str) -> Result<ChunkId> {
    if s.is_empty() || s.len() > 4 || !s.is_ascii() {
        anyhow::bail!("Chunk id must be 1 to 4 ASCII characters, got {:?}", s);
    }
    let mut bytes = *b"    ";
    bytes[..s.len()].copy_from_slice(s.as_bytes());
    Ok(ChunkId::new(bytes))
}

/// Parse a comma-separated list of chunk ids
pub fn parse_fourcc_list(s: &str) -> Result<Vec<ChunkId>> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_fourcc(part).with_context(|| format!("Invalid entry in {:?}", s)))
        .collect()
}

/// Parse a buffer size in bytes, with an optional `k` or `m` suffix
pub fn parse_window(s: &str) -> Result<usize> {
    let s = s.trim();
    let (digits, scale) = match s.chars().last().map(|c| c.to_ascii_lowercase()) {
        Some('k') => (&s[..s.len() - 1], 1024),
        Some('m') => (&s[..s.len() - 1], 1024 * 1024),
        _ => (s, 1),
    };
    let value: usize = digits.parse().context("Invalid window size")?;
    let bytes = value
        .checked_mul(scale)
        .context("Window size overflows")?;

    if !(MIN_WINDOW..=MAX_WINDOW).contains(&bytes) {
        anyhow::bail!(
            "Window size out of range ({} to {} bytes)",
            MIN_WINDOW,
            MAX_WINDOW
        );
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dialect() {
        assert_eq!(parse_dialect("riff").unwrap(), Dialect::RIFF);
        assert_eq!(parse_dialect("IFF").unwrap(), Dialect::IFF);
        assert_eq!(parse_dialect("Rf64").unwrap(), Dialect::RF64);
        assert_eq!(parse_dialect("riff64").unwrap(), Dialect::RIFF64);
        assert!(parse_dialect("wav").is_err());
    }

    #[test]
    fn test_parse_fourcc() {
        assert_eq!(parse_fourcc("LIST").unwrap(), ChunkId::LIST);
        assert_eq!(parse_fourcc("fmt").unwrap(), ChunkId::new(*b"fmt "));
        assert_eq!(parse_fourcc("CAT").unwrap(), ChunkId::CAT);
        assert!(parse_fourcc("").is_err());
        assert!(parse_fourcc("TOOLONG").is_err());
        assert!(parse_fourcc("fé").is_err());
    }

    #[test]
    fn test_parse_fourcc_list() {
        let ids = parse_fourcc_list("LIST, FORM,CAT").unwrap();
        assert_eq!(ids, vec![ChunkId::LIST, ChunkId::FORM, ChunkId::CAT]);
        assert!(parse_fourcc_list("").unwrap().is_empty());
        assert!(parse_fourcc_list("LIST,TOOLONG").is_err());
    }

    #[test]
    fn test_parse_window() {
        assert_eq!(parse_window("4096").unwrap(), 4096);
        assert_eq!(parse_window("64k").unwrap(), 64 * 1024);
        assert_eq!(parse_window("2M").unwrap(), 2 * 1024 * 1024);
        assert!(parse_window("8").is_err()); // Too small
        assert!(parse_window("1024m").is_err()); // Too large
        assert!(parse_window("abc").is_err());
        assert!(parse_window("k").is_err());
    }

    #[test]
    fn test_options_default() {
        let opts = load_config().unwrap();
        assert_eq!(opts.dialect, None);
        assert_eq!(opts.group_ids.len(), STANDARD_GROUP_IDS.len());
        assert_eq!(opts.copy_window, DEFAULT_WINDOW);
        assert_eq!(opts.log_level, LogLevel::Warning);
        assert!(!opts.write);
    }
}
