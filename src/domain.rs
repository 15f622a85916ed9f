use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::Serialize;

use crate::error::SeqError;

pub const DEFAULT_BIN_SIZES: [u32; 6] = [16, 64, 256, 1024, 4096, 16384];

/// The calling identity as handed over by the authentication layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub is_admin: bool,
    pub permissions: BTreeSet<String>,
}

impl Principal {
    pub fn admin() -> Self {
        Self {
            is_admin: true,
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_permissions<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            is_admin: false,
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Stores keep coordinates in signed 64-bit columns.
pub const MAX_COORDINATE: u64 = i64::MAX as u64;

/// 1-based, inclusive genomic interval on a single chromosome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    chr: String,
    start: u64,
    end: u64,
}

impl Location {
    pub fn new(chr: &str, start: u64, end: u64) -> Result<Self, SeqError> {
        let chr = normalize_chromosome(chr);
        if chr.len() <= 3 {
            return Err(SeqError::InvalidLocation(format!("missing chromosome in {chr}")));
        }
        if start == 0 || end < start || end > MAX_COORDINATE {
            return Err(SeqError::InvalidLocation(format!("{chr}:{start}-{end}")));
        }
        Ok(Self { chr, start, end })
    }

    pub fn chr(&self) -> &str {
        &self.chr
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bases covered, both ends included.
    pub fn span(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chr, self.start, self.end)
    }
}

impl FromStr for Location {
    type Err = SeqError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let pattern = Regex::new(r"^([A-Za-z0-9_.]+):([0-9,]+)-([0-9,]+)$")
            .map_err(|err| SeqError::InvalidLocation(err.to_string()))?;
        let trimmed = value.trim();
        let captures = pattern
            .captures(trimmed)
            .ok_or_else(|| SeqError::InvalidLocation(value.to_string()))?;
        let start = parse_coordinate(&captures[2], value)?;
        let end = parse_coordinate(&captures[3], value)?;
        Location::new(&captures[1], start, end)
    }
}

fn parse_coordinate(raw: &str, original: &str) -> Result<u64, SeqError> {
    raw.replace(',', "")
        .parse::<u64>()
        .map_err(|_| SeqError::InvalidLocation(original.to_string()))
}

/// Stores always name chromosomes `chr<name>`; accept `1`, `CHR1` and `chr1` alike.
pub fn normalize_chromosome(value: &str) -> String {
    let trimmed = value.trim();
    let rest = match trimmed.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("chr") => &trimmed[3..],
        _ => trimmed,
    };
    format!("chr{rest}")
}

/// A bin width that has been checked against the supported ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BinSize(u32);

impl BinSize {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BinSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinSizeLadder {
    sizes: Vec<u32>,
}

impl BinSizeLadder {
    pub fn new(sizes: impl IntoIterator<Item = u32>) -> Result<Self, SeqError> {
        let mut sizes = sizes.into_iter().collect::<Vec<_>>();
        sizes.sort_unstable();
        sizes.dedup();
        if sizes.is_empty() || sizes[0] == 0 {
            return Err(SeqError::ConfigParse(
                "bin_sizes must contain at least one positive size".to_string(),
            ));
        }
        Ok(Self { sizes })
    }

    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    pub fn validate(&self, requested: i64) -> Result<BinSize, SeqError> {
        u32::try_from(requested)
            .ok()
            .filter(|size| self.sizes.binary_search(size).is_ok())
            .map(BinSize)
            .ok_or_else(|| SeqError::InvalidBinSize {
                requested,
                supported: self
                    .sizes
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            })
    }
}

impl Default for BinSizeLadder {
    fn default() -> Self {
        Self {
            sizes: DEFAULT_BIN_SIZES.to_vec(),
        }
    }
}

/// Splits the stored comma separated tag column into trimmed, lowercase,
/// sorted tags.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags = raw
        .split(',')
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>();
    tags.sort();
    tags.dedup();
    tags
}
