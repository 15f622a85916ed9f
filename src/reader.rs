use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{Connection, OpenFlags, OptionalExtension, named_params};
use serde::Serialize;
use tracing::debug;

use crate::catalog::Sample;
use crate::domain::{BinSize, Location};
use crate::error::{ReadFailure, SeqError};

pub const NORMALIZATION_SQL: &str = "SELECT bpm_scale_factor FROM bins WHERE size = :bin_size";

pub const BINS_SQL: &str = "SELECT r.start, r.end, r.count \
     FROM reads r \
     JOIN chromosomes c ON r.chr_id = c.id \
     WHERE c.name = :chr \
     AND r.bin = :bin_size \
     AND r.start <= :end \
     AND r.end >= :start \
     ORDER BY r.start";

const MAX_CAPACITY_HINT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadBin {
    pub start: u64,
    pub end: u64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleBinCounts {
    pub sample_id: String,
    pub bin_size: BinSize,
    pub normalization_factor: f64,
    pub bins: Vec<ReadBin>,
    pub y_max: u64,
}

impl SampleBinCounts {
    pub fn empty(sample_id: impl Into<String>, bin_size: BinSize) -> Self {
        Self {
            sample_id: sample_id.into(),
            bin_size,
            normalization_factor: 0.0,
            bins: Vec::new(),
            y_max: 0,
        }
    }
}

/// Serves bins for one sample at one resolution. Construction does no I/O;
/// each [`BinReader::query`] opens the store, reads and closes it again.
#[derive(Debug, Clone)]
pub struct BinReader {
    sample_id: String,
    locator: Utf8PathBuf,
    bin_size: BinSize,
    capacity_hint: usize,
}

impl BinReader {
    pub fn new(
        sample_id: impl Into<String>,
        locator: impl Into<Utf8PathBuf>,
        bin_size: BinSize,
    ) -> Self {
        let capacity_hint = (bin_size.get() as usize)
            .saturating_mul(4)
            .min(MAX_CAPACITY_HINT);
        Self {
            sample_id: sample_id.into(),
            locator: locator.into(),
            bin_size,
            capacity_hint,
        }
    }

    pub fn for_sample(sample: &Sample, bin_size: BinSize) -> Self {
        Self::new(sample.id.clone(), sample.locator.clone(), bin_size)
    }

    /// A directory locator holds one database per chromosome; anything else
    /// is a single database for the whole sample.
    pub fn store_path(&self, location: &Location) -> Utf8PathBuf {
        if self.locator.as_std_path().is_dir() {
            self.locator.join(format!("{}.db", location.chr()))
        } else {
            self.locator.clone()
        }
    }

    pub fn skeleton(&self) -> SampleBinCounts {
        SampleBinCounts::empty(self.sample_id.clone(), self.bin_size)
    }

    pub fn query(&self, location: &Location) -> Result<SampleBinCounts, ReadFailure> {
        let mut result = self.skeleton();
        let path = self.store_path(location);
        debug!(sample = %self.sample_id, path = %path, location = %location, "reading bins");

        let conn = match open_store(&path) {
            Ok(conn) => conn,
            Err(error) => return Err(ReadFailure { partial: result, error }),
        };

        let factor = match read_normalization(&conn, &path, self.bin_size) {
            Ok(factor) => factor,
            Err(error) => return Err(ReadFailure { partial: result, error }),
        };
        result.normalization_factor = factor;

        result.bins.reserve(self.capacity_hint);
        if let Err(error) = read_bins(&conn, &path, self.bin_size, location, &mut result.bins) {
            result.bins.clear();
            return Err(ReadFailure { partial: result, error });
        }
        result.y_max = result.bins.iter().map(|bin| bin.count).max().unwrap_or(0);

        Ok(result)
    }
}

fn open_store(path: &Utf8Path) -> Result<Connection, SeqError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Connection::open_with_flags(path.as_std_path(), flags).map_err(|err| unavailable(path, err))
}

fn read_normalization(
    conn: &Connection,
    path: &Utf8Path,
    bin_size: BinSize,
) -> Result<f64, SeqError> {
    let factor: Option<f64> = conn
        .query_row(
            NORMALIZATION_SQL,
            named_params! { ":bin_size": bin_size.get() },
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| unavailable(path, err))?;
    factor.ok_or_else(|| SeqError::NormalizationMissing {
        path: path.to_string(),
        bin_size: bin_size.get(),
    })
}

fn read_bins(
    conn: &Connection,
    path: &Utf8Path,
    bin_size: BinSize,
    location: &Location,
    out: &mut Vec<ReadBin>,
) -> Result<(), SeqError> {
    let mut stmt = conn.prepare(BINS_SQL).map_err(|err| unavailable(path, err))?;
    let rows = stmt
        .query_map(
            named_params! {
                ":chr": location.chr(),
                ":bin_size": bin_size.get(),
                ":start": i64::try_from(location.start()).unwrap_or(i64::MAX),
                ":end": i64::try_from(location.end()).unwrap_or(i64::MAX),
            },
            |row| {
                let start: i64 = row.get(0)?;
                let end: i64 = row.get(1)?;
                let count: i64 = row.get(2)?;
                Ok(ReadBin {
                    start: start.max(0) as u64,
                    end: end.max(0) as u64,
                    count: count.max(0) as u64,
                })
            },
        )
        .map_err(|err| unavailable(path, err))?;
    for row in rows {
        out.push(row.map_err(|err| unavailable(path, err))?);
    }
    Ok(())
}

fn unavailable(path: &Utf8Path, err: rusqlite::Error) -> SeqError {
    SeqError::StoreUnavailable {
        path: path.to_string(),
        message: err.to_string(),
    }
}
