use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params_from_iter};
use serde::Serialize;
use tracing::debug;

use crate::config::ResolvedConfig;
use crate::domain::{Principal, parse_tags};
use crate::error::SeqError;
use crate::query::{self, PermissionFilter, SqlQuery};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub genome: String,
    pub assembly: String,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    pub id: String,
    pub genome: String,
    pub assembly: String,
    pub platform: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub id: String,
    pub dataset_id: String,
    pub genome: String,
    pub assembly: String,
    pub platform: String,
    pub dataset: String,
    pub name: String,
    pub reads: u64,
    #[serde(rename = "type")]
    pub sample_type: String,
    pub url: String,
    pub tags: Vec<String>,
    /// Absolute path of the signal store, derived from `url`.
    #[serde(skip)]
    pub locator: Utf8PathBuf,
}

/// Authorization and locator lookup needed to serve bins for one sample.
pub trait SampleCatalog: Send + Sync {
    fn can_view(&self, sample_id: &str, principal: &Principal) -> Result<(), SeqError>;
    fn resolve(&self, sample_id: &str) -> Result<Sample, SeqError>;
}

/// Read-only view of the catalog database. Every operation opens its own
/// connection and drops it before returning.
#[derive(Debug, Clone)]
pub struct Catalog {
    data_dir: Utf8PathBuf,
    catalog_path: Utf8PathBuf,
}

impl Catalog {
    pub fn new(data_dir: Utf8PathBuf, catalog_path: Utf8PathBuf) -> Self {
        Self {
            data_dir,
            catalog_path,
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(config.data_dir.clone(), config.catalog_path.clone())
    }

    pub fn catalog_path(&self) -> &Utf8Path {
        &self.catalog_path
    }

    pub fn platforms(
        &self,
        assembly: &str,
        principal: &Principal,
    ) -> Result<Vec<Platform>, SeqError> {
        let filter = PermissionFilter::for_principal(principal);
        self.fetch(query::platforms(assembly, &filter), |row| {
            Ok(Platform {
                genome: row.get(0)?,
                assembly: row.get(1)?,
                platform: row.get(2)?,
            })
        })
    }

    pub fn datasets(
        &self,
        assembly: &str,
        principal: &Principal,
        platform: Option<&str>,
    ) -> Result<Vec<Dataset>, SeqError> {
        let filter = PermissionFilter::for_principal(principal);
        self.fetch(query::datasets(assembly, platform, &filter), |row| {
            Ok(Dataset {
                id: row.get(0)?,
                genome: row.get(1)?,
                assembly: row.get(2)?,
                platform: row.get(3)?,
                name: row.get(4)?,
            })
        })
    }

    pub fn search_samples(
        &self,
        assembly: &str,
        search: &str,
        principal: &Principal,
    ) -> Result<Vec<Sample>, SeqError> {
        let filter = PermissionFilter::for_principal(principal);
        self.fetch(
            query::search_samples(assembly, search.trim(), &filter),
            |row| self.sample_from_row(row),
        )
    }

    pub fn dataset_samples(
        &self,
        dataset_id: &str,
        principal: &Principal,
    ) -> Result<Vec<Sample>, SeqError> {
        let filter = PermissionFilter::for_principal(principal);
        self.fetch(query::dataset_samples(dataset_id, &filter), |row| {
            self.sample_from_row(row)
        })
    }

    fn connect(&self) -> Result<Connection, SeqError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Connection::open_with_flags(self.catalog_path.as_std_path(), flags).map_err(|err| {
            SeqError::Catalog(format!("cannot open {}: {err}", self.catalog_path))
        })
    }

    fn fetch<T, F>(&self, query: SqlQuery, map: F) -> Result<Vec<T>, SeqError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        debug!(sql = %query.sql, params = query.params.len(), "catalog query");
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&query.sql)?;
        let rows = stmt
            .query_map(params_from_iter(query.params.iter()), map)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn sample_from_row(&self, row: &Row<'_>) -> rusqlite::Result<Sample> {
        let url: String = row.get(9)?;
        let tags: Option<String> = row.get(10)?;
        let reads: i64 = row.get(7)?;
        Ok(Sample {
            id: row.get(0)?,
            dataset_id: row.get(1)?,
            genome: row.get(2)?,
            assembly: row.get(3)?,
            platform: row.get(4)?,
            dataset: row.get(5)?,
            name: row.get(6)?,
            reads: reads.max(0) as u64,
            sample_type: row.get(8)?,
            locator: self.data_dir.join(&url),
            url,
            tags: parse_tags(tags.as_deref().unwrap_or_default()),
        })
    }
}

impl SampleCatalog for Catalog {
    /// Unknown and forbidden samples are both reported as `PermissionDenied`.
    fn can_view(&self, sample_id: &str, principal: &Principal) -> Result<(), SeqError> {
        if principal.is_admin {
            return Ok(());
        }
        let filter = PermissionFilter::for_principal(principal);
        if filter == PermissionFilter::Nothing {
            return Err(SeqError::PermissionDenied(sample_id.to_string()));
        }
        let query = query::can_view(sample_id, &filter);
        let conn = self.connect()?;
        let found: Option<String> = conn
            .query_row(&query.sql, params_from_iter(query.params.iter()), |row| {
                row.get(0)
            })
            .optional()?;
        match found {
            Some(id) if id == sample_id => Ok(()),
            _ => Err(SeqError::PermissionDenied(sample_id.to_string())),
        }
    }

    fn resolve(&self, sample_id: &str) -> Result<Sample, SeqError> {
        let mut samples = self.fetch(query::sample_by_id(sample_id), |row| {
            self.sample_from_row(row)
        })?;
        if samples.is_empty() {
            return Err(SeqError::NotFound(format!("sample {sample_id}")));
        }
        Ok(samples.swap_remove(0))
    }
}
