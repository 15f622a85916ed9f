#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{Connection, params};
use tempfile::TempDir;

use seqbins::catalog::Catalog;

pub struct Fixture {
    _dir: TempDir,
    pub data_dir: Utf8PathBuf,
    pub catalog: Catalog,
}

pub struct Bin<'a> {
    pub chr: &'a str,
    pub size: u32,
    pub start: i64,
    pub end: i64,
    pub count: i64,
}

pub fn bin(chr: &str, size: u32, start: i64, end: i64, count: i64) -> Bin<'_> {
    Bin {
        chr,
        size,
        start,
        end,
        count,
    }
}

const CATALOG_SCHEMA: &str = "
    CREATE TABLE datasets (
        id INTEGER PRIMARY KEY,
        public_id TEXT NOT NULL UNIQUE,
        genome TEXT NOT NULL,
        assembly TEXT NOT NULL,
        platform TEXT NOT NULL,
        name TEXT NOT NULL);
    CREATE TABLE permissions (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL);
    CREATE TABLE dataset_permissions (
        dataset_id INTEGER NOT NULL,
        permission_id INTEGER NOT NULL,
        PRIMARY KEY (dataset_id, permission_id));
    CREATE TABLE samples (
        id INTEGER PRIMARY KEY,
        public_id TEXT NOT NULL UNIQUE,
        dataset_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        reads INTEGER NOT NULL DEFAULT 0,
        type TEXT NOT NULL DEFAULT 'Seq',
        url TEXT NOT NULL DEFAULT '',
        tags TEXT NOT NULL DEFAULT '');
";

const STORE_SCHEMA: &str = "
    CREATE TABLE bins (
        size INTEGER NOT NULL UNIQUE,
        bpm_scale_factor REAL NOT NULL);
    CREATE TABLE chromosomes (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE);
    CREATE TABLE reads (
        chr_id INTEGER NOT NULL,
        bin INTEGER NOT NULL,
        start INTEGER NOT NULL,
        end INTEGER NOT NULL,
        count INTEGER NOT NULL);
";

/// Catalog layout used across the integration tests:
///
/// | dataset | assembly | platform | name         | permissions    |
/// |---------|----------|----------|--------------|----------------|
/// | D1      | hg19     | ChIP-seq | BCL6 ChIP    | perm-A         |
/// | D2      | hg19     | RNA-seq  | Lymphoma RNA | perm-B         |
/// | D3      | hg19     | ChIP-seq | Alpha ChIP   | perm-A, perm-B |
/// | D4      | GRCm39   | ChIP-seq | Mouse ChIP   | perm-A         |
/// | D5      | hg19     | CUT&RUN  | Hidden       | none           |
pub fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let catalog_path = data_dir.join("samples.db");

    let conn = Connection::open(catalog_path.as_std_path()).unwrap();
    conn.execute_batch(CATALOG_SCHEMA).unwrap();

    let datasets = [
        (1, "D1", "Human", "hg19", "ChIP-seq", "BCL6 ChIP"),
        (2, "D2", "Human", "hg19", "RNA-seq", "Lymphoma RNA"),
        (3, "D3", "Human", "hg19", "ChIP-seq", "Alpha ChIP"),
        (4, "D4", "Mouse", "GRCm39", "ChIP-seq", "Mouse ChIP"),
        (5, "D5", "Human", "hg19", "CUT&RUN", "Hidden"),
    ];
    for (id, public_id, genome, assembly, platform, name) in datasets {
        conn.execute(
            "INSERT INTO datasets (id, public_id, genome, assembly, platform, name) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, public_id, genome, assembly, platform, name],
        )
        .unwrap();
    }

    conn.execute_batch(
        "INSERT INTO permissions (id, name) VALUES (1, 'perm-A'), (2, 'perm-B');
         INSERT INTO dataset_permissions (dataset_id, permission_id) VALUES
            (1, 1), (2, 2), (3, 1), (3, 2), (4, 1);",
    )
    .unwrap();

    let samples = [
        (1, "S1", 1, "BCL6_rep1", 1_200_000, "hg19/S1.db", "ChIP, blood ,B-cell"),
        (2, "S2", 1, "BCL6_rep2", 900_000, "hg19/S2", ""),
        (3, "S3", 2, "OCI-Ly1_RNA", 2_000_000, "hg19/S3.db", "rna"),
        (4, "S4", 3, "H3K27ac_Ly7", 500_000, "hg19/S4.db", ""),
        (5, "S5", 4, "mouse_sample", 100, "mm/S5.db", ""),
        (6, "S6", 5, "secret_50%", 10, "hg19/S6.db", ""),
    ];
    for (id, public_id, dataset_id, name, reads, url, tags) in samples {
        conn.execute(
            "INSERT INTO samples (id, public_id, dataset_id, name, reads, url, tags) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, public_id, dataset_id, name, reads, url, tags],
        )
        .unwrap();
    }
    drop(conn);

    // S1: one database for the whole sample
    write_store(
        &data_dir.join("hg19/S1.db"),
        &[(1024, 0.5), (64, 0.25)],
        &[
            bin("chr1", 1024, 1024, 2048, 5),
            bin("chr1", 1024, 2048, 3072, 9),
            bin("chr1", 1024, 4096, 5120, 2),
            bin("chr1", 1024, 8192, 9216, 40),
            bin("chr1", 64, 1024, 1088, 77),
            bin("chr2", 1024, 1024, 2048, 13),
        ],
    );

    // S2: one database per chromosome, chr1 only
    write_store(
        &data_dir.join("hg19/S2/chr1.db"),
        &[(1024, 2.0)],
        &[bin("chr1", 1024, 0, 1024, 3), bin("chr1", 1024, 1024, 2048, 4)],
    );

    write_store(
        &data_dir.join("hg19/S4.db"),
        &[(1024, 1.5)],
        &[bin("chr1", 1024, 2048, 3072, 1)],
    );

    Fixture {
        _dir: dir,
        catalog: Catalog::new(data_dir.clone(), catalog_path),
        data_dir,
    }
}

pub fn write_store(path: &Utf8Path, factors: &[(u32, f64)], bins: &[Bin<'_>]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent.as_std_path()).unwrap();
    }
    let conn = Connection::open(path.as_std_path()).unwrap();
    conn.execute_batch(STORE_SCHEMA).unwrap();
    for (size, factor) in factors {
        conn.execute(
            "INSERT INTO bins (size, bpm_scale_factor) VALUES (?1, ?2)",
            params![size, factor],
        )
        .unwrap();
    }
    for bin in bins {
        conn.execute(
            "INSERT OR IGNORE INTO chromosomes (name) VALUES (?1)",
            params![bin.chr],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO reads (chr_id, bin, start, end, count)
             SELECT id, ?2, ?3, ?4, ?5 FROM chromosomes WHERE name = ?1",
            params![bin.chr, bin.size, bin.start, bin.end, bin.count],
        )
        .unwrap();
    }
}
