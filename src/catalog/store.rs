//! The catalog store: durable, SQLite-backed storage for one row per
//! analyzable file (§4.1).
//!
//! Schema and pool setup follow the teacher's `db::engine` module (WAL
//! journal mode, a 30s busy timeout, a small bounded pool) narrowed to the
//! single table this crate needs plus a `dbmigration` version row.

use crate::catalog::record::{FeatureUpdate, HighLevelAttribs, ScalarConstraints, Tags, TrackRecord};
use crate::error::CatalogError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

const SCHEMA_VERSION: i64 = 1;

/// Default number of pending writes a `CatalogWriter` accumulates before
/// committing its transaction (§4.1's "batched commit").
pub const LIGHT_COMMIT_INTERVAL: usize = 500;
pub const HEAVY_COMMIT_INTERVAL: usize = 100;

#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    pub async fn open(db_path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            db_path.display()
        ))
        .map_err(sqlx::Error::from)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30))
        .pragma("foreign_keys", "ON")
        .pragma("temp_store", "FILE")
        .pragma("cache_size", "10000");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect_with(options)
            .await?;

        let catalog = Self { pool };
        catalog.create_tables().await?;
        Ok(catalog)
    }

    async fn create_tables(&self) -> Result<(), CatalogError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                title TEXT,
                artist TEXT,
                album TEXT,
                albumartist TEXT,
                genres TEXT,
                duration INTEGER,
                ignore INTEGER NOT NULL DEFAULT 0,
                timbre_blob BLOB,
                descriptor_vec TEXT,
                attr_bpm INTEGER,
                attr_key TEXT,
                attr_hl TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_path ON tracks(path)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dbmigration (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO dbmigration (id, version) VALUES (1, ?) \
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(SCHEMA_VERSION)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a batching writer over this catalog's pool (§4.1).
    pub fn writer(&self, commit_interval: usize) -> CatalogWriter {
        CatalogWriter::new(self.pool.clone(), commit_interval)
    }

    pub async fn count(&self) -> Result<i64, CatalogError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM tracks")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<TrackRecord, CatalogError> {
        let row = sqlx::query("SELECT * FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CatalogError::NotFound(id))?;
        Ok(row_to_record(row))
    }

    pub async fn get_by_path(&self, path: &str) -> Result<Option<TrackRecord>, CatalogError> {
        let row = sqlx::query("SELECT * FROM tracks WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(row_to_record))
    }

    /// All rows in ascending `id` order, the stable scan order the
    /// similarity index's `IndexPos` table is built from (§4.4/§9).
    pub async fn scan_ordered(&self) -> Result<Vec<TrackRecord>, CatalogError> {
        let rows = sqlx::query("SELECT * FROM tracks ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(row_to_record).collect())
    }

    pub async fn has_feature(&self, path: &str, kind: FeatureKind) -> Result<bool, CatalogError> {
        let column = match kind {
            FeatureKind::Timbre => "timbre_blob",
            FeatureKind::Descriptor => "descriptor_vec",
            FeatureKind::Attribute => "attr_hl",
        };
        let sql = format!("SELECT {column} IS NOT NULL AS present FROM tracks WHERE path = ?");
        let row = sqlx::query(&sql)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<bool, _>("present")).unwrap_or(false))
    }

    pub async fn all_genres_sorted(&self) -> Result<Vec<String>, CatalogError> {
        let rows = sqlx::query("SELECT DISTINCT genres FROM tracks WHERE genres IS NOT NULL")
            .fetch_all(&self.pool)
            .await?;
        let mut set: HashSet<String> = HashSet::new();
        for row in rows {
            let raw: String = row.get("genres");
            if let Ok(list) = serde_json::from_str::<Vec<String>>(&raw) {
                set.extend(list);
            }
        }
        let mut out: Vec<String> = set.into_iter().collect();
        out.sort();
        Ok(out)
    }

    /// Ids matching scalar constraints, used by the `attrmix` endpoint and
    /// by candidate set construction (§4.1/§4.7).
    pub async fn select_where(&self, constraints: &ScalarConstraints) -> Result<Vec<i64>, CatalogError> {
        let rows = sqlx::query("SELECT * FROM tracks WHERE ignore = 0")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::new();
        for row in rows {
            let record = row_to_record(row);
            if let Some(min) = constraints.min_duration {
                if record.duration.map(|d| d < min).unwrap_or(true) {
                    continue;
                }
            }
            if let Some(max) = constraints.max_duration {
                if record.duration.map(|d| d > max).unwrap_or(false) {
                    continue;
                }
            }
            if let Some(min_bpm) = constraints.min_bpm {
                if record.attr_bpm.map(|b| b < min_bpm).unwrap_or(true) {
                    continue;
                }
            }
            if let Some(max_bpm) = constraints.max_bpm {
                if record.attr_bpm.map(|b| b > max_bpm).unwrap_or(false) {
                    continue;
                }
            }
            if !constraints.attrib_thresholds.is_empty() {
                let Some(hl) = &record.attr_hl else { continue };
                let meets_all = constraints
                    .attrib_thresholds
                    .iter()
                    .all(|(name, min)| hl.get(name).map(|v| v >= *min).unwrap_or(false));
                if !meets_all {
                    continue;
                }
            }
            if let Some(genres) = &constraints.genres {
                if record.genres.is_disjoint(genres) {
                    continue;
                }
            }
            out.push(record.id);
        }
        Ok(out)
    }

    /// Set the per-row `ignore` flag (used when a file is classified
    /// `Filtered` rather than deleted outright, §4.3).
    pub async fn set_ignore(&self, id: i64, ignore: bool) -> Result<(), CatalogError> {
        sqlx::query("UPDATE tracks SET ignore = ? WHERE id = ?")
            .bind(ignore)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove every row whose path is absent from `present_paths`, then
    /// repack ids densely (§4.1's "forget missing, repacking ids"). Returns
    /// whether anything was removed.
    pub async fn forget_missing(&self, present_paths: &HashSet<String>) -> Result<bool, CatalogError> {
        let rows = sqlx::query("SELECT id, path FROM tracks")
            .fetch_all(&self.pool)
            .await?;

        let stale: Vec<i64> = rows
            .into_iter()
            .filter(|row| !present_paths.contains(&row.get::<String, _>("path")))
            .map(|row| row.get::<i64, _>("id"))
            .collect();

        if stale.is_empty() {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;
        for id in stale {
            sqlx::query("DELETE FROM tracks WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.repack_ids().await?;
        Ok(true)
    }

    /// Renumber surviving rows to a dense `[1..N]` range in ascending-id
    /// order (§3/§8). Safe to apply in a single ascending pass: the new id
    /// assigned to a row is always `<=` its old id, so it can never collide
    /// with an as-yet-unprocessed row's (strictly larger) old id.
    async fn repack_ids(&self) -> Result<(), CatalogError> {
        let rows = sqlx::query("SELECT id FROM tracks ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;
        for (pos, row) in rows.iter().enumerate() {
            let old_id: i64 = row.get("id");
            let new_id = (pos + 1) as i64;
            if new_id != old_id {
                sqlx::query("UPDATE tracks SET id = ? WHERE id = ?")
                    .bind(new_id)
                    .bind(old_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;

        sqlx::query("UPDATE sqlite_sequence SET seq = (SELECT COUNT(*) FROM tracks) WHERE name = 'tracks'")
            .execute(&self.pool)
            .await
            .ok();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Timbre,
    Descriptor,
    Attribute,
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> TrackRecord {
    let genres_raw: Option<String> = row.get("genres");
    let genres = genres_raw
        .and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok())
        .map(|v| v.into_iter().collect())
        .unwrap_or_default();

    let descriptor_raw: Option<String> = row.get("descriptor_vec");
    let descriptor_vec = descriptor_raw.and_then(|s| serde_json::from_str::<Vec<f32>>(&s).ok());

    let hl_raw: Option<String> = row.get("attr_hl");
    let attr_hl = hl_raw.and_then(|s| serde_json::from_str::<HighLevelAttribs>(&s).ok());

    TrackRecord {
        id: row.get("id"),
        path: row.get("path"),
        title: row.get("title"),
        artist: row.get("artist"),
        album: row.get("album"),
        albumartist: row.get("albumartist"),
        genres,
        duration: row.get("duration"),
        ignore: row.get::<i64, _>("ignore") != 0,
        timbre_blob: row.get("timbre_blob"),
        descriptor_vec,
        attr_bpm: row.get("attr_bpm"),
        attr_key: row.get("attr_key"),
        attr_hl,
    }
}

/// Accumulates catalog writes into a single open transaction, committing
/// every `commit_interval` calls (§4.1: light commits during tag-only
/// passes, heavier ones once feature extraction joins in).
pub struct CatalogWriter {
    pool: SqlitePool,
    commit_interval: usize,
    pending: usize,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl CatalogWriter {
    fn new(pool: SqlitePool, commit_interval: usize) -> Self {
        Self {
            pool,
            commit_interval: commit_interval.max(1),
            pending: 0,
            tx: None,
        }
    }

    async fn tx_mut(&mut self) -> Result<&mut Transaction<'static, Sqlite>, CatalogError> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        Ok(self.tx.as_mut().expect("just inserted"))
    }

    /// Insert a bare row for `path` if it doesn't exist yet, returning its id.
    pub async fn ensure_path(&mut self, path: &str) -> Result<i64, CatalogError> {
        let tx = self.tx_mut().await?;
        sqlx::query("INSERT INTO tracks (path) VALUES (?) ON CONFLICT(path) DO NOTHING")
            .bind(path)
            .execute(&mut **tx)
            .await?;
        let row = sqlx::query("SELECT id FROM tracks WHERE path = ?")
            .bind(path)
            .fetch_one(&mut **tx)
            .await?;
        self.bump().await?;
        Ok(row.get("id"))
    }

    pub async fn upsert_tags(&mut self, path: &str, tags: &Tags) -> Result<(), CatalogError> {
        let genres_json = tags
            .genres
            .as_ref()
            .map(|g| serde_json::to_string(&g.iter().collect::<Vec<_>>()).unwrap());

        let tx = self.tx_mut().await?;
        sqlx::query(
            r#"
            INSERT INTO tracks (path, title, artist, album, albumartist, genres, duration)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                title = COALESCE(excluded.title, tracks.title),
                artist = COALESCE(excluded.artist, tracks.artist),
                album = COALESCE(excluded.album, tracks.album),
                albumartist = COALESCE(excluded.albumartist, tracks.albumartist),
                genres = COALESCE(excluded.genres, tracks.genres),
                duration = COALESCE(excluded.duration, tracks.duration)
            "#,
        )
        .bind(path)
        .bind(&tags.title)
        .bind(&tags.artist)
        .bind(&tags.album)
        .bind(&tags.albumartist)
        .bind(&genres_json)
        .bind(tags.duration)
        .execute(&mut **tx)
        .await?;

        self.bump().await
    }

    pub async fn upsert_features(&mut self, path: &str, features: &FeatureUpdate) -> Result<(), CatalogError> {
        let descriptor_json = features
            .descriptor
            .as_ref()
            .map(|v| serde_json::to_string(v).unwrap());
        let hl_json = features.hl.map(|hl| serde_json::to_string(&hl).unwrap());

        let tx = self.tx_mut().await?;
        sqlx::query(
            r#"
            INSERT INTO tracks (path, timbre_blob, descriptor_vec, attr_bpm, attr_key, attr_hl)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                timbre_blob = COALESCE(excluded.timbre_blob, tracks.timbre_blob),
                descriptor_vec = COALESCE(excluded.descriptor_vec, tracks.descriptor_vec),
                attr_bpm = COALESCE(excluded.attr_bpm, tracks.attr_bpm),
                attr_key = COALESCE(excluded.attr_key, tracks.attr_key),
                attr_hl = COALESCE(excluded.attr_hl, tracks.attr_hl)
            "#,
        )
        .bind(path)
        .bind(&features.timbre)
        .bind(&descriptor_json)
        .bind(features.bpm)
        .bind(&features.key)
        .bind(&hl_json)
        .execute(&mut **tx)
        .await?;

        self.bump().await
    }

    async fn bump(&mut self) -> Result<(), CatalogError> {
        self.pending += 1;
        if self.pending >= self.commit_interval {
            self.commit().await?;
        }
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<(), CatalogError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        self.pending = 0;
        Ok(())
    }

    /// Flush any pending writes. Call once at the end of an analysis pass.
    pub async fn finish(mut self) -> Result<(), CatalogError> {
        self.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_catalog() -> (tempfile::TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("catalog.db");
        let catalog = Catalog::open(&db_path).await.unwrap();
        (dir, catalog)
    }

    #[tokio::test]
    async fn test_upsert_tags_then_features() {
        let (_dir, catalog) = temp_catalog().await;
        let mut writer = catalog.writer(10);

        writer
            .upsert_tags(
                "/music/a.flac",
                &Tags {
                    title: Some("Song A".into()),
                    artist: Some("Artist A".into()),
                    album: Some("Album A".into()),
                    albumartist: None,
                    genres: Some(["Rock".to_string()].into_iter().collect()),
                    duration: Some(200),
                },
            )
            .await
            .unwrap();
        writer
            .upsert_features(
                "/music/a.flac",
                &FeatureUpdate {
                    timbre: Some(vec![1, 2, 3]),
                    descriptor: Some(vec![0.1, 0.2]),
                    bpm: Some(120),
                    key: Some("8A".into()),
                    hl: Some(HighLevelAttribs {
                        danceable: 0.9,
                        ..Default::default()
                    }),
                },
            )
            .await
            .unwrap();
        writer.finish().await.unwrap();

        let record = catalog.get_by_path("/music/a.flac").await.unwrap().unwrap();
        assert_eq!(record.title.as_deref(), Some("Song A"));
        assert_eq!(record.attr_bpm, Some(120));
        assert!(record.genres.contains("Rock"));
        assert_eq!(record.descriptor_vec, Some(vec![0.1, 0.2]));
        assert!((record.attr_hl.unwrap().danceable - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_partial_feature_update_preserves_other_fields() {
        let (_dir, catalog) = temp_catalog().await;
        let mut writer = catalog.writer(10);
        writer
            .upsert_features(
                "/music/b.flac",
                &FeatureUpdate {
                    timbre: Some(vec![9]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        writer
            .upsert_features(
                "/music/b.flac",
                &FeatureUpdate {
                    bpm: Some(128),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        writer.finish().await.unwrap();

        let record = catalog.get_by_path("/music/b.flac").await.unwrap().unwrap();
        assert_eq!(record.timbre_blob, Some(vec![9]));
        assert_eq!(record.attr_bpm, Some(128));
    }

    #[tokio::test]
    async fn test_forget_missing_repacks() {
        let (_dir, catalog) = temp_catalog().await;
        let mut writer = catalog.writer(10);
        writer.ensure_path("/music/keep.flac").await.unwrap();
        writer.ensure_path("/music/gone.flac").await.unwrap();
        writer.finish().await.unwrap();

        let present: HashSet<String> = ["/music/keep.flac".to_string()].into_iter().collect();
        let changed = catalog.forget_missing(&present).await.unwrap();
        assert!(changed);

        let remaining = catalog.scan_ordered().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].path, "/music/keep.flac");
    }

    #[tokio::test]
    async fn test_select_where_duration_and_genre() {
        let (_dir, catalog) = temp_catalog().await;
        let mut writer = catalog.writer(10);
        writer
            .upsert_tags(
                "/music/short.flac",
                &Tags {
                    duration: Some(10),
                    genres: Some(["Jazz".to_string()].into_iter().collect()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        writer
            .upsert_tags(
                "/music/long.flac",
                &Tags {
                    duration: Some(300),
                    genres: Some(["Jazz".to_string()].into_iter().collect()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        writer.finish().await.unwrap();

        let ids = catalog
            .select_where(&ScalarConstraints {
                min_duration: Some(30),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
    }
}
