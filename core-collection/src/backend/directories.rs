//! Watched directories, their subdirectories, and the songs stored under them.

use super::sqlite::SqliteCollectionBackend;
use super::CollectionBackend;
use crate::directory::{Directory, DirectoryList, Subdirectory, SubdirectoryList};
use crate::error::Result;
use crate::events::CollectionEvent;
use crate::song::{Song, SongList};
use crate::sql::SqlStatement;
use sqlx::{Connection, SqliteConnection};
use std::path::Path;
use tracing::{debug, info};

const SECONDS_PER_DAY: i64 = 86_400;

/// `file://` URL prefix for a local path.
fn file_url(path: &str) -> String {
    if path.starts_with('/') {
        format!("file://{}", path)
    } else {
        format!("file:///{}", path)
    }
}

impl SqliteCollectionBackend {
    async fn subdirs_in(
        &self,
        conn: &mut SqliteConnection,
        directory_id: i64,
    ) -> Result<SubdirectoryList> {
        SqlStatement::new(format!(
            "SELECT directory_id, path, mtime FROM {} WHERE directory_id = ?",
            self.subdirs_table()?
        ))
        .bind(directory_id)
        .fetch_all_as(conn)
        .await
    }

    async fn directories_in(&self, conn: &mut SqliteConnection) -> Result<DirectoryList> {
        SqlStatement::new(format!(
            "SELECT ROWID AS id, path FROM {}",
            self.dirs_table()?
        ))
        .fetch_all_as(conn)
        .await
    }

    pub async fn get_all_directories(&self) -> Result<DirectoryList> {
        let result = async {
            let mut db = self.session().await?;
            self.directories_in(&mut db).await
        }
        .await;
        self.finish(result)
    }

    pub async fn subdirs_in_directory(&self, directory_id: i64) -> Result<SubdirectoryList> {
        let result = async {
            let mut db = self.session().await?;
            self.subdirs_in(&mut db, directory_id).await
        }
        .await;
        self.finish(result)
    }

    /// Announce every directory with its subdirectories.
    pub async fn load_directories(&self) -> Result<()> {
        let result: Result<Vec<(Directory, SubdirectoryList)>> = async {
            let mut db = self.session().await?;
            let mut loaded = Vec::new();
            for directory in self.directories_in(&mut db).await? {
                let subdirs = self.subdirs_in(&mut db, directory.id).await?;
                loaded.push((directory, subdirs));
            }
            Ok(loaded)
        }
        .await;

        for (directory, subdirs) in self.finish(result)? {
            self.emit(CollectionEvent::DirectoryDiscovered { directory, subdirs });
        }
        Ok(())
    }

    pub(super) async fn songs_in_directory_in(
        &self,
        conn: &mut SqliteConnection,
        directory_id: i64,
    ) -> Result<SongList> {
        SqlStatement::new(self.select_songs("WHERE directory_id = ?"))
            .bind(directory_id)
            .fetch_all_as(conn)
            .await
    }

    pub async fn find_songs_in_directory(&self, directory_id: i64) -> Result<SongList> {
        let result = async {
            let mut db = self.session().await?;
            self.songs_in_directory_in(&mut db, directory_id).await
        }
        .await;
        self.finish(result)
    }

    /// Available songs of a directory that still need an acoustic fingerprint.
    pub async fn songs_with_missing_fingerprint(&self, directory_id: i64) -> Result<SongList> {
        let result = async {
            let mut db = self.session().await?;
            SqlStatement::new(self.select_songs(
                "WHERE directory_id = ? AND unavailable = 0 \
                 AND (fingerprint IS NULL OR fingerprint = '')",
            ))
            .bind(directory_id)
            .fetch_all_as(&mut db)
            .await
        }
        .await;
        self.finish(result)
    }

    /// Start watching `path`. The stored path is canonical when the path
    /// exists on disk.
    pub async fn add_directory(&self, path: &str) -> Result<Directory> {
        let canonical = std::fs::canonicalize(Path::new(path))
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string());

        let result = async {
            let mut db = self.session().await?;
            let done = SqlStatement::new(format!(
                "INSERT INTO {} (path, subdirs) VALUES (?, 1)",
                self.dirs_table()?
            ))
            .bind(canonical.as_str())
            .execute(&mut db)
            .await?;
            Ok(Directory {
                id: done.last_insert_rowid(),
                path: canonical.clone(),
            })
        }
        .await;

        let directory = self.finish(result)?;
        info!(id = directory.id, path = %directory.path, "Directory added");
        self.emit(CollectionEvent::DirectoryDiscovered {
            directory: directory.clone(),
            subdirs: SubdirectoryList::new(),
        });
        Ok(directory)
    }

    /// Stop watching a directory: its songs go first, then its subdirectory
    /// rows and its own row in one transaction.
    pub async fn remove_directory(&self, directory: &Directory) -> Result<()> {
        let songs = self.find_songs_in_directory(directory.id).await?;
        self.delete_songs(songs).await?;

        let result: Result<()> = async {
            let subdirs = self.subdirs_table()?;
            let dirs = self.dirs_table()?;

            let mut db = self.session().await?;
            let mut tx = db.begin().await?;
            SqlStatement::new(format!("DELETE FROM {} WHERE directory_id = ?", subdirs))
                .bind(directory.id)
                .execute(&mut tx)
                .await?;
            SqlStatement::new(format!("DELETE FROM {} WHERE ROWID = ?", dirs))
                .bind(directory.id)
                .execute(&mut tx)
                .await?;
            tx.commit().await?;
            Ok(())
        }
        .await;
        self.finish(result)?;

        info!(id = directory.id, path = %directory.path, "Directory removed");
        self.emit(CollectionEvent::DirectoryDeleted {
            directory: directory.clone(),
        });
        Ok(())
    }

    /// Move a watched directory: rewrite its path and the path prefix of
    /// every subdirectory and song under it.
    pub async fn change_dir_path(&self, id: i64, old_path: &str, new_path: &str) -> Result<()> {
        let old_url = file_url(old_path);
        let new_url = file_url(new_path);

        let result: Result<()> = async {
            let dirs = self.dirs_table()?;
            let subdirs = self.subdirs_table()?;

            let mut db = self.session().await?;
            let mut tx = db.begin().await?;

            SqlStatement::new(format!("UPDATE {} SET path = ? WHERE ROWID = ?", dirs))
                .bind(new_path)
                .bind(id)
                .execute(&mut tx)
                .await?;

            // substr() is 1-based and counts characters
            SqlStatement::new(format!(
                "UPDATE {} SET path = ? || substr(path, {}) WHERE directory_id = ?",
                subdirs,
                old_path.chars().count() + 1
            ))
            .bind(new_path)
            .bind(id)
            .execute(&mut tx)
            .await?;

            SqlStatement::new(format!(
                "UPDATE {} SET url = ? || substr(url, {}) WHERE directory_id = ?",
                self.songs_table(),
                old_url.chars().count() + 1
            ))
            .bind(new_url.as_str())
            .bind(id)
            .execute(&mut tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }
        .await;
        self.finish(result)?;

        info!(id, old_path, new_path, "Directory path changed");
        Ok(())
    }

    /// Remember subdirectory mtimes; an mtime of `0` forgets the subdirectory.
    pub async fn add_or_update_subdirs(&self, subdirs: &[Subdirectory]) -> Result<()> {
        let result: Result<()> = async {
            let table = self.subdirs_table()?;
            let mut db = self.session().await?;
            let mut tx = db.begin().await?;

            for subdir in subdirs {
                if subdir.is_deleted() {
                    SqlStatement::new(format!(
                        "DELETE FROM {} WHERE directory_id = ? AND path = ?",
                        table
                    ))
                    .bind(subdir.directory_id)
                    .bind(subdir.path.as_str())
                    .execute(&mut tx)
                    .await?;
                    continue;
                }

                let existing: Option<(i64,)> = SqlStatement::new(format!(
                    "SELECT ROWID FROM {} WHERE directory_id = ? AND path = ?",
                    table
                ))
                .bind(subdir.directory_id)
                .bind(subdir.path.as_str())
                .fetch_optional_as(&mut tx)
                .await?;

                let statement = if existing.is_some() {
                    SqlStatement::new(format!(
                        "UPDATE {} SET mtime = ? WHERE directory_id = ? AND path = ?",
                        table
                    ))
                    .bind(subdir.mtime)
                    .bind(subdir.directory_id)
                    .bind(subdir.path.as_str())
                } else {
                    SqlStatement::new(format!(
                        "INSERT INTO {} (directory_id, path, mtime) VALUES (?, ?, ?)",
                        table
                    ))
                    .bind(subdir.directory_id)
                    .bind(subdir.path.as_str())
                    .bind(subdir.mtime)
                };
                statement.execute(&mut tx).await?;
            }

            tx.commit().await?;
            Ok(())
        }
        .await;
        self.finish(result)
    }

    /// Stamp every available song of a directory as seen now, then expire
    /// songs that have been unavailable for longer than `expire_days`.
    pub async fn update_last_seen(&self, directory_id: i64, expire_days: i64) -> Result<()> {
        let result: Result<()> = async {
            let mut db = self.session().await?;
            SqlStatement::new(format!(
                "UPDATE {} SET lastseen = ? WHERE directory_id = ? AND unavailable = 0",
                self.songs_table()
            ))
            .bind(self.now())
            .bind(directory_id)
            .execute(&mut db)
            .await?;
            Ok(())
        }
        .await;
        self.finish(result)?;

        if expire_days > 0 {
            self.expire_songs(directory_id, expire_days).await?;
        }
        Ok(())
    }

    /// Delete songs unavailable since before `now - expire_days`.
    pub async fn expire_songs(&self, directory_id: i64, expire_days: i64) -> Result<()> {
        let cutoff = self.now() - expire_days * SECONDS_PER_DAY;

        let result = async {
            let mut db = self.session().await?;
            SqlStatement::new(self.select_songs(
                "WHERE directory_id = ? AND unavailable = 1 AND lastseen > 0 AND lastseen < ?",
            ))
            .bind(directory_id)
            .bind(cutoff)
            .fetch_all_as::<Song>(&mut db)
            .await
        }
        .await;
        let songs = self.finish(result)?;

        if songs.is_empty() {
            return Ok(());
        }
        debug!(directory_id, count = songs.len(), cutoff, "Expiring unavailable songs");
        self.delete_songs(songs).await
    }
}

#[cfg(test)]
mod tests {
    use super::file_url;

    #[test]
    fn test_file_url() {
        assert_eq!(file_url("/music"), "file:///music");
        assert_eq!(file_url("C:/Music"), "file:///C:/Music");
    }
}
