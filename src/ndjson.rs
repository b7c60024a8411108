//! Streaming NDJSON read/write helpers shared by every stage.
//!
//! Each pipeline stage is, per the design, "an iterator over chunk records";
//! these helpers give every stage the same read-line/parse/skip-malformed and
//! append-write behavior so intermediate files stay resumable.

use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::error::{RagError, RagResult};

/// Reads every well-formed JSON line in `path`, skipping malformed ones with
/// a warning (cache/chunk files are append-only and may be truncated at a
/// crash boundary, so a trailing partial line is expected, not fatal).
pub async fn read_all<T: DeserializeOwned>(path: impl AsRef<Path>) -> RagResult<Vec<T>> {
    let path = path.as_ref();
    if !tokio::fs::try_exists(path).await? {
        return Ok(Vec::new());
    }
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file).lines();
    let mut out = Vec::new();
    let mut line_no = 0usize;
    while let Some(line) = reader.next_line().await? {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(value) => out.push(value),
            Err(err) => {
                warn!(path = %path.display(), line = line_no, %err, "skipping malformed NDJSON line");
            }
        }
    }
    Ok(out)
}

/// Overwrites `path` with one JSON object per line, in iteration order.
pub async fn write_all<T: Serialize>(path: impl AsRef<Path>, items: &[T]) -> RagResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut file = File::create(path).await?;
    for item in items {
        let line = serde_json::to_string(item).map_err(RagError::from)?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
    }
    file.flush().await?;
    Ok(())
}

/// Appends one JSON object per line to `path`, creating it if absent.
///
/// Used for the embedding cache log, which is append-only by design so
/// mid-batch crashes never corrupt prior entries. An OS advisory exclusive
/// lock is held for the duration of the write only, so concurrent writers
/// (e.g. two pipeline runs against the same cache file) serialize at the
/// append rather than interleaving lines.
pub async fn append_all<T: Serialize>(path: impl AsRef<Path>, items: &[T]) -> RagResult<()> {
    if items.is_empty() {
        return Ok(());
    }
    let path: PathBuf = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        lines.push(serde_json::to_string(item).map_err(RagError::from)?);
    }

    tokio::task::spawn_blocking(move || -> RagResult<()> {
        use std::io::Write as _;
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        file.lock_exclusive()?;
        let result = (|| -> std::io::Result<()> {
            let mut file = &file;
            for line in &lines {
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
            }
            file.flush()
        })();
        let _ = FileExt::unlock(&file);
        result?;
        Ok(())
    })
    .await
    .map_err(|e| RagError::Io(e.to_string()))??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Rec {
        k: String,
        v: u32,
    }

    #[tokio::test]
    async fn round_trips_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let items = vec![
            Rec {
                k: "a".into(),
                v: 1,
            },
            Rec {
                k: "b".into(),
                v: 2,
            },
        ];
        write_all(&path, &items).await.unwrap();
        let read_back: Vec<Rec> = read_all(&path).await.unwrap();
        assert_eq!(read_back, items);
    }

    #[tokio::test]
    async fn append_is_additive_and_skips_malformed_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.ndjson");
        append_all(
            &path,
            &[Rec {
                k: "a".into(),
                v: 1,
            }],
        )
        .await
        .unwrap();

        tokio::fs::write(&path, {
            let mut contents = tokio::fs::read_to_string(&path).await.unwrap();
            contents.push_str("not json\n");
            contents
        })
        .await
        .unwrap();

        append_all(
            &path,
            &[Rec {
                k: "b".into(),
                v: 2,
            }],
        )
        .await
        .unwrap();

        let read_back: Vec<Rec> = read_all(&path).await.unwrap();
        assert_eq!(
            read_back,
            vec![
                Rec {
                    k: "a".into(),
                    v: 1
                },
                Rec {
                    k: "b".into(),
                    v: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.ndjson");
        let read_back: Vec<Rec> = read_all(&path).await.unwrap();
        assert!(read_back.is_empty());
    }
}
