//! Track file writer
//!
//! All file I/O for one track happens on a dedicated thread fed by a channel,
//! so header, trackpoints and footer land in the order they were requested no
//! matter which task asked. Failed writes are logged and counted, never
//! propagated to the session.

use super::fix::LocationFix;
use super::gpx;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Track writer errors
#[derive(Error, Debug)]
pub enum TrackWriterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Track file was never opened: {0}")]
    NotOpen(String),
}

enum TrackCommand {
    Append(LocationFix),
    Close,
}

/// Outcome of a finished track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSummary {
    /// Path of the track file
    pub path: PathBuf,

    /// Whether the header made it to disk
    pub header_written: bool,

    /// Whether the footer made it to disk
    pub finalized: bool,

    /// Trackpoints written
    pub points_written: usize,

    /// Trackpoints dropped because of I/O failures
    pub points_dropped: usize,
}

impl TrackSummary {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            header_written: false,
            finalized: false,
            points_written: 0,
            points_dropped: 0,
        }
    }
}

/// Cloneable handle that queues trackpoints on a writer thread
#[derive(Clone)]
pub struct TrackAppender {
    tx: Sender<TrackCommand>,
}

impl TrackAppender {
    /// Queue one trackpoint; returns false once the writer has closed
    pub fn append(&self, fix: LocationFix) -> bool {
        self.tx.send(TrackCommand::Append(fix)).is_ok()
    }
}

/// Serial writer for one track file
pub struct TrackWriter {
    path: PathBuf,
    tx: Option<Sender<TrackCommand>>,
    handle: Option<JoinHandle<TrackSummary>>,
}

impl TrackWriter {
    /// Create the file and write the header on the writer thread
    pub fn open(path: PathBuf, creator: &str) -> Self {
        let (tx, rx) = mpsc::channel::<TrackCommand>();
        let thread_path = path.clone();
        let creator = creator.to_string();

        let handle = thread::Builder::new()
            .name("track-writer".to_string())
            .spawn(move || writer_loop(thread_path, &creator, rx));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!("Failed to spawn track writer thread: {}", e);
                None
            }
        };

        Self {
            path,
            tx: Some(tx),
            handle,
        }
    }

    /// Path of the track file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handle for tasks that feed points while this writer owns the file
    pub fn appender(&self) -> Option<TrackAppender> {
        self.tx.as_ref().map(|tx| TrackAppender { tx: tx.clone() })
    }

    /// Queue one trackpoint
    pub fn append(&self, fix: LocationFix) {
        if let Some(tx) = &self.tx {
            if tx.send(TrackCommand::Append(fix)).is_err() {
                tracing::warn!("Track writer for {:?} is gone, dropping point", self.path);
            }
        }
    }

    /// Write the footer and wait for the file to be closed
    pub async fn close(mut self) -> TrackSummary {
        let path = self.path.clone();
        let Some(handle) = self.finish() else {
            return TrackSummary::new(path);
        };

        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(summary)) => summary,
            _ => {
                tracing::error!("Track writer for {:?} panicked", path);
                TrackSummary::new(path)
            }
        }
    }

    /// Blocking variant of [`close`](Self::close) for non-async callers
    pub fn close_blocking(mut self) -> TrackSummary {
        let path = self.path.clone();
        match self.finish().map(|handle| handle.join()) {
            Some(Ok(summary)) => summary,
            _ => TrackSummary::new(path),
        }
    }

    fn finish(&mut self) -> Option<JoinHandle<TrackSummary>> {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(TrackCommand::Close);
        }
        self.handle.take()
    }
}

impl Drop for TrackWriter {
    fn drop(&mut self) {
        // Dropping without close leaves a partial track; the thread exits on
        // disconnect without writing the footer.
        if self.tx.is_some() {
            tracing::warn!("Track writer for {:?} dropped without close", self.path);
        }
    }
}

fn writer_loop(path: PathBuf, creator: &str, rx: Receiver<TrackCommand>) -> TrackSummary {
    let mut summary = TrackSummary::new(path.clone());

    let mut out = match open_with_header(&path, creator) {
        Ok(out) => {
            summary.header_written = true;
            tracing::info!("Track logging to {:?}", path);
            Some(out)
        }
        Err(e) => {
            tracing::error!("Failed to open track file {:?}: {}", path, e);
            None
        }
    };

    let mut close_requested = false;
    while let Ok(command) = rx.recv() {
        match command {
            TrackCommand::Append(fix) => match write_point(out.as_mut(), &fix) {
                Ok(()) => summary.points_written += 1,
                Err(e) => {
                    summary.points_dropped += 1;
                    tracing::warn!("Dropped trackpoint for {:?}: {}", path, e);
                }
            },
            TrackCommand::Close => {
                close_requested = true;
                break;
            }
        }
    }

    if close_requested {
        if let Some(writer) = out.as_mut() {
            match write_footer(writer) {
                Ok(()) => summary.finalized = true,
                Err(e) => tracing::error!("Failed to finalize track {:?}: {}", path, e),
            }
        }
    }

    tracing::info!(
        "Track closed: {:?} ({} points, {} dropped, finalized={})",
        path,
        summary.points_written,
        summary.points_dropped,
        summary.finalized
    );
    summary
}

fn open_with_header(path: &Path, creator: &str) -> Result<BufWriter<File>, TrackWriterError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(gpx::header(creator).as_bytes())?;
    out.flush()?;
    Ok(out)
}

fn write_point(out: Option<&mut BufWriter<File>>, fix: &LocationFix) -> Result<(), TrackWriterError> {
    let out = out.ok_or_else(|| TrackWriterError::NotOpen("header was not written".to_string()))?;
    out.write_all(gpx::trackpoint(fix).as_bytes())?;
    out.flush()?;
    Ok(())
}

fn write_footer(out: &mut BufWriter<File>) -> Result<(), TrackWriterError> {
    out.write_all(gpx::FOOTER.as_bytes())?;
    out.flush()?;
    out.get_ref().sync_all()?;
    Ok(())
}
