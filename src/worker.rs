//! Background producers for cache artifacts.
//!
//! Slide reads are spread over several reader threads, each owning its own
//! [`RegionReader`], and dispatched to whichever reader has the fewest
//! outstanding jobs. Annotation tiles are rasterized on one dedicated thread.
//! Finished artifacts come back as [`Completion`]s which the model thread
//! feeds into the cache.
//!
//! ```rust
//! use pathtile::worker::{Completion, RegionReader, WorkerPool};
//! use pathtile::{Config, ObjectId, ReadRegion, Request, SoftwareRasterizer, TileImage};
//! use std::time::Duration;
//!
//! struct Blank;
//!
//! impl RegionReader for Blank {
//!     fn read_region(&mut self, region: &ReadRegion) -> pathtile::Result<TileImage> {
//!         Ok(TileImage::transparent(region.size.0, region.size.1))
//!     }
//! }
//!
//! # fn main() -> pathtile::Result<()> {
//! let config = Config::default().with_reader_workers(2);
//! let pool = WorkerPool::new(&config, |_| Ok(Blank), SoftwareRasterizer)?;
//!
//! let region = ReadRegion { location: (0, 0), level: 0, size: (4, 4) };
//! pool.dispatch(ObjectId::named("tile"), Request::ReadRegion(region))?;
//!
//! let done: Vec<Completion> = pool.wait(Duration::from_secs(5));
//! assert_eq!(done.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::error::{Result, TileError};
use crate::request::{RasterizeTile, ReadRegion, Request};
use crate::types::{ObjectId, TileImage};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Reads rectangles from an opened slide.
///
/// Each reader thread owns one instance, so implementations do not need to be
/// `Sync`.
pub trait RegionReader: Send {
    fn read_region(&mut self, region: &ReadRegion) -> Result<TileImage>;
}

/// Turns a [`RasterizeTile`] request into an image.
pub trait Rasterizer: Send {
    fn rasterize(&mut self, request: &RasterizeTile) -> Result<TileImage>;
}

/// A finished artifact together with the request that produced it.
#[derive(Debug, Clone)]
pub struct Completion {
    pub id: ObjectId,
    pub request: Request,
    pub artifact: Arc<TileImage>,
}

/// Outstanding job counters: one slot per reader, the last for the rasterizer.
type LoadTable = Arc<Mutex<Vec<usize>>>;

pub struct WorkerPool {
    readers: Vec<Sender<(ObjectId, ReadRegion)>>,
    rasterizer: Option<Sender<(ObjectId, RasterizeTile)>>,
    load: LoadTable,
    completions: Receiver<Completion>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.reader_workers` reader threads and one rasterizer
    /// thread.
    ///
    /// `open_reader` is called once per reader thread with the worker index.
    pub fn new<F, R, Z>(config: &Config, mut open_reader: F, rasterizer: Z) -> Result<Self>
    where
        F: FnMut(usize) -> Result<R>,
        R: RegionReader + 'static,
        Z: Rasterizer + 'static,
    {
        if config.reader_workers == 0 {
            return Err(TileError::InvalidConfig(
                "Reader worker count must be greater than zero".into(),
            ));
        }

        let workers = config.reader_workers;
        let load: LoadTable = Arc::new(Mutex::new(vec![0; workers + 1]));
        let (done_tx, completions) = mpsc::channel();
        let mut readers = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers + 1);

        for slot in 0..workers {
            let reader = open_reader(slot)?;
            let (tx, rx) = mpsc::channel();
            let handle = thread::Builder::new()
                .name(format!("pathtile-reader-{}", slot))
                .spawn({
                    let done = done_tx.clone();
                    let load = Arc::clone(&load);
                    move || run_reader(slot, reader, rx, done, load)
                })?;
            readers.push(tx);
            handles.push(handle);
        }

        let (raster_tx, raster_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("pathtile-rasterizer".to_string())
            .spawn({
                let load = Arc::clone(&load);
                move || run_rasterizer(workers, rasterizer, raster_rx, done_tx, load)
            })?;
        handles.push(handle);

        log::debug!("Started worker pool with {} reader threads", workers);

        Ok(Self {
            readers,
            rasterizer: Some(raster_tx),
            load,
            completions,
            handles,
        })
    }

    /// Queue `request` for production.
    ///
    /// Region reads go to the least loaded reader (lowest index on ties),
    /// rasterization to the rasterizer thread.
    pub fn dispatch(&self, id: ObjectId, request: Request) -> Result<()> {
        match request {
            Request::ReadRegion(region) => {
                let slot = {
                    let mut load = self.load.lock();
                    let slot = load[..self.readers.len()]
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, jobs)| **jobs)
                        .map(|(slot, _)| slot)
                        .ok_or(TileError::WorkerUnavailable)?;
                    load[slot] += 1;
                    slot
                };
                log::trace!("Dispatching region read {} to reader {}", id, slot);
                if self.readers[slot].send((id, region)).is_err() {
                    self.load.lock()[slot] -= 1;
                    return Err(TileError::WorkerUnavailable);
                }
            }
            Request::RasterizeTile(tile) => {
                let sender = self.rasterizer.as_ref().ok_or(TileError::WorkerUnavailable)?;
                let slot = self.readers.len();
                self.load.lock()[slot] += 1;
                if sender.send((id, tile)).is_err() {
                    self.load.lock()[slot] -= 1;
                    return Err(TileError::WorkerUnavailable);
                }
            }
        }
        Ok(())
    }

    /// Completions finished so far. Never blocks.
    pub fn drain(&self) -> Vec<Completion> {
        self.completions.try_iter().collect()
    }

    /// Block until at least one completion arrives or `timeout` elapses, then
    /// return everything finished so far.
    pub fn wait(&self, timeout: Duration) -> Vec<Completion> {
        let mut done = Vec::new();
        match self.completions.recv_timeout(timeout) {
            Ok(completion) => done.push(completion),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return done,
        }
        done.extend(self.completions.try_iter());
        done
    }

    /// Block until `count` completions arrived or `timeout` elapses.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Completion> {
        let deadline = Instant::now() + timeout;
        let mut done = Vec::with_capacity(count);
        while done.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.completions.recv_timeout(remaining) {
                Ok(completion) => done.push(completion),
                Err(_) => break,
            }
        }
        done
    }

    /// Jobs queued or running across all threads.
    pub fn outstanding(&self) -> usize {
        self.load.lock().iter().sum()
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.readers.clear();
        self.rasterizer = None;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::warn!("A worker thread panicked");
            }
        }
    }
}

fn run_reader<R: RegionReader>(
    slot: usize,
    mut reader: R,
    jobs: Receiver<(ObjectId, ReadRegion)>,
    done: Sender<Completion>,
    load: LoadTable,
) {
    while let Ok((id, region)) = jobs.recv() {
        let result = reader.read_region(&region);
        load.lock()[slot] -= 1;

        match result {
            Ok(image) => {
                let completion = Completion {
                    id,
                    request: Request::ReadRegion(region),
                    artifact: Arc::new(image),
                };
                if done.send(completion).is_err() {
                    break;
                }
            }
            Err(e) => log::warn!("Reader {} failed to read {:?}: {}", slot, region, e),
        }
    }
    log::trace!("Reader {} shutting down", slot);
}

fn run_rasterizer<Z: Rasterizer>(
    slot: usize,
    mut rasterizer: Z,
    jobs: Receiver<(ObjectId, RasterizeTile)>,
    done: Sender<Completion>,
    load: LoadTable,
) {
    while let Ok((id, tile)) = jobs.recv() {
        let result = rasterizer.rasterize(&tile);
        load.lock()[slot] -= 1;

        match result {
            Ok(image) => {
                let completion = Completion {
                    id,
                    request: Request::RasterizeTile(tile),
                    artifact: Arc::new(image),
                };
                if done.send(completion).is_err() {
                    break;
                }
            }
            Err(e) => log::warn!("Failed to rasterize tile {}: {}", id, e),
        }
    }
    log::trace!("Rasterizer shutting down");
}
