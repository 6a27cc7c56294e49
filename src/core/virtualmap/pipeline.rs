// Copyright (c) 2026 Tributary
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! The lifecycle pipeline: ordered hashing, flushing and merging of
//! fast-copies with back-pressure.
//!
//! A single background worker owns the ordered copy list. Each pass walks
//! oldest to newest: the oldest eligible copy flushes unless an older copy
//! still blocks it; released or detached copies merge into an immutable
//! successor; finished copies leave the list. Hashing is serialized by one
//! lock and always drains older unhashed copies first, so digests are
//! computed in registration order no matter which thread asks.

use super::copy::VirtualRoot;
use super::{PipelineError, PipelineResult};
use crate::core::config::PipelineConfig;
use crate::monitoring::metrics::Metrics;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

enum Task<T> {
    Register(Arc<T>),
    Evaluate,
    Barrier {
        entered: Sender<()>,
        resume: Receiver<()>,
    },
    Terminate,
}

struct Shared<T: VirtualRoot> {
    copies: Mutex<Vec<Arc<T>>>,
    hash_lock: Mutex<()>,
    flush_backlog: AtomicU64,
    unreleased_copies: AtomicU64,
    terminated: AtomicBool,
    config: PipelineConfig,
    metrics: Option<Metrics>,
}

/// Lifecycle pipeline over fast-copies of type `T`.
pub struct VirtualPipeline<T: VirtualRoot> {
    shared: Arc<Shared<T>>,
    task_tx: Sender<Task<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: VirtualRoot> VirtualPipeline<T> {
    /// Start the pipeline with its background worker.
    pub fn new(config: PipelineConfig, metrics: Option<Metrics>) -> Self {
        let shared = Arc::new(Shared {
            copies: Mutex::new(Vec::new()),
            hash_lock: Mutex::new(()),
            flush_backlog: AtomicU64::new(0),
            unreleased_copies: AtomicU64::new(0),
            terminated: AtomicBool::new(false),
            config,
            metrics,
        });
        let (task_tx, task_rx) = unbounded::<Task<T>>();
        let worker_shared = shared.clone();
        let worker = std::thread::spawn(move || worker_loop(worker_shared, task_rx));
        Self {
            shared,
            task_tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Hand a copy to the pipeline. Blocks the caller for the back-pressure
    /// window once the flush backlog exceeds the preferred queue size.
    pub fn register_copy(&self, copy: Arc<T>) -> PipelineResult<()> {
        if self.shared.terminated.load(Ordering::Acquire) {
            return Err(PipelineError::Terminated);
        }
        if copy.should_be_flushed() {
            let backlog = self.shared.flush_backlog.fetch_add(1, Ordering::AcqRel) + 1;
            if let Some(m) = &self.shared.metrics {
                m.pipeline_flush_backlog.set(backlog as i64);
            }
        }
        self.shared.unreleased_copies.fetch_add(1, Ordering::AcqRel);
        self.task_tx
            .send(Task::Register(copy))
            .map_err(|_| PipelineError::Terminated)?;
        let sleep = self
            .shared
            .config
            .backpressure_for(self.shared.flush_backlog.load(Ordering::Acquire));
        if !sleep.is_zero() {
            debug!(?sleep, "back-pressure");
            std::thread::sleep(sleep);
        }
        Ok(())
    }

    /// Notify the pipeline that a copy was released by its owner.
    pub fn release_copy(&self, _copy: &Arc<T>) -> PipelineResult<()> {
        self.shared
            .unreleased_copies
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(1))
            })
            .ok();
        self.task_tx
            .send(Task::Evaluate)
            .map_err(|_| PipelineError::Terminated)
    }

    /// Compute the copy's digest, draining older unhashed copies first.
    /// Safe from any thread; idempotent.
    pub fn hash_copy(&self, copy: &Arc<T>) -> PipelineResult<()> {
        hash_in_order(&self.shared, copy)
    }

    /// Pause the worker, run `detach` on the calling thread, resume.
    ///
    /// No hash, flush or merge runs while `detach` executes.
    pub fn detach_copy<F, O>(&self, copy: &Arc<T>, detach: F) -> PipelineResult<O>
    where
        F: FnOnce(&T) -> O,
    {
        let (entered_tx, entered_rx) = bounded::<()>(1);
        let (resume_tx, resume_rx) = bounded::<()>(1);
        self.task_tx
            .send(Task::Barrier {
                entered: entered_tx,
                resume: resume_rx,
            })
            .map_err(|_| PipelineError::Terminated)?;
        entered_rx.recv().map_err(|_| PipelineError::Terminated)?;
        let out = detach(copy);
        let _ = resume_tx.send(());
        Ok(out)
    }

    /// Finish pending flush and merge work, then stop the worker.
    pub fn terminate(&self) {
        self.shared.terminated.store(true, Ordering::Release);
        let _ = self.task_tx.send(Task::Terminate);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    /// Copies awaiting flush.
    pub fn flush_backlog(&self) -> u64 {
        self.shared.flush_backlog.load(Ordering::Acquire)
    }

    /// Registered copies not yet released.
    pub fn unreleased_copies(&self) -> u64 {
        self.shared.unreleased_copies.load(Ordering::Acquire)
    }

    /// Copies currently in the list.
    pub fn len(&self) -> usize {
        self.shared.copies.lock().len()
    }

    /// True when no copy is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: VirtualRoot> Drop for VirtualPipeline<T> {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn worker_loop<T: VirtualRoot>(shared: Arc<Shared<T>>, task_rx: Receiver<Task<T>>) {
    loop {
        let task = match task_rx.recv() {
            Ok(task) => task,
            Err(_) => break,
        };
        match task {
            Task::Register(copy) => {
                let mut copies = shared.copies.lock();
                copies.push(copy);
                if let Some(m) = &shared.metrics {
                    m.pipeline_copies.set(copies.len() as i64);
                }
            }
            Task::Evaluate => {}
            Task::Barrier { entered, resume } => {
                let _ = entered.send(());
                let _ = resume.recv();
            }
            Task::Terminate => {
                if let Err(e) = run_until_quiescent(&shared) {
                    warn!(err = %e, "pipeline error during termination");
                    shutdown_now(&shared);
                }
                break;
            }
        }
        if let Err(e) = run_until_quiescent(&shared) {
            warn!(err = %e, "pipeline worker error, shutting down");
            shutdown_now(&shared);
            break;
        }
    }
}

fn run_until_quiescent<T: VirtualRoot>(shared: &Arc<Shared<T>>) -> PipelineResult<()> {
    while hash_flush_merge_pass(shared)? {}
    Ok(())
}

/// One oldest-to-newest pass. Returns whether anything happened.
fn hash_flush_merge_pass<T: VirtualRoot>(shared: &Arc<Shared<T>>) -> PipelineResult<bool> {
    let snapshot: Vec<Arc<T>> = shared.copies.lock().clone();
    let mut progress = false;
    let mut flush_blocked = false;
    for (i, copy) in snapshot.iter().enumerate() {
        let should_flush =
            copy.should_be_flushed() && copy.is_immutable() && !copy.is_flushed();
        if should_flush && !flush_blocked {
            hash_in_order(shared, copy)?;
            copy.flush()?;
            shared
                .flush_backlog
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                    Some(v.saturating_sub(1))
                })
                .ok();
            if let Some(m) = &shared.metrics {
                m.pipeline_flush_total.inc();
                m.pipeline_flush_backlog
                    .set(shared.flush_backlog.load(Ordering::Acquire) as i64);
            }
            progress = true;
        } else if copy.should_be_merged()
            && (copy.is_released() || copy.is_detached())
            && !copy.is_merged()
        {
            if let Some(next) = snapshot.get(i + 1) {
                if next.is_immutable() {
                    hash_in_order(shared, copy)?;
                    hash_in_order(shared, next)?;
                    copy.merge_into(next)?;
                    if let Some(m) = &shared.metrics {
                        m.pipeline_merge_total.inc();
                    }
                    progress = true;
                }
            }
        }
        flush_blocked = flush_blocked
            || !(copy.is_released() || copy.is_detached())
            || (copy.should_be_merged() && !copy.is_merged())
            || (copy.should_be_flushed() && !copy.is_flushed());
    }

    let mut copies = shared.copies.lock();
    let before = copies.len();
    copies.retain(|c| !(c.is_released() && (c.is_flushed() || c.is_merged())));
    if copies.len() != before {
        progress = true;
        if let Some(m) = &shared.metrics {
            m.pipeline_copies.set(copies.len() as i64);
        }
    }
    Ok(progress)
}

/// Serialize hashing through the global lock, draining older unhashed
/// copies in registration order before the target.
fn hash_in_order<T: VirtualRoot>(shared: &Arc<Shared<T>>, copy: &Arc<T>) -> PipelineResult<()> {
    let _guard = shared.hash_lock.lock();
    let snapshot: Vec<Arc<T>> = shared.copies.lock().clone();
    for candidate in &snapshot {
        if !candidate.is_hashed() {
            candidate.compute_hash()?;
            if let Some(m) = &shared.metrics {
                m.merkle_hash_total.inc();
            }
        }
        if Arc::ptr_eq(candidate, copy) {
            return Ok(());
        }
    }
    // Already removed from the list; hash it directly.
    if !copy.is_hashed() {
        copy.compute_hash()?;
        if let Some(m) = &shared.metrics {
            m.merkle_hash_total.inc();
        }
    }
    Ok(())
}

fn shutdown_now<T: VirtualRoot>(shared: &Arc<Shared<T>>) {
    shared.terminated.store(true, Ordering::Release);
    if let Some(newest) = shared.copies.lock().last() {
        newest.on_shutdown(true);
    }
}
