//! Runtime abstraction for background tile work
//!
//! Fetching and rasterizing run through a [`TileSpawner`] so the cache does not
//! depend on a particular executor. Jobs are blocking closures: they read from
//! the tile store and may wait on the bounded upload queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A unit of background work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run blocking jobs off the render thread
pub trait TileSpawner: Send + Sync + 'static {
    fn spawn_job(&self, job: Job) -> Box<dyn JobHandle>;
}

/// Handle to a spawned job
pub trait JobHandle: Send + Sync {
    fn is_finished(&self) -> bool;
}

/// Convenience wrapper over [`TileSpawner::spawn_job`]
pub fn spawn_on<F>(spawner: &dyn TileSpawner, job: F) -> Box<dyn JobHandle>
where
    F: FnOnce() + Send + 'static,
{
    spawner.spawn_job(Box::new(job))
}

pub mod spawners {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    pub mod tokio_impl {
        use super::*;
        use ::tokio::runtime::Handle;
        use ::tokio::task::JoinHandle;

        /// Runs jobs on tokio's blocking pool
        #[derive(Debug, Clone)]
        pub struct TokioSpawner {
            handle: Handle,
        }

        impl TokioSpawner {
            pub fn new(handle: Handle) -> Self {
                Self { handle }
            }

            /// Uses the runtime of the calling context, if any
            pub fn current() -> Option<Self> {
                Handle::try_current().ok().map(Self::new)
            }
        }

        impl TileSpawner for TokioSpawner {
            fn spawn_job(&self, job: Job) -> Box<dyn JobHandle> {
                Box::new(TokioHandle(self.handle.spawn_blocking(job)))
            }
        }

        struct TokioHandle(JoinHandle<()>);

        impl JobHandle for TokioHandle {
            fn is_finished(&self) -> bool {
                self.0.is_finished()
            }
        }
    }

    /// One OS thread per job
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ThreadSpawner;

    impl TileSpawner for ThreadSpawner {
        fn spawn_job(&self, job: Job) -> Box<dyn JobHandle> {
            let finished = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&finished);
            let spawned = std::thread::Builder::new()
                .name("movingmap-tile".into())
                .spawn(move || {
                    job();
                    flag.store(true, Ordering::Release);
                });
            if let Err(e) = spawned {
                log::error!("failed to spawn tile worker: {}", e);
                finished.store(true, Ordering::Release);
            }
            Box::new(FlagHandle(finished))
        }
    }

    /// Runs each job to completion on the calling thread.
    ///
    /// Meant for tests and tools. Producers block on a full upload queue, so the
    /// queue must have room for every job issued between drains.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct InlineSpawner;

    impl TileSpawner for InlineSpawner {
        fn spawn_job(&self, job: Job) -> Box<dyn JobHandle> {
            job();
            Box::new(FlagHandle(Arc::new(AtomicBool::new(true))))
        }
    }

    struct FlagHandle(Arc<AtomicBool>);

    impl JobHandle for FlagHandle {
        fn is_finished(&self) -> bool {
            self.0.load(Ordering::Acquire)
        }
    }
}

pub use spawners::{InlineSpawner, ThreadSpawner};
#[cfg(feature = "tokio-runtime")]
pub use spawners::tokio_impl::TokioSpawner;

/// The spawner used when none is supplied: the ambient tokio runtime when there
/// is one, plain threads otherwise
pub fn default_spawner() -> Arc<dyn TileSpawner> {
    #[cfg(feature = "tokio-runtime")]
    {
        if let Some(spawner) = TokioSpawner::current() {
            return Arc::new(spawner);
        }
    }
    Arc::new(ThreadSpawner)
}
