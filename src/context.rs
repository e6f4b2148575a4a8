//! Execution context: tuning hints, the worker pool and scratch memory.
//!
//! A [`Context`] is built once and reused across GEMM calls. It decides the
//! kernel variant up front, so the hot path never re-examines the CPU.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::arch::{CoreKind, DefaultPolicy, KernelVariant, VariantPolicy};
use crate::buffer::AlignedBuffer;
use crate::driver::Dispatch;
use crate::error::{thread_pool_error, Result};

/// Where parallel loops run.
enum Workers {
    /// Everything on the calling thread.
    Serial,
    /// Rayon's global pool.
    Global,
    /// A pool owned by this context.
    Dedicated(ThreadPool),
}

/// Fork-join executor: a flat parallel-for with an implicit join.
pub struct Executor {
    threads: usize,
    workers: Workers,
}

impl Executor {
    pub fn serial() -> Self {
        Self {
            threads: 1,
            workers: Workers::Serial,
        }
    }

    /// Runs on rayon's global pool.
    pub fn global() -> Self {
        Self {
            threads: rayon::current_num_threads(),
            workers: Workers::Global,
        }
    }

    /// Builds a dedicated pool with `threads` workers; 1 means serial.
    pub fn with_threads(threads: usize) -> Result<Self> {
        if threads <= 1 {
            return Ok(Self::serial());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("packed-sgemm-{i}"))
            .build()
            .map_err(|e| thread_pool_error(threads, e.to_string()))?;
        Ok(Self {
            threads,
            workers: Workers::Dedicated(pool),
        })
    }

    #[inline(always)]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Calls `f(i)` for every `i` in `0..count`, returning once all are done.
    pub fn for_each_index<F>(&self, count: usize, f: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        match &self.workers {
            Workers::Serial => (0..count).for_each(f),
            Workers::Global => (0..count).into_par_iter().for_each(f),
            Workers::Dedicated(pool) => pool.install(|| (0..count).into_par_iter().for_each(f)),
        }
    }

    /// Calls `f(i, chunk)` for each `chunk_len`-sized chunk of `data`.
    pub fn for_each_chunk<F>(&self, data: &mut [f32], chunk_len: usize, f: F)
    where
        F: Fn(usize, &mut [f32]) + Send + Sync,
    {
        if chunk_len == 0 || data.is_empty() {
            return;
        }
        let run = |(i, chunk): (usize, &mut [f32])| f(i, chunk);
        match &self.workers {
            Workers::Serial => data.chunks_mut(chunk_len).enumerate().for_each(run),
            Workers::Global => data.par_chunks_mut(chunk_len).enumerate().for_each(run),
            Workers::Dedicated(pool) => {
                pool.install(|| data.par_chunks_mut(chunk_len).enumerate().for_each(run))
            }
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.workers {
            Workers::Serial => "serial",
            Workers::Global => "global",
            Workers::Dedicated(_) => "dedicated",
        };
        f.debug_struct("Executor")
            .field("threads", &self.threads)
            .field("workers", &kind)
            .finish()
    }
}

/// Aligned scratch memory that grows on demand and is never shrunk.
#[derive(Debug)]
pub(crate) struct Workspace {
    buffer: AlignedBuffer,
}

impl Workspace {
    pub(crate) fn with_capacity(len: usize) -> Result<Self> {
        Ok(Self {
            buffer: AlignedBuffer::zeroed(len)?,
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// The first `len` floats, reallocating when the buffer is too small.
    pub(crate) fn reserve(&mut self, len: usize) -> Result<&mut [f32]> {
        if self.capacity() < len {
            log::debug!("growing workspace from {} to {len} floats", self.capacity());
            self.buffer = AlignedBuffer::zeroed(len)?;
        }
        Ok(&mut self.buffer.as_mut_slice()[..len])
    }
}

/// L2 cache size of cpu0 from Linux sysfs, in bytes.
#[cfg(target_os = "linux")]
fn detect_l2_size() -> Option<usize> {
    for idx in 0..8 {
        let base = format!("/sys/devices/system/cpu/cpu0/cache/index{idx}");
        let Ok(level) = std::fs::read_to_string(format!("{base}/level")) else {
            continue;
        };
        if level.trim() != "2" {
            continue;
        }
        let Ok(size) = std::fs::read_to_string(format!("{base}/size")) else {
            continue;
        };
        return parse_cache_size(&size);
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn detect_l2_size() -> Option<usize> {
    None
}

/// Parses sysfs sizes such as `512K`, `2M` or `1048576`.
fn parse_cache_size(text: &str) -> Option<usize> {
    let text = text.trim();
    if let Some(kb) = text.strip_suffix('K') {
        kb.parse::<usize>().ok().map(|v| v * 1024)
    } else if let Some(mb) = text.strip_suffix('M') {
        mb.parse::<usize>().ok().map(|v| v * 1024 * 1024)
    } else {
        text.parse().ok()
    }
}

/// Reusable execution context for packing and GEMM calls.
///
/// Holds the cache-size hint, the selected kernel variant, the worker pool and
/// a scratch workspace. A context is used by one GEMM call at a time
/// (`&mut self`); packed A buffers are independent of it and can be shared.
#[derive(Debug)]
pub struct Context {
    pub(crate) core: CoreKind,
    pub(crate) variant: KernelVariant,
    pub(crate) cache_size: usize,
    pub(crate) executor: Executor,
    pub(crate) workspace: Workspace,
    pub(crate) dispatch: Dispatch,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// A context with every setting detected from the running machine.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// L2 size in bytes used for blocking; 0 means unknown.
    #[inline(always)]
    pub fn cache_size_hint(&self) -> usize {
        self.cache_size
    }

    #[inline(always)]
    pub fn thread_count(&self) -> usize {
        self.executor.threads()
    }

    #[inline(always)]
    pub fn variant(&self) -> KernelVariant {
        self.variant
    }

    #[inline(always)]
    pub fn core(&self) -> CoreKind {
        self.core
    }

    /// Scratch memory of at least `len` floats, 16-byte aligned.
    ///
    /// GEMM calls overwrite it freely; its contents are undefined between
    /// calls.
    pub fn scratch_workspace(&mut self, len: usize) -> Result<&mut [f32]> {
        self.workspace.reserve(len)
    }
}

/// Configures a [`Context`].
///
/// ```
/// use packed_sgemm::{Context, KernelVariant};
///
/// let ctx = Context::builder()
///     .threads(2)
///     .cache_size(1 << 20)
///     .variant(KernelVariant::Tile6x8)
///     .build()
///     .unwrap();
/// assert_eq!(ctx.thread_count(), 2);
/// assert_eq!(ctx.variant(), KernelVariant::Tile6x8);
/// ```
#[derive(Default)]
pub struct ContextBuilder {
    threads: Option<usize>,
    cache_size: Option<usize>,
    variant: Option<KernelVariant>,
    policy: Option<Box<dyn VariantPolicy>>,
    workspace: usize,
}

impl ContextBuilder {
    /// Worker threads; 1 runs everything on the caller's thread. Defaults to
    /// rayon's global pool.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// L2 size in bytes. Defaults to the size reported by the OS, or 0.
    pub fn cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = Some(bytes);
        self
    }

    /// Forces a kernel variant, bypassing the policy.
    pub fn variant(mut self, variant: KernelVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    /// Policy used to pick the variant from the detected core.
    pub fn policy(mut self, policy: impl VariantPolicy + 'static) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    /// Floats to allocate for the workspace up front.
    pub fn workspace(mut self, floats: usize) -> Self {
        self.workspace = floats;
        self
    }

    pub fn build(self) -> Result<Context> {
        let core = CoreKind::detect();
        let variant = match (self.variant, &self.policy) {
            (Some(variant), _) => variant,
            (None, Some(policy)) => policy.select(core),
            (None, None) => DefaultPolicy::default().select(core),
        };

        let cache_size = match self.cache_size {
            Some(bytes) => bytes,
            None => detect_l2_size().unwrap_or_else(|| {
                log::warn!("could not read the L2 cache size, blocking falls back to 512 KiB");
                0
            }),
        };

        let executor = match self.threads {
            Some(threads) => Executor::with_threads(threads)?,
            None => Executor::global(),
        };

        log::debug!(
            "context: core {core:?}, variant {variant}, {} threads, L2 hint {cache_size} bytes",
            executor.threads()
        );

        Ok(Context {
            core,
            variant,
            cache_size,
            executor,
            workspace: Workspace::with_capacity(self.workspace)?,
            dispatch: Dispatch::for_variant(variant),
        })
    }
}
