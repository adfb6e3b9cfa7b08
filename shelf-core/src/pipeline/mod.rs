//! Composable scan pipeline.
//!
//! A stage is a lazy, cancellable transformation of an item stream. Stages are
//! chained left-to-right with [`Pipeline::from`] and [`Pipeline::then`]; nothing
//! runs until the consumer polls the final stream, so a slow consumer stalls
//! production instead of buffering without bound.

pub mod checkpoint;
pub mod context;
pub mod work_item;

use std::fmt;
use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

pub use checkpoint::{
    CHECKPOINT_VERSION, ScanCheckpoint, StageCursor, TraversalCursor,
};
pub use context::ScanContext;
pub use work_item::ScanWorkItem;

/// Boxed item stream flowing between stages.
pub type ItemStream<T> = BoxStream<'static, T>;

/// One step of the scan pipeline.
///
/// Implementations must check `cancel` at every yield point and stop
/// promptly once it fires. Per-entry failures are logged inside the stage and
/// never surface as stream errors.
pub trait Stage<In, Out>: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(
        &self,
        input: ItemStream<In>,
        ctx: Arc<ScanContext>,
        cancel: CancellationToken,
    ) -> ItemStream<Out>;
}

/// Left-to-right builder over [`Stage`]s sharing one context and cancel signal.
pub struct Pipeline<T> {
    stream: ItemStream<T>,
    ctx: Arc<ScanContext>,
    cancel: CancellationToken,
    stages: Vec<&'static str>,
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("scan_id", &self.ctx.scan_id())
            .field("stages", &self.stages)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl<T: Send + 'static> Pipeline<T> {
    pub fn from(
        seed: ItemStream<T>,
        ctx: Arc<ScanContext>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream: seed,
            ctx,
            cancel,
            stages: Vec::new(),
        }
    }

    /// Seed the pipeline from an in-memory collection.
    pub fn from_iter<I>(
        seed: I,
        ctx: Arc<ScanContext>,
        cancel: CancellationToken,
    ) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::from(futures::stream::iter(seed).boxed(), ctx, cancel)
    }

    pub fn then<U, S>(self, stage: S) -> Pipeline<U>
    where
        U: Send + 'static,
        S: Stage<T, U>,
    {
        let Pipeline {
            stream,
            ctx,
            cancel,
            mut stages,
        } = self;
        stages.push(stage.name());
        let stream = stage.apply(stream, Arc::clone(&ctx), cancel.clone());
        Pipeline {
            stream,
            ctx,
            cancel,
            stages,
        }
    }

    pub fn stage_names(&self) -> &[&'static str] {
        &self.stages
    }

    pub fn context(&self) -> &Arc<ScanContext> {
        &self.ctx
    }

    /// Materialize the pipeline. The returned stream ends early once the
    /// cancel signal fires.
    pub fn into_stream(self) -> ItemStream<T> {
        let cancel = self.cancel;
        self.stream
            .take_until(async move { cancel.cancelled_owned().await })
            .boxed()
    }
}
