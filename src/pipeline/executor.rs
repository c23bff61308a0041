use crate::error::{AppError, Result};
use crate::pipeline::event::LogEvent;
use crate::pipeline::filters::{Filter, RawConfig};
use crate::pipeline::registry::FilterRegistry;
use crate::pipeline::{PipelineReceiver, PipelineSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

/// Counters reported when a stage stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub received: u64,
    pub emitted: u64,
}

/// Runs every input event through the filter chain and publishes the results
pub struct FilterStage {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterStage {
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self { filters }
    }

    pub fn from_config(
        registry: &FilterRegistry,
        ctx: &CancellationToken,
        raws: &[RawConfig],
    ) -> Result<Self> {
        let filters = registry.build_chain(ctx, raws)?;
        Ok(Self::new(filters))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run one event through the whole chain.
    ///
    /// Each filter sees every event produced by the previous one, in order.
    /// The common transform is applied only to output of a successful call.
    pub async fn process_event(&mut self, ctx: &CancellationToken, event: LogEvent) -> Vec<LogEvent> {
        let mut events = vec![event];

        for (idx, filter) in self.filters.iter_mut().enumerate() {
            let mut next_events = Vec::with_capacity(events.len());

            for event in events {
                let output = filter.event(ctx, event).await;

                if output.is_ok() {
                    if filter.common().is_configured() {
                        next_events.extend(
                            output.events.into_iter().map(|evt| filter.common_filter(ctx, evt)),
                        );
                    } else {
                        next_events.extend(output.events);
                    }
                } else {
                    debug!("Filter {} ({}) reported a soft failure", idx, filter.type_name());
                    next_events.extend(output.events);
                }
            }

            trace!("Filter {} ({}) produced {} events", idx, filter.type_name(), next_events.len());
            events = next_events;
        }

        events
    }

    /// Consume `input` until it is closed or `ctx` is cancelled.
    ///
    /// On cancellation the input channel is closed to new sends and every
    /// event already buffered is still processed before returning.
    pub async fn run(
        mut self,
        ctx: CancellationToken,
        mut input: PipelineReceiver,
        output: PipelineSender,
    ) -> Result<StageStats> {
        info!("Filter stage started with {} filters", self.filters.len());

        let mut stats = StageStats::default();

        loop {
            tokio::select! {
                biased;

                _ = ctx.cancelled() => {
                    input.close();
                    debug!("Cancellation received, draining buffered events");

                    while let Some(event) = input.recv().await {
                        self.handle(&ctx, event, &output, &mut stats).await?;
                    }
                    break;
                }

                received = input.recv() => match received {
                    Some(event) => self.handle(&ctx, event, &output, &mut stats).await?,
                    None => {
                        debug!("Input channel closed");
                        break;
                    }
                },
            }
        }

        info!(
            "Filter stage stopped: {} events received, {} emitted",
            stats.received, stats.emitted
        );

        Ok(stats)
    }

    /// Run the stage on its own task
    pub fn spawn(
        self,
        ctx: CancellationToken,
        input: PipelineReceiver,
        output: PipelineSender,
    ) -> JoinHandle<Result<StageStats>> {
        tokio::spawn(self.run(ctx, input, output))
    }

    async fn handle(
        &mut self,
        ctx: &CancellationToken,
        event: LogEvent,
        output: &PipelineSender,
        stats: &mut StageStats,
    ) -> Result<()> {
        stats.received += 1;

        for event in self.process_event(ctx, event).await {
            output.send(event).await.map_err(|_| {
                error!("Output channel closed, stopping filter stage");
                AppError::PipelineSend
            })?;
            stats.emitted += 1;
        }

        Ok(())
    }
}
