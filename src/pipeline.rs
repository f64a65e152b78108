//! Pipeline driver.
//!
//! The engine never sees the bundler type, only a `BundleProducer` registered
//! as its input stage. `Pipeline::exec` pulls bundles until the producer reports
//! end-of-stream and hands each one to a `PoseEngine`.
//!
//! With the input on its own thread, bundles cross a bounded channel so a slow
//! engine applies back-pressure to acquisition instead of buffering frames.

use anyhow::{anyhow, Context, Result};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bundler::{Pull, StopReason};
use crate::config::EngineConfig;
use crate::frame::FrameBundle;

const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Input stage of the engine.
pub trait BundleProducer: Send + Sync {
    fn name(&self) -> &str;

    /// Next bundle, or the end of the stream. Never panics across the call.
    fn produce(&self) -> Pull;

    /// Ask the producer to stop; later `produce()` calls return `EndOfStream`.
    fn stop(&self);
}

/// Consumer of frame bundles.
pub trait PoseEngine: Send {
    fn name(&self) -> &str;

    fn configure(&mut self, _config: &EngineConfig) -> Result<()> {
        Ok(())
    }

    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    fn submit(&mut self, bundle: FrameBundle) -> Result<ProcessedBundle>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedBundle {
    pub sequence: u64,
    pub views: usize,
    pub people_per_view: Vec<usize>,
}

// ----------------------------------------------------------------------------
// StubEngine
// ----------------------------------------------------------------------------

/// Engine stand-in that checks bundle shape and counts what it saw.
///
/// It detects nobody, so `people_per_view` is all zeros.
#[derive(Debug, Default)]
pub struct StubEngine {
    expected_views: Option<usize>,
    require_calibration: bool,
    processed: u64,
    last_sequence: Option<u64>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every datum must report `sub_index_max == views - 1`.
    pub fn with_views(mut self, views: usize) -> Self {
        self.expected_views = Some(views);
        self
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    fn check(&self, bundle: &FrameBundle) -> Result<()> {
        if bundle.is_empty() {
            return Err(anyhow!("bundle {} has no datums", bundle.sequence()));
        }
        if let Some(last) = self.last_sequence {
            if bundle.sequence() <= last {
                return Err(anyhow!(
                    "bundle {} arrived after bundle {}",
                    bundle.sequence(),
                    last
                ));
            }
        }

        let sub_index_max = bundle.datums()[0].sub_index_max;
        if let Some(views) = self.expected_views {
            if sub_index_max + 1 != views {
                return Err(anyhow!(
                    "bundle {} reports {} views, expected {}",
                    bundle.sequence(),
                    sub_index_max + 1,
                    views
                ));
            }
        }
        let whole_round = bundle.len() > 1;
        for (position, datum) in bundle.iter().enumerate() {
            if datum.sub_index > datum.sub_index_max || datum.sub_index_max != sub_index_max {
                return Err(anyhow!(
                    "bundle {}: {} has sub index {}/{}",
                    bundle.sequence(),
                    datum.camera,
                    datum.sub_index,
                    datum.sub_index_max
                ));
            }
            if whole_round && datum.sub_index != position {
                return Err(anyhow!(
                    "bundle {}: datum {} out of order",
                    bundle.sequence(),
                    position
                ));
            }
            if datum.frame.is_empty() {
                return Err(anyhow!(
                    "bundle {}: {} has an empty frame",
                    bundle.sequence(),
                    datum.camera
                ));
            }
            if self.require_calibration && datum.calibration.is_none() {
                return Err(anyhow!(
                    "bundle {}: {} has no calibration in 3-D mode",
                    bundle.sequence(),
                    datum.camera
                ));
            }
        }
        Ok(())
    }
}

impl PoseEngine for StubEngine {
    fn name(&self) -> &str {
        "stub_engine"
    }

    fn configure(&mut self, config: &EngineConfig) -> Result<()> {
        self.require_calibration = config.extra.reconstruct_3d;
        Ok(())
    }

    fn submit(&mut self, bundle: FrameBundle) -> Result<ProcessedBundle> {
        self.check(&bundle)?;
        self.processed += 1;
        self.last_sequence = Some(bundle.sequence());
        Ok(ProcessedBundle {
            sequence: bundle.sequence(),
            views: bundle.len(),
            people_per_view: vec![0; bundle.len()],
        })
    }
}

// ----------------------------------------------------------------------------
// Pipeline
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub bundles: u64,
    pub datums: u64,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

impl RunSummary {
    /// False when the input stopped because acquisition failed.
    pub fn is_clean(&self) -> bool {
        !self.stop_reason.is_failure()
    }
}

struct InputStage {
    producer: Arc<dyn BundleProducer>,
    on_new_thread: bool,
}

pub struct Pipeline {
    input: Option<InputStage>,
    config: Option<EngineConfig>,
    multi_thread: bool,
    queue_capacity: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            input: None,
            config: None,
            multi_thread: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Registers the input stage, replacing any earlier one.
    pub fn set_input(&mut self, producer: Arc<dyn BundleProducer>, on_new_thread: bool) {
        log::debug!(
            "Pipeline: input stage {} (own thread: {})",
            producer.name(),
            on_new_thread
        );
        self.input = Some(InputStage {
            producer,
            on_new_thread,
        });
    }

    pub fn configure(&mut self, config: EngineConfig) {
        if !config.multi_thread {
            self.multi_thread = false;
        }
        self.config = Some(config);
    }

    /// Runs the input stage on the calling thread.
    pub fn disable_multi_thread(&mut self) {
        self.multi_thread = false;
    }

    /// Bundles buffered between a threaded input stage and the engine.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Blocks until the input stage ends or the engine fails.
    pub fn exec(&mut self, engine: &mut dyn PoseEngine) -> Result<RunSummary> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| anyhow!("no input stage registered"))?;
        let producer = Arc::clone(&input.producer);

        if let Some(config) = &self.config {
            engine
                .configure(config)
                .with_context(|| format!("failed to configure {}", engine.name()))?;
        }
        engine
            .warm_up()
            .with_context(|| format!("{} failed to warm up", engine.name()))?;

        let start = Instant::now();
        let threaded = input.on_new_thread && self.multi_thread;
        log::info!(
            "Pipeline: running {} -> {} ({})",
            producer.name(),
            engine.name(),
            if threaded { "input thread" } else { "single thread" }
        );

        let mut counts = Counts::default();
        let stop_reason = if threaded {
            run_threaded(producer, engine, self.queue_capacity, &mut counts)?
        } else {
            run_inline(producer.as_ref(), engine, &mut counts)?
        };

        let summary = RunSummary {
            bundles: counts.bundles,
            datums: counts.datums,
            stop_reason,
            elapsed: start.elapsed(),
        };
        log::info!(
            "Pipeline: {} bundles ({} datums) in {:.2}s, input {}",
            summary.bundles,
            summary.datums,
            summary.elapsed.as_secs_f64(),
            summary.stop_reason
        );
        Ok(summary)
    }
}

#[derive(Default)]
struct Counts {
    bundles: u64,
    datums: u64,
}

impl Counts {
    fn submit(&mut self, engine: &mut dyn PoseEngine, bundle: FrameBundle) -> Result<()> {
        let sequence = bundle.sequence();
        let processed = engine
            .submit(bundle)
            .with_context(|| format!("{} rejected bundle {}", engine.name(), sequence))?;
        self.bundles += 1;
        self.datums += processed.views as u64;
        log::trace!(
            "bundle {}: {} views, people {:?}",
            processed.sequence,
            processed.views,
            processed.people_per_view
        );
        Ok(())
    }
}

fn run_inline(
    producer: &dyn BundleProducer,
    engine: &mut dyn PoseEngine,
    counts: &mut Counts,
) -> Result<StopReason> {
    loop {
        match producer.produce() {
            Pull::Bundle(bundle) => {
                if let Err(err) = counts.submit(engine, bundle) {
                    producer.stop();
                    return Err(err);
                }
            }
            Pull::EndOfStream(reason) => return Ok(reason),
        }
    }
}

fn run_threaded(
    producer: Arc<dyn BundleProducer>,
    engine: &mut dyn PoseEngine,
    capacity: usize,
    counts: &mut Counts,
) -> Result<StopReason> {
    let (tx, rx) = mpsc::sync_channel::<FrameBundle>(capacity);
    let worker = Arc::clone(&producer);
    let handle = std::thread::Builder::new()
        .name(format!("input:{}", producer.name()))
        .spawn(move || loop {
            match worker.produce() {
                Pull::Bundle(bundle) => {
                    if tx.send(bundle).is_err() {
                        worker.stop();
                        return StopReason::Requested;
                    }
                }
                Pull::EndOfStream(reason) => return reason,
            }
        })
        .context("failed to spawn input thread")?;

    let mut engine_error = None;
    for bundle in rx.iter() {
        if let Err(err) = counts.submit(engine, bundle) {
            producer.stop();
            engine_error = Some(err);
            break;
        }
    }
    drop(rx);

    let reason = handle
        .join()
        .map_err(|_| anyhow!("input thread panicked"))?;
    match engine_error {
        Some(err) => Err(err),
        None => Ok(reason),
    }
}
