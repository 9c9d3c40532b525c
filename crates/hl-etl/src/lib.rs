//! The enrichment pipeline: eight ordered, idempotent stages that turn raw
//! hand JSON into the analytic store.
//!
//! Each stage opens its own connections, touches only rows whose target
//! columns are still null, and can therefore be re-run safely. The pipeline
//! holds the analytic write lock for the duration of a run; stages execute
//! strictly sequentially on the calling thread.
mod builder;
mod intention;
mod intentions;
mod joiner;
mod labels;
mod materialize;
mod preflop;
mod rules;
mod sizing;
mod strength;

pub mod situation;

pub use intentions::IntentionBook;
pub use materialize::rebuild as rebuild_summaries;
pub use rules::LabelRules;

use std::path::PathBuf;

/// Shared inputs for a pipeline run.
pub struct Context {
    /// Primary store (raw hands).
    pub poker_db: PathBuf,
    /// Analytic store.
    pub heavy_db: PathBuf,
    /// Prebuilt preflop reference database.
    pub ranges_db: PathBuf,
    /// Divide monetary amounts by the hand's chip value (NORMALIZE_CUR=Y).
    pub normalize_cur: bool,
    /// Rescale joined score columns onto 0-100 (driver `--normalize`).
    pub normalize_scores: bool,
    /// Action-label rule set.
    pub rules: rules::LabelRules,
    /// Intention mapping tree.
    pub intentions: intentions::IntentionBook,
}

impl Context {
    /// Loads rule and intention assets from `assets_dir` and captures the
    /// store paths. Missing assets degrade to built-in fallbacks.
    pub fn new(
        poker_db: PathBuf,
        heavy_db: PathBuf,
        ranges_db: PathBuf,
        assets_dir: &std::path::Path,
        normalize_cur: bool,
        normalize_scores: bool,
    ) -> Self {
        Self {
            poker_db,
            heavy_db,
            ranges_db,
            normalize_cur,
            normalize_scores,
            rules: rules::LabelRules::load(&assets_dir.join("action_rules.yml")),
            intentions: intentions::IntentionBook::load(&assets_dir.join("intentions")),
        }
    }
}

/// One transformation stage. Stages are composed behind this interface and
/// wired in order by [`Pipeline`].
pub trait Stage {
    /// Stable name used by `--skip-scripts`.
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &Context) -> anyhow::Result<()>;
}

/// The ordered stage sequence.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            stages: vec![
                Box::new(builder::HandBuilder),
                Box::new(preflop::PreflopMatcher),
                Box::new(sizing::SizingClassifier),
                Box::new(labels::ActionLabeler),
                Box::new(strength::HandStrengthScorer),
                Box::new(intention::IntentionMapper),
                Box::new(joiner::ScoreJoiner),
                Box::new(materialize::Materializer),
            ],
        }
    }
}

impl Pipeline {
    /// Runs every stage not named in `skip`, holding the analytic write
    /// lock. A stage failure aborts the run; raw rows committed by the
    /// driver stay in place and are re-derived on the next cycle.
    pub fn run(&self, ctx: &Context, skip: &[String]) -> anyhow::Result<()> {
        let _lock = hl_store::DbLock::acquire(&ctx.heavy_db)?;
        // opening ensures schema and indexes before the stages run
        hl_store::Analytic::open(&ctx.heavy_db)?;
        for stage in &self.stages {
            if skip.iter().any(|s| s == stage.name()) {
                log::info!("stage {} skipped", stage.name());
                continue;
            }
            let started = std::time::Instant::now();
            stage
                .run(ctx)
                .map_err(|e| e.context(format!("stage {} failed", stage.name())))?;
            log::info!(
                "stage {} done in {:.1}s",
                stage.name(),
                started.elapsed().as_secs_f32()
            );
        }
        Ok(())
    }
}
