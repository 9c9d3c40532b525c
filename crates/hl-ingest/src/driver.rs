//! The ingestion driver: per-date scraping loop with batching, validation,
//! deduplication, batch commit, and pipeline invocation.
//!
//! Single process, cooperative: everything runs on this thread, which
//! keeps the embedded stores single-writer. The interrupt flag is honored
//! at batch boundaries and between dates; a finished day advances the
//! cursor, a failed one is retried on the next cycle.
use chrono::NaiveDate;

use hl_core::Config;
use hl_core::Credentials;
use hl_core::Paths;
use hl_store::HandRow;
use hl_store::MetaRow;
use hl_store::Primary;
use hl_upstream::Record;
use hl_upstream::Session;

use crate::cli::Cli;

/// Ingest-validation: non-empty id, non-empty blinds, and exactly one of
/// `is_cash` / `is_mtt`. Returns the rejection reason for the log.
pub fn validate(record: &Record) -> Result<(), &'static str> {
    if record.id().map(str::is_empty).unwrap_or(true) {
        return Err("missing hand id");
    }
    if record.blinds_raw().is_none() {
        return Err("missing blinds");
    }
    if record.is_cash() == record.is_mtt() {
        return Err("not exactly one of cash/MTT");
    }
    Ok(())
}

/// Counters for one scraped date.
#[derive(Debug, Default)]
pub struct DayStats {
    pub inserted: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub batches: usize,
}

/// One hand buffered for the next batch commit.
struct Buffered {
    hand: HandRow,
    meta: MetaRow,
    partial: Option<(String, String)>,
}

fn buffer(record: &Record, date: &str, seq: i64) -> Buffered {
    let id = record.id().expect("validated").to_string();
    // meta dates come from the id, which is prefixed with the hand's day
    let meta_date = id.get(..10).unwrap_or(&id).to_string();
    let partial = record
        .partial_scores()
        .map(|scores| (id.clone(), serde_json::Value::Object(scores.clone()).to_string()));
    Buffered {
        hand: HandRow {
            id: id.clone(),
            hand_date: date.to_string(),
            seq,
            raw_json: record.to_json(),
            chip_value: record.chip_value(),
        },
        meta: MetaRow {
            id,
            hand_date: meta_date,
            is_cash: record.is_cash(),
            is_mtt: record.is_mtt(),
            blinds_bb: record.blinds_bb(),
            pot_type: record.pot_type(),
            eff_stack_bb: record.effective_stack(),
            chip_bb: record.chip_value(),
            has_partial_scores: record.partial_scores().is_some(),
        },
        partial,
    }
}

/// Commits a buffered batch into the primary store and runs the pipeline.
/// Raw rows stay committed even when a stage fails; they are safe to
/// re-derive on the retry cycle.
fn commit_batch(
    primary: &mut Primary,
    buffered: &mut Vec<Buffered>,
    stats: &mut DayStats,
    pipeline: &hl_etl::Pipeline,
    ctx: &hl_etl::Context,
    args: &Cli,
) -> anyhow::Result<()> {
    if buffered.is_empty() {
        return Ok(());
    }
    let hands: Vec<HandRow> = buffered.iter().map(|b| b.hand.clone()).collect();
    let metas: Vec<MetaRow> = buffered.iter().map(|b| b.meta.clone()).collect();
    let inserted = primary.insert_hands(&hands)?;
    stats.duplicates += hands.len() - inserted;
    stats.inserted += inserted;
    primary.insert_meta(&metas)?;
    let partials: Vec<(String, String)> =
        buffered.iter().filter_map(|b| b.partial.clone()).collect();
    primary.insert_partial_scores(&partials)?;
    stats.batches += 1;
    log::info!(
        "batch {}: {} hands committed ({} total)",
        stats.batches,
        inserted,
        stats.inserted
    );
    buffered.clear();
    if !args.no_scripts {
        pipeline.run(ctx, &args.skip_scripts)?;
    }
    Ok(())
}

/// Scrapes one date into the primary store, batch by batch.
fn scrape_date(
    session: &Session,
    cfg: &Config,
    primary: &mut Primary,
    pipeline: &hl_etl::Pipeline,
    ctx: &hl_etl::Context,
    args: &Cli,
    date: &str,
) -> anyhow::Result<DayStats> {
    let mut stats = DayStats::default();
    let mut buffered: Vec<Buffered> = Vec::new();
    for (seq, record) in session.iter_hands(date) {
        if hl_core::interrupted() {
            break;
        }
        if let Err(reason) = validate(&record) {
            stats.invalid += 1;
            log::warn!(
                "invalid hand {}: {}",
                record.id().unwrap_or("<no id>"),
                reason
            );
            continue;
        }
        let id = record.id().expect("validated");
        if primary.exists(id)? {
            stats.duplicates += 1;
            log::debug!("duplicate hand {}", id);
            continue;
        }
        buffered.push(buffer(&record, date, seq));
        if buffered.len() >= cfg.batch_size {
            commit_batch(primary, &mut buffered, &mut stats, pipeline, ctx, args)?;
        }
    }
    commit_batch(primary, &mut buffered, &mut stats, pipeline, ctx, args)?;
    Ok(stats)
}

/// Sleeps in one-second slices so an interrupt cuts the wait short.
fn sleep_interruptibly(secs: u64) {
    for _ in 0..secs {
        if hl_core::interrupted() {
            return;
        }
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
}

/// Checkpoints write-ahead logs on both stores; part of graceful shutdown.
fn checkpoint_all(paths: &Paths, primary_db: &std::path::Path) {
    for db in [primary_db.to_path_buf(), paths.heavy_db()] {
        if !db.exists() {
            continue;
        }
        match hl_store::checkpoint_file(&db) {
            Ok(()) => log::debug!("checkpointed {}", db.display()),
            Err(e) => log::warn!("checkpoint failed for {}: {}", db.display(), e),
        }
    }
}

/// Entry point behind `main`. Errors bubble out typed so the binary can
/// map configuration problems to exit 1 and auth problems to exit 2.
pub fn run(args: Cli) -> anyhow::Result<()> {
    let paths = Paths::resolve()?;
    hl_core::log(&paths.logs_dir())?;
    hl_core::trap();
    let cfg = Config::load(&args.config)?;
    let creds = Credentials::from_env()?;

    // initial cleanup: hosted deployments wipe exactly once, local runs
    // start fresh unless told otherwise
    if hl_core::paths::hosted() {
        if !args.no_clean && paths.first_deploy_pending() {
            let removed = paths.wipe_databases()?;
            paths.mark_first_deploy()?;
            log::info!("first deploy: wiped {} database files", removed);
        }
    } else if !args.no_clean {
        let removed = paths.wipe_databases()?;
        log::info!("clean start: wiped {} database files", removed);
    }

    for (db, table, count) in hl_store::archive::report(&paths)? {
        log::info!("{}: {} = {} rows", db, table, count);
    }

    let base_url = args.url.clone().unwrap_or_else(|| cfg.base_url.clone());
    let session = Session::login(
        &base_url,
        &cfg.organizer,
        &cfg.event,
        cfg.page_limit,
        &creds,
    )?;

    let primary_db = args.db.clone().unwrap_or_else(|| paths.poker_db());
    let mut primary = Primary::open(&primary_db)?;
    let pipeline = hl_etl::Pipeline::default();
    let ctx = hl_etl::Context::new(
        primary_db.clone(),
        paths.heavy_db(),
        cfg.ranges_path.clone(),
        &args.assets,
        cfg.normalize_cur,
        args.normalize,
    );

    let start = args.date.clone().unwrap_or_else(|| cfg.starting_date.clone());
    let mut day = NaiveDate::parse_from_str(&start, "%Y-%m-%d")
        .map_err(|_| hl_core::ConfigError(format!("bad start date '{}'", start)))?;

    log::info!(
        "starting loop at {} (batch size {}, page limit {})",
        day,
        cfg.batch_size,
        cfg.page_limit
    );
    while !hl_core::interrupted() {
        let date = day.format("%Y-%m-%d").to_string();
        match scrape_date(&session, &cfg, &mut primary, &pipeline, &ctx, &args, &date) {
            Ok(stats) => {
                log::info!(
                    "{}: {} inserted, {} duplicates, {} invalid in {} batches",
                    date,
                    stats.inserted,
                    stats.duplicates,
                    stats.invalid,
                    stats.batches
                );
                if args.rotate && stats.inserted > 0 {
                    hl_store::archive::rotate(&paths, &date)?;
                }
                day = day.succ_opt().expect("date overflow");
            }
            Err(e) => {
                // raw rows are committed; the date re-derives next cycle
                log::error!("{}: aborted: {:#}", date, e);
            }
        }
        if hl_core::interrupted() {
            break;
        }
        if day == chrono::Local::now().date_naive() {
            log::info!("caught up to today, sleeping {}s", hl_core::CAUGHT_UP_SLEEP_SECS);
            sleep_interruptibly(hl_core::CAUGHT_UP_SLEEP_SECS);
        } else {
            log::info!("sleeping {}s before next date", args.sleep);
            sleep_interruptibly(args.sleep);
        }
    }
    log::info!("shutting down, checkpointing write-ahead logs");
    checkpoint_all(&paths, &primary_db);
    Ok(())
}
