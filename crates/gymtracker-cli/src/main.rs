//! GymTracker CLI - manage workout routines and exercise history from the
//! terminal, online or offline.
//!
//! Every command works against the local cache first. Mutations are queued
//! and replayed to the remote store before the command exits; anything that
//! cannot be delivered stays queued for the next run.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gymtracker_core::models::{Exercise, ExerciseHistoryRecord, HistorySet, RoutinePatch};
use gymtracker_core::utils::{format_date, truncate_string};
use gymtracker_core::{
    Clock, Config, DrainOutcome, FileStore, HistoryCache, HttpRemoteStore, RefreshOutcome,
    RoutinesCache, SystemClock,
};

// ============================================================================
// Constants
// ============================================================================

/// Maximum title width in listings
const TITLE_WIDTH: usize = 32;

const ENV_REMOTE_URL: &str = "GYMTRACKER_REMOTE_URL";
const ENV_TOKEN: &str = "GYMTRACKER_TOKEN";
const ENV_UID: &str = "GYMTRACKER_UID";

const USAGE: &str = "\
Usage: gymtracker <command>

Commands:
  routines                 List routines
  new-routine              Create an empty routine and print its id
  rename <id> <title>      Rename a routine
  delete-routine <id>      Delete a routine
  add-exercise <routine-id> <title>
                           Append an exercise to a routine and print its id
  remove-exercise <routine-id> <exercise-id>
                           Remove an exercise from a routine
  log <exercise-id> <title> <set>...
                           Log a played exercise; a set is <weight>x<reps>
                           (e.g. 60x8) or <seconds>s (e.g. 45s)
  delete-history <doc-id>  Delete a logged exercise
  history [exercise-id]    List logged exercises, newest first
  sync                     Replay pending changes to the remote store
  status                   Show pending change counts

Environment:
  GYMTRACKER_REMOTE_URL    Base URL of the remote document store
  GYMTRACKER_TOKEN         Bearer token for the remote store
  GYMTRACKER_UID           User whose data is cached
  RUST_LOG                 Log filter (default: warn)";

type Routines = RoutinesCache<HttpRemoteStore, FileStore>;
type History = HistoryCache<HttpRemoteStore, FileStore>;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{USAGE}");
        return Ok(());
    };
    if matches!(command, "help" | "--help" | "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    let mut config = Config::load()?;
    apply_env_overrides(&mut config);

    let uid = config
        .last_uid
        .clone()
        .with_context(|| format!("No user configured, set {ENV_UID}"))?;
    let remote_url = config
        .remote_url
        .clone()
        .with_context(|| format!("No remote store configured, set {ENV_REMOTE_URL}"))?;

    let mut remote = HttpRemoteStore::new(remote_url)?;
    if let Some(token) = config.token.clone() {
        remote = remote.with_token(token);
    }
    let remote = Arc::new(remote);
    let storage = Arc::new(FileStore::new(config.cache_dir(&uid)?)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache_config = config.cache_config();

    info!(uid = %uid, command, "GymTracker starting");

    let routines = RoutinesCache::new(
        &uid,
        cache_config.clone(),
        storage.clone(),
        remote.clone(),
        clock.clone(),
    );
    let history = HistoryCache::new(&uid, cache_config, storage, remote, clock);
    routines.retrieve_on_load();
    history.retrieve_on_load();

    let result = run(command, &args[1..], &routines, &history).await;

    routines.shutdown();
    history.shutdown();
    if result.is_ok() {
        config.save()?;
    }
    result
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = std::env::var(ENV_REMOTE_URL) {
        config.remote_url = Some(url);
    }
    if let Ok(token) = std::env::var(ENV_TOKEN) {
        config.token = Some(token);
    }
    if let Ok(uid) = std::env::var(ENV_UID) {
        config.last_uid = Some(uid);
    }
}

async fn run(command: &str, args: &[String], routines: &Routines, history: &History) -> Result<()> {
    match command {
        "routines" => {
            sync_all(routines, history).await;
            report_refresh("routines", routines.refresh_from_remote().await);
            print_routines(routines);
        }
        "new-routine" => {
            let id = routines.add_new_routine();
            println!("{id}");
            sync_all(routines, history).await;
        }
        "rename" => {
            let (Some(id), Some(title)) = (args.first(), args.get(1)) else {
                bail!("Usage: gymtracker rename <id> <title>");
            };
            if routines.routine(id).is_none() {
                eprintln!("Routine {id} is not cached locally, queueing the rename anyway");
            }
            routines.update_routine(id, RoutinePatch::title(title.as_str()));
            sync_all(routines, history).await;
        }
        "delete-routine" => {
            let Some(id) = args.first() else {
                bail!("Usage: gymtracker delete-routine <id>");
            };
            routines.delete_routine(id);
            sync_all(routines, history).await;
        }
        "add-exercise" => {
            let (Some(routine_id), Some(title)) = (args.first(), args.get(1)) else {
                bail!("Usage: gymtracker add-exercise <routine-id> <title>");
            };
            let exercise = Exercise::new(title.as_str());
            let id = exercise.id.clone();
            if !routines.add_exercise(routine_id, exercise) {
                bail!("Routine {routine_id} is not cached locally");
            }
            println!("{id}");
            sync_all(routines, history).await;
        }
        "remove-exercise" => {
            let (Some(routine_id), Some(exercise_id)) = (args.first(), args.get(1)) else {
                bail!("Usage: gymtracker remove-exercise <routine-id> <exercise-id>");
            };
            if !routines.remove_exercise(routine_id, exercise_id) {
                bail!("Exercise {exercise_id} not found in routine {routine_id}");
            }
            sync_all(routines, history).await;
        }
        "log" => {
            let (Some(exercise_id), Some(title)) = (args.first(), args.get(1)) else {
                bail!("Usage: gymtracker log <exercise-id> <title> <set>...");
            };
            let sets = args[2..]
                .iter()
                .map(|arg| parse_set(arg))
                .collect::<Result<Vec<_>>>()?;
            if sets.is_empty() {
                bail!("Log at least one set, e.g. 60x8 or 45s");
            }
            let mut record = ExerciseHistoryRecord::new(exercise_id, title, sets, SystemClock.now());
            if let Some(exercise) = find_exercise(routines, exercise_id) {
                record.measurement = exercise.measurement;
                record.measurement_unit = exercise.measurement_unit.map(|u| u.as_str().to_string());
                let unit = record.measurement_unit.clone();
                for set in &mut record.sets {
                    set.measurement_unit = unit.clone();
                }
            }
            println!("{}", record.doc_id);
            history.add_record(record);
            sync_all(routines, history).await;
        }
        "delete-history" => {
            let Some(doc_id) = args.first() else {
                bail!("Usage: gymtracker delete-history <doc-id>");
            };
            let Some(record) = history.record(doc_id) else {
                bail!("History record {doc_id} is not cached locally");
            };
            history.delete_record(&record);
            sync_all(routines, history).await;
        }
        "history" => {
            sync_all(routines, history).await;
            report_refresh("history", history.refresh_from_remote().await);
            let records = match args.first() {
                Some(exercise_id) => history.history_for_exercise(exercise_id),
                None => {
                    let mut records = history.records();
                    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                    records
                }
            };
            print_history(&records);
        }
        "sync" => sync_all(routines, history).await,
        "status" => {
            println!("routines: {} pending", routines.pending().len());
            println!("history:  {} pending", history.pending().len());
        }
        other => bail!("Unknown command '{other}'\n\n{USAGE}"),
    }
    Ok(())
}

/// Parse `<weight>x<reps>` or `<seconds>s` into a set.
fn parse_set(arg: &str) -> Result<HistorySet> {
    let arg = arg.trim().to_ascii_lowercase();
    if let Some(seconds) = arg.strip_suffix('s') {
        let seconds: f64 = seconds
            .parse()
            .with_context(|| format!("Invalid duration '{arg}'"))?;
        if !seconds.is_finite() || seconds <= 0.0 {
            bail!("Duration must be positive: '{arg}'");
        }
        return Ok(HistorySet::timed(seconds));
    }
    let Some((weight, reps)) = arg.split_once('x') else {
        bail!("Invalid set '{arg}', expected <weight>x<reps> or <seconds>s");
    };
    let weight: f64 = weight
        .parse()
        .with_context(|| format!("Invalid weight in '{arg}'"))?;
    let reps: u32 = reps
        .parse()
        .with_context(|| format!("Invalid repetitions in '{arg}'"))?;
    if !weight.is_finite() || weight < 0.0 {
        bail!("Weight must not be negative: '{arg}'");
    }
    Ok(HistorySet::weighted(weight, reps))
}

/// The exercise with `exercise_id` in any cached routine.
fn find_exercise(routines: &Routines, exercise_id: &str) -> Option<Exercise> {
    routines
        .routines()
        .into_iter()
        .flat_map(|r| r.exercises)
        .find(|e| e.id == exercise_id)
}

/// Drain both queues concurrently and report how far each got.
async fn sync_all(routines: &Routines, history: &History) {
    let (routines_outcome, history_outcome) =
        futures::join!(routines.sync_queue(), history.sync_queue());
    report_drain("routines", &routines_outcome);
    report_drain("history", &history_outcome);
}

fn report_drain(name: &str, outcome: &DrainOutcome) {
    match outcome {
        DrainOutcome::Completed { applied: 0 } => {}
        DrainOutcome::Completed { applied } => eprintln!("{name}: synced {applied} change(s)"),
        DrainOutcome::AlreadyRunning => eprintln!("{name}: sync already in progress"),
        DrainOutcome::Aborted {
            applied,
            remaining,
            error,
        } => eprintln!(
            "{name}: synced {applied} change(s), {remaining} still pending ({error})"
        ),
    }
}

fn report_refresh(name: &str, outcome: RefreshOutcome) {
    match outcome {
        RefreshOutcome::Refreshed { .. } => {}
        RefreshOutcome::Deferred => eprintln!("{name}: local changes pending, showing cached data"),
        RefreshOutcome::SkippedOfflineEmpty => eprintln!("{name}: offline, showing cached data"),
        RefreshOutcome::Failed(error) => eprintln!("{name}: showing cached data ({error})"),
    }
}

fn print_routines(routines: &Routines) {
    let list = routines.routines();
    if list.is_empty() {
        println!("No routines");
        return;
    }
    for routine in list {
        println!(
            "{:<36}  {:<width$}  {:>2} exercise(s)  {}",
            routine.id,
            truncate_string(&routine.title, TITLE_WIDTH),
            routine.exercises.len(),
            format_date(routine.created_at.timestamp_millis()),
            width = TITLE_WIDTH,
        );
    }
}

fn print_history(records: &[ExerciseHistoryRecord]) {
    if records.is_empty() {
        println!("No history");
        return;
    }
    for record in records {
        println!(
            "{}  {:<width$}  {}",
            format_date(record.timestamp),
            truncate_string(&record.title, TITLE_WIDTH),
            record.summary(),
            width = TITLE_WIDTH,
        );
    }
}
