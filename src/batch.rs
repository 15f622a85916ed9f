use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::{debug, warn};

use crate::catalog::SampleCatalog;
use crate::config::ResolvedConfig;
use crate::domain::{BinSize, BinSizeLadder, Location, Principal};
use crate::error::SeqError;
use crate::reader::{BinReader, SampleBinCounts};

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub locations: Vec<Location>,
    /// One bin size per location, or a single size shared by all of them.
    pub bin_sizes: Vec<i64>,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub pair_timeout: Duration,
    pub workers: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            pair_timeout: Duration::from_secs(5),
            workers: 4,
        }
    }
}

impl From<&ResolvedConfig> for BatchOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            pair_timeout: config.pair_timeout,
            workers: config.workers,
        }
    }
}

#[derive(Debug)]
pub enum PairOutcome {
    Ok(SampleBinCounts),
    /// The principal may not view this sample.
    Unauthorized,
    Failed {
        partial: SampleBinCounts,
        error: SeqError,
    },
}

#[derive(Debug)]
pub struct PairSlot {
    pub sample_id: String,
    pub outcome: PairOutcome,
}

#[derive(Debug)]
pub struct LocationResult {
    pub location: Location,
    pub bin_size: BinSize,
    pub slots: Vec<PairSlot>,
}

impl LocationResult {
    /// Per-sample counts with authorization skips dropped; failed pairs keep
    /// their skeleton so every viewable sample still has an entry.
    pub fn visible(&self) -> Vec<&SampleBinCounts> {
        self.slots
            .iter()
            .filter_map(|slot| match &slot.outcome {
                PairOutcome::Ok(counts) => Some(counts),
                PairOutcome::Failed { partial, .. } => Some(partial),
                PairOutcome::Unauthorized => None,
            })
            .collect()
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &SeqError)> {
        self.slots.iter().filter_map(|slot| match &slot.outcome {
            PairOutcome::Failed { error, .. } => Some((slot.sample_id.as_str(), error)),
            _ => None,
        })
    }
}

struct Job {
    index: usize,
    sample_id: String,
    location: Location,
    bin_size: BinSize,
}

enum Event {
    Started {
        index: usize,
        at: Instant,
        sample_id: String,
        bin_size: BinSize,
    },
    Done { index: usize, outcome: PairOutcome },
}

/// Runs every (location, sample) pair and returns one slot per pair in
/// request order. Only malformed requests fail the whole batch.
///
/// At most `workers` threads exist per batch. A pair that overruns its
/// deadline is reported as timed out while its worker stays occupied until
/// the store call returns; once every worker is occupied that way, pairs
/// still queued get one more deadline to be picked up and then time out too.
pub fn run_batch<C>(
    catalog: Arc<C>,
    principal: &Principal,
    ladder: &BinSizeLadder,
    request: &BatchRequest,
    options: &BatchOptions,
) -> Result<Vec<LocationResult>, SeqError>
where
    C: SampleCatalog + 'static,
{
    let bin_sizes = resolve_bin_sizes(ladder, request)?;

    let (job_tx, job_rx) = unbounded::<Job>();
    for (location_index, location) in request.locations.iter().enumerate() {
        for (sample_index, sample_id) in request.samples.iter().enumerate() {
            let job = Job {
                index: location_index * request.samples.len() + sample_index,
                sample_id: sample_id.clone(),
                location: location.clone(),
                bin_size: bin_sizes[location_index],
            };
            // job_rx is alive until the end of this function
            let _ = job_tx.send(job);
        }
    }
    drop(job_tx);

    let total = request.locations.len() * request.samples.len();
    let (event_tx, event_rx) = unbounded::<Event>();
    let mut pool = 0;
    let mut spawn_error = None;
    for worker in 0..options.workers.max(1).min(total) {
        let jobs = job_rx.clone();
        let events = event_tx.clone();
        let catalog = Arc::clone(&catalog);
        let principal = principal.clone();
        let spawned = thread::Builder::new()
            .name(format!("seqbins-worker-{worker}"))
            .spawn(move || work(catalog.as_ref(), &principal, &jobs, &events));
        match spawned {
            Ok(_) => pool += 1,
            Err(err) => {
                warn!(worker, error = %err, "cannot start batch worker");
                spawn_error = Some(err.to_string());
                break;
            }
        }
    }
    drop(event_tx);
    debug!(pairs = total, workers = pool, "running bin batch");

    let mut outcomes = (0..total).map(|_| None).collect::<Vec<Option<PairOutcome>>>();
    if pool == 0 {
        let message = spawn_error.unwrap_or_else(|| "no worker started".to_string());
        for job in job_rx.try_iter() {
            outcomes[job.index] = Some(failed(&job, SeqError::Worker(message.clone())));
        }
    } else {
        collect(&job_rx, &event_rx, pool, options.pair_timeout, &mut outcomes);
    }

    let mut outcomes = outcomes.into_iter();
    let mut results = Vec::with_capacity(request.locations.len());
    for (index, location) in request.locations.iter().enumerate() {
        let bin_size = bin_sizes[index];
        let slots = request
            .samples
            .iter()
            .zip(outcomes.by_ref())
            .map(|(sample_id, outcome)| PairSlot {
                sample_id: sample_id.clone(),
                outcome: outcome.unwrap_or_else(|| PairOutcome::Failed {
                    partial: SampleBinCounts::empty(sample_id.as_str(), bin_size),
                    error: SeqError::Worker("pair was never run".to_string()),
                }),
            })
            .collect();
        results.push(LocationResult {
            location: location.clone(),
            bin_size,
            slots,
        });
    }
    Ok(results)
}

fn resolve_bin_sizes(
    ladder: &BinSizeLadder,
    request: &BatchRequest,
) -> Result<Vec<BinSize>, SeqError> {
    let requested = match request.bin_sizes.as_slice() {
        [single] => vec![*single; request.locations.len()],
        sizes if sizes.len() == request.locations.len() => sizes.to_vec(),
        sizes => {
            return Err(SeqError::InvalidRequest(format!(
                "{} bin sizes for {} locations",
                sizes.len(),
                request.locations.len()
            )));
        }
    };
    requested
        .into_iter()
        .map(|size| ladder.validate(size))
        .collect()
}

fn work<C>(catalog: &C, principal: &Principal, jobs: &Receiver<Job>, events: &Sender<Event>)
where
    C: SampleCatalog + ?Sized,
{
    for job in jobs.iter() {
        let started = Event::Started {
            index: job.index,
            at: Instant::now(),
            sample_id: job.sample_id.clone(),
            bin_size: job.bin_size,
        };
        if events.send(started).is_err() {
            break;
        }
        let outcome = run_pair(
            catalog,
            principal,
            &job.sample_id,
            &job.location,
            job.bin_size,
        );
        // the batch may have returned already
        if events
            .send(Event::Done {
                index: job.index,
                outcome,
            })
            .is_err()
        {
            break;
        }
    }
}

/// Fills `outcomes` from worker events, timing out pairs that overrun.
fn collect(
    jobs: &Receiver<Job>,
    events: &Receiver<Event>,
    pool: usize,
    timeout: Duration,
    outcomes: &mut [Option<PairOutcome>],
) {
    let mut remaining = outcomes.len();
    let mut running: BTreeMap<usize, (Instant, String, BinSize)> = BTreeMap::new();
    // workers still busy with a pair that was already reported as timed out
    let mut stuck = 0;
    let mut stalled_until: Option<Instant> = None;

    while remaining > 0 {
        let deadline = match running.values().map(|(deadline, ..)| *deadline).min() {
            Some(deadline) => Some(deadline),
            None if stuck >= pool => {
                Some(*stalled_until.get_or_insert_with(|| Instant::now() + timeout))
            }
            None => None,
        };
        let event = match deadline {
            Some(deadline) => events.recv_deadline(deadline),
            None => events.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match event {
            Ok(Event::Started {
                index,
                at,
                sample_id,
                bin_size,
            }) => {
                stalled_until = None;
                running.insert(index, (at + timeout, sample_id, bin_size));
            }
            Ok(Event::Done { index, outcome }) => {
                if running.remove(&index).is_some() {
                    outcomes[index] = Some(outcome);
                    remaining -= 1;
                } else {
                    // late result of a pair that already timed out
                    stuck = stuck.saturating_sub(1);
                    stalled_until = None;
                }
            }
            Err(RecvTimeoutError::Timeout) if running.is_empty() => {
                for job in jobs.try_iter() {
                    warn!(sample = %job.sample_id, "no free worker before deadline");
                    outcomes[job.index] = Some(failed(&job, timed_out(&job.sample_id, timeout)));
                    remaining -= 1;
                }
                stalled_until = None;
            }
            Err(RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                let expired = running
                    .iter()
                    .filter(|(_, (deadline, ..))| *deadline <= now)
                    .map(|(index, _)| *index)
                    .collect::<Vec<_>>();
                for index in expired {
                    if let Some((_, sample_id, bin_size)) = running.remove(&index) {
                        let error = timed_out(&sample_id, timeout);
                        warn!(sample = %sample_id, %error, "pair failed");
                        outcomes[index] = Some(PairOutcome::Failed {
                            partial: SampleBinCounts::empty(sample_id, bin_size),
                            error,
                        });
                        remaining -= 1;
                        stuck += 1;
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!(unfinished = remaining, "batch workers exited early");
                break;
            }
        }
    }
}

fn timed_out(sample_id: &str, timeout: Duration) -> SeqError {
    SeqError::Timeout {
        sample: sample_id.to_string(),
        millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

fn failed(job: &Job, error: SeqError) -> PairOutcome {
    PairOutcome::Failed {
        partial: SampleBinCounts::empty(job.sample_id.as_str(), job.bin_size),
        error,
    }
}

/// Authorizes, resolves and reads one pair. Usable without threads.
pub fn run_pair<C>(
    catalog: &C,
    principal: &Principal,
    sample_id: &str,
    location: &Location,
    bin_size: BinSize,
) -> PairOutcome
where
    C: SampleCatalog + ?Sized,
{
    match catalog.can_view(sample_id, principal) {
        Ok(()) => {}
        Err(SeqError::PermissionDenied(_)) => {
            debug!(sample = sample_id, "skipping sample without permission");
            return PairOutcome::Unauthorized;
        }
        Err(error) => {
            return PairOutcome::Failed {
                partial: SampleBinCounts::empty(sample_id, bin_size),
                error,
            };
        }
    }

    let sample = match catalog.resolve(sample_id) {
        Ok(sample) => sample,
        Err(error) => {
            return PairOutcome::Failed {
                partial: SampleBinCounts::empty(sample_id, bin_size),
                error,
            };
        }
    };

    match BinReader::for_sample(&sample, bin_size).query(location) {
        Ok(counts) => PairOutcome::Ok(counts),
        Err(failure) => {
            let (partial, error) = failure.into_parts();
            warn!(sample = sample_id, %location, %error, "bin query failed");
            PairOutcome::Failed { partial, error }
        }
    }
}
