//! Crawler engine (C6) — the BFS core alternating player-expansion and
//! match-expansion across two worker pools, sharing four frontier sets
//! guarded by mutex/condvar pairs. Grounded in
//! `original_source/lol_scraper/match_downloader.py`'s `PlayerDownloader`,
//! `MatchDownloader` and `Manager` classes.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use nohash_hasher::IntSet;
use num_format::{Locale, ToFormattedString};

use crate::cache::{cache_autostore, SimpleCache};
use crate::checkpoint::CheckpointData;
use crate::config::{EngineTuning, RuntimeConfig};
use crate::gateway::{get_tier_from_participants, Gateway, GatewayError};
use crate::record::MatchRecord;
use crate::tier::{Tier, ALL_TIERS};
use crate::tier_set::TierSet;

type IdSet = IntSet<i64>;

/// Recovers the guard even if the mutex was poisoned by a panicking holder.
/// A single worker panicking mid-mutation must not stop the shutdown-time
/// checkpoint from reading whatever frontier state survives it (spec.md
/// §4.4.7's "finally"-style durability guarantee).
fn lock_ignore_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn wait_ignore_poison<'a, T>(
    condvar: &Condvar,
    guard: std::sync::MutexGuard<'a, T>,
) -> std::sync::MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Delivers an accepted match record. Modeled as a trait (spec.md §9,
/// "duck-typed callbacks") so tests can swap in an in-memory recorder
/// without touching a filesystem.
pub trait RecordSink: Send + Sync {
    fn accept(&self, record: &MatchRecord, tier_name: &str) -> std::io::Result<()>;
}

impl RecordSink for Mutex<crate::store::TierStore> {
    fn accept(&self, record: &MatchRecord, tier_name: &str) -> std::io::Result<()> {
        self.lock().unwrap().store(&record.to_json_line(), tier_name)
    }
}

/// Persists frontier/dedup state at shutdown (spec.md §4.4.7).
pub trait CheckpointSink: Send + Sync {
    fn save(&self, data: CheckpointData);
}

pub struct FileCheckpointSink {
    path: PathBuf,
}

impl FileCheckpointSink {
    pub fn new(path: PathBuf) -> Self {
        FileCheckpointSink { path }
    }
}

impl CheckpointSink for FileCheckpointSink {
    fn save(&self, data: CheckpointData) {
        if let Err(e) = crate::checkpoint::write(&self.path, &data) {
            log::error!("failed to write checkpoint: {e}");
        }
    }
}

/// Used behind `--no-state` (spec.md §6): the engine still assembles the
/// frontier tuple at shutdown, it is simply discarded.
pub struct NullCheckpointSink;

impl CheckpointSink for NullCheckpointSink {
    fn save(&self, _data: CheckpointData) {}
}

#[derive(Default)]
struct PlayerFrontier {
    players_to_analyze: IdSet,
    analyzed_players: IdSet,
}

#[derive(Default)]
struct MatchFrontier {
    matches_to_download: IdSet,
    downloaded_matches: IdSet,
}

/// Memoizes the "current patch" gateway call and tracks whether it last
/// changed, for the `minimum_patch == "latest"` invalidation path (spec.md
/// §4.4.3). Grounded in `original_source/lol_scraper/data_types.py`'s
/// `cache_autostore` usage inside `match_downloader.py`.
struct PatchTracker {
    cache: SimpleCache,
    ttl: Duration,
    changed: Mutex<bool>,
}

impl PatchTracker {
    fn new(ttl: Duration) -> Self {
        PatchTracker {
            cache: SimpleCache::new(),
            ttl,
            changed: Mutex::new(false),
        }
    }

    async fn latest_patch(&self, gateway: &dyn Gateway) -> Result<String, GatewayError> {
        let changed = &self.changed;
        cache_autostore(
            &self.cache,
            "current_version",
            self.ttl,
            |old, _new| {
                if old.is_some() {
                    *changed.lock().unwrap() = true;
                }
            },
            || async { gateway.latest_patch_version().await },
        )
        .await
    }

    /// Clears and returns whether the flag had been set.
    fn consume_changed(&self) -> bool {
        let mut flag = self.changed.lock().unwrap();
        std::mem::replace(&mut *flag, false)
    }
}

async fn patch_is_acceptable(
    match_version: &str,
    minimum_patch: &str,
    gateway: &dyn Gateway,
    tracker: &PatchTracker,
) -> bool {
    if minimum_patch.is_empty() {
        return true;
    }
    if !minimum_patch.eq_ignore_ascii_case("latest") {
        // Lexicographic, intentionally not semver-correct (spec.md §9).
        return match_version >= minimum_patch;
    }
    match tracker.latest_patch(gateway).await {
        Ok(latest) => match_version >= latest.as_str(),
        Err(e) => {
            log::warn!("failed to fetch latest patch version: {e}");
            false
        }
    }
}

enum MatchOutcome {
    WrongMap,
    Processed {
        record: MatchRecord,
        match_min_tier: Tier,
        filtered: TierSet,
    },
}

async fn process_match(
    gateway: &dyn Gateway,
    config: &RuntimeConfig,
    match_id: i64,
) -> Result<MatchOutcome, GatewayError> {
    let record = gateway.get_match(match_id, config.include_timeline).await?;
    if record.map_id != config.map.id() {
        return Ok(MatchOutcome::WrongMap);
    }
    let ids: Vec<i64> = record.participant_summoner_ids().collect();
    let (match_min_tier, filtered) =
        get_tier_from_participants(gateway, &ids, config.minimum_tier, config.queue).await?;
    Ok(MatchOutcome::Processed {
        record,
        match_min_tier,
        filtered,
    })
}

/// Error triage table (spec.md §4.4.6 / §7): failed items are silently
/// dropped from the frontier (they were already popped), the classification
/// only decides the log level.
fn triage_gateway_error(err: &GatewayError, phase: &str) {
    match err {
        GatewayError::ApiClient(_) => log::warn!("{phase}: {err}"),
        GatewayError::ApiServer(_) => log::warn!("{phase}: {err}"),
        GatewayError::ApiOther(_) => log::error!("{phase}: unexpected api error: {err}"),
        GatewayError::Transport(_) => log::error!("{phase}: transport error: {err}"),
        GatewayError::Decode(_) => log::error!("{phase}: decode error: {err}"),
    }
}

struct Shared {
    config: RuntimeConfig,
    tuning: EngineTuning,
    gateway: Arc<dyn Gateway>,
    rt: tokio::runtime::Handle,

    pta_lock: Mutex<PlayerFrontier>,
    players_available: Condvar,
    mtd_lock: Mutex<MatchFrontier>,
    matches_available: Condvar,

    patch_tracker: PatchTracker,
    exit: AtomicBool,
    logger_lock: Mutex<()>,
    user_function_lock: Mutex<()>,

    record_sink: Arc<dyn RecordSink>,
    checkpoint_sink: Arc<dyn CheckpointSink>,

    total_players_seen: AtomicUsize,
}

fn run_p_worker(shared: Arc<Shared>, local_stop: Arc<AtomicBool>) {
    loop {
        if shared.exit.load(Ordering::Relaxed) || local_stop.load(Ordering::Relaxed) {
            return;
        }

        let (player_id, is_new) = {
            let mut frontier = lock_ignore_poison(&shared.pta_lock);
            loop {
                if shared.exit.load(Ordering::Relaxed) || local_stop.load(Ordering::Relaxed) {
                    return;
                }
                if let Some(&id) = frontier.players_to_analyze.iter().next() {
                    frontier.players_to_analyze.remove(&id);
                    let is_new = !frontier.analyzed_players.contains(&id);
                    break (id, is_new);
                }
                frontier = wait_ignore_poison(&shared.players_available, frontier);
            }
        };
        if !is_new {
            continue;
        }

        let result = shared.rt.block_on(shared.gateway.get_match_list(
            player_id,
            shared.config.start,
            shared.config.end,
            shared.config.queue,
        ));

        match result {
            Ok(match_ids) => {
                {
                    let mut mtd = lock_ignore_poison(&shared.mtd_lock);
                    mtd.matches_to_download.extend(match_ids);
                }
                shared.matches_available.notify_all();

                let mut frontier = lock_ignore_poison(&shared.pta_lock);
                frontier.analyzed_players.insert(player_id);
                shared.total_players_seen.fetch_add(1, Ordering::Relaxed);

                if frontier.analyzed_players.len() > shared.tuning.max_analyzed_players_size {
                    let rng = fastrand::Rng::new();
                    let rate = shared.tuning.eviction_rate;
                    frontier.analyzed_players.retain(|_| rng.f64() >= rate);
                }
            }
            Err(e) => triage_gateway_error(&e, "player expansion"),
        }
    }
}

fn run_m_worker(shared: Arc<Shared>) {
    loop {
        if shared.exit.load(Ordering::Relaxed) {
            return;
        }

        let (match_id, is_new) = {
            let mut frontier = lock_ignore_poison(&shared.mtd_lock);
            loop {
                if shared.exit.load(Ordering::Relaxed) {
                    return;
                }
                if let Some(&id) = frontier.matches_to_download.iter().next() {
                    frontier.matches_to_download.remove(&id);
                    let is_new = !frontier.downloaded_matches.contains(&id);
                    break (id, is_new);
                }
                frontier = wait_ignore_poison(&shared.matches_available, frontier);
            }
        };
        if !is_new {
            continue;
        }

        let outcome = shared
            .rt
            .block_on(process_match(shared.gateway.as_ref(), &shared.config, match_id));

        match outcome {
            Err(e) => triage_gateway_error(&e, "match expansion"),
            Ok(MatchOutcome::WrongMap) => {
                let mut mtd = lock_ignore_poison(&shared.mtd_lock);
                mtd.downloaded_matches.insert(match_id);
            }
            Ok(MatchOutcome::Processed {
                record,
                match_min_tier,
                filtered,
            }) => {
                {
                    let mut pta = lock_ignore_poison(&shared.pta_lock);
                    let within_cap = shared
                        .tuning
                        .max_players_in_queue
                        .map_or(true, |cap| pta.players_to_analyze.len() <= cap);
                    if within_cap {
                        for tier in ALL_TIERS {
                            pta.players_to_analyze.extend(filtered.tier(tier));
                        }
                    }
                }
                shared.players_available.notify_all();

                {
                    let mut mtd = lock_ignore_poison(&shared.mtd_lock);
                    mtd.downloaded_matches.insert(match_id);
                }

                let patch_ok = shared.rt.block_on(patch_is_acceptable(
                    &record.match_version,
                    &shared.config.minimum_patch,
                    shared.gateway.as_ref(),
                    &shared.patch_tracker,
                ));

                if match_min_tier.is_better_or_equal(shared.config.minimum_tier) && patch_ok {
                    let _guard = lock_ignore_poison(&shared.user_function_lock);
                    if let Err(e) = shared.record_sink.accept(&record, match_min_tier.name()) {
                        log::error!("failed to deliver match {match_id}: {e}");
                    }
                }

                if shared.config.minimum_patch.eq_ignore_ascii_case("latest")
                    && shared.patch_tracker.consume_changed()
                {
                    lock_ignore_poison(&shared.mtd_lock).downloaded_matches.clear();
                }
            }
        }
    }
}

struct PWorkerHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Runs the BFS crawl described by `config` until `request_shutdown` is
/// called (or the process is interrupted), then checkpoints and returns.
pub struct Engine {
    shared: Arc<Shared>,
    p_workers: Mutex<Vec<PWorkerHandle>>,
    retiring: Mutex<Vec<JoinHandle<()>>>,
    m_workers: Mutex<Vec<JoinHandle<()>>>,
    checkpointed: AtomicBool,
}

/// RAII safety net for spec.md §4.4.7's "finally"-style durability
/// guarantee: `checkpoint()` runs when this guard drops, whether `run()`
/// returned normally or a panic is unwinding through it.
struct CheckpointGuard<'e>(&'e Engine);

impl Drop for CheckpointGuard<'_> {
    fn drop(&mut self) {
        self.0.checkpoint();
    }
}

impl Engine {
    pub fn new(
        config: RuntimeConfig,
        tuning: EngineTuning,
        gateway: Arc<dyn Gateway>,
        rt: tokio::runtime::Handle,
        record_sink: Arc<dyn RecordSink>,
        checkpoint_sink: Arc<dyn CheckpointSink>,
        resume: Option<CheckpointData>,
    ) -> Engine {
        let mut players_to_analyze = IdSet::default();
        players_to_analyze.extend(config.seed_players_id.iter().copied());
        let mut analyzed_players = IdSet::default();
        let mut matches_to_download = IdSet::default();
        let mut downloaded_matches = IdSet::default();

        if let Some(data) = resume {
            players_to_analyze.extend(data.players_to_analyze);
            analyzed_players.extend(data.analyzed_players);
            matches_to_download.extend(data.matches_to_download);
            downloaded_matches.extend(data.downloaded_matches);
        }

        let patch_tracker = PatchTracker::new(tuning.patch_cache_ttl);

        let shared = Arc::new(Shared {
            config,
            tuning,
            gateway,
            rt,
            pta_lock: Mutex::new(PlayerFrontier {
                players_to_analyze,
                analyzed_players,
            }),
            players_available: Condvar::new(),
            mtd_lock: Mutex::new(MatchFrontier {
                matches_to_download,
                downloaded_matches,
            }),
            matches_available: Condvar::new(),
            patch_tracker,
            exit: AtomicBool::new(false),
            logger_lock: Mutex::new(()),
            user_function_lock: Mutex::new(()),
            record_sink,
            checkpoint_sink,
            total_players_seen: AtomicUsize::new(0),
        });

        Engine {
            shared,
            p_workers: Mutex::new(Vec::new()),
            retiring: Mutex::new(Vec::new()),
            m_workers: Mutex::new(Vec::new()),
            checkpointed: AtomicBool::new(false),
        }
    }

    fn spawn_p_worker(&self) -> PWorkerHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(&self.shared);
        let worker_stop = Arc::clone(&stop);
        let join = std::thread::spawn(move || run_p_worker(shared, worker_stop));
        PWorkerHandle { stop, join }
    }

    /// Blocks the calling thread, running the crawl until
    /// `request_shutdown` is invoked (from another thread, e.g. a Ctrl-C
    /// handler).
    pub fn run(&self) {
        let _checkpoint_guard = CheckpointGuard(self);

        {
            let mut workers = lock_ignore_poison(&self.p_workers);
            workers.push(self.spawn_p_worker());
        }
        {
            let mut m_workers = lock_ignore_poison(&self.m_workers);
            for _ in 0..self.shared.tuning.matches_download_threads.max(1) {
                let shared = Arc::clone(&self.shared);
                m_workers.push(std::thread::spawn(move || run_m_worker(shared)));
            }
        }

        let mut prev_queue_len = 0usize;
        let mut last_tune = Instant::now();
        let mut last_log = Instant::now();
        while !self.shared.exit.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_secs(1));
            if last_tune.elapsed() >= Duration::from_secs(5) {
                self.autotune(&mut prev_queue_len);
                last_tune = Instant::now();
            }
            if last_log.elapsed() >= Duration::from_secs(self.shared.tuning.logging_interval.max(1))
            {
                self.log_summary();
                last_log = Instant::now();
            }
        }
        self.shutdown();
    }

    pub fn request_shutdown(&self) {
        self.shared.exit.store(true, Ordering::Relaxed);
        self.shared.players_available.notify_all();
        self.shared.matches_available.notify_all();
    }

    /// Grows the P-worker pool while the match queue is small and not
    /// growing, shrinks it while the queue is large and growing, never
    /// dropping below one worker (spec.md §4.4.5).
    fn autotune(&self, prev_queue_len: &mut usize) {
        let queue_len = lock_ignore_poison(&self.shared.mtd_lock).matches_to_download.len();
        let growing = queue_len > *prev_queue_len;

        let mut workers = lock_ignore_poison(&self.p_workers);
        if queue_len < 1000
            && !growing
            && workers.len() < self.shared.tuning.max_players_download_threads.max(1)
        {
            workers.push(self.spawn_p_worker());
            log::debug!("auto-tuner: grew P-worker pool to {}", workers.len());
        } else if queue_len > 1500 && growing && workers.len() > 1 {
            if let Some(handle) = workers.pop() {
                handle.stop.store(true, Ordering::Relaxed);
                self.shared.players_available.notify_all();
                lock_ignore_poison(&self.retiring).push(handle.join);
            }
            log::debug!("auto-tuner: shrank P-worker pool to {}", workers.len());
        }
        *prev_queue_len = queue_len;
    }

    fn log_summary(&self) {
        let _guard = lock_ignore_poison(&self.shared.logger_lock);
        let pta = lock_ignore_poison(&self.shared.pta_lock);
        let mtd = lock_ignore_poison(&self.shared.mtd_lock);
        log::info!(
            "players_to_analyze={} analyzed_players={} matches_to_download={} downloaded_matches={} total_players_seen={}",
            pta.players_to_analyze.len().to_formatted_string(&Locale::en),
            pta.analyzed_players.len().to_formatted_string(&Locale::en),
            mtd.matches_to_download.len().to_formatted_string(&Locale::en),
            mtd.downloaded_matches.len().to_formatted_string(&Locale::en),
            self.shared.total_players_seen.load(Ordering::Relaxed).to_formatted_string(&Locale::en),
        );
    }

    fn shutdown(&self) {
        self.shared.players_available.notify_all();
        self.shared.matches_available.notify_all();

        let mut workers = lock_ignore_poison(&self.p_workers);
        for handle in workers.drain(..) {
            handle.stop.store(true, Ordering::Relaxed);
            self.shared.players_available.notify_all();
            let _ = handle.join.join();
        }
        drop(workers);

        let mut retiring = lock_ignore_poison(&self.retiring);
        for join in retiring.drain(..) {
            let _ = join.join();
        }
        drop(retiring);

        let mut m_workers = lock_ignore_poison(&self.m_workers);
        for join in m_workers.drain(..) {
            let _ = join.join();
        }
        drop(m_workers);

        self.checkpoint();
    }

    /// Runs at most once per `Engine` (spec.md §4.4.7): `shutdown()`'s own
    /// call and `CheckpointGuard`'s panic-unwind call both reach this, but
    /// only the first should touch the sink.
    fn checkpoint(&self) {
        if self.checkpointed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pta = lock_ignore_poison(&self.shared.pta_lock);
        let mtd = lock_ignore_poison(&self.shared.mtd_lock);
        let players_to_analyze: HashSet<i64> = pta.players_to_analyze.iter().copied().collect();
        let analyzed_players: HashSet<i64> = pta.analyzed_players.iter().copied().collect();
        let matches_to_download: HashSet<i64> = mtd.matches_to_download.iter().copied().collect();
        let downloaded_matches: HashSet<i64> = mtd.downloaded_matches.iter().copied().collect();
        drop(pta);
        drop(mtd);

        let data = CheckpointData::from_sets(
            &players_to_analyze,
            &analyzed_players,
            &matches_to_download,
            &downloaded_matches,
        );
        self.shared.checkpoint_sink.save(data);
    }
}

#[cfg(test)]
impl Engine {
    /// Spawns `p_workers` P-workers and the configured M-worker pool,
    /// polls until both frontiers are empty (or `max_wait` elapses), then
    /// shuts down. Used by the scenario tests below; a real run instead
    /// blocks in `run()` until `request_shutdown` is called externally.
    fn run_until_drained(&self, p_workers: usize, poll: Duration, max_wait: Duration) {
        {
            let mut workers = self.p_workers.lock().unwrap();
            for _ in 0..p_workers {
                let w = self.spawn_p_worker();
                workers.push(w);
            }
        }
        {
            let mut m_workers = self.m_workers.lock().unwrap();
            for _ in 0..self.shared.tuning.matches_download_threads.max(1) {
                let shared = Arc::clone(&self.shared);
                m_workers.push(std::thread::spawn(move || run_m_worker(shared)));
            }
        }

        let deadline = Instant::now() + max_wait;
        loop {
            std::thread::sleep(poll);
            let idle = {
                let pta = self.shared.pta_lock.lock().unwrap();
                let mtd = self.shared.mtd_lock.lock().unwrap();
                pta.players_to_analyze.is_empty() && mtd.matches_to_download.is_empty()
            };
            if idle || Instant::now() >= deadline {
                break;
            }
        }
        std::thread::sleep(poll);
        self.request_shutdown();
        self.shutdown();
    }

    fn downloaded_matches_snapshot(&self) -> Vec<i64> {
        self.shared
            .mtd_lock
            .lock()
            .unwrap()
            .downloaded_matches
            .iter()
            .copied()
            .collect()
    }

    fn analyzed_players_snapshot(&self) -> Vec<i64> {
        self.shared.pta_lock.lock().unwrap().analyzed_players.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use crate::record::{ParticipantIdentity, ParticipantPlayer};
    use crate::tier::{GameMap, Queue};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct MockGateway {
        match_lists: StdMutex<HashMap<i64, Vec<i64>>>,
        matches: StdMutex<HashMap<i64, MatchRecord>>,
        leagues: StdMutex<HashMap<i64, Tier>>,
        latest_patch: StdMutex<String>,
        get_match_calls: AtomicUsize,
    }

    impl MockGateway {
        fn new() -> Self {
            MockGateway {
                match_lists: StdMutex::new(HashMap::new()),
                matches: StdMutex::new(HashMap::new()),
                leagues: StdMutex::new(HashMap::new()),
                latest_patch: StdMutex::new("5.20".to_string()),
                get_match_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Gateway for MockGateway {
        async fn summoner_names_to_id(
            &self,
            _names: &[String],
        ) -> Result<HashMap<String, i64>, GatewayError> {
            Ok(HashMap::new())
        }

        async fn leagues_by_summoner_ids(
            &self,
            ids: &[i64],
            _queue: Queue,
        ) -> Result<TierSet, GatewayError> {
            let leagues = self.leagues.lock().unwrap();
            let mut out = TierSet::new(0);
            for &id in ids {
                if let Some(&tier) = leagues.get(&id) {
                    out.update_tier([id], tier);
                }
            }
            Ok(out)
        }

        async fn get_match_list(
            &self,
            player_id: i64,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _queue: Queue,
        ) -> Result<Vec<i64>, GatewayError> {
            Ok(self
                .match_lists
                .lock()
                .unwrap()
                .get(&player_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn get_match(&self, match_id: i64, _include_timeline: bool) -> Result<MatchRecord, GatewayError> {
            self.get_match_calls.fetch_add(1, Ordering::SeqCst);
            self.matches
                .lock()
                .unwrap()
                .get(&match_id)
                .cloned()
                .ok_or(GatewayError::ApiClient(404))
        }

        async fn challenger_and_master_ids(&self, _queue: Queue) -> Result<Vec<i64>, GatewayError> {
            Ok(Vec::new())
        }

        async fn latest_patch_version(&self) -> Result<String, GatewayError> {
            Ok(self.latest_patch.lock().unwrap().clone())
        }
    }

    struct RecordingSink {
        records: StdMutex<Vec<(i64, String)>>,
    }

    impl RecordSink for RecordingSink {
        fn accept(&self, record: &MatchRecord, tier_name: &str) -> std::io::Result<()> {
            self.records.lock().unwrap().push((record.match_id, tier_name.to_string()));
            Ok(())
        }
    }

    fn sample_record(match_id: i64, map_id: i64, participants: Vec<i64>, version: &str) -> MatchRecord {
        MatchRecord {
            match_id,
            map_id,
            match_version: version.to_string(),
            participant_identities: participants
                .into_iter()
                .map(|id| ParticipantIdentity {
                    player: ParticipantPlayer { summoner_id: id },
                })
                .collect(),
            extra: Default::default(),
        }
    }

    fn test_tuning() -> EngineTuning {
        EngineTuning {
            max_analyzed_players_size: 1000,
            eviction_rate: 0.5,
            max_players_in_queue: None,
            max_players_download_threads: 4,
            matches_download_threads: 1,
            logging_interval: 60,
            patch_cache_ttl: Duration::from_millis(1),
        }
    }

    fn test_config(seed_players_id: Vec<i64>, minimum_tier: Tier, minimum_patch: &str) -> RuntimeConfig {
        let end = Utc::now();
        RuntimeConfig {
            destination_directory: PathBuf::from("/tmp"),
            base_file_name: "test".to_string(),
            matches_per_file: 0,
            queue: Queue::RankedSolo5x5,
            map: GameMap::SummonersRift,
            minimum_tier,
            include_timeline: false,
            start: end - chrono::Duration::days(1),
            end,
            minimum_patch: minimum_patch.to_string(),
            seed_players_id,
            logging_level: log::LevelFilter::Off,
            api_key: "key".to_string(),
        }
    }

    fn build_engine(
        gateway: Arc<MockGateway>,
        sink: Arc<RecordingSink>,
        config: RuntimeConfig,
        resume: Option<CheckpointData>,
    ) -> (Engine, tokio::runtime::Runtime) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let engine = Engine::new(
            config,
            test_tuning(),
            gateway,
            rt.handle().clone(),
            sink,
            Arc::new(NullCheckpointSink),
            resume,
        );
        (engine, rt)
    }

    #[test]
    fn single_seed_one_match_is_accepted() {
        let gateway = Arc::new(MockGateway::new());
        gateway.match_lists.lock().unwrap().insert(1, vec![100]);
        gateway
            .matches
            .lock()
            .unwrap()
            .insert(100, sample_record(100, 11, vec![1], "5.20"));
        gateway.leagues.lock().unwrap().insert(1, Tier::Gold);

        let sink = Arc::new(RecordingSink { records: StdMutex::new(Vec::new()) });
        let config = test_config(vec![1], Tier::Bronze, "");
        let (engine, _rt) = build_engine(gateway, sink.clone(), config, None);

        engine.run_until_drained(1, Duration::from_millis(10), Duration::from_secs(2));

        let records = sink.records.lock().unwrap();
        assert_eq!(*records, vec![(100, "gold".to_string())]);
        assert_eq!(engine.downloaded_matches_snapshot(), vec![100]);
    }

    #[test]
    fn wrong_map_is_rejected_but_still_marked_downloaded() {
        let gateway = Arc::new(MockGateway::new());
        gateway.match_lists.lock().unwrap().insert(1, vec![100]);
        gateway
            .matches
            .lock()
            .unwrap()
            .insert(100, sample_record(100, 99, vec![1], "5.20"));

        let sink = Arc::new(RecordingSink { records: StdMutex::new(Vec::new()) });
        let config = test_config(vec![1], Tier::Bronze, "");
        let (engine, _rt) = build_engine(gateway, sink.clone(), config, None);

        engine.run_until_drained(1, Duration::from_millis(10), Duration::from_secs(2));

        assert!(sink.records.lock().unwrap().is_empty());
        assert_eq!(engine.downloaded_matches_snapshot(), vec![100]);
    }

    #[test]
    fn below_minimum_tier_is_rejected() {
        let gateway = Arc::new(MockGateway::new());
        gateway.match_lists.lock().unwrap().insert(1, vec![100]);
        gateway
            .matches
            .lock()
            .unwrap()
            .insert(100, sample_record(100, 11, vec![1], "5.20"));
        gateway.leagues.lock().unwrap().insert(1, Tier::Bronze);

        let sink = Arc::new(RecordingSink { records: StdMutex::new(Vec::new()) });
        let config = test_config(vec![1], Tier::Platinum, "");
        let (engine, _rt) = build_engine(gateway, sink.clone(), config, None);

        engine.run_until_drained(1, Duration::from_millis(10), Duration::from_secs(2));

        assert!(sink.records.lock().unwrap().is_empty());
        assert_eq!(engine.downloaded_matches_snapshot(), vec![100]);
    }

    #[test]
    fn accepted_match_fans_out_participants_for_further_expansion() {
        let gateway = Arc::new(MockGateway::new());
        gateway.match_lists.lock().unwrap().insert(1, vec![100]);
        gateway
            .matches
            .lock()
            .unwrap()
            .insert(100, sample_record(100, 11, vec![1, 2, 3], "5.20"));
        {
            let mut leagues = gateway.leagues.lock().unwrap();
            leagues.insert(1, Tier::Gold);
            leagues.insert(2, Tier::Gold);
            leagues.insert(3, Tier::Silver);
        }

        let sink = Arc::new(RecordingSink { records: StdMutex::new(Vec::new()) });
        let config = test_config(vec![1], Tier::Bronze, "");
        let (engine, _rt) = build_engine(gateway, sink.clone(), config, None);

        engine.run_until_drained(1, Duration::from_millis(10), Duration::from_secs(2));

        let mut analyzed = engine.analyzed_players_snapshot();
        analyzed.sort();
        assert_eq!(analyzed, vec![1, 2, 3]);
        assert_eq!(engine.downloaded_matches_snapshot(), vec![100]);
    }

    #[test]
    fn resuming_from_a_checkpoint_refetches_nothing_already_downloaded() {
        let gateway = Arc::new(MockGateway::new());
        // If the engine were to re-fetch match 100, it would find it here
        // and the test would still pass; the call-count assertion below is
        // what actually guards against a re-fetch.
        gateway
            .matches
            .lock()
            .unwrap()
            .insert(100, sample_record(100, 11, vec![1], "5.20"));

        let sink = Arc::new(RecordingSink { records: StdMutex::new(Vec::new()) });
        let config = test_config(vec![], Tier::Bronze, "");
        let resume = CheckpointData {
            players_to_analyze: Vec::new(),
            analyzed_players: Vec::new(),
            matches_to_download: vec![100],
            downloaded_matches: vec![100],
        };
        let (engine, _rt) = build_engine(Arc::clone(&gateway), sink.clone(), config, Some(resume));

        engine.run_until_drained(1, Duration::from_millis(10), Duration::from_secs(2));

        assert!(sink.records.lock().unwrap().is_empty());
        assert_eq!(gateway.get_match_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn patch_change_clears_the_downloaded_matches_dedup_set() {
        let gateway = Arc::new(MockGateway::new());
        *gateway.latest_patch.lock().unwrap() = "5.19".to_string();

        let sink = Arc::new(RecordingSink { records: StdMutex::new(Vec::new()) });
        let config = test_config(vec![], Tier::Bronze, "latest");
        let resume = CheckpointData {
            players_to_analyze: Vec::new(),
            analyzed_players: Vec::new(),
            matches_to_download: Vec::new(),
            downloaded_matches: vec![999],
        };
        let (engine, rt) = build_engine(Arc::clone(&gateway), sink.clone(), config, Some(resume));

        // Prime the cache with the current patch, then flip the upstream
        // value and let the short test TTL expire so the next lookup
        // observes a change.
        rt.block_on(engine.shared.patch_tracker.latest_patch(gateway.as_ref()))
            .unwrap();
        *gateway.latest_patch.lock().unwrap() = "5.20".to_string();
        std::thread::sleep(Duration::from_millis(5));

        gateway.match_lists.lock().unwrap().insert(1, vec![100]);
        gateway
            .matches
            .lock()
            .unwrap()
            .insert(100, sample_record(100, 11, vec![1], "5.20"));
        gateway.leagues.lock().unwrap().insert(1, Tier::Gold);

        {
            let mut pta = engine.shared.pta_lock.lock().unwrap();
            pta.players_to_analyze.insert(1);
        }

        engine.run_until_drained(1, Duration::from_millis(10), Duration::from_secs(2));

        assert_eq!(sink.records.lock().unwrap().len(), 1);
        // The patch-change clear wipes the whole dedup set, including the
        // id just inserted for this match — matching the upstream clear
        // semantics this branch mirrors.
        assert!(engine.downloaded_matches_snapshot().is_empty());
    }
}
