//! Scripted mock hardware, tasks and prompts for engine tests
//!
//! The mocks carry cross-call state on purpose: drives remember lock and
//! eject counts, the decision handler can load a new medium into a drive
//! when prompted, and tasks fail on scripted attempts before succeeding.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use burnish_core::{
    BurnFlags, CapabilityResolver, ChecksumType, DataLossWarning, Decision, DecisionHandler,
    Drive, EngineConfig, Error, MediaIssue, MediaSet, Medium, Result, Session, Task, TaskAction,
    TaskMonitor, TaskProgress, Track, TrackSource, TrackType,
};

// ============================================================================
// Media and drives
// ============================================================================

/// Description of a medium to load into a mock drive
#[derive(Clone)]
pub struct MediumSpec {
    pub status: MediaSet,
    pub can_write: bool,
    pub can_rewrite: bool,
    pub mounted: bool,
    pub track_count: u32,
    pub next_writable_address: u64,
}

impl Default for MediumSpec {
    fn default() -> Self {
        Self {
            status: MediaSet::BLANK.union(MediaSet::WRITABLE).union(MediaSet::CD),
            can_write: true,
            can_rewrite: false,
            mounted: false,
            track_count: 0,
            next_writable_address: 0,
        }
    }
}

impl MediumSpec {
    pub fn blank_cd() -> Self {
        Self::default()
    }

    pub fn with_status(status: MediaSet) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn rewritable(mut self) -> Self {
        self.can_rewrite = true;
        self.status = self.status.union(MediaSet::REWRITABLE);
        self
    }
}

pub struct MockMedium {
    status: Mutex<MediaSet>,
    mounted: Mutex<bool>,
    can_write: bool,
    can_rewrite: bool,
    track_count: u32,
    next_writable_address: u64,
}

impl Medium for MockMedium {
    fn status(&self) -> MediaSet {
        *self.status.lock().unwrap()
    }

    fn is_mounted(&self) -> bool {
        *self.mounted.lock().unwrap()
    }

    fn unmount(&self) -> std::result::Result<(), String> {
        *self.mounted.lock().unwrap() = false;
        Ok(())
    }

    fn can_be_written(&self) -> bool {
        self.can_write
    }

    fn can_be_rewritten(&self) -> bool {
        self.can_rewrite
    }

    fn next_writable_address(&self) -> u64 {
        self.next_writable_address
    }

    fn track_count(&self) -> u32 {
        self.track_count
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DriveCounters {
    pub lock_calls: u32,
    pub unlock_calls: u32,
    pub eject_calls: u32,
    pub reprobe_calls: u32,
}

pub struct MockDrive {
    name: String,
    path: PathBuf,
    medium: Mutex<Option<Arc<MockMedium>>>,
    locked: Mutex<bool>,
    counters: Mutex<DriveCounters>,
    exclusive_denials: AtomicU32,
}

impl MockDrive {
    pub fn new(name: &str, path: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            path: PathBuf::from(path),
            medium: Mutex::new(None),
            locked: Mutex::new(false),
            counters: Mutex::new(DriveCounters::default()),
            exclusive_denials: AtomicU32::new(0),
        })
    }

    pub fn with_medium(name: &str, path: &str, spec: MediumSpec) -> Arc<Self> {
        let drive = Self::new(name, path);
        drive.load(spec);
        drive
    }

    pub fn load(&self, spec: MediumSpec) {
        *self.medium.lock().unwrap() = Some(Arc::new(MockMedium {
            status: Mutex::new(spec.status),
            mounted: Mutex::new(spec.mounted),
            can_write: spec.can_write,
            can_rewrite: spec.can_rewrite,
            track_count: spec.track_count,
            next_writable_address: spec.next_writable_address,
        }));
    }

    pub fn unload(&self) {
        *self.medium.lock().unwrap() = None;
    }

    pub fn is_locked(&self) -> bool {
        *self.locked.lock().unwrap()
    }

    pub fn counters(&self) -> DriveCounters {
        *self.counters.lock().unwrap()
    }

    pub fn deny_exclusive(&self, times: u32) {
        self.exclusive_denials.store(times, Ordering::SeqCst);
    }
}

impl Drive for MockDrive {
    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn device_path(&self) -> &Path {
        &self.path
    }

    fn medium(&self) -> Option<Arc<dyn Medium>> {
        self.medium
            .lock()
            .unwrap()
            .clone()
            .map(|medium| medium as Arc<dyn Medium>)
    }

    fn lock(&self, _reason: &str) -> std::result::Result<(), String> {
        self.counters.lock().unwrap().lock_calls += 1;
        *self.locked.lock().unwrap() = true;
        Ok(())
    }

    fn unlock(&self) -> bool {
        self.counters.lock().unwrap().unlock_calls += 1;
        *self.locked.lock().unwrap() = false;
        true
    }

    fn eject(&self) -> std::result::Result<(), String> {
        self.counters.lock().unwrap().eject_calls += 1;
        self.unload();
        Ok(())
    }

    fn reprobe(&self) {
        self.counters.lock().unwrap().reprobe_calls += 1;
    }

    fn can_use_exclusively(&self) -> bool {
        let remaining = self.exclusive_denials.load(Ordering::SeqCst);
        if remaining > 0 {
            self.exclusive_denials.store(remaining - 1, Ordering::SeqCst);
            false
        } else {
            true
        }
    }
}

// ============================================================================
// Decisions
// ============================================================================

/// What to do when the engine asks for a medium
pub enum InsertScript {
    /// Load the given medium into the drive, then proceed
    Load(Arc<MockDrive>, MediumSpec),
    /// Proceed without changing anything
    Proceed,
    /// Decline
    Cancel,
}

#[derive(Default)]
pub struct ScriptedDecisions {
    pub inserts: Mutex<VecDeque<InsertScript>>,
    pub insert_log: Mutex<Vec<(MediaIssue, MediaSet)>>,
    pub warning_log: Mutex<Vec<DataLossWarning>>,
    pub decline_warnings: AtomicBool,
    pub joliet_cancel: AtomicBool,
    pub locations: Mutex<VecDeque<Option<PathBuf>>>,
    pub dummy_cancel: AtomicBool,
    pub dummy_calls: AtomicU32,
}

impl ScriptedDecisions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_insert(&self, script: InsertScript) {
        self.inserts.lock().unwrap().push_back(script);
    }

    pub fn insert_prompts(&self) -> Vec<(MediaIssue, MediaSet)> {
        self.insert_log.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<DataLossWarning> {
        self.warning_log.lock().unwrap().clone()
    }
}

impl DecisionHandler for ScriptedDecisions {
    fn insert_medium(&self, _drive: &str, issue: MediaIssue, required: MediaSet) -> Decision {
        self.insert_log.lock().unwrap().push((issue, required));
        match self.inserts.lock().unwrap().pop_front() {
            Some(InsertScript::Load(drive, spec)) => {
                drive.load(spec);
                Decision::Proceed
            }
            Some(InsertScript::Proceed) => Decision::Proceed,
            Some(InsertScript::Cancel) | None => Decision::Cancel,
        }
    }

    fn accept_data_loss(&self, warning: DataLossWarning) -> Decision {
        self.warning_log.lock().unwrap().push(warning);
        if self.decline_warnings.load(Ordering::SeqCst) {
            Decision::Cancel
        } else {
            Decision::Proceed
        }
    }

    fn alternate_location(&self, _error: &Error, _is_temporary: bool) -> Option<PathBuf> {
        self.locations.lock().unwrap().pop_front().flatten()
    }

    fn disable_joliet(&self) -> Decision {
        if self.joliet_cancel.load(Ordering::SeqCst) {
            Decision::Cancel
        } else {
            Decision::Proceed
        }
    }

    fn dummy_success(&self) -> Decision {
        self.dummy_calls.fetch_add(1, Ordering::SeqCst);
        if self.dummy_cancel.load(Ordering::SeqCst) {
            Decision::Cancel
        } else {
            Decision::Proceed
        }
    }
}

/// Handle the engine owns while the test keeps the Arc for assertions
pub struct HandlerRef(pub Arc<ScriptedDecisions>);

impl DecisionHandler for HandlerRef {
    fn insert_medium(&self, drive: &str, issue: MediaIssue, required: MediaSet) -> Decision {
        self.0.insert_medium(drive, issue, required)
    }

    fn accept_data_loss(&self, warning: DataLossWarning) -> Decision {
        self.0.accept_data_loss(warning)
    }

    fn alternate_location(&self, error: &Error, is_temporary: bool) -> Option<PathBuf> {
        self.0.alternate_location(error, is_temporary)
    }

    fn disable_joliet(&self) -> Decision {
        self.0.disable_joliet()
    }

    fn dummy_success(&self) -> Decision {
        self.0.dummy_success()
    }
}

// ============================================================================
// Tasks
// ============================================================================

pub struct ScriptedTask {
    action: TaskAction,
    check_failures: Mutex<VecDeque<Error>>,
    run_failures: Mutex<VecDeque<Error>>,
    run_calls: AtomicU32,
    check_calls: AtomicU32,
    running: AtomicBool,
    output_size: u64,
    checksum: Mutex<Option<(ChecksumType, String)>>,
}

impl ScriptedTask {
    pub fn new(action: TaskAction) -> Arc<Self> {
        Arc::new(Self {
            action,
            check_failures: Mutex::new(VecDeque::new()),
            run_failures: Mutex::new(VecDeque::new()),
            run_calls: AtomicU32::new(0),
            check_calls: AtomicU32::new(0),
            running: AtomicBool::new(false),
            output_size: 2048,
            checksum: Mutex::new(None),
        })
    }

    pub fn sized(action: TaskAction, output_size: u64) -> Arc<Self> {
        let mut task = Self::new(action);
        Arc::get_mut(&mut task).unwrap().output_size = output_size;
        task
    }

    /// Queue a failure for the next run attempt
    pub fn fail_run(self: &Arc<Self>, err: Error) -> Arc<Self> {
        self.run_failures.lock().unwrap().push_back(err);
        Arc::clone(self)
    }

    /// Queue a failure for the next dry-run attempt
    pub fn fail_check(self: &Arc<Self>, err: Error) -> Arc<Self> {
        self.check_failures.lock().unwrap().push_back(err);
        Arc::clone(self)
    }

    /// Report this checksum on every successful run
    pub fn with_checksum(self: &Arc<Self>, kind: ChecksumType, value: &str) -> Arc<Self> {
        *self.checksum.lock().unwrap() = Some((kind, value.to_string()));
        Arc::clone(self)
    }

    pub fn runs(&self) -> u32 {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn checks(&self) -> u32 {
        self.check_calls.load(Ordering::SeqCst)
    }
}

impl Task for ScriptedTask {
    fn action(&self) -> TaskAction {
        self.action
    }

    fn run(&self, monitor: &dyn TaskMonitor) -> Result<()> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        monitor.progress_changed(0.5, Some(Duration::from_secs(1)));

        let failure = self.run_failures.lock().unwrap().pop_front();
        self.running.store(false, Ordering::SeqCst);

        match failure {
            Some(err) => Err(err),
            None => {
                monitor.progress_changed(1.0, None);
                if let Some((kind, value)) = self.checksum.lock().unwrap().clone() {
                    monitor.checksum_computed(kind, &value);
                }
                Ok(())
            }
        }
    }

    fn check(&self, _monitor: &dyn TaskMonitor) -> Result<()> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        match self.check_failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn cancel(&self, _protect: bool) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn output_size(&self) -> Result<u64> {
        Ok(self.output_size)
    }

    fn progress(&self) -> Option<TaskProgress> {
        Some(TaskProgress {
            written: 1024,
            rate: 4096,
            remaining: Some(Duration::from_secs(1)),
        })
    }
}

// ============================================================================
// Resolver
// ============================================================================

type OutputFilter = Box<dyn Fn(&TrackType) -> bool + Send + Sync>;

#[derive(Default)]
pub struct ScriptedResolver {
    pipelines: Mutex<VecDeque<Vec<Arc<dyn Task>>>>,
    blank_tasks: Mutex<VecDeque<Arc<dyn Task>>>,
    checksum_tasks: Mutex<VecDeque<Arc<dyn Task>>>,
    supported: Mutex<BurnFlags>,
    compulsory: Mutex<BurnFlags>,
    output_filter: Mutex<Option<OutputFilter>>,
    can_blank: AtomicBool,
    /// Session flags observed at each pipeline build
    build_flags: Mutex<Vec<BurnFlags>>,
    /// (track number, address range) of the session's last track at each
    /// checksum-task build
    verify_tracks: Mutex<Vec<(Option<u32>, Option<(u64, u64)>)>>,
}

impl ScriptedResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_pipeline(&self, tasks: Vec<Arc<dyn Task>>) {
        self.pipelines.lock().unwrap().push_back(tasks);
    }

    pub fn queue_blank_task(&self, task: Arc<dyn Task>) {
        self.blank_tasks.lock().unwrap().push_back(task);
    }

    pub fn queue_checksum_task(&self, task: Arc<dyn Task>) {
        self.checksum_tasks.lock().unwrap().push_back(task);
    }

    pub fn set_supported(&self, flags: BurnFlags) {
        *self.supported.lock().unwrap() = flags;
    }

    pub fn set_compulsory(&self, flags: BurnFlags) {
        *self.compulsory.lock().unwrap() = flags;
    }

    pub fn set_output_filter<F>(&self, filter: F)
    where
        F: Fn(&TrackType) -> bool + Send + Sync + 'static,
    {
        *self.output_filter.lock().unwrap() = Some(Box::new(filter));
    }

    pub fn set_can_blank(&self, can: bool) {
        self.can_blank.store(can, Ordering::SeqCst);
    }

    pub fn build_flags(&self) -> Vec<BurnFlags> {
        self.build_flags.lock().unwrap().clone()
    }

    pub fn verify_tracks(&self) -> Vec<(Option<u32>, Option<(u64, u64)>)> {
        self.verify_tracks.lock().unwrap().clone()
    }
}

impl CapabilityResolver for ScriptedResolver {
    fn build_pipeline(&self, session: &Session) -> Result<Vec<Arc<dyn Task>>> {
        self.build_flags.lock().unwrap().push(session.flags());
        self.pipelines
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(Error::NotSupported)
    }

    fn blanking_task(&self, _session: &Session) -> Result<Arc<dyn Task>> {
        self.blank_tasks
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(Error::NotSupported)
    }

    fn checksum_task(&self, session: &Session) -> Result<Arc<dyn Task>> {
        if let Some(track) = session.tracks().last() {
            let track_num = match track.source() {
                TrackSource::Disc { track_num, .. } => *track_num,
                _ => None,
            };
            self.verify_tracks
                .lock()
                .unwrap()
                .push((track_num, track.address_range()));
        }

        self.checksum_tasks
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(Error::NotSupported)
    }

    fn output_supported(&self, _session: &Session, output: &TrackType) -> bool {
        match &*self.output_filter.lock().unwrap() {
            Some(filter) => filter(output),
            None => true,
        }
    }

    fn burn_flags(&self, _session: &Session) -> Result<(BurnFlags, BurnFlags)> {
        Ok((
            *self.supported.lock().unwrap(),
            *self.compulsory.lock().unwrap(),
        ))
    }

    fn can_blank(&self, _session: &Session) -> bool {
        self.can_blank.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Engine config with all delays shrunk for fast tests
pub fn test_config() -> EngineConfig {
    EngineConfig::new()
        .eject_attempts(3)
        .eject_settle(Duration::from_millis(1))
        .reprobe_interval(Duration::from_millis(1))
        .exclusive_retry(Duration::from_millis(1))
        .dma_backoff(Duration::from_millis(1))
        .checksum_settle(Duration::from_millis(1))
}

/// A session with one data track burning to the given drive
pub fn disc_session(burner: &Arc<MockDrive>) -> Session {
    let mut session = Session::new();
    session.add_track(Track::data(true));
    session.set_burner(Arc::clone(burner) as Arc<dyn Drive>);
    session
}
