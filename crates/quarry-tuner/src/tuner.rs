//! AdaptiveTuner: periodic analysis, optional auto-apply.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, warn};

use quarry_core::config::TunerConfig;
use quarry_observability::events;

use crate::hardware::HardwareProfile;
use crate::recommend::{classify, recommend, TuningRecommendations};
use crate::workload::WorkloadProfile;

/// A component that can adopt recommendations.
pub trait ITuningTarget: Send + Sync {
    fn apply_tuning(&self, recommendations: &TuningRecommendations);
}

pub struct AdaptiveTuner {
    config: TunerConfig,
    hardware: RwLock<HardwareProfile>,
    /// Re-probe available memory on each tick; off for fixed profiles.
    probe_host: bool,
    workload: WorkloadProfile,
    latest: RwLock<Option<TuningRecommendations>>,
    targets: RwLock<Vec<Arc<dyn ITuningTarget>>>,
}

impl AdaptiveTuner {
    pub fn new(config: TunerConfig) -> Self {
        let hardware = HardwareProfile::detect(config.accelerator);
        Self {
            probe_host: true,
            ..Self::with_hardware(config, hardware)
        }
    }

    pub fn with_hardware(config: TunerConfig, hardware: HardwareProfile) -> Self {
        let workload = WorkloadProfile::new(
            Duration::from_secs(config.history_window_secs),
            config.history_max_events,
        );
        Self {
            config,
            hardware: RwLock::new(hardware),
            probe_host: false,
            workload,
            latest: RwLock::new(None),
            targets: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn workload(&self) -> &WorkloadProfile {
        &self.workload
    }

    pub fn hardware(&self) -> HardwareProfile {
        self.hardware.read().clone()
    }

    pub fn is_auto_apply(&self) -> bool {
        self.config.auto_apply
    }

    pub fn add_target(&self, target: Arc<dyn ITuningTarget>) {
        self.targets.write().push(target);
    }

    /// Recommendations for the current workload, without applying them.
    pub fn recommendations(&self) -> TuningRecommendations {
        let rates = self.workload.rates();
        let mode = classify(&rates, &self.config);
        recommend(&self.hardware.read(), mode, rates)
    }

    /// The result of the last analysis tick, if any.
    pub fn latest(&self) -> Option<TuningRecommendations> {
        self.latest.read().clone()
    }

    /// One analysis tick: refresh memory, recommend, then apply or log.
    pub fn analyze(&self) -> TuningRecommendations {
        if self.probe_host {
            self.hardware.write().refresh();
        }
        let rec = self.recommendations();

        let mode = rec.mode.to_string();
        if self.config.auto_apply {
            for target in self.targets.read().iter() {
                target.apply_tuning(&rec);
            }
            events::tuning_applied(&mode, rec.batch_size, rec.cache_size, rec.worker_count);
        } else {
            events::tuning_suggested(&mode, rec.batch_size, rec.cache_size, rec.worker_count);
        }
        *self.latest.write() = Some(rec.clone());
        rec
    }

    /// Run `analyze` every `analysis_interval_secs` until the handle stops.
    pub fn spawn_loop(self: &Arc<Self>) -> Option<TunerHandle> {
        let interval = Duration::from_secs(self.config.analysis_interval_secs.max(1));
        self.spawn_loop_every(interval)
    }

    pub fn spawn_loop_every(self: &Arc<Self>, interval: Duration) -> Option<TunerHandle> {
        let (stop, stopped) = mpsc::channel::<()>();
        let tuner = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("quarry-tuner".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let rec = tuner.analyze();
                        debug!(mode = %rec.mode, "tuner tick");
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });
        match spawned {
            Ok(join) => Some(TunerHandle {
                stop: Some(stop),
                join: Some(join),
            }),
            Err(e) => {
                warn!(error = %e, "failed to spawn tuner thread");
                None
            }
        }
    }
}

/// Stops the tuner loop when dropped.
pub struct TunerHandle {
    stop: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl TunerHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.take();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("tuner thread panicked");
            }
        }
    }
}

impl Drop for TunerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
