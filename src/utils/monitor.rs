use crate::domain::model::Stage;
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, RefreshKind, System};

#[derive(Debug, Clone)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed: Duration,
}

/// 追蹤每個步驟耗時；啟用 `cli` 時另外記錄行程記憶體
pub struct RunMonitor {
    enabled: bool,
    started: Instant,
    stage_started: Option<(Stage, Instant)>,
    timings: Vec<StageTiming>,
    #[cfg(feature = "cli")]
    system: Option<(System, Pid)>,
}

impl RunMonitor {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            started: Instant::now(),
            stage_started: None,
            timings: Vec::new(),
            #[cfg(feature = "cli")]
            system: if enabled {
                sysinfo::get_current_pid().ok().map(|pid| {
                    let mut system = System::new_with_specifics(RefreshKind::everything());
                    system.refresh_all();
                    (system, pid)
                })
            } else {
                None
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stage_started(&mut self, stage: Stage) {
        self.finish_current();
        self.stage_started = Some((stage, Instant::now()));
    }

    /// Close the open stage, if any, and record its duration.
    pub fn finish_current(&mut self) {
        if let Some((stage, started)) = self.stage_started.take() {
            let elapsed = started.elapsed();
            self.timings.push(StageTiming { stage, elapsed });
            if self.enabled {
                self.log_stage(stage, elapsed);
            }
        }
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    #[cfg(feature = "cli")]
    fn memory_mb(&mut self) -> Option<u64> {
        let (system, pid) = self.system.as_mut()?;
        system.refresh_all();
        system.process(*pid).map(|p| p.memory() / 1024 / 1024)
    }

    #[cfg(not(feature = "cli"))]
    fn memory_mb(&mut self) -> Option<u64> {
        None
    }

    fn log_stage(&mut self, stage: Stage, elapsed: Duration) {
        match self.memory_mb() {
            Some(mb) => tracing::info!("📊 {} - Time: {:?}, Memory: {}MB", stage, elapsed, mb),
            None => tracing::info!("📊 {} - Time: {:?}", stage, elapsed),
        }
    }

    pub fn log_final_stats(&mut self) {
        self.finish_current();
        if self.enabled {
            tracing::info!("📊 Final Stats - Total Time: {:?}", self.started.elapsed());
        }
    }
}

impl Default for RunMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_each_stage_once() {
        let mut monitor = RunMonitor::new(false);
        monitor.stage_started(Stage::Authenticating);
        monitor.stage_started(Stage::Fetching);
        monitor.log_final_stats();

        let stages: Vec<Stage> = monitor.timings().iter().map(|t| t.stage).collect();
        assert_eq!(stages, vec![Stage::Authenticating, Stage::Fetching]);

        // 沒有開啟中的步驟時不重複記錄
        monitor.finish_current();
        assert_eq!(monitor.timings().len(), 2);
    }
}
