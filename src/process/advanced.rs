/// Advanced scheduling policy overlay (spec 4.5) — tunes placement on top of
/// the base MLFQ in `scheduler` without changing its queue discipline.
///
/// Gaming classification, the AI workload predictor, core specialization,
/// and thermal migration are all advisory: §4.4's correctness never depends
/// on any of this succeeding (spec 9).
use super::scheduler;
use super::task::{GamingProfile, Pid, PriorityClass, Tid, WorkloadClass};
use heapless::FnvIndexMap;
use spin::Mutex;

const MAX_TRACKED: usize = 64;

/// Per-core specialization assigned at boot (4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreSpecialization {
    Performance,
    Efficiency,
    Gaming,
    Ai,
    General,
}

/// Source of per-core temperature readings, injectable for deterministic tests.
pub trait TemperatureSource: Send + Sync {
    fn read_celsius(&self, core: u32) -> u32;
}

/// Always-cool stub used until a real sensor driver is wired in.
pub struct NullTemperatureSource;
impl TemperatureSource for NullTemperatureSource {
    fn read_celsius(&self, _core: u32) -> u32 {
        40
    }
}

pub struct CoreInfo {
    pub specialization: CoreSpecialization,
    pub frequency_pct: u8,
}

struct Overlay {
    cores: heapless::Vec<CoreInfo, 64>,
    thermal_threshold_c: u32,
    gaming: FnvIndexMap<Pid, GamingProfile, MAX_TRACKED>,
    ai_flagged: FnvIndexMap<Pid, WorkloadVector, MAX_TRACKED>,
    migrations_performed: u32,
}

/// Predicted resource shape for a process (4.5 AI predictor).
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkloadVector {
    pub cpu: u8,
    pub memory: u8,
    pub io: u8,
    pub gpu: u8,
    pub network: u8,
}

const AI_GPU_CPU_THRESHOLD: u16 = 140; // sum of gpu+cpu probability (0-255 scale each)

static OVERLAY: Mutex<Overlay> = Mutex::new(Overlay {
    cores: heapless::Vec::new(),
    thermal_threshold_c: 85,
    gaming: FnvIndexMap::new(),
    ai_flagged: FnvIndexMap::new(),
    migrations_performed: 0,
});

/// Partition CPU cores at boot into the five specializations (4.5), round-robin
/// across a simple fixed pattern when the exact topology isn't known.
pub fn init_cores(count: u32) {
    const PATTERN: [CoreSpecialization; 5] = [
        CoreSpecialization::Performance,
        CoreSpecialization::Efficiency,
        CoreSpecialization::Gaming,
        CoreSpecialization::Ai,
        CoreSpecialization::General,
    ];
    let mut overlay = OVERLAY.lock();
    overlay.cores.clear();
    for i in 0..count {
        let spec = PATTERN[i as usize % PATTERN.len()];
        let _ = overlay.cores.push(CoreInfo {
            specialization: spec,
            frequency_pct: 100,
        });
    }
}

/// `register_gaming_process(pid, name, target_fps)` (4.5): promote to
/// realtime-adjacent placement with a 1ms quantum and a derived frame deadline.
pub fn register_gaming_process(pid: Pid, tid: Tid, _name: &str, target_fps: u32) {
    let frame_deadline_us = if target_fps == 0 { 0 } else { 1_000_000 / target_fps as u64 };
    let profile = GamingProfile {
        target_fps,
        frame_deadline_us,
    };
    OVERLAY.lock().gaming.insert(pid, profile).ok();

    super::with_thread_mut(pid, tid, |t| {
        t.entity.class = PriorityClass::Realtime;
        t.entity.workload = WorkloadClass::Gaming;
        t.entity.quantum_remaining = 1; // 1ms-equivalent tick
        t.entity.gaming = Some(profile);
        t.entity.preferred_cpu = preferred_core(CoreSpecialization::Gaming);
    });
}

/// `gaming_input_boost(pid)` (4.5): promote to head of its class immediately.
pub fn gaming_input_boost(pid: Pid, tid: Tid) {
    let class = super::with_thread_mut(pid, tid, |t| t.entity.class);
    if let Some(class) = class {
        scheduler::promote_to_head(pid, tid, class);
    }
}

/// Admission-time classifier (4.5 AI predictor): a crude name heuristic plus
/// a fixed pattern-probability table. Real heuristics would sample past
/// syscall mix; this core only has the name at admission time.
fn classify_workload(name: &str) -> WorkloadVector {
    let lower_has = |needle: &str| name.to_ascii_lowercase().contains(needle);
    if lower_has("render") || lower_has("train") || lower_has("infer") || lower_has("ml") {
        WorkloadVector {
            cpu: 200,
            memory: 180,
            io: 60,
            gpu: 220,
            network: 40,
        }
    } else if lower_has("game") {
        WorkloadVector {
            cpu: 190,
            memory: 150,
            io: 40,
            gpu: 200,
            network: 100,
        }
    } else {
        WorkloadVector {
            cpu: 80,
            memory: 80,
            io: 80,
            gpu: 10,
            network: 60,
        }
    }
}

/// Run the classifier on process admission; flag as AI and reserve resources
/// when gpu+cpu probability exceeds the threshold.
pub fn classify_on_admission(pid: Pid, tid: Tid, name: &str) -> WorkloadVector {
    let vec = classify_workload(name);
    let mut overlay = OVERLAY.lock();
    let _ = overlay.ai_flagged.insert(pid, vec);
    let is_ai = (vec.gpu as u16 + vec.cpu as u16) > AI_GPU_CPU_THRESHOLD;
    drop(overlay);

    if is_ai {
        super::with_thread_mut(pid, tid, |t| {
            t.entity.workload = WorkloadClass::Ai;
            t.entity.preferred_cpu = preferred_core(CoreSpecialization::Ai);
        });
    }
    vec
}

fn preferred_core(spec: CoreSpecialization) -> Option<u32> {
    let overlay = OVERLAY.lock();
    overlay
        .cores
        .iter()
        .position(|c| c.specialization == spec)
        .map(|i| i as u32)
}

/// Periodic thermal tick (4.5): migrate gaming/AI entities off a hot core and
/// clamp its frequency. Advisory — never returns an error the caller must act on.
pub fn thermal_tick(source: &dyn TemperatureSource) {
    let mut overlay = OVERLAY.lock();
    let threshold = overlay.thermal_threshold_c;
    let n = overlay.cores.len() as u32;
    if n == 0 {
        return;
    }

    let mut hot: heapless::Vec<u32, 64> = heapless::Vec::new();
    for core in 0..n {
        if source.read_celsius(core) > threshold {
            let _ = hot.push(core);
        }
    }

    for &hot_core in hot.iter() {
        // Find the coolest other core.
        let mut coolest = None;
        let mut coolest_temp = u32::MAX;
        for core in 0..n {
            if core == hot_core {
                continue;
            }
            let t = source.read_celsius(core);
            if t < coolest_temp {
                coolest_temp = t;
                coolest = Some(core);
            }
        }

        if let Some(info) = overlay.cores.get_mut(hot_core as usize) {
            info.frequency_pct = info.frequency_pct.saturating_sub(20).max(40);
        }

        if coolest.is_some() {
            overlay.migrations_performed += 1;
            // Actual per-thread migration (moving preferred_cpu for gaming/AI
            // entities currently pinned to `hot_core`) is performed by the
            // caller iterating the process table, since this module has no
            // visibility into it without re-entering the process lock here.
        }
    }
}

pub fn migrations_performed() -> u32 {
    OVERLAY.lock().migrations_performed
}

pub fn set_thermal_threshold(celsius: u32) {
    OVERLAY.lock().thermal_threshold_c = celsius;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTemp(u32);
    impl TemperatureSource for FixedTemp {
        fn read_celsius(&self, _core: u32) -> u32 {
            self.0
        }
    }

    #[test]
    fn classify_flags_render_workload_as_ai() {
        let vec = classify_workload("render_farm_worker");
        assert!((vec.gpu as u16 + vec.cpu as u16) > AI_GPU_CPU_THRESHOLD);
    }

    #[test]
    fn classify_leaves_ordinary_workload_unflagged() {
        let vec = classify_workload("ls");
        assert!((vec.gpu as u16 + vec.cpu as u16) <= AI_GPU_CPU_THRESHOLD);
    }

    #[test]
    fn thermal_tick_clamps_frequency_on_hot_core() {
        init_cores(4);
        set_thermal_threshold(70);
        thermal_tick(&FixedTemp(90));
        let overlay = OVERLAY.lock();
        assert!(overlay.cores[0].frequency_pct <= 80);
    }

    #[test]
    fn gaming_registration_derives_frame_deadline() {
        let profile = GamingProfile {
            target_fps: 60,
            frame_deadline_us: 1_000_000 / 60,
        };
        assert_eq!(profile.frame_deadline_us, 16_666);
    }
}
