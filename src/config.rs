use crate::types::MAX_TRACKED_DEVICE_COUNT;
use crate::{Result, VrPoseError};

pub const ENV_THREAD_NAME: &str = "VRPOSE_THREAD_NAME";
pub const ENV_MAX_SLOTS: &str = "VRPOSE_MAX_SLOTS";
pub const ENV_STACK_SIZE: &str = "VRPOSE_STACK_SIZE";

/// Settings for the pose worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Name given to the worker thread.
    pub thread_name: String,
    /// Number of tracking slots requested from the device per query.
    pub max_slots: usize,
    /// Worker stack size in bytes. `None` keeps the platform default.
    pub stack_size: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thread_name: "vrpose-worker".into(),
            max_slots: MAX_TRACKED_DEVICE_COUNT,
            stack_size: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `VRPOSE_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            thread_name: read_env_string(ENV_THREAD_NAME, &defaults.thread_name),
            max_slots: read_env_usize(ENV_MAX_SLOTS, defaults.max_slots),
            stack_size: read_env_opt_usize(ENV_STACK_SIZE),
        };
        log::debug!(
            "pipeline config: thread={} maxSlots={} stackSize={:?}",
            config.thread_name,
            config.max_slots,
            config.stack_size
        );
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_slots == 0 || self.max_slots > MAX_TRACKED_DEVICE_COUNT {
            return Err(VrPoseError::InvalidArgument(format!(
                "max_slots must be in 1..={}, got {}",
                MAX_TRACKED_DEVICE_COUNT, self.max_slots
            )));
        }
        if self.thread_name.contains('\0') {
            return Err(VrPoseError::InvalidArgument(
                "thread_name must not contain NUL".into(),
            ));
        }
        Ok(())
    }
}

fn read_env_usize(name: &str, default: usize) -> usize {
    match std::env::var(name) {
        Ok(v) => v.trim().parse::<usize>().unwrap_or_else(|_| {
            log::warn!("Ignoring {}='{}', using {}", name, v, default);
            default
        }),
        Err(_) => default,
    }
}

fn read_env_opt_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
}

fn read_env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
