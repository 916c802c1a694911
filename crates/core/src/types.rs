//! Shared primitive types.

/// Wall-clock time as whole seconds since the Unix epoch.
///
/// `submit_time` and `complete_time` on a job record use this unit.
pub type EpochSecs = i64;

/// Current wall-clock time in epoch seconds.
pub fn now_epoch_secs() -> EpochSecs {
    chrono::Utc::now().timestamp()
}
