// ============================================
// Background Jobs Module (後台任務模組)
// ============================================
//
// Contains background job runners for:
// 1. Periodic CF model retraining from the interaction store
//
// The worker binary spawns the retrain job next to the engine; setting
// RETRAIN__RUN_ONCE=true turns it into a single pass.

pub mod cf_retrain;

pub use cf_retrain::{run_cf_retrain_job, CfRetrainJob, RetrainStats};
