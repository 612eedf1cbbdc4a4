pub mod clock;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;
pub mod sync;
pub mod util;

pub use commands::progress::ProgressState;
pub use config::ProgressConfig;
pub use engine::{ActivityOutcome, ActivityResult, ProgressEngine, ProgressEvent};
pub use error::{ProgressError, Result};
pub use model::{ActivityType, ModuleId, ProgressDocument};

/// Builds the session engine from `config`, loads progress and returns the
/// shared handle the command surface works on.
pub async fn start(config: &ProgressConfig) -> Result<ProgressState> {
    let mut engine = ProgressEngine::from_config(config)?;
    let doc = engine.load().await;
    tracing::info!(
        level = doc.user_profile.level,
        completed = doc.completed_module_ids.len(),
        offline = config.is_offline(),
        "Progress engine ready"
    );
    Ok(ProgressState::new(engine))
}
