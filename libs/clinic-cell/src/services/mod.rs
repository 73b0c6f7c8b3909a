pub mod directory;
pub mod supabase;

pub use directory::*;
pub use supabase::*;

use std::sync::Arc;

use tracing::info;

use shared_config::AppConfig;

/// Supabase when configured, otherwise an in-process directory.
pub fn directory_from_config(config: &AppConfig) -> Arc<dyn ClinicDirectory> {
    if config.is_supabase_configured() {
        info!("Using Supabase clinic directory at {}", config.supabase_url);
        Arc::new(SupabaseDirectory::new(config))
    } else {
        info!("Supabase not configured, using in-memory clinic directory");
        Arc::new(InMemoryDirectory::new())
    }
}
