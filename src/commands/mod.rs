/*!
Command handlers for the CLI

Each subcommand of `metadraft` maps to one handler here:

- `serve`: run the draft HTTP service
- `sweep`: one retention pass over the store
- `inspect`: operator view of a session's drafts

Handlers open the draft store from the loaded configuration and stay thin;
the behavior lives in `store` and `server`.
*/

use crate::config::Config;
use crate::error::Result;
use crate::store::DraftStore;
use std::sync::Arc;

pub mod inspect;

// Draft service handler
pub mod serve {
    //! Runs the HTTP service over the configured store.

    use super::*;

    /// Start the draft service
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (already validated)
    /// * `bind` - Optional listen address overriding `server.bind`
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the address cannot
    /// be bound.
    pub async fn run_serve(mut config: Config, bind: Option<String>) -> Result<()> {
        if let Some(bind) = bind {
            tracing::debug!("Using bind override: {}", bind);
            config.server.bind = bind;
        }

        let store = Arc::new(DraftStore::open(&config.store)?);
        crate::server::serve(&config, store).await
    }
}

// Retention sweep handler
pub mod sweep {
    //! Runs one retention sweep and reports what it did.

    use super::*;
    use colored::Colorize;

    /// Sweep the store once
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or scanned.
    pub fn run_sweep(config: &Config) -> Result<()> {
        let store = DraftStore::open(&config.store)?;
        let report = store.sweep()?;

        println!(
            "Scanned {} records under {}",
            report.scanned,
            config.store.root.display()
        );
        if report.removed == 0 {
            println!("{}", "No expired drafts.".yellow());
        } else {
            println!(
                "{}",
                format!("Removed {} expired drafts", report.removed).green()
            );
        }
        if report.quarantined > 0 {
            println!(
                "{}",
                format!("Quarantined {} unreadable records", report.quarantined).red()
            );
        }
        Ok(())
    }
}
