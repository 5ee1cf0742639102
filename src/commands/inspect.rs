use crate::config::Config;
use crate::error::Result;
use crate::store::{DraftStore, OwnerKey};
use colored::Colorize;
use prettytable::{format, Table};

/// Show the drafts held for a session credential, newest first.
///
/// The first row is what the restore prompt would offer. With
/// `show_payload`, that draft's payload is printed as JSON.
pub fn handle_inspect(config: &Config, session: &str, show_payload: bool) -> Result<()> {
    let store = DraftStore::open(&config.store)?;
    let owner = OwnerKey::from_credential(session);
    let drafts = store.list_for_session(&owner)?;

    if drafts.is_empty() {
        println!("{}", "No drafts for this session.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Updated".bold(),
        "Fields".bold(),
        "Checksum".bold()
    ]);

    for (index, draft) in drafts.iter().enumerate() {
        let id = if index == 0 {
            format!("{} (latest)", draft.id).cyan()
        } else {
            draft.id.to_string().normal()
        };
        table.add_row(prettytable::row![
            id,
            draft.updated_at,
            draft.payload.len(),
            &draft.checksum[..draft.checksum.len().min(12)]
        ]);
    }

    println!("\nDrafts for session {}:", owner.short().cyan());
    table.printstd();
    println!();

    if show_payload {
        let latest = &drafts[0];
        println!("{}", serde_json::to_string_pretty(&latest.payload)?);
    }

    Ok(())
}
