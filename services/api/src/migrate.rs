use approval_desk::error::AppError;
use approval_desk::workflows::submissions::{migrate_collection, MigrationReport};
use clap::Args;
use std::path::PathBuf;
use tracing::warn;

#[derive(Args, Debug)]
pub(crate) struct MigrateArgs {
    /// Legacy export: a JSON object keyed by collaborator e-mail.
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Where to write the migrated records; stdout when omitted.
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) fn run_migration(args: MigrateArgs) -> Result<(), AppError> {
    let raw = std::fs::read_to_string(&args.input)?;
    let report = migrate(&raw)?;
    let rendered = serde_json::to_string_pretty(&report.submissions)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            println!(
                "Migrated {} submission(s) into {}",
                report.submissions.len(),
                path.display()
            );
            println!("Load them with `serve --seed {}`", path.display());
        }
        None => println!("{rendered}"),
    }

    for skipped in &report.skipped {
        warn!(
            owner = %skipped.owner,
            index = skipped.index,
            reason = %skipped.reason,
            "legacy entry skipped"
        );
        eprintln!(
            "skipped {}[{}]: {}",
            skipped.owner, skipped.index, skipped.reason
        );
    }

    Ok(())
}

fn migrate(raw: &str) -> Result<MigrationReport, AppError> {
    let export: serde_json::Value = serde_json::from_str(raw)?;
    Ok(migrate_collection(export)?)
}
