use std::path::Path;

use fodmap_core::storage::ImportOptions;

use crate::context::AppContext;
use crate::error::CliError;

pub fn run_export(ctx: &AppContext, output_path: Option<&Path>) -> Result<(), CliError> {
    let rendered = ctx.store.export_document()?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

/// Replace local data with an exported document. The import counts as a
/// fresh local change, so the next sync pushes it.
pub async fn run_import(ctx: &mut AppContext, path: &Path) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(path)?;
    ctx.store.import_document(&raw, ImportOptions::from_user())?;

    let document = ctx.store.document();
    println!(
        "Imported {} foods in {} categories",
        document.food_count(),
        document.categories().len()
    );

    ctx.after_mutation().await;
    Ok(())
}
