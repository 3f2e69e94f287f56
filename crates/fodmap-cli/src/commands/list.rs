use crate::commands::common::{collect_food_items, format_document_lines};
use crate::context::AppContext;
use crate::error::CliError;

pub fn run_list(ctx: &AppContext, category: Option<&str>, as_json: bool) -> Result<(), CliError> {
    let document = ctx.store.document();

    if as_json {
        let items = collect_food_items(&document, category)?;
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    let lines = format_document_lines(&document, category)?;
    if lines.is_empty() {
        println!("No categories yet. Add one with `myfodmap category add <name>`.");
        return Ok(());
    }
    for line in lines {
        println!("{line}");
    }
    Ok(())
}
