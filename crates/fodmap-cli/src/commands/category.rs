use crate::cli::CategoryCommands;
use crate::context::AppContext;
use crate::error::CliError;

pub async fn run_category(ctx: &mut AppContext, command: CategoryCommands) -> Result<(), CliError> {
    match command {
        CategoryCommands::Add { name } => {
            ctx.store.add_category(&name)?;
            println!("Added category '{}'", name.trim());
        }
        CategoryCommands::Rename { old_name, new_name } => {
            if !ctx.store.rename_category(&old_name, &new_name)? {
                println!("Category '{old_name}' unchanged");
                return Ok(());
            }
            println!("Renamed category '{old_name}' to '{}'", new_name.trim());
        }
        CategoryCommands::Delete { name } => {
            ctx.store.delete_category(&name)?;
            println!("Deleted category '{name}'");
        }
        CategoryCommands::List { json } => {
            let names = ctx.store.category_names();
            if json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                for name in names {
                    println!("{name}");
                }
            }
            return Ok(());
        }
    }

    ctx.after_mutation().await;
    Ok(())
}
