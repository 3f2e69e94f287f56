use crate::cli::FoodCommands;
use crate::commands::common::format_food_line;
use crate::context::AppContext;
use crate::error::CliError;

pub async fn run_food(ctx: &mut AppContext, command: FoodCommands) -> Result<(), CliError> {
    match command {
        FoodCommands::Add { name, category } => {
            ctx.store.add_food(&name, &category)?;
            println!("Added '{}' to '{category}'", name.trim());
        }
        FoodCommands::Rename { old_name, new_name } => {
            if !ctx.store.rename_food(&old_name, &new_name)? {
                println!("Food '{old_name}' unchanged");
                return Ok(());
            }
            println!("Renamed '{old_name}' to '{}'", new_name.trim());
        }
        FoodCommands::Delete { name } => {
            ctx.store.delete_food(&name)?;
            println!("Deleted '{name}'");
        }
        FoodCommands::Log { name, outcome } => {
            ctx.store.log_food(&name, outcome.into())?;
            print_food(ctx, &name);
        }
        FoodCommands::Set {
            name,
            total,
            tolerated,
        } => {
            ctx.store.update_food_stats(&name, total, tolerated)?;
            print_food(ctx, &name);
        }
    }

    ctx.after_mutation().await;
    Ok(())
}

fn print_food(ctx: &AppContext, name: &str) {
    if let Some((_, food)) = ctx.store.find_food(name) {
        println!("{}", format_food_line(&food));
    }
}
