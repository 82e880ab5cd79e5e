//! `wharf create-user` - generate or execute a CREATE USER batch

use anyhow::Context;
use tracing::info;

use wharf_core::admin::{create_user_statement, random_password, CreateUserOptions};
use wharf_core::warehouse::{RedshiftWarehouse, Warehouse, WarehouseConfig};

use crate::CreateUserArgs;

pub async fn run(args: CreateUserArgs) -> anyhow::Result<()> {
    let (password, generated) = match args.password {
        Some(password) => (password, false),
        None => (random_password(64), true),
    };

    let options = CreateUserOptions {
        createdb: args.createdb,
        createuser: args.createuser,
        groups: args.groups,
        valid_until: args.valid_until,
        parameters: Vec::new(),
    };
    let statement = create_user_statement(&args.name, &password, &options);

    if args.execute {
        let warehouse = RedshiftWarehouse::connect(&WarehouseConfig::from_env())
            .await
            .context("Failed to connect to the warehouse")?;
        for single in statement.split(";\n") {
            warehouse.execute(single).await?;
        }
        info!(user = %args.name, "User created");
        println!("Created user '{}'", args.name);
        if generated {
            println!("Generated password: {password}");
        }
    } else {
        println!("{statement}");
        if generated {
            println!("-- generated password: {password}");
        }
    }
    Ok(())
}
