use storefront_core::config::LoadOptions;
use storefront_core::domain::product::{NewProduct, Product, ProductId};
use storefront_db::{ProductRepository, RepositoryError, SqlProductRepository};

use crate::commands::{open_migrated, prepare, CommandResult, Failure};

/// Prints one JSON object per product, then the outcome line.
pub fn list(options: &LoadOptions) -> CommandResult {
    let (config, runtime) = match prepare("product list", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated(&config).await?;
        let products =
            SqlProductRepository::new(pool.clone()).list_all().await.map_err(execution_failure);
        pool.close().await;
        products
    });

    match result {
        Ok(products) => {
            let mut lines: Vec<String> = products
                .iter()
                .filter_map(|product| serde_json::to_string(product).ok())
                .collect();
            let outcome = CommandResult::success(
                "product list",
                format!("{} product(s) in catalog", products.len()),
            );
            lines.push(outcome.output);
            CommandResult { exit_code: 0, output: lines.join("\n") }
        }
        Err(failure) => CommandResult::from_failure("product list", failure),
    }
}

pub fn add(options: &LoadOptions, name: &str, price: i64, quantity: i64) -> CommandResult {
    let product = NewProduct::new(name.trim(), price).with_quantity(quantity);
    if let Err(error) = product.validate() {
        return CommandResult::failure("product add", "validation", error.to_string(), 6);
    }

    let (config, runtime) = match prepare("product add", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated(&config).await?;
        let created = SqlProductRepository::new(pool.clone())
            .insert(product)
            .await
            .map_err(execution_failure);
        pool.close().await;
        created
    });

    match result {
        Ok(created) => CommandResult::success("product add", describe("created", &created)),
        Err(failure) => CommandResult::from_failure("product add", failure),
    }
}

pub fn remove(options: &LoadOptions, id: i64) -> CommandResult {
    let (config, runtime) = match prepare("product remove", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated(&config).await?;
        let removed = SqlProductRepository::new(pool.clone())
            .delete(ProductId(id))
            .await
            .map_err(execution_failure);
        pool.close().await;
        removed
    });

    match result {
        Ok(true) => CommandResult::success(
            "product remove",
            format!("removed product {id} and its purchases"),
        ),
        Ok(false) => CommandResult::failure(
            "product remove",
            "validation",
            format!("product {id} does not exist"),
            6,
        ),
        Err(failure) => CommandResult::from_failure("product remove", failure),
    }
}

fn execution_failure(error: RepositoryError) -> Failure {
    match error {
        RepositoryError::Domain(domain) => ("validation", domain.to_string(), 6),
        other => ("execution", other.to_string(), 5),
    }
}

fn describe(verb: &str, product: &Product) -> String {
    format!(
        "{verb} product {}: {} ({} руб., {} шт.)",
        product.id, product.name, product.price, product.quantity
    )
}
