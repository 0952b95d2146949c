//! Migration CLI. `DATABASE_URL` wins; otherwise `database_url` is read from
//! `config.yaml` (or the `DATABASE_URL` override of the same key).

use sea_orm_migration::prelude::*;

fn database_url_from_config() -> Option<String> {
    config::Config::builder()
        .add_source(config::File::with_name("config.yaml").required(false))
        .add_source(config::Environment::default().separator("__"))
        .build()
        .ok()?
        .get_string("database_url")
        .ok()
}

#[tokio::main]
async fn main() {
    if std::env::var_os("DATABASE_URL").is_none() {
        match database_url_from_config() {
            Some(url) => std::env::set_var("DATABASE_URL", url),
            None => eprintln!("No DATABASE_URL set and no database_url in config.yaml"),
        }
    }
    cli::run_cli(migration::Migrator).await;
}
