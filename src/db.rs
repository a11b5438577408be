use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::{
    pooled_connection::AsyncDieselConnectionManager, AsyncPgConnection,
};
use diesel_migrations::{
    embed_migrations, EmbeddedMigrations, MigrationHarness,
};
use serde::Deserialize;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbConnection =
    deadpool::managed::Object<AsyncDieselConnectionManager<AsyncPgConnection>>;

pub type DbConnectionPool = deadpool::managed::Pool<
    AsyncDieselConnectionManager<diesel_async::AsyncPgConnection>,
>;

pub type MigrationError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Deserialize, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: i32,
    pub user: String,
    pub password: String,
    pub database: String,
}

pub fn create_pool(
    config: &DbConfig,
) -> Result<DbConnectionPool, deadpool::managed::BuildError> {
    let config_string = format!(
        "host={} port={} user={} password={} dbname={}",
        config.host, config.port, config.user, config.password, config.database,
    );
    let manager =
        AsyncDieselConnectionManager::<diesel_async::AsyncPgConnection>::new(
            config_string,
        );
    Pool::builder(manager).build()
}

pub async fn run_migrations(
    conn: AsyncPgConnection,
) -> Result<(), MigrationError> {
    let mut wrapper: AsyncConnectionWrapper<AsyncPgConnection> =
        AsyncConnectionWrapper::from(conn);
    tokio::task::spawn_blocking(move || {
        wrapper.run_pending_migrations(MIGRATIONS).map(|applied| {
            log::info!("db: applied {} migrations", applied.len());
        })
    })
    .await??;
    Ok(())
}
