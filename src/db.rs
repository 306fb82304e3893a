use crate::config::AppConfig;
use crate::entities;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool from the application config.
pub async fn connect(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    let mut opts = ConnectOptions::new(cfg.database_url.clone());
    opts.max_connections(cfg.db_max_connections)
        .min_connections(cfg.db_min_connections)
        .connect_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(true);

    let db = Database::connect(opts).await?;
    info!("Database connection established");
    Ok(db)
}

/// Creates any missing tables from the entity definitions. Works against
/// both the Postgres production backend and the SQLite test backend.
pub async fn ensure_schema(db: &DbPool) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    create_table(db, &schema, entities::product::Entity).await?;
    create_table(db, &schema, entities::cart::Entity).await?;
    create_table(db, &schema, entities::cart_item::Entity).await?;
    create_table(db, &schema, entities::order::Entity).await?;
    create_table(db, &schema, entities::order_item::Entity).await?;
    create_table(db, &schema, entities::shipment::Entity).await?;
    create_table(db, &schema, entities::promotion::Entity).await?;
    create_table(db, &schema, entities::promotion_usage::Entity).await?;
    create_table(db, &schema, entities::pending_payment::Entity).await?;

    info!("Schema is up to date");
    Ok(())
}

async fn create_table<E>(db: &DbPool, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    debug!("Ensuring table for {}", entity.table_name());
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}
