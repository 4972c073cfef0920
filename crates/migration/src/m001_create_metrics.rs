use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_create_metrics"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS metrics")
            .await?;
        Ok(())
    }
}

// One row per metric name; exactly one of delta/value is set, matching kind.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    name TEXT PRIMARY KEY NOT NULL,
    kind TEXT NOT NULL,
    delta BIGINT,
    value DOUBLE PRECISION
);
"#;
