//! Migrations registered in code, driven by the shift command line.
//!
//! ```text
//! DATABASE_URL=postgres://localhost/hello cargo run -p hello-migrations -- --up
//! DATABASE_URL=postgres://localhost/hello cargo run -p hello-migrations -- --status
//! ```

use shift::{sql_args, MigrationRegistry, Queryer};

fn registry() -> shift::Result<MigrationRegistry> {
    let mut registry = MigrationRegistry::new();

    registry.add(
        "001_create_table",
        |txn, scope| {
            Box::pin(async move {
                txn.exec(
                    scope,
                    "CREATE TABLE greetings (id BIGSERIAL PRIMARY KEY, message TEXT NOT NULL)",
                    vec![],
                )
                .await?;
                txn.exec(
                    scope,
                    "INSERT INTO greetings (message) VALUES ($1)",
                    sql_args!["hello"],
                )
                .await
                .map(|_| ())
            })
        },
        |txn, scope| {
            Box::pin(async move {
                txn.exec(scope, "DROP TABLE greetings", vec![])
                    .await
                    .map(|_| ())
            })
        },
    )?;

    registry.add_sql(
        "002_create_table_two",
        "CREATE TABLE replies (
            id BIGSERIAL PRIMARY KEY,
            greeting_id BIGINT NOT NULL REFERENCES greetings (id),
            message TEXT NOT NULL
        );
        CREATE INDEX replies_greeting_id ON replies (greeting_id);",
        Some("DROP TABLE replies;".into()),
    )?;

    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shift::run(registry()?).await
}
