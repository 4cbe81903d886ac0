mod common;

use common::{capture_logs, sqlite_data_source};
use pretty_assertions::assert_eq;
use schema_drift::changelog::Change;
use schema_drift::models::{EntityMapping, ModelRegistry, ReferenceSchemaProvider};
use schema_drift::schema::{Column, SchemaSnapshot, Table};
use schema_drift::{
    Database, Entity, ExportOutcome, FailureMode, ReportOptions, SchemaReporter, SnapshotSource,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE users (id INTEGER PRIMARY KEY, email VARCHAR(320) NOT NULL UNIQUE, nickname TEXT)",
    "CREATE TABLE posts (id INTEGER PRIMARY KEY, author_id INTEGER NOT NULL REFERENCES users (id), title TEXT NOT NULL)",
    "CREATE INDEX ix_posts_author_id ON posts (author_id)",
];

#[allow(dead_code)]
#[derive(Entity)]
#[entity(table = "users")]
struct User {
    #[column(primary_key, db_type = "INTEGER")]
    id: i64,
    #[column(unique, db_type = "VARCHAR(320)")]
    email: String,
    #[column(db_type = "TEXT")]
    nickname: Option<String>,
}

#[allow(dead_code)]
#[derive(Entity)]
#[entity(table = "posts")]
struct Post {
    #[column(primary_key, db_type = "INTEGER")]
    id: i64,
    #[column(references = "users.id", db_type = "INTEGER")]
    author_id: i64,
    #[column(db_type = "TEXT")]
    title: String,
}

fn registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.register::<User>().register::<Post>();
    registry
}

#[tokio::test]
async fn test_sqlite_snapshot() {
    let data_source = sqlite_data_source(SCHEMA).await;
    let mut connection = data_source.acquire().await.expect("connection");
    let mut database = Database::new(&mut connection);

    let snapshot = database.snapshot().await.expect("snapshot");

    assert_eq!(snapshot.schema_name.as_deref(), Some("main"));
    assert_eq!(snapshot.tables.keys().collect::<Vec<_>>(), vec!["posts", "users"]);

    let users = snapshot.find_table("users").expect("users");
    assert_eq!(users.columns.len(), 3);
    assert_eq!(users.columns[1].data_type, "VARCHAR(320)");
    assert!(!users.columns[0].nullable);
    assert!(users.columns[2].nullable);
    assert_eq!(
        users.primary_key.as_ref().map(|pk| pk.columns.clone()),
        Some(vec!["id".to_string()])
    );
    assert!(users.indexes.iter().any(|ix| ix.is_unique && ix.columns == vec!["email".to_string()]));

    let posts = snapshot.find_table("posts").expect("posts");
    assert_eq!(posts.foreign_keys.len(), 1);
    assert_eq!(posts.foreign_keys[0].ref_table, "users");
    assert_eq!(posts.foreign_keys[0].columns, vec!["author_id".to_string()]);
    assert!(posts
        .indexes
        .iter()
        .any(|ix| ix.name == "ix_posts_author_id" && !ix.is_unique));
}

#[tokio::test]
async fn test_matching_models_report_no_changes() {
    let (logs, _guard) = capture_logs();
    let data_source = sqlite_data_source(SCHEMA).await;
    let mapping = EntityMapping::new(registry())
        .with_dialect("sqlite")
        .with_index_foreign_keys(true)
        .with_data_source(data_source);

    let outcome = SchemaReporter::with_default_providers()
        .compare_against_mapping(&mapping, None, None, &ReportOptions::new(), FailureMode::Propagate)
        .await
        .expect("compare");

    assert_eq!(outcome, Some(ExportOutcome::NoChanges));
    assert!(!logs.has_level("WARN"));
}

#[tokio::test]
async fn test_implicit_foreign_key_target_matches_models() {
    let data_source = sqlite_data_source(&[
        SCHEMA[0],
        "CREATE TABLE posts (id INTEGER PRIMARY KEY, author_id INTEGER NOT NULL REFERENCES users, title TEXT NOT NULL)",
        SCHEMA[2],
    ])
    .await;

    {
        let mut connection = data_source.acquire().await.expect("connection");
        let snapshot = Database::new(&mut connection).snapshot().await.expect("snapshot");
        let posts = snapshot.find_table("posts").expect("posts");
        assert_eq!(posts.foreign_keys[0].ref_columns, vec!["id".to_string()]);
    }

    let mapping = EntityMapping::new(registry())
        .with_dialect("sqlite")
        .with_index_foreign_keys(true)
        .with_data_source(data_source);

    let outcome = SchemaReporter::with_default_providers()
        .compare_against_mapping(&mapping, None, None, &ReportOptions::new(), FailureMode::Propagate)
        .await
        .expect("compare");

    assert_eq!(outcome, Some(ExportOutcome::NoChanges));
}

#[tokio::test]
async fn test_drifted_database_is_reported() {
    let mut statements = SCHEMA.to_vec();
    statements.push("ALTER TABLE posts ADD COLUMN legacy_flag INTEGER");
    statements.push("CREATE TABLE audit_log (id INTEGER PRIMARY KEY)");
    let data_source = sqlite_data_source(&statements).await;

    let mapping = EntityMapping::new(registry())
        .with_dialect("sqlite")
        .with_index_foreign_keys(true)
        .with_data_source(data_source);
    let options = ReportOptions::new().ignore_tables(["audit_log"]);

    let outcome = SchemaReporter::with_default_providers()
        .compare_against_mapping(&mapping, None, None, &options, FailureMode::Propagate)
        .await
        .expect("compare")
        .expect("outcome");

    let report = outcome.report().expect("changes produced");
    assert_eq!(report.change_set_count(), 1);
    assert!(matches!(
        &report.change_log().change_sets()[0].changes[0],
        Change::DropColumn(drop) if drop.table_name == "posts" && drop.column_name == "legacy_flag"
    ));
}

struct FixedProvider(SchemaSnapshot);

impl ReferenceSchemaProvider for FixedProvider {
    fn reference_snapshot(&self, _mapping: &EntityMapping) -> schema_drift::Result<SchemaSnapshot> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_registered_provider_with_explicit_connection() {
    let data_source = sqlite_data_source(&["CREATE TABLE a (id INTEGER NOT NULL)"]).await;
    let mut connection = data_source.acquire().await.expect("connection");

    let mut reporter = SchemaReporter::new();
    reporter.register_provider(
        "fixed",
        FixedProvider(
            SchemaSnapshot::new(None)
                .with_table(Table::new("a").with_column(Column::new("id", "INTEGER")))
                .with_table(Table::new("b").with_column(Column::new("id", "INTEGER"))),
        ),
    );
    let mapping = EntityMapping::new(ModelRegistry::new()).with_provider("fixed");

    let outcome = reporter
        .compare_against_mapping(
            &mapping,
            Some(&mut connection),
            None,
            &ReportOptions::new(),
            FailureMode::Propagate,
        )
        .await
        .expect("compare")
        .expect("outcome");

    let report = outcome.report().expect("changes produced");
    assert!(report.text().contains("<createTable tableName=\"b\">"));
}

#[tokio::test]
async fn test_compare_data_source_releases_connection() {
    let data_source = sqlite_data_source(&["CREATE TABLE a (id INTEGER NOT NULL)"]).await;
    let mut reference =
        SchemaSnapshot::new(None).with_table(Table::new("a").with_column(Column::new("id", "INTEGER")));
    let reporter = SchemaReporter::new();

    for _ in 0..2 {
        let outcome = reporter
            .compare_data_source(&mut reference, &data_source, None, &ReportOptions::new())
            .await
            .expect("compare");
        assert_eq!(outcome, ExportOutcome::NoChanges);
    }
}
