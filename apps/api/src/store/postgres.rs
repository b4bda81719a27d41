//! Postgres `DocumentStore`.
//!
//! All collections share one `documents` table. Entity bodies live in `data JSONB`;
//! metadata has real columns so the soft-delete and audit invariants are enforced by
//! the schema (see `migrations/`). Filters compile to SQL with every value and every
//! JSON field name bound as a parameter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::Postgres;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, QueryBuilder};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{DocumentStore, FacetQuery, Page, Patch, StoreError, StoreResult};
use crate::models::{Document, Meta};
use crate::query::filter::Predicate;
use crate::query::{Condition, Direction, Filter, Sort};

const MAX_UPDATE_ATTEMPTS: u32 = 3;

const COLUMNS: [&str; 10] = [
    "id",
    "seq",
    "data",
    "created_by",
    "created_at",
    "updated_at",
    "deleted",
    "deleted_by",
    "deleted_at",
    "revision",
];

/// `OFFSET`/`LIMIT` bind value. Postgres counts are signed 64-bit.
fn sql_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn columns(alias: Option<&str>) -> String {
    COLUMNS
        .iter()
        .map(|c| match alias {
            Some(a) => format!("{a}.{c}"),
            None => (*c).to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    seq: i64,
    data: Json<Map<String, Value>>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted: bool,
    deleted_by: Option<Uuid>,
    deleted_at: Option<DateTime<Utc>>,
    revision: i64,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            meta: Meta {
                id: row.id,
                created_by: row.created_by,
                created_at: row.created_at,
                updated_at: row.updated_at,
                deleted: row.deleted,
                deleted_by: row.deleted_by,
                deleted_at: row.deleted_at,
                revision: row.revision,
                seq: row.seq,
            },
            fields: row.data.0,
        }
    }
}

/// One row of the facet query: the total on every row, page columns null when the
/// page is empty.
#[derive(Debug, FromRow)]
struct FacetRow {
    total_docs: i64,
    id: Option<Uuid>,
    seq: Option<i64>,
    data: Option<Json<Map<String, Value>>>,
    created_by: Option<Uuid>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    deleted: Option<bool>,
    deleted_by: Option<Uuid>,
    deleted_at: Option<DateTime<Utc>>,
    revision: Option<i64>,
}

impl FacetRow {
    fn into_document(self) -> Option<Document> {
        Some(Document {
            meta: Meta {
                id: self.id?,
                created_by: self.created_by,
                created_at: self.created_at?,
                updated_at: self.updated_at?,
                deleted: self.deleted?,
                deleted_by: self.deleted_by,
                deleted_at: self.deleted_at,
                revision: self.revision?,
                seq: self.seq?,
            },
            fields: self.data?.0,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Filter compilation
// ────────────────────────────────────────────────────────────────────────────

enum Column {
    Id,
    CreatedBy,
    DeletedBy,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
    Deleted,
    Revision,
    Data(String),
}

impl Column {
    fn of(field: &str) -> Self {
        match field {
            "id" | "_id" => Column::Id,
            "created_by" => Column::CreatedBy,
            "deleted_by" => Column::DeletedBy,
            "created_at" => Column::CreatedAt,
            "updated_at" => Column::UpdatedAt,
            "deleted_at" => Column::DeletedAt,
            "deleted" => Column::Deleted,
            "revision" => Column::Revision,
            other => Column::Data(other.to_string()),
        }
    }

    fn push(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Column::Id => qb.push("id"),
            Column::CreatedBy => qb.push("created_by"),
            Column::DeletedBy => qb.push("deleted_by"),
            Column::CreatedAt => qb.push("created_at"),
            Column::UpdatedAt => qb.push("updated_at"),
            Column::DeletedAt => qb.push("deleted_at"),
            Column::Deleted => qb.push("deleted"),
            Column::Revision => qb.push("revision"),
            Column::Data(field) => {
                qb.push("(data -> ");
                qb.push_bind(field.clone());
                qb.push(")")
            }
        };
    }

    /// Converts a filter value to this column's SQL type. `None` when the value
    /// can't be of that type, which makes the literal false.
    fn arg(&self, value: &Value) -> Option<Arg> {
        match self {
            Column::Id | Column::CreatedBy | Column::DeletedBy => {
                value.as_str().and_then(|s| Uuid::parse_str(s).ok()).map(Arg::Uuid)
            }
            Column::CreatedAt | Column::UpdatedAt | Column::DeletedAt => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| Arg::Time(dt.with_timezone(&Utc))),
            Column::Deleted => value.as_bool().map(Arg::Bool),
            Column::Revision => value.as_i64().map(Arg::Int),
            Column::Data(_) => Some(Arg::Json(value.clone())),
        }
    }

    fn is_json(&self) -> bool {
        matches!(self, Column::Data(_))
    }
}

enum Arg {
    Uuid(Uuid),
    Time(DateTime<Utc>),
    Bool(bool),
    Int(i64),
    Json(Value),
}

impl Arg {
    fn push(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Arg::Uuid(v) => qb.push_bind(*v),
            Arg::Time(v) => qb.push_bind(*v),
            Arg::Bool(v) => qb.push_bind(*v),
            Arg::Int(v) => qb.push_bind(*v),
            Arg::Json(v) => qb.push_bind(Json(v.clone())),
        };
    }
}

fn push_eq(qb: &mut QueryBuilder<'_, Postgres>, column: &Column, value: &Value) {
    if value.is_null() {
        qb.push("(");
        column.push(qb);
        qb.push(" IS NULL");
        if column.is_json() {
            qb.push(" OR ");
            column.push(qb);
            qb.push(" = 'null'::jsonb");
        }
        qb.push(")");
        return;
    }
    let Some(arg) = column.arg(value) else {
        qb.push("FALSE");
        return;
    };
    qb.push("(");
    column.push(qb);
    qb.push(" = ");
    arg.push(qb);
    if column.is_json() {
        // array fields match on any element
        qb.push(" OR (jsonb_typeof(");
        column.push(qb);
        qb.push(") = 'array' AND ");
        column.push(qb);
        qb.push(" @> jsonb_build_array(");
        arg.push(qb);
        qb.push("))");
    }
    qb.push(")");
}

fn push_cmp(qb: &mut QueryBuilder<'_, Postgres>, column: &Column, op: &str, value: &Value) {
    let Some(arg) = column.arg(value) else {
        qb.push("FALSE");
        return;
    };
    qb.push("(");
    if column.is_json() {
        // jsonb orders across types; only compare like with like
        qb.push("jsonb_typeof(");
        column.push(qb);
        qb.push(") = jsonb_typeof(");
        arg.push(qb);
        qb.push(") AND ");
    }
    column.push(qb);
    qb.push(format!(" {op} "));
    arg.push(qb);
    qb.push(")");
}

fn push_condition(qb: &mut QueryBuilder<'_, Postgres>, field: &str, condition: &Condition) {
    let column = Column::of(field);
    match condition {
        Condition::Eq(value) => push_eq(qb, &column, value),
        Condition::In(values) => {
            if values.is_empty() {
                qb.push("FALSE");
                return;
            }
            qb.push("(");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_eq(qb, &column, value);
            }
            qb.push(")");
        }
        Condition::Range(range) => {
            let bounds = [
                (">", &range.gt),
                (">=", &range.gte),
                ("<", &range.lt),
                ("<=", &range.lte),
            ];
            qb.push("(");
            let mut first = true;
            for (op, bound) in bounds {
                if let Some(value) = bound {
                    if !first {
                        qb.push(" AND ");
                    }
                    push_cmp(qb, &column, op, value);
                    first = false;
                }
            }
            if first {
                qb.push("TRUE");
            }
            qb.push(")");
        }
    }
}

fn push_clause(qb: &mut QueryBuilder<'_, Postgres>, clause: &[Predicate]) {
    qb.push("(");
    for (i, p) in clause.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        push_condition(qb, &p.field, &p.condition);
    }
    qb.push(")");
}

/// `collection = $n AND <filter>`, unqualified column names.
fn push_where(qb: &mut QueryBuilder<'_, Postgres>, collection: &str, filter: &Filter) {
    qb.push("collection = ");
    qb.push_bind(collection.to_string());
    if filter.is_nothing() {
        qb.push(" AND FALSE");
        return;
    }
    for (field, condition) in filter.fields() {
        qb.push(" AND ");
        push_condition(qb, field, condition);
    }
    for clause in filter.clauses() {
        qb.push(" AND ");
        push_clause(qb, clause);
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, sort: &Sort) {
    qb.push(" ORDER BY ");
    for (field, direction) in sort.keys() {
        Column::of(field).push(qb);
        qb.push(match direction {
            Direction::Asc => " ASC NULLS FIRST, ",
            Direction::Desc => " DESC NULLS LAST, ",
        });
    }
    qb.push("seq ASC");
}

// ────────────────────────────────────────────────────────────────────────────
// Store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_with<'e, E>(executor: E, collection: &str, doc: Document) -> StoreResult<Document>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let meta = doc.meta;
        let sql = format!(
            "INSERT INTO documents (collection, id, data, created_by, created_at, updated_at, \
             deleted, deleted_by, deleted_at, revision) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
            columns(None)
        );
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(collection)
            .bind(meta.id)
            .bind(Json(doc.fields))
            .bind(meta.created_by)
            .bind(meta.created_at)
            .bind(meta.updated_at)
            .bind(meta.deleted)
            .bind(meta.deleted_by)
            .bind(meta.deleted_at)
            .bind(meta.revision)
            .fetch_one(executor)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::Conflict(format!("{collection}/{} already exists", meta.id))
                }
                other => other.into(),
            })?;
        Ok(row.into())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM documents WHERE ",
            columns(None)
        ));
        push_where(&mut qb, collection, filter);
        qb.push(" ORDER BY seq ASC LIMIT 1");
        let row = qb
            .build_query_as::<DocumentRow>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &Sort,
    ) -> StoreResult<Vec<Document>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM documents WHERE ",
            columns(None)
        ));
        push_where(&mut qb, collection, filter);
        push_order(&mut qb, sort);
        let rows = qb
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM documents WHERE ");
        push_where(&mut qb, collection, filter);
        let (n,): (i64,) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }

    async fn aggregate(&self, collection: &str, query: &FacetQuery) -> StoreResult<Page<Document>> {
        // One statement, one snapshot: the total and the page can't disagree.
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "WITH matched AS (SELECT {} FROM documents WHERE ",
            columns(None)
        ));
        push_where(&mut qb, collection, &query.filter);
        qb.push("), total AS (SELECT COUNT(*) AS total_docs FROM matched), ");
        qb.push("page AS (SELECT matched.*, ROW_NUMBER() OVER (");
        push_order(&mut qb, &query.sort);
        qb.push(") AS rn FROM matched");
        push_order(&mut qb, &query.sort);
        qb.push(" OFFSET ");
        qb.push_bind(sql_count(query.pagination.skip()));
        qb.push(" LIMIT ");
        qb.push_bind(sql_count(query.pagination.limit()));
        qb.push(format!(
            ") SELECT total.total_docs, {} FROM total LEFT JOIN page ON TRUE ORDER BY page.rn",
            columns(Some("page"))
        ));

        let rows = qb
            .build_query_as::<FacetRow>()
            .fetch_all(&self.pool)
            .await?;
        let total_docs = rows.first().map(|r| r.total_docs.max(0) as u64).unwrap_or(0);
        let docs = rows.into_iter().filter_map(FacetRow::into_document).collect();
        Ok(Page { total_docs, docs })
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<Document> {
        Self::insert_with(&self.pool, collection, doc).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> StoreResult<Vec<Document>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(docs.len());
        for doc in docs {
            inserted.push(Self::insert_with(&mut *tx, collection, doc).await?);
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> StoreResult<Option<Document>> {
        // Compare-and-set on `revision`: a concurrent write between the read and the
        // update makes the update miss, and we re-read through the filter.
        let sql = format!(
            "UPDATE documents SET data = $1, updated_at = now(), revision = revision + 1 \
             WHERE collection = $2 AND id = $3 AND revision = $4 RETURNING {}",
            columns(None)
        );
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let Some(current) = self.find_one(collection, filter).await? else {
                return Ok(None);
            };
            let mut fields = current.fields.clone();
            patch.apply(&mut fields);
            let row = sqlx::query_as::<_, DocumentRow>(&sql)
                .bind(Json(fields))
                .bind(collection)
                .bind(current.id())
                .bind(current.meta.revision)
                .fetch_optional(&self.pool)
                .await?;
            if let Some(row) = row {
                return Ok(Some(row.into()));
            }
            debug!(collection, id = %current.id(), attempt, "revision moved, retrying update");
        }
        warn!(collection, "update abandoned after {MAX_UPDATE_ATTEMPTS} revision conflicts");
        Err(StoreError::Conflict(format!(
            "{collection}: concurrent updates, try again"
        )))
    }

    async fn soft_delete(
        &self,
        collection: &str,
        filter: &Filter,
        actor: Option<Uuid>,
    ) -> StoreResult<Option<Document>> {
        // Single UPDATE; `prev` is the locked pre-image, so an already-deleted row keeps
        // its original stamp and is reported as-is.
        let mut qb = QueryBuilder::<Postgres>::new(
            "UPDATE documents AS d SET deleted = TRUE, \
             deleted_by = CASE WHEN prev.deleted THEN d.deleted_by ELSE ",
        );
        qb.push_bind(actor);
        qb.push(
            "::uuid END, \
             deleted_at = CASE WHEN prev.deleted THEN d.deleted_at ELSE now() END, \
             revision = CASE WHEN prev.deleted THEN d.revision ELSE d.revision + 1 END ",
        );
        qb.push(format!("FROM (SELECT {} FROM documents WHERE ", columns(None)));
        push_where(&mut qb, collection, filter);
        qb.push(" ORDER BY seq ASC LIMIT 1 FOR UPDATE) AS prev WHERE d.collection = ");
        qb.push_bind(collection.to_string());
        qb.push(format!(" AND d.id = prev.id RETURNING {}", columns(Some("prev"))));

        let row = qb
            .build_query_as::<DocumentRow>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn restore(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "UPDATE documents AS d SET deleted = FALSE, deleted_by = NULL, deleted_at = NULL, \
             revision = CASE WHEN d.deleted THEN d.revision + 1 ELSE d.revision END \
             FROM (SELECT id FROM documents WHERE ",
        );
        push_where(&mut qb, collection, filter);
        qb.push(" ORDER BY seq ASC LIMIT 1 FOR UPDATE) AS target WHERE d.collection = ");
        qb.push_bind(collection.to_string());
        qb.push(format!(" AND d.id = target.id RETURNING {}", columns(Some("d"))));

        let row = qb
            .build_query_as::<DocumentRow>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Range;
    use sqlx::Execute;

    fn where_sql(filter: &Filter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM documents WHERE ");
        push_where(&mut qb, "resumes", filter);
        qb.build().sql().to_string()
    }

    #[test]
    fn test_sql_count_saturates() {
        assert_eq!(sql_count(40), 40);
        assert_eq!(sql_count(u64::MAX), i64::MAX);
    }

    #[test]
    fn test_nothing_compiles_to_false() {
        assert!(where_sql(&Filter::none()).ends_with("AND FALSE"));
    }

    #[test]
    fn test_field_names_are_bound_not_spliced() {
        let sql = where_sql(&Filter::eq("company_id", "c1"));
        assert!(!sql.contains("company_id"));
        assert!(sql.contains("(data -> $2)"));
    }

    #[test]
    fn test_metadata_fields_use_columns() {
        let sql = where_sql(&Filter::eq("deleted", false).and(&Filter::by_id(Uuid::new_v4())));
        assert!(sql.contains("deleted = $"));
        assert!(sql.contains("id = $"));
        assert!(!sql.contains("data ->"));
    }

    #[test]
    fn test_untyped_id_value_is_false() {
        let sql = where_sql(&Filter::eq("id", "not-a-uuid"));
        assert!(sql.ends_with("AND FALSE"));
    }

    #[test]
    fn test_range_guards_json_type() {
        let sql = where_sql(&Filter::range("min_salary", Range::gte(100)));
        assert!(sql.contains("jsonb_typeof"));
        assert!(sql.contains(" >= "));
    }

    #[test]
    fn test_order_ends_with_seq() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1");
        push_order(&mut qb, &Sort::by("created_at", Direction::Desc));
        let sql = qb.build().sql().to_string();
        assert!(sql.ends_with("created_at DESC NULLS LAST, seq ASC"));
    }
}
