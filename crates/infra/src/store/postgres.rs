//! Postgres-backed entity store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (foreign key violation) | `23503` | `MissingReference` |
//! | Database (other) | Any other | `Database` |
//! | PoolClosed / IO / other | N/A | `Database` |
//!
//! ## Thread Safety
//!
//! `PostgresEntityStore` is `Send + Sync`; all access goes through the SQLx
//! connection pool. Every write commits on its own; a tree batch is a single
//! `INSERT ... SELECT` and therefore atomic.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;

use canopy_core::{
    Farmer, FarmerId, Forest, ForestId, ForestPatch, NewFarmer, NewForest, NewTree, TallyScope,
    Tree, TreeId, TreeTally,
};

use super::{EntityStore, StoreError, StoreResult};

const SCHEMA: &str = include_str!("../../migrations/0001_schema.sql");

#[derive(Debug, Clone)]
pub struct PostgresEntityStore {
    pool: Arc<PgPool>,
}

impl PostgresEntityStore {
    /// Create a new PostgresEntityStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    async fn count(&self, operation: &'static str, sql: &'static str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(sql)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(count as u64)
    }

    async fn delete(&self, operation: &'static str, sql: &'static str, id: i64) -> StoreResult<bool> {
        let result = sqlx::query(sql)
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl EntityStore for PostgresEntityStore {
    #[instrument(skip(self), err)]
    async fn list_farmers(&self) -> StoreResult<Vec<Farmer>> {
        let rows = sqlx::query("SELECT id, name FROM farmers ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_farmers", e))?;
        rows.iter().map(farmer_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn get_farmer(&self, id: FarmerId) -> StoreResult<Option<Farmer>> {
        let row = sqlx::query("SELECT id, name FROM farmers WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_farmer", e))?;
        row.as_ref().map(farmer_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn insert_farmer(&self, farmer: NewFarmer) -> StoreResult<Farmer> {
        let row = sqlx::query("INSERT INTO farmers (name) VALUES ($1) RETURNING id, name")
            .bind(&farmer.name)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_farmer", e))?;
        farmer_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn rename_farmer(&self, id: FarmerId, name: String) -> StoreResult<Option<Farmer>> {
        let row = sqlx::query("UPDATE farmers SET name = $2 WHERE id = $1 RETURNING id, name")
            .bind(id.get())
            .bind(&name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("rename_farmer", e))?;
        row.as_ref().map(farmer_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn delete_farmer(&self, id: FarmerId) -> StoreResult<bool> {
        self.delete("delete_farmer", "DELETE FROM farmers WHERE id = $1", id.get())
            .await
    }

    async fn count_farmers(&self) -> StoreResult<u64> {
        self.count("count_farmers", "SELECT COUNT(*) FROM farmers").await
    }

    #[instrument(skip(self), err)]
    async fn list_forests(&self) -> StoreResult<Vec<Forest>> {
        let rows = sqlx::query("SELECT id, name, location FROM forests ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_forests", e))?;
        rows.iter().map(forest_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn get_forest(&self, id: ForestId) -> StoreResult<Option<Forest>> {
        let row = sqlx::query("SELECT id, name, location FROM forests WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_forest", e))?;
        row.as_ref().map(forest_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn insert_forest(&self, forest: NewForest) -> StoreResult<Forest> {
        let row = sqlx::query(
            "INSERT INTO forests (name, location) VALUES ($1, $2) RETURNING id, name, location",
        )
        .bind(&forest.name)
        .bind(&forest.location)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_forest", e))?;
        forest_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn update_forest(&self, id: ForestId, patch: ForestPatch) -> StoreResult<Option<Forest>> {
        let row = sqlx::query(
            r#"
            UPDATE forests
            SET name = COALESCE($2, name),
                location = COALESCE($3, location)
            WHERE id = $1
            RETURNING id, name, location
            "#,
        )
        .bind(id.get())
        .bind(&patch.name)
        .bind(&patch.location)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_forest", e))?;
        row.as_ref().map(forest_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn delete_forest(&self, id: ForestId) -> StoreResult<bool> {
        self.delete("delete_forest", "DELETE FROM forests WHERE id = $1", id.get())
            .await
    }

    async fn count_forests(&self) -> StoreResult<u64> {
        self.count("count_forests", "SELECT COUNT(*) FROM forests").await
    }

    #[instrument(skip(self), err)]
    async fn list_trees(&self) -> StoreResult<Vec<Tree>> {
        let rows = sqlx::query("SELECT id, name, farmer_id, forest_id FROM trees ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_trees", e))?;
        rows.iter().map(tree_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn get_tree(&self, id: TreeId) -> StoreResult<Option<Tree>> {
        let row = sqlx::query("SELECT id, name, farmer_id, forest_id FROM trees WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_tree", e))?;
        row.as_ref().map(tree_from_row).transpose()
    }

    #[instrument(skip(self), fields(farmer_id = %tree.farmer_id, forest_id = %tree.forest_id), err)]
    async fn insert_trees(&self, tree: NewTree, quantity: u32) -> StoreResult<Vec<Tree>> {
        let rows = sqlx::query(
            r#"
            INSERT INTO trees (name, farmer_id, forest_id)
            SELECT $1, $2, $3 FROM generate_series(1, $4)
            RETURNING id, name, farmer_id, forest_id
            "#,
        )
        .bind(&tree.name)
        .bind(tree.farmer_id.get())
        .bind(tree.forest_id.get())
        .bind(i64::from(quantity))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_trees", e))?;

        let mut planted = rows.iter().map(tree_from_row).collect::<StoreResult<Vec<_>>>()?;
        planted.sort_by_key(|t| t.id);
        Ok(planted)
    }

    #[instrument(skip(self), err)]
    async fn delete_tree(&self, id: TreeId) -> StoreResult<bool> {
        self.delete("delete_tree", "DELETE FROM trees WHERE id = $1", id.get())
            .await
    }

    async fn count_trees(&self) -> StoreResult<u64> {
        self.count("count_trees", "SELECT COUNT(*) FROM trees").await
    }

    #[instrument(skip(self), err)]
    async fn tree_tally(&self, scope: TallyScope) -> StoreResult<TreeTally> {
        let (by_species_sql, farmers_sql, owner) = match scope {
            TallyScope::Farmer(id) => (
                "SELECT name, COUNT(*) AS count FROM trees WHERE farmer_id = $1 GROUP BY name",
                "SELECT COUNT(DISTINCT farmer_id) FROM trees WHERE farmer_id = $1",
                id.get(),
            ),
            TallyScope::Forest(id) => (
                "SELECT name, COUNT(*) AS count FROM trees WHERE forest_id = $1 GROUP BY name",
                "SELECT COUNT(DISTINCT farmer_id) FROM trees WHERE forest_id = $1",
                id.get(),
            ),
        };

        let rows = sqlx::query(by_species_sql)
            .bind(owner)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("tree_tally", e))?;

        let mut by_species = BTreeMap::new();
        let mut total = 0u64;
        for row in &rows {
            let name: String = row.try_get("name").map_err(|e| map_sqlx_error("tree_tally", e))?;
            let count: i64 = row.try_get("count").map_err(|e| map_sqlx_error("tree_tally", e))?;
            total += count as u64;
            by_species.insert(name, count as u64);
        }

        let farmer_count: i64 = sqlx::query_scalar(farmers_sql)
            .bind(owner)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("tree_tally", e))?;

        Ok(TreeTally {
            by_species,
            total,
            farmer_count: farmer_count as u64,
        })
    }
}

fn farmer_from_row(row: &PgRow) -> StoreResult<Farmer> {
    Ok(Farmer {
        id: FarmerId::new(row.try_get("id").map_err(|e| map_sqlx_error("decode_farmer", e))?),
        name: row.try_get("name").map_err(|e| map_sqlx_error("decode_farmer", e))?,
    })
}

fn forest_from_row(row: &PgRow) -> StoreResult<Forest> {
    Ok(Forest {
        id: ForestId::new(row.try_get("id").map_err(|e| map_sqlx_error("decode_forest", e))?),
        name: row.try_get("name").map_err(|e| map_sqlx_error("decode_forest", e))?,
        location: row.try_get("location").map_err(|e| map_sqlx_error("decode_forest", e))?,
    })
}

fn tree_from_row(row: &PgRow) -> StoreResult<Tree> {
    let decode = |e| map_sqlx_error("decode_tree", e);
    Ok(Tree {
        id: TreeId::new(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        farmer_id: FarmerId::new(row.try_get("farmer_id").map_err(decode)?),
        forest_id: ForestId::new(row.try_get("forest_id").map_err(decode)?),
    })
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match db_err.code().as_deref() {
                Some("23503") => StoreError::MissingReference(message),
                _ => StoreError::Database { operation, message },
            }
        }
        sqlx::Error::PoolClosed => StoreError::Database {
            operation,
            message: "connection pool closed".to_string(),
        },
        other => StoreError::Database {
            operation,
            message: other.to_string(),
        },
    }
}
