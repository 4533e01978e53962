use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::Store;
use super::reconcile;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

const USER_COLUMNS: &str =
    "id, email, name, password_hash, is_active, is_staff, is_superuser, last_login, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        is_active: row.get(4)?,
        is_staff: row.get(5)?,
        is_superuser: row.get(6)?,
        last_login: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

const TOKEN_COLUMNS: &str =
    "id, token_hash, token_lookup, user_id, created_at, expires_at, last_used_at";

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        user_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        expires_at: row.get::<_, Option<String>>(5)?.map(|s| parse_datetime(&s)),
        last_used_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
    })
}

const RECIPE_COLUMNS: &str = "id, user_id, title, description, time_minutes, price_cents, link, image, created_at, updated_at";

fn recipe_from_row(row: &Row<'_>) -> rusqlite::Result<Recipe> {
    Ok(Recipe {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        time_minutes: row.get(4)?,
        price: price_from_cents(row.get(5)?),
        link: row.get(6)?,
        image: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
        updated_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

fn attr_from_row(row: &Row<'_>) -> rusqlite::Result<Attr> {
    Ok(Attr {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
    })
}

fn query_recipe(conn: &Connection, user_id: i64, id: i64) -> Result<Option<Recipe>> {
    let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1 AND user_id = ?2");
    conn.query_row(&sql, params![id, user_id], recipe_from_row)
        .optional()
        .map_err(Error::from)
}

fn query_recipe_attrs(conn: &Connection, kind: AttrKind, recipe_id: i64) -> Result<Vec<Attr>> {
    let sql = format!(
        "SELECT a.id, a.user_id, a.name
         FROM {table} a
         JOIN {join} j ON a.id = j.{column}
         WHERE j.recipe_id = ?1
         ORDER BY a.name DESC",
        table = kind.table(),
        join = kind.join_table(),
        column = kind.join_column(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![recipe_id], attr_from_row)?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn with_attrs(conn: &Connection, recipe: Recipe) -> Result<RecipeDetail> {
    let tags = query_recipe_attrs(conn, AttrKind::Tag, recipe.id)?;
    let ingredients = query_recipe_attrs(conn, AttrKind::Ingredient, recipe.id)?;
    Ok(RecipeDetail {
        recipe,
        tags,
        ingredients,
    })
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &NewUser) -> Result<User> {
        let conn = self.conn();
        let now = Utc::now();
        let result = conn.execute(
            "INSERT INTO users (email, name, password_hash, is_active, is_staff, is_superuser, created_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6)",
            params![
                user.email,
                user.name,
                user.password_hash,
                user.is_staff,
                user.is_superuser,
                format_datetime(&now),
            ],
        );

        match result {
            Ok(_) => Ok(User {
                id: conn.last_insert_rowid(),
                email: user.email.clone(),
                name: user.name.clone(),
                password_hash: user.password_hash.clone(),
                is_active: true,
                is_staff: user.is_staff,
                is_superuser: user.is_superuser,
                last_login: None,
                created_at: now,
            }),
            Err(e) if is_unique_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn();
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        conn.query_row(&sql, params![id], user_from_row)
            .optional()
            .map_err(Error::from)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn();
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
        conn.query_row(&sql, params![email], user_from_row)
            .optional()
            .map_err(Error::from)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn();
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], user_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "UPDATE users SET email = ?1, name = ?2, password_hash = ?3, is_active = ?4,
                 is_staff = ?5, is_superuser = ?6
             WHERE id = ?7",
            params![
                user.email,
                user.name,
                user.password_hash,
                user.is_active,
                user.is_staff,
                user.is_superuser,
                user.id,
            ],
        );

        match result {
            Ok(0) => Err(Error::NotFound),
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn delete_user(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_user_last_login(&self, id: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn has_superuser(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE is_superuser = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.user_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::TokenLookupCollision)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        let sql = format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE token_lookup = ?1");
        conn.query_row(&sql, params![lookup], token_from_row)
            .optional()
            .map_err(Error::from)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    // Recipe operations

    fn create_recipe(&self, user_id: i64, recipe: &NewRecipe) -> Result<RecipeDetail> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = format_datetime(&Utc::now());

        tx.execute(
            "INSERT INTO recipes (user_id, title, description, time_minutes, price_cents, link, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                user_id,
                recipe.title,
                recipe.description,
                recipe.time_minutes,
                price_to_cents(&recipe.price),
                recipe.link,
                now,
            ],
        )?;
        let recipe_id = tx.last_insert_rowid();

        reconcile::attach_names(&tx, AttrKind::Tag, user_id, recipe_id, &recipe.tags)?;
        reconcile::attach_names(
            &tx,
            AttrKind::Ingredient,
            user_id,
            recipe_id,
            &recipe.ingredients,
        )?;

        let created = query_recipe(&tx, user_id, recipe_id)?.ok_or(Error::NotFound)?;
        let detail = with_attrs(&tx, created)?;

        tx.commit()?;
        Ok(detail)
    }

    fn get_recipe(&self, user_id: i64, id: i64) -> Result<Option<RecipeDetail>> {
        let conn = self.conn();
        match query_recipe(&conn, user_id, id)? {
            Some(recipe) => with_attrs(&conn, recipe).map(Some),
            None => Ok(None),
        }
    }

    fn list_recipes(&self, user_id: i64, filter: &RecipeFilter) -> Result<Vec<RecipeDetail>> {
        let conn = self.conn();

        let mut sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE user_id = ?");
        let mut args: Vec<i64> = vec![user_id];

        let filters = [
            (AttrKind::Tag, filter.tag_ids.as_deref()),
            (AttrKind::Ingredient, filter.ingredient_ids.as_deref()),
        ];
        for (kind, ids) in filters {
            let Some(ids) = ids.filter(|ids| !ids.is_empty()) else {
                continue;
            };
            sql.push_str(&format!(
                " AND id IN (SELECT recipe_id FROM {} WHERE {} IN ({}))",
                kind.join_table(),
                kind.join_column(),
                placeholders(ids.len())
            ));
            args.extend_from_slice(ids);
        }
        sql.push_str(" ORDER BY id DESC");

        let mut stmt = conn.prepare(&sql)?;
        let recipes = stmt
            .query_map(params_from_iter(args.iter()), recipe_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        recipes
            .into_iter()
            .map(|recipe| with_attrs(&conn, recipe))
            .collect()
    }

    fn list_all_recipes(&self) -> Result<Vec<Recipe>> {
        let conn = self.conn();
        let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], recipe_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_recipe_images(&self, user_id: i64) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT image FROM recipes WHERE user_id = ?1 AND image IS NOT NULL ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_recipe(
        &self,
        user_id: i64,
        id: i64,
        changes: &RecipeChanges,
    ) -> Result<RecipeDetail> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut recipe = query_recipe(&tx, user_id, id)?.ok_or(Error::NotFound)?;

        // Nothing to write; keep updated_at as it was.
        if changes.is_empty() {
            return with_attrs(&tx, recipe);
        }

        if let Some(title) = &changes.title {
            recipe.title = title.clone();
        }
        if let Some(description) = &changes.description {
            recipe.description = description.clone();
        }
        if let Some(time_minutes) = changes.time_minutes {
            recipe.time_minutes = time_minutes;
        }
        if let Some(price) = changes.price {
            recipe.price = price_from_cents(price_to_cents(&price));
        }
        if let Some(link) = &changes.link {
            recipe.link = link.clone();
        }
        recipe.updated_at = Utc::now();

        tx.execute(
            "UPDATE recipes SET title = ?1, description = ?2, time_minutes = ?3, price_cents = ?4,
                 link = ?5, updated_at = ?6
             WHERE id = ?7 AND user_id = ?8",
            params![
                recipe.title,
                recipe.description,
                recipe.time_minutes,
                price_to_cents(&recipe.price),
                recipe.link,
                format_datetime(&recipe.updated_at),
                id,
                user_id,
            ],
        )?;

        if let Some(tags) = &changes.tags {
            reconcile::replace_names(&tx, AttrKind::Tag, user_id, id, tags)?;
        }
        if let Some(ingredients) = &changes.ingredients {
            reconcile::replace_names(&tx, AttrKind::Ingredient, user_id, id, ingredients)?;
        }

        let detail = with_attrs(&tx, recipe)?;

        tx.commit()?;
        Ok(detail)
    }

    fn set_recipe_image(&self, user_id: i64, id: i64, image: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let previous = query_recipe(&tx, user_id, id)?
            .ok_or(Error::NotFound)?
            .image;

        tx.execute(
            "UPDATE recipes SET image = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
            params![image, format_datetime(&Utc::now()), id, user_id],
        )?;

        tx.commit()?;
        Ok(previous)
    }

    fn delete_recipe(&self, user_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM recipes WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    // Tag/ingredient operations

    fn get_attr(&self, kind: AttrKind, user_id: i64, id: i64) -> Result<Option<Attr>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT id, user_id, name FROM {} WHERE id = ?1 AND user_id = ?2",
            kind.table()
        );
        conn.query_row(&sql, params![id, user_id], attr_from_row)
            .optional()
            .map_err(Error::from)
    }

    fn list_attrs(&self, kind: AttrKind, user_id: i64, assigned_only: bool) -> Result<Vec<Attr>> {
        let conn = self.conn();

        // Ownership and assignment are checked in one query, and only recipes
        // of the same owner count as an assignment.
        let assigned = if assigned_only {
            format!(
                " AND EXISTS (
                    SELECT 1 FROM {join} j
                    JOIN recipes r ON r.id = j.recipe_id
                    WHERE j.{column} = a.id AND r.user_id = a.user_id
                 )",
                join = kind.join_table(),
                column = kind.join_column(),
            )
        } else {
            String::new()
        };

        let sql = format!(
            "SELECT a.id, a.user_id, a.name FROM {} a WHERE a.user_id = ?1{assigned} ORDER BY a.name DESC",
            kind.table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], attr_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn rename_attr(&self, kind: AttrKind, user_id: i64, id: i64, name: &str) -> Result<Attr> {
        let sql = format!(
            "UPDATE {} SET name = ?1 WHERE id = ?2 AND user_id = ?3",
            kind.table()
        );
        let result = self.conn().execute(&sql, params![name, id, user_id]);

        match result {
            Ok(0) => Err(Error::NotFound),
            Ok(_) => Ok(Attr {
                id,
                user_id,
                name: name.to_string(),
            }),
            Err(e) if is_unique_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn delete_attr(&self, kind: AttrKind, user_id: i64, id: i64) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1 AND user_id = ?2", kind.table());
        let rows = self.conn().execute(&sql, params![id, user_id])?;
        Ok(rows > 0)
    }

    fn count_attr_recipes(&self, kind: AttrKind, id: i64) -> Result<i64> {
        let conn = self.conn();
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            kind.join_table(),
            kind.join_column()
        );
        let count: i64 = conn.query_row(&sql, params![id], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::*;

    fn setup() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn user(store: &SqliteStore, email: &str) -> User {
        store
            .create_user(&NewUser {
                email: email.to_string(),
                name: "Test".to_string(),
                password_hash: "hash".to_string(),
                is_staff: false,
                is_superuser: false,
            })
            .unwrap()
    }

    fn new_recipe(title: &str, tags: &[&str], ingredients: &[&str]) -> NewRecipe {
        NewRecipe {
            title: title.to_string(),
            description: String::new(),
            time_minutes: 10,
            price: Decimal::from_str("5.25").unwrap(),
            link: String::new(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn names(attrs: &[Attr]) -> Vec<&str> {
        attrs.iter().map(|a| a.name.as_str()).collect()
    }

    fn count_rows(store: &SqliteStore, table: &str) -> i64 {
        store
            .conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    #[test]
    fn test_initialize_creates_tables() {
        let (_temp, store) = setup();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "users",
            "tokens",
            "recipes",
            "tags",
            "ingredients",
            "recipe_tags",
            "recipe_ingredients",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_user_crud() {
        let (_temp, store) = setup();

        let created = user(&store, "test@example.com");
        let fetched = store.get_user(created.id).unwrap().unwrap();
        assert_eq!(fetched.email, "test@example.com");
        assert!(fetched.is_active);
        assert!(!fetched.is_staff);

        let by_email = store
            .get_user_by_email("test@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, created.id);

        let mut updated = fetched.clone();
        updated.name = "Renamed".to_string();
        store.update_user(&updated).unwrap();
        assert_eq!(store.get_user(created.id).unwrap().unwrap().name, "Renamed");

        assert!(store.delete_user(created.id).unwrap());
        assert!(store.get_user(created.id).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (_temp, store) = setup();
        user(&store, "test@example.com");

        let result = store.create_user(&NewUser {
            email: "test@example.com".to_string(),
            name: String::new(),
            password_hash: "hash".to_string(),
            is_staff: false,
            is_superuser: false,
        });
        assert!(matches!(result, Err(Error::AlreadyExists)));
    }

    #[test]
    fn test_token_lookup_collision() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");

        let token1 = Token {
            id: "token-1".to_string(),
            token_hash: "hash1".to_string(),
            token_lookup: "lookup123".to_string(),
            user_id: owner.id,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };
        store.create_token(&token1).unwrap();

        let token2 = Token {
            id: "token-2".to_string(),
            token_hash: "hash2".to_string(),
            token_lookup: "lookup123".to_string(), // Same lookup
            user_id: owner.id,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };

        let result = store.create_token(&token2);
        assert!(matches!(result, Err(Error::TokenLookupCollision)));
    }

    #[test]
    fn test_create_recipe_with_duplicate_tag_names() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");

        let detail = store
            .create_recipe(owner.id, &new_recipe("Soup", &["Tag1", "Tag1"], &[]))
            .unwrap();

        assert_eq!(names(&detail.tags), vec!["Tag1"]);
        assert_eq!(count_rows(&store, "tags"), 1);
    }

    #[test]
    fn test_create_recipe_reuses_existing_tag() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");

        let first = store
            .create_recipe(owner.id, &new_recipe("Salad", &["Veg"], &[]))
            .unwrap();
        let second = store
            .create_recipe(owner.id, &new_recipe("Stew", &["Veg"], &[]))
            .unwrap();

        assert_eq!(first.tags[0].id, second.tags[0].id);
        assert_eq!(count_rows(&store, "tags"), 1);
    }

    #[test]
    fn test_same_name_for_different_users_is_distinct() {
        let (_temp, store) = setup();
        let a = user(&store, "a@example.com");
        let b = user(&store, "b@example.com");

        let ra = store
            .create_recipe(a.id, &new_recipe("A", &["X"], &["Salt"]))
            .unwrap();
        let rb = store
            .create_recipe(b.id, &new_recipe("B", &["X"], &["Salt"]))
            .unwrap();

        assert_ne!(ra.tags[0].id, rb.tags[0].id);
        assert_ne!(ra.ingredients[0].id, rb.ingredients[0].id);
    }

    #[test]
    fn test_create_recipe_rolls_back_on_failure() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");

        // The empty ingredient name violates a CHECK constraint after the
        // recipe row and its tags have already been written.
        let result = store.create_recipe(owner.id, &new_recipe("Soup", &["Tag1"], &["Salt", ""]));
        assert!(result.is_err());

        assert_eq!(count_rows(&store, "recipes"), 0);
        assert_eq!(count_rows(&store, "tags"), 0);
        assert_eq!(count_rows(&store, "ingredients"), 0);
        assert_eq!(count_rows(&store, "recipe_tags"), 0);
    }

    #[test]
    fn test_update_with_absent_sets_leaves_them() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");
        let created = store
            .create_recipe(owner.id, &new_recipe("Soup", &["Hot", "Cold"], &["Salt"]))
            .unwrap();

        let changes = RecipeChanges {
            title: Some("New".to_string()),
            ..Default::default()
        };
        let updated = store
            .update_recipe(owner.id, created.recipe.id, &changes)
            .unwrap();

        assert_eq!(updated.recipe.title, "New");
        assert_eq!(updated.tags, created.tags);
        assert_eq!(updated.ingredients, created.ingredients);
    }

    #[test]
    fn test_update_with_empty_list_clears_set() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");
        let created = store
            .create_recipe(owner.id, &new_recipe("Soup", &["Hot"], &["Salt"]))
            .unwrap();

        let changes = RecipeChanges {
            tags: Some(Vec::new()),
            ..Default::default()
        };
        let updated = store
            .update_recipe(owner.id, created.recipe.id, &changes)
            .unwrap();

        assert!(updated.tags.is_empty());
        assert_eq!(names(&updated.ingredients), vec!["Salt"]);
    }

    #[test]
    fn test_update_with_same_list_is_idempotent() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");
        let created = store
            .create_recipe(owner.id, &new_recipe("Soup", &["Hot"], &[]))
            .unwrap();

        let changes = RecipeChanges {
            tags: Some(vec!["Lunch".to_string(), "Breakfast".to_string()]),
            ..Default::default()
        };
        let once = store
            .update_recipe(owner.id, created.recipe.id, &changes)
            .unwrap();
        let twice = store
            .update_recipe(owner.id, created.recipe.id, &changes)
            .unwrap();

        assert_eq!(once.tags, twice.tags);
        assert_eq!(names(&twice.tags), vec!["Lunch", "Breakfast"]);
    }

    #[test]
    fn test_update_other_users_recipe_is_not_found() {
        let (_temp, store) = setup();
        let a = user(&store, "a@example.com");
        let b = user(&store, "b@example.com");
        let created = store
            .create_recipe(a.id, &new_recipe("Soup", &[], &[]))
            .unwrap();

        let changes = RecipeChanges {
            title: Some("Hijacked".to_string()),
            ..Default::default()
        };
        let result = store.update_recipe(b.id, created.recipe.id, &changes);
        assert!(matches!(result, Err(Error::NotFound)));
        assert!(!store.delete_recipe(b.id, created.recipe.id).unwrap());
        assert!(store.get_recipe(a.id, created.recipe.id).unwrap().is_some());
    }

    #[test]
    fn test_empty_update_changes_nothing() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");
        let created = store
            .create_recipe(owner.id, &new_recipe("Soup", &["Hot"], &["Salt"]))
            .unwrap();

        let before = store.get_recipe(owner.id, created.recipe.id).unwrap().unwrap();
        let updated = store
            .update_recipe(owner.id, created.recipe.id, &RecipeChanges::default())
            .unwrap();

        assert_eq!(updated.recipe.title, "Soup");
        assert_eq!(updated.recipe.updated_at, before.recipe.updated_at);
        assert_eq!(updated.tags, created.tags);

        let result = store.update_recipe(owner.id, created.recipe.id + 1, &RecipeChanges::default());
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[test]
    fn test_list_recipe_images_is_scoped_to_owner() {
        let (_temp, store) = setup();
        let a = user(&store, "a@example.com");
        let b = user(&store, "b@example.com");
        let with_image = store.create_recipe(a.id, &new_recipe("R1", &[], &[])).unwrap();
        store.create_recipe(a.id, &new_recipe("R2", &[], &[])).unwrap();
        let other = store.create_recipe(b.id, &new_recipe("R3", &[], &[])).unwrap();

        store
            .set_recipe_image(a.id, with_image.recipe.id, "uploads/recipe/a.png")
            .unwrap();
        store
            .set_recipe_image(b.id, other.recipe.id, "uploads/recipe/b.png")
            .unwrap();

        assert_eq!(
            store.list_recipe_images(a.id).unwrap(),
            vec!["uploads/recipe/a.png"]
        );
        assert!(store.list_recipe_images(99).unwrap().is_empty());
    }

    #[test]
    fn test_list_recipes_filtered_by_tags() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");

        let r1 = store
            .create_recipe(owner.id, &new_recipe("R1", &["Vegan"], &[]))
            .unwrap();
        let r2 = store
            .create_recipe(owner.id, &new_recipe("R2", &["Vegetarian"], &[]))
            .unwrap();
        store
            .create_recipe(owner.id, &new_recipe("R3", &[], &[]))
            .unwrap();

        let filter = RecipeFilter {
            tag_ids: Some(vec![r1.tags[0].id, r2.tags[0].id]),
            ingredient_ids: None,
        };
        let listed = store.list_recipes(owner.id, &filter).unwrap();
        let ids: Vec<i64> = listed.iter().map(|d| d.recipe.id).collect();
        assert_eq!(ids, vec![r2.recipe.id, r1.recipe.id]);
    }

    #[test]
    fn test_list_recipes_filters_combine_with_and() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");

        let both = store
            .create_recipe(owner.id, &new_recipe("Both", &["Quick"], &["Egg"]))
            .unwrap();
        store
            .create_recipe(owner.id, &new_recipe("TagOnly", &["Quick"], &["Flour"]))
            .unwrap();

        let filter = RecipeFilter {
            tag_ids: Some(vec![both.tags[0].id]),
            ingredient_ids: Some(vec![both.ingredients[0].id]),
        };
        let listed = store.list_recipes(owner.id, &filter).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].recipe.title, "Both");
    }

    #[test]
    fn test_list_recipes_scoped_to_user() {
        let (_temp, store) = setup();
        let a = user(&store, "a@example.com");
        let b = user(&store, "b@example.com");
        store.create_recipe(a.id, &new_recipe("A", &[], &[])).unwrap();
        store.create_recipe(b.id, &new_recipe("B", &[], &[])).unwrap();

        let listed = store.list_recipes(a.id, &RecipeFilter::default()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].recipe.title, "A");
    }

    #[test]
    fn test_list_attrs_assigned_only_is_distinct_and_ordered() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");

        store
            .create_recipe(owner.id, &new_recipe("One", &["Breakfast"], &[]))
            .unwrap();
        store
            .create_recipe(owner.id, &new_recipe("Two", &["Breakfast"], &[]))
            .unwrap();
        let dinner = store
            .create_recipe(owner.id, &new_recipe("Three", &["Dinner"], &[]))
            .unwrap();
        let changes = RecipeChanges {
            tags: Some(Vec::new()),
            ..Default::default()
        };
        store
            .update_recipe(owner.id, dinner.recipe.id, &changes)
            .unwrap();

        let all = store.list_attrs(AttrKind::Tag, owner.id, false).unwrap();
        assert_eq!(names(&all), vec!["Dinner", "Breakfast"]);

        let assigned = store.list_attrs(AttrKind::Tag, owner.id, true).unwrap();
        assert_eq!(names(&assigned), vec!["Breakfast"]);
    }

    #[test]
    fn test_rename_attr_conflict_and_scope() {
        let (_temp, store) = setup();
        let a = user(&store, "a@example.com");
        let b = user(&store, "b@example.com");
        let created = store
            .create_recipe(a.id, &new_recipe("Soup", &["Hot", "Cold"], &[]))
            .unwrap();
        let hot = created.tags.iter().find(|t| t.name == "Hot").unwrap();

        let result = store.rename_attr(AttrKind::Tag, a.id, hot.id, "Cold");
        assert!(matches!(result, Err(Error::AlreadyExists)));

        let result = store.rename_attr(AttrKind::Tag, b.id, hot.id, "Warm");
        assert!(matches!(result, Err(Error::NotFound)));

        let renamed = store.rename_attr(AttrKind::Tag, a.id, hot.id, "Warm").unwrap();
        assert_eq!(renamed.name, "Warm");
    }

    #[test]
    fn test_delete_attr_detaches_from_recipes() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");
        let created = store
            .create_recipe(owner.id, &new_recipe("Soup", &[], &["Salt"]))
            .unwrap();
        let salt = created.ingredients[0].id;

        assert_eq!(store.count_attr_recipes(AttrKind::Ingredient, salt).unwrap(), 1);
        assert!(store.delete_attr(AttrKind::Ingredient, owner.id, salt).unwrap());

        let fetched = store
            .get_recipe(owner.id, created.recipe.id)
            .unwrap()
            .unwrap();
        assert!(fetched.ingredients.is_empty());
    }

    #[test]
    fn test_delete_user_cascades() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");
        store
            .create_recipe(owner.id, &new_recipe("Soup", &["Hot"], &["Salt"]))
            .unwrap();

        assert!(store.delete_user(owner.id).unwrap());
        assert_eq!(count_rows(&store, "recipes"), 0);
        assert_eq!(count_rows(&store, "tags"), 0);
        assert_eq!(count_rows(&store, "ingredients"), 0);
    }

    #[test]
    fn test_set_recipe_image_returns_previous() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");
        let created = store
            .create_recipe(owner.id, &new_recipe("Soup", &[], &[]))
            .unwrap();

        let previous = store
            .set_recipe_image(owner.id, created.recipe.id, "uploads/recipe/a.png")
            .unwrap();
        assert!(previous.is_none());

        let previous = store
            .set_recipe_image(owner.id, created.recipe.id, "uploads/recipe/b.png")
            .unwrap();
        assert_eq!(previous.as_deref(), Some("uploads/recipe/a.png"));
    }

    #[test]
    fn test_price_round_trips_through_cents() {
        let (_temp, store) = setup();
        let owner = user(&store, "test@example.com");
        let created = store
            .create_recipe(owner.id, &new_recipe("Soup", &[], &[]))
            .unwrap();
        assert_eq!(created.recipe.price.to_string(), "5.25");
    }
}
