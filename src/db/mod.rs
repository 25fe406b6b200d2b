//! Database module for Mailmirror
//!
//! SQLite store for accounts, mirrored messages and their attachments.
//! The sync engine talks to it through the [`MailStore`] trait.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

// Connection pooling
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Record not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// `smart_category` of placeholder rows
pub const PLACEHOLDER_CATEGORY: &str = "System Error";

/// Deterministic local id of a mirrored message
pub fn email_id(account_id: i64, folder: &str, uid: u32) -> String {
    format!("{}:{}:{}", account_id, folder, uid)
}

/// Persistence operations the sync engine relies on
pub trait MailStore: Send + Sync {
    fn add_account(&self, account: &NewAccount) -> DbResult<i64>;

    fn get_accounts(&self) -> DbResult<Vec<Account>>;

    fn get_account(&self, id: i64) -> DbResult<Account>;

    /// Upsert by deterministic id; replaces the attachment set wholesale
    fn save_email(&self, email: &NewEmail) -> DbResult<String>;

    fn get_emails(&self, account_id: i64) -> DbResult<Vec<Email>>;

    fn get_all_uids_for_folder(&self, account_id: i64, folder: &str) -> DbResult<Vec<u32>>;

    fn delete_emails_by_uid(&self, account_id: i64, uids: &[u32], folder: &str) -> DbResult<usize>;

    /// Relabel every message of `account_id` stored under `old_label`
    fn migrate_folder(&self, account_id: i64, old_label: &str, new_label: &str) -> DbResult<usize>;

    fn get_max_uid_for_folder(&self, account_id: i64, folder: &str) -> DbResult<Option<u32>>;

    fn update_email_flags_by_uid(
        &self,
        account_id: i64,
        folder: &str,
        uid: u32,
        is_read: Option<bool>,
        is_flagged: Option<bool>,
    ) -> DbResult<bool>;

    /// Overwrite read/flagged state for many UIDs in one transaction.
    /// Placeholder rows are left untouched. Returns the number of rows changed.
    fn refresh_email_flags(&self, account_id: i64, folder: &str, updates: &[FlagUpdate]) -> DbResult<usize>;

    fn get_folder_uid_validity(&self, account_id: i64, folder: &str) -> DbResult<Option<u32>>;

    fn set_folder_uid_validity(&self, account_id: i64, folder: &str, uid_validity: u32) -> DbResult<()>;

    /// Drop every stored message of the folder and record the new UIDVALIDITY
    fn reset_folder(&self, account_id: i64, folder: &str, uid_validity: u32) -> DbResult<usize>;

    fn update_account_sync(&self, account_id: i64, synced_at: &str) -> DbResult<()>;

    fn update_account_quota(&self, account_id: i64, used_kb: i64, total_kb: i64) -> DbResult<()>;
}

/// Database manager for thread-safe SQLite access
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl Database {
    /// Create a new database connection pool
    pub fn new(db_path: PathBuf) -> DbResult<Self> {
        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

        let pool = Pool::builder()
            .max_size(8)
            .min_idle(Some(1))
            .connection_timeout(std::time::Duration::from_secs(10))
            .build(manager)?;

        let conn = pool.get()?;

        // Performance PRAGMAs
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        Self::init_schema(&conn)?;
        drop(conn);

        log::info!("Database opened at {}", db_path.display());
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create an in-memory database (for testing)
    ///
    /// Every `:memory:` connection is its own database, so the pool holds one.
    pub fn in_memory() -> DbResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

        let pool = Pool::builder().max_size(1).build(manager)?;

        let conn = pool.get()?;
        Self::init_schema(&conn)?;
        drop(conn);

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn init_schema(conn: &Connection) -> DbResult<()> {
        let schema = include_str!("schema.sql");
        conn.execute_batch(schema)?;
        Ok(())
    }

    /// Get a connection from the pool
    #[inline]
    pub fn get_conn(&self) -> DbResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    // =========================================================================
    // EMAILS
    // =========================================================================

    /// Get full email by ID
    pub fn get_email(&self, id: &str) -> DbResult<Email> {
        let conn = self.get_conn()?;
        conn.query_row(
            &format!("SELECT {} FROM emails WHERE id = ?1", Email::COLUMNS),
            [id],
            Email::from_row,
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("email {}", id)))
    }

    /// Get all attachments for an email
    pub fn get_attachments_for_email(&self, email_id: &str) -> DbResult<Vec<Attachment>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, email_id, filename, content_type, size, data
            FROM attachments
            WHERE email_id = ?1
            ORDER BY filename ASC
            "#,
        )?;

        let attachments = stmt
            .query_map([email_id], |row| {
                Ok(Attachment {
                    id: row.get(0)?,
                    email_id: row.get(1)?,
                    filename: row.get(2)?,
                    content_type: row.get(3)?,
                    size: row.get(4)?,
                    data: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(attachments)
    }
}

impl MailStore for Database {
    // =========================================================================
    // ACCOUNTS
    // =========================================================================

    fn add_account(&self, account: &NewAccount) -> DbResult<i64> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO accounts (
                email, display_name, username, password,
                imap_host, imap_port, imap_security, provider, accept_invalid_certs
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                account.email,
                account.display_name,
                account.username,
                account.password,
                account.imap_host,
                account.imap_port,
                account.imap_security,
                account.provider,
                account.accept_invalid_certs,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn get_accounts(&self) -> DbResult<Vec<Account>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts ORDER BY email ASC",
            Account::COLUMNS
        ))?;

        let accounts = stmt
            .query_map([], Account::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(accounts)
    }

    fn get_account(&self, id: i64) -> DbResult<Account> {
        let conn = self.get_conn()?;
        conn.query_row(
            &format!("SELECT {} FROM accounts WHERE id = ?1", Account::COLUMNS),
            [id],
            Account::from_row,
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("account {}", id)))
    }

    fn save_email(&self, email: &NewEmail) -> DbResult<String> {
        let id = email.id();
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO emails (
                id, account_id, uid, folder, sender, sender_email, subject,
                body, body_html, date, is_read, is_flagged, smart_category, has_attachments
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(id) DO UPDATE SET
                sender = excluded.sender,
                sender_email = excluded.sender_email,
                subject = excluded.subject,
                body = excluded.body,
                body_html = excluded.body_html,
                date = excluded.date,
                is_read = excluded.is_read,
                is_flagged = excluded.is_flagged,
                smart_category = COALESCE(excluded.smart_category, smart_category),
                has_attachments = excluded.has_attachments
            "#,
            params![
                id,
                email.account_id,
                email.uid,
                email.folder,
                email.sender,
                email.sender_email,
                email.subject,
                email.body,
                email.body_html,
                email.date,
                email.is_read,
                email.is_flagged,
                email.smart_category,
                email.has_attachments || !email.attachments.is_empty(),
            ],
        )?;

        tx.execute("DELETE FROM attachments WHERE email_id = ?1", [&id])?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO attachments (id, email_id, filename, content_type, size, data)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for attachment in &email.attachments {
                stmt.execute(params![
                    uuid::Uuid::new_v4().to_string(),
                    id,
                    attachment.filename,
                    attachment.content_type,
                    attachment.data.len() as i64,
                    attachment.data,
                ])?;
            }
        }

        tx.commit()?;
        Ok(id)
    }

    fn get_emails(&self, account_id: i64) -> DbResult<Vec<Email>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM emails WHERE account_id = ?1 ORDER BY date DESC, uid DESC",
            Email::COLUMNS
        ))?;

        let emails = stmt
            .query_map([account_id], Email::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(emails)
    }

    fn get_all_uids_for_folder(&self, account_id: i64, folder: &str) -> DbResult<Vec<u32>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT uid FROM emails WHERE account_id = ?1 AND folder = ?2 ORDER BY uid ASC",
        )?;

        let uids = stmt
            .query_map(params![account_id, folder], |row| row.get::<_, u32>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(uids)
    }

    fn delete_emails_by_uid(&self, account_id: i64, uids: &[u32], folder: &str) -> DbResult<usize> {
        if uids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare(
                "DELETE FROM emails WHERE account_id = ?1 AND folder = ?2 AND uid = ?3",
            )?;
            for uid in uids {
                deleted += stmt.execute(params![account_id, folder, uid])?;
            }
        }
        tx.commit()?;

        Ok(deleted)
    }

    fn migrate_folder(&self, account_id: i64, old_label: &str, new_label: &str) -> DbResult<usize> {
        if old_label == new_label {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        // Same UID already stored under the new label: keep the relabelled copy
        tx.execute(
            r#"
            DELETE FROM emails
            WHERE account_id = ?1 AND folder = ?3
              AND uid IN (SELECT uid FROM emails WHERE account_id = ?1 AND folder = ?2)
            "#,
            params![account_id, old_label, new_label],
        )?;

        let moved = tx.execute(
            r#"
            UPDATE emails
            SET folder = ?3, id = account_id || ':' || ?3 || ':' || uid
            WHERE account_id = ?1 AND folder = ?2
            "#,
            params![account_id, old_label, new_label],
        )?;

        tx.commit()?;
        Ok(moved)
    }

    fn get_max_uid_for_folder(&self, account_id: i64, folder: &str) -> DbResult<Option<u32>> {
        let conn = self.get_conn()?;
        let max = conn.query_row(
            "SELECT MAX(uid) FROM emails WHERE account_id = ?1 AND folder = ?2",
            params![account_id, folder],
            |row| row.get::<_, Option<u32>>(0),
        )?;

        Ok(max)
    }

    fn update_email_flags_by_uid(
        &self,
        account_id: i64,
        folder: &str,
        uid: u32,
        is_read: Option<bool>,
        is_flagged: Option<bool>,
    ) -> DbResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            r#"
            UPDATE emails
            SET is_read = COALESCE(?4, is_read), is_flagged = COALESCE(?5, is_flagged)
            WHERE account_id = ?1 AND folder = ?2 AND uid = ?3
            "#,
            params![account_id, folder, uid, is_read, is_flagged],
        )?;

        Ok(changed > 0)
    }

    fn refresh_email_flags(&self, account_id: i64, folder: &str, updates: &[FlagUpdate]) -> DbResult<usize> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                UPDATE emails
                SET is_read = ?4, is_flagged = ?5
                WHERE account_id = ?1 AND folder = ?2 AND uid = ?3
                  AND (is_read != ?4 OR is_flagged != ?5)
                  AND (smart_category IS NULL OR smart_category != ?6)
                "#,
            )?;
            for update in updates {
                changed += stmt.execute(params![
                    account_id,
                    folder,
                    update.uid,
                    update.is_read,
                    update.is_flagged,
                    PLACEHOLDER_CATEGORY
                ])?;
            }
        }
        tx.commit()?;

        Ok(changed)
    }

    fn get_folder_uid_validity(&self, account_id: i64, folder: &str) -> DbResult<Option<u32>> {
        let conn = self.get_conn()?;
        let validity = conn
            .query_row(
                "SELECT uid_validity FROM folder_state WHERE account_id = ?1 AND folder = ?2",
                params![account_id, folder],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;

        Ok(validity)
    }

    fn set_folder_uid_validity(&self, account_id: i64, folder: &str, uid_validity: u32) -> DbResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO folder_state (account_id, folder, uid_validity) VALUES (?1, ?2, ?3)
            ON CONFLICT(account_id, folder) DO UPDATE SET uid_validity = excluded.uid_validity
            "#,
            params![account_id, folder, uid_validity],
        )?;

        Ok(())
    }

    fn reset_folder(&self, account_id: i64, folder: &str, uid_validity: u32) -> DbResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let deleted = tx.execute(
            "DELETE FROM emails WHERE account_id = ?1 AND folder = ?2",
            params![account_id, folder],
        )?;
        tx.execute(
            r#"
            INSERT INTO folder_state (account_id, folder, uid_validity) VALUES (?1, ?2, ?3)
            ON CONFLICT(account_id, folder) DO UPDATE SET uid_validity = excluded.uid_validity
            "#,
            params![account_id, folder, uid_validity],
        )?;

        tx.commit()?;
        Ok(deleted)
    }

    fn update_account_sync(&self, account_id: i64, synced_at: &str) -> DbResult<()> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE accounts SET last_sync = ?1 WHERE id = ?2",
            params![synced_at, account_id],
        )?;

        if changed == 0 {
            return Err(DbError::NotFound(format!("account {}", account_id)));
        }
        Ok(())
    }

    fn update_account_quota(&self, account_id: i64, used_kb: i64, total_kb: i64) -> DbResult<()> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE accounts SET storage_used_kb = ?1, storage_total_kb = ?2 WHERE id = ?3",
            params![used_kb, total_kb, account_id],
        )?;

        if changed == 0 {
            return Err(DbError::NotFound(format!("account {}", account_id)));
        }
        Ok(())
    }
}

// =========================================================================
// MODELS
// =========================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub email: String,
    pub display_name: String,
    pub username: Option<String>,
    pub password: String,
    pub imap_host: String,
    pub imap_port: i32,
    pub imap_security: String,
    pub provider: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: String,
    pub imap_host: String,
    pub imap_port: i32,
    pub imap_security: String,
    pub provider: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    pub is_active: bool,
    pub last_sync: Option<String>,
    pub storage_used_kb: Option<i64>,
    pub storage_total_kb: Option<i64>,
    pub created_at: String,
}

impl Account {
    const COLUMNS: &'static str = "id, email, display_name, username, password, \
         imap_host, imap_port, imap_security, provider, accept_invalid_certs, \
         is_active, last_sync, storage_used_kb, storage_total_kb, created_at";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Account {
            id: row.get(0)?,
            email: row.get(1)?,
            display_name: row.get(2)?,
            username: row.get(3)?,
            password: row.get(4)?,
            imap_host: row.get(5)?,
            imap_port: row.get(6)?,
            imap_security: row.get(7)?,
            provider: row.get(8)?,
            accept_invalid_certs: row.get(9)?,
            is_active: row.get(10)?,
            last_sync: row.get(11)?,
            storage_used_kb: row.get(12)?,
            storage_total_kb: row.get(13)?,
            created_at: row.get(14)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub email_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEmail {
    pub account_id: i64,
    pub uid: u32,
    pub folder: String,
    pub sender: String,
    pub sender_email: String,
    pub subject: String,
    pub body: Option<String>,
    pub body_html: Option<String>,
    pub date: String,
    pub is_read: bool,
    pub is_flagged: bool,
    pub smart_category: Option<String>,
    pub has_attachments: bool,
    pub attachments: Vec<NewAttachment>,
}

/// Server-side read/flagged state of one stored UID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagUpdate {
    pub uid: u32,
    pub is_read: bool,
    pub is_flagged: bool,
}

impl NewEmail {
    pub fn id(&self) -> String {
        email_id(self.account_id, &self.folder, self.uid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub id: String,
    pub account_id: i64,
    pub uid: u32,
    pub folder: String,
    pub sender: String,
    pub sender_email: String,
    pub subject: String,
    pub body: Option<String>,
    pub body_html: Option<String>,
    pub date: String,
    pub is_read: bool,
    pub is_flagged: bool,
    pub smart_category: Option<String>,
    pub has_attachments: bool,
}

impl Email {
    const COLUMNS: &'static str = "id, account_id, uid, folder, sender, sender_email, subject, \
         body, body_html, date, is_read, is_flagged, smart_category, has_attachments";

    /// Create Email from database row
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Email {
            id: row.get(0)?,
            account_id: row.get(1)?,
            uid: row.get(2)?,
            folder: row.get(3)?,
            sender: row.get(4)?,
            sender_email: row.get(5)?,
            subject: row.get(6)?,
            body: row.get(7)?,
            body_html: row.get(8)?,
            date: row.get(9)?,
            is_read: row.get(10)?,
            is_flagged: row.get(11)?,
            smart_category: row.get(12)?,
            has_attachments: row.get(13)?,
        })
    }
}

/// Account fixture with an SSL host, not persisted
#[cfg(test)]
pub(crate) fn test_account(id: i64, email: &str) -> Account {
    Account {
        id,
        email: email.to_string(),
        display_name: "Test User".to_string(),
        username: None,
        password: "secret".to_string(),
        imap_host: "imap.example.com".to_string(),
        imap_port: 993,
        imap_security: "SSL".to_string(),
        provider: None,
        accept_invalid_certs: false,
        is_active: true,
        last_sync: None,
        storage_used_kb: None,
        storage_total_kb: None,
        created_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

#[cfg(test)]
pub(crate) fn test_new_account(email: &str) -> NewAccount {
    NewAccount {
        email: email.to_string(),
        display_name: "Test User".to_string(),
        username: None,
        password: "secret".to_string(),
        imap_host: "imap.example.com".to_string(),
        imap_port: 993,
        imap_security: "SSL".to_string(),
        provider: None,
        accept_invalid_certs: false,
    }
}

#[cfg(test)]
pub(crate) fn test_email(account_id: i64, folder: &str, uid: u32) -> NewEmail {
    NewEmail {
        account_id,
        uid,
        folder: folder.to_string(),
        sender: "Alice".to_string(),
        sender_email: "alice@example.com".to_string(),
        subject: format!("Message {}", uid),
        body: Some("Hello".to_string()),
        body_html: None,
        date: "2024-10-01T12:00:00Z".to_string(),
        is_read: false,
        is_flagged: false,
        smart_category: None,
        has_attachments: false,
        attachments: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (Database, i64) {
        let db = Database::in_memory().expect("Failed to create in-memory database");
        let account_id = db
            .add_account(&test_new_account("test@example.com"))
            .expect("Failed to add account");
        (db, account_id)
    }

    #[test]
    fn test_database_creation() {
        let (db, id) = setup();
        assert!(id > 0);

        let accounts = db.get_accounts().expect("Failed to get accounts");
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].email, "test@example.com");
        assert!(accounts[0].is_active);
        assert!(accounts[0].last_sync.is_none());
    }

    #[test]
    fn test_file_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("mirror.db");

        {
            let db = Database::new(db_path.clone()).unwrap();
            let id = db.add_account(&test_new_account("file@example.com")).unwrap();
            db.save_email(&test_email(id, "Posteingang", 7)).unwrap();
        }

        let db = Database::new(db_path).unwrap();
        let accounts = db.get_accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(db.get_max_uid_for_folder(accounts[0].id, "Posteingang").unwrap(), Some(7));
    }

    #[test]
    fn test_save_email_is_upsert() {
        let (db, account_id) = setup();

        let mut email = test_email(account_id, "Posteingang", 42);
        let id = db.save_email(&email).unwrap();
        assert_eq!(id, format!("{}:Posteingang:42", account_id));

        email.is_read = true;
        email.subject = "Updated".to_string();
        db.save_email(&email).unwrap();

        let emails = db.get_emails(account_id).unwrap();
        assert_eq!(emails.len(), 1);
        assert!(emails[0].is_read);
        assert_eq!(emails[0].subject, "Updated");
    }

    #[test]
    fn test_save_email_replaces_attachments() {
        let (db, account_id) = setup();

        let mut email = test_email(account_id, "Posteingang", 1);
        email.attachments = vec![
            NewAttachment {
                filename: "a.txt".to_string(),
                content_type: "text/plain".to_string(),
                data: b"first".to_vec(),
            },
            NewAttachment {
                filename: "b.txt".to_string(),
                content_type: "text/plain".to_string(),
                data: b"second".to_vec(),
            },
        ];
        let id = db.save_email(&email).unwrap();
        assert_eq!(db.get_attachments_for_email(&id).unwrap().len(), 2);

        email.attachments = vec![NewAttachment {
            filename: "c.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            data: b"%PDF".to_vec(),
        }];
        db.save_email(&email).unwrap();

        let attachments = db.get_attachments_for_email(&id).unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "c.pdf");
        assert_eq!(attachments[0].size, 4);
        assert!(db.get_email(&id).unwrap().has_attachments);
    }

    #[test]
    fn test_smart_category_survives_resave() {
        let (db, account_id) = setup();

        let mut email = test_email(account_id, "Posteingang", 3);
        email.smart_category = Some("Newsletter".to_string());
        let id = db.save_email(&email).unwrap();

        email.smart_category = None;
        db.save_email(&email).unwrap();
        assert_eq!(db.get_email(&id).unwrap().smart_category.as_deref(), Some("Newsletter"));
    }

    #[test]
    fn test_uid_queries_are_folder_scoped() {
        let (db, account_id) = setup();

        for uid in [100, 200, 300] {
            db.save_email(&test_email(account_id, "Posteingang", uid)).unwrap();
        }
        db.save_email(&test_email(account_id, "Gesendet", 900)).unwrap();

        assert_eq!(
            db.get_all_uids_for_folder(account_id, "Posteingang").unwrap(),
            vec![100, 200, 300]
        );
        assert_eq!(db.get_max_uid_for_folder(account_id, "Posteingang").unwrap(), Some(300));
        assert_eq!(db.get_max_uid_for_folder(account_id, "Spam").unwrap(), None);

        let deleted = db.delete_emails_by_uid(account_id, &[200, 900], "Posteingang").unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(db.get_all_uids_for_folder(account_id, "Gesendet").unwrap(), vec![900]);
    }

    #[test]
    fn test_migrate_folder_relabels_and_rekeys() {
        let (db, account_id) = setup();

        let mut email = test_email(account_id, "INBOX.Amazon", 5);
        email.attachments = vec![NewAttachment {
            filename: "label.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            data: vec![1, 2, 3],
        }];
        db.save_email(&email).unwrap();
        db.save_email(&test_email(account_id, "INBOX.Amazon", 6)).unwrap();
        // Collides with UID 6 from the old label
        db.save_email(&test_email(account_id, "Posteingang/Amazon", 6)).unwrap();

        let moved = db.migrate_folder(account_id, "INBOX.Amazon", "Posteingang/Amazon").unwrap();
        assert_eq!(moved, 2);

        assert!(db.get_all_uids_for_folder(account_id, "INBOX.Amazon").unwrap().is_empty());
        assert_eq!(
            db.get_all_uids_for_folder(account_id, "Posteingang/Amazon").unwrap(),
            vec![5, 6]
        );

        let new_id = email_id(account_id, "Posteingang/Amazon", 5);
        assert_eq!(db.get_email(&new_id).unwrap().uid, 5);
        assert_eq!(db.get_attachments_for_email(&new_id).unwrap().len(), 1);
    }

    #[test]
    fn test_migrate_folder_noop() {
        let (db, account_id) = setup();
        assert_eq!(db.migrate_folder(account_id, "Nothing", "Elsewhere").unwrap(), 0);
        assert_eq!(db.migrate_folder(account_id, "Same", "Same").unwrap(), 0);
    }

    #[test]
    fn test_update_flags_and_account_metadata() {
        let (db, account_id) = setup();
        db.save_email(&test_email(account_id, "Posteingang", 1)).unwrap();

        assert!(db
            .update_email_flags_by_uid(account_id, "Posteingang", 1, Some(true), None)
            .unwrap());
        assert!(!db
            .update_email_flags_by_uid(account_id, "Posteingang", 2, Some(true), None)
            .unwrap());

        let email = &db.get_emails(account_id).unwrap()[0];
        assert!(email.is_read);
        assert!(!email.is_flagged);

        db.update_account_sync(account_id, "2024-10-01T12:00:00Z").unwrap();
        db.update_account_quota(account_id, 2, 3).unwrap();
        let account = db.get_account(account_id).unwrap();
        assert_eq!(account.last_sync.as_deref(), Some("2024-10-01T12:00:00Z"));
        assert_eq!(account.storage_used_kb, Some(2));
        assert_eq!(account.storage_total_kb, Some(3));

        assert!(matches!(db.update_account_sync(999, "x"), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_folder_uid_validity_and_reset() {
        let (db, account_id) = setup();
        assert_eq!(db.get_folder_uid_validity(account_id, "Posteingang").unwrap(), None);

        db.set_folder_uid_validity(account_id, "Posteingang", 7).unwrap();
        db.set_folder_uid_validity(account_id, "Posteingang", 8).unwrap();
        assert_eq!(db.get_folder_uid_validity(account_id, "Posteingang").unwrap(), Some(8));
        assert_eq!(db.get_folder_uid_validity(account_id, "Gesendet").unwrap(), None);

        for uid in [1, 2] {
            db.save_email(&test_email(account_id, "Posteingang", uid)).unwrap();
        }
        db.save_email(&test_email(account_id, "Gesendet", 1)).unwrap();

        assert_eq!(db.reset_folder(account_id, "Posteingang", 9).unwrap(), 2);
        assert_eq!(db.get_folder_uid_validity(account_id, "Posteingang").unwrap(), Some(9));
        assert_eq!(db.get_max_uid_for_folder(account_id, "Posteingang").unwrap(), None);
        assert_eq!(db.get_all_uids_for_folder(account_id, "Gesendet").unwrap(), vec![1]);
    }

    #[test]
    fn test_refresh_flags_counts_changes_and_skips_placeholders() {
        let (db, account_id) = setup();
        db.save_email(&test_email(account_id, "Posteingang", 1)).unwrap();
        db.save_email(&test_email(account_id, "Posteingang", 2)).unwrap();
        let mut placeholder = test_email(account_id, "Posteingang", 3);
        placeholder.is_read = true;
        placeholder.smart_category = Some(PLACEHOLDER_CATEGORY.to_string());
        db.save_email(&placeholder).unwrap();

        let updates = [
            FlagUpdate { uid: 1, is_read: true, is_flagged: true },
            // Already matches the stored state
            FlagUpdate { uid: 2, is_read: false, is_flagged: false },
            FlagUpdate { uid: 3, is_read: false, is_flagged: true },
            // Not stored
            FlagUpdate { uid: 4, is_read: true, is_flagged: false },
        ];
        assert_eq!(db.refresh_email_flags(account_id, "Posteingang", &updates).unwrap(), 1);
        assert_eq!(db.refresh_email_flags(account_id, "Posteingang", &[]).unwrap(), 0);

        let first = db.get_email(&email_id(account_id, "Posteingang", 1)).unwrap();
        assert!(first.is_read && first.is_flagged);

        let kept = db.get_email(&email_id(account_id, "Posteingang", 3)).unwrap();
        assert!(kept.is_read);
        assert!(!kept.is_flagged);
    }
}
