//! SQLite rows for tenants and users.
//!
//! Functions take a plain `&Connection` so that the binder can run several
//! of them inside one transaction.

use super::{BusinessType, Role, Tenant, User, UserStatus};
use crate::db::{parse_timestamp, timestamp};
use crate::error::StorageError;
use rusqlite::{params, Connection, OptionalExtension, Row};

const TENANT_COLUMNS: &str =
    "id, business_name, business_type, email, estimated_invoices_monthly, created_at, updated_at";

const USER_COLUMNS: &str =
    "id, tenant_id, subject, email, first_name, last_name, role, status, created_at, updated_at";

struct TenantRow {
    id: String,
    business_name: String,
    business_type: String,
    email: String,
    estimated_invoices_monthly: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl TenantRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            business_name: row.get(1)?,
            business_type: row.get(2)?,
            email: row.get(3)?,
            estimated_invoices_monthly: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_tenant(self) -> Result<Tenant, StorageError> {
        Ok(Tenant {
            business_type: self
                .business_type
                .parse::<BusinessType>()
                .map_err(StorageError::Corrupt)?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            id: self.id,
            business_name: self.business_name,
            email: self.email,
            estimated_invoices_monthly: self.estimated_invoices_monthly,
        })
    }
}

struct UserRow {
    id: i64,
    tenant_id: String,
    subject: String,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    role: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            subject: row.get(2)?,
            email: row.get(3)?,
            first_name: row.get(4)?,
            last_name: row.get(5)?,
            role: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_user(self) -> Result<User, StorageError> {
        Ok(User {
            role: self.role.parse::<Role>().map_err(StorageError::Corrupt)?,
            status: self
                .status
                .parse::<UserStatus>()
                .map_err(StorageError::Corrupt)?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            id: self.id,
            tenant_id: self.tenant_id,
            subject: self.subject,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
        })
    }
}

pub(super) fn insert_tenant(conn: &Connection, tenant: &Tenant) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO tenants ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)", TENANT_COLUMNS),
        params![
            tenant.id,
            tenant.business_name,
            tenant.business_type.as_str(),
            tenant.email,
            tenant.estimated_invoices_monthly,
            timestamp(&tenant.created_at),
            timestamp(&tenant.updated_at),
        ],
    )?;
    Ok(())
}

pub(super) fn update_tenant(conn: &Connection, tenant: &Tenant) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE tenants
         SET business_name = ?2, business_type = ?3, estimated_invoices_monthly = ?4, updated_at = ?5
         WHERE id = ?1",
        params![
            tenant.id,
            tenant.business_name,
            tenant.business_type.as_str(),
            tenant.estimated_invoices_monthly,
            timestamp(&tenant.updated_at),
        ],
    )?;
    Ok(())
}

pub(super) fn find_tenant(conn: &Connection, tenant_id: &str) -> Result<Option<Tenant>, StorageError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM tenants WHERE id = ?1", TENANT_COLUMNS),
            params![tenant_id],
            TenantRow::from_row,
        )
        .optional()?;
    row.map(TenantRow::into_tenant).transpose()
}

pub(super) fn tenant_email_taken(conn: &Connection, email: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tenants WHERE email = ?1)",
        params![email],
        |row| row.get(0),
    )
}

/// Inserts a user and returns its row id.
pub(super) fn insert_user(conn: &Connection, user: &User) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO users (tenant_id, subject, email, first_name, last_name, role, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            user.tenant_id,
            user.subject,
            user.email,
            user.first_name,
            user.last_name,
            user.role.as_str(),
            user.status.as_str(),
            timestamp(&user.created_at),
            timestamp(&user.updated_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn update_user(conn: &Connection, user: &User) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users
         SET first_name = ?2, last_name = ?3, role = ?4, status = ?5, updated_at = ?6
         WHERE id = ?1",
        params![
            user.id,
            user.first_name,
            user.last_name,
            user.role.as_str(),
            user.status.as_str(),
            timestamp(&user.updated_at),
        ],
    )?;
    Ok(())
}

pub(super) fn subject_taken(conn: &Connection, subject: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE subject = ?1)",
        params![subject],
        |row| row.get(0),
    )
}

pub(super) fn find_user_by_subject(conn: &Connection, subject: &str) -> Result<Option<User>, StorageError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE subject = ?1", USER_COLUMNS),
            params![subject],
            UserRow::from_row,
        )
        .optional()?;
    row.map(UserRow::into_user).transpose()
}

/// Looks a user up by id within one tenant; other tenants' users are invisible.
pub(super) fn find_member(
    conn: &Connection,
    tenant_id: &str,
    user_id: i64,
) -> Result<Option<User>, StorageError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1 AND tenant_id = ?2", USER_COLUMNS),
            params![user_id, tenant_id],
            UserRow::from_row,
        )
        .optional()?;
    row.map(UserRow::into_user).transpose()
}

pub(super) fn list_members(conn: &Connection, tenant_id: &str) -> Result<Vec<User>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE tenant_id = ?1 ORDER BY id ASC",
        USER_COLUMNS
    ))?;
    let rows = stmt.query_map(params![tenant_id], UserRow::from_row)?;

    let mut users = Vec::new();
    for row in rows {
        users.push(row?.into_user()?);
    }
    Ok(users)
}
