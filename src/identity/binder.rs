//! Binding of verified subjects to tenant-scoped users.

use super::store;
use super::{
    normalize_email, NewTenant, NewUser, Role, Tenant, TenantUpdate, User, UserStatus, UserUpdate,
};
use crate::db::{is_constraint_violation, Database};
use crate::error::BinderError;
use chrono::Utc;
use rusqlite::TransactionBehavior;
use uuid::Uuid;

/// Resolves and provisions tenants and users.
///
/// Every lookup is keyed by the caller-supplied subject or scoped to the
/// acting user's tenant; there is no unscoped access by user id.
#[derive(Clone)]
pub struct IdentityBinder {
    pub(super) db: Database,
}

impl IdentityBinder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Internal user for an identity-provider subject.
    pub fn resolve(&self, subject: &str) -> Result<User, BinderError> {
        let conn = self.db.lock()?;
        store::find_user_by_subject(&conn, subject)?
            .ok_or_else(|| BinderError::NotFound("user".to_string()))
    }

    pub fn tenant(&self, tenant_id: &str) -> Result<Tenant, BinderError> {
        let conn = self.db.lock()?;
        store::find_tenant(&conn, tenant_id)?
            .ok_or_else(|| BinderError::NotFound("tenant".to_string()))
    }

    /// Inserts `tenant` as given unless its id already exists, returning the
    /// stored row either way.
    pub fn ensure_tenant(&self, tenant: &Tenant) -> Result<Tenant, BinderError> {
        let conn = self.db.lock()?;
        if let Some(existing) = store::find_tenant(&conn, &tenant.id)? {
            return Ok(existing);
        }
        store::insert_tenant(&conn, tenant).map_err(conflict_or_storage)?;
        tracing::info!(tenant_id = %tenant.id, "Seeded tenant");
        Ok(tenant.clone())
    }

    /// Creates a tenant together with its first admin, or neither.
    ///
    /// The admin starts as `pending_confirmation` until [`activate`](Self::activate).
    pub fn provision_tenant_admin(
        &self,
        tenant_data: NewTenant,
        user_data: NewUser,
        subject: &str,
    ) -> Result<(Tenant, User), BinderError> {
        let now = Utc::now();
        let email = normalize_email(&tenant_data.email);

        let mut conn = self.db.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if store::tenant_email_taken(&tx, &email)? {
            tracing::debug!(email = %email, "Tenant signup rejected, email already registered");
            return Err(BinderError::Conflict("tenant email already registered".to_string()));
        }
        if store::subject_taken(&tx, subject)? {
            return Err(BinderError::Conflict("subject already registered".to_string()));
        }

        let tenant = Tenant {
            id: Uuid::new_v4().to_string(),
            business_name: tenant_data.business_name,
            business_type: tenant_data.business_type,
            email,
            estimated_invoices_monthly: tenant_data.estimated_invoices_monthly,
            created_at: now,
            updated_at: now,
        };
        store::insert_tenant(&tx, &tenant).map_err(conflict_or_storage)?;

        let mut user = User {
            id: 0,
            tenant_id: tenant.id.clone(),
            subject: subject.to_string(),
            email: user_data.email,
            first_name: user_data.first_name,
            last_name: user_data.last_name,
            role: Role::Admin,
            status: UserStatus::PendingConfirmation,
            created_at: now,
            updated_at: now,
        };
        // Dropping tx on error rolls the tenant back
        user.id = store::insert_user(&tx, &user).map_err(conflict_or_storage)?;

        tx.commit()?;
        tracing::info!(tenant_id = %tenant.id, user_id = user.id, "Provisioned tenant with admin");
        Ok((tenant, user))
    }

    /// Adds a user to an existing tenant with the role from `user_data`.
    pub fn provision_member(
        &self,
        tenant_id: &str,
        user_data: NewUser,
        subject: &str,
    ) -> Result<User, BinderError> {
        let now = Utc::now();

        let mut conn = self.db.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if store::find_tenant(&tx, tenant_id)?.is_none() {
            return Err(BinderError::NotFound("tenant".to_string()));
        }
        if store::subject_taken(&tx, subject)? {
            return Err(BinderError::Conflict("subject already registered".to_string()));
        }

        let mut user = User {
            id: 0,
            tenant_id: tenant_id.to_string(),
            subject: subject.to_string(),
            email: user_data.email,
            first_name: user_data.first_name,
            last_name: user_data.last_name,
            role: user_data.role,
            status: UserStatus::PendingConfirmation,
            created_at: now,
            updated_at: now,
        };
        user.id = store::insert_user(&tx, &user).map_err(conflict_or_storage)?;

        tx.commit()?;
        tracing::info!(tenant_id, user_id = user.id, role = user.role.as_str(), "Provisioned member");
        Ok(user)
    }

    /// Marks a confirmed user active.
    ///
    /// Only `pending_confirmation` users move; an already active user is
    /// returned unchanged and a deactivated one stays deactivated.
    pub fn activate(&self, subject: &str) -> Result<User, BinderError> {
        let conn = self.db.lock()?;
        let mut user = store::find_user_by_subject(&conn, subject)?
            .ok_or_else(|| BinderError::NotFound("user".to_string()))?;

        match user.status {
            UserStatus::Active => Ok(user),
            UserStatus::Inactive => Err(BinderError::Forbidden(
                "deactivated users cannot be re-confirmed".to_string(),
            )),
            UserStatus::PendingConfirmation => {
                user.status = UserStatus::Active;
                user.updated_at = Utc::now();
                store::update_user(&conn, &user)?;
                tracing::info!(tenant_id = %user.tenant_id, user_id = user.id, "User activated");
                Ok(user)
            }
        }
    }

    /// Fails with `Forbidden` unless `user` has exactly `role`. No I/O.
    pub fn require_role(user: &User, role: Role) -> Result<(), BinderError> {
        if user.role == role {
            Ok(())
        } else {
            Err(BinderError::Forbidden(format!(
                "role {} required, user {} has {}",
                role.as_str(),
                user.id,
                user.role.as_str()
            )))
        }
    }

    /// Users of the actor's own tenant.
    pub fn list_members(&self, actor: &User) -> Result<Vec<User>, BinderError> {
        let conn = self.db.lock()?;
        Ok(store::list_members(&conn, &actor.tenant_id)?)
    }

    /// Admin changes to another member of the same tenant.
    ///
    /// A member of a different tenant is reported as `NotFound`. Status may be
    /// set to `inactive` from any state and back to `active` only from
    /// `inactive`; confirming a pending user is reserved for
    /// [`activate`](Self::activate).
    pub fn update_member(
        &self,
        actor: &User,
        user_id: i64,
        update: UserUpdate,
    ) -> Result<User, BinderError> {
        Self::require_role(actor, Role::Admin)?;

        let conn = self.db.lock()?;
        let mut user = store::find_member(&conn, &actor.tenant_id, user_id)?
            .ok_or_else(|| BinderError::NotFound("user".to_string()))?;

        if let Some(status) = update.status {
            check_status_change(user.status, status)?;
            user.status = status;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if update.first_name.is_some() {
            user.first_name = update.first_name;
        }
        if update.last_name.is_some() {
            user.last_name = update.last_name;
        }
        user.updated_at = Utc::now();

        store::update_user(&conn, &user)?;
        tracing::info!(
            tenant_id = %actor.tenant_id,
            actor_id = actor.id,
            user_id = user.id,
            status = user.status.as_str(),
            role = user.role.as_str(),
            "Member updated"
        );
        Ok(user)
    }

    /// Admin changes to the actor's own tenant. The id and contact email
    /// never change.
    pub fn update_tenant(&self, actor: &User, update: TenantUpdate) -> Result<Tenant, BinderError> {
        Self::require_role(actor, Role::Admin)?;

        let conn = self.db.lock()?;
        let mut tenant = store::find_tenant(&conn, &actor.tenant_id)?
            .ok_or_else(|| BinderError::NotFound("tenant".to_string()))?;

        if let Some(business_name) = update.business_name {
            tenant.business_name = business_name;
        }
        if let Some(business_type) = update.business_type {
            tenant.business_type = business_type;
        }
        if update.estimated_invoices_monthly.is_some() {
            tenant.estimated_invoices_monthly = update.estimated_invoices_monthly;
        }
        tenant.updated_at = Utc::now();

        store::update_tenant(&conn, &tenant)?;
        tracing::info!(tenant_id = %tenant.id, actor_id = actor.id, "Tenant updated");
        Ok(tenant)
    }
}

fn check_status_change(from: UserStatus, to: UserStatus) -> Result<(), BinderError> {
    let allowed = match to {
        UserStatus::Inactive => true,
        UserStatus::Active => matches!(from, UserStatus::Inactive | UserStatus::Active),
        UserStatus::PendingConfirmation => from == UserStatus::PendingConfirmation,
    };
    if allowed {
        Ok(())
    } else {
        Err(BinderError::Forbidden(format!(
            "status change {} -> {} is not allowed",
            from.as_str(),
            to.as_str()
        )))
    }
}

fn conflict_or_storage(e: rusqlite::Error) -> BinderError {
    if is_constraint_violation(&e) {
        BinderError::Conflict(e.to_string())
    } else {
        e.into()
    }
}
