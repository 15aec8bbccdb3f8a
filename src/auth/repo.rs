use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, StoreError, User, VerifyChannel};

const USER_COLUMNS: &str = "id, email, phone, password_hash, full_name, role, is_active, \
     is_verified, email_verified, phone_verified, created_at, updated_at, last_login, deleted_at";

/// Persistence seam for user records. Handlers only see this trait, so
/// the full auth flows run against [`MemoryUserStore`] in tests.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new: NewUser) -> Result<User, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Login lookup: matches email case-insensitively or phone exactly.
    async fn find_by_login(&self, identifier: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn mark_verified(&self, id: Uuid, channel: VerifyChannel) -> Result<(), StoreError>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError>;
    async fn record_login(&self, id: Uuid) -> Result<(), StoreError>;
    async fn soft_delete(&self, id: Uuid) -> Result<(), StoreError>;
}

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, phone, password_hash, full_name, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.phone)
        .bind(&new.password_hash)
        .bind(&new.full_name)
        .bind(new.role)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE lower(email) = lower($1) AND deleted_at IS NULL
            "#
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_login(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE (lower(email) = lower($1) OR phone = $1) AND deleted_at IS NULL
            "#
        ))
        .bind(identifier)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE id = $1 AND deleted_at IS NULL
            "#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn mark_verified(&self, id: Uuid, channel: VerifyChannel) -> Result<(), StoreError> {
        let sql = match channel {
            VerifyChannel::Email => {
                "UPDATE users SET is_verified = TRUE, email_verified = TRUE, updated_at = now() \
                 WHERE id = $1 AND deleted_at IS NULL"
            }
            VerifyChannel::Phone => {
                "UPDATE users SET is_verified = TRUE, phone_verified = TRUE, updated_at = now() \
                 WHERE id = $1 AND deleted_at IS NULL"
            }
        };
        sqlx::query(sql).bind(id).execute(&self.db).await?;
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn record_login(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = now() WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET deleted_at = now(), is_active = FALSE, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

/// Vec-backed store mirroring the Postgres semantics, soft deletes included.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users
            .iter()
            .filter(|u| u.deleted_at.is_none())
            .any(|u| u.email.eq_ignore_ascii_case(&new.email))
        {
            return Err(StoreError::DuplicateEmail);
        }
        if let Some(phone) = &new.phone {
            if users
                .iter()
                .filter(|u| u.deleted_at.is_none())
                .any(|u| u.phone.as_deref() == Some(phone.as_str()))
            {
                return Err(StoreError::DuplicatePhone);
            }
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            phone: new.phone,
            password_hash: new.password_hash,
            full_name: new.full_name,
            role: new.role,
            is_active: true,
            is_verified: false,
            email_verified: false,
            phone_verified: false,
            created_at: now,
            updated_at: now,
            last_login: None,
            deleted_at: None,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| u.deleted_at.is_none() && u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_login(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| {
                u.deleted_at.is_none()
                    && (u.email.eq_ignore_ascii_case(identifier)
                        || u.phone.as_deref() == Some(identifier))
            })
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| u.deleted_at.is_none() && u.id == id)
            .cloned())
    }

    async fn mark_verified(&self, id: Uuid, channel: VerifyChannel) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.iter_mut().find(|u| u.deleted_at.is_none() && u.id == id) {
            user.is_verified = true;
            match channel {
                VerifyChannel::Email => user.email_verified = true,
                VerifyChannel::Phone => user.phone_verified = true,
            }
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.iter_mut().find(|u| u.deleted_at.is_none() && u.id == id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn record_login(&self, id: Uuid) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.iter_mut().find(|u| u.deleted_at.is_none() && u.id == id) {
            user.last_login = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.iter_mut().find(|u| u.deleted_at.is_none() && u.id == id) {
            let now = OffsetDateTime::now_utc();
            user.deleted_at = Some(now);
            user.is_active = false;
            user.updated_at = now;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::UserRole;

    fn new_user(email: &str, phone: Option<&str>) -> NewUser {
        NewUser {
            email: email.to_string(),
            phone: phone.map(str::to_string),
            password_hash: "hash".to_string(),
            full_name: "Test Patient".to_string(),
            role: UserRole::Patient,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email_case_insensitively() {
        let store = MemoryUserStore::new();
        store
            .create(new_user("a@b.com", None))
            .await
            .expect("first insert");
        let err = store.create(new_user("A@B.COM", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_phone() {
        let store = MemoryUserStore::new();
        store
            .create(new_user("a@b.com", Some("+971501234567")))
            .await
            .expect("first insert");
        let err = store
            .create(new_user("c@d.com", Some("+971501234567")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePhone));
    }

    #[tokio::test]
    async fn login_lookup_matches_email_or_phone() {
        let store = MemoryUserStore::new();
        let user = store
            .create(new_user("a@b.com", Some("+971501234567")))
            .await
            .expect("insert");

        let by_email = store.find_by_login("A@b.com").await.expect("query");
        assert_eq!(by_email.map(|u| u.id), Some(user.id));

        let by_phone = store.find_by_login("+971501234567").await.expect("query");
        assert_eq!(by_phone.map(|u| u.id), Some(user.id));

        let miss = store.find_by_login("other@b.com").await.expect("query");
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn mark_verified_sets_the_matching_channel() {
        let store = MemoryUserStore::new();
        let user = store
            .create(new_user("a@b.com", Some("+971501234567")))
            .await
            .expect("insert");

        store
            .mark_verified(user.id, VerifyChannel::Email)
            .await
            .expect("mark");
        let reloaded = store
            .find_by_id(user.id)
            .await
            .expect("query")
            .expect("present");
        assert!(reloaded.is_verified);
        assert!(reloaded.email_verified);
        assert!(!reloaded.phone_verified);
    }

    #[tokio::test]
    async fn soft_delete_hides_the_user_and_frees_the_email() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("a@b.com", None)).await.expect("insert");

        store.soft_delete(user.id).await.expect("delete");
        assert!(store.find_by_id(user.id).await.expect("query").is_none());
        assert!(store
            .find_by_login("a@b.com")
            .await
            .expect("query")
            .is_none());

        // The partial unique index only covers live rows.
        store
            .create(new_user("a@b.com", None))
            .await
            .expect("email reusable after delete");
    }

    #[tokio::test]
    async fn password_and_login_updates_stick() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("a@b.com", None)).await.expect("insert");

        store
            .update_password(user.id, "new-hash")
            .await
            .expect("update");
        store.record_login(user.id).await.expect("record");

        let reloaded = store
            .find_by_id(user.id)
            .await
            .expect("query")
            .expect("present");
        assert_eq!(reloaded.password_hash, "new-hash");
        assert!(reloaded.last_login.is_some());
    }
}
