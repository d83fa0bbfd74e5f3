//! Server-side document store.
//!
//! Users and uploads live in memory behind `RwLock`s and are written through
//! to `users.json` / `uploads.json` in the data directory after every change.
//! Each mutation holds the write lock for its whole read-modify-write, so a
//! single document update is atomic; nothing spans more than one document.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

const USERS_FILE: &str = "users.json";
const UPLOADS_FILE: &str = "uploads.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// A registered account as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A user as exposed over the API: everything except the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

impl PublicUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// An analysis embedded in an upload. `user` is whoever added it, which is not
/// necessarily the upload's owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDoc {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user: Uuid,
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
    pub chart_type: Option<String>,
    pub data_points: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user: Uuid,
    pub file_name: Option<String>,
    pub upload_date: Option<DateTime<Utc>>,
    pub row_count: Option<u64>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub analyses: Vec<AnalysisDoc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct DocumentStore {
    dir: Option<PathBuf>,
    users: RwLock<IndexMap<Uuid, User>>,
    uploads: RwLock<IndexMap<Uuid, Upload>>,
}

impl DocumentStore {
    /// Opens (or creates) a store in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let users: Vec<User> = read_collection(&dir.join(USERS_FILE))?;
        let uploads: Vec<Upload> = read_collection(&dir.join(UPLOADS_FILE))?;
        info!(
            "Loaded {} users and {} uploads from {}",
            users.len(),
            uploads.len(),
            dir.display()
        );

        Ok(Self {
            dir: Some(dir),
            users: RwLock::new(users.into_iter().map(|u| (u.id, u)).collect()),
            uploads: RwLock::new(uploads.into_iter().map(|u| (u.id, u)).collect()),
        })
    }

    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            users: RwLock::new(IndexMap::new()),
            uploads: RwLock::new(IndexMap::new()),
        }
    }

    fn read_users(&self) -> Result<RwLockReadGuard<'_, IndexMap<Uuid, User>>, StoreError> {
        self.users.read().map_err(|_| StoreError::Poisoned)
    }

    fn write_users(&self) -> Result<RwLockWriteGuard<'_, IndexMap<Uuid, User>>, StoreError> {
        self.users.write().map_err(|_| StoreError::Poisoned)
    }

    fn read_uploads(&self) -> Result<RwLockReadGuard<'_, IndexMap<Uuid, Upload>>, StoreError> {
        self.uploads.read().map_err(|_| StoreError::Poisoned)
    }

    fn write_uploads(&self) -> Result<RwLockWriteGuard<'_, IndexMap<Uuid, Upload>>, StoreError> {
        self.uploads.write().map_err(|_| StoreError::Poisoned)
    }

    fn flush<T: Serialize>(&self, file: &str, docs: &IndexMap<Uuid, T>) -> Result<(), StoreError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let docs: Vec<&T> = docs.values().collect();
        let json = serde_json::to_string_pretty(&docs)?;

        let path = dir.join(file);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Applies `change` to a copy of `docs`, writes the copy and only then
    /// swaps it in, so a failed write leaves memory as it was.
    fn commit<T: Clone + Serialize>(
        &self,
        file: &str,
        docs: &mut IndexMap<Uuid, T>,
        change: impl FnOnce(&mut IndexMap<Uuid, T>),
    ) -> Result<(), StoreError> {
        if self.dir.is_none() {
            change(docs);
            return Ok(());
        }
        let mut next = docs.clone();
        change(&mut next);
        self.flush(file, &next)?;
        *docs = next;
        Ok(())
    }

    /// Inserts a new user unless the email is already registered, in which
    /// case `None` is returned and nothing changes.
    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: String,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.write_users()?;
        if users.values().any(|u| u.email == email) {
            return Ok(None);
        }

        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
            role: Role::User,
            created_at: Utc::now(),
        };
        self.commit(USERS_FILE, &mut users, |users| {
            users.insert(user.id, user.clone());
        })?;
        Ok(Some(user))
    }

    pub fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.read_users()?.get(&id).cloned())
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.read_users()?.values().find(|u| u.email == email).cloned())
    }

    pub fn list_users(&self) -> Result<Vec<PublicUser>, StoreError> {
        Ok(self.read_users()?.values().map(PublicUser::from).collect())
    }

    /// Sets a user's role. Setting the role a user already has is a no-op
    /// that still returns the user.
    pub fn set_role(&self, id: Uuid, role: Role) -> Result<Option<PublicUser>, StoreError> {
        let mut users = self.write_users()?;
        let Some(user) = users.get(&id) else {
            return Ok(None);
        };

        let mut updated = user.clone();
        if updated.role == role {
            return Ok(Some(PublicUser::from(&updated)));
        }
        updated.role = role;
        self.commit(USERS_FILE, &mut users, |users| {
            users.insert(id, updated.clone());
        })?;
        Ok(Some(PublicUser::from(&updated)))
    }

    pub fn insert_upload(&self, upload: Upload) -> Result<Upload, StoreError> {
        let mut uploads = self.write_uploads()?;
        self.commit(UPLOADS_FILE, &mut uploads, |uploads| {
            uploads.insert(upload.id, upload.clone());
        })?;
        Ok(upload)
    }

    pub fn find_upload(&self, id: Uuid) -> Result<Option<Upload>, StoreError> {
        Ok(self.read_uploads()?.get(&id).cloned())
    }

    /// Runs `update` on one upload under the write lock and persists the
    /// result. Returning `Err` from the closure, or a failed write, leaves the
    /// document untouched.
    pub fn update_upload<E>(
        &self,
        id: Uuid,
        update: impl FnOnce(&mut Upload) -> Result<(), E>,
    ) -> Result<Option<Result<Upload, E>>, StoreError> {
        let mut uploads = self.write_uploads()?;
        let Some(upload) = uploads.get(&id) else {
            return Ok(None);
        };

        let mut draft = upload.clone();
        if let Err(e) = update(&mut draft) {
            return Ok(Some(Err(e)));
        }
        self.commit(UPLOADS_FILE, &mut uploads, |uploads| {
            uploads.insert(id, draft.clone());
        })?;
        Ok(Some(Ok(draft)))
    }

    /// Uploads in insertion order, optionally only those owned by `owner`.
    pub fn list_uploads(&self, owner: Option<Uuid>) -> Result<Vec<Upload>, StoreError> {
        Ok(self
            .read_uploads()?
            .values()
            .filter(|u| owner.is_none_or(|id| u.user == id))
            .cloned()
            .collect())
    }
}

fn read_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload_for(user: Uuid) -> Upload {
        Upload {
            id: Uuid::new_v4(),
            user,
            file_name: Some("q1.xlsx".into()),
            upload_date: Some(Utc::now()),
            row_count: Some(12),
            columns: vec!["Month".into(), "Sales".into()],
            analyses: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn duplicate_email_is_refused() {
        let store = DocumentStore::in_memory();
        assert!(store.create_user("Ann", "ann@example.com", "h".into()).unwrap().is_some());
        assert!(store.create_user("Other", "ann@example.com", "h".into()).unwrap().is_none());
        assert_eq!(store.list_users().unwrap().len(), 1);
    }

    #[test]
    fn set_role_is_idempotent() {
        let store = DocumentStore::in_memory();
        let user = store.create_user("Bob", "bob@example.com", "h".into()).unwrap().unwrap();

        let first = store.set_role(user.id, Role::Admin).unwrap().unwrap();
        let second = store.set_role(user.id, Role::Admin).unwrap().unwrap();
        assert_eq!(first.role, Role::Admin);
        assert_eq!(second, first);
        assert!(store.set_role(Uuid::new_v4(), Role::Admin).unwrap().is_none());
    }

    #[test]
    fn failed_update_leaves_document_unchanged() {
        let store = DocumentStore::in_memory();
        let original = store.insert_upload(upload_for(Uuid::new_v4())).unwrap();

        let result = store
            .update_upload(original.id, |u| {
                u.columns.clear();
                Err("refused")
            })
            .unwrap();
        assert_eq!(result, Some(Err("refused")));
        assert_eq!(store.find_upload(original.id).unwrap().unwrap(), original);
    }

    #[test]
    fn failed_write_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        let owner = store.create_user("Dee", "dee@example.com", "h".into()).unwrap().unwrap();
        let upload = store.insert_upload(upload_for(owner.id)).unwrap();

        // A directory in place of the temp file fails every write.
        fs::create_dir(dir.path().join("users.json.tmp")).unwrap();
        fs::create_dir(dir.path().join("uploads.json.tmp")).unwrap();

        let result = store.update_upload(upload.id, |u| {
            u.columns.push("Profit".into());
            Ok::<(), ()>(())
        });
        assert!(result.is_err());
        assert_eq!(store.find_upload(upload.id).unwrap().unwrap(), upload);

        assert!(store.insert_upload(upload_for(owner.id)).is_err());
        assert_eq!(store.list_uploads(None).unwrap().len(), 1);

        assert!(store.set_role(owner.id, Role::Admin).is_err());
        assert_eq!(store.find_user(owner.id).unwrap().unwrap().role, Role::User);

        assert!(store.create_user("Eve", "eve@example.com", "h".into()).is_err());
        assert!(store.find_user_by_email("eve@example.com").unwrap().is_none());

        let reopened = DocumentStore::open(dir.path()).unwrap();
        assert_eq!(reopened.find_upload(upload.id).unwrap().unwrap(), upload);
        assert_eq!(reopened.list_users().unwrap().len(), 1);
    }

    #[test]
    fn uploads_filter_by_owner() {
        let store = DocumentStore::in_memory();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        store.insert_upload(upload_for(alice)).unwrap();
        store.insert_upload(upload_for(bob)).unwrap();
        store.insert_upload(upload_for(alice)).unwrap();

        assert_eq!(store.list_uploads(Some(alice)).unwrap().len(), 2);
        assert_eq!(store.list_uploads(None).unwrap().len(), 3);
    }

    #[test]
    fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let upload_id;
        {
            let store = DocumentStore::open(dir.path()).unwrap();
            let user = store.create_user("Cy", "cy@example.com", "h".into()).unwrap().unwrap();
            upload_id = store.insert_upload(upload_for(user.id)).unwrap().id;
        }

        let store = DocumentStore::open(dir.path()).unwrap();
        assert!(store.find_user_by_email("cy@example.com").unwrap().is_some());
        assert_eq!(
            store.find_upload(upload_id).unwrap().unwrap().file_name.as_deref(),
            Some("q1.xlsx")
        );
    }
}
