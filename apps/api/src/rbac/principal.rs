#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Company, Entity, User};
use crate::query::{Filter, Sort};
use crate::store::{DocumentStore, SoftDeleteCollection, StoreResult};

/// The authenticated caller of one request. Rebuilt from the user record on every
/// request, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role_ids: Vec<Uuid>,
    pub company_ids: Vec<Uuid>,
}

impl Principal {
    pub fn new(user_id: Uuid, role_ids: Vec<Uuid>, company_ids: Vec<Uuid>) -> Self {
        Self {
            user_id,
            role_ids,
            company_ids,
        }
    }
}

#[derive(Clone)]
pub struct PrincipalLoader {
    users: SoftDeleteCollection,
    companies: SoftDeleteCollection,
}

impl PrincipalLoader {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            users: SoftDeleteCollection::new(store.clone(), User::COLLECTION),
            companies: SoftDeleteCollection::new(store, Company::COLLECTION),
        }
    }

    /// `None` when the user is unknown, deleted or banned.
    ///
    /// Company ids are the user's own memberships plus every live company the user
    /// manages.
    pub async fn load(&self, user_id: Uuid) -> StoreResult<Option<Principal>> {
        let Some(doc) = self.users.find_one(&Filter::by_id(user_id)).await? else {
            debug!(%user_id, "no live user for principal");
            return Ok(None);
        };
        let user = doc.into_record::<User>()?;
        if user.data.is_banned {
            warn!(%user_id, "banned user rejected");
            return Ok(None);
        }

        let managed = self
            .companies
            .find(
                &Filter::eq("manager_id", user_id.to_string()),
                &Sort::default(),
            )
            .await?;
        let mut company_ids: BTreeSet<Uuid> = user.data.company_ids.iter().copied().collect();
        company_ids.extend(managed.iter().map(|c| c.id()));

        let mut role_ids = user.data.roles;
        role_ids.sort();
        role_ids.dedup();
        Ok(Some(Principal::new(
            user_id,
            role_ids,
            company_ids.into_iter().collect(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::body_fields;
    use crate::store::MemoryStore;

    fn user(roles: Vec<Uuid>, company_ids: Vec<Uuid>, is_banned: bool) -> User {
        User {
            firstname: "Ada".into(),
            lastname: "L".into(),
            mobile: "0".into(),
            roles,
            company_ids,
            is_banned,
        }
    }

    #[tokio::test]
    async fn test_loads_roles_and_managed_companies() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let users = SoftDeleteCollection::new(store.clone(), User::COLLECTION);
        let companies = SoftDeleteCollection::new(store.clone(), Company::COLLECTION);

        let member_of = Uuid::new_v4();
        let role = Uuid::new_v4();
        let u = users
            .insert_one(body_fields(&user(vec![role], vec![member_of], false)).unwrap(), None)
            .await
            .unwrap();
        let managed = companies
            .insert_one(
                body_fields(&Company {
                    name: "Acme".into(),
                    logo: None,
                    manager_id: u.id(),
                    is_active: true,
                })
                .unwrap(),
                None,
            )
            .await
            .unwrap();

        let principal = PrincipalLoader::new(store).load(u.id()).await.unwrap().unwrap();
        assert_eq!(principal.role_ids, vec![role]);
        assert!(principal.company_ids.contains(&member_of));
        assert!(principal.company_ids.contains(&managed.id()));
    }

    #[tokio::test]
    async fn test_banned_and_deleted_users_have_no_principal() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let users = SoftDeleteCollection::new(store.clone(), User::COLLECTION);
        let loader = PrincipalLoader::new(store);

        let banned = users
            .insert_one(body_fields(&user(vec![], vec![], true)).unwrap(), None)
            .await
            .unwrap();
        assert!(loader.load(banned.id()).await.unwrap().is_none());

        let gone = users
            .insert_one(body_fields(&user(vec![], vec![], false)).unwrap(), None)
            .await
            .unwrap();
        users.delete(&Filter::by_id(gone.id()), None).await.unwrap();
        assert!(loader.load(gone.id()).await.unwrap().is_none());

        assert!(loader.load(Uuid::new_v4()).await.unwrap().is_none());
    }
}
