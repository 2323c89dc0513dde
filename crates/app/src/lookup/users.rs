//! User identity client.

use async_trait::async_trait;
use carthorse::cart::UserUuid;
use mockall::automock;

use super::{LookupError, RemoteLookup};

#[automock]
#[async_trait]
pub trait UserService: Send + Sync {
    async fn user_exists(&self, user: UserUuid) -> Result<bool, LookupError>;
}

#[derive(Debug, Clone)]
pub struct RemoteUserService {
    lookup: RemoteLookup,
}

impl RemoteUserService {
    pub fn new(lookup: RemoteLookup) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl UserService for RemoteUserService {
    async fn user_exists(&self, user: UserUuid) -> Result<bool, LookupError> {
        let found = self
            .lookup
            .get(&format!("api/users/{user}/exists"))
            .await?
            .is_some();

        Ok(found)
    }
}
