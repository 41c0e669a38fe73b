use std::sync::Arc;

use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

use crate::access::Roster;

/// Cleartext password source: the roster's per-user password when it has
/// one, the shared server password otherwise.
#[derive(Debug)]
pub struct RosterAuthSource {
    roster: Arc<Roster>,
    password: String,
}

impl RosterAuthSource {
    pub fn new(roster: Arc<Roster>, password: String) -> Self {
        Self { roster, password }
    }

    fn password_for(&self, user: Option<&str>) -> &str {
        user.and_then(|u| self.roster.password_for(u))
            .unwrap_or(&self.password)
    }
}

#[async_trait]
impl AuthSource for RosterAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let password = self.password_for(login.user().as_deref());
        Ok(Password::new(None, password.as_bytes().to_vec()))
    }
}
