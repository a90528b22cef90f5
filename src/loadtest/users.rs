//! Synthetic accounts and users that load test traffic is attributed to.
use rand::{Rng, seq::SliceRandom};
use uuid::Uuid;

use crate::auth::{AuthError, JwtKeys};

pub const DEFAULT_ACCOUNTS: usize = 20;
pub const MIN_USERS_PER_ACCOUNT: usize = 2;
pub const MAX_USERS_PER_ACCOUNT: usize = 10;

#[derive(Debug, Clone)]
pub struct TestUser {
    pub account_id: String,
    pub user_id: String,
    /// Bearer token minted once per user.
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct TestUsers {
    users: Vec<TestUser>,
}

impl TestUsers {
    pub fn generate<R: Rng>(
        keys: &JwtKeys,
        accounts: usize,
        rng: &mut R,
    ) -> Result<Self, AuthError> {
        let mut users = Vec::new();

        for _ in 0..accounts.max(1) {
            let account_id = Uuid::now_v7().to_string();

            for _ in 0..rng.gen_range(MIN_USERS_PER_ACCOUNT..=MAX_USERS_PER_ACCOUNT) {
                let user_id = Uuid::now_v7().to_string();
                let token = keys.generate_token(&account_id, &user_id)?;
                users.push(TestUser {
                    account_id: account_id.clone(),
                    user_id,
                    token,
                });
            }
        }

        log::debug!("Generated {} test users in {accounts} accounts", users.len());

        Ok(Self { users })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn pick<R: Rng>(&self, rng: &mut R) -> Option<&TestUser> {
        self.users.choose(rng)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn tokens_identify_their_user() {
        let keys = JwtKeys::new("test-secret-key-with-length");
        let mut rng = StdRng::seed_from_u64(11);
        let users = TestUsers::generate(&keys, 3, &mut rng).unwrap();

        assert!(users.len() >= 3 * MIN_USERS_PER_ACCOUNT);
        assert!(users.len() <= 3 * MAX_USERS_PER_ACCOUNT);

        let accounts: HashSet<_> = users.users.iter().map(|u| &u.account_id).collect();
        assert_eq!(accounts.len(), 3);

        let user = users.pick(&mut rng).unwrap();
        let ctx = keys.validate(&user.token).unwrap();
        assert_eq!(ctx.user_id, user.user_id);
        assert_eq!(ctx.account_id, user.account_id);
    }
}
