//! In-memory user directory and the service methods the demos protect.

use crate::{fibonacci, BandwidthSimulator};
use bulwark::{ExecutionContext, Failure};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Default)]
struct Table {
    next_id: u64,
    rows: Vec<User>,
}

/// Stand-in for the data-access layer. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    table: Arc<Mutex<Table>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save(&self, name: impl Into<String>, email: impl Into<String>) -> User {
        let mut table = self.lock();
        table.next_id += 1;
        let user = User { id: table.next_id, name: name.into(), email: email.into() };
        table.rows.push(user.clone());
        user
    }

    pub async fn find_by_email(&self, email: &str) -> Result<User, Failure> {
        self.lock()
            .rows
            .iter()
            .find(|user| user.email == email)
            .cloned()
            .ok_or_else(|| Failure::not_found(format!("no user with email {}", email)))
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// User lookups backed by a flaky network and a slow computation.
#[derive(Debug, Clone)]
pub struct UserService {
    directory: UserDirectory,
    bandwidth: BandwidthSimulator,
}

impl UserService {
    pub fn new(directory: UserDirectory, bandwidth: BandwidthSimulator) -> Self {
        Self { directory, bandwidth }
    }

    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    pub async fn add_user(&self, name: &str, email: &str) -> User {
        self.directory.save(name, email).await
    }

    /// Lookup that first has to get through the saturated network.
    pub async fn network_exhaustion(&self, email: &str) -> Result<User, Failure> {
        self.bandwidth.consume()?;
        self.directory.find_by_email(email).await
    }

    /// Lookup preceded by `fibonacci(n)`; gives up as soon as `ctx` is cancelled.
    pub async fn time_consuming_task(
        &self,
        email: &str,
        n: u64,
        ctx: ExecutionContext,
    ) -> Result<User, Failure> {
        let result = fibonacci(n, ctx.clone()).await?;
        tracing::info!(n, result, "fibonacci finished");
        ctx.check()?;
        self.directory.find_by_email(email).await
    }
}
