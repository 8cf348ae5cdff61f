use crate::{
    account::{
        Account,
        AccountId,
    },
    error::StoreError,
    store::BalanceStore,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        atomic::{
            AtomicUsize,
            Ordering,
        },
    },
    time::Duration,
};

#[derive(Debug, Default)]
struct Faults {
    failing_resolves: u32,
    failing_creates: u32,
    failing_updates: u32,
    lose_create_race: bool,
    latency: Option<Duration>,
}

#[derive(Debug, Default)]
struct Accounts {
    by_name: HashMap<String, AccountId>,
    by_id: HashMap<AccountId, Account>,
    next_id: u64,
}

impl Accounts {
    fn insert(&mut self, display_name: &str, balance: u64) -> Account {
        self.next_id += 1;
        let account = Account::new(format!("u{}", self.next_id), display_name, balance);
        self.by_name
            .insert(display_name.to_string(), account.id.clone());
        self.by_id.insert(account.id.clone(), account.clone());
        account
    }
}

/// Process-local balance store, cloned handles share the same accounts.
///
/// Also records every update call and can inject faults, which is what the
/// session tests lean on.
#[derive(Clone, Default)]
pub struct InMemoryBalanceStore {
    accounts: Arc<Mutex<Accounts>>,
    faults: Arc<Mutex<Faults>>,
    update_calls: Arc<Mutex<Vec<(AccountId, u64)>>>,
    create_calls: Arc<Mutex<Vec<String>>>,
    active_updates: Arc<AtomicUsize>,
    peak_updates: Arc<AtomicUsize>,
}

struct ActiveUpdate<'a>(&'a AtomicUsize);

impl<'a> ActiveUpdate<'a> {
    fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(active)
    }
}

impl Drop for ActiveUpdate<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an account as if another session had created it earlier.
    pub fn with_account(self, display_name: &str, balance: u64) -> Self {
        self.insert_account(display_name, balance);
        self
    }

    pub fn insert_account(&self, display_name: &str, balance: u64) -> Account {
        lock(&self.accounts).insert(display_name, balance)
    }

    pub fn balance_of(&self, display_name: &str) -> Option<u64> {
        let accounts = lock(&self.accounts);
        let id = accounts.by_name.get(display_name)?;
        accounts.by_id.get(id).map(|account| account.balance)
    }

    /// Simulates an out-of-band write by another device or an admin.
    pub fn set_balance(&self, account_id: &AccountId, balance: u64) {
        if let Some(account) = lock(&self.accounts).by_id.get_mut(account_id) {
            account.balance = balance;
        }
    }

    pub fn update_calls(&self) -> Vec<(AccountId, u64)> {
        lock(&self.update_calls).clone()
    }

    pub fn create_calls(&self) -> Vec<String> {
        lock(&self.create_calls).clone()
    }

    /// Highest number of update calls that were ever in progress at once.
    pub fn peak_concurrent_updates(&self) -> usize {
        self.peak_updates.load(Ordering::SeqCst)
    }

    pub fn fail_next_resolves(&self, count: u32) {
        lock(&self.faults).failing_resolves = count;
    }

    pub fn fail_next_creates(&self, count: u32) {
        lock(&self.faults).failing_creates = count;
    }

    pub fn fail_next_updates(&self, count: u32) {
        lock(&self.faults).failing_updates = count;
    }

    /// The next create finds that a concurrent client registered the same
    /// name first, and reports [`StoreError::AlreadyExists`].
    pub fn lose_next_create_race(&self) {
        lock(&self.faults).lose_create_race = true;
    }

    pub fn set_latency(&self, latency: Duration) {
        lock(&self.faults).latency = Some(latency);
    }

    async fn simulate_latency(&self) {
        let latency = lock(&self.faults).latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_fault(&self, select: impl FnOnce(&mut Faults) -> &mut u32) -> bool {
        let mut faults = lock(&self.faults);
        let remaining = select(&mut faults);
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

impl BalanceStore for InMemoryBalanceStore {
    async fn resolve_account(&self, display_name: &str) -> Result<Option<Account>, StoreError> {
        self.simulate_latency().await;
        if self.take_fault(|f| &mut f.failing_resolves) {
            return Err(StoreError::Rejected("injected resolve failure".to_string()));
        }
        let accounts = lock(&self.accounts);
        Ok(accounts
            .by_name
            .get(display_name)
            .and_then(|id| accounts.by_id.get(id))
            .cloned())
    }

    async fn create_account(&self, display_name: &str) -> Result<Account, StoreError> {
        self.simulate_latency().await;
        lock(&self.create_calls).push(display_name.to_string());
        if self.take_fault(|f| &mut f.failing_creates) {
            return Err(StoreError::Rejected("injected create failure".to_string()));
        }
        let lost_race = std::mem::take(&mut lock(&self.faults).lose_create_race);
        let mut accounts = lock(&self.accounts);
        if lost_race && !accounts.by_name.contains_key(display_name) {
            accounts.insert(display_name, 0);
        }
        if accounts.by_name.contains_key(display_name) {
            return Err(StoreError::AlreadyExists {
                display_name: display_name.to_string(),
            });
        }
        Ok(accounts.insert(display_name, 0))
    }

    async fn update_balance(
        &self,
        account_id: &AccountId,
        new_balance: u64,
    ) -> Result<u64, StoreError> {
        let _active = ActiveUpdate::enter(&self.active_updates, &self.peak_updates);
        self.simulate_latency().await;
        lock(&self.update_calls).push((account_id.clone(), new_balance));
        if self.take_fault(|f| &mut f.failing_updates) {
            return Err(StoreError::Rejected("injected update failure".to_string()));
        }
        let mut accounts = lock(&self.accounts);
        let account = accounts
            .by_id
            .get_mut(account_id)
            .ok_or_else(|| StoreError::InvalidAccount(account_id.clone()))?;
        account.balance = new_balance;
        Ok(account.balance)
    }
}

// A poisoned lock only means a test thread panicked mid-update; the data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
