//! In-memory doubles for unit and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::config::JwtConfig;
use crate::notifications::notifier::{NotificationEvent, Notifier};
use crate::persistence::{LifecycleStore, LifecycleTx, StoreError};
use crate::shipments::repo_types::{picked_at_after, NewShipment, Shipment};
use crate::shipments::status::ItemStatus;
use crate::storage::ObjectStore;
use crate::subscriptions::repo_types::{PaymentMethod, SubscriptionTransaction, TransactionStatus};
use crate::users::directory::IdentityDirectory;
use crate::users::repo_types::{Actor, User, UserRole, VerificationStatus};

#[derive(Debug, Clone, Default)]
pub struct MemoryData {
    pub users: HashMap<Uuid, User>,
    pub shipments: HashMap<Uuid, Shipment>,
    pub subscriptions: Vec<SubscriptionTransaction>,
}

/// Store whose transactions hold one global lock and write a working copy
/// back on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<MemoryData>>,
    fail_commit: Arc<AtomicBool>,
    locks: Arc<StdMutex<Vec<&'static str>>>,
}

impl MemoryStore {
    pub async fn add_user(&self, role: UserRole) -> Uuid {
        let id = Uuid::new_v4();
        let user = User {
            id,
            first_name: "Test".into(),
            last_name: role.as_str().to_lowercase(),
            email: format!("{id}@example.com"),
            phone_number: Some("+251911000000".into()),
            role,
            verification_status: VerificationStatus::Verified,
            wallet_balance: 0.0,
            credit_balance: 0.0,
            current_plan_id: None,
            items_count_this_month: 0,
            rating: 0.0,
            completed_deliveries: 0,
            earnings: 0.0,
            show_rating: true,
            show_phone: false,
            show_email: false,
            show_delivery_count: true,
            id_type: None,
            id_front_key: None,
            id_back_key: None,
            selfie_key: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.data.lock().await.users.insert(id, user);
        id
    }

    pub async fn add_actor(&self, role: UserRole) -> Actor {
        Actor {
            id: self.add_user(role).await,
            role,
        }
    }

    pub async fn set_verification(&self, user_id: Uuid, status: VerificationStatus) {
        if let Some(u) = self.data.lock().await.users.get_mut(&user_id) {
            u.verification_status = status;
        }
    }

    /// Active, unexpired subscription with `remaining` uses.
    pub async fn grant_subscription(&self, user_id: Uuid, remaining: i32) -> Uuid {
        let now = OffsetDateTime::now_utc();
        let sub = SubscriptionTransaction {
            id: Uuid::new_v4(),
            user_id,
            plan_id: Uuid::new_v4(),
            plan_name: "Basic".into(),
            amount: 10.0,
            payment_method: PaymentMethod::Wallet,
            status: TransactionStatus::Completed,
            remaining_usage: remaining,
            is_active: true,
            end_date: Some(now + Duration::days(30)),
            transaction_reference: None,
            created_at: now,
        };
        let id = sub.id;
        self.data.lock().await.subscriptions.push(sub);
        id
    }

    /// Seeds a shipment directly in `status`, bypassing the lifecycle.
    pub async fn add_shipment(
        &self,
        sender_id: Uuid,
        status: ItemStatus,
        partner_id: Option<Uuid>,
    ) -> Uuid {
        let now = OffsetDateTime::now_utc();
        let new = new_shipment(sender_id);
        let id = Uuid::new_v4();
        let shipment = Shipment {
            id,
            sender_id,
            partner_id,
            category: new.category,
            description: new.description,
            pickup_country: new.pickup_country,
            dest_country: new.dest_country,
            address: new.address,
            receiver_name: new.receiver_name,
            receiver_phone: new.receiver_phone,
            weight: new.weight,
            fee: new.fee,
            notes: new.notes,
            status,
            created_at: now,
            picked_at: status.is_picked_up().then_some(now),
            available_from: None,
            available_until: None,
            images: new.images,
        };
        self.data.lock().await.shipments.insert(id, shipment);
        id
    }

    pub async fn shipment(&self, id: Uuid) -> Option<Shipment> {
        self.data.lock().await.shipments.get(&id).cloned()
    }

    pub async fn shipment_count(&self) -> usize {
        self.data.lock().await.shipments.len()
    }

    pub async fn user(&self, id: Uuid) -> Option<User> {
        self.data.lock().await.users.get(&id).cloned()
    }

    pub async fn remaining(&self, user_id: Uuid) -> i32 {
        let now = OffsetDateTime::now_utc();
        let data = self.data.lock().await;
        crate::subscriptions::ledger::remaining_usage(
            &data
                .subscriptions
                .iter()
                .filter(|s| s.user_id == user_id)
                .cloned()
                .collect::<Vec<_>>(),
            now,
        )
    }

    /// Kinds of rows locked so far, in order, across all transactions.
    pub fn lock_log(&self) -> Vec<&'static str> {
        self.locks.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn clear_lock_log(&self) {
        if let Ok(mut l) = self.locks.lock() {
            l.clear();
        }
    }

    /// The next commit fails and rolls back.
    pub fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LifecycleStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LifecycleTx>, StoreError> {
        let guard = self.data.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            work,
            fail_commit: self.fail_commit.clone(),
            locks: self.locks.clone(),
        }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryData>,
    work: MemoryData,
    fail_commit: Arc<AtomicBool>,
    locks: Arc<StdMutex<Vec<&'static str>>>,
}

impl MemoryTx {
    fn note_lock(&self, kind: &'static str) {
        if let Ok(mut l) = self.locks.lock() {
            l.push(kind);
        }
    }
}

#[async_trait]
impl LifecycleTx for MemoryTx {
    async fn get_shipment(&mut self, id: Uuid) -> Result<Option<Shipment>, StoreError> {
        self.note_lock("shipment");
        Ok(self.work.shipments.get(&id).cloned())
    }

    async fn insert_shipment(
        &mut self,
        new: NewShipment,
        now: OffsetDateTime,
    ) -> Result<Shipment, StoreError> {
        let sender = self
            .work
            .users
            .get_mut(&new.sender_id)
            .ok_or(StoreError::MissingUser(new.sender_id))?;
        sender.items_count_this_month += 1;

        let shipment = Shipment {
            id: Uuid::new_v4(),
            sender_id: new.sender_id,
            partner_id: None,
            category: new.category,
            description: new.description,
            pickup_country: new.pickup_country,
            dest_country: new.dest_country,
            address: new.address,
            receiver_name: new.receiver_name,
            receiver_phone: new.receiver_phone,
            weight: new.weight,
            fee: new.fee,
            notes: new.notes,
            status: ItemStatus::Posted,
            created_at: now,
            picked_at: None,
            available_from: new.available_from,
            available_until: new.available_until,
            images: new.images,
        };
        self.work.shipments.insert(shipment.id, shipment.clone());
        Ok(shipment)
    }

    async fn compare_and_swap_status(
        &mut self,
        id: Uuid,
        expected: ItemStatus,
        next: ItemStatus,
        partner_id: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<Option<Shipment>, StoreError> {
        let Some(s) = self.work.shipments.get_mut(&id) else {
            return Ok(None);
        };
        if s.status != expected {
            return Ok(None);
        }
        s.status = next;
        s.partner_id = partner_id;
        s.picked_at = picked_at_after(s.picked_at, next, now);
        Ok(Some(s.clone()))
    }

    async fn lock_user(&mut self, user_id: Uuid) -> Result<(), StoreError> {
        self.note_lock("user");
        if self.work.users.contains_key(&user_id) {
            Ok(())
        } else {
            Err(StoreError::MissingUser(user_id))
        }
    }

    async fn get_active_subscription(
        &mut self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<SubscriptionTransaction>, StoreError> {
        self.note_lock("subscription");
        Ok(self
            .work
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_active_at(now))
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn decrement_quota(
        &mut self,
        subscription_id: Uuid,
        amount: i32,
    ) -> Result<bool, StoreError> {
        match self
            .work
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id && s.is_active && s.remaining_usage >= amount)
        {
            Some(s) => {
                s.remaining_usage -= amount;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_delivery(&mut self, partner_id: Uuid, fee: f64) -> Result<(), StoreError> {
        self.note_lock("user");
        let partner = self
            .work
            .users
            .get_mut(&partner_id)
            .ok_or(StoreError::MissingUser(partner_id))?;
        partner.completed_deliveries += 1;
        partner.earnings += fee;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            mut guard,
            work,
            fail_commit,
            ..
        } = *self;
        if fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        *guard = work;
        Ok(())
    }
}

#[async_trait]
impl IdentityDirectory for MemoryStore {
    async fn actor(&self, user_id: Uuid) -> Result<Option<Actor>, StoreError> {
        Ok(self.data.lock().await.users.get(&user_id).map(User::actor))
    }

    async fn verification_status(&self, user_id: Uuid) -> Result<VerificationStatus, StoreError> {
        self.data
            .lock()
            .await
            .users
            .get(&user_id)
            .map(|u| u.verification_status)
            .ok_or(StoreError::MissingUser(user_id))
    }
}

/// Records every notification, optionally failing all of them.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<StdMutex<Vec<(Uuid, NotificationEvent, Value)>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        let n = Self::default();
        n.failing.store(true, Ordering::SeqCst);
        n
    }

    pub fn events(&self) -> Vec<(Uuid, NotificationEvent, Value)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: Uuid, event: NotificationEvent, payload: Value) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("notification sink offline");
        }
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .push((user_id, event, payload));
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakeStorage;

#[async_trait]
impl ObjectStore for FakeStorage {
    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        Ok(format!("https://fake.local/{key}?expires={seconds}"))
    }

    async fn presign_put(&self, key: &str, _content_type: &str, _seconds: u64) -> anyhow::Result<String> {
        Ok(format!("https://fake.local/upload/{key}"))
    }
}

pub fn new_shipment(sender_id: Uuid) -> NewShipment {
    NewShipment {
        sender_id,
        category: Some("Documents".into()),
        description: Some("Passport copies".into()),
        pickup_country: "Ethiopia".into(),
        dest_country: "Kenya".into(),
        address: "Bole Road 12, Addis Ababa".into(),
        receiver_name: "Wanjiru".into(),
        receiver_phone: "+254 712 345678".into(),
        weight: 1.2,
        fee: 35.0,
        notes: None,
        available_from: None,
        available_until: None,
        images: vec![],
    }
}

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "test".into(),
        issuer: "test".into(),
        audience: "test".into(),
    }
}

pub fn token(cfg: &JwtConfig, user_id: Uuid, kind: TokenKind) -> String {
    let now = OffsetDateTime::now_utc();
    let claims = Claims {
        sub: user_id,
        iat: now.unix_timestamp() as usize,
        exp: (now + Duration::minutes(5)).unix_timestamp() as usize,
        iss: cfg.issuer.clone(),
        aud: cfg.audience.clone(),
        kind,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(cfg.secret.as_bytes()))
        .expect("sign test token")
}

pub fn bearer(user_id: Uuid) -> String {
    format!("Bearer {}", token(&jwt_config(), user_id, TokenKind::Access))
}
