#![allow(dead_code)]

use std::sync::Arc;

use forge_orm::{Database, MemoryEventBus, MemoryStorage, ModelCompiler, ModelRegistry};

pub const CUSTOMER: &str = r#"
name: Customer
attributes:
  name:
    type: string
    fillable: true
  email:
    type: string
    fillable: true
relations:
  has_many:
    - Order
  has_one:
    - Profile
  has_many_through:
    - model: Payment
      through: Order
"#;

pub const PAYMENT: &str = r#"
name: Payment
attributes:
  amount:
    type: float
    fillable: true
relations:
  belongs_to:
    - Order
"#;

pub const PROFILE: &str = r#"
name: Profile
attributes:
  bio:
    type: text
    fillable: true
relations:
  belongs_to:
    - Customer
"#;

pub const ORDER: &str = r#"
name: Order
attributes:
  total:
    type: float
    fillable: true
  status:
    type: enum
    fillable: true
    values: [pending, paid, shipped]
  reference:
    type: string
relations:
  belongs_to:
    - Customer
traits:
  observe: true
"#;

pub const GIFT_CARD: &str = r#"
name: GiftCard
attributes:
  code:
    type: string
    fillable: true
    validation:
      required: true
      max: 32
  balance:
    type: float
    fillable: true
  status:
    type: string
    fillable: true
traits:
  use_uuid: true
  use_soft_deletes: true
  observe: [created, deleted]
"#;

pub const POST: &str = r#"
name: Post
attributes:
  title:
    type: string
    fillable: true
relations:
  belongs_to_many:
    - Tag
"#;

pub const TAG: &str = r#"
name: Tag
attributes:
  label:
    type: string
    fillable: true
relations:
  belongs_to_many:
    - Post
"#;

pub const WALLET: &str = r#"
name: Wallet
attributes:
  owner:
    type: string
    fillable: true
relations:
  has_many:
    - Card
"#;

pub const CARD: &str = r#"
name: Card
attributes:
  total:
    type: float
    fillable: true
relations:
  belongs_to:
    - Wallet
traits:
  use_soft_deletes: true
"#;

pub fn registry() -> ModelRegistry {
    let mut compiler = ModelCompiler::new();
    for source in [CUSTOMER, PROFILE, ORDER, PAYMENT, GIFT_CARD, POST, TAG, WALLET, CARD] {
        compiler = compiler.add_yaml(source).unwrap();
    }
    compiler.compile().unwrap()
}

/// Memory database plus direct handles on its storage and event log
pub struct Fixture {
    pub db: Database,
    pub storage: Arc<MemoryStorage>,
    pub events: Arc<MemoryEventBus>,
}

pub fn fixture() -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let storage = Arc::new(MemoryStorage::new());
    let events = Arc::new(MemoryEventBus::new());
    let db = Database::new(storage.clone(), registry()).with_event_bus(events.clone());
    Fixture {
        db,
        storage,
        events,
    }
}
